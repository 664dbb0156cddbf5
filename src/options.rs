use serde::{Deserialize, Serialize};


/// Knobs shared by all decoders.
///
/// # Examples
///
/// ```
/// use binpeek::DecodeOptions;
///
/// let options = DecodeOptions::default().with_max_description_len(40);
/// assert_eq!(options.max_nesting, 200);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Deepest allowed nesting of Lua function prototypes.
    pub max_nesting: usize,
    /// Strings longer than this many characters are cut in descriptions and
    /// suffixed with `...`; 0 keeps them whole.
    pub max_description_len: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions { max_nesting: 200, max_description_len: 100 }
    }
}

impl DecodeOptions {
    pub fn with_max_nesting(mut self, depth: usize) -> Self {
        self.max_nesting = depth;
        self
    }

    pub fn with_max_description_len(mut self, len: usize) -> Self {
        self.max_description_len = len;
        self
    }

    pub(crate) fn clip(&self, s: &str) -> String {
        clip(s, self.max_description_len)
    }
}

pub(crate) fn clip(s: &str, max: usize) -> String {
    if max == 0 || s.chars().count() <= max {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(max).collect();
    cut.push_str("...");
    cut
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip("hello", 10), "hello");
        assert_eq!(clip("hello", 2), "he...");
        assert_eq!(clip("ééé", 1), "é...");
        assert_eq!(clip("hello", 0), "hello");
    }
}
