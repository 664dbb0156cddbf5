use std::fmt;

macro_rules! err {
    ($kind:ident, $offset:expr, $msg:literal) => {
        $crate::error::DecodeError::new($crate::error::ErrorKind::$kind, $offset, $msg)
    };
    ($kind:ident, $offset:expr, $fmtstr:literal, $($args:tt)*) => {
        $crate::error::DecodeError::new($crate::error::ErrorKind::$kind, $offset, &format!($fmtstr, $($args)*))
    };
}

macro_rules! fail {
    ($($args:tt)*) => {
        return Err(err!($($args)*))
    };
}


/// Classification of a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind
{
    /// A read needed more bytes than the buffer has left.
    UnexpectedEndOfBuffer,
    /// A constant pool (or Lua constant) tag has no decoder.
    UnsupportedConstantTag,
    /// An attribute name has no decoder. Attributes fall back to a raw blob,
    /// so this kind never aborts a decode.
    UnsupportedAttributeName,
    /// An opcode has no operand shape.
    UnsupportedOpcode,
    /// An index points outside its table, or at an entry of the wrong kind.
    InvalidConstantReference,
    /// Instructions did not consume exactly the declared code length.
    TruncatedCode,
    /// A structure did not consume exactly its declared length, or declares
    /// an impossible one.
    LengthMismatch,
    /// The buffer does not start with the format's signature.
    BadMagic,
    /// Header declares sizes or byte order this decoder cannot read.
    UnsupportedLayout,
    /// Nested structures exceed the configured depth.
    NestingTooDeep,
    /// String bytes are not valid modified UTF-8.
    MalformedString,
}

impl fmt::Display for ErrorKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let s = match self
        {
            ErrorKind::UnexpectedEndOfBuffer => "unexpected end of buffer",
            ErrorKind::UnsupportedConstantTag => "unsupported constant tag",
            ErrorKind::UnsupportedAttributeName => "unsupported attribute name",
            ErrorKind::UnsupportedOpcode => "unsupported opcode",
            ErrorKind::InvalidConstantReference => "invalid constant reference",
            ErrorKind::TruncatedCode => "truncated code",
            ErrorKind::LengthMismatch => "length mismatch",
            ErrorKind::BadMagic => "bad magic",
            ErrorKind::UnsupportedLayout => "unsupported layout",
            ErrorKind::NestingTooDeep => "nesting too deep",
            ErrorKind::MalformedString => "malformed string",
        };
        f.write_str(s)
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError
{
    kind: ErrorKind,
    offset: usize,
    msg: String,
    contexts: Vec<String>,
}

impl DecodeError
{
    pub(crate) fn new(kind: ErrorKind, offset: usize, msg: &str) -> Self
    {
        DecodeError {
            kind,
            offset,
            msg: msg.to_string(),
            contexts: Vec::new(),
        }
    }

    pub(crate) fn with_context(self, context: String) -> Self
    {
        let mut contexts = self.contexts;
        contexts.push(context);
        DecodeError { contexts, ..self }
    }

    /// Relocates an error raised away from the buffer (e.g. while resolving a
    /// description) to the offset of the structure that referenced it.
    pub(crate) fn at(self, offset: usize) -> Self
    {
        DecodeError { offset, ..self }
    }

    pub fn kind(&self) -> ErrorKind
    {
        self.kind
    }

    /// Byte offset in the input where the failing structure starts.
    pub fn offset(&self) -> usize
    {
        self.offset
    }

    pub fn message(&self) -> &str
    {
        &self.msg
    }

    /// Enclosing structures, innermost first.
    pub fn contexts(&self) -> &[String]
    {
        &self.contexts
    }
}

impl fmt::Display for DecodeError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}: {} at offset {:#x}", self.kind, self.msg, self.offset)?;
        let mut connector = " for ";
        for context in &self.contexts
        {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        Ok(())
    }
}

impl std::error::Error for DecodeError {}


pub(crate) trait Context<T>
{
    fn context<C, F>(self, context: F) -> Result<T, DecodeError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T, DecodeError>
{
    fn context<C, F>(self, context: F) -> Result<T, DecodeError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.with_context(context().into()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_contexts_innermost_first() {
        let e = err!(InvalidConstantReference, 0x2a, "Constant pool index {} out of range", 99)
            .with_context("name_index".to_string())
            .with_context("methods[0]".to_string());
        assert_eq!(
            e.to_string(),
            "invalid constant reference: Constant pool index 99 out of range at offset 0x2a for name_index of methods[0]"
        );
        assert_eq!(e.kind(), ErrorKind::InvalidConstantReference);
        assert_eq!(e.contexts().len(), 2);
    }

    #[test]
    fn fail_returns_early() {
        fn check(v: u8) -> Result<u8, DecodeError> {
            if v > 3 { fail!(UnsupportedOpcode, 7, "Opcode {:#04x} out of range", v); }
            Ok(v)
        }
        assert_eq!(check(2), Ok(2));
        let e = check(9).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::UnsupportedOpcode);
        assert_eq!(e.offset(), 7);
        assert_eq!(e.at(12).offset(), 12);
    }
}
