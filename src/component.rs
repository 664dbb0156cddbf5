//! The decoded component tree.
//!
//! Decoders build a [`Draft`] tree while reading. Descriptions that depend
//! on a unit's symbol table are recorded as deferred functions and only
//! evaluated by [`Draft::finish`], once the table is complete, so forward
//! and backward references resolve the same way.

use std::fmt;

use serde::Serialize;

use crate::error::DecodeError;
use crate::reader::Reader;


/// One decoded unit of an artifact: a header field, a table entry, an
/// instruction, an operand. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    name: String,
    description: String,
    offset: usize,
    length: usize,
    children: Vec<Component>,
}

impl Component {
    /// Structural label, e.g. `magic`, `#3`, `methods[1]` or a mnemonic.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable rendering of the value, with references resolved.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn children(&self) -> &[Component] {
        &self.children
    }

    /// `(offset, length)` of the bytes this component was decoded from.
    pub fn byte_range(&self) -> (usize, usize) {
        (self.offset, self.length)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&Component> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follows a path of child names from this component.
    pub fn path(&self, names: &[&str]) -> Option<&Component> {
        names.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Pre-order traversal including this component.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = depth * 2;
        if self.description.is_empty() {
            writeln!(f, "{:indent$}{}", "", self.name, indent = indent)?;
        } else {
            writeln!(f, "{:indent$}{}: {}", "", self.name, self.description, indent = indent)?;
        }
        for child in &self.children {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

pub struct Walk<'a> {
    stack: Vec<&'a Component>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Component;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}


type Deferred<T> = Box<dyn FnOnce(&T) -> Result<String, DecodeError>>;

enum Describe<T> {
    Text(String),
    Deferred(Deferred<T>),
}

/// A component under construction. `T` is the symbol table its deferred
/// descriptions are resolved against.
pub(crate) struct Draft<T> {
    name: String,
    offset: usize,
    length: usize,
    describe: Describe<T>,
    children: Vec<Draft<T>>,
}

impl<T> Draft<T> {
    /// Starts a compound node at the reader's current position.
    pub(crate) fn open(name: impl Into<String>, r: &Reader<'_>) -> Self {
        Draft {
            name: name.into(),
            offset: r.position(),
            length: 0,
            describe: Describe::Text(String::new()),
            children: Vec::new(),
        }
    }

    pub(crate) fn leaf(name: impl Into<String>, offset: usize, length: usize, desc: impl Into<String>) -> Self {
        Draft {
            name: name.into(),
            offset,
            length,
            describe: Describe::Text(desc.into()),
            children: Vec::new(),
        }
    }

    pub(crate) fn deferred(
        name: impl Into<String>,
        offset: usize,
        length: usize,
        f: impl FnOnce(&T) -> Result<String, DecodeError> + 'static,
    ) -> Self {
        Draft {
            name: name.into(),
            offset,
            length,
            describe: Describe::Deferred(Box::new(f)),
            children: Vec::new(),
        }
    }

    /// Ends the node at the reader's current position.
    pub(crate) fn close(&mut self, r: &Reader<'_>) {
        self.length = r.position() - self.offset;
    }

    pub(crate) fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn describe(&mut self, desc: impl Into<String>) {
        self.describe = Describe::Text(desc.into());
    }

    pub(crate) fn describe_with(&mut self, f: impl FnOnce(&T) -> Result<String, DecodeError> + 'static) {
        self.describe = Describe::Deferred(Box::new(f));
    }

    pub(crate) fn push(&mut self, child: Draft<T>) {
        self.children.push(child);
    }

    /// Reads one value and records it as a leaf child.
    pub(crate) fn field<'a, V>(
        &mut self,
        r: &mut Reader<'a>,
        name: &str,
        read: impl FnOnce(&mut Reader<'a>) -> Result<V, DecodeError>,
        show: impl FnOnce(&V) -> String,
    ) -> Result<V, DecodeError> {
        let offset = r.position();
        let value = read(r)?;
        self.push(Draft::leaf(name, offset, r.position() - offset, show(&value)));
        Ok(value)
    }

    pub(crate) fn u1(&mut self, r: &mut Reader<'_>, name: &str) -> Result<u8, DecodeError> {
        self.field(r, name, Reader::read_u1, u8::to_string)
    }

    pub(crate) fn u2(&mut self, r: &mut Reader<'_>, name: &str) -> Result<u16, DecodeError> {
        self.field(r, name, Reader::read_u2, u16::to_string)
    }

    pub(crate) fn u4(&mut self, r: &mut Reader<'_>, name: &str) -> Result<u32, DecodeError> {
        self.field(r, name, Reader::read_u4, u32::to_string)
    }

    /// A u4 that holds a file offset, shown in hex.
    pub(crate) fn offset_u4(&mut self, r: &mut Reader<'_>, name: &str) -> Result<u32, DecodeError> {
        self.field(r, name, Reader::read_u4, |v| format!("{:#x}", v))
    }

    pub(crate) fn bytes<'a>(&mut self, r: &mut Reader<'a>, name: &str, n: usize) -> Result<&'a [u8], DecodeError> {
        let offset = r.position();
        let bytes = r.read_bytes(n)?;
        self.push(Draft::leaf(name, offset, n, hex(bytes)));
        Ok(bytes)
    }

    /// Resolves every description against the complete table.
    pub(crate) fn finish(self, table: &T) -> Result<Component, DecodeError> {
        let Draft { name, offset, length, describe, children } = self;
        let description = match describe {
            Describe::Text(s) => s,
            Describe::Deferred(f) => f(table).map_err(|e| e.at(offset).with_context(name.clone()))?,
        };
        let children = children
            .into_iter()
            .map(|c| c.finish(table))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.with_context(name.clone()))?;
        Ok(Component { name, description, offset, length, children })
    }
}

impl<T> From<Component> for Draft<T> {
    fn from(c: Component) -> Self {
        Draft {
            name: c.name,
            offset: c.offset,
            length: c.length,
            describe: Describe::Text(c.description),
            children: c.children.into_iter().map(Draft::from).collect(),
        }
    }
}

/// Space separated hex, cut after 32 bytes.
pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut s = bytes.iter().take(32).map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ");
    if bytes.len() > 32 {
        s.push_str(" ...");
    }
    s
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::reader::Endian;

    struct Names(Vec<&'static str>);

    fn lookup(names: &Names, ix: usize) -> Result<String, DecodeError> {
        names.0.get(ix).map(|s| s.to_string()).ok_or_else(|| err!(InvalidConstantReference, 0, "No name {}", ix))
    }

    #[test]
    fn deferred_descriptions_see_the_whole_table() {
        let bytes = [0x00, 0x01, 0x00, 0x00];
        let mut r = Reader::new(&bytes, Endian::Big);
        let mut root: Draft<Names> = Draft::open("root", &r);
        let ix = root.u2(&mut r, "index").unwrap();
        root.describe_with(move |t| lookup(t, ix as usize));
        root.u2(&mut r, "zero").unwrap();
        root.close(&r);

        // the table is only filled after the references were read
        let c = root.finish(&Names(vec!["first", "second"])).unwrap();
        assert_eq!(c.description(), "second");
        assert_eq!(c.byte_range(), (0, 4));
        assert_eq!(c.children().len(), 2);
        assert_eq!(c.child("zero").map(|z| z.byte_range()), Some((2, 2)));
        assert_eq!(c.walk().count(), 3);
    }

    #[test]
    fn failed_resolution_points_at_the_referencing_node() {
        let bytes = [0u8; 6];
        let mut r = Reader::new(&bytes, Endian::Big);
        let mut root: Draft<Names> = Draft::open("root", &r);
        r.skip(4).unwrap();
        root.push(Draft::deferred("bad", 4, 2, |t: &Names| lookup(t, 7)));
        let e = root.finish(&Names(vec![])).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidConstantReference);
        assert_eq!(e.offset(), 4);
        assert_eq!(e.contexts(), ["bad".to_string(), "root".to_string()]);
    }

    #[test]
    fn renders_an_indented_tree() {
        let mut root: Draft<()> = Draft::leaf("root", 0, 2, "");
        root.push(Draft::leaf("a", 0, 1, "1"));
        root.push(Draft::leaf("b", 1, 1, "2"));
        let c = root.finish(&()).unwrap();
        assert_eq!(c.to_string(), "root\n  a: 1\n  b: 2\n");
        assert_eq!(c.path(&["b"]).map(Component::description), Some("2"));
    }

    #[test]
    fn hex_is_cut() {
        assert_eq!(hex(&[0xca, 0xfe]), "ca fe");
        assert!(hex(&[0u8; 40]).ends_with(" ..."));
    }
}
