/* Class file constant pool */

use log::trace;

use crate::component::Draft;
use crate::error::{Context, DecodeError};
use crate::options::{clip, DecodeOptions};
use crate::reader::{decode_mutf8, Reader};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantTag
{
    Utf8,
    Integer,
    Float,
    Long,
    Double,
    Class,
    String,
    Fieldref,
    Methodref,
    InterfaceMethodref,
    NameAndType,
    MethodHandle,
    MethodType,
    InvokeDynamic,
}

const TAGS: [(u8, ConstantTag); 14] = [
    (1, ConstantTag::Utf8),
    (3, ConstantTag::Integer),
    (4, ConstantTag::Float),
    (5, ConstantTag::Long),
    (6, ConstantTag::Double),
    (7, ConstantTag::Class),
    (8, ConstantTag::String),
    (9, ConstantTag::Fieldref),
    (10, ConstantTag::Methodref),
    (11, ConstantTag::InterfaceMethodref),
    (12, ConstantTag::NameAndType),
    (15, ConstantTag::MethodHandle),
    (16, ConstantTag::MethodType),
    (18, ConstantTag::InvokeDynamic),
];

impl ConstantTag
{
    pub fn from_u1(tag: u8) -> Option<ConstantTag>
    {
        TAGS.iter().find(|(t, _)| *t == tag).map(|(_, c)| *c)
    }

    pub fn name(self) -> &'static str
    {
        match self
        {
            ConstantTag::Utf8 => "CONSTANT_Utf8_info",
            ConstantTag::Integer => "CONSTANT_Integer_info",
            ConstantTag::Float => "CONSTANT_Float_info",
            ConstantTag::Long => "CONSTANT_Long_info",
            ConstantTag::Double => "CONSTANT_Double_info",
            ConstantTag::Class => "CONSTANT_Class_info",
            ConstantTag::String => "CONSTANT_String_info",
            ConstantTag::Fieldref => "CONSTANT_Fieldref_info",
            ConstantTag::Methodref => "CONSTANT_Methodref_info",
            ConstantTag::InterfaceMethodref => "CONSTANT_InterfaceMethodref_info",
            ConstantTag::NameAndType => "CONSTANT_NameAndType_info",
            ConstantTag::MethodHandle => "CONSTANT_MethodHandle_info",
            ConstantTag::MethodType => "CONSTANT_MethodType_info",
            ConstantTag::InvokeDynamic => "CONSTANT_InvokeDynamic_info",
        }
    }

    /// Pool slots taken by an entry; 8-byte constants take two.
    pub fn slots(self) -> u16
    {
        match self
        {
            ConstantTag::Long | ConstantTag::Double => 2,
            _ => 1,
        }
    }
}


#[derive(Debug, Clone, PartialEq)]
pub enum Constant
{
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodref { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
}

impl Constant
{
    pub fn tag(&self) -> ConstantTag
    {
        match self
        {
            Constant::Utf8(_) => ConstantTag::Utf8,
            Constant::Integer(_) => ConstantTag::Integer,
            Constant::Float(_) => ConstantTag::Float,
            Constant::Long(_) => ConstantTag::Long,
            Constant::Double(_) => ConstantTag::Double,
            Constant::Class { .. } => ConstantTag::Class,
            Constant::String { .. } => ConstantTag::String,
            Constant::Fieldref { .. } => ConstantTag::Fieldref,
            Constant::Methodref { .. } => ConstantTag::Methodref,
            Constant::InterfaceMethodref { .. } => ConstantTag::InterfaceMethodref,
            Constant::NameAndType { .. } => ConstantTag::NameAndType,
            Constant::MethodHandle { .. } => ConstantTag::MethodHandle,
            Constant::MethodType { .. } => ConstantTag::MethodType,
            Constant::InvokeDynamic { .. } => ConstantTag::InvokeDynamic,
        }
    }
}

const REFERENCE_KINDS: [&str; 10] = [
    "",
    "REF_getField",
    "REF_getStatic",
    "REF_putField",
    "REF_putStatic",
    "REF_invokeVirtual",
    "REF_invokeStatic",
    "REF_invokeSpecial",
    "REF_newInvokeSpecial",
    "REF_invokeInterface",
];

fn reference_kind_name(kind: u8) -> String
{
    match REFERENCE_KINDS.get(kind as usize)
    {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("REF_{}", kind),
    }
}


/// The constant pool of one class file. Slot 0 and the slot after each
/// Long or Double hold no entry.
#[derive(Debug, Default)]
pub struct ConstantPool
{
    entries: Vec<Option<Constant>>,
    clip_len: usize,
}

impl ConstantPool
{
    /// The `constant_pool_count` value: one more than the highest index.
    pub fn count(&self) -> usize
    {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Result<&Constant, DecodeError>
    {
        match self.entries.get(index as usize)
        {
            Some(Some(c)) => Ok(c),
            Some(None) => Err(err!(InvalidConstantReference, 0, "Constant pool index {} is not a usable entry", index)),
            None => Err(err!(
                InvalidConstantReference,
                0,
                "Constant pool index {} out of range (count {})",
                index,
                self.entries.len()
            )),
        }
    }

    fn wrong_tag(index: u16, expected: ConstantTag, found: &Constant) -> DecodeError
    {
        err!(
            InvalidConstantReference,
            0,
            "Expected {} at #{}, found {}",
            expected.name(),
            index,
            found.tag().name()
        )
    }

    pub fn utf8(&self, index: u16) -> Result<&str, DecodeError>
    {
        match self.get(index)?
        {
            Constant::Utf8(s) => Ok(s),
            other => Err(Self::wrong_tag(index, ConstantTag::Utf8, other)),
        }
    }

    /// Internal name of a `CONSTANT_Class_info`.
    pub fn class_name(&self, index: u16) -> Result<&str, DecodeError>
    {
        match self.get(index)?
        {
            Constant::Class { name_index } => self.utf8(*name_index),
            other => Err(Self::wrong_tag(index, ConstantTag::Class, other)),
        }
    }

    /// `(name, descriptor)` of a `CONSTANT_NameAndType_info`.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), DecodeError>
    {
        match self.get(index)?
        {
            Constant::NameAndType { name_index, descriptor_index } =>
            {
                Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?))
            }
            other => Err(Self::wrong_tag(index, ConstantTag::NameAndType, other)),
        }
    }

    fn member_ref(&self, class_index: u16, name_and_type_index: u16) -> Result<String, DecodeError>
    {
        let class = self.class_name(class_index)?;
        let (name, descriptor) = self.name_and_type(name_and_type_index)?;
        Ok(format!("{}.{}:{}", class, name, descriptor))
    }

    /// Human readable value of an entry, following its references.
    pub fn describe(&self, index: u16) -> Result<String, DecodeError>
    {
        Ok(match self.get(index)?
        {
            Constant::Utf8(s) => clip(s, self.clip_len),
            Constant::Integer(v) => v.to_string(),
            Constant::Float(v) => format!("{}f", v),
            Constant::Long(v) => format!("{}L", v),
            Constant::Double(v) => format!("{}d", v),
            Constant::Class { .. } => self.class_name(index)?.to_string(),
            Constant::String { string_index } => clip(self.utf8(*string_index)?, self.clip_len),
            Constant::Fieldref { class_index, name_and_type_index }
            | Constant::Methodref { class_index, name_and_type_index }
            | Constant::InterfaceMethodref { class_index, name_and_type_index } =>
            {
                self.member_ref(*class_index, *name_and_type_index)?
            }
            Constant::NameAndType { .. } =>
            {
                let (name, descriptor) = self.name_and_type(index)?;
                format!("{}:{}", name, descriptor)
            }
            Constant::MethodHandle { reference_kind, reference_index } =>
            {
                let target = match self.get(*reference_index)?
                {
                    Constant::Fieldref { .. } | Constant::Methodref { .. } | Constant::InterfaceMethodref { .. } =>
                    {
                        self.describe(*reference_index)?
                    }
                    other => return Err(Self::wrong_tag(*reference_index, ConstantTag::Methodref, other)),
                };
                format!("{} {}", reference_kind_name(*reference_kind), target)
            }
            Constant::MethodType { descriptor_index } => self.utf8(*descriptor_index)?.to_string(),
            Constant::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } =>
            {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                format!("#{}:{}:{}", bootstrap_method_attr_index, name, descriptor)
            }
        })
    }

    /// `#7 -> java/lang/Object`
    pub(crate) fn show_index(&self, index: u16) -> Result<String, DecodeError>
    {
        Ok(format!("#{} -> {}", index, self.describe(index)?))
    }
}


/// Reads a u2 pool index as a leaf whose description follows the reference.
pub(crate) fn cp_index(node: &mut Draft<ConstantPool>, r: &mut Reader<'_>, name: &str) -> Result<u16, DecodeError>
{
    let offset = r.position();
    let index = r.read_u2()?;
    node.push(Draft::deferred(name, offset, 2, move |cp: &ConstantPool| cp.show_index(index)));
    Ok(index)
}

/// Like [`cp_index`], for fields where 0 means "no entry".
pub(crate) fn cp_index_or(
    node: &mut Draft<ConstantPool>,
    r: &mut Reader<'_>,
    name: &str,
    absent: &'static str,
) -> Result<u16, DecodeError>
{
    let offset = r.position();
    let index = r.read_u2()?;
    if index == 0
    {
        node.push(Draft::leaf(name, offset, 2, format!("#0 -> {}", absent)));
    }
    else
    {
        node.push(Draft::deferred(name, offset, 2, move |cp: &ConstantPool| cp.show_index(index)));
    }
    Ok(index)
}

fn read_entry(
    r: &mut Reader<'_>,
    node: &mut Draft<ConstantPool>,
    options: &DecodeOptions,
) -> Result<Constant, DecodeError>
{
    let tag_offset = r.position();
    let tag = r.read_u1()?;
    let kind = match ConstantTag::from_u1(tag)
    {
        Some(kind) => kind,
        None => fail!(UnsupportedConstantTag, tag_offset, "Invalid constant pool tag {}", tag),
    };
    node.push(Draft::leaf("tag", tag_offset, 1, format!("{} ({})", tag, kind.name())));

    let constant = match kind
    {
        ConstantTag::Utf8 =>
        {
            let length = node.u2(r, "length")? as usize;
            let offset = r.position();
            let s = decode_mutf8(r.read_bytes(length)?, offset)?;
            node.push(Draft::leaf("bytes", offset, length, options.clip(&s)));
            Constant::Utf8(s)
        }
        ConstantTag::Integer => Constant::Integer(node.field(r, "bytes", Reader::read_i4, |v| v.to_string())?),
        ConstantTag::Float => Constant::Float(node.field(r, "bytes", Reader::read_f4, |v| v.to_string())?),
        ConstantTag::Long =>
        {
            let high = node.u4(r, "high_bytes")?;
            let low = node.u4(r, "low_bytes")?;
            Constant::Long((((high as u64) << 32) | low as u64) as i64)
        }
        ConstantTag::Double =>
        {
            let high = node.u4(r, "high_bytes")?;
            let low = node.u4(r, "low_bytes")?;
            Constant::Double(f64::from_bits(((high as u64) << 32) | low as u64))
        }
        ConstantTag::Class => Constant::Class { name_index: cp_index(node, r, "name_index")? },
        ConstantTag::String => Constant::String { string_index: cp_index(node, r, "string_index")? },
        ConstantTag::Fieldref | ConstantTag::Methodref | ConstantTag::InterfaceMethodref =>
        {
            let class_index = cp_index(node, r, "class_index")?;
            let name_and_type_index = cp_index(node, r, "name_and_type_index")?;
            match kind
            {
                ConstantTag::Fieldref => Constant::Fieldref { class_index, name_and_type_index },
                ConstantTag::Methodref => Constant::Methodref { class_index, name_and_type_index },
                _ => Constant::InterfaceMethodref { class_index, name_and_type_index },
            }
        }
        ConstantTag::NameAndType => Constant::NameAndType {
            name_index: cp_index(node, r, "name_index")?,
            descriptor_index: cp_index(node, r, "descriptor_index")?,
        },
        ConstantTag::MethodHandle =>
        {
            let reference_kind = node.field(r, "reference_kind", Reader::read_u1, |k| {
                format!("{} ({})", k, reference_kind_name(*k))
            })?;
            Constant::MethodHandle { reference_kind, reference_index: cp_index(node, r, "reference_index")? }
        }
        ConstantTag::MethodType => Constant::MethodType { descriptor_index: cp_index(node, r, "descriptor_index")? },
        ConstantTag::InvokeDynamic => Constant::InvokeDynamic {
            bootstrap_method_attr_index: node.u2(r, "bootstrap_method_attr_index")?,
            name_and_type_index: cp_index(node, r, "name_and_type_index")?,
        },
    };
    Ok(constant)
}

/// Reads `constant_pool_count` and the entries into `root`, returning the
/// complete pool.
pub(crate) fn read_constant_pool(
    r: &mut Reader<'_>,
    root: &mut Draft<ConstantPool>,
    options: &DecodeOptions,
) -> Result<ConstantPool, DecodeError>
{
    let count = root.u2(r, "constant_pool_count")?;
    let mut table = Draft::open("constant_pool", r);
    let mut pool = ConstantPool { entries: vec![None], clip_len: options.max_description_len };

    let mut index: u16 = 1;
    while index < count
    {
        let mut entry = Draft::open(format!("#{}", index), r);
        let constant = read_entry(r, &mut entry, options).context(|| format!("constant_pool #{}", index))?;
        entry.close(r);
        trace!("constant #{} {:?}", index, constant);

        let i = index;
        entry.describe_with(move |cp: &ConstantPool| cp.describe(i));
        table.push(entry);

        let slots = constant.tag().slots();
        pool.entries.push(Some(constant));
        if slots == 2 && index + 1 < count
        {
            pool.entries.push(None);
        }
        index = index.saturating_add(slots);
    }

    table.close(r);
    table.describe(format!("{} entries", pool.entries.iter().filter(|e| e.is_some()).count()));
    root.push(table);
    Ok(pool)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::reader::Endian;

    fn read_pool(bytes: &[u8]) -> Result<(ConstantPool, crate::Component), DecodeError> {
        let mut r = Reader::new(bytes, Endian::Big);
        let mut root = Draft::open("root", &r);
        let pool = read_constant_pool(&mut r, &mut root, &DecodeOptions::default())?;
        root.close(&r);
        let c = root.finish(&pool)?;
        Ok((pool, c))
    }

    #[test]
    fn long_takes_two_slots() {
        // #1 Utf8 "A", #2 Class #1, #3 Long 7 (+ #4 unusable), #5 Integer -1
        let bytes = [
            0x00, 0x06,
            0x01, 0x00, 0x01, b'A',
            0x07, 0x00, 0x01,
            0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07,
            0x03, 0xff, 0xff, 0xff, 0xff,
        ];
        let (pool, c) = read_pool(&bytes).unwrap();
        assert_eq!(pool.count(), 6);
        assert_eq!(pool.get(3), Ok(&Constant::Long(7)));
        assert_eq!(pool.get(4).unwrap_err().kind(), ErrorKind::InvalidConstantReference);
        assert_eq!(pool.get(5), Ok(&Constant::Integer(-1)));

        let table = c.child("constant_pool").unwrap();
        let names: Vec<&str> = table.children().iter().map(|e| e.name()).collect();
        assert_eq!(names, ["#1", "#2", "#3", "#5"]);
        assert_eq!(table.child("#2").unwrap().description(), "A");
        assert_eq!(table.child("#3").unwrap().description(), "7L");
        assert_eq!(table.byte_range(), (2, bytes.len() - 2));
    }

    #[test]
    fn forward_references_resolve() {
        // #1 Class -> #2, declared before the Utf8 it names
        let bytes = [0x00, 0x03, 0x07, 0x00, 0x02, 0x01, 0x00, 0x03, b'F', b'o', b'o'];
        let (pool, c) = read_pool(&bytes).unwrap();
        assert_eq!(pool.class_name(1), Ok("Foo"));
        let class = c.path(&["constant_pool", "#1"]).unwrap();
        assert_eq!(class.description(), "Foo");
        assert_eq!(class.child("name_index").unwrap().description(), "#2 -> Foo");
    }

    #[test]
    fn member_refs_follow_the_chain() {
        // #1 Methodref #2.#4, #2 Class #3, #3 "java/lang/Object", #4 NameAndType #5:#6, #5 "<init>", #6 "()V"
        let mut bytes = vec![0x00, 0x07];
        bytes.extend([0x0a, 0x00, 0x02, 0x00, 0x04]);
        bytes.extend([0x07, 0x00, 0x03]);
        bytes.extend([0x01, 0x00, 0x10]);
        bytes.extend(b"java/lang/Object");
        bytes.extend([0x0c, 0x00, 0x05, 0x00, 0x06]);
        bytes.extend([0x01, 0x00, 0x06]);
        bytes.extend(b"<init>");
        bytes.extend([0x01, 0x00, 0x03]);
        bytes.extend(b"()V");
        let (pool, _) = read_pool(&bytes).unwrap();
        assert_eq!(pool.describe(1).unwrap(), "java/lang/Object.<init>:()V");
        assert_eq!(pool.describe(4).unwrap(), "<init>:()V");
    }

    #[test]
    fn bad_references_are_errors() {
        // #1 Class -> #9 (out of range)
        let bytes = [0x00, 0x02, 0x07, 0x00, 0x09];
        let e = read_pool(&bytes).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidConstantReference);

        // #1 Class -> #1 (itself, not a Utf8)
        let bytes = [0x00, 0x02, 0x07, 0x00, 0x01];
        let e = read_pool(&bytes).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidConstantReference);
        assert!(e.message().contains("CONSTANT_Utf8_info"));

        let (pool, _) = read_pool(&[0x00, 0x01]).unwrap();
        assert_eq!(pool.get(0).unwrap_err().kind(), ErrorKind::InvalidConstantReference);
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let bytes = [0x00, 0x02, 0x02, 0x00, 0x00];
        let e = read_pool(&bytes).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::UnsupportedConstantTag);
        assert_eq!(e.offset(), 2);
    }

    #[test]
    fn modified_utf8_nul() {
        let bytes = [0x00, 0x02, 0x01, 0x00, 0x03, b'a', 0xc0, 0x80];
        let (pool, _) = read_pool(&bytes).unwrap();
        assert_eq!(pool.utf8(1), Ok("a\0"));
        assert!(std::str::from_utf8(&[b'a', 0xc0, 0x80]).is_err());
    }

    #[test]
    fn count_matches_the_header_when_a_long_comes_last() {
        // #1 Long, declared count 2 leaves no room for its second slot
        let bytes = [0x00, 0x02, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01];
        let (pool, _) = read_pool(&bytes).unwrap();
        assert_eq!(pool.count(), 2);
        assert_eq!(pool.get(1), Ok(&Constant::Long(1)));
        assert!(pool.get(2).unwrap_err().message().contains("out of range"));

        let bytes = [0x00, 0x03, 0x06, 0x3f, 0xf8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let (pool, c) = read_pool(&bytes).unwrap();
        assert_eq!(pool.count(), 3);
        assert_eq!(c.path(&["constant_pool", "#1"]).unwrap().description(), "1.5d");
    }

    #[test]
    fn truncated_entry() {
        let bytes = [0x00, 0x02, 0x01, 0x00, 0x05, b'a'];
        let e = read_pool(&bytes).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::UnexpectedEndOfBuffer);
    }
}
