/* Dex file format structures */

use std::fmt;

use crate::component::Draft;
use crate::descriptor::java_type;
use crate::error::DecodeError;
use crate::options::clip;
use crate::reader::Reader;

/* Constants */
pub const DEX_FILE_MAGIC: [u8; 4] = [ 0x64, 0x65, 0x78, 0x0a ];
pub const ENDIAN_CONSTANT: u32 = 0x12345678;
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;
pub const HEADER_SIZE: u32 = 0x70;
pub const NO_INDEX: u32 = 0xffffffff;

/* Map item types */
const MAP_ITEM_TYPES: [(u16, &str); 21] = [
    (0x0000, "header_item"),
    (0x0001, "string_id_item"),
    (0x0002, "type_id_item"),
    (0x0003, "proto_id_item"),
    (0x0004, "field_id_item"),
    (0x0005, "method_id_item"),
    (0x0006, "class_def_item"),
    (0x0007, "call_site_id_item"),
    (0x0008, "method_handle_item"),
    (0x1000, "map_list"),
    (0x1001, "type_list"),
    (0x1002, "annotation_set_ref_list"),
    (0x1003, "annotation_set_item"),
    (0x2000, "class_data_item"),
    (0x2001, "code_item"),
    (0x2002, "string_data_item"),
    (0x2003, "debug_info_item"),
    (0x2004, "annotation_item"),
    (0x2005, "encoded_array_item"),
    (0x2006, "annotations_directory_item"),
    (0xf000, "hiddenapi_class_data_item"),
];

pub fn map_item_type_name(item_type: u16) -> Option<&'static str>
{
    MAP_ITEM_TYPES.iter().find(|(t, _)| *t == item_type).map(|(_, name)| *name)
}


/// The fixed 0x70 byte header. Only the fields the decoder navigates by are
/// kept; the rest are rendered straight into the tree.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Header
{
    pub file_size: u32,
    pub header_size: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
}

impl Header
{
    pub(crate) fn read(r: &mut Reader<'_>, node: &mut Draft<DexTables>) -> Result<Header, DecodeError>
    {
        let magic_offset = r.position();
        let magic = node.field(r, "magic", |r| r.read_bytes(8), |m| {
            String::from_utf8_lossy(m).escape_debug().to_string()
        })?;
        if magic[..4] != DEX_FILE_MAGIC || magic[7] != 0
        {
            fail!(BadMagic, magic_offset, "Not a dex file, magic is {:02x?}", magic);
        }

        node.field(r, "checksum", Reader::read_u4, |v| format!("{:#010x}", v))?;
        node.bytes(r, "signature", 20)?;
        let file_size = node.u4(r, "file_size")?;
        let header_size = node.offset_u4(r, "header_size")?;

        let endian_offset = r.position();
        let endian_tag = node.field(r, "endian_tag", Reader::read_u4, |v| format!("{:#010x}", v))?;
        match endian_tag
        {
            ENDIAN_CONSTANT => {}
            REVERSE_ENDIAN_CONSTANT => fail!(UnsupportedLayout, endian_offset, "Big-endian dex files are not supported"),
            other => fail!(UnsupportedLayout, endian_offset, "Unknown endian tag {:#010x}", other),
        }

        node.u4(r, "link_size")?;
        node.offset_u4(r, "link_off")?;

        let header = Header {
            file_size,
            header_size,
            map_off: node.offset_u4(r, "map_off")?,
            string_ids_size: node.u4(r, "string_ids_size")?,
            string_ids_off: node.offset_u4(r, "string_ids_off")?,
            type_ids_size: node.u4(r, "type_ids_size")?,
            type_ids_off: node.offset_u4(r, "type_ids_off")?,
            proto_ids_size: node.u4(r, "proto_ids_size")?,
            proto_ids_off: node.offset_u4(r, "proto_ids_off")?,
            field_ids_size: node.u4(r, "field_ids_size")?,
            field_ids_off: node.offset_u4(r, "field_ids_off")?,
            method_ids_size: node.u4(r, "method_ids_size")?,
            method_ids_off: node.offset_u4(r, "method_ids_off")?,
            class_defs_size: node.u4(r, "class_defs_size")?,
            class_defs_off: node.offset_u4(r, "class_defs_off")?,
        };
        node.u4(r, "data_size")?;
        node.offset_u4(r, "data_off")?;
        Ok(header)
    }
}


/// Which id table an index points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind
{
    String,
    Type,
    Proto,
    Field,
    Method,
    ClassDef,
}

impl fmt::Display for IdKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(match self
        {
            IdKind::String => "string_ids",
            IdKind::Type => "type_ids",
            IdKind::Proto => "proto_ids",
            IdKind::Field => "field_ids",
            IdKind::Method => "method_ids",
            IdKind::ClassDef => "class_defs",
        })
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoItem
{
    // The proto_id_item struct
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    pub parameters: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldItem
{
    // The field_id_item struct
    pub class_idx: u16,
    pub type_idx: u16,
    pub name_idx: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodItem
{
    // The method_id_item struct
    pub class_idx: u16,
    pub proto_idx: u16,
    pub name_idx: u32,
}


/// The id tables of one dex file, filled while the tables are read and
/// consulted by descriptions once all of them are complete.
#[derive(Debug, Default)]
pub struct DexTables
{
    pub strings: Vec<String>,
    /// string index of each type descriptor
    pub types: Vec<u32>,
    pub protos: Vec<ProtoItem>,
    pub fields: Vec<FieldItem>,
    pub methods: Vec<MethodItem>,
    /// type index of each defined class
    pub class_defs: Vec<u32>,
    pub(crate) clip_len: usize,
}

fn lookup<T>(table: &[T], kind: IdKind, idx: u32) -> Result<&T, DecodeError>
{
    table.get(idx as usize).ok_or_else(|| {
        err!(InvalidConstantReference, 0, "{} index {} out of range ({} entries)", kind, idx, table.len())
    })
}

impl DexTables
{
    pub fn string(&self, idx: u32) -> Result<&str, DecodeError>
    {
        lookup(&self.strings, IdKind::String, idx).map(String::as_str)
    }

    /// Raw descriptor of a type id, e.g. `Ljava/lang/String;`.
    pub fn type_descriptor(&self, idx: u32) -> Result<&str, DecodeError>
    {
        self.string(*lookup(&self.types, IdKind::Type, idx)?)
    }

    /// Java spelling of a type id.
    pub fn type_name(&self, idx: u32) -> Result<String, DecodeError>
    {
        Ok(java_type(self.type_descriptor(idx)?))
    }

    fn parameter_list(&self, proto: &ProtoItem) -> Result<String, DecodeError>
    {
        let params = proto.parameters.iter().map(|t| self.type_name(*t)).collect::<Result<Vec<_>, _>>()?;
        Ok(params.join(", "))
    }

    /// `(int, java.lang.String) void`
    pub fn proto(&self, idx: u32) -> Result<String, DecodeError>
    {
        let proto = lookup(&self.protos, IdKind::Proto, idx)?;
        Ok(format!("({}) {}", self.parameter_list(proto)?, self.type_name(proto.return_type_idx)?))
    }

    /// `com.example.Foo.count: int`
    pub fn field(&self, idx: u32) -> Result<String, DecodeError>
    {
        let field = lookup(&self.fields, IdKind::Field, idx)?;
        Ok(format!(
            "{}.{}: {}",
            self.type_name(field.class_idx as u32)?,
            self.string(field.name_idx)?,
            self.type_name(field.type_idx as u32)?
        ))
    }

    /// `com.example.Foo.run(int) void`
    pub fn method(&self, idx: u32) -> Result<String, DecodeError>
    {
        let method = lookup(&self.methods, IdKind::Method, idx)?;
        let proto = lookup(&self.protos, IdKind::Proto, method.proto_idx as u32)?;
        Ok(format!(
            "{}.{}({}) {}",
            self.type_name(method.class_idx as u32)?,
            self.string(method.name_idx)?,
            self.parameter_list(proto)?,
            self.type_name(proto.return_type_idx)?
        ))
    }

    pub fn class_def(&self, idx: u32) -> Result<String, DecodeError>
    {
        self.type_name(*lookup(&self.class_defs, IdKind::ClassDef, idx)?)
    }

    pub fn describe(&self, kind: IdKind, idx: u32) -> Result<String, DecodeError>
    {
        match kind
        {
            IdKind::String => Ok(clip(self.string(idx)?, self.clip_len)),
            IdKind::Type => self.type_name(idx),
            IdKind::Proto => self.proto(idx),
            IdKind::Field => self.field(idx),
            IdKind::Method => self.method(idx),
            IdKind::ClassDef => self.class_def(idx),
        }
    }

    /// `#3 -> java.lang.Object`
    pub(crate) fn show_index(&self, kind: IdKind, idx: u32) -> Result<String, DecodeError>
    {
        Ok(format!("#{} -> {}", idx, self.describe(kind, idx)?))
    }
}
