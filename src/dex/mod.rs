//! Android dex decoder.
//!
//! Decodes the header, the six id tables at their declared offsets and the
//! map list. Each table is read sequentially; the string data, type lists
//! and parameter lists an id points at are read through [`Reader::at`] and
//! appear as children of the id that references them.

pub mod dex_file;

use log::{debug, trace, warn};

use crate::access::{AccessFlags, FlagTarget};
use crate::component::{Component, Draft};
use crate::error::{Context, DecodeError};
use crate::options::{clip, DecodeOptions};
use crate::reader::{decode_mutf8, Endian, Reader};

pub use dex_file::{DexTables, FieldItem, Header, IdKind, MethodItem, ProtoItem};
use dex_file::{map_item_type_name, HEADER_SIZE, NO_INDEX};

type Node = Draft<DexTables>;


/// Decodes a complete dex file.
pub fn decode(bytes: &[u8], options: &DecodeOptions) -> Result<Component, DecodeError>
{
    let mut r = Reader::new(bytes, Endian::Little);
    let mut root = Draft::leaf("DexFile", 0, bytes.len(), "");
    let mut tables = DexTables { clip_len: options.max_description_len, ..DexTables::default() };

    let mut header_node = Draft::open("header", &r);
    let header = Header::read(&mut r, &mut header_node).context(|| "header")?;
    header_node.close(&r);
    root.push(header_node);

    if header.header_size != HEADER_SIZE
    {
        warn!("Dex header_size is {:#x}, expected {:#x}", header.header_size, HEADER_SIZE);
    }
    if header.file_size as usize != bytes.len()
    {
        warn!("Dex file_size is {} but the buffer holds {} bytes", header.file_size, bytes.len());
    }
    debug!(
        "dex file: {} strings, {} types, {} protos, {} fields, {} methods, {} classes",
        header.string_ids_size,
        header.type_ids_size,
        header.proto_ids_size,
        header.field_ids_size,
        header.method_ids_size,
        header.class_defs_size
    );

    let clip_len = options.max_description_len;
    root.push(read_table(&mut r, "string_ids", header.string_ids_off, header.string_ids_size, |r, item, _| {
        let data_off = item.offset_u4(r, "string_data_off")?;
        let (data, s) = r.at(data_off as usize, |r| read_string_data(r, clip_len))?;
        item.push(data);
        item.describe(clip(&s, clip_len));
        tables.strings.push(s);
        Ok(())
    })?);

    root.push(read_table(&mut r, "type_ids", header.type_ids_off, header.type_ids_size, |r, item, i| {
        let descriptor_idx = index(item, r, "descriptor_idx", IdKind::String, 4)?;
        tables.types.push(descriptor_idx);
        item.describe_with(move |t| t.type_name(i));
        Ok(())
    })?);

    root.push(read_table(&mut r, "proto_ids", header.proto_ids_off, header.proto_ids_size, |r, item, i| {
        let shorty_idx = index(item, r, "shorty_idx", IdKind::String, 4)?;
        let return_type_idx = index(item, r, "return_type_idx", IdKind::Type, 4)?;
        let parameters_off = item.offset_u4(r, "parameters_off")?;
        let mut parameters = Vec::new();
        if parameters_off != 0
        {
            let (list, types) = r.at(parameters_off as usize, |r| read_type_list(r, "parameters"))?;
            item.push(list);
            parameters = types;
        }
        tables.protos.push(ProtoItem { shorty_idx, return_type_idx, parameters });
        item.describe_with(move |t| t.proto(i));
        Ok(())
    })?);

    root.push(read_table(&mut r, "field_ids", header.field_ids_off, header.field_ids_size, |r, item, i| {
        let field = FieldItem {
            class_idx: index(item, r, "class_idx", IdKind::Type, 2)? as u16,
            type_idx: index(item, r, "type_idx", IdKind::Type, 2)? as u16,
            name_idx: index(item, r, "name_idx", IdKind::String, 4)?,
        };
        tables.fields.push(field);
        item.describe_with(move |t| t.field(i));
        Ok(())
    })?);

    root.push(read_table(&mut r, "method_ids", header.method_ids_off, header.method_ids_size, |r, item, i| {
        let method = MethodItem {
            class_idx: index(item, r, "class_idx", IdKind::Type, 2)? as u16,
            proto_idx: index(item, r, "proto_idx", IdKind::Proto, 2)? as u16,
            name_idx: index(item, r, "name_idx", IdKind::String, 4)?,
        };
        tables.methods.push(method);
        item.describe_with(move |t| t.method(i));
        Ok(())
    })?);

    root.push(read_table(&mut r, "class_defs", header.class_defs_off, header.class_defs_size, |r, item, i| {
        let class_idx = index(item, r, "class_idx", IdKind::Type, 4)?;
        item.field(r, "access_flags", Reader::read_u4, |f| {
            AccessFlags::from_bits_retain(*f).describe(FlagTarget::Class)
        })?;
        optional_index(item, r, "superclass_idx", IdKind::Type)?;
        let interfaces_off = item.offset_u4(r, "interfaces_off")?;
        optional_index(item, r, "source_file_idx", IdKind::String)?;
        item.offset_u4(r, "annotations_off")?;
        item.offset_u4(r, "class_data_off")?;
        item.offset_u4(r, "static_values_off")?;
        if interfaces_off != 0
        {
            let (list, _) = r.at(interfaces_off as usize, |r| read_type_list(r, "interfaces"))?;
            item.push(list);
        }
        tables.class_defs.push(class_idx);
        item.describe_with(move |t| t.class_def(i));
        Ok(())
    })?);

    if header.map_off != 0
    {
        root.push(read_map_list(&mut r, header.map_off).context(|| "map_list")?);
    }

    root.describe(format!("{} classes", header.class_defs_size));
    let component = root.finish(&tables)?;
    debug!("decoded dex file with {} strings", tables.strings.len());
    Ok(component)
}

/// Reads `size` consecutive records starting at `offset`, each as a `[i]`
/// child filled by `read_item`.
fn read_table(
    r: &mut Reader<'_>,
    name: &str,
    offset: u32,
    size: u32,
    mut read_item: impl FnMut(&mut Reader<'_>, &mut Node, u32) -> Result<(), DecodeError>,
) -> Result<Node, DecodeError>
{
    if size == 0
    {
        return Ok(Draft::leaf(name, offset as usize, 0, "0 items"));
    }
    r.seek(offset as usize).context(|| name.to_string())?;
    let mut table = Draft::open(name, r);
    for i in 0..size
    {
        let mut item = Draft::open(format!("[{}]", i), r);
        read_item(r, &mut item, i).context(|| format!("{}[{}]", name, i))?;
        item.close(r);
        trace!("{}[{}] at {:#x}", name, i, item.offset());
        table.push(item);
    }
    table.close(r);
    table.describe(format!("{} items", size));
    Ok(table)
}

/// An id of `width` bytes into the `kind` table.
fn index(node: &mut Node, r: &mut Reader<'_>, name: &str, kind: IdKind, width: u8) -> Result<u32, DecodeError>
{
    let offset = r.position();
    let idx = r.read_uint(width)? as u32;
    node.push(Draft::deferred(name, offset, width as usize, move |t: &DexTables| t.show_index(kind, idx)));
    Ok(idx)
}

/// A u4 id where `NO_INDEX` means absent.
fn optional_index(node: &mut Node, r: &mut Reader<'_>, name: &str, kind: IdKind) -> Result<u32, DecodeError>
{
    let offset = r.position();
    let idx = r.read_u4()?;
    if idx == NO_INDEX
    {
        node.push(Draft::leaf(name, offset, 4, "none"));
    }
    else
    {
        node.push(Draft::deferred(name, offset, 4, move |t: &DexTables| t.show_index(kind, idx)));
    }
    Ok(idx)
}

/// `string_data_item`: uleb128 utf16 length, then MUTF-8 bytes and a NUL.
fn read_string_data(r: &mut Reader<'_>, clip_len: usize) -> Result<(Node, String), DecodeError>
{
    let mut node = Draft::open("string_data", r);
    let utf16_size = node.field(r, "utf16_size", Reader::read_uleb128, u32::to_string)?;
    let offset = r.position();
    let bytes = r.read_cstring()?;
    let s = decode_mutf8(bytes, offset)?;
    node.push(Draft::leaf("data", offset, bytes.len() + 1, clip(&s, clip_len)));
    node.close(r);

    if s.encode_utf16().count() != utf16_size as usize
    {
        warn!("String at {:#x} declares {} UTF-16 units, found {}", offset, utf16_size, s.encode_utf16().count());
    }
    Ok((node, s))
}

/// `type_list`: u4 size followed by u2 type ids.
fn read_type_list(r: &mut Reader<'_>, name: &str) -> Result<(Node, Vec<u32>), DecodeError>
{
    let mut node = Draft::open(name, r);
    let size = node.u4(r, "size")?;
    let mut types = Vec::new();
    for i in 0..size
    {
        types.push(index(&mut node, r, &format!("[{}]", i), IdKind::Type, 2)?);
    }
    node.close(r);
    let list = types.clone();
    node.describe_with(move |t| {
        let names = list.iter().map(|idx| t.type_name(*idx)).collect::<Result<Vec<_>, _>>()?;
        Ok(names.join(", "))
    });
    Ok((node, types))
}

fn read_map_list(r: &mut Reader<'_>, offset: u32) -> Result<Node, DecodeError>
{
    r.seek(offset as usize)?;
    let mut list = Draft::open("map_list", r);
    let size = list.u4(r, "size")?;
    for i in 0..size
    {
        let mut item = Draft::open(format!("[{}]", i), r);
        let item_type = item.field(r, "type", Reader::read_u2, |t| {
            format!("{:#06x} ({})", t, map_item_type_name(*t).unwrap_or("unknown"))
        })?;
        item.u2(r, "unused")?;
        let count = item.u4(r, "size")?;
        let item_offset = item.offset_u4(r, "offset")?;
        item.close(r);

        let type_name = match map_item_type_name(item_type)
        {
            Some(name) => name,
            None =>
            {
                warn!("Unknown map item type {:#06x} in map_list[{}]", item_type, i);
                "unknown"
            }
        };
        item.describe(format!("{} x {} at {:#x}", type_name, count, item_offset));
        list.push(item);
    }
    list.close(r);
    list.describe(format!("{} items", size));
    Ok(list)
}
