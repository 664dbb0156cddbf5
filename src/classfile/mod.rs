//! JVM class file decoder.
//!
//! The tree mirrors the `ClassFile` structure: header fields, the constant
//! pool, interfaces, `fields[i]` / `methods[i]` members and attributes.
//! Every index is rendered through the pool once it is complete.

pub mod attribute;
pub mod bytecode;
pub mod constant;

use log::{debug, warn};

use crate::access::{AccessFlags, FlagTarget};
use crate::component::{Component, Draft};
use crate::descriptor;
use crate::error::{Context, DecodeError};
use crate::options::DecodeOptions;
use crate::reader::{Endian, Reader};

use attribute::read_attributes;
use constant::{cp_index, cp_index_or, read_constant_pool};

pub use constant::{Constant, ConstantPool, ConstantTag};

pub const MAGIC: u32 = 0xCAFE_BABE;

type Node = Draft<ConstantPool>;


/// Decodes a complete class file.
pub fn decode(bytes: &[u8], options: &DecodeOptions) -> Result<Component, DecodeError>
{
    let mut r = Reader::new(bytes, Endian::Big);
    let mut root = Draft::open("ClassFile", &r);

    let magic = root.field(&mut r, "magic", Reader::read_u4, |m| format!("{:#010x}", m))?;
    if magic != MAGIC
    {
        fail!(BadMagic, 0, "Not a class file, magic is {:#010x}", magic);
    }
    let minor = root.u2(&mut r, "minor_version")?;
    let major = root.u2(&mut r, "major_version")?;
    debug!("class file version {}.{}, {} bytes", major, minor, bytes.len());

    let pool = read_constant_pool(&mut r, &mut root, options)?;

    root.field(&mut r, "access_flags", Reader::read_u2, |f| {
        AccessFlags::from_bits_retain(*f as u32).describe(FlagTarget::Class)
    })?;
    let this_class = cp_index(&mut root, &mut r, "this_class")?;
    cp_index_or(&mut root, &mut r, "super_class", "none")?;

    let count = root.u2(&mut r, "interfaces_count")?;
    let mut interfaces = Draft::open("interfaces", &r);
    for i in 0..count
    {
        cp_index(&mut interfaces, &mut r, &format!("[{}]", i))?;
    }
    interfaces.close(&r);
    root.push(interfaces);

    read_members(&mut r, &mut root, &pool, "fields", FlagTarget::Field)?;
    read_members(&mut r, &mut root, &pool, "methods", FlagTarget::Method)?;
    read_attributes(&mut r, &mut root, &pool).context(|| "ClassFile")?;

    if r.remaining() != 0
    {
        warn!("{} trailing bytes after the class file", r.remaining());
    }
    root.close(&r);
    root.describe_with(move |cp| Ok(descriptor::class_name(cp.class_name(this_class)?)));

    let component = root.finish(&pool)?;
    debug!("decoded class {}", component.description());
    Ok(component)
}

fn read_members(
    r: &mut Reader<'_>,
    root: &mut Node,
    pool: &ConstantPool,
    kind: &str,
    target: FlagTarget,
) -> Result<(), DecodeError>
{
    let count = root.u2(r, &format!("{}_count", kind))?;
    let mut table = Draft::open(kind, r);
    for i in 0..count
    {
        let name = format!("{}[{}]", kind, i);
        let member = read_member(r, pool, &name, target).context(|| name.clone())?;
        table.push(member);
    }
    table.close(r);
    table.describe(format!("{} entries", count));
    root.push(table);
    Ok(())
}

/// `field_info` and `method_info` share one layout.
fn read_member(r: &mut Reader<'_>, pool: &ConstantPool, name: &str, target: FlagTarget) -> Result<Node, DecodeError>
{
    let mut node = Draft::open(name, r);
    let flags = node.field(r, "access_flags", Reader::read_u2, |f| {
        AccessFlags::from_bits_retain(*f as u32).describe(target)
    })?;
    let name_index = cp_index(&mut node, r, "name_index")?;
    let descriptor_index = cp_index(&mut node, r, "descriptor_index")?;
    read_attributes(r, &mut node, pool)?;
    node.close(r);

    node.describe_with(move |cp| {
        let declaration = descriptor::declaration(cp.utf8(name_index)?, cp.utf8(descriptor_index)?);
        let mut words: Vec<&str> = AccessFlags::from_bits_retain(flags as u32).modifiers(target);
        words.push(&declaration);
        Ok(words.join(" "))
    });
    Ok(node)
}
