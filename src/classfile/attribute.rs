//! Attributes, dispatched on their resolved name. Names without a decoder
//! keep their bytes as an opaque `info` blob.

use std::collections::HashMap;

use log::debug;
use once_cell::sync::Lazy;

use crate::access::{AccessFlags, FlagTarget};
use crate::classfile::bytecode::read_code;
use crate::classfile::constant::{cp_index, cp_index_or, ConstantPool};
use crate::component::Draft;
use crate::error::{Context, DecodeError};
use crate::reader::Reader;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    ConstantValue,
    Code,
    Exceptions,
    SourceFile,
    Signature,
    LineNumberTable,
    LocalVariableTable,
    LocalVariableTypeTable,
    InnerClasses,
    EnclosingMethod,
    Deprecated,
    Synthetic,
    BootstrapMethods,
    MethodParameters,
}

static ATTRIBUTES: Lazy<HashMap<&'static str, AttributeKind>> = Lazy::new(|| {
    HashMap::from([
        ("ConstantValue", AttributeKind::ConstantValue),
        ("Code", AttributeKind::Code),
        ("Exceptions", AttributeKind::Exceptions),
        ("SourceFile", AttributeKind::SourceFile),
        ("Signature", AttributeKind::Signature),
        ("LineNumberTable", AttributeKind::LineNumberTable),
        ("LocalVariableTable", AttributeKind::LocalVariableTable),
        ("LocalVariableTypeTable", AttributeKind::LocalVariableTypeTable),
        ("InnerClasses", AttributeKind::InnerClasses),
        ("EnclosingMethod", AttributeKind::EnclosingMethod),
        ("Deprecated", AttributeKind::Deprecated),
        ("Synthetic", AttributeKind::Synthetic),
        ("BootstrapMethods", AttributeKind::BootstrapMethods),
        ("MethodParameters", AttributeKind::MethodParameters),
    ])
});

impl AttributeKind {
    pub fn from_name(name: &str, offset: usize) -> Result<AttributeKind, DecodeError> {
        match ATTRIBUTES.get(name) {
            Some(kind) => Ok(*kind),
            None => Err(err!(UnsupportedAttributeName, offset, "No decoder for attribute {}", name)),
        }
    }
}

type Node = Draft<ConstantPool>;

/// Reads `attributes_count` followed by the attributes into `parent`.
pub(crate) fn read_attributes(r: &mut Reader<'_>, parent: &mut Node, pool: &ConstantPool) -> Result<(), DecodeError> {
    let count = parent.u2(r, "attributes_count")?;
    let mut table = Draft::open("attributes", r);
    for i in 0..count {
        let attribute = read_attribute(r, pool).context(|| format!("attributes[{}]", i))?;
        table.push(attribute);
    }
    table.close(r);
    table.describe(format!("{} entries", count));
    parent.push(table);
    Ok(())
}

fn read_attribute(r: &mut Reader<'_>, pool: &ConstantPool) -> Result<Node, DecodeError> {
    let start = r.position();
    let mut node = Draft::open("attribute", r);
    let name_index = cp_index(&mut node, r, "attribute_name_index")?;
    let name = pool.utf8(name_index).map_err(|e| e.at(start))?.to_string();
    let length = node.u4(r, "attribute_length")? as usize;

    match AttributeKind::from_name(&name, start) {
        Ok(kind) => {
            let mut body = r.window(length)?;
            read_body(kind, &mut body, &mut node, pool)?;
            if body.remaining() != 0 {
                fail!(
                    LengthMismatch,
                    start,
                    "{} attribute declares {} bytes but its contents take {}",
                    name,
                    length,
                    length - body.remaining()
                );
            }
            r.skip(length)?;
        }
        Err(e) => {
            debug!("{}, keeping {} raw bytes", e, length);
            node.bytes(r, "info", length)?;
        }
    }

    node.close(r);
    node.rename(name);
    Ok(node)
}

fn read_body(kind: AttributeKind, r: &mut Reader<'_>, node: &mut Node, pool: &ConstantPool) -> Result<(), DecodeError> {
    match kind {
        AttributeKind::ConstantValue => {
            let index = cp_index(node, r, "constantvalue_index")?;
            node.describe_with(move |cp| cp.describe(index));
        }
        AttributeKind::SourceFile => {
            let index = cp_index(node, r, "sourcefile_index")?;
            node.describe_with(move |cp| Ok(cp.utf8(index)?.to_string()));
        }
        AttributeKind::Signature => {
            let index = cp_index(node, r, "signature_index")?;
            node.describe_with(move |cp| Ok(cp.utf8(index)?.to_string()));
        }
        AttributeKind::Code => read_code_attribute(r, node, pool)?,
        AttributeKind::Exceptions => {
            let count = node.u2(r, "number_of_exceptions")?;
            let mut table = Draft::open("exception_index_table", r);
            for i in 0..count {
                cp_index(&mut table, r, &format!("[{}]", i))?;
            }
            table.close(r);
            node.push(table);
        }
        AttributeKind::LineNumberTable => {
            let count = node.u2(r, "line_number_table_length")?;
            let mut table = Draft::open("line_number_table", r);
            for i in 0..count {
                let mut entry = Draft::open(format!("[{}]", i), r);
                let pc = entry.u2(r, "start_pc")?;
                let line = entry.u2(r, "line_number")?;
                entry.close(r);
                entry.describe(format!("line {} at pc {}", line, pc));
                table.push(entry);
            }
            table.close(r);
            node.push(table);
        }
        AttributeKind::LocalVariableTable | AttributeKind::LocalVariableTypeTable => {
            let (count_name, table_name, type_name) = if kind == AttributeKind::LocalVariableTable {
                ("local_variable_table_length", "local_variable_table", "descriptor_index")
            } else {
                ("local_variable_type_table_length", "local_variable_type_table", "signature_index")
            };
            let count = node.u2(r, count_name)?;
            let mut table = Draft::open(table_name, r);
            for i in 0..count {
                let mut entry = Draft::open(format!("[{}]", i), r);
                entry.u2(r, "start_pc")?;
                entry.u2(r, "length")?;
                let name_index = cp_index(&mut entry, r, "name_index")?;
                let type_index = cp_index(&mut entry, r, type_name)?;
                let slot = entry.u2(r, "index")?;
                entry.close(r);
                entry.describe_with(move |cp| {
                    Ok(format!("slot {}: {} {}", slot, cp.utf8(type_index)?, cp.utf8(name_index)?))
                });
                table.push(entry);
            }
            table.close(r);
            node.push(table);
        }
        AttributeKind::InnerClasses => {
            let count = node.u2(r, "number_of_classes")?;
            let mut table = Draft::open("classes", r);
            for i in 0..count {
                let mut entry = Draft::open(format!("[{}]", i), r);
                let inner = cp_index(&mut entry, r, "inner_class_info_index")?;
                cp_index_or(&mut entry, r, "outer_class_info_index", "none")?;
                cp_index_or(&mut entry, r, "inner_name_index", "anonymous")?;
                entry.field(r, "inner_class_access_flags", Reader::read_u2, |f| {
                    AccessFlags::from_bits_retain(*f as u32).describe(FlagTarget::InnerClass)
                })?;
                entry.close(r);
                entry.describe_with(move |cp| Ok(cp.class_name(inner)?.to_string()));
                table.push(entry);
            }
            table.close(r);
            node.push(table);
        }
        AttributeKind::EnclosingMethod => {
            let class = cp_index(node, r, "class_index")?;
            let method = cp_index_or(node, r, "method_index", "none")?;
            node.describe_with(move |cp| {
                let class = cp.class_name(class)?;
                if method == 0 {
                    return Ok(class.to_string());
                }
                let (name, descriptor) = cp.name_and_type(method)?;
                Ok(format!("{}.{}:{}", class, name, descriptor))
            });
        }
        AttributeKind::Deprecated | AttributeKind::Synthetic => {}
        AttributeKind::BootstrapMethods => {
            let count = node.u2(r, "num_bootstrap_methods")?;
            let mut table = Draft::open("bootstrap_methods", r);
            for i in 0..count {
                let mut entry = Draft::open(format!("[{}]", i), r);
                let method_ref = cp_index(&mut entry, r, "bootstrap_method_ref")?;
                let args = entry.u2(r, "num_bootstrap_arguments")?;
                let mut list = Draft::open("bootstrap_arguments", r);
                for j in 0..args {
                    cp_index(&mut list, r, &format!("[{}]", j))?;
                }
                list.close(r);
                entry.push(list);
                entry.close(r);
                entry.describe_with(move |cp| cp.describe(method_ref));
                table.push(entry);
            }
            table.close(r);
            node.push(table);
        }
        AttributeKind::MethodParameters => {
            let count = node.u1(r, "parameters_count")?;
            let mut table = Draft::open("parameters", r);
            for i in 0..count {
                let mut entry = Draft::open(format!("[{}]", i), r);
                let name_index = cp_index_or(&mut entry, r, "name_index", "unnamed")?;
                entry.field(r, "access_flags", Reader::read_u2, |f| {
                    AccessFlags::from_bits_retain(*f as u32).describe(FlagTarget::Parameter)
                })?;
                entry.close(r);
                if name_index != 0 {
                    entry.describe_with(move |cp| Ok(cp.utf8(name_index)?.to_string()));
                }
                table.push(entry);
            }
            table.close(r);
            node.push(table);
        }
    }
    Ok(())
}

fn read_code_attribute(r: &mut Reader<'_>, node: &mut Node, pool: &ConstantPool) -> Result<(), DecodeError> {
    let max_stack = node.u2(r, "max_stack")?;
    let max_locals = node.u2(r, "max_locals")?;
    let code_length = node.u4(r, "code_length")? as usize;
    node.push(read_code(r, code_length)?);

    let count = node.u2(r, "exception_table_length")?;
    let mut table = Draft::open("exception_table", r);
    for i in 0..count {
        let mut entry = Draft::open(format!("[{}]", i), r);
        let start = entry.u2(r, "start_pc")?;
        let end = entry.u2(r, "end_pc")?;
        let handler = entry.u2(r, "handler_pc")?;
        let catch_type = cp_index_or(&mut entry, r, "catch_type", "any")?;
        entry.close(r);
        entry.describe_with(move |cp| {
            let caught = if catch_type == 0 { "any".to_string() } else { cp.class_name(catch_type)?.to_string() };
            Ok(format!("{} in [{}, {}) -> {}", caught, start, end, handler))
        });
        table.push(entry);
    }
    table.close(r);
    node.push(table);

    read_attributes(r, node, pool)?;
    node.describe(format!("max_stack={}, max_locals={}, code_length={}", max_stack, max_locals, code_length));
    Ok(())
}
