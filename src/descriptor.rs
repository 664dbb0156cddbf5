//! JVM / dex type descriptors (`I`, `[Ljava/lang/String;`, `(IJ)V`) and
//! their Java source spelling.

use std::fmt;

use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, one_of};
use nom::combinator::{all_consuming, map};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Void,
    /// Internal binary name, e.g. `java/lang/String`.
    Object(String),
    Array(Box<FieldType>),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("byte"),
            FieldType::Char => f.write_str("char"),
            FieldType::Double => f.write_str("double"),
            FieldType::Float => f.write_str("float"),
            FieldType::Int => f.write_str("int"),
            FieldType::Long => f.write_str("long"),
            FieldType::Short => f.write_str("short"),
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::Void => f.write_str("void"),
            FieldType::Object(name) => f.write_str(&name.replace('/', ".")),
            FieldType::Array(t) => write!(f, "{}[]", t),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub result: FieldType,
}

impl MethodDescriptor {
    /// Renders a declaration such as `void main(java.lang.String[])`.
    pub fn declaration(&self, name: &str) -> String {
        format!("{} {}({})", self.result, name, self.param_list())
    }

    fn param_list(&self) -> String {
        self.params.iter().map(FieldType::to_string).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.param_list(), self.result)
    }
}

fn primitive(c: char) -> FieldType {
    match c {
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'D' => FieldType::Double,
        'F' => FieldType::Float,
        'I' => FieldType::Int,
        'J' => FieldType::Long,
        'S' => FieldType::Short,
        'Z' => FieldType::Boolean,
        _ => FieldType::Void,
    }
}

fn parse_field_type(input: &str) -> IResult<&str, FieldType> {
    alt((
        map(one_of("BCDFIJSZV"), primitive),
        map(delimited(char('L'), take_while1(|c: char| c != ';'), char(';')), |s: &str| {
            FieldType::Object(s.to_string())
        }),
        map(preceded(char('['), parse_field_type), |t| FieldType::Array(Box::new(t))),
    ))(input)
}

fn parse_method(input: &str) -> IResult<&str, MethodDescriptor> {
    map(
        pair(delimited(char('('), many0(parse_field_type), char(')')), parse_field_type),
        |(params, result)| MethodDescriptor { params, result },
    )(input)
}

pub fn parse_field_descriptor(desc: &str) -> Option<FieldType> {
    all_consuming(parse_field_type)(desc).ok().map(|(_, t)| t)
}

pub fn parse_method_descriptor(desc: &str) -> Option<MethodDescriptor> {
    all_consuming(parse_method)(desc).ok().map(|(_, m)| m)
}

/// Java spelling of a field descriptor; falls back to the raw text.
pub fn java_type(desc: &str) -> String {
    parse_field_descriptor(desc).map(|t| t.to_string()).unwrap_or_else(|| desc.to_string())
}

/// Java spelling of a class constant's name, which is an internal name
/// (`java/lang/Object`) except for array classes (`[I`).
pub fn class_name(internal: &str) -> String {
    if internal.starts_with('[') {
        java_type(internal)
    } else {
        internal.replace('/', ".")
    }
}

/// `name(params) result` or `type name` depending on the descriptor.
pub fn declaration(name: &str, desc: &str) -> String {
    if let Some(m) = parse_method_descriptor(desc) {
        m.declaration(name)
    } else {
        format!("{} {}", java_type(desc), name)
    }
}
