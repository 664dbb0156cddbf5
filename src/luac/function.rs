//! Lua 5.3 function prototypes.
//!
//! A prototype lists its code before the constants and debug info the
//! instructions refer to, so each prototype is finished against its own
//! [`FunctionInfo`] once it has been read completely. Nested prototypes are
//! finished first and carried into the parent as plain text.

use std::fmt;

use log::{debug, trace};

use crate::component::{Component, Draft};
use crate::error::{Context, DecodeError};
use crate::luac::instruction::read_instruction;
use crate::luac::{read_count, read_int, read_number, read_string, Layout};
use crate::options::{clip, DecodeOptions};
use crate::reader::Reader;

const LUA_TNIL: u8 = 0;
const LUA_TBOOLEAN: u8 = 1;
const LUA_TNUMFLT: u8 = 3;
const LUA_TSHRSTR: u8 = 4;
const LUA_TNUMINT: u8 = 3 | (1 << 4);
const LUA_TLNGSTR: u8 = 4 | (1 << 4);

fn tag_name(tag: u8) -> &'static str
{
    match tag
    {
        LUA_TNIL => "nil",
        LUA_TBOOLEAN => "boolean",
        LUA_TNUMFLT => "float",
        LUA_TNUMINT => "integer",
        LUA_TSHRSTR => "short string",
        LUA_TLNGSTR => "long string",
        _ => "unknown",
    }
}


#[derive(Debug, Clone, PartialEq)]
pub enum LuaConstant
{
    Nil,
    Boolean(bool),
    Float(f64),
    Integer(i64),
    Str(String),
}

impl fmt::Display for LuaConstant
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self
        {
            LuaConstant::Nil => f.write_str("nil"),
            LuaConstant::Boolean(b) => write!(f, "{}", b),
            LuaConstant::Float(v) => write!(f, "{:?}", v),
            LuaConstant::Integer(v) => write!(f, "{}", v),
            LuaConstant::Str(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar
{
    pub name: String,
    pub start_pc: u64,
    pub end_pc: u64,
}


/// What the instructions of one prototype are described against.
#[derive(Debug, Default)]
pub struct FunctionInfo
{
    pub constants: Vec<LuaConstant>,
    pub locvars: Vec<LocalVar>,
    pub upvalue_names: Vec<String>,
    pub lineinfo: Vec<i64>,
    /// descriptions of the nested prototypes
    pub protos: Vec<String>,
    pub(crate) clip_len: usize,
}

impl FunctionInfo
{
    pub fn constant(&self, idx: u32) -> Result<&LuaConstant, DecodeError>
    {
        self.constants.get(idx as usize).ok_or_else(|| {
            err!(InvalidConstantReference, 0, "Constant {} out of range ({} constants)", idx, self.constants.len())
        })
    }

    /// `Kst(2) -> "print"`
    pub(crate) fn show_constant(&self, idx: u32) -> Result<String, DecodeError>
    {
        Ok(format!("Kst({}) -> {}", idx, clip(&self.constant(idx)?.to_string(), self.clip_len)))
    }

    pub(crate) fn show_proto(&self, idx: u32) -> Result<String, DecodeError>
    {
        match self.protos.get(idx as usize)
        {
            Some(desc) => Ok(format!("protos[{}] -> {}", idx, desc)),
            None => Err(err!(InvalidConstantReference, 0, "Prototype {} out of range ({} protos)", idx, self.protos.len())),
        }
    }

    /// Name of the `reg`-th active local at `pc`, counting locals whose
    /// scope `[start_pc, end_pc)` covers `pc` in declaration order.
    pub fn local_name(&self, reg: u32, pc: usize) -> Option<&str>
    {
        let pc = pc as u64;
        let mut remaining = reg as usize + 1;
        for var in self.locvars.iter().take_while(|v| v.start_pc <= pc)
        {
            if pc < var.end_pc
            {
                remaining -= 1;
                if remaining == 0
                {
                    return Some(&var.name);
                }
            }
        }
        None
    }

    /// `R(3) -> count`, or just `R(3)` without debug info.
    pub fn register(&self, reg: u32, pc: usize) -> String
    {
        match self.local_name(reg, pc)
        {
            Some(name) => format!("R({}) -> {}", reg, name),
            None => format!("R({})", reg),
        }
    }

    pub fn upvalue(&self, idx: u32) -> String
    {
        match self.upvalue_names.get(idx as usize)
        {
            Some(name) => format!("U({}) -> {}", idx, name),
            None => format!("U({})", idx),
        }
    }

    pub fn line(&self, pc: usize) -> Option<i64>
    {
        self.lineinfo.get(pc).copied()
    }
}


type Node = Draft<FunctionInfo>;

/// A Lua string as a leaf; `null` when the dump stores no string.
fn string_field(node: &mut Node, r: &mut Reader<'_>, layout: &Layout, name: &str, clip_len: usize) -> Result<Option<String>, DecodeError>
{
    let offset = r.position();
    let s = read_string(r, layout)?.map(|b| String::from_utf8_lossy(b).into_owned());
    let desc = match &s
    {
        Some(s) => clip(&format!("{:?}", s), clip_len),
        None => "null".to_string(),
    };
    node.push(Draft::leaf(name, offset, r.position() - offset, desc));
    Ok(s)
}

fn count(node: &mut Node, r: &mut Reader<'_>, layout: &Layout, name: &str) -> Result<u64, DecodeError>
{
    node.field(r, name, |r| read_count(r, layout), u64::to_string)
}

/// Reads one prototype and its nested prototypes. `parent_source` stands in
/// for a stripped source name.
pub(crate) fn read_function(
    r: &mut Reader<'_>,
    layout: &Layout,
    options: &DecodeOptions,
    name: &str,
    parent_source: &str,
    depth: usize,
) -> Result<Component, DecodeError>
{
    if depth > options.max_nesting
    {
        fail!(NestingTooDeep, r.position(), "Function prototypes nested deeper than {}", options.max_nesting);
    }
    let clip_len = options.max_description_len;
    let mut node: Node = Draft::open(name, r);
    let mut info = FunctionInfo { clip_len, ..FunctionInfo::default() };

    let source = string_field(&mut node, r, layout, "source", clip_len)?.unwrap_or_else(|| parent_source.to_string());
    let line_defined = node.field(r, "linedefined", |r| read_int(r, layout.int_size), i64::to_string)?;
    let last_line = node.field(r, "lastlinedefined", |r| read_int(r, layout.int_size), i64::to_string)?;
    node.u1(r, "numparams")?;
    node.u1(r, "is_vararg")?;
    node.u1(r, "maxstacksize")?;

    let mut code = Draft::open("code", r);
    let code_size = count(&mut code, r, layout, "sizecode")?;
    for pc in 0..code_size as usize
    {
        code.push(read_instruction(r, pc).context(|| format!("code[{}]", pc))?);
    }
    code.close(r);
    node.push(code);

    let mut constants = Draft::open("constants", r);
    let size = count(&mut constants, r, layout, "sizek")?;
    for i in 0..size
    {
        let mut entry = Draft::open(format!("[{}]", i), r);
        let tag_offset = r.position();
        let tag = entry.field(r, "tag", Reader::read_u1, |t| format!("{} ({})", t, tag_name(*t)))?;
        let constant = match tag
        {
            LUA_TNIL => LuaConstant::Nil,
            LUA_TBOOLEAN => LuaConstant::Boolean(entry.u1(r, "value")? != 0),
            LUA_TNUMFLT => LuaConstant::Float(entry.field(r, "value", |r| read_number(r, layout.number_size), |v| {
                format!("{:?}", v)
            })?),
            LUA_TNUMINT => LuaConstant::Integer(entry.field(r, "value", |r| read_int(r, layout.integer_size), i64::to_string)?),
            LUA_TSHRSTR | LUA_TLNGSTR =>
            {
                LuaConstant::Str(string_field(&mut entry, r, layout, "value", clip_len)?.unwrap_or_default())
            }
            other => fail!(UnsupportedConstantTag, tag_offset, "Unsupported Lua constant tag {} in constant {}", other, i),
        };
        entry.close(r);
        entry.describe(clip(&constant.to_string(), clip_len));
        trace!("constant {} {}", i, constant);
        info.constants.push(constant);
        constants.push(entry);
    }
    constants.close(r);
    node.push(constants);

    let mut upvalues = Draft::open("upvalues", r);
    let size = count(&mut upvalues, r, layout, "sizeupvalues")?;
    for i in 0..size
    {
        let mut entry = Draft::open(format!("[{}]", i), r);
        let instack = entry.u1(r, "instack")?;
        let idx = entry.u1(r, "idx")?;
        entry.close(r);
        let place = if instack != 0 { "register" } else { "upvalue" };
        entry.describe(format!("{} {} of the enclosing function", place, idx));
        upvalues.push(entry);
    }
    upvalues.close(r);
    node.push(upvalues);

    let mut protos = Draft::open("protos", r);
    let size = count(&mut protos, r, layout, "sizep")?;
    for i in 0..size
    {
        let child_name = format!("[{}]", i);
        let child = read_function(r, layout, options, &child_name, &source, depth + 1)
            .context(|| format!("protos{}", child_name))?;
        info.protos.push(child.description().to_string());
        protos.push(Draft::from(child));
    }
    protos.close(r);
    node.push(protos);

    read_debug(r, layout, &mut node, &mut info)?;
    node.close(r);

    let kind = if line_defined == 0 { "main" } else { "function" };
    let short_source = source.strip_prefix(['@', '=']).unwrap_or(&source);
    node.describe(format!(
        "{} <{}:{},{}> ({} instructions)",
        kind,
        clip(short_source, clip_len),
        line_defined,
        last_line,
        code_size
    ));
    debug!("decoded Lua function {} at depth {}", name, depth);
    node.finish(&info)
}

fn read_debug(r: &mut Reader<'_>, layout: &Layout, node: &mut Node, info: &mut FunctionInfo) -> Result<(), DecodeError>
{
    let clip_len = info.clip_len;
    let mut debug = Draft::open("debug", r);

    let mut lineinfo = Draft::open("lineinfo", r);
    let size = count(&mut lineinfo, r, layout, "sizelineinfo")?;
    for i in 0..size
    {
        let line = lineinfo.field(r, &format!("[{}]", i), |r| read_int(r, layout.int_size), i64::to_string)?;
        info.lineinfo.push(line);
    }
    lineinfo.close(r);
    debug.push(lineinfo);

    let mut locvars = Draft::open("locvars", r);
    let size = count(&mut locvars, r, layout, "sizelocvars")?;
    for i in 0..size
    {
        let mut entry = Draft::open(format!("[{}]", i), r);
        let name = string_field(&mut entry, r, layout, "varname", clip_len)?.unwrap_or_default();
        let start_pc = entry.field(r, "startpc", |r| read_count(r, layout), u64::to_string)?;
        let end_pc = entry.field(r, "endpc", |r| read_count(r, layout), u64::to_string)?;
        entry.close(r);
        entry.describe(format!("{} [{}, {})", name, start_pc, end_pc));
        info.locvars.push(LocalVar { name, start_pc, end_pc });
        locvars.push(entry);
    }
    locvars.close(r);
    debug.push(locvars);

    let mut names = Draft::open("upvalue_names", r);
    let size = count(&mut names, r, layout, "sizeupvalues")?;
    for i in 0..size
    {
        let name = string_field(&mut names, r, layout, &format!("[{}]", i), clip_len)?.unwrap_or_default();
        info.upvalue_names.push(name);
    }
    names.close(r);
    debug.push(names);

    debug.close(r);
    node.push(debug);
    Ok(())
}
