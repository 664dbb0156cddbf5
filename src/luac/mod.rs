//! Lua 5.3 binary chunk (`luac.out`) decoder.
//!
//! The header declares the byte widths of C `int`, `size_t`, `Instruction`,
//! `lua_Integer` and `lua_Number`; the byte order is taken from how the
//! `LUAC_INT` check value reads back.

pub mod function;
pub mod instruction;

use log::{debug, warn};

use crate::component::{Component, Draft};
use crate::error::{Context, DecodeError};
use crate::options::DecodeOptions;
use crate::reader::{Endian, Reader};

use function::read_function;

pub use function::{FunctionInfo, LocalVar, LuaConstant};

pub const LUA_SIGNATURE: &[u8; 4] = b"\x1bLua";
pub const LUAC_VERSION: u8 = 0x53;
pub const LUAC_FORMAT: u8 = 0;
pub const LUAC_DATA: &[u8; 6] = b"\x19\x93\r\n\x1a\n";
pub const LUAC_INT: u64 = 0x5678;
pub const LUAC_NUM: f64 = 370.5;


/// Type widths declared by a chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout
{
    pub int_size: u8,
    pub size_t_size: u8,
    pub instruction_size: u8,
    pub integer_size: u8,
    pub number_size: u8,
}

/// Sign-extends an integer of `width` bytes.
pub(crate) fn read_int(r: &mut Reader<'_>, width: u8) -> Result<i64, DecodeError>
{
    let v = r.read_uint(width)?;
    Ok(match width
    {
        1 => v as u8 as i8 as i64,
        2 => v as u16 as i16 as i64,
        4 => v as u32 as i32 as i64,
        _ => v as i64,
    })
}

/// A C `int` used as an element count or pc; negative values are rejected.
pub(crate) fn read_count(r: &mut Reader<'_>, layout: &Layout) -> Result<u64, DecodeError>
{
    let offset = r.position();
    let v = read_int(r, layout.int_size)?;
    if v < 0
    {
        fail!(UnsupportedLayout, offset, "Negative count {}", v);
    }
    Ok(v as u64)
}

pub(crate) fn read_number(r: &mut Reader<'_>, width: u8) -> Result<f64, DecodeError>
{
    match width
    {
        4 => Ok(r.read_f4()? as f64),
        8 => r.read_f8(),
        _ => fail!(UnsupportedLayout, r.position(), "Unsupported lua_Number width {}", width),
    }
}

/// A dumped string: a size byte (0xFF escapes to a `size_t`) holding the
/// length plus one, 0 meaning no string.
pub(crate) fn read_string<'a>(r: &mut Reader<'a>, layout: &Layout) -> Result<Option<&'a [u8]>, DecodeError>
{
    let offset = r.position();
    let mut size = r.read_u1()? as u64;
    if size == 0xFF
    {
        size = r.read_uint(layout.size_t_size)?;
    }
    if size == 0
    {
        return Ok(None);
    }
    let len = usize::try_from(size - 1)
        .map_err(|_| err!(UnexpectedEndOfBuffer, offset, "String of {} bytes exceeds the buffer", size - 1))?;
    Ok(Some(r.read_bytes(len)?))
}

fn check_width(offset: usize, what: &str, width: u8, allowed: &[u8]) -> Result<(), DecodeError>
{
    if !allowed.contains(&width)
    {
        fail!(UnsupportedLayout, offset, "Unsupported {} width {}", what, width);
    }
    Ok(())
}

fn read_header(r: &mut Reader<'_>, node: &mut Draft<FunctionInfo>) -> Result<Layout, DecodeError>
{
    let signature = node.bytes(r, "signature", 4)?;
    if signature != LUA_SIGNATURE
    {
        fail!(BadMagic, 0, "Not a Lua chunk, signature is {:02x?}", signature);
    }

    let version_offset = r.position();
    let version = node.field(r, "version", Reader::read_u1, |v| format!("{:#04x}", v))?;
    if version != LUAC_VERSION
    {
        fail!(UnsupportedLayout, version_offset, "Lua version {:#04x} is not 5.3", version);
    }
    let format = node.u1(r, "format")?;
    if format != LUAC_FORMAT
    {
        warn!("Non-standard Lua chunk format {}", format);
    }
    let data_offset = r.position();
    let data = node.bytes(r, "luac_data", LUAC_DATA.len())?;
    if data != LUAC_DATA
    {
        fail!(UnsupportedLayout, data_offset, "Corrupted chunk, LUAC_DATA is {:02x?}", data);
    }

    let sizes_offset = r.position();
    let layout = Layout {
        int_size: node.u1(r, "cint_size")?,
        size_t_size: node.u1(r, "size_t_size")?,
        instruction_size: node.u1(r, "instruction_size")?,
        integer_size: node.u1(r, "lua_integer_size")?,
        number_size: node.u1(r, "lua_number_size")?,
    };
    check_width(sizes_offset, "int", layout.int_size, &[2, 4, 8])?;
    check_width(sizes_offset + 1, "size_t", layout.size_t_size, &[4, 8])?;
    check_width(sizes_offset + 2, "Instruction", layout.instruction_size, &[4])?;
    check_width(sizes_offset + 3, "lua_Integer", layout.integer_size, &[4, 8])?;
    check_width(sizes_offset + 4, "lua_Number", layout.number_size, &[4, 8])?;

    // the check integer decides the byte order of everything after it
    let int_offset = r.position();
    let raw = r.read_bytes(layout.integer_size as usize)?;
    let endian = if Reader::new(raw, Endian::Little).read_uint(layout.integer_size)? == LUAC_INT
    {
        Endian::Little
    }
    else if Reader::new(raw, Endian::Big).read_uint(layout.integer_size)? == LUAC_INT
    {
        Endian::Big
    }
    else
    {
        fail!(UnsupportedLayout, int_offset, "LUAC_INT check value not found, got {:02x?}", raw);
    };
    r.set_endian(endian);
    node.push(Draft::leaf("luac_int", int_offset, raw.len(), format!("{:#x} ({:?} endian)", LUAC_INT, endian)));

    let num_offset = r.position();
    let num = node.field(r, "luac_num", |r| read_number(r, layout.number_size), |v| v.to_string())?;
    if num != LUAC_NUM
    {
        fail!(UnsupportedLayout, num_offset, "LUAC_NUM check value is {}, expected {}", num, LUAC_NUM);
    }
    Ok(layout)
}

/// Decodes a complete precompiled Lua 5.3 chunk.
pub fn decode(bytes: &[u8], options: &DecodeOptions) -> Result<Component, DecodeError>
{
    let mut r = Reader::new(bytes, Endian::Little);
    let mut root: Draft<FunctionInfo> = Draft::open("LuacFile", &r);

    let mut header = Draft::open("header", &r);
    let layout = read_header(&mut r, &mut header).context(|| "header")?;
    header.close(&r);
    root.push(header);
    debug!("Lua chunk layout {:?}", layout);

    root.u1(&mut r, "sizeupvalues")?;
    let main = read_function(&mut r, &layout, options, "main", "=?", 0).context(|| "main")?;
    let description = main.description().to_string();
    root.push(Draft::from(main));

    if r.remaining() != 0
    {
        warn!("{} trailing bytes after the main function", r.remaining());
    }
    root.close(&r);
    root.describe(description);
    root.finish(&FunctionInfo::default())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// 64-bit desktop Lua.
    const STOCK: Layout =
        Layout { int_size: 4, size_t_size: 8, instruction_size: 4, integer_size: 8, number_size: 8 };

    #[test]
    fn strings_escape_long_sizes() {
        let layout = STOCK;
        let bytes = [0x00, 0x03, b'h', b'i', 0xff, 3, 0, 0, 0, 0, 0, 0, 0, b'y', b'o'];
        let mut r = Reader::new(&bytes, Endian::Little);
        assert_eq!(read_string(&mut r, &layout), Ok(None));
        assert_eq!(read_string(&mut r, &layout), Ok(Some(&b"hi"[..])));
        assert_eq!(read_string(&mut r, &layout), Ok(Some(&b"yo"[..])));
    }

    #[test]
    fn signed_ints_by_width() {
        let bytes = [0xff, 0xff, 0xff, 0xff];
        assert_eq!(read_int(&mut Reader::new(&bytes, Endian::Little), 4), Ok(-1));
        assert_eq!(read_int(&mut Reader::new(&bytes, Endian::Little), 2), Ok(-1));
        let e = read_count(&mut Reader::new(&bytes, Endian::Little), &STOCK).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::UnsupportedLayout);
    }

    #[test]
    fn rejects_other_signatures() {
        let e = decode(b"\x1bLub\x53\x00", &DecodeOptions::default()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::BadMagic);
    }
}
