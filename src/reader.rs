/* Sequential byte cursor shared by all decoders */


use crate::error::DecodeError;
use crate::leb::decode_uleb128;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endian
{
    Big,
    Little,
}

/// Position-tracked reader over an immutable buffer. Positions are absolute
/// offsets into the buffer, also for windows created with [`Reader::window`].
#[derive(Debug)]
pub(crate) struct Reader<'a>
{
    bytes: &'a [u8],
    ix: usize,
    end: usize,
    endian: Endian,
}

impl<'a> Reader<'a>
{
    pub(crate) fn new(bytes: &'a [u8], endian: Endian) -> Self
    {
        Reader { bytes, ix: 0, end: bytes.len(), endian }
    }

    pub(crate) fn position(&self) -> usize
    {
        self.ix
    }

    pub(crate) fn remaining(&self) -> usize
    {
        self.end - self.ix
    }

    pub(crate) fn set_endian(&mut self, endian: Endian)
    {
        self.endian = endian;
    }

    pub(crate) fn seek(&mut self, pos: usize) -> Result<(), DecodeError>
    {
        if pos > self.end
        {
            fail!(UnexpectedEndOfBuffer, self.ix, "Seek to {:#x} beyond end of buffer ({:#x})", pos, self.end);
        }
        self.ix = pos;
        Ok(())
    }

    /// Runs `f` with the cursor moved to `pos`, then restores the position.
    pub(crate) fn at<T>(
        &mut self,
        pos: usize,
        f: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError>
    {
        let saved = self.ix;
        self.seek(pos)?;
        let result = f(self);
        self.ix = saved;
        result
    }

    /// A reader limited to the next `length` bytes. The parent does not move.
    pub(crate) fn window(&self, length: usize) -> Result<Reader<'a>, DecodeError>
    {
        if length > self.remaining()
        {
            fail!(UnexpectedEndOfBuffer, self.ix, "Region of {} bytes exceeds the {} remaining", length, self.remaining());
        }
        Ok(Reader { bytes: self.bytes, ix: self.ix, end: self.ix + length, endian: self.endian })
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), DecodeError>
    {
        self.read_bytes(n).map(|_| ())
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError>
    {
        if n > self.remaining()
        {
            fail!(UnexpectedEndOfBuffer, self.ix, "Unexpected end of buffer reading {} bytes ({} available)", n, self.remaining());
        }
        let result = &self.bytes[self.ix..self.ix + n];
        self.ix += n;
        Ok(result)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError>
    {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub(crate) fn read_u1(&mut self) -> Result<u8, DecodeError>
    {
        Ok(self.read_array::<1>()?[0])
    }

    pub(crate) fn read_u2(&mut self) -> Result<u16, DecodeError>
    {
        let b = self.read_array()?;
        Ok(match self.endian { Endian::Big => u16::from_be_bytes(b), Endian::Little => u16::from_le_bytes(b) })
    }

    pub(crate) fn read_u4(&mut self) -> Result<u32, DecodeError>
    {
        let b = self.read_array()?;
        Ok(match self.endian { Endian::Big => u32::from_be_bytes(b), Endian::Little => u32::from_le_bytes(b) })
    }

    pub(crate) fn read_u8(&mut self) -> Result<u64, DecodeError>
    {
        let b = self.read_array()?;
        Ok(match self.endian { Endian::Big => u64::from_be_bytes(b), Endian::Little => u64::from_le_bytes(b) })
    }

    pub(crate) fn read_i1(&mut self) -> Result<i8, DecodeError>
    {
        Ok(self.read_u1()? as i8)
    }

    pub(crate) fn read_i2(&mut self) -> Result<i16, DecodeError>
    {
        Ok(self.read_u2()? as i16)
    }

    pub(crate) fn read_i4(&mut self) -> Result<i32, DecodeError>
    {
        Ok(self.read_u4()? as i32)
    }

    pub(crate) fn read_f4(&mut self) -> Result<f32, DecodeError>
    {
        Ok(f32::from_bits(self.read_u4()?))
    }

    pub(crate) fn read_f8(&mut self) -> Result<f64, DecodeError>
    {
        Ok(f64::from_bits(self.read_u8()?))
    }

    /// Reads an unsigned integer whose width is only known at run time.
    pub(crate) fn read_uint(&mut self, width: u8) -> Result<u64, DecodeError>
    {
        match width
        {
            1 => Ok(self.read_u1()? as u64),
            2 => Ok(self.read_u2()? as u64),
            4 => Ok(self.read_u4()? as u64),
            8 => self.read_u8(),
            _ => fail!(UnsupportedLayout, self.ix, "Unsupported integer width {}", width),
        }
    }

    pub(crate) fn read_uleb128(&mut self) -> Result<u32, DecodeError>
    {
        match decode_uleb128(&self.bytes[self.ix..self.end])
        {
            Some((val, size)) =>
            {
                self.ix += size;
                Ok(val)
            }
            None => fail!(UnexpectedEndOfBuffer, self.ix, "Unterminated uleb128"),
        }
    }

    /// Reads up to a NUL byte; the terminator is consumed but not returned.
    pub(crate) fn read_cstring(&mut self) -> Result<&'a [u8], DecodeError>
    {
        let rest = &self.bytes[self.ix..self.end];
        match rest.iter().position(|b| *b == 0)
        {
            Some(len) =>
            {
                self.ix += len + 1;
                Ok(&rest[..len])
            }
            None => fail!(UnexpectedEndOfBuffer, self.ix, "Unterminated string"),
        }
    }
}

/// Decodes Modified UTF-8 as used by class file `Utf8` entries and dex
/// string data.
pub(crate) fn decode_mutf8(bytes: &[u8], offset: usize) -> Result<String, DecodeError>
{
    match cesu8::from_java_cesu8(bytes)
    {
        Ok(s) => Ok(s.into_owned()),
        Err(_) => fail!(MalformedString, offset, "Invalid modified UTF-8 in {} byte string", bytes.len()),
    }
}
