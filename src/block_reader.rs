use crate::error::{Error, Result};
use crate::varint::{from_zigzag32, from_zigzag64};
use crate::wire_type::{decode_field_header, FieldHeader, WireType};

/// A cursor over a borrowed, contiguous block of Protocol Buffers bytes.
///
/// The reader never allocates: bytes and string values are views into the
/// original block and live as long as it does. Reading past the end of the
/// block through a fixed-width or varint primitive is a caller contract
/// violation (the field headers declare how much data follows) and panics;
/// only lengths taken from the wire data itself produce recoverable errors.
///
/// ## Example
///
/// ```
/// use minipbf::{BlockReader, WireType};
///
/// let data = [0x08, 0x96, 0x01]; // field 1, varint 150
/// let mut reader = BlockReader::new(&data);
/// let header = reader.read_field_header().unwrap();
/// assert_eq!(header.field_number, 1);
/// assert_eq!(header.wire_type, WireType::Varint);
/// assert_eq!(reader.read_uint32().unwrap(), 150);
/// assert!(reader.read_field_header().unwrap().is_none());
/// ```
pub struct BlockReader<'a> {
    block: &'a [u8],
    position: usize,
}

impl<'a> BlockReader<'a> {
    /// Creates a reader positioned at the beginning of `block`.
    pub fn new(block: &'a [u8]) -> Self {
        Self { block, position: 0 }
    }

    /// Current read position inside the block.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Remaining bytes to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.block.len() - self.position
    }

    /// True when the whole block has been consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.position == self.block.len()
    }

    #[inline]
    fn next_byte(&mut self) -> u8 {
        let byte = self.block[self.position];
        self.position += 1;
        byte
    }

    fn advance(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(Error::EndOfInput);
        }
        self.position += n;
        Ok(())
    }

    /// Reads the next field header. Returns [`FieldHeader::NONE`] when the
    /// end of the block is reached or the header varint is 0 (field number 0
    /// is never valid on the wire).
    pub fn read_field_header(&mut self) -> Result<FieldHeader> {
        if self.position == self.block.len() {
            return Ok(FieldHeader::NONE);
        }

        let header = self.read_varint32()?;
        if header == 0 {
            return Ok(FieldHeader::NONE);
        }
        decode_field_header(header)
    }

    /// Skips over a field with the given wire type.
    pub fn skip_field(&mut self, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                self.read_varint64()?;
            }
            WireType::Fixed32 => self.advance(4)?,
            WireType::Fixed64 => self.advance(8)?,
            WireType::String => {
                let length = self.read_varint64()?;
                self.advance(length as usize)?;
            }
            other => return Err(Error::UnknownWireType(other as i32)),
        }
        Ok(())
    }

    /// Reads a 4-byte little-endian fixed value.
    #[inline]
    pub fn read_fixed32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.block[self.position..self.position + 4]);
        self.position += 4;
        u32::from_le_bytes(bytes)
    }

    /// Reads an 8-byte little-endian fixed value.
    #[inline]
    pub fn read_fixed64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.block[self.position..self.position + 8]);
        self.position += 8;
        u64::from_le_bytes(bytes)
    }

    /// Reads a 32-bit unsigned integer encoded as a base-128 varint.
    ///
    /// Tolerates the legacy 10-byte form produced by encoders that
    /// sign-extend negative int32 values to 64 bits: when the 5th byte's high
    /// nibble is 0xF0, exactly five more bytes `FF FF FF FF 01` are consumed
    /// and discarded. Any other pattern is a malformed varint.
    pub fn read_varint32(&mut self) -> Result<u32> {
        let mut value = self.next_byte() as u32;
        if value & 0x80 == 0 {
            return Ok(value);
        }
        value &= 0x7f;

        let mut chunk = self.next_byte() as u32;
        value |= (chunk & 0x7f) << 7;
        if chunk & 0x80 == 0 {
            return Ok(value);
        }

        chunk = self.next_byte() as u32;
        value |= (chunk & 0x7f) << 14;
        if chunk & 0x80 == 0 {
            return Ok(value);
        }

        chunk = self.next_byte() as u32;
        value |= (chunk & 0x7f) << 21;
        if chunk & 0x80 == 0 {
            return Ok(value);
        }

        chunk = self.next_byte() as u32;
        value |= chunk << 28; // only 4 bits of this chunk fit
        if chunk & 0xf0 == 0 {
            return Ok(value);
        }

        if chunk & 0xf0 == 0xf0
            && self.next_byte() == 0xff
            && self.next_byte() == 0xff
            && self.next_byte() == 0xff
            && self.next_byte() == 0xff
            && self.next_byte() == 0x01
        {
            return Ok(value);
        }

        Err(Error::MalformedVarint)
    }

    /// Reads a 64-bit unsigned integer encoded as a base-128 varint.
    ///
    /// The 10th byte may only carry the final bit; any other bit set there
    /// is a malformed varint.
    pub fn read_varint64(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..9 {
            let chunk = self.next_byte() as u64;
            value |= (chunk & 0x7f) << (7 * i);
            if chunk & 0x80 == 0 {
                return Ok(value);
            }
        }

        let chunk = self.next_byte() as u64;
        if chunk & !0x01 != 0 {
            return Err(Error::MalformedVarint);
        }
        Ok(value | (chunk << 63))
    }

    /// Reads a varint length followed by that many bytes, returned as a
    /// zero-copy view into the block.
    pub fn read_length_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let length = self.read_varint32()? as usize;
        if self.remaining() < length {
            return Err(Error::EndOfInput);
        }
        let start = self.position;
        self.position += length;
        Ok(&self.block[start..start + length])
    }

    /// Reads an int32 field (plain two's-complement varint encoding).
    #[inline]
    pub fn read_int32(&mut self) -> Result<i32> {
        Ok(self.read_varint32()? as i32)
    }

    /// Reads a uint32 field.
    #[inline]
    pub fn read_uint32(&mut self) -> Result<u32> {
        self.read_varint32()
    }

    /// Reads an sint32 field (zigzag encoding).
    #[inline]
    pub fn read_sint32(&mut self) -> Result<i32> {
        Ok(from_zigzag32(self.read_varint32()?))
    }

    /// Reads an int64 field (plain two's-complement varint encoding).
    #[inline]
    pub fn read_int64(&mut self) -> Result<i64> {
        Ok(self.read_varint64()? as i64)
    }

    /// Reads a uint64 field.
    #[inline]
    pub fn read_uint64(&mut self) -> Result<u64> {
        self.read_varint64()
    }

    /// Reads an sint64 field (zigzag encoding).
    #[inline]
    pub fn read_sint64(&mut self) -> Result<i64> {
        Ok(from_zigzag64(self.read_varint64()?))
    }

    /// Reads a bool field. Only 0 and 1 are valid encodings.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_varint32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::InvalidBoolean(other)),
        }
    }

    /// Reads a float field (IEEE-754 bits of a fixed32).
    #[inline]
    pub fn read_float(&mut self) -> f32 {
        f32::from_bits(self.read_fixed32())
    }

    /// Reads a double field (IEEE-754 bits of a fixed64).
    #[inline]
    pub fn read_double(&mut self) -> f64 {
        f64::from_bits(self.read_fixed64())
    }

    /// Reads a length-prefixed UTF-8 string as a zero-copy view.
    pub fn read_string(&mut self) -> Result<&'a str> {
        let bytes = self.read_length_prefixed_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Packed/unpacked dispatch shared by all collection readers.
    ///
    /// With `WireType::String` the items fill `buffer` until the cursor
    /// reaches the boundary declared by the length prefix (the item count is
    /// implicit). When `wire_type` matches the item's own wire type, exactly
    /// one unpacked item is read. `buffer` must be sized by the caller for
    /// the expected item count.
    fn read_packed<'b, T>(
        &mut self,
        wire_type: WireType,
        item_wire_type: WireType,
        buffer: &'b mut [T],
        mut read_item: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<&'b [T]> {
        if wire_type == WireType::String {
            let byte_length = self.read_varint32()? as usize;
            if self.remaining() < byte_length {
                return Err(Error::EndOfInput);
            }
            let end_position = self.position + byte_length;

            let mut count = 0;
            while self.position < end_position {
                buffer[count] = read_item(self)?;
                count += 1;
            }
            Ok(&buffer[..count])
        } else if wire_type == item_wire_type {
            buffer[0] = read_item(self)?;
            Ok(&buffer[..1])
        } else {
            Err(Error::UnknownWireType(wire_type as i32))
        }
    }

    /// Reads a repeated uint32 field into `buffer`, returning the filled prefix.
    pub fn read_packed_uint32<'b>(
        &mut self,
        wire_type: WireType,
        buffer: &'b mut [u32],
    ) -> Result<&'b [u32]> {
        self.read_packed(wire_type, WireType::Varint, buffer, |r| r.read_uint32())
    }

    /// Reads a repeated uint64 field into `buffer`, returning the filled prefix.
    pub fn read_packed_uint64<'b>(
        &mut self,
        wire_type: WireType,
        buffer: &'b mut [u64],
    ) -> Result<&'b [u64]> {
        self.read_packed(wire_type, WireType::Varint, buffer, |r| r.read_uint64())
    }

    /// Reads a repeated int32 field into `buffer`, returning the filled prefix.
    pub fn read_packed_int32<'b>(
        &mut self,
        wire_type: WireType,
        buffer: &'b mut [i32],
    ) -> Result<&'b [i32]> {
        self.read_packed(wire_type, WireType::Varint, buffer, |r| r.read_int32())
    }

    /// Reads a repeated int64 field into `buffer`, returning the filled prefix.
    pub fn read_packed_int64<'b>(
        &mut self,
        wire_type: WireType,
        buffer: &'b mut [i64],
    ) -> Result<&'b [i64]> {
        self.read_packed(wire_type, WireType::Varint, buffer, |r| r.read_int64())
    }

    /// Reads a repeated sint32 field into `buffer`, returning the filled prefix.
    pub fn read_packed_sint32<'b>(
        &mut self,
        wire_type: WireType,
        buffer: &'b mut [i32],
    ) -> Result<&'b [i32]> {
        self.read_packed(wire_type, WireType::Varint, buffer, |r| r.read_sint32())
    }

    /// Reads a repeated sint64 field into `buffer`, returning the filled prefix.
    pub fn read_packed_sint64<'b>(
        &mut self,
        wire_type: WireType,
        buffer: &'b mut [i64],
    ) -> Result<&'b [i64]> {
        self.read_packed(wire_type, WireType::Varint, buffer, |r| r.read_sint64())
    }

    /// Reads a repeated bool field into `buffer`, returning the filled prefix.
    pub fn read_packed_bool<'b>(
        &mut self,
        wire_type: WireType,
        buffer: &'b mut [bool],
    ) -> Result<&'b [bool]> {
        self.read_packed(wire_type, WireType::Varint, buffer, |r| r.read_bool())
    }

    /// Reads a repeated float field into `buffer`, returning the filled prefix.
    pub fn read_packed_float<'b>(
        &mut self,
        wire_type: WireType,
        buffer: &'b mut [f32],
    ) -> Result<&'b [f32]> {
        self.read_packed(wire_type, WireType::Fixed32, buffer, |r| Ok(r.read_float()))
    }

    /// Reads a repeated double field into `buffer`, returning the filled prefix.
    pub fn read_packed_double<'b>(
        &mut self,
        wire_type: WireType,
        buffer: &'b mut [f64],
    ) -> Result<&'b [f64]> {
        self.read_packed(wire_type, WireType::Fixed64, buffer, |r| {
            Ok(r.read_double())
        })
    }
}
