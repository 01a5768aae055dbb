use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{Error, Result};
use crate::varint::{estimate_packed_capacity, from_zigzag32, from_zigzag64};
use crate::wire_type::{decode_field_header, FieldHeader, WireType};

const SKIP_CHUNK_SIZE: usize = 4096;

/// A Protocol Buffers reader over any [`io::Read`] source.
///
/// Unlike [`BlockReader`](crate::BlockReader), this reader does not require
/// the input to be in memory: it pulls bytes on demand and tracks how many it
/// has consumed, so packed field boundaries work on non-seekable sources such
/// as sockets and pipes. Values that need storage (bytes, strings, packed
/// collections) are returned as owned allocations.
///
/// A source that is also [`io::Seek`] should be wrapped with
/// [`new_seekable`](Self::new_seekable) so that skipped fields are seeked
/// over instead of read and discarded.
///
/// ## Example
///
/// ```
/// use minipbf::{StreamReader, WireType};
///
/// let data: &[u8] = &[0x08, 0x96, 0x01]; // field 1, varint 150
/// let mut reader = StreamReader::new(data);
/// let header = reader.read_field_header().unwrap();
/// assert_eq!(header.field_number, 1);
/// assert_eq!(reader.read_uint32().unwrap(), 150);
/// assert!(reader.read_field_header().unwrap().is_none());
/// ```
pub struct StreamReader<R: Read> {
    /// `None` after [`close`](Self::close).
    source: Option<R>,
    position: u64,
    /// Skip strategy chosen at construction time.
    skip: fn(&mut Self, u64) -> Result<()>,
}

impl<R: Read> StreamReader<R> {
    /// Creates a reader over a non-seekable source. Skipped fields are read
    /// in chunks and discarded.
    pub fn new(source: R) -> Self {
        Self {
            source: Some(source),
            position: 0,
            skip: Self::skip_by_reading,
        }
    }

    /// Number of bytes consumed from the source so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Drops the underlying source, returning it if the reader was still
    /// open. Any further read fails with [`Error::Closed`]; closing twice is
    /// a no-op.
    pub fn close(&mut self) -> Option<R> {
        self.source.take()
    }

    /// True once [`close`](Self::close) has been called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    fn source_mut(&mut self) -> Result<&mut R> {
        self.source.as_mut().ok_or(Error::Closed)
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.fill(&mut byte)?;
        Ok(byte[0])
    }

    /// Reads one byte, mapping a clean end of the source to `None`.
    fn try_read_byte(&mut self) -> Result<Option<u8>> {
        let source = self.source.as_mut().ok_or(Error::Closed)?;
        let mut byte = [0u8; 1];
        loop {
            match source.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(byte[0]));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn fill(&mut self, buffer: &mut [u8]) -> Result<()> {
        let source = self.source.as_mut().ok_or(Error::Closed)?;
        source.read_exact(buffer)?;
        self.position += buffer.len() as u64;
        Ok(())
    }

    fn skip_by_reading(&mut self, mut length: u64) -> Result<()> {
        let mut scratch = [0u8; SKIP_CHUNK_SIZE];
        while length > 0 {
            let take = length.min(SKIP_CHUNK_SIZE as u64) as usize;
            self.fill(&mut scratch[..take])?;
            length -= take as u64;
        }
        Ok(())
    }

    /// Reads the next field header. Returns [`FieldHeader::NONE`] when the
    /// source is cleanly exhausted or the header varint is 0.
    pub fn read_field_header(&mut self) -> Result<FieldHeader> {
        let first = match self.try_read_byte()? {
            Some(byte) => byte,
            None => return Ok(FieldHeader::NONE),
        };

        let header = self.continue_varint32(first)?;
        if header == 0 {
            return Ok(FieldHeader::NONE);
        }
        decode_field_header(header)
    }

    /// Skips over a field with the given wire type, using the skip strategy
    /// chosen at construction for fixed-width and length-prefixed data.
    pub fn skip_field(&mut self, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                self.read_varint64()?;
            }
            WireType::Fixed32 => (self.skip)(self, 4)?,
            WireType::Fixed64 => (self.skip)(self, 8)?,
            WireType::String => {
                let length = self.read_varint64()?;
                (self.skip)(self, length)?;
            }
            other => return Err(Error::UnknownWireType(other as i32)),
        }
        Ok(())
    }

    /// Reads a 4-byte little-endian fixed value.
    pub fn read_fixed32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.fill(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads an 8-byte little-endian fixed value.
    pub fn read_fixed64(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        self.fill(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Reads a 32-bit unsigned integer encoded as a base-128 varint.
    ///
    /// Tolerates the legacy 10-byte form produced by encoders that
    /// sign-extend negative int32 values to 64 bits, with the same strictness
    /// as [`BlockReader::read_varint32`](crate::BlockReader::read_varint32).
    pub fn read_varint32(&mut self) -> Result<u32> {
        let first = self.read_byte()?;
        self.continue_varint32(first)
    }

    fn continue_varint32(&mut self, first: u8) -> Result<u32> {
        let mut value = first as u32;
        if value & 0x80 == 0 {
            return Ok(value);
        }
        value &= 0x7f;

        for shift in [7u32, 14, 21] {
            let chunk = self.read_byte()? as u32;
            value |= (chunk & 0x7f) << shift;
            if chunk & 0x80 == 0 {
                return Ok(value);
            }
        }

        let chunk = self.read_byte()? as u32;
        value |= chunk << 28; // only 4 bits of this chunk fit
        if chunk & 0xf0 == 0 {
            return Ok(value);
        }

        if chunk & 0xf0 == 0xf0
            && self.read_byte()? == 0xff
            && self.read_byte()? == 0xff
            && self.read_byte()? == 0xff
            && self.read_byte()? == 0xff
            && self.read_byte()? == 0x01
        {
            return Ok(value);
        }

        Err(Error::MalformedVarint)
    }

    /// Reads a 64-bit unsigned integer encoded as a base-128 varint.
    pub fn read_varint64(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..9 {
            let chunk = self.read_byte()? as u64;
            value |= (chunk & 0x7f) << (7 * i);
            if chunk & 0x80 == 0 {
                return Ok(value);
            }
        }

        let chunk = self.read_byte()? as u64;
        if chunk & !0x01 != 0 {
            return Err(Error::MalformedVarint);
        }
        Ok(value | (chunk << 63))
    }

    /// Reads a varint length followed by that many bytes into an owned
    /// buffer.
    pub fn read_length_prefixed_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_varint32()? as usize;
        let mut data = vec![0u8; length];
        self.fill(&mut data)?;
        Ok(data)
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
    pub fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_fixed32()?))
    }

    /// Reads a double field (IEEE-754 bits of a fixed64).
    #[inline]
    pub fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_fixed64()?))
    }

    /// Reads a length-prefixed UTF-8 string into an owned [`String`].
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_length_prefixed_bytes()?;
        String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Packed/unpacked dispatch shared by all collection readers.
    ///
    /// With `WireType::String` the declared byte length and the consumed-byte
    /// position determine the end of the run, which is how the item count is
    /// found without seeking. When `wire_type` matches the item's own wire
    /// type, exactly one unpacked item is read. The result capacity is
    /// pre-reserved from the byte length and the item's typical width.
    fn read_packed<T>(
        &mut self,
        wire_type: WireType,
        item_wire_type: WireType,
        mut read_item: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        if wire_type == WireType::String {
            let byte_length = self.read_varint32()?;
            let end_position = self.position + byte_length as u64;

            let mut items =
                Vec::with_capacity(estimate_packed_capacity(byte_length, item_wire_type));
            while self.position < end_position {
                items.push(read_item(self)?);
            }
            Ok(items)
        } else if wire_type == item_wire_type {
            Ok(vec![read_item(self)?])
        } else {
            Err(Error::UnknownWireType(wire_type as i32))
        }
    }

    /// Reads a repeated uint32 field.
    pub fn read_packed_uint32(&mut self, wire_type: WireType) -> Result<Vec<u32>> {
        self.read_packed(wire_type, WireType::Varint, |r| r.read_uint32())
    }

    /// Reads a repeated uint64 field.
    pub fn read_packed_uint64(&mut self, wire_type: WireType) -> Result<Vec<u64>> {
        self.read_packed(wire_type, WireType::Varint, |r| r.read_uint64())
    }

    /// Reads a repeated int32 field.
    pub fn read_packed_int32(&mut self, wire_type: WireType) -> Result<Vec<i32>> {
        self.read_packed(wire_type, WireType::Varint, |r| r.read_int32())
    }

    /// Reads a repeated int64 field.
    pub fn read_packed_int64(&mut self, wire_type: WireType) -> Result<Vec<i64>> {
        self.read_packed(wire_type, WireType::Varint, |r| r.read_int64())
    }

    /// Reads a repeated sint32 field (zigzag encoding).
    pub fn read_packed_sint32(&mut self, wire_type: WireType) -> Result<Vec<i32>> {
        self.read_packed(wire_type, WireType::Varint, |r| r.read_sint32())
    }

    /// Reads a repeated sint64 field (zigzag encoding).
    pub fn read_packed_sint64(&mut self, wire_type: WireType) -> Result<Vec<i64>> {
        self.read_packed(wire_type, WireType::Varint, |r| r.read_sint64())
    }

    /// Reads a repeated bool field.
    pub fn read_packed_bool(&mut self, wire_type: WireType) -> Result<Vec<bool>> {
        self.read_packed(wire_type, WireType::Varint, |r| r.read_bool())
    }

    /// Reads a repeated float field.
    pub fn read_packed_float(&mut self, wire_type: WireType) -> Result<Vec<f32>> {
        self.read_packed(wire_type, WireType::Fixed32, |r| r.read_float())
    }

    /// Reads a repeated double field.
    pub fn read_packed_double(&mut self, wire_type: WireType) -> Result<Vec<f64>> {
        self.read_packed(wire_type, WireType::Fixed64, |r| r.read_double())
    }
}

impl<R: Read + Seek> StreamReader<R> {
    /// Creates a reader over a seekable source. Skipped fields are seeked
    /// over instead of read and discarded.
    pub fn new_seekable(source: R) -> Self {
        Self {
            source: Some(source),
            position: 0,
            skip: Self::skip_by_seeking,
        }
    }

    fn skip_by_seeking(&mut self, length: u64) -> Result<()> {
        let source = self.source_mut()?;
        let current = source.stream_position()?;
        let end = source.seek(SeekFrom::End(0))?;
        let target = current.checked_add(length).filter(|&t| t <= end);
        let target = match target {
            Some(target) => target,
            None => {
                // leave the source where it was so position() stays accurate
                source.seek(SeekFrom::Start(current))?;
                return Err(Error::EndOfInput);
            }
        };
        source.seek(SeekFrom::Start(target))?;
        self.position += length;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::io::Cursor;

    fn open(data: &[u8]) -> StreamReader<&[u8]> {
        StreamReader::new(data)
    }

    #[test]
    fn read_varint32_works() {
        let tests: [(&[u8], u32); 6] = [
            (&[0x00], 0),
            (&[0x7f], 127),
            (&[0x80, 0x01], 128),
            (&[0xac, 0x02], 300),
            (&[0x80, 0x80, 0x80, 0x80, 0x01], 268435456),
            (&[0xff, 0xff, 0xff, 0xff, 0x0f], u32::MAX),
        ];
        for (data, expected) in tests {
            let mut reader = open(data);
            assert_eq!(reader.read_varint32().unwrap(), expected);
            assert_eq!(reader.position(), data.len() as u64);
        }
    }

    #[test]
    fn read_varint32_accepts_legacy_sign_extended_form() {
        let mut reader = open(&hex!("ffffffffffffffffff01"));
        assert_eq!(reader.read_int32().unwrap(), -1);
        assert_eq!(reader.position(), 10);

        let mut reader = open(&hex!("ffffffff1f"));
        assert!(matches!(
            reader.read_varint32().unwrap_err(),
            Error::MalformedVarint
        ));
    }

    #[test]
    fn read_varint64_works() {
        let mut reader = open(&hex!("ffffffffffffffffff01"));
        assert_eq!(reader.read_varint64().unwrap(), u64::MAX);

        let mut reader = open(&hex!("ffffffffffffffffff02"));
        assert!(matches!(
            reader.read_varint64().unwrap_err(),
            Error::MalformedVarint
        ));
    }

    #[test]
    fn truncated_varint_is_end_of_input() {
        // continuation bit set, then the source ends
        let mut reader = open(&[0x80]);
        assert!(matches!(
            reader.read_varint32().unwrap_err(),
            Error::EndOfInput
        ));
    }

    #[test]
    fn read_field_header_works() {
        // clean end of the source means no more fields
        let mut reader = open(&[]);
        assert_eq!(reader.read_field_header().unwrap(), FieldHeader::NONE);

        // a zero header is treated as end of fields
        let mut reader = open(&[0x00]);
        assert_eq!(reader.read_field_header().unwrap(), FieldHeader::NONE);

        let mut reader = open(&[0x08, 0x96, 0x01]);
        let header = reader.read_field_header().unwrap();
        assert_eq!(header.field_number, 1);
        assert_eq!(header.wire_type, WireType::Varint);
        assert_eq!(reader.read_uint32().unwrap(), 150);
        assert!(reader.read_field_header().unwrap().is_none());
    }

    #[test]
    fn read_fixed_works() {
        let mut reader = open(&hex!("d2029649 0094357700000000"));
        assert_eq!(reader.read_fixed32().unwrap(), 0x499602d2);
        assert_eq!(reader.read_fixed64().unwrap(), 2000000000);
        assert_eq!(reader.position(), 12);

        let mut reader = open(&[0x01, 0x02]);
        assert!(matches!(
            reader.read_fixed32().unwrap_err(),
            Error::EndOfInput
        ));
    }

    #[test]
    fn read_string_and_bytes_work() {
        let mut reader = open(&hex!("07 74657374696e67"));
        assert_eq!(reader.read_string().unwrap(), "testing");

        let mut reader = open(&[0x02, 0xAA, 0xBB]);
        assert_eq!(reader.read_length_prefixed_bytes().unwrap(), [0xAA, 0xBB]);

        // declared length 5, only 4 bytes remain
        let mut reader = open(&[0x05, 0x74, 0x65, 0x73, 0x74]);
        assert!(matches!(
            reader.read_length_prefixed_bytes().unwrap_err(),
            Error::EndOfInput
        ));
    }

    #[test]
    fn read_signed_and_bool_work() {
        let mut reader = open(&hex!("ddeb59"));
        assert_eq!(reader.read_sint32().unwrap(), -735983);

        let mut reader = open(&hex!("ffffffffffffffffff01"));
        assert_eq!(reader.read_sint64().unwrap(), i64::MIN);

        let mut reader = open(&[0x01, 0x00, 0x02]);
        assert!(reader.read_bool().unwrap());
        assert!(!reader.read_bool().unwrap());
        assert!(matches!(
            reader.read_bool().unwrap_err(),
            Error::InvalidBoolean(2)
        ));
    }

    #[test]
    fn skip_field_by_reading_works() {
        let mut data = vec![0x96, 0x01]; // varint
        data.extend_from_slice(&[1, 2, 3, 4]); // fixed32
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]); // fixed64
        data.extend_from_slice(&[0x03, 0xAA, 0xBB, 0xCC]); // length-prefixed
        data.push(0x2a);

        let mut reader = StreamReader::new(data.as_slice());
        reader.skip_field(WireType::Varint).unwrap();
        reader.skip_field(WireType::Fixed32).unwrap();
        reader.skip_field(WireType::Fixed64).unwrap();
        reader.skip_field(WireType::String).unwrap();
        assert_eq!(reader.read_uint32().unwrap(), 42);
        assert_eq!(reader.position(), data.len() as u64);
    }

    #[test]
    fn skip_field_by_reading_handles_long_fields() {
        // longer than one discard chunk
        let content_len = 3 * SKIP_CHUNK_SIZE + 17;
        let mut data = vec![0u8; content_len + 3];
        data[0] = (content_len as u8 & 0x7f) | 0x80;
        data[1] = (content_len >> 7) as u8;
        data[content_len + 2] = 0x2a;

        let mut reader = StreamReader::new(data.as_slice());
        reader.skip_field(WireType::String).unwrap();
        assert_eq!(reader.read_uint32().unwrap(), 42);
    }

    #[test]
    fn skip_field_by_seeking_works() {
        let mut data = vec![0x04, 0xAA, 0xBB, 0xCC, 0xDD];
        data.push(0x2a);

        let mut reader = StreamReader::new_seekable(Cursor::new(data));
        reader.skip_field(WireType::String).unwrap();
        assert_eq!(reader.read_uint32().unwrap(), 42);
        assert_eq!(reader.position(), 6);
    }

    #[test]
    fn skip_field_past_end_is_end_of_input() {
        // declared length 9, only 2 content bytes follow
        let data = vec![0x09, 0xAA, 0xBB];

        let mut reader = StreamReader::new_seekable(Cursor::new(data.clone()));
        assert!(matches!(
            reader.skip_field(WireType::String).unwrap_err(),
            Error::EndOfInput
        ));

        let mut reader = StreamReader::new(data.as_slice());
        assert!(matches!(
            reader.skip_field(WireType::String).unwrap_err(),
            Error::EndOfInput
        ));
    }

    #[test]
    fn failed_seek_skip_leaves_source_in_place() {
        // declared length 9, only 2 content bytes follow
        let data = vec![0x09, 0x2a, 0x2a];

        let mut reader = StreamReader::new_seekable(Cursor::new(data));
        assert!(matches!(
            reader.skip_field(WireType::String).unwrap_err(),
            Error::EndOfInput
        ));

        // the length varint was consumed but the overshooting seek was not
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.read_uint32().unwrap(), 42);
        assert_eq!(reader.read_uint32().unwrap(), 42);
        assert_eq!(reader.position(), 3);
    }

    #[test]
    fn skip_field_rejects_unknown_wire_type() {
        let mut reader = open(&[0xAA]);
        assert!(matches!(
            reader.skip_field(WireType::None).unwrap_err(),
            Error::UnknownWireType(-1)
        ));
    }

    #[test]
    fn read_packed_uint32_works() {
        let data = hex!("14 00 8001 808001 80808001 8080808001 ffffffff0f");
        let mut reader = StreamReader::new(&data[..]);
        let items = reader.read_packed_uint32(WireType::String).unwrap();
        assert_eq!(items, [0, 128, 16384, 2097152, 268435456, 4294967295]);
        assert_eq!(reader.position(), data.len() as u64);
    }

    #[test]
    fn read_packed_single_unpacked_element_works() {
        let mut reader = open(&[0x96, 0x01]);
        let items = reader.read_packed_uint32(WireType::Varint).unwrap();
        assert_eq!(items, [150]);
    }

    #[test]
    fn read_packed_rejects_unknown_wire_type() {
        let mut reader = open(&[0x01]);
        assert!(matches!(
            reader.read_packed_uint32(WireType::Fixed32).unwrap_err(),
            Error::UnknownWireType(5)
        ));
    }

    #[test]
    fn read_packed_fixed_width_works() {
        let mut data = vec![16u8];
        data.extend_from_slice(&1.5f64.to_bits().to_le_bytes());
        data.extend_from_slice(&(-2.25f64).to_bits().to_le_bytes());
        let mut reader = StreamReader::new(data.as_slice());
        let items = reader.read_packed_double(WireType::String).unwrap();
        assert_eq!(items, [1.5, -2.25]);
    }

    #[test]
    fn close_works() {
        let mut reader = open(&[0x2a]);
        assert!(!reader.is_closed());
        assert!(reader.close().is_some());
        assert!(reader.is_closed());
        assert!(reader.close().is_none()); // second close is a no-op

        assert!(matches!(reader.read_uint32().unwrap_err(), Error::Closed));
        assert!(matches!(
            reader.read_field_header().unwrap_err(),
            Error::Closed
        ));
        assert!(matches!(
            reader.skip_field(WireType::Fixed32).unwrap_err(),
            Error::Closed
        ));
    }
}
