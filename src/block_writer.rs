use crate::varint::{to_zigzag32, to_zigzag64, varint32_size};
use crate::wire_type::{encode_field_header, WireType};

/// Bookkeeping for a length-prefixed field whose final length is unknown
/// until its content has been written. Created by
/// [`BlockWriter::start_length_prefixed_block`] and consumed by
/// [`BlockWriter::finalize_length_prefixed_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefixedBlock {
    length_position: usize,
    content_position: usize,
}

/// A cursor over a borrowed, mutable block of bytes that encodes Protocol
/// Buffers values into it.
///
/// The caller owns the backing storage and must size it to the maximum the
/// writer will need; there is no dynamic growth, and writing past the end is
/// a contract violation that panics. The writer never allocates.
///
/// ## Example
///
/// ```
/// use minipbf::{BlockWriter, WireType};
///
/// let mut buffer = [0u8; 16];
/// let mut writer = BlockWriter::new(&mut buffer);
/// writer.write_field_header(1, WireType::Varint);
/// writer.write_uint32(150);
/// assert_eq!(writer.written(), [0x08, 0x96, 0x01]);
/// ```
pub struct BlockWriter<'a> {
    block: &'a mut [u8],
    position: usize,
}

impl<'a> BlockWriter<'a> {
    /// Creates a writer positioned at the beginning of `block`.
    pub fn new(block: &'a mut [u8]) -> Self {
        Self { block, position: 0 }
    }

    /// Current write position inside the block.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// The written portion of the underlying block.
    #[inline]
    pub fn written(&self) -> &[u8] {
        &self.block[..self.position]
    }

    #[inline]
    fn push(&mut self, byte: u8) {
        self.block[self.position] = byte;
        self.position += 1;
    }

    /// Writes a field header composed of field number and wire type.
    pub fn write_field_header(&mut self, field_number: u32, wire_type: WireType) {
        self.write_varint32(encode_field_header(field_number, wire_type));
    }

    /// Writes a 4-byte little-endian fixed value.
    #[inline]
    pub fn write_fixed32(&mut self, value: u32) {
        self.block[self.position..self.position + 4].copy_from_slice(&value.to_le_bytes());
        self.position += 4;
    }

    /// Writes an 8-byte little-endian fixed value.
    #[inline]
    pub fn write_fixed64(&mut self, value: u64) {
        self.block[self.position..self.position + 8].copy_from_slice(&value.to_le_bytes());
        self.position += 8;
    }

    /// Writes a 32-bit unsigned integer encoded as a base-128 varint.
    pub fn write_varint32(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.push(value as u8 | 0x80);
            value >>= 7;
        }
        self.push(value as u8);
    }

    /// Writes a 64-bit unsigned integer encoded as a base-128 varint.
    pub fn write_varint64(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.push(value as u8 | 0x80);
            value >>= 7;
        }
        self.push(value as u8);
    }

    /// Writes a varint length followed by `data` verbatim.
    pub fn write_length_prefixed_bytes(&mut self, data: &[u8]) {
        self.write_varint32(data.len() as u32);
        self.write_raw(data);
    }

    /// Copies `data` to the current position with no length prefix. Used to
    /// splice pre-encoded sub-messages.
    pub fn write_raw(&mut self, data: &[u8]) {
        self.block[self.position..self.position + data.len()].copy_from_slice(data);
        self.position += data.len();
    }

    /// Writes an int32 field. Negative values use the compact 5-byte varint
    /// encoding of the two's-complement bit pattern; readers also tolerate
    /// the legacy 10-byte sign-extended form.
    #[inline]
    pub fn write_int32(&mut self, value: i32) {
        self.write_varint32(value as u32);
    }

    /// Writes a uint32 field.
    #[inline]
    pub fn write_uint32(&mut self, value: u32) {
        self.write_varint32(value);
    }

    /// Writes an sint32 field (zigzag encoding).
    #[inline]
    pub fn write_sint32(&mut self, value: i32) {
        self.write_varint32(to_zigzag32(value));
    }

    /// Writes an int64 field.
    #[inline]
    pub fn write_int64(&mut self, value: i64) {
        self.write_varint64(value as u64);
    }

    /// Writes a uint64 field.
    #[inline]
    pub fn write_uint64(&mut self, value: u64) {
        self.write_varint64(value);
    }

    /// Writes an sint64 field (zigzag encoding).
    #[inline]
    pub fn write_sint64(&mut self, value: i64) {
        self.write_varint64(to_zigzag64(value));
    }

    /// Writes a bool field as varint 0 or 1.
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.write_varint32(value as u32);
    }

    /// Writes a float field (IEEE-754 bits as fixed32).
    #[inline]
    pub fn write_float(&mut self, value: f32) {
        self.write_fixed32(value.to_bits());
    }

    /// Writes a double field (IEEE-754 bits as fixed64).
    #[inline]
    pub fn write_double(&mut self, value: f64) {
        self.write_fixed64(value.to_bits());
    }

    /// Writes a UTF-8 string as a length-prefixed value.
    #[inline]
    pub fn write_string(&mut self, value: &str) {
        self.write_length_prefixed_bytes(value.as_bytes());
    }

    /// Reserves space for a length prefix sized from `estimated_content_len`
    /// and positions the cursor after it, where the content will be written.
    pub fn start_length_prefixed_block(
        &mut self,
        estimated_content_len: usize,
    ) -> LengthPrefixedBlock {
        let length_position = self.position;
        let content_position = length_position + varint32_size(estimated_content_len as u32);
        self.position = content_position;

        LengthPrefixedBlock {
            length_position,
            content_position,
        }
    }

    /// Backpatches the length prefix of a block started with
    /// [`start_length_prefixed_block`](Self::start_length_prefixed_block).
    ///
    /// If the true content length needs a different prefix width than was
    /// reserved, the content bytes are shifted by the difference so they
    /// immediately follow a prefix of the correct width, then the true
    /// length is written at the prefix start.
    pub fn finalize_length_prefixed_block(&mut self, block: LengthPrefixedBlock) {
        let reserved_len_bytes = block.content_position - block.length_position;
        let content_length = self.position - block.content_position;
        let actual_len_bytes = varint32_size(content_length as u32);

        if actual_len_bytes != reserved_len_bytes {
            let new_content_start = block.length_position + actual_len_bytes;
            self.block.copy_within(
                block.content_position..block.content_position + content_length,
                new_content_start,
            );
            self.position = new_content_start + content_length;
        }

        self.write_varint32_at(block.length_position, content_length as u32);
    }

    fn write_varint32_at(&mut self, position: usize, value: u32) {
        let original_position = self.position;
        self.position = position;
        self.write_varint32(value);
        self.position = original_position;
    }

    /// Packed encode for items whose exact content length is known up front:
    /// the length prefix is written first, then every item, in one pass.
    fn write_packed_exact<T: Copy>(
        &mut self,
        items: &[T],
        content_len: usize,
        mut write_item: impl FnMut(&mut Self, T),
    ) {
        self.write_varint32(content_len as u32);
        for &item in items {
            write_item(self, item);
        }
    }

    /// Packed encode for items of variable width: reserve an estimated
    /// prefix, write every item, then backpatch the true length.
    fn write_packed_backpatched<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        estimated_content_len: usize,
        mut write_item: impl FnMut(&mut Self, T),
    ) {
        let block = self.start_length_prefixed_block(estimated_content_len);
        for item in items {
            write_item(self, item);
        }
        self.finalize_length_prefixed_block(block);
    }

    /// Writes a packed repeated uint32 field (length prefix plus varints).
    pub fn write_packed_uint32(&mut self, items: &[u32]) {
        self.write_packed_backpatched(items.iter().copied(), items.len(), |w, v| {
            w.write_uint32(v)
        });
    }

    /// Writes a packed repeated uint64 field.
    pub fn write_packed_uint64(&mut self, items: &[u64]) {
        self.write_packed_backpatched(items.iter().copied(), items.len(), |w, v| {
            w.write_uint64(v)
        });
    }

    /// Writes a packed repeated int32 field.
    pub fn write_packed_int32(&mut self, items: &[i32]) {
        self.write_packed_backpatched(items.iter().copied(), items.len(), |w, v| w.write_int32(v));
    }

    /// Writes a packed repeated int64 field.
    pub fn write_packed_int64(&mut self, items: &[i64]) {
        self.write_packed_backpatched(items.iter().copied(), items.len(), |w, v| w.write_int64(v));
    }

    /// Writes a packed repeated sint32 field (zigzag encoding).
    pub fn write_packed_sint32(&mut self, items: &[i32]) {
        self.write_packed_backpatched(items.iter().copied(), items.len(), |w, v| {
            w.write_sint32(v)
        });
    }

    /// Writes a packed repeated sint64 field (zigzag encoding).
    pub fn write_packed_sint64(&mut self, items: &[i64]) {
        self.write_packed_backpatched(items.iter().copied(), items.len(), |w, v| {
            w.write_sint64(v)
        });
    }

    /// Writes a packed repeated bool field. Bools are always one byte, so the
    /// exact length prefix is emitted up front.
    pub fn write_packed_bool(&mut self, items: &[bool]) {
        self.write_packed_exact(items, items.len(), |w, v| w.write_bool(v));
    }

    /// Writes a packed repeated float field (exact length prefix, 4 bytes per
    /// item).
    pub fn write_packed_float(&mut self, items: &[f32]) {
        self.write_packed_exact(items, items.len() * 4, |w, v| w.write_float(v));
    }

    /// Writes a packed repeated double field (exact length prefix, 8 bytes
    /// per item).
    pub fn write_packed_double(&mut self, items: &[f64]) {
        self.write_packed_exact(items, items.len() * 8, |w, v| w.write_double(v));
    }

    /// Writes a packed repeated uint32 field from an iterator. The prefix
    /// estimate comes from the iterator's size hint, defaulting to one item.
    pub fn write_packed_uint32_iter(&mut self, items: impl IntoIterator<Item = u32>) {
        let items = items.into_iter();
        let estimate = items.size_hint().0.max(1);
        self.write_packed_backpatched(items, estimate, |w, v| w.write_uint32(v));
    }

    /// Writes a packed repeated uint64 field from an iterator.
    pub fn write_packed_uint64_iter(&mut self, items: impl IntoIterator<Item = u64>) {
        let items = items.into_iter();
        let estimate = items.size_hint().0.max(1);
        self.write_packed_backpatched(items, estimate, |w, v| w.write_uint64(v));
    }

    /// Writes a packed repeated int32 field from an iterator.
    pub fn write_packed_int32_iter(&mut self, items: impl IntoIterator<Item = i32>) {
        let items = items.into_iter();
        let estimate = items.size_hint().0.max(1);
        self.write_packed_backpatched(items, estimate, |w, v| w.write_int32(v));
    }

    /// Writes a packed repeated int64 field from an iterator.
    pub fn write_packed_int64_iter(&mut self, items: impl IntoIterator<Item = i64>) {
        let items = items.into_iter();
        let estimate = items.size_hint().0.max(1);
        self.write_packed_backpatched(items, estimate, |w, v| w.write_int64(v));
    }

    /// Writes a packed repeated sint32 field from an iterator.
    pub fn write_packed_sint32_iter(&mut self, items: impl IntoIterator<Item = i32>) {
        let items = items.into_iter();
        let estimate = items.size_hint().0.max(1);
        self.write_packed_backpatched(items, estimate, |w, v| w.write_sint32(v));
    }

    /// Writes a packed repeated sint64 field from an iterator.
    pub fn write_packed_sint64_iter(&mut self, items: impl IntoIterator<Item = i64>) {
        let items = items.into_iter();
        let estimate = items.size_hint().0.max(1);
        self.write_packed_backpatched(items, estimate, |w, v| w.write_sint64(v));
    }

    /// Writes a packed repeated bool field from an iterator.
    pub fn write_packed_bool_iter(&mut self, items: impl IntoIterator<Item = bool>) {
        let items = items.into_iter();
        let estimate = items.size_hint().0.max(1);
        self.write_packed_backpatched(items, estimate, |w, v| w.write_bool(v));
    }

    /// Writes a packed repeated float field from an iterator.
    pub fn write_packed_float_iter(&mut self, items: impl IntoIterator<Item = f32>) {
        let items = items.into_iter();
        let estimate = items.size_hint().0.max(1) * 4;
        self.write_packed_backpatched(items, estimate, |w, v| w.write_float(v));
    }

    /// Writes a packed repeated double field from an iterator.
    pub fn write_packed_double_iter(&mut self, items: impl IntoIterator<Item = f64>) {
        let items = items.into_iter();
        let estimate = items.size_hint().0.max(1) * 8;
        self.write_packed_backpatched(items, estimate, |w, v| w.write_double(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn with_writer(f: impl FnOnce(&mut BlockWriter)) -> Vec<u8> {
        // large enough for the grow tests, which write a 2-byte prefix
        // plus 500 content bytes
        let mut buffer = [0u8; 1024];
        let mut writer = BlockWriter::new(&mut buffer);
        f(&mut writer);
        writer.written().to_vec()
    }

    #[test]
    fn write_varint32_byte_counts() {
        let tests: [(u32, usize); 10] = [
            (0, 1),
            (127, 1),
            (128, 2),
            (16383, 2),
            (16384, 3),
            (2097151, 3),
            (2097152, 4),
            (268435455, 4),
            (268435456, 5),
            (u32::MAX, 5),
        ];
        for (value, expected_len) in tests {
            let written = with_writer(|w| w.write_varint32(value));
            assert_eq!(written.len(), expected_len, "value {value}");
            assert_eq!(written.len(), varint32_size(value));
        }
    }

    #[test]
    fn write_varint_works() {
        // From https://github.com/tokio-rs/prost/blob/v0.12.1/src/encoding.rs#L1626-L1678
        assert_eq!(with_writer(|w| w.write_varint32(300)), [0xac, 0x02]);
        assert_eq!(
            with_writer(|w| w.write_varint32(u32::MAX)),
            hex!("ffffffff0f")
        );
        assert_eq!(
            with_writer(|w| w.write_varint64(u64::MAX)),
            hex!("ffffffffffffffffff01")
        );
        assert_eq!(
            with_writer(|w| w.write_varint64(1 << 63)),
            hex!("80808080808080808001")
        );
    }

    #[test]
    fn write_fixed_works() {
        assert_eq!(
            with_writer(|w| w.write_fixed32(0x499602d2)),
            hex!("d2029649")
        );
        assert_eq!(
            with_writer(|w| w.write_fixed64(0x0123456789abcdef)),
            hex!("efcdab8967452301")
        );
    }

    #[test]
    fn write_field_header_works() {
        // echo "number: 150" | protoc --encode=Room *.proto | hexdump -C
        let written = with_writer(|w| {
            w.write_field_header(1, WireType::Varint);
            w.write_uint32(150);
        });
        assert_eq!(written, [0x08, 0x96, 0x01]);
    }

    #[test]
    fn write_sint32_works() {
        // for x in -735983 -456 -1 1 2147483647; do echo "altitude: $x" | protoc --encode=Room *.proto | xxd -p; done
        let cases: [(i32, &[u8]); 5] = [
            (-735983, &hex!("20ddeb59")),
            (-456, &hex!("208f07")),
            (-1, &hex!("2001")),
            (1, &hex!("2002")),
            (i32::MAX, &hex!("20feffffff0f")),
        ];
        for (value, expected) in cases {
            let written = with_writer(|w| {
                w.write_field_header(4, WireType::Varint);
                w.write_sint32(value);
            });
            assert_eq!(written, expected, "value {value}");
        }
    }

    #[test]
    fn write_sint64_works() {
        // echo "temperature: -9223372036854775808" | protoc --encode=Room *.proto | xxd -p
        let written = with_writer(|w| {
            w.write_field_header(5, WireType::Varint);
            w.write_sint64(i64::MIN);
        });
        assert_eq!(written, hex!("28ffffffffffffffffff01"));
    }

    #[test]
    fn write_int32_uses_compact_negative_encoding() {
        // compact two's-complement form; readers tolerate the 10-byte one
        assert_eq!(with_writer(|w| w.write_int32(-1)), hex!("ffffffff0f"));
        assert_eq!(with_writer(|w| w.write_int32(1)), [0x01]);
    }

    #[test]
    fn write_string_works() {
        // echo "id: \"testing\"" | protoc --encode=Collection *.proto | xxd -p
        let written = with_writer(|w| {
            w.write_field_header(2, WireType::String);
            w.write_string("testing");
        });
        assert_eq!(written, hex!("12 07 74 65 73 74 69 6e 67"));
    }

    #[test]
    fn write_length_prefixed_bytes_and_raw_work() {
        let written = with_writer(|w| {
            w.write_length_prefixed_bytes(b"ab");
            w.write_raw(b"cd");
        });
        assert_eq!(written, [0x02, b'a', b'b', b'c', b'd']);
    }

    #[test]
    fn write_packed_uint32_matches_reference_bytes() {
        let written =
            with_writer(|w| w.write_packed_uint32(&[0, 128, 16384, 2097152, 268435456, u32::MAX]));
        assert_eq!(
            written,
            hex!("14 00 8001 808001 80808001 8080808001 ffffffff0f")
        );
    }

    #[test]
    fn backpatch_keeps_prefix_when_estimate_is_right() {
        let written = with_writer(|w| {
            let block = w.start_length_prefixed_block(3);
            w.write_uint32(1);
            w.write_uint32(2);
            w.write_uint32(3);
            w.finalize_length_prefixed_block(block);
        });
        assert_eq!(written, [0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn backpatch_shrinks_oversized_prefix() {
        // estimate 300 reserves a 2-byte prefix, actual content is 3 bytes
        let written = with_writer(|w| {
            let block = w.start_length_prefixed_block(300);
            w.write_uint32(1);
            w.write_uint32(2);
            w.write_uint32(3);
            w.finalize_length_prefixed_block(block);
        });
        assert_eq!(written, [0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn backpatch_grows_undersized_prefix() {
        // estimate 1 reserves a 1-byte prefix, actual content needs 2 bytes
        let written = with_writer(|w| {
            let block = w.start_length_prefixed_block(1);
            for _ in 0..100 {
                w.write_uint32(u32::MAX); // 5 bytes each, 500 total
            }
            w.finalize_length_prefixed_block(block);
        });
        assert_eq!(written.len(), 2 + 500);
        assert_eq!(written[..2], [0xf4, 0x03]); // varint 500
        assert_eq!(written[2..7], hex!("ffffffff0f"));
        assert_eq!(written[497..502], hex!("ffffffff0f"));
    }

    #[test]
    fn write_packed_fixed_width_skips_backpatching() {
        let written = with_writer(|w| w.write_packed_bool(&[true, false, true]));
        assert_eq!(written, [0x03, 0x01, 0x00, 0x01]);

        let written = with_writer(|w| w.write_packed_float(&[1.0, 2.5]));
        assert_eq!(written.len(), 1 + 8);
        assert_eq!(written[0], 8);

        let written = with_writer(|w| w.write_packed_double(&[1.0]));
        assert_eq!(written.len(), 1 + 8);
        assert_eq!(written[0], 8);
    }

    #[test]
    fn write_packed_iter_handles_unsized_sources() {
        // filtered iterators report a zero lower bound, forcing the 1-item
        // fallback estimate and a prefix grow during finalize
        let written = with_writer(|w| {
            w.write_packed_uint32_iter((0..100u32).filter(|_| true).map(|_| u32::MAX));
        });
        assert_eq!(written.len(), 2 + 500);
        assert_eq!(written[..2], [0xf4, 0x03]);

        // exact-sized iterators keep the one-pass path
        let written = with_writer(|w| w.write_packed_uint32_iter([0u32, 128].into_iter()));
        assert_eq!(written, [0x03, 0x00, 0x80, 0x01]);
    }

    #[test]
    fn write_packed_empty_collections() {
        let written = with_writer(|w| w.write_packed_uint32(&[]));
        assert_eq!(written, [0x00]);

        let written = with_writer(|w| w.write_packed_double(&[]));
        assert_eq!(written, [0x00]);
    }
}
