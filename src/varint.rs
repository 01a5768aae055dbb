use crate::wire_type::WireType;

#[inline]
pub fn to_zigzag32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

#[inline]
pub fn from_zigzag32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ (-((n & 1) as i32))
}

#[inline]
pub fn to_zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn from_zigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}

/// Returns the number of bytes the varint encoding of `value` occupies (1 to 5).
#[inline]
pub fn varint32_size(value: u32) -> usize {
    let bits = 32 - (value | 1).leading_zeros();
    ((bits + 6) / 7) as usize
}

/// Estimates how many packed items fit into `byte_length` bytes, assuming
/// 2 bytes per varint and the exact width for fixed-size items. Used to
/// pre-reserve collection capacity; always at least 1.
pub(crate) fn estimate_packed_capacity(byte_length: u32, item_wire_type: WireType) -> usize {
    let estimated_item_size = match item_wire_type {
        WireType::Varint => 2,
        WireType::Fixed32 => 4,
        WireType::Fixed64 => 8,
        _ => 1,
    };
    (byte_length as usize / estimated_item_size).max(1)
}
