use crate::error::{Error, Result};

/// The encoding used to represent an individual value in a Protocol Buffers
/// stream.
///
/// <https://protobuf.dev/programming-guides/encoding/#structure>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum WireType {
    /// Sentinel meaning "no further fields". Never transmitted on the wire.
    None = -1,
    /// Base-128 variable-width integers (int32, int64, uint32, uint64,
    /// sint32, sint64, bool, enum).
    Varint = 0,
    /// Fixed-length 8-byte little-endian encoding (fixed64, sfixed64, double).
    Fixed64 = 1,
    /// Length-prefixed encoding (string, bytes, embedded messages, packed
    /// repeated fields).
    String = 2,
    // group start (3) and end (4) are deprecated and unsupported
    /// Fixed-length 4-byte little-endian encoding (fixed32, sfixed32, float).
    Fixed32 = 5,
}

/// A decoded field header: the field number and the wire type of the value
/// that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldHeader {
    pub field_number: u32,
    pub wire_type: WireType,
}

impl FieldHeader {
    /// The header returned when a reader reaches the end of its input.
    pub const NONE: FieldHeader = FieldHeader {
        field_number: 0,
        wire_type: WireType::None,
    };

    /// True when this header marks the end of the field stream.
    #[inline]
    pub fn is_none(&self) -> bool {
        self.wire_type == WireType::None
    }
}

/// Packs a field number and wire type into a field header varint.
///
/// The top 3 bits of a field number must be unset, i.e. this shift is safe
/// for valid field numbers: "The smallest field number you can specify is 1,
/// and the largest is 2^29-1" (https://protobuf.dev/programming-guides/proto3/).
#[inline]
pub fn encode_field_header(field_number: u32, wire_type: WireType) -> u32 {
    (field_number << 3) | ((wire_type as i32 as u32) & 7)
}

/// Unpacks a field header varint into field number and wire type.
///
/// The deprecated group wire types (3 and 4) and the unassigned values 6 and
/// 7 fail with [`Error::UnknownWireType`].
#[inline]
pub fn decode_field_header(header: u32) -> Result<FieldHeader> {
    let wire_type = match header & 7 {
        0 => WireType::Varint,
        1 => WireType::Fixed64,
        2 => WireType::String,
        5 => WireType::Fixed32,
        bits => return Err(Error::UnknownWireType(bits as i32)),
    };
    Ok(FieldHeader {
        field_number: header >> 3,
        wire_type,
    })
}
