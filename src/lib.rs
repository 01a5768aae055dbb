//! minipbf is a minimal, allocation-conscious codec for the
//! [Protocol Buffers wire format](https://protobuf.dev/programming-guides/encoding/).
//!
//! It operates one level below generated message types: callers walk the
//! field stream themselves, reading headers and dispatching on field number.
//! This keeps the library schema-free and the hot paths free of allocation.
//!
//! Three entry points cover the common shapes of protobuf data:
//!
//! - [`BlockReader`] decodes from a borrowed byte slice with zero-copy
//!   access to bytes and string fields.
//! - [`BlockWriter`] encodes into a borrowed, caller-sized byte slice,
//!   including packed repeated fields whose length prefix is backpatched
//!   after the content is written.
//! - [`StreamReader`] decodes from any [`std::io::Read`] source, seekable or
//!   not, returning owned values.
//!
//! ## Encoding
//!
//! ```
//! use minipbf::{BlockWriter, WireType};
//!
//! let mut buffer = [0u8; 64];
//! let mut writer = BlockWriter::new(&mut buffer);
//! writer.write_field_header(1, WireType::String);
//! writer.write_string("hi");
//! writer.write_field_header(2, WireType::Varint);
//! writer.write_sint32(-42);
//! assert_eq!(writer.written(), [0x0a, 0x02, b'h', b'i', 0x10, 0x53]);
//! ```
//!
//! ## Decoding
//!
//! ```
//! use minipbf::{BlockReader, WireType};
//!
//! let data = [0x0a, 0x02, b'h', b'i', 0x10, 0x53];
//! let mut reader = BlockReader::new(&data);
//!
//! let header = reader.read_field_header().unwrap();
//! assert_eq!((header.field_number, header.wire_type), (1, WireType::String));
//! assert_eq!(reader.read_string().unwrap(), "hi");
//!
//! let header = reader.read_field_header().unwrap();
//! assert_eq!((header.field_number, header.wire_type), (2, WireType::Varint));
//! assert_eq!(reader.read_sint32().unwrap(), -42);
//!
//! assert!(reader.read_field_header().unwrap().is_none());
//! ```

mod block_reader;
mod block_writer;
mod error;
mod stream_reader;
mod varint;
mod wire_type;

pub use block_reader::BlockReader;
pub use block_writer::{BlockWriter, LengthPrefixedBlock};
pub use error::{Error, Result};
pub use stream_reader::StreamReader;
pub use varint::{from_zigzag32, from_zigzag64, to_zigzag32, to_zigzag64, varint32_size};
pub use wire_type::{decode_field_header, encode_field_header, FieldHeader, WireType};
