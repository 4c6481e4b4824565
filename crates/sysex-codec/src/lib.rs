//! Wire-level helpers for MIDI System Exclusive data.
//!
//! - [`address`]: adding offsets to multi-byte MIDI addresses
//! - [`render`]: named codecs converting between an integer value and its
//!   wire bytes (7-bit MIDI bytes, nibbles, plain bytes, Akai characters)
//! - [`packing`]: 8-bit data carried in 7-bit MIDI bytes with a trailing
//!   high-bit byte
//! - [`framing`]: splitting a raw dump into messages with the `F0`/`F7`
//!   framing and active-sense bytes removed

pub mod address;
pub mod framing;
pub mod packing;
pub mod render;

pub use address::{add_address, MIDI_BITS};
pub use framing::{packets, read_packets, Packets, ACTIVE_SENSE, EOX, SOX};
pub use packing::{pack, pack_all, unpack, unpack_all};
pub use render::{codec, codec_names, Codec, CodecError};
