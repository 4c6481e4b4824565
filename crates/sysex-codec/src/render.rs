use thiserror::Error;

use crate::packing::{pack, unpack, BLOCK};

/// Errors raised by the value codecs and the packing helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unknown codec `{0}`")]
    UnknownCodec(String),
    #[error("value {value} too big for {bytec} bytes")]
    ValueTooLarge { value: i64, bytec: usize },
    #[error("{codec}: byte {byte:#04X} does not fit in {width} bits")]
    ByteOutOfRange {
        codec: &'static str,
        byte: u8,
        width: u32,
    },
    #[error("{codec}: {count} bytes overflow a 64-bit value")]
    TooManyBytes { codec: &'static str, count: usize },
    #[error("character not in Akai charset: {0:#04X}")]
    NotInCharset(i64),
    #[error("block length {len} out of range {min}..={max}")]
    BlockLength { len: usize, min: usize, max: usize },
    #[error("address byte {index} from the end overflows: {a:#04X} + {b:#04X} > {max:#04X}")]
    AddressOverflow { index: usize, a: u32, b: u32, max: u32 },
    #[error("address carries out of its top byte: {0:02X?}")]
    AddressCarry(Vec<u8>),
}

/// A named conversion between an integer value and its wire bytes.
pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Wire bytes to value.
    fn decode(&self, bytes: &[u8]) -> Result<i64, CodecError>;

    /// Value to exactly `bytec` wire bytes, left-padded with zeros.
    fn encode(&self, value: i64, bytec: usize) -> Result<Vec<u8>, CodecError>;
}

/// Big-endian groups of `width` bits, one group per byte.
struct WidthCodec {
    name: &'static str,
    width: u32,
}

impl WidthCodec {
    fn mask(&self) -> i64 {
        (1 << self.width) - 1
    }
}

impl Codec for WidthCodec {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode(&self, bytes: &[u8]) -> Result<i64, CodecError> {
        if bytes.len() > (63 / self.width) as usize {
            return Err(CodecError::TooManyBytes {
                codec: self.name,
                count: bytes.len(),
            });
        }
        bytes.iter().try_fold(0i64, |acc, &byte| {
            if i64::from(byte) > self.mask() {
                return Err(CodecError::ByteOutOfRange {
                    codec: self.name,
                    byte,
                    width: self.width,
                });
            }
            Ok((acc << self.width) | i64::from(byte))
        })
    }

    fn encode(&self, value: i64, bytec: usize) -> Result<Vec<u8>, CodecError> {
        if value < 0 {
            return Err(CodecError::ValueTooLarge { value, bytec });
        }
        let mut groups = Vec::new();
        let mut rest = value;
        while rest != 0 {
            groups.push((rest & self.mask()) as u8);
            rest >>= self.width;
        }
        if groups.len() > bytec {
            return Err(CodecError::ValueTooLarge { value, bytec });
        }
        groups.resize(bytec, 0);
        groups.reverse();
        Ok(groups)
    }
}

/// Akai's character set: wire bytes are Akai character values, decoded
/// values are ASCII codes.
struct AkaiCodec;

const AKAI_SPECIALS: [(u8, u8); 5] = [(10, b' '), (37, b'#'), (38, b'+'), (39, b'-'), (40, b'.')];

/// Akai character value to ASCII.
pub fn akai_to_ascii(akai: u8) -> Option<u8> {
    match akai {
        0..=9 => Some(b'0' + akai),
        11..=36 => Some(b'A' + (akai - 11)),
        _ => AKAI_SPECIALS
            .iter()
            .find_map(|&(code, ascii)| (code == akai).then_some(ascii)),
    }
}

/// ASCII to Akai character value. Lower-case letters map to upper case.
pub fn ascii_to_akai(ascii: u8) -> Option<u8> {
    match ascii.to_ascii_uppercase() {
        c @ b'0'..=b'9' => Some(c - b'0'),
        c @ b'A'..=b'Z' => Some(c - b'A' + 11),
        c => AKAI_SPECIALS
            .iter()
            .find_map(|&(code, ascii)| (ascii == c).then_some(code)),
    }
}

/// Decode a run of Akai characters, e.g. a patch name.
pub fn akai_text(bytes: &[u8]) -> Result<String, CodecError> {
    bytes
        .iter()
        .map(|&b| {
            akai_to_ascii(b)
                .map(char::from)
                .ok_or(CodecError::NotInCharset(i64::from(b)))
        })
        .collect()
}

impl Codec for AkaiCodec {
    fn name(&self) -> &'static str {
        "AKAISCIIRender"
    }

    fn decode(&self, bytes: &[u8]) -> Result<i64, CodecError> {
        match bytes {
            [byte] => akai_to_ascii(*byte)
                .map(i64::from)
                .ok_or(CodecError::NotInCharset(i64::from(*byte))),
            _ => Err(CodecError::BlockLength {
                len: bytes.len(),
                min: 1,
                max: 1,
            }),
        }
    }

    fn encode(&self, value: i64, bytec: usize) -> Result<Vec<u8>, CodecError> {
        if bytec == 0 {
            return Err(CodecError::ValueTooLarge { value, bytec });
        }
        let akai = u8::try_from(value)
            .ok()
            .and_then(ascii_to_akai)
            .ok_or(CodecError::NotInCharset(value))?;
        let mut bytes = vec![0; bytec - 1];
        bytes.push(akai);
        Ok(bytes)
    }
}

static MIDI7: WidthCodec = WidthCodec {
    name: "MIDI7Render",
    width: 7,
};
static NYBBLE: WidthCodec = WidthCodec {
    name: "NybbleRender",
    width: 4,
};
static UINT8: WidthCodec = WidthCodec {
    name: "UINT8Render",
    width: 8,
};
static AKAI: AkaiCodec = AkaiCodec;
static PACKED: PackedCodec = PackedCodec;

static CODECS: [&(dyn Codec); 5] = [&MIDI7, &NYBBLE, &UINT8, &AKAI, &PACKED];

/// Plain bytes carried as one packed block (see [`crate::packing`]):
/// `bytec` MIDI bytes hold `bytec - 1` data bytes with their high bits last.
struct PackedCodec;

impl Codec for PackedCodec {
    fn name(&self) -> &'static str {
        "HBB8LRender"
    }

    fn decode(&self, bytes: &[u8]) -> Result<i64, CodecError> {
        UINT8.decode(&unpack(bytes)?)
    }

    fn encode(&self, value: i64, bytec: usize) -> Result<Vec<u8>, CodecError> {
        if !(2..=BLOCK + 1).contains(&bytec) {
            return Err(CodecError::BlockLength {
                len: bytec,
                min: 2,
                max: BLOCK + 1,
            });
        }
        pack(&UINT8.encode(value, bytec - 1)?)
    }
}

/// Look up a codec by the name used in `render` cells.
pub fn codec(name: &str) -> Result<&'static dyn Codec, CodecError> {
    CODECS
        .iter()
        .copied()
        .find(|codec| codec.name() == name)
        .ok_or_else(|| CodecError::UnknownCodec(name.to_string()))
}

pub fn codec_names() -> impl Iterator<Item = &'static str> {
    CODECS.iter().map(|codec| codec.name())
}
