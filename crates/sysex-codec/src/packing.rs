//! 8-bit data in 7-bit MIDI bytes.
//!
//! A block of up to seven data bytes travels as the low seven bits of each
//! byte followed by one byte collecting their high bits: bit `i` of the
//! trailing byte is the high bit of data byte `i`.

use crate::render::CodecError;

/// Data bytes per packed block.
pub const BLOCK: usize = 7;

/// Pack one block of 1 to 7 data bytes into `len + 1` MIDI bytes.
pub fn pack(block: &[u8]) -> Result<Vec<u8>, CodecError> {
    if block.is_empty() || block.len() > BLOCK {
        return Err(CodecError::BlockLength {
            len: block.len(),
            min: 1,
            max: BLOCK,
        });
    }
    let mut hibits = 0u8;
    let mut packed = Vec::with_capacity(block.len() + 1);
    for (i, byte) in block.iter().enumerate() {
        hibits |= (byte >> 7) << i;
        packed.push(byte & 0x7F);
    }
    packed.push(hibits);
    Ok(packed)
}

/// Unpack one block of 2 to 8 MIDI bytes, the last carrying the high bits.
pub fn unpack(midi: &[u8]) -> Result<Vec<u8>, CodecError> {
    let Some((&hibits, data)) = midi.split_last().filter(|(_, data)| {
        (1..=BLOCK).contains(&data.len())
    }) else {
        return Err(CodecError::BlockLength {
            len: midi.len(),
            min: 2,
            max: BLOCK + 1,
        });
    };
    Ok(data
        .iter()
        .enumerate()
        .map(|(i, byte)| (byte & 0x7F) | (((hibits >> i) & 0x01) << 7))
        .collect())
}

/// Pack arbitrary data block by block; the last block may be short.
pub fn pack_all(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let blocks = data.chunks(BLOCK).map(pack).collect::<Result<Vec<_>, _>>()?;
    Ok(blocks.concat())
}

/// Inverse of [`pack_all`]. A trailing block of a single byte is an error.
pub fn unpack_all(midi: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut data = Vec::with_capacity(midi.len() * BLOCK / (BLOCK + 1));
    for block in midi.chunks(BLOCK + 1) {
        data.extend(unpack(block)?);
    }
    Ok(data)
}
