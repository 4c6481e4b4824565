//! Arithmetic on multi-byte parameter addresses.
//!
//! Addresses are big-endian with a limited number of significant bits per
//! byte, seven for MIDI. Each byte may only hold values up to that limit.

use crate::render::CodecError;

/// Significant bits per byte of a MIDI address.
pub const MIDI_BITS: u32 = 7;

/// Add `offset` to `address`, byte by byte from the least significant end.
///
/// The shorter operand is zero-extended on the left. Without `carry` a byte
/// sum above the per-byte maximum is an error. With `carry` the excess moves
/// into the next byte, and a carry out of the most significant byte is
/// reported as [`CodecError::AddressCarry`] holding the widened result.
pub fn add_address(
    address: &[u8],
    offset: &[u8],
    bits: u32,
    carry: bool,
) -> Result<Vec<u8>, CodecError> {
    let bits = bits.clamp(1, 8);
    let max = (1u32 << bits) - 1;
    let len = address.len().max(offset.len());
    let digit = |bytes: &[u8], i: usize| {
        let pad = len - bytes.len();
        i.checked_sub(pad).map_or(0, |i| u32::from(bytes[i]))
    };

    let mut sum = vec![0u8; len];
    let mut carried = 0u32;
    for i in (0..len).rev() {
        let (a, b) = (digit(address, i), digit(offset, i));
        let mut byte = a + b + carried;
        carried = 0;
        if byte > max {
            if !carry {
                return Err(CodecError::AddressOverflow {
                    index: len - 1 - i,
                    a,
                    b,
                    max,
                });
            }
            carried = byte >> bits;
            byte &= max;
        }
        sum[i] = byte as u8;
    }

    if carried > 0 {
        sum.insert(0, carried as u8);
        return Err(CodecError::AddressCarry(sum));
    }
    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn offsets_add_from_the_low_byte() {
        assert_eq!(
            add_address(&[0x01, 0x00, 0x10], &[0x20], MIDI_BITS, false).unwrap(),
            vec![0x01, 0x00, 0x30]
        );
        assert_eq!(
            add_address(&[0x10], &[0x01, 0x00], MIDI_BITS, false).unwrap(),
            vec![0x01, 0x10]
        );
    }

    #[test]
    fn overflow_without_carry_is_an_error() {
        assert_eq!(
            add_address(&[0x01, 0x7F], &[0x01], MIDI_BITS, false).unwrap_err(),
            CodecError::AddressOverflow {
                index: 0,
                a: 0x7F,
                b: 0x01,
                max: 0x7F
            }
        );
        assert_eq!(add_address(&[0x7F], &[0x01], 8, false).unwrap(), vec![0x80]);
    }

    #[test]
    fn carry_moves_into_the_next_byte() {
        assert_eq!(
            add_address(&[0x01, 0x7F], &[0x01], MIDI_BITS, true).unwrap(),
            vec![0x02, 0x00]
        );
        assert_eq!(
            add_address(&[0x7F, 0x7F], &[0x00, 0x02], MIDI_BITS, true).unwrap_err(),
            CodecError::AddressCarry(vec![0x01, 0x00, 0x01])
        );
    }
}
