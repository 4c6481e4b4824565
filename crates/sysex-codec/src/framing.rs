//! Splitting a raw MIDI dump into System Exclusive messages.

use std::io::{self, Read};

/// Start of exclusive.
pub const SOX: u8 = 0xF0;
/// End of exclusive.
pub const EOX: u8 = 0xF7;
/// Active sensing keep-alive, dropped wherever it appears.
pub const ACTIVE_SENSE: u8 = 0xFE;

/// Iterator over the message bodies of a dump, without `F0`/`F7` framing.
///
/// Bytes before the first `F0` (or between messages) are skipped. A message
/// still open at the end of the input is dropped, as is one interrupted by a
/// new `F0`.
pub struct Packets<I> {
    bytes: I,
}

impl<I: Iterator<Item = u8>> Packets<I> {
    pub fn new(bytes: impl IntoIterator<IntoIter = I, Item = u8>) -> Self {
        Self {
            bytes: bytes.into_iter(),
        }
    }
}

impl<I: Iterator<Item = u8>> Iterator for Packets<I> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        self.bytes.by_ref().find(|b| *b == SOX)?;
        let mut message = Vec::new();
        loop {
            match self.bytes.next()? {
                ACTIVE_SENSE => continue,
                EOX => return Some(message),
                SOX => {
                    log::warn!(
                        "dropping unterminated sysex message of {} bytes",
                        message.len()
                    );
                    message.clear();
                }
                byte => message.push(byte),
            }
        }
    }
}

/// Messages of an in-memory dump.
pub fn packets(dump: &[u8]) -> Packets<std::iter::Copied<std::slice::Iter<'_, u8>>> {
    Packets::new(dump.iter().copied())
}

/// Read a whole dump and split it into messages.
pub fn read_packets<R: Read>(mut reader: R) -> io::Result<Vec<Vec<u8>>> {
    let mut dump = Vec::new();
    reader.read_to_end(&mut dump)?;
    Ok(packets(&dump).collect())
}
