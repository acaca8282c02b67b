//! Program-file loading.
//!
//! A program file is a sequence of big-endian 32-bit platters with no
//! header; its contents become segment 0 verbatim.

use crate::machine::errors::MachineError;
use crate::machine::isa::Platter;
use std::io::Read;

/// Reads an entire program stream into a platter sequence.
///
/// The stream length must be a whole number of platters; a trailing partial
/// word is rejected rather than padded so a truncated download fails loudly.
pub(crate) fn read_program(mut reader: impl Read) -> Result<Vec<Platter>, MachineError> {
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|err| MachineError::BadProgramFile(err.to_string()))?;

    if data.len() % 4 != 0 {
        return Err(MachineError::TruncatedProgram(data.len()));
    }

    let mut platters = Vec::with_capacity(data.len() / 4);
    for chunk in data.chunks_exact(4) {
        platters.push(Platter::from_be_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3],
        ]));
    }
    Ok(platters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn big_endian_order_pinned() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0xDE, 0xAD, 0xBE, 0xEF];
        let platters = read_program(&bytes[..]).unwrap();
        assert_eq!(platters, vec![0x0102_0304, 0xDEAD_BEEF]);
    }

    #[test]
    fn empty_stream_is_empty_program() {
        let platters = read_program(&[][..]).unwrap();
        assert!(platters.is_empty());
    }

    #[test]
    fn rejects_partial_trailing_platter() {
        for len in [1, 2, 3, 5, 7] {
            let bytes = vec![0u8; len];
            let err = read_program(&bytes[..]).unwrap_err();
            assert!(matches!(err, MachineError::TruncatedProgram(n) if n == len));
        }
    }

    #[test]
    fn read_failure_is_bad_program_file() {
        struct FailingReader;

        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }

        let err = read_program(FailingReader).unwrap_err();
        assert!(matches!(err, MachineError::BadProgramFile(ref reason) if reason.contains("disk on fire")));
    }
}
