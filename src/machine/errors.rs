use crate::machine::isa::Platter;
use crate::types::encoding::DecodeError;
use um32_derive::Error;

/// Errors that can occur while loading or running a machine.
///
/// Loader failures (`BadProgramFile`, `TruncatedProgram`, `BadSnapshot`) are
/// returned synchronously before the engine starts. Everything else is
/// delivered through the completion handle and terminates the run. The
/// guest-misbehavior variants are diagnostics for conditions the machine
/// specification leaves undefined; a well-formed guest never triggers them.
#[derive(Debug, Error)]
pub enum MachineError {
    /// I/O failure reading the initial program stream.
    #[error("error reading program file: {0}")]
    BadProgramFile(String),
    /// Program stream length is not a whole number of platters.
    #[error("program file is {0} bytes, not a multiple of 4")]
    TruncatedProgram(usize),
    /// Snapshot stream failed to decode or validate.
    #[error("error decoding snapshot: {0}")]
    BadSnapshot(String),
    /// I/O failure (other than end of input) on the console input stream.
    #[error("error reading from console: {0}")]
    ConsoleInputFailure(String),
    /// I/O failure on the console output stream.
    #[error("error writing to console: {0}")]
    ConsoleOutputFailure(String),
    /// Instruction word names an operator outside 0..=13.
    #[error("illegal opcode {0}")]
    IllegalOpcode(u8),
    /// Execution finger moved past the end of the program array.
    #[error("execution finger {finger} is outside segment 0 (length {len})")]
    FingerOutOfRange { finger: Platter, len: usize },
    /// Guest addressed a segment that is not currently allocated.
    #[error("access to dead or unallocated segment {0}")]
    DeadSegment(Platter),
    /// Guest indexed a segment past its fixed length.
    #[error("offset {offset} is outside segment {segment} (length {len})")]
    SegmentOutOfRange {
        segment: Platter,
        offset: Platter,
        len: usize,
    },
    /// Guest attempted to abandon segment 0.
    #[error("segment 0 cannot be abandoned")]
    AbandonProgram,
    /// Guest divided by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// The engine thread died without sending a terminal status.
    #[error("engine terminated without reporting a status")]
    EngineVanished,
}

impl From<DecodeError> for MachineError {
    fn from(err: DecodeError) -> Self {
        MachineError::BadSnapshot(
            match err {
                DecodeError::UnexpectedEof => "unexpected end of input",
                DecodeError::InvalidValue => "invalid value",
                DecodeError::LengthOverflow => "length prefix too large",
            }
            .to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_interpolates_fields() {
        let err = MachineError::SegmentOutOfRange {
            segment: 3,
            offset: 10,
            len: 4,
        };
        assert_eq!(
            err.to_string(),
            "offset 10 is outside segment 3 (length 4)"
        );

        let err = MachineError::IllegalOpcode(14);
        assert_eq!(err.to_string(), "illegal opcode 14");
    }

    #[test]
    fn decode_error_converts_to_bad_snapshot() {
        let err: MachineError = DecodeError::UnexpectedEof.into();
        assert!(matches!(err, MachineError::BadSnapshot(ref reason) if reason == "unexpected end of input"));
    }
}
