//! Machine-state snapshot representation and serialization.
//!
//! A [`Snapshot`] is the complete image of a running machine: registers,
//! every live heap segment keyed by identifier, the next-identifier counter
//! and the execution finger. The wire form carries a magic header and a
//! format version so a foreign or newer-format stream is rejected with a
//! precise diagnostic instead of decoding into garbage.
//!
//! Segments are listed in ascending identifier order, which makes the
//! encoding deterministic: a decoded snapshot re-encodes to exactly the
//! stream it came from.

use crate::machine::errors::MachineError;
use crate::machine::isa::Platter;
use crate::types::encoding::{Decode, Encode};
use um32_derive::BinaryCodec;

/// Magic bytes identifying a serialized machine snapshot.
const MAGIC: &[u8; 5] = b"UM_SS";

/// Current snapshot format version.
const CURRENT_VERSION: Version = Version::new(0, 1, 0);

/// Semantic version for snapshot format compatibility.
#[derive(Debug, PartialEq, Eq, BinaryCodec)]
struct Version {
    major: u8,
    minor: u8,
    patch: u8,
}

impl Version {
    /// Creates a new version with the given components.
    const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

/// Serialized image of a machine's complete state.
///
/// Taken at the top of Input dispatch, after the fetch has already advanced
/// the finger past the Input instruction; restoring rewinds by one so that
/// the Input re-executes and consumes the first post-restore byte.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Snapshot {
    /// The eight general-purpose registers.
    pub registers: [Platter; 8],
    /// Live heap segments as (identifier, contents), ascending by identifier.
    /// Segment 0 is always present.
    pub segments: Vec<(Platter, Vec<Platter>)>,
    /// Identifier watermark: every live identifier is below this value.
    pub next_segment: Platter,
    /// Index into segment 0 of the next instruction to fetch.
    pub finger: Platter,
}

impl Snapshot {
    /// Serializes the snapshot with its magic header and version.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        MAGIC.encode(&mut out);
        CURRENT_VERSION.encode(&mut out);
        self.encode(&mut out);
        out
    }

    /// Deserializes a snapshot from its binary representation.
    ///
    /// Validates the magic header and version, rejecting streams from
    /// other programs or incompatible snapshot formats.
    pub fn from_bytes(mut input: &[u8]) -> Result<Self, MachineError> {
        if input.len() < MAGIC.len() {
            return Err(MachineError::BadSnapshot("truncated".to_string()));
        }

        if &<[u8; 5]>::decode(&mut input)? != MAGIC {
            return Err(MachineError::BadSnapshot("bad magic".to_string()));
        }

        if Version::decode(&mut input)? != CURRENT_VERSION {
            return Err(MachineError::BadSnapshot(
                "unsupported version".to_string(),
            ));
        }

        let snapshot = Snapshot::decode(&mut input)?;
        if !input.is_empty() {
            return Err(MachineError::BadSnapshot("trailing bytes".to_string()));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot {
            registers: [0, 1, 0xDEAD_BEEF, 3, 4, 5, 6, u32::MAX],
            segments: vec![
                (0, vec![0x7000_0000]),
                (1, vec![0, 0, 0]),
                (3, vec![42]),
            ],
            next_segment: 4,
            finger: 1,
        }
    }

    #[test]
    fn roundtrip() {
        let snapshot = sample();
        let bytes = snapshot.to_bytes();
        let decoded = Snapshot::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn reencode_is_bit_for_bit() {
        let bytes = sample().to_bytes();
        let decoded = Snapshot::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.to_bytes(), bytes);
    }

    #[test]
    fn from_bytes_truncated() {
        let err = Snapshot::from_bytes(&[0x00, 0x01]).unwrap_err();
        assert!(matches!(err, MachineError::BadSnapshot(ref reason) if reason == "truncated"));
    }

    #[test]
    fn from_bytes_bad_magic() {
        let err = Snapshot::from_bytes(b"BADMA\x00\x01\x00").unwrap_err();
        assert!(matches!(err, MachineError::BadSnapshot(ref reason) if reason == "bad magic"));
    }

    #[test]
    fn from_bytes_unsupported_version() {
        let mut bytes = Vec::new();
        MAGIC.encode(&mut bytes);
        Version::new(255, 0, 0).encode(&mut bytes);
        let err = Snapshot::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, MachineError::BadSnapshot(ref reason) if reason == "unsupported version"));
    }

    #[test]
    fn from_bytes_trailing_bytes() {
        let mut bytes = sample().to_bytes();
        bytes.push(0xFF);
        let err = Snapshot::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, MachineError::BadSnapshot(ref reason) if reason == "trailing bytes"));
    }

    #[test]
    fn from_bytes_cut_mid_body() {
        let bytes = sample().to_bytes();
        let err = Snapshot::from_bytes(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, MachineError::BadSnapshot(_)));
    }
}
