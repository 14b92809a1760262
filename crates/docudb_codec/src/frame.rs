//! Byte-level frames used by the binary and hybrid encodings.
//!
//! ## Checksum frame
//!
//! ```text
//! | sha256(payload) (32) | payload (N) |
//! ```
//!
//! ## Hybrid frame
//!
//! ```text
//! | metadata_len (4, big-endian) | metadata (metadata_len) | side payload (rest) |
//! ```
//!
//! The side payload of a hybrid frame is either empty or a checksum frame.

use crate::checksum::{sha256, CHECKSUM_LEN};
use crate::error::{CodecError, CodecResult};

/// Size of the hybrid metadata length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// A payload guarded by a SHA-256 checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumFrame<'a> {
    /// Checksum stored in front of the payload.
    pub checksum: [u8; CHECKSUM_LEN],
    /// The guarded bytes.
    pub payload: &'a [u8],
}

impl<'a> ChecksumFrame<'a> {
    /// Builds a frame for `payload`, computing its checksum.
    #[must_use]
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            checksum: sha256(payload),
            payload,
        }
    }

    /// Serializes the frame.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CHECKSUM_LEN + self.payload.len());
        buf.extend_from_slice(&self.checksum);
        buf.extend_from_slice(self.payload);
        buf
    }

    /// Splits `bytes` into checksum and payload without verifying.
    pub fn parse(bytes: &'a [u8]) -> CodecResult<Self> {
        if bytes.len() < CHECKSUM_LEN {
            return Err(CodecError::Truncated {
                needed: CHECKSUM_LEN,
                available: bytes.len(),
            });
        }
        let (head, payload) = bytes.split_at(CHECKSUM_LEN);
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(head);
        Ok(Self { checksum, payload })
    }

    /// Recomputes the checksum over the payload and compares.
    pub fn verify(&self) -> CodecResult<&'a [u8]> {
        let actual = sha256(self.payload);
        if actual != self.checksum {
            return Err(CodecError::corruption(&self.checksum, &actual));
        }
        Ok(self.payload)
    }

    /// Parses and verifies in one step, returning the payload.
    pub fn open(bytes: &'a [u8]) -> CodecResult<&'a [u8]> {
        Self::parse(bytes)?.verify()
    }
}

/// Wraps `payload` in a checksum frame.
#[must_use]
pub fn seal(payload: &[u8]) -> Vec<u8> {
    ChecksumFrame::new(payload).to_bytes()
}

/// The two halves of a hybrid-encoded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridFrame<'a> {
    /// JSON text of the document with large fields replaced by placeholders.
    pub metadata: &'a [u8],
    /// Checksum frame holding the split fields, or empty.
    pub side: &'a [u8],
}

impl<'a> HybridFrame<'a> {
    /// Serializes the frame.
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let len = u32::try_from(self.metadata.len())
            .map_err(|_| CodecError::invalid_document("hybrid metadata exceeds 4 GiB"))?;
        let mut buf =
            Vec::with_capacity(LENGTH_PREFIX_LEN + self.metadata.len() + self.side.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(self.metadata);
        buf.extend_from_slice(self.side);
        Ok(buf)
    }

    /// Splits a serialized hybrid frame.
    pub fn parse(bytes: &'a [u8]) -> CodecResult<Self> {
        if bytes.len() < LENGTH_PREFIX_LEN {
            return Err(CodecError::Truncated {
                needed: LENGTH_PREFIX_LEN,
                available: bytes.len(),
            });
        }
        let (prefix, rest) = bytes.split_at(LENGTH_PREFIX_LEN);
        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if rest.len() < len {
            return Err(CodecError::Truncated {
                needed: len,
                available: rest.len(),
            });
        }
        let (metadata, side) = rest.split_at(len);
        Ok(Self { metadata, side })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn checksum_frame_layout() {
        let bytes = seal(b"{}");
        assert_eq!(bytes.len(), CHECKSUM_LEN + 2);
        assert_eq!(&bytes[..CHECKSUM_LEN], &sha256(b"{}"));
        assert_eq!(&bytes[CHECKSUM_LEN..], b"{}");
    }

    #[test]
    fn checksum_frame_open() {
        let bytes = seal(b"payload");
        assert_eq!(ChecksumFrame::open(&bytes).unwrap(), b"payload");
    }

    #[test]
    fn checksum_frame_detects_flipped_payload_byte() {
        let mut bytes = seal(b"payload");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let err = ChecksumFrame::open(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Corruption { .. }));
    }

    #[test]
    fn checksum_frame_detects_flipped_checksum_byte() {
        let mut bytes = seal(b"payload");
        bytes[0] ^= 0xFF;
        assert!(ChecksumFrame::open(&bytes).unwrap_err().is_corruption());
    }

    #[test]
    fn checksum_frame_too_short() {
        let err = ChecksumFrame::open(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                needed: CHECKSUM_LEN,
                available: 10
            }
        );
    }

    #[test]
    fn hybrid_frame_layout() {
        let frame = HybridFrame {
            metadata: b"{\"a\":1}",
            side: b"xyz",
        };
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(&bytes[..4], &7u32.to_be_bytes());
        assert_eq!(HybridFrame::parse(&bytes).unwrap(), frame);
    }

    #[test]
    fn hybrid_frame_without_side_payload() {
        let frame = HybridFrame {
            metadata: b"{}",
            side: b"",
        };
        let bytes = frame.to_bytes().unwrap();
        let parsed = HybridFrame::parse(&bytes).unwrap();
        assert!(parsed.side.is_empty());
    }

    #[test]
    fn hybrid_frame_length_beyond_buffer() {
        let mut bytes = 100u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        assert!(matches!(
            HybridFrame::parse(&bytes),
            Err(CodecError::Truncated { needed: 100, .. })
        ));
    }

    proptest! {
        #[test]
        fn any_single_byte_flip_is_rejected(
            payload in prop::collection::vec(any::<u8>(), 1..256),
            position in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let mut bytes = seal(&payload);
            let at = position.index(bytes.len());
            bytes[at] ^= mask;
            prop_assert!(ChecksumFrame::open(&bytes).is_err());
        }
    }
}
