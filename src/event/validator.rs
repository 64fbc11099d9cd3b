//! Event chain validation

use super::chained::EventEnvelope;
use crate::cid::Cid;
use thiserror::Error;

/// Errors from walking an event chain.
///
/// `TamperedAt` is fatal: trust in that aggregate's history must stop and
/// the condition reported to an operator. It is never auto-recovered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain tampered at sequence {0}")]
    TamperedAt(u64),

    #[error("sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    #[error("payload serialization failed at sequence {sequence}: {message}")]
    Serialization { sequence: u64, message: String },
}

/// Walks a sequence of envelopes and confirms hash continuity and content
/// integrity.
pub struct ChainValidator;

impl ChainValidator {
    /// Validate a full chain, in sequence order starting at 0.
    ///
    /// Checks, per envelope: the sequence number is contiguous, the CID
    /// recomputed from the payload bytes and previous link matches the
    /// stored CID, and `previous_cid` matches the prior envelope's CID.
    /// Any hash or link mismatch is reported as `TamperedAt(sequence)`.
    pub fn validate(envelopes: &[EventEnvelope]) -> Result<(), ChainError> {
        let mut previous: Option<Cid> = None;
        for (i, envelope) in envelopes.iter().enumerate() {
            let expected = i as u64;
            if envelope.sequence != expected {
                return Err(ChainError::SequenceGap {
                    expected,
                    got: envelope.sequence,
                });
            }
            Self::validate_entry(
                envelope.sequence,
                &envelope.event.payload.to_bytes().map_err(|e| {
                    ChainError::Serialization {
                        sequence: envelope.sequence,
                        message: e.to_string(),
                    }
                })?,
                envelope.event.cid,
                envelope.event.previous_cid,
                previous,
            )?;
            previous = Some(envelope.event.cid);
        }
        Ok(())
    }

    /// Validate one link given raw payload bytes, used by the store to
    /// verify against the persisted blobs rather than re-serialized
    /// payloads.
    pub fn validate_entry(
        sequence: u64,
        payload_bytes: &[u8],
        stored_cid: Cid,
        stored_previous: Option<Cid>,
        actual_previous: Option<Cid>,
    ) -> Result<(), ChainError> {
        if stored_previous != actual_previous {
            return Err(ChainError::TamperedAt(sequence));
        }
        let recomputed = Cid::from_chained(payload_bytes, actual_previous.as_ref());
        if recomputed != stored_cid {
            return Err(ChainError::TamperedAt(sequence));
        }
        Ok(())
    }
}
