//! Chained events and envelopes

use crate::cid::Cid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An opaque domain event payload: a type tag plus arbitrary JSON data.
///
/// The canonical byte form from [`to_bytes`](Self::to_bytes) is what gets
/// hashed and persisted; those bytes are the authority for content
/// addressing, not this in-memory representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Event type tag, also used in transport subject names
    pub event_type: String,
    /// Event-specific data
    pub data: serde_json::Value,
}

impl EventPayload {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Canonical serialized form (serde_json with sorted object keys)
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A domain event wrapped with its content identifier and a link to the
/// CID of the immediately preceding event for the same aggregate.
///
/// `cid` is a pure function of the payload bytes and `previous_cid`, so
/// recomputing it detects any tampering with either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainedEvent {
    pub payload: EventPayload,
    pub cid: Cid,
    /// None only for the first event in a chain
    pub previous_cid: Option<Cid>,
}

impl ChainedEvent {
    /// Wrap a payload, computing its CID from the payload bytes and the
    /// predecessor's CID.
    pub fn new(payload: EventPayload, previous: Option<&Cid>) -> Result<Self, serde_json::Error> {
        let bytes = payload.to_bytes()?;
        Ok(Self {
            cid: Cid::from_chained(&bytes, previous),
            previous_cid: previous.copied(),
            payload,
        })
    }

    /// Recompute the CID from the stored payload and previous link and
    /// compare it to the stored CID.
    pub fn verify(&self) -> bool {
        match self.payload.to_bytes() {
            Ok(bytes) => Cid::from_chained(&bytes, self.previous_cid.as_ref()) == self.cid,
            Err(_) => false,
        }
    }
}

/// The unit stored and transmitted: a chained event bound to its aggregate
/// and position.
///
/// `sequence` is the ordering authority (strictly increasing per aggregate,
/// starting at 0); `timestamp` is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub aggregate_id: String,
    pub sequence: u64,
    pub event: ChainedEvent,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(aggregate_id: impl Into<String>, sequence: u64, event: ChainedEvent) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            sequence,
            event,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for the wrapped event's CID
    pub fn cid(&self) -> Cid {
        self.event.cid
    }
}
