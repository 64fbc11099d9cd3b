//! Transport wire form and subject naming
//!
//! The wire envelope is transport-agnostic: any binding (NATS, plain
//! sockets, files) carries this JSON shape. Subject naming follows the
//! `{domain}.events.{aggregate_id}.{event_type}` convention so bindings can
//! offer wildcard subscriptions on `{domain}.events.>`.

use super::chained::{ChainedEvent, EventEnvelope, EventPayload};
use crate::cid::{Cid, CidError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Codec tag for JSON payload bytes
pub const CODEC_JSON: &str = "application/json";

/// Errors from decoding a wire envelope
#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid cid: {0}")]
    InvalidCid(#[from] CidError),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("unsupported payload codec: {0}")]
    UnsupportedCodec(String),

    #[error("payload decode failed: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The envelope shape shared with external collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub aggregate_id: String,
    pub sequence: u64,
    pub cid: String,
    pub previous_cid: Option<String>,
    pub payload: Vec<u8>,
    pub payload_codec: String,
    /// RFC3339
    pub timestamp: String,
}

impl WireEnvelope {
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Self, serde_json::Error> {
        Ok(Self {
            aggregate_id: envelope.aggregate_id.clone(),
            sequence: envelope.sequence,
            cid: envelope.event.cid.to_string(),
            previous_cid: envelope.event.previous_cid.map(|c| c.to_string()),
            payload: envelope.event.payload.to_bytes()?,
            payload_codec: CODEC_JSON.to_string(),
            timestamp: envelope.timestamp.to_rfc3339(),
        })
    }

    pub fn into_envelope(self) -> Result<EventEnvelope, WireError> {
        if self.payload_codec != CODEC_JSON {
            return Err(WireError::UnsupportedCodec(self.payload_codec));
        }
        let cid = Cid::parse(&self.cid)?;
        let previous_cid = self.previous_cid.as_deref().map(Cid::parse).transpose()?;
        let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| WireError::InvalidTimestamp(e.to_string()))?
            .with_timezone(&Utc);
        Ok(EventEnvelope {
            aggregate_id: self.aggregate_id,
            sequence: self.sequence,
            event: ChainedEvent {
                payload: EventPayload::from_bytes(&self.payload)?,
                cid,
                previous_cid,
            },
            timestamp,
        })
    }

    /// The subject this envelope is published on
    pub fn subject(&self, domain: &str) -> String {
        let event_type = EventPayload::from_bytes(&self.payload)
            .map(|p| p.event_type)
            .unwrap_or_else(|_| "unknown".to_string());
        event_subject(domain, &self.aggregate_id, &event_type)
    }
}

/// `{domain}.events.{aggregate_id}.{event_type}`
pub fn event_subject(domain: &str, aggregate_id: &str, event_type: &str) -> String {
    format!("{domain}.events.{aggregate_id}.{event_type}")
}

/// Wildcard subject matching every event in a domain
pub fn wildcard_subject(domain: &str) -> String {
    format!("{domain}.events.>")
}

/// Wildcard subject matching every event for one aggregate
pub fn aggregate_subject(domain: &str, aggregate_id: &str) -> String {
    format!("{domain}.events.{aggregate_id}.>")
}
