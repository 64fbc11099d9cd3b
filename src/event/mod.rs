//! Chained events, envelopes, validation, and wire form

mod chained;
mod graph_events;
mod validator;
mod wire;

pub use chained::{ChainedEvent, EventEnvelope, EventPayload};
pub use graph_events::{replay, Annotations, GraphEvent, Projection, ReplayError};
pub use validator::{ChainError, ChainValidator};
pub use wire::{
    aggregate_subject, event_subject, wildcard_subject, WireEnvelope, WireError, CODEC_JSON,
};
