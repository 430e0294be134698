//! Record envelope - the common wrapper for all output records.

use privpack_id::{RecordSeq, SimTime};
use serde::{Deserialize, Serialize};

use crate::{EventError, Record};

/// Current schema version of every record kind.
pub const RECORD_VERSION: i32 = 1;

/// The record envelope - common metadata for all records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEnvelope<P> {
    /// Monotonic position in the run's record stream.
    pub seq: RecordSeq,

    /// Simulated time at which the record was emitted.
    pub sim_time: SimTime,

    /// The record kind (e.g., "task.allocated", "metrics.reported").
    pub kind: String,

    /// Schema version for this record kind.
    pub version: i32,

    /// Record-specific payload.
    pub payload: P,
}

impl<P> RecordEnvelope<P> {
    /// Creates a new record envelope builder.
    pub fn builder() -> RecordEnvelopeBuilder<P> {
        RecordEnvelopeBuilder::new()
    }
}

impl RecordEnvelope<Record> {
    /// Wraps a record, taking the kind from the payload.
    pub fn wrap(seq: RecordSeq, sim_time: SimTime, record: Record) -> Self {
        Self {
            seq,
            sim_time,
            kind: record.kind().to_string(),
            version: RECORD_VERSION,
            payload: record,
        }
    }
}

/// Builder for constructing record envelopes.
#[derive(Debug)]
pub struct RecordEnvelopeBuilder<P> {
    seq: Option<RecordSeq>,
    sim_time: Option<SimTime>,
    kind: Option<String>,
    version: i32,
    payload: Option<P>,
}

impl<P> RecordEnvelopeBuilder<P> {
    pub fn new() -> Self {
        Self {
            seq: None,
            sim_time: None,
            kind: None,
            version: RECORD_VERSION,
            payload: None,
        }
    }

    pub fn seq(mut self, seq: RecordSeq) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn sim_time(mut self, sim_time: SimTime) -> Self {
        self.sim_time = Some(sim_time);
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the envelope. `sim_time` defaults to zero.
    pub fn build(self) -> Result<RecordEnvelope<P>, EventError> {
        Ok(RecordEnvelope {
            seq: self.seq.ok_or(EventError::MissingField("seq"))?,
            sim_time: self.sim_time.unwrap_or(SimTime::ZERO),
            kind: self.kind.ok_or(EventError::MissingField("kind"))?,
            version: self.version,
            payload: self.payload.ok_or(EventError::MissingField("payload"))?,
        })
    }
}

impl<P> Default for RecordEnvelopeBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}
