//! Typed id definitions and simulated time.
//!
//! Each id type has a unique prefix that identifies the resource type.
//! Ids are sequence numbers handed out by an [`IdSequence`].

use std::marker::PhantomData;

use crate::define_id;
use crate::IdError;

// =============================================================================
// Resources
// =============================================================================

define_id!(BlockId, "blk");
define_id!(TaskId, "task");

/// Monotonic generator for typed ids.
///
/// The first id handed out is `0`.
#[derive(Debug, Clone)]
pub struct IdSequence<T> {
    next: u64,
    _marker: PhantomData<T>,
}

impl<T: From<u64>> IdSequence<T> {
    /// Creates a sequence starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a sequence whose first id is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: first,
            _marker: PhantomData,
        }
    }

    /// Returns the next id and advances the sequence.
    pub fn next_id(&mut self) -> T {
        let id = self.next;
        self.next += 1;
        T::from(id)
    }

    /// Number of ids handed out so far (for a sequence starting at zero).
    #[must_use]
    pub const fn issued(&self) -> u64 {
        self.next
    }
}

impl<T: From<u64>> Default for IdSequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Output Records
// =============================================================================

/// Record sequence number, a simple monotonic integer over the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RecordSeq(u64);

impl RecordSeq {
    /// The first sequence number of a run.
    pub const FIRST: Self = Self(1);

    /// Creates a new RecordSeq from a u64.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for RecordSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for RecordSeq {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for RecordSeq {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let seq = u64::deserialize(deserializer)?;
        Ok(Self(seq))
    }
}

// =============================================================================
// Simulated Time
// =============================================================================

/// A point on the simulated clock.
///
/// Always finite and non-negative, which makes the `total_cmp` ordering a
/// proper total order usable as a heap or map key.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimTime(f64);

impl SimTime {
    /// Start of every simulation.
    pub const ZERO: Self = Self(0.0);

    /// Creates a timestamp, rejecting NaN, infinities and negative values.
    pub fn new(value: f64) -> Result<Self, IdError> {
        if !value.is_finite() {
            return Err(IdError::NonFiniteTime(value));
        }
        if value < 0.0 {
            return Err(IdError::NegativeTime(value));
        }
        // Normalize -0.0 so equal timestamps hash and compare equal.
        Ok(Self(value + 0.0))
    }

    /// Returns the raw value in simulated time units.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.0
    }

    /// Returns this timestamp shifted forward by `delta` units.
    ///
    /// Negative or non-finite deltas leave the timestamp unchanged.
    #[must_use]
    pub fn advance(&self, delta: f64) -> Self {
        if delta.is_finite() && delta > 0.0 {
            Self(self.0 + delta)
        } else {
            *self
        }
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    #[must_use]
    pub fn since(&self, earlier: SimTime) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::hash::Hash for SimTime {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t={}", self.0)
    }
}

impl TryFrom<f64> for SimTime {
    type Error = IdError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SimTime> for f64 {
    fn from(time: SimTime) -> Self {
        time.0
    }
}

impl serde::Serialize for SimTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for SimTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_block_id_display_and_parse() {
        let id = BlockId::new(3);
        assert_eq!(id.to_string(), "blk_3");
        assert_eq!("blk_3".parse::<BlockId>().unwrap(), id);
        assert_eq!("3".parse::<BlockId>().unwrap(), id);
    }

    #[test]
    fn test_task_id_invalid_prefix() {
        let result: Result<TaskId, _> = "blk_3".parse();
        assert!(matches!(
            result.unwrap_err(),
            IdError::InvalidPrefix { expected: "task", .. }
        ));
    }

    #[test]
    fn test_id_empty_and_garbage() {
        assert!("".parse::<TaskId>().unwrap_err().is_empty());
        assert!(matches!(
            "task_abc".parse::<TaskId>().unwrap_err(),
            IdError::InvalidNumber(_)
        ));
    }

    #[test]
    fn test_id_serializes_as_integer() {
        let json = serde_json::to_string(&TaskId::new(42)).unwrap();
        assert_eq!(json, "42");
        let parsed: TaskId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, TaskId::new(42));
    }

    #[test]
    fn test_id_sequence_is_monotonic() {
        let mut seq: IdSequence<BlockId> = IdSequence::new();
        let a = seq.next_id();
        let b = seq.next_id();
        assert_eq!(a, BlockId::new(0));
        assert_eq!(b, BlockId::new(1));
        assert!(a < b);
        assert_eq!(seq.issued(), 2);
    }

    #[test]
    fn test_sim_time_rejects_invalid_values() {
        assert!(SimTime::new(f64::NAN).unwrap_err().is_time_error());
        assert!(SimTime::new(f64::INFINITY).is_err());
        assert!(matches!(
            SimTime::new(-1.0).unwrap_err(),
            IdError::NegativeTime(_)
        ));
        assert_eq!(SimTime::new(-0.0).unwrap(), SimTime::ZERO);
    }

    #[test]
    fn test_sim_time_advance_and_since() {
        let t = SimTime::new(2.5).unwrap();
        assert_eq!(t.advance(1.5).value(), 4.0);
        assert_eq!(t.advance(-3.0), t);
        assert_eq!(t.since(SimTime::ZERO), 2.5);
        assert_eq!(SimTime::ZERO.since(t), 0.0);
    }

    #[test]
    fn test_sim_time_deserialize_rejects_negative() {
        let result: Result<SimTime, _> = serde_json::from_str("-4.0");
        assert!(result.is_err());
    }

    #[test]
    fn test_record_seq_next() {
        assert_eq!(RecordSeq::FIRST.next().value(), 2);
    }

    proptest! {
        #[test]
        fn sim_time_order_matches_f64(a in 0.0f64..1e9, b in 0.0f64..1e9) {
            let ta = SimTime::new(a).unwrap();
            let tb = SimTime::new(b).unwrap();
            prop_assert_eq!(ta.cmp(&tb), a.partial_cmp(&b).unwrap());
        }
    }
}
