//! Retry primitives for pending work re-evaluated over simulated time.
//!
//! A batch policy that cannot admit a task puts it back for the next
//! recomputation. This library decides whether that is still allowed:
//!
//! - **Retry bound**: how many times a task may be put back.
//! - **Deadline**: the simulated time after which admission is pointless.
//!
//! It also computes the configuration fingerprint stamped on run summaries.
//!
//! # Invariants
//!
//! - Decisions are deterministic given the same inputs
//! - A key's attempt count only grows until it is cleared
//! - With a retry bound, every key reaches a terminal verdict

use std::collections::BTreeMap;

use privpack_id::SimTime;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Reconcile errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The value could not be turned into JSON for hashing.
    #[error("cannot fingerprint value: {0}")]
    Serialization(String),
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// The key may be tried again; `attempt` failures so far.
    Retry { attempt: u32 },

    /// The retry bound was exceeded after `attempts` failures.
    Exhausted { attempts: u32 },

    /// The deadline has been reached.
    DeadlineExpired,
}

impl RetryVerdict {
    /// Returns true if the key may be tried again.
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }

    /// Returns true if the key has reached a terminal verdict.
    pub fn is_terminal(&self) -> bool {
        !self.is_retry()
    }
}

/// Bounds on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Maximum number of retries; `None` retries until the deadline.
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    pub fn bounded(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
        }
    }

    pub fn unbounded() -> Self {
        Self { max_retries: None }
    }
}

/// Retry tracker for deferred work.
#[derive(Debug, Clone)]
pub struct RetryTracker<K> {
    policy: RetryPolicy,

    /// Tracked failures: key -> (count, first failure time).
    failures: BTreeMap<K, (u32, SimTime)>,
}

impl<K: Ord + Clone> RetryTracker<K> {
    /// Create a new retry tracker.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Record a failed attempt for `key` at `now`.
    ///
    /// A deadline at or before `now` is terminal: any later attempt would
    /// happen after it.
    pub fn record_failure(
        &mut self,
        key: &K,
        now: SimTime,
        deadline: Option<SimTime>,
    ) -> RetryVerdict {
        let (count, _) = self.failures.entry(key.clone()).or_insert((0, now));
        *count += 1;
        let count = *count;

        if deadline.is_some_and(|d| d <= now) {
            return RetryVerdict::DeadlineExpired;
        }
        match self.policy.max_retries {
            Some(max) if count > max => RetryVerdict::Exhausted { attempts: count },
            _ => RetryVerdict::Retry { attempt: count },
        }
    }

    /// Failures recorded for `key`.
    pub fn failures(&self, key: &K) -> u32 {
        self.failures.get(key).map_or(0, |(count, _)| *count)
    }

    /// Time of the first recorded failure for `key`.
    pub fn first_failure(&self, key: &K) -> Option<SimTime> {
        self.failures.get(key).map(|(_, first)| *first)
    }

    /// Check if retries are exhausted for a key.
    pub fn is_exhausted(&self, key: &K) -> bool {
        match self.policy.max_retries {
            Some(max) => self.failures(key) > max,
            None => false,
        }
    }

    /// Clear failure tracking for a key (on success or terminal rejection).
    pub fn clear(&mut self, key: &K) {
        self.failures.remove(key);
    }

    /// Drop entries whose keys are no longer live.
    pub fn retain(&mut self, mut live: impl FnMut(&K) -> bool) {
        self.failures.retain(|key, _| live(key));
    }

    /// Number of keys with recorded failures.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A fingerprint for deterministic comparison of configurations.
///
/// Two runs with the same fingerprint used the same effective settings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigFingerprint(String);

impl ConfigFingerprint {
    /// Compute a fingerprint from canonical JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let canonical = canonical_json(json);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&result[..16]))) // First 16 bytes (128 bits)
    }

    /// Compute a fingerprint of any serializable value.
    pub fn of<T: Serialize>(value: &T) -> Result<Self, ReconcileError> {
        let json =
            serde_json::to_value(value).map_err(|e| ReconcileError::Serialization(e.to_string()))?;
        Ok(Self::from_json(&json))
    }

    /// Get the fingerprint string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConfigFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("\"{}\":{}", escape_json_string(k), canonical_json(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        serde_json::Value::Array(arr) => {
            let inner: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        serde_json::Value::String(s) => format!("\"{}\"", escape_json_string(s)),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}
