//! Batch partitioning and the per-batch retry state machine
//!
//! A batch moves through
//!
//! ```text
//! Pending -> InFlight -> Succeeded
//!               |  ^
//!               v  |
//!            Retrying        (transient error, retries left)
//!               |
//!               v
//!             Failed         (non-retryable error or retries exhausted)
//! ```
//!
//! Transitions are pure: the driver in [`crate::mutator`] performs the
//! remote call and the sleeps, and feeds results back through
//! [`BatchState::complete`].

use crate::error::{ErrorKind, StoreError};
use crate::store::MessageId;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

/// A contiguous run of identifiers submitted in one remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchUnit<'a> {
    /// Position of this batch in submission order.
    pub index: usize,
    /// Offset of the first identifier in the original list.
    pub start: usize,
    pub ids: &'a [MessageId],
}

/// Split `ids` into batches of at most `size`, in order.
///
/// # Panics
///
/// Panics if `size` is zero.
pub fn partition(ids: &[MessageId], size: usize) -> impl Iterator<Item = BatchUnit<'_>> {
    ids.chunks(size)
        .enumerate()
        .map(move |(index, chunk)| BatchUnit {
            index,
            start: index * size,
            ids: chunk,
        })
}

/// Number of batches `len` identifiers produce at `size` per batch.
#[must_use]
pub const fn batch_count(len: usize, size: usize) -> usize {
    len.div_ceil(size)
}

/// Decides which failures are retried and how long to wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub retryable_statuses: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            retryable_statuses: BTreeSet::from([500, 502, 503, 504]),
        }
    }
}

impl RetryPolicy {
    /// Classify a store failure.
    ///
    /// 403, 404 and 429 keep their fixed meaning even if listed as
    /// retryable.
    #[must_use]
    pub fn classify(&self, error: &StoreError) -> ErrorKind {
        match error.status {
            403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::NotFound,
            429 => ErrorKind::QuotaExceeded,
            status if self.retryable_statuses.contains(&status) => ErrorKind::Transient,
            _ => ErrorKind::Unknown,
        }
    }

    /// Delay before retry number `retry` (zero-based): `base * 2^retry`.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }

    /// The full backoff schedule, one entry per permitted retry.
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|retry| self.backoff(retry)).collect()
    }
}

/// Why a batch did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub kind: ErrorKind,
    pub status: u16,
    /// Raw provider message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", with = "optional_secs")]
    pub retry_after: Option<Duration>,
}

impl BatchFailure {
    #[must_use]
    pub fn new(kind: ErrorKind, error: StoreError) -> Self {
        Self {
            kind,
            status: error.status,
            message: error.body,
            retry_after: error.retry_after,
        }
    }
}

/// Lifecycle of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    /// `attempt` is one-based.
    InFlight { attempt: u32 },
    Retrying {
        attempt: u32,
        delay: Duration,
        failure: BatchFailure,
    },
    Succeeded { attempts: u32 },
    Failed { attempts: u32, failure: BatchFailure },
}

impl BatchState {
    /// Begin the next attempt. No-op for in-flight and terminal states.
    #[must_use]
    pub fn dispatch(self) -> Self {
        match self {
            Self::Pending => Self::InFlight { attempt: 1 },
            Self::Retrying { attempt, .. } => Self::InFlight {
                attempt: attempt + 1,
            },
            other => other,
        }
    }

    /// Record the result of the in-flight attempt.
    #[must_use]
    pub fn complete(self, result: Result<(), StoreError>, policy: &RetryPolicy) -> Self {
        let Self::InFlight { attempt } = self else {
            return self;
        };

        match result {
            Ok(()) => Self::Succeeded { attempts: attempt },
            Err(error) => {
                let kind = policy.classify(&error);
                let failure = BatchFailure::new(kind, error);
                if kind == ErrorKind::Transient && attempt <= policy.max_retries {
                    Self::Retrying {
                        attempt,
                        delay: policy.backoff(attempt - 1),
                        failure,
                    }
                } else {
                    Self::Failed {
                        attempts: attempt,
                        failure,
                    }
                }
            }
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

pub(crate) mod optional_secs {
    use serde::Serializer;
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }
}
