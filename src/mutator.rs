//! Bulk label mutation
//!
//! [`BulkLabelMutator::apply`] turns an unbounded list of message
//! identifiers into a strictly sequential run of bounded batch calls
//! against a [`RemoteMailStore`]. A failing batch never stops the run:
//! its identifiers are counted as failed, the failure is recorded, and
//! the next batch proceeds.

use crate::batch::{BatchFailure, BatchState, BatchUnit, RetryPolicy, batch_count, partition};
use crate::config::SweepSettings;
use crate::error::ErrorKind;
use crate::label::LabelChange;
use crate::search;
use crate::store::{BatchModifyRequest, MAX_IDS_PER_CALL, MessageId, RemoteMailStore};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on identifiers per batch.
pub const MAX_BATCH_SIZE: usize = MAX_IDS_PER_CALL;

pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_millis(100);

pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Suggested wait after a quota failure when the provider gives none.
pub const DEFAULT_QUOTA_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Progress sink: `(processed, total)` identifiers.
pub type ProgressFn<'a> = Box<dyn FnMut(usize, usize) + Send + 'a>;

/// Per-call options for [`BulkLabelMutator::apply`].
pub struct MutationOptions<'a> {
    pub dry_run: bool,
    /// Clamped to [`MAX_BATCH_SIZE`]; zero is rejected.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub rate_limit_delay: Duration,
    pub retry: RetryPolicy,
    pub progress: Option<ProgressFn<'a>>,
    /// Checked between batches; an in-flight batch always completes.
    pub cancel: Option<CancellationToken>,
}

impl Default for MutationOptions<'_> {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: MAX_BATCH_SIZE,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            retry: RetryPolicy::default(),
            progress: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for MutationOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("dry_run", &self.dry_run)
            .field("batch_size", &self.batch_size)
            .field("rate_limit_delay", &self.rate_limit_delay)
            .field("retry", &self.retry)
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl<'a> MutationOptions<'a> {
    #[must_use]
    pub fn from_settings(settings: &SweepSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            rate_limit_delay: settings.rate_limit_delay,
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                base_delay: settings.retry_base_delay,
                ..RetryPolicy::default()
            },
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    #[must_use]
    pub fn retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry.retryable_statuses = statuses.into_iter().collect();
        self
    }

    #[must_use]
    pub fn on_progress(mut self, progress: impl FnMut(usize, usize) + Send + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Batch size actually used: `min(batch_size, MAX_BATCH_SIZE)`.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.min(MAX_BATCH_SIZE)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Result of one attempted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    /// Offset of the batch's first identifier in the input.
    pub start: usize,
    pub size: usize,
    /// Remote calls made for this batch, retries included.
    pub attempts: u32,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<BatchFailure>,
}

impl BatchOutcome {
    fn succeeded(unit: &BatchUnit<'_>, attempts: u32) -> Self {
        Self {
            index: unit.index,
            start: unit.start,
            size: unit.ids.len(),
            attempts,
            succeeded: unit.ids.len(),
            failed: 0,
            failure: None,
        }
    }

    fn failed(unit: &BatchUnit<'_>, attempts: u32, failure: BatchFailure) -> Self {
        Self {
            index: unit.index,
            start: unit.start,
            size: unit.ids.len(),
            attempts,
            succeeded: 0,
            failed: unit.ids.len(),
            failure: Some(failure),
        }
    }
}

/// Outcome of [`BulkLabelMutator::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationResult {
    pub success: bool,
    /// Set for simulations; nothing was changed.
    pub dry_run: bool,
    /// Messages the change was applied to.
    pub marked_count: usize,
    pub failed_count: usize,
    /// Identifiers never attempted because the run was cancelled.
    pub skipped_count: usize,
    pub would_mark_count: usize,
    pub batches: Vec<BatchOutcome>,
    pub quota_exceeded: bool,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "crate::batch::optional_secs"
    )]
    pub retry_after: Option<Duration>,
    /// Identifiers from batches the store rejected as not found.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid_messages: Vec<MessageId>,
    pub cancelled: bool,
    pub message: String,
}

impl MutationResult {
    fn rejected(message: String) -> Self {
        Self {
            message,
            ..Self::default()
        }
    }

    /// Batches that did not succeed, in order.
    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.batches.iter().filter(|b| b.failure.is_some())
    }

    /// Total remote calls made, retries included.
    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.batches.iter().map(|b| b.attempts).sum()
    }
}

/// Running totals folded through the batch loop.
#[derive(Debug, Default)]
struct Tally {
    processed: usize,
    marked: usize,
    failed: usize,
    outcomes: Vec<BatchOutcome>,
    invalid: Vec<MessageId>,
}

impl Tally {
    fn record(mut self, unit: &BatchUnit<'_>, outcome: BatchOutcome) -> Self {
        self.processed += outcome.size;
        self.marked += outcome.succeeded;
        self.failed += outcome.failed;
        if outcome
            .failure
            .as_ref()
            .is_some_and(|f| f.kind == ErrorKind::NotFound)
        {
            self.invalid.extend_from_slice(unit.ids);
        }
        self.outcomes.push(outcome);
        self
    }

    fn into_result(self, total: usize, cancelled: bool) -> MutationResult {
        let quota_hints: Vec<Option<Duration>> = self
            .outcomes
            .iter()
            .filter_map(|b| b.failure.as_ref())
            .filter(|f| f.kind == ErrorKind::QuotaExceeded)
            .map(|f| f.retry_after)
            .collect();
        let quota_exceeded = !quota_hints.is_empty();
        let retry_after = quota_exceeded.then(|| {
            quota_hints
                .into_iter()
                .flatten()
                .max()
                .unwrap_or(DEFAULT_QUOTA_RETRY_AFTER)
        });

        let skipped = total - self.processed;
        let batches = self.outcomes.len();
        let mut message = format!(
            "Updated {} of {total} message(s) in {batches} batch(es)",
            self.marked
        );
        if self.failed > 0 {
            message.push_str(&format!(", {} failed", self.failed));
        }
        if let Some(wait) = retry_after {
            message.push_str(&format!(
                "; quota exceeded, retry after {}s",
                wait.as_secs()
            ));
        }
        if cancelled {
            message.push_str(&format!("; cancelled with {skipped} not attempted"));
        }

        MutationResult {
            success: self.failed == 0 && !cancelled,
            dry_run: false,
            marked_count: self.marked,
            failed_count: self.failed,
            skipped_count: skipped,
            would_mark_count: 0,
            batches: self.outcomes,
            quota_exceeded,
            retry_after,
            invalid_messages: self.invalid,
            cancelled,
            message,
        }
    }
}

/// Applies label changes to a remote store in bounded batches.
pub struct BulkLabelMutator<S> {
    store: S,
    account: String,
}

impl<S: RemoteMailStore> BulkLabelMutator<S> {
    #[must_use]
    pub fn new(store: S, account: impl Into<String>) -> Self {
        Self {
            store,
            account: account.into(),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Apply `change` to every identifier in `ids`.
    ///
    /// Never fails as a whole: malformed input, empty input and
    /// dry-runs return without touching the store, and per-batch
    /// failures are reported in the result.
    pub async fn apply(
        &self,
        ids: &[MessageId],
        change: &LabelChange,
        mut options: MutationOptions<'_>,
    ) -> MutationResult {
        if let Some(problem) = validate(ids, change, &options) {
            warn!("Rejected label mutation: {}", problem);
            return MutationResult::rejected(problem);
        }

        if ids.is_empty() {
            return MutationResult {
                success: true,
                message: format!("No messages to {}", describe(change)),
                ..MutationResult::default()
            };
        }

        if options.dry_run {
            info!("Dry run: would {} {} message(s)", describe(change), ids.len());
            return MutationResult {
                success: true,
                dry_run: true,
                would_mark_count: ids.len(),
                message: format!(
                    "Dry run: would {} {} message(s); no changes made",
                    describe(change),
                    ids.len()
                ),
                ..MutationResult::default()
            };
        }

        let total = ids.len();
        let size = options.effective_batch_size();
        let batches = batch_count(total, size);
        info!(
            "Applying label change to {} message(s) in {} batch(es) of up to {}",
            total, batches, size
        );

        let mut tally = Tally::default();
        let mut cancelled = false;

        for unit in partition(ids, size) {
            if options.is_cancelled() {
                info!("Cancelled before batch {}/{}", unit.index + 1, batches);
                cancelled = true;
                break;
            }

            let outcome = self.run_batch(&unit, change, &options.retry).await;
            tally = tally.record(&unit, outcome);

            if let Some(progress) = options.progress.as_mut() {
                progress(tally.processed, total);
            }

            let is_last = unit.index + 1 == batches;
            if !is_last && !options.rate_limit_delay.is_zero() && !options.is_cancelled() {
                tokio::time::sleep(options.rate_limit_delay).await;
            }
        }

        let result = tally.into_result(total, cancelled);
        info!("{}", result.message);
        result
    }

    /// Search for `query` and apply `change` to every match.
    ///
    /// A failed search is logged and treated as no matches.
    pub async fn apply_matching(
        &self,
        query: &str,
        change: &LabelChange,
        max_results: Option<usize>,
        options: MutationOptions<'_>,
    ) -> MutationResult {
        let ids = search::search(&self.store, &self.account, Some(query), max_results).await;
        self.apply(&ids, change, options).await
    }

    /// Search for `query` and mark every match as read.
    pub async fn mark_read_matching(
        &self,
        query: &str,
        max_results: Option<usize>,
        options: MutationOptions<'_>,
    ) -> MutationResult {
        self.apply_matching(query, &LabelChange::mark_read(), max_results, options)
            .await
    }

    async fn run_batch(
        &self,
        unit: &BatchUnit<'_>,
        change: &LabelChange,
        policy: &RetryPolicy,
    ) -> BatchOutcome {
        let request = BatchModifyRequest {
            ids: unit.ids.to_vec(),
            change: change.clone(),
        };
        let mut state = BatchState::Pending;

        loop {
            state = state.dispatch();
            debug!("Batch {} ({} ids): {:?}", unit.index, unit.ids.len(), state);

            let result = self.store.batch_modify(&self.account, &request).await;

            match state.complete(result, policy) {
                BatchState::Succeeded { attempts } => {
                    debug!("Batch {} succeeded after {} attempt(s)", unit.index, attempts);
                    return BatchOutcome::succeeded(unit, attempts);
                }
                BatchState::Failed { attempts, failure } => {
                    warn!(
                        "Batch {} failed after {} attempt(s): {} ({})",
                        unit.index, attempts, failure.kind, failure.message
                    );
                    return BatchOutcome::failed(unit, attempts, failure);
                }
                BatchState::Retrying {
                    attempt,
                    delay,
                    failure,
                } => {
                    warn!(
                        "Batch {} attempt {} failed with status {}, retrying in {:?}",
                        unit.index, attempt, failure.status, delay
                    );
                    tokio::time::sleep(delay).await;
                    state = BatchState::Retrying {
                        attempt,
                        delay,
                        failure,
                    };
                }
                other => state = other,
            }
        }
    }
}

fn validate(ids: &[MessageId], change: &LabelChange, options: &MutationOptions<'_>) -> Option<String> {
    if change.is_empty() {
        return Some("Label change has no labels to add or remove".to_string());
    }
    if options.batch_size == 0 {
        return Some("Batch size must be at least 1".to_string());
    }
    ids.iter()
        .position(|id| id.as_str().trim().is_empty())
        .map(|pos| format!("Message identifier at position {pos} is blank"))
}

fn describe(change: &LabelChange) -> &'static str {
    if *change == LabelChange::mark_read() {
        "mark as read"
    } else if *change == LabelChange::mark_unread() {
        "mark as unread"
    } else if *change == LabelChange::trash() {
        "move to trash"
    } else if *change == LabelChange::archive() {
        "archive"
    } else {
        "relabel"
    }
}
