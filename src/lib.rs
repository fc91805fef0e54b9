//! Bulk mailbox cleanup for Proton Mail
//!
//! Searches a mailbox through [Proton Bridge](https://proton.me/mail/bridge)
//! and applies label changes to the matches in bounded batches: mark as
//! read, move to trash, archive. [`BulkLabelMutator`] owns the batching, retry,
//! rate-limit and partial-failure logic and works against any
//! [`RemoteMailStore`]; [`ImapMailStore`] is the IMAP implementation.
//!
//! ```no_run
//! use inbox_sweeper::{BulkLabelMutator, ImapConfig, ImapMailStore, MutationOptions};
//!
//! # async fn run() -> inbox_sweeper::Result<()> {
//! let store = ImapMailStore::new(ImapConfig::from_env()?);
//! let mutator = BulkLabelMutator::new(store, "me");
//! let result = mutator
//!     .mark_read_matching("from:newsletter.com is:unread", None, MutationOptions::default())
//!     .await;
//! println!("{}", result.message);
//! # Ok(())
//! # }
//! ```

mod batch;
mod config;
mod connection;
mod error;
mod flag;
mod folder;
mod imap_store;
mod label;
mod mutator;
mod query;
mod search;
mod store;

pub use batch::{BatchFailure, BatchState, BatchUnit, RetryPolicy, batch_count, partition};
pub use config::{ImapConfig, SweepSettings};
pub use error::{Error, ErrorKind, Result, StoreError};
pub use flag::{Flag, FlagUpdate, ImapChange, StoreOp, imap_change};
pub use folder::Folder;
pub use imap_store::{ImapMailStore, SELF_ACCOUNT};
pub use label::{Label, LabelChange};
pub use mutator::{
    BatchOutcome, BulkLabelMutator, DEFAULT_QUOTA_RETRY_AFTER, DEFAULT_RATE_LIMIT_DELAY,
    DEFAULT_RETRY_BASE_DELAY, MAX_BATCH_SIZE, MutationOptions, MutationResult, ProgressFn,
};
pub use query::{Age, AgeUnit, ImapSearch, QueryBuilder, SearchTerm, is_valid_query, parse_query};
pub use search::search;
pub use store::{
    BatchModifyRequest, ListPage, ListRequest, MAX_IDS_PER_CALL, MessageId, RemoteMailStore,
};
