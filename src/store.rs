//! The remote message store consumed by the mutator and search.

use crate::error::StoreError;
use crate::label::LabelChange;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Largest number of identifiers the store accepts in one call.
pub const MAX_IDS_PER_CALL: usize = 100;

/// Opaque message handle, scoped to one account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Body of one batch label mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchModifyRequest {
    pub ids: Vec<MessageId>,
    pub change: LabelChange,
}

/// One page request of a message search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub query: String,
    pub max_results: Option<usize>,
    pub page_token: Option<String>,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub messages: Vec<MessageId>,
    pub next_page_token: Option<String>,
}

/// A provider's message store.
///
/// Both calls complete before the caller proceeds; neither is retried
/// by the implementation.
pub trait RemoteMailStore {
    /// Apply `request.change` to every message in `request.ids`.
    fn batch_modify(
        &self,
        account: &str,
        request: &BatchModifyRequest,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch one page of identifiers matching `request.query`.
    fn list_messages(
        &self,
        account: &str,
        request: &ListRequest,
    ) -> impl Future<Output = Result<ListPage, StoreError>> + Send;
}
