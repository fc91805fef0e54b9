//! Paginated message search
//!
//! Results are best-effort: a provider error part-way through stops
//! pagination and returns what was collected so far.

use crate::query::is_valid_query;
use crate::store::{ListRequest, MAX_IDS_PER_CALL, MessageId, RemoteMailStore};
use tracing::{debug, info, warn};

/// Collect identifiers matching `query`, following continuation tokens
/// until the results run out or `max_results` is reached.
///
/// An absent or blank query returns an empty list without contacting
/// the store.
pub async fn search<S: RemoteMailStore>(
    store: &S,
    account: &str,
    query: Option<&str>,
    max_results: Option<usize>,
) -> Vec<MessageId> {
    let Some(query) = query.filter(|q| is_valid_query(Some(q))) else {
        debug!("Skipping search for invalid query {:?}", query);
        return Vec::new();
    };

    let mut found = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let remaining = max_results.map(|cap| cap.saturating_sub(found.len()));
        if remaining == Some(0) {
            break;
        }

        let request = ListRequest {
            query: query.to_string(),
            max_results: Some(remaining.map_or(MAX_IDS_PER_CALL, |r| r.min(MAX_IDS_PER_CALL))),
            page_token: page_token.take(),
        };

        let page = match store.list_messages(account, &request).await {
            Ok(page) => page,
            Err(e) => {
                warn!(
                    "Search for '{}' failed after {} page(s), returning {} partial result(s): {}",
                    query,
                    pages,
                    found.len(),
                    e
                );
                break;
            }
        };
        pages += 1;

        if page.messages.is_empty() {
            break;
        }
        debug!("Search page {} returned {} message(s)", pages, page.messages.len());
        found.extend(page.messages);

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    if let Some(cap) = max_results {
        found.truncate(cap);
    }

    info!("Found {} messages matching '{}'", found.len(), query);
    found
}
