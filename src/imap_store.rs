//! [`RemoteMailStore`] over IMAP, for Proton Bridge
//!
//! Message identifiers are IMAP UIDs. A UID from the configured folder
//! is used bare (`42`); one found in another folder, through `label:`
//! or `in:`, carries that folder as a prefix (`Labels/Receipts:42`) so
//! later changes reach the same message. Every call opens its own
//! session and logs out when done.

use crate::config::ImapConfig;
use crate::connection::{ImapSession, connect, imap_error, select};
use crate::error::StoreError;
use crate::flag::{FlagUpdate, ImapChange, imap_change};
use crate::folder::Folder;
use crate::query::ImapSearch;
use crate::store::{
    BatchModifyRequest, ListPage, ListRequest, MAX_IDS_PER_CALL, MessageId, RemoteMailStore,
};
use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, info};

/// Account alias accepted in place of the login name.
pub const SELF_ACCOUNT: &str = "me";

/// Separates the folder from the UID in a qualified identifier.
const FOLDER_SEPARATOR: char = ':';

/// IMAP-backed message store
pub struct ImapMailStore {
    config: ImapConfig,
}

impl ImapMailStore {
    #[must_use]
    pub const fn new(config: ImapConfig) -> Self {
        Self { config }
    }

    /// The login name, which is the only account this store serves.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.config.username
    }

    fn check_account(&self, account: &str) -> Result<(), StoreError> {
        if account == SELF_ACCOUNT || account == self.config.username {
            Ok(())
        } else {
            Err(StoreError::new(
                403,
                format!("Account '{account}' is not served by this connection"),
            ))
        }
    }

    /// The identifier for `uid` found in `folder`.
    fn message_id(&self, folder: &Folder, uid: u32) -> MessageId {
        if folder.as_str() == self.config.folder {
            MessageId::new(uid.to_string())
        } else {
            MessageId::new(format!("{folder}{FOLDER_SEPARATOR}{uid}"))
        }
    }

    /// Split identifiers into per-folder UID sets, keeping the order in
    /// which folders first appear.
    fn locate(&self, ids: &[MessageId]) -> Result<Vec<(String, Vec<u32>)>, StoreError> {
        let mut groups: Vec<(String, Vec<u32>)> = Vec::new();
        for id in ids {
            let (folder, uid) = match id.as_str().rsplit_once(FOLDER_SEPARATOR) {
                Some((folder, uid)) if !folder.is_empty() => (folder, uid),
                _ => (self.config.folder.as_str(), id.as_str()),
            };
            let uid: u32 = uid
                .parse()
                .ok()
                .filter(|uid| *uid > 0)
                .ok_or_else(|| StoreError::new(404, format!("Invalid message id '{id}'")))?;

            match groups.iter_mut().find(|(name, _)| name == folder) {
                Some((_, uids)) => uids.push(uid),
                None => groups.push((folder.to_string(), vec![uid])),
            }
        }
        Ok(groups)
    }

    async fn apply_change(
        session: &mut ImapSession,
        folder: &str,
        uids: &[u32],
        change: &ImapChange,
    ) -> Result<(), StoreError> {
        select(session, folder).await?;
        let uid_set = uid_set(uids);

        for update in &change.updates {
            let query = update.store_query();
            debug!("UID STORE {} {} in {}", uid_set, query, folder);

            let responses: Vec<_> = session
                .uid_store(&uid_set, &query)
                .await
                .map_err(|e| imap_error("UID STORE", e))?
                .collect()
                .await;

            for response in responses {
                response.map_err(|e| imap_error("UID STORE", e))?;
            }
        }

        if let Some(destination) = &change.destination {
            if destination.as_str() == folder {
                debug!("Messages already in {}", folder);
                return Ok(());
            }
            debug!("UID MOVE {} {} -> {}", uid_set, folder, destination);
            session
                .uid_mv(&uid_set, destination.as_str())
                .await
                .map_err(|e| imap_error("UID MOVE", e))?;
        }
        Ok(())
    }
}

impl RemoteMailStore for ImapMailStore {
    async fn batch_modify(
        &self,
        account: &str,
        request: &BatchModifyRequest,
    ) -> Result<(), StoreError> {
        self.check_account(account)?;

        let change = imap_change(&request.change).map_err(|label| {
            StoreError::new(400, format!("Label {label} has no IMAP equivalent"))
        })?;
        let groups = self.locate(&request.ids)?;
        if change.is_empty() {
            return Ok(());
        }

        let mut session = connect(&self.config).await?;
        let result = async {
            if change.destination.is_some() {
                require_move(&mut session).await?;
            }
            for (folder, uids) in &groups {
                Self::apply_change(&mut session, folder, uids, &change).await?;
            }
            Ok::<_, StoreError>(())
        }
        .await;
        session.logout().await.ok();

        if result.is_ok() {
            info!(
                "Applied {} to {} message(s) in {} folder(s)",
                describe(&change),
                request.ids.len(),
                groups.len()
            );
        }
        result
    }

    async fn list_messages(
        &self,
        account: &str,
        request: &ListRequest,
    ) -> Result<ListPage, StoreError> {
        self.check_account(account)?;

        let default_folder = Folder::from(self.config.folder.as_str());
        let search = ImapSearch::translate(&request.query, &default_folder, Utc::now().date_naive())
            .map_err(|e| StoreError::new(400, e.to_string()))?;

        let after = match &request.page_token {
            Some(token) => token
                .parse::<u32>()
                .map_err(|_| StoreError::new(400, format!("Invalid page token '{token}'")))?,
            None => 0,
        };
        let criteria = if after > 0 {
            format!("{} UID {}:*", search.criteria, after.saturating_add(1))
        } else {
            search.criteria.clone()
        };

        let mut session = connect(&self.config).await?;
        let result = search_uids(&mut session, &search.folder, &criteria).await;
        session.logout().await.ok();

        // `n:*` matches the highest UID even when it is below n.
        let mut uids: Vec<u32> = result?.into_iter().filter(|uid| *uid > after).collect();
        uids.sort_unstable();

        let page = page_of(&uids, request.max_results);
        Ok(ListPage {
            messages: page
                .iter()
                .map(|uid| self.message_id(&search.folder, *uid))
                .collect(),
            next_page_token: (uids.len() > page.len())
                .then(|| page.last().map(ToString::to_string))
                .flatten(),
        })
    }
}

/// Fail with 400 unless the server advertises RFC 6851 MOVE.
async fn require_move(session: &mut ImapSession) -> Result<(), StoreError> {
    let capabilities = session
        .capabilities()
        .await
        .map_err(|e| imap_error("CAPABILITY", e))?;
    if capabilities.has_str("MOVE") {
        Ok(())
    } else {
        Err(StoreError::new(400, "Server does not support MOVE"))
    }
}

async fn search_uids(
    session: &mut ImapSession,
    folder: &Folder,
    criteria: &str,
) -> Result<Vec<u32>, StoreError> {
    select(session, folder.as_str()).await?;

    let uids = session
        .uid_search(criteria)
        .await
        .map_err(|e| imap_error("UID SEARCH", e))?;
    Ok(uids.into_iter().collect())
}

/// The leading page of ascending UIDs.
fn page_of(uids: &[u32], max_results: Option<usize>) -> &[u32] {
    let limit = max_results
        .unwrap_or(MAX_IDS_PER_CALL)
        .clamp(1, MAX_IDS_PER_CALL);
    &uids[..uids.len().min(limit)]
}

/// Render UIDs as an IMAP UID set, e.g. `3,7,42`.
fn uid_set(uids: &[u32]) -> String {
    let parts: Vec<String> = uids.iter().map(ToString::to_string).collect();
    parts.join(",")
}

fn describe(change: &ImapChange) -> String {
    let mut steps: Vec<String> = change.updates.iter().map(FlagUpdate::store_query).collect();
    if let Some(destination) = &change.destination {
        steps.push(format!("MOVE {destination}"));
    }
    steps.join(", ")
}
