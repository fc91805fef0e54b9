//! IMAP folder types
//!
//! Proton Bridge exposes system folders at the top level, user labels
//! under `Labels/` and user folders under `Folders/`. Search terms such
//! as `label:Work` or `in:spam` resolve to one of these.

use std::fmt;

/// An IMAP mailbox folder.
///
/// # Examples
///
/// ```
/// use inbox_sweeper::Folder;
///
/// assert_eq!(Folder::Inbox.as_str(), "INBOX");
/// assert_eq!(Folder::label("Receipts").as_str(), "Labels/Receipts");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Folder {
    Inbox,
    Sent,
    Drafts,
    Trash,
    Spam,
    Archive,
    Starred,
    /// Every message in the account.
    AllMail,
    /// A fully qualified folder path.
    Custom(String),
}

impl Folder {
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// The Bridge folder holding messages with user label `name`.
    #[must_use]
    pub fn label(name: &str) -> Self {
        Self::Custom(format!("Labels/{name}"))
    }

    /// The IMAP folder name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Inbox => "INBOX",
            Self::Sent => "Sent",
            Self::Drafts => "Drafts",
            Self::Trash => "Trash",
            Self::Spam => "Spam",
            Self::Archive => "Archive",
            Self::Starred => "Starred",
            Self::AllMail => "All Mail",
            Self::Custom(name) => name,
        }
    }

    /// Resolve the value of an `in:` search term.
    ///
    /// Well-known names are matched case-insensitively; anything else
    /// is taken as a literal folder path.
    #[must_use]
    pub fn from_search_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "inbox" => Self::Inbox,
            "sent" => Self::Sent,
            "drafts" | "draft" => Self::Drafts,
            "trash" => Self::Trash,
            "spam" | "junk" => Self::Spam,
            "archive" => Self::Archive,
            "starred" => Self::Starred,
            "anywhere" | "all" => Self::AllMail,
            _ => Self::Custom(name.to_string()),
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Folder {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("inbox") {
            Self::Inbox
        } else {
            match s {
                "Sent" => Self::Sent,
                "Drafts" => Self::Drafts,
                "Trash" => Self::Trash,
                "Spam" => Self::Spam,
                "Archive" => Self::Archive,
                "Starred" => Self::Starred,
                "All Mail" => Self::AllMail,
                other => Self::Custom(other.to_string()),
            }
        }
    }
}
