//! Mailbox labels and label changes
//!
//! Provides a strongly-typed enum for provider labels instead of raw
//! strings. Well-known system labels have dedicated variants; user
//! labels use the `Custom` variant.

use crate::folder::Folder;
use serde::{Serialize, Serializer};
use std::fmt;

/// A provider label.
///
/// # Examples
///
/// ```
/// use inbox_sweeper::Label;
///
/// assert_eq!(Label::Unread.as_str(), "UNREAD");
/// assert_eq!(Label::from("newsletters"), Label::Custom("newsletters".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    /// Message has not been read.
    Unread,
    /// Message is starred / flagged for attention.
    Starred,
    Important,
    Inbox,
    Spam,
    Trash,
    /// A user-defined label.
    Custom(String),
}

impl Label {
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// The provider label id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unread => "UNREAD",
            Self::Starred => "STARRED",
            Self::Important => "IMPORTANT",
            Self::Inbox => "INBOX",
            Self::Spam => "SPAM",
            Self::Trash => "TRASH",
            Self::Custom(name) => name,
        }
    }

    /// The folder a `label:` search term selects on IMAP backends.
    ///
    /// `UNREAD` is a flag rather than a folder and selects none.
    #[must_use]
    pub fn folder(&self) -> Option<Folder> {
        match self {
            Self::Unread => None,
            Self::Inbox | Self::Important => Some(Folder::Inbox),
            Self::Starred => Some(Folder::Starred),
            Self::Spam => Some(Folder::Spam),
            Self::Trash => Some(Folder::Trash),
            Self::Custom(name) => Some(Folder::label(name)),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "UNREAD" => Self::Unread,
            "STARRED" => Self::Starred,
            "IMPORTANT" => Self::Important,
            "INBOX" => Self::Inbox,
            "SPAM" => Self::Spam,
            "TRASH" => Self::Trash,
            _ => Self::Custom(s.to_string()),
        }
    }
}

/// Labels to add to and remove from a set of messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelChange {
    pub add: Vec<Label>,
    pub remove: Vec<Label>,
}

impl LabelChange {
    /// Remove `UNREAD`.
    #[must_use]
    pub fn mark_read() -> Self {
        Self::default().remove(Label::Unread)
    }

    /// Add `UNREAD`.
    #[must_use]
    pub fn mark_unread() -> Self {
        Self::default().add(Label::Unread)
    }

    /// Add `TRASH`.
    #[must_use]
    pub fn trash() -> Self {
        Self::default().add(Label::Trash)
    }

    /// Remove `INBOX`.
    #[must_use]
    pub fn archive() -> Self {
        Self::default().remove(Label::Inbox)
    }

    #[must_use]
    pub fn add(mut self, label: Label) -> Self {
        self.add.push(label);
        self
    }

    #[must_use]
    pub fn remove(mut self, label: Label) -> Self {
        self.remove.push(label);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}
