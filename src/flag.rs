//! IMAP flag mapping for provider labels
//!
//! IMAP has no labels; read state and stars are flags on the message,
//! and trash, spam and the inbox are folders. This module translates a
//! [`LabelChange`] into the `UID STORE` and `UID MOVE` operations that
//! realise it.

use crate::folder::Folder;
use crate::label::{Label, LabelChange};
use std::fmt;

/// An IMAP message flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// A user-defined keyword flag (no `\` prefix).
    Keyword(String),
}

impl Flag {
    /// The IMAP wire representation of this flag.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Flagged => "\\Flagged",
            Self::Keyword(kw) => kw,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

/// Whether a STORE adds or removes flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Add,
    Remove,
}

/// One `UID STORE` flag operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagUpdate {
    pub op: StoreOp,
    pub flags: Vec<Flag>,
}

impl FlagUpdate {
    /// The STORE data item, e.g. `+FLAGS.SILENT (\Seen)`.
    #[must_use]
    pub fn store_query(&self) -> String {
        let sign = match self.op {
            StoreOp::Add => '+',
            StoreOp::Remove => '-',
        };
        let flags: Vec<&str> = self.flags.iter().map(Flag::as_imap_str).collect();
        format!("{sign}FLAGS.SILENT ({})", flags.join(" "))
    }
}

/// What a label change does to a message on IMAP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImapChange {
    /// STORE operations, run in the source folder.
    pub updates: Vec<FlagUpdate>,
    /// Folder the messages are moved to once flags are set.
    pub destination: Option<Folder>,
}

impl ImapChange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.destination.is_none()
    }
}

/// Translate a label change into STORE and MOVE operations.
///
/// `UNREAD` is the absence of `\Seen`, so removing it adds the flag.
/// `TRASH`, `SPAM` and `INBOX` are folders on IMAP: adding one moves
/// the message there, removing `INBOX` archives it, and removing
/// `TRASH` or `SPAM` alone restores it to the inbox.
///
/// # Errors
///
/// Returns the first label that has no IMAP representation, or the
/// second of two conflicting destination folders.
pub fn imap_change(change: &LabelChange) -> Result<ImapChange, Label> {
    let mut add = Vec::new();
    let mut remove = Vec::new();

    for label in &change.add {
        match label {
            Label::Unread => remove.push(Flag::Seen),
            other => add.extend(imap_flag(other)?),
        }
    }
    for label in &change.remove {
        match label {
            Label::Unread => add.push(Flag::Seen),
            other => remove.extend(imap_flag(other)?),
        }
    }

    let mut updates = Vec::new();
    if !add.is_empty() {
        updates.push(FlagUpdate {
            op: StoreOp::Add,
            flags: add,
        });
    }
    if !remove.is_empty() {
        updates.push(FlagUpdate {
            op: StoreOp::Remove,
            flags: remove,
        });
    }

    Ok(ImapChange {
        updates,
        destination: destination(change)?,
    })
}

fn destination(change: &LabelChange) -> Result<Option<Folder>, Label> {
    let mut target = None;
    for label in &change.add {
        let folder = match label {
            Label::Trash => Folder::Trash,
            Label::Spam => Folder::Spam,
            Label::Inbox => Folder::Inbox,
            _ => continue,
        };
        if target.replace(folder).is_some() {
            return Err(label.clone());
        }
    }
    if target.is_some() {
        return Ok(target);
    }

    if change.remove.contains(&Label::Inbox) {
        Ok(Some(Folder::Archive))
    } else if change
        .remove
        .iter()
        .any(|l| matches!(l, Label::Trash | Label::Spam))
    {
        Ok(Some(Folder::Inbox))
    } else {
        Ok(None)
    }
}

/// The flag for a label, `None` for folder labels.
fn imap_flag(label: &Label) -> Result<Option<Flag>, Label> {
    match label {
        Label::Starred => Ok(Some(Flag::Flagged)),
        Label::Inbox | Label::Trash | Label::Spam => Ok(None),
        Label::Custom(name) if is_keyword(name) => Ok(Some(Flag::Keyword(name.clone()))),
        other => Err(other.clone()),
    }
}

/// RFC 3501 atom characters only.
fn is_keyword(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| {
            c.is_ascii_graphic() && !matches!(c, '(' | ')' | '{' | '%' | '*' | '"' | '\\' | ']')
        })
}
