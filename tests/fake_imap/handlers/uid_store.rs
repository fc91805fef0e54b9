//! UID STORE command handler.
//!
//! Modifies `\Seen`, `\Flagged` and keyword flags on messages
//! identified by UID:
//!
//! - `+FLAGS (...)` adds, `-FLAGS (...)` removes, `FLAGS (...)`
//!   replaces
//! - the `.SILENT` forms suppress the per-message FETCH responses
//!
//! When the mailbox has a scripted failure queued, the command is
//! answered with that response and no flags change.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::{Mailbox, TestEmail};
use imap_codec::imap_types::flag::{Flag, StoreResponse, StoreType};
use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Expand a `SequenceSet` into UIDs, `*` standing for `max_uid`.
pub fn extract_uids(seq_set: &SequenceSet, max_uid: u32) -> Vec<u32> {
    let value = |s: &SeqOrUid| match s {
        SeqOrUid::Value(v) => v.get(),
        SeqOrUid::Asterisk => max_uid,
    };

    let mut uids = Vec::new();
    for seq in seq_set.0.as_ref() {
        match seq {
            Sequence::Single(s) => uids.push(value(s)),
            Sequence::Range(a, b) => {
                let (lo, hi) = (value(a).min(value(b)), value(a).max(value(b)));
                uids.extend(lo..=hi);
            }
        }
    }
    uids
}

/// Parsed STORE command arguments.
pub struct StoreArgs<'a> {
    pub sequence_set: &'a SequenceSet,
    pub kind: &'a StoreType,
    pub response: &'a StoreResponse,
    pub flags: &'a [Flag<'a>],
}

/// Handle the UID STORE command.
pub async fn handle_uid_store<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    args: &StoreArgs<'_>,
    mailbox: &Mutex<Mailbox>,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    // Mutate under lock (no await inside).
    let outcome = {
        let mut mb = mailbox.lock().unwrap();
        mb.store_calls += 1;
        if let Some(Some(failure)) = mb.store_script.pop_front() {
            Err(failure)
        } else if let Some(folder) = mb.get_folder_mut(folder_name) {
            let max_uid = folder.emails.iter().map(|e| e.uid).max().unwrap_or(0);
            let uids = extract_uids(args.sequence_set, max_uid);

            let mut results = Vec::new();
            for (idx, email) in folder.emails.iter_mut().enumerate() {
                if uids.contains(&email.uid) {
                    apply(email, args.kind, args.flags);
                    results.push((idx + 1, email.uid, current_flags(email)));
                }
            }
            Ok(results)
        } else {
            Err("BAD Folder not found".to_string())
        }
    };

    let results = match outcome {
        Ok(results) => results,
        Err(failure) => {
            let _ = write_line(stream, &format!("{tag} {failure}\r\n")).await;
            return;
        }
    };

    if !matches!(args.response, StoreResponse::Silent) {
        for (seq, uid, flags) in &results {
            let line = format!("* {seq} FETCH (UID {uid} FLAGS ({flags}))\r\n");
            if write_line(stream, &line).await.is_err() {
                return;
            }
        }
    }

    let resp = format!("{tag} OK STORE completed\r\n");
    let _ = write_line(stream, &resp).await;
}

fn apply(email: &mut TestEmail, kind: &StoreType, flags: &[Flag<'_>]) {
    let keywords: Vec<String> = flags
        .iter()
        .filter_map(|f| match f {
            Flag::Keyword(atom) => Some(atom.inner().to_string()),
            _ => None,
        })
        .collect();
    let seen = flags.iter().any(|f| matches!(f, Flag::Seen));
    let flagged = flags.iter().any(|f| matches!(f, Flag::Flagged));

    match kind {
        StoreType::Add => {
            email.seen |= seen;
            email.flagged |= flagged;
            for keyword in keywords {
                if !email.keywords.contains(&keyword) {
                    email.keywords.push(keyword);
                }
            }
        }
        StoreType::Remove => {
            email.seen &= !seen;
            email.flagged &= !flagged;
            email.keywords.retain(|k| !keywords.contains(k));
        }
        StoreType::Replace => {
            email.seen = seen;
            email.flagged = flagged;
            email.keywords = keywords;
        }
    }
}

fn current_flags(email: &TestEmail) -> String {
    let mut flags = Vec::new();
    if email.seen {
        flags.push("\\Seen".to_string());
    }
    if email.flagged {
        flags.push("\\Flagged".to_string());
    }
    flags.extend(email.keywords.iter().cloned());
    flags.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use std::num::NonZeroU32;
    use tokio::io::BufReader;

    fn uid_set(uids: &[u32]) -> SequenceSet {
        let seqs: Vec<Sequence> = uids
            .iter()
            .map(|uid| Sequence::Single(SeqOrUid::Value(NonZeroU32::new(*uid).unwrap())))
            .collect();
        SequenceSet(seqs.try_into().unwrap())
    }

    fn make_raw_email() -> Vec<u8> {
        b"From: a@b.com\r\nSubject: Test\r\n\r\nBody".to_vec()
    }

    async fn run_store(
        seq: &SequenceSet,
        kind: &StoreType,
        response: &StoreResponse,
        flags: &[Flag<'_>],
        mailbox: &Mutex<Mailbox>,
        selected: Option<&str>,
    ) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        let args = StoreArgs {
            sequence_set: seq,
            kind,
            response,
            flags,
        };
        handle_uid_store("A1", &args, mailbox, selected, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn inbox(seen: &[bool]) -> Mutex<Mailbox> {
        let raw = make_raw_email();
        let mut builder = MailboxBuilder::new().folder("INBOX");
        for (i, s) in seen.iter().enumerate() {
            builder = builder.email(u32::try_from(i).unwrap() + 1, *s, &raw);
        }
        Mutex::new(builder.build())
    }

    #[tokio::test]
    async fn add_seen_flag() {
        let mb = inbox(&[false]);

        let output = run_store(
            &uid_set(&[1]),
            &StoreType::Add,
            &StoreResponse::Answer,
            &[Flag::Seen],
            &mb,
            Some("INBOX"),
        )
        .await;

        assert!(output.contains("FLAGS (\\Seen)"));
        assert!(output.contains("A1 OK STORE completed"));
        assert_eq!(mb.lock().unwrap().seen_uids("INBOX"), vec![1]);
    }

    #[tokio::test]
    async fn silent_store_sends_only_tagged_ok() {
        let mb = inbox(&[false, false, false]);

        let output = run_store(
            &uid_set(&[1, 3]),
            &StoreType::Add,
            &StoreResponse::Silent,
            &[Flag::Seen],
            &mb,
            Some("INBOX"),
        )
        .await;

        assert_eq!(output, "A1 OK STORE completed\r\n");
        assert_eq!(mb.lock().unwrap().seen_uids("INBOX"), vec![1, 3]);
    }

    #[tokio::test]
    async fn remove_seen_flag() {
        let mb = inbox(&[true]);

        run_store(
            &uid_set(&[1]),
            &StoreType::Remove,
            &StoreResponse::Answer,
            &[Flag::Seen],
            &mb,
            Some("INBOX"),
        )
        .await;

        assert!(mb.lock().unwrap().seen_uids("INBOX").is_empty());
    }

    #[tokio::test]
    async fn add_flagged() {
        let mb = inbox(&[false]);

        run_store(
            &uid_set(&[1]),
            &StoreType::Add,
            &StoreResponse::Answer,
            &[Flag::Flagged],
            &mb,
            Some("INBOX"),
        )
        .await;

        assert!(mb.lock().unwrap().get_folder("INBOX").unwrap().emails[0].flagged);
    }

    #[tokio::test]
    async fn scripted_failure_leaves_flags_alone() {
        let raw = make_raw_email();
        let mb = Mutex::new(
            MailboxBuilder::new()
                .folder("INBOX")
                .email(1, false, &raw)
                .store_fails("NO [OVERQUOTA] Quota exceeded")
                .build(),
        );

        let output = run_store(
            &uid_set(&[1]),
            &StoreType::Add,
            &StoreResponse::Silent,
            &[Flag::Seen],
            &mb,
            Some("INBOX"),
        )
        .await;

        assert_eq!(output, "A1 NO [OVERQUOTA] Quota exceeded\r\n");
        let mb = mb.lock().unwrap();
        assert!(mb.seen_uids("INBOX").is_empty());
        assert_eq!(mb.store_calls, 1);
    }

    #[tokio::test]
    async fn no_folder_selected_returns_bad() {
        let mb = inbox(&[]);

        let output = run_store(
            &uid_set(&[1]),
            &StoreType::Add,
            &StoreResponse::Answer,
            &[Flag::Seen],
            &mb,
            None,
        )
        .await;

        assert!(output.contains("A1 BAD No folder selected"));
    }

    #[test]
    fn extract_open_range() {
        let set = SequenceSet(
            vec![Sequence::Range(
                SeqOrUid::Value(NonZeroU32::new(3).unwrap()),
                SeqOrUid::Asterisk,
            )]
            .try_into()
            .unwrap(),
        );
        assert_eq!(extract_uids(&set, 5), vec![3, 4, 5]);
        // `3:*` with a smaller max still yields the max.
        assert_eq!(extract_uids(&set, 2), vec![2, 3]);
    }
}
