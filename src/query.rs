//! Search query construction, validation and IMAP translation
//!
//! Queries use the provider search syntax: space-separated `key:value`
//! terms such as `from:example.com`, `is:unread`, `subject:"weekly
//! digest"`, `older_than:30d` and `label:Receipts`. Backslashes and
//! double quotes inside a quoted value are escaped with a backslash.

use crate::error::{Error, Result};
use crate::folder::Folder;
use crate::label::Label;
use chrono::{Months, NaiveDate};

/// Builds a search query string from individual criteria.
///
/// # Examples
///
/// ```
/// use inbox_sweeper::QueryBuilder;
///
/// let query = QueryBuilder::new()
///     .from("newsletter.com")
///     .unread()
///     .subject("weekly \"deals\"")
///     .build();
/// assert_eq!(query, r#"from:newsletter.com is:unread subject:"weekly \"deals\"""#);
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    parts: Vec<String>,
}

impl QueryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(self, sender: &str) -> Self {
        self.push(format!("from:{sender}"))
    }

    #[must_use]
    pub fn to(self, recipient: &str) -> Self {
        self.push(format!("to:{recipient}"))
    }

    #[must_use]
    pub fn unread(self) -> Self {
        self.push("is:unread".to_string())
    }

    #[must_use]
    pub fn subject(self, text: &str) -> Self {
        self.push(format!("subject:{}", quote(text)))
    }

    /// `age` is a count plus unit, e.g. `30d`, `6m`, `1y`.
    #[must_use]
    pub fn older_than(self, age: &str) -> Self {
        self.push(format!("older_than:{age}"))
    }

    #[must_use]
    pub fn newer_than(self, age: &str) -> Self {
        self.push(format!("newer_than:{age}"))
    }

    #[must_use]
    pub fn label(self, name: &str) -> Self {
        self.push(format!("label:{name}"))
    }

    /// Append a pre-formed query fragment verbatim.
    #[must_use]
    pub fn raw(self, fragment: &str) -> Self {
        self.push(fragment.to_string())
    }

    #[must_use]
    pub fn build(&self) -> String {
        self.parts.join(" ")
    }

    fn push(mut self, part: String) -> Self {
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }
}

/// A query is valid when present and not blank.
#[must_use]
pub fn is_valid_query(query: Option<&str>) -> bool {
    query.is_some_and(|q| !q.trim().is_empty())
}

/// Unit of an `older_than` / `newer_than` age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeUnit {
    Day,
    Month,
    Year,
}

/// A relative age such as `30d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Age {
    pub amount: u32,
    pub unit: AgeUnit,
}

impl Age {
    fn parse(raw: &str) -> Result<Self> {
        let invalid = || Error::Query(format!("Invalid age '{raw}', expected e.g. 30d, 6m, 1y"));
        let (split, _) = raw.char_indices().last().ok_or_else(invalid)?;
        let (digits, unit) = raw.split_at(split);
        let amount: u32 = digits.parse().map_err(|_| invalid())?;
        let unit = match unit.to_ascii_lowercase().as_str() {
            "d" => AgeUnit::Day,
            "m" => AgeUnit::Month,
            "y" => AgeUnit::Year,
            _ => return Err(invalid()),
        };
        Ok(Self { amount, unit })
    }

    /// The date `self` before `today`.
    #[must_use]
    pub fn before(self, today: NaiveDate) -> NaiveDate {
        let date = match self.unit {
            AgeUnit::Day => today.checked_sub_days(chrono::Days::new(u64::from(self.amount))),
            AgeUnit::Month => today.checked_sub_months(Months::new(self.amount)),
            AgeUnit::Year => today.checked_sub_months(Months::new(self.amount.saturating_mul(12))),
        };
        date.unwrap_or(NaiveDate::MIN)
    }
}

/// One parsed query term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    From(String),
    To(String),
    Subject(String),
    Unread,
    Read,
    Starred,
    OlderThan(Age),
    NewerThan(Age),
    Label(String),
    In(String),
    /// Free text, including unrecognised `key:value` tokens.
    Text(String),
}

/// Parse a query string into terms.
///
/// # Errors
///
/// Returns [`Error::Query`] for an unterminated quote, an unsupported
/// `is:` value or a malformed age.
pub fn parse_query(query: &str) -> Result<Vec<SearchTerm>> {
    tokenize(query)?
        .into_iter()
        .map(|(key, value)| term(key.as_deref(), value))
        .collect()
}

fn term(key: Option<&str>, value: String) -> Result<SearchTerm> {
    let Some(key) = key else {
        return Ok(SearchTerm::Text(value));
    };
    Ok(match key.to_ascii_lowercase().as_str() {
        "from" => SearchTerm::From(value),
        "to" => SearchTerm::To(value),
        "subject" => SearchTerm::Subject(value),
        "is" => match value.to_ascii_lowercase().as_str() {
            "unread" => SearchTerm::Unread,
            "read" => SearchTerm::Read,
            "starred" => SearchTerm::Starred,
            other => return Err(Error::Query(format!("Unsupported term is:{other}"))),
        },
        "older_than" => SearchTerm::OlderThan(Age::parse(&value)?),
        "newer_than" => SearchTerm::NewerThan(Age::parse(&value)?),
        "label" => SearchTerm::Label(value),
        "in" => SearchTerm::In(value),
        _ => SearchTerm::Text(format!("{key}:{value}")),
    })
}

/// Split on unquoted whitespace into `(key, value)` pairs, removing
/// quotes and backslash escapes from values.
fn tokenize(query: &str) -> Result<Vec<(Option<String>, String)>> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = None;
        let mut value = String::new();
        let mut quoted = false;

        while let Some(c) = chars.next() {
            match c {
                '"' => quoted = !quoted,
                '\\' if quoted => {
                    if let Some(escaped) = chars.next() {
                        value.push(escaped);
                    }
                }
                ':' if !quoted && key.is_none() && is_key(&value) => {
                    key = Some(std::mem::take(&mut value));
                }
                c if c.is_whitespace() && !quoted => break,
                c => value.push(c),
            }
        }

        if quoted {
            return Err(Error::Query(format!("Unterminated quote in '{query}'")));
        }
        tokens.push((key, value));
    }

    Ok(tokens)
}

fn is_key(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A query translated into IMAP terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImapSearch {
    pub folder: Folder,
    /// RFC 3501 SEARCH criteria, `ALL` when the query had none.
    pub criteria: String,
}

impl ImapSearch {
    /// Translate a query; `today` anchors relative ages.
    ///
    /// `label:` and `in:` choose the folder (the last one wins);
    /// `default_folder` applies when neither is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the query does not parse.
    pub fn translate(query: &str, default_folder: &Folder, today: NaiveDate) -> Result<Self> {
        let mut folder = default_folder.clone();
        let mut criteria = Vec::new();

        for term in parse_query(query)? {
            match term {
                SearchTerm::From(v) => criteria.push(format!("FROM {}", quote(&v))),
                SearchTerm::To(v) => criteria.push(format!("TO {}", quote(&v))),
                SearchTerm::Subject(v) => criteria.push(format!("SUBJECT {}", quote(&v))),
                SearchTerm::Text(v) => criteria.push(format!("TEXT {}", quote(&v))),
                SearchTerm::Unread => criteria.push("UNSEEN".to_string()),
                SearchTerm::Read => criteria.push("SEEN".to_string()),
                SearchTerm::Starred => criteria.push("FLAGGED".to_string()),
                SearchTerm::OlderThan(age) => {
                    criteria.push(format!("BEFORE {}", imap_date(age.before(today))));
                }
                SearchTerm::NewerThan(age) => {
                    criteria.push(format!("SINCE {}", imap_date(age.before(today))));
                }
                SearchTerm::Label(name) => match Label::from(name.as_str()).folder() {
                    Some(selected) => folder = selected,
                    None => criteria.push("UNSEEN".to_string()),
                },
                SearchTerm::In(name) => folder = Folder::from_search_name(&name),
            }
        }

        let criteria = if criteria.is_empty() {
            "ALL".to_string()
        } else {
            criteria.join(" ")
        };
        Ok(Self { folder, criteria })
    }
}

fn imap_date(date: NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
