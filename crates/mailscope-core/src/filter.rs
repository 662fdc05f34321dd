//! Backend filter expressions.
//!
//! Search terms, a target field, a received-time lower bound and a match
//! mode are turned into a DASL-style SQL filter:
//!
//! ```text
//! @SQL=("urn:schemas:httpmail:subject" LIKE '%net 30%' AND "urn:schemas:httpmail:subject" LIKE '%invoice%') AND "urn:schemas:httpmail:datereceived" >= '2026-01-17 10:00'
//! ```
//!
//! The same [`Filter`] evaluates client-side when the backend cannot
//! restrict an enumeration.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::MessageSummary;

/// Schema name of the received-time property.
pub const RECEIVED_SCHEMA: &str = "urn:schemas:httpmail:datereceived";

/// Format of the received-time literal.
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Message field a search targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    /// Subject line.
    #[default]
    Subject,
    /// Sender display name.
    Sender,
    /// Recipient display names.
    Recipient,
    /// Plain text body.
    Body,
}

impl SearchField {
    /// Parses a field name; unrecognized names fall back to subject.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "sender" | "from" => Self::Sender,
            "recipient" | "recipients" | "to" => Self::Recipient,
            "body" | "text" | "content" => Self::Body,
            _ => Self::Subject,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Sender => "sender",
            Self::Recipient => "recipient",
            Self::Body => "body",
        }
    }

    /// Backend schema name of the field.
    #[must_use]
    pub const fn schema_name(self) -> &'static str {
        match self {
            Self::Subject => "urn:schemas:httpmail:subject",
            Self::Sender => "urn:schemas:httpmail:fromname",
            Self::Recipient => "urn:schemas:httpmail:displayto",
            Self::Body => "urn:schemas:httpmail:textdescription",
        }
    }

    /// Text of this field used for client-side matching.
    ///
    /// Sender and recipients match on display names only, like their
    /// backend schema properties.
    fn text_of(self, message: &MessageSummary) -> String {
        match self {
            Self::Subject => message.subject.clone(),
            Self::Sender => message.sender.name.clone(),
            Self::Recipient => message
                .to
                .iter()
                .chain(&message.cc)
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            Self::Body => message.body.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a backend filter expression.
///
/// With `match_all` every term must match somewhere in the field; without
/// it any term suffices. The received-time bound is always ANDed on. Blank
/// terms are ignored, so an empty term list yields a date-only filter.
#[must_use]
pub fn build<S: AsRef<str>>(
    terms: &[S],
    since: DateTime<Utc>,
    field: SearchField,
    match_all: bool,
) -> String {
    let schema = field.schema_name();
    let clauses: Vec<String> = terms
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{schema}\" LIKE '%{}%'", escape_literal(t)))
        .collect();
    let date_clause = format!("\"{RECEIVED_SCHEMA}\" >= '{}'", since.format(DATE_FORMAT));

    match clauses.as_slice() {
        [] => format!("@SQL={date_clause}"),
        [only] => format!("@SQL={only} AND {date_clause}"),
        many => {
            let joiner = if match_all { " AND " } else { " OR " };
            format!("@SQL=({}) AND {date_clause}", many.join(joiner))
        }
    }
}

/// Escapes a term for use inside a single-quoted LIKE literal.
///
/// Quotes are doubled, LIKE wildcards are bracketed so they match
/// literally, and control characters are dropped.
#[must_use]
pub fn escape_literal(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        match c {
            '\'' => out.push_str("''"),
            '%' => out.push_str("[%]"),
            '_' => out.push_str("[_]"),
            '[' => out.push_str("[[]"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Splits a search string into terms.
///
/// Whitespace separates terms; double-quoted phrases stay together.
#[must_use]
pub fn split_terms(input: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                if !in_quotes && !current.trim().is_empty() {
                    terms.push(current.trim().to_string());
                    current.clear();
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        terms.push(current.trim().to_string());
    }
    terms
}

/// A typed filter: rendered for the backend, or evaluated locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Terms to look for (empty means "any message in the window").
    pub terms: Vec<String>,
    /// Oldest received time accepted.
    pub since: DateTime<Utc>,
    /// Field the terms are matched against.
    pub field: SearchField,
    /// Whether all terms must match.
    pub match_all: bool,
}

impl Filter {
    /// Backend filter expression (see [`build`]).
    #[must_use]
    pub fn expression(&self) -> String {
        build(&self.terms, self.since, self.field, self.match_all)
    }

    /// Evaluates the filter against a message with a pre-parsed received time.
    ///
    /// Messages whose received time is unknown never match, since they
    /// cannot be placed inside the window.
    #[must_use]
    pub fn matches(&self, message: &MessageSummary, received: Option<DateTime<Utc>>) -> bool {
        if !received.is_some_and(|t| t >= self.since) {
            return false;
        }

        let mut terms = self
            .terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .peekable();
        if terms.peek().is_none() {
            return true;
        }

        let haystack = self.field.text_of(message).to_lowercase();
        if self.match_all {
            terms.all(|t| haystack.contains(&t))
        } else {
            terms.any(|t| haystack.contains(&t))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;
    use crate::model::Recipient;

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 17, 10, 0, 0).unwrap()
    }

    /// Returns the string literals of an expression, or `None` if a literal
    /// is left unterminated.
    fn literals(expr: &str) -> Option<Vec<String>> {
        let mut out = Vec::new();
        let mut chars = expr.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '\'' {
                continue;
            }
            let mut lit = String::new();
            loop {
                match chars.next()? {
                    '\'' if chars.peek() == Some(&'\'') => {
                        chars.next();
                        lit.push('\'');
                    }
                    '\'' => break,
                    c => lit.push(c),
                }
            }
            out.push(lit);
        }
        Some(out)
    }

    #[test]
    fn test_single_term() {
        assert_eq!(
            build(&["invoice"], since(), SearchField::Subject, true),
            "@SQL=\"urn:schemas:httpmail:subject\" LIKE '%invoice%' AND \
             \"urn:schemas:httpmail:datereceived\" >= '2026-01-17 10:00'"
        );
    }

    #[test]
    fn test_match_all_is_per_term_conjunction() {
        let expr = build(&["net 30", "invoice"], since(), SearchField::Sender, true);
        assert_eq!(
            expr,
            "@SQL=(\"urn:schemas:httpmail:fromname\" LIKE '%net 30%' AND \
             \"urn:schemas:httpmail:fromname\" LIKE '%invoice%') AND \
             \"urn:schemas:httpmail:datereceived\" >= '2026-01-17 10:00'"
        );
    }

    #[test]
    fn test_match_any_is_disjunction_with_date_anded() {
        let expr = build(&["a", "b", "c"], since(), SearchField::Body, false);
        assert!(expr.starts_with("@SQL=(\"urn:schemas:httpmail:textdescription\" LIKE '%a%' OR "));
        assert!(expr.ends_with(") AND \"urn:schemas:httpmail:datereceived\" >= '2026-01-17 10:00'"));
        assert_eq!(expr.matches(" OR ").count(), 2);
    }

    #[test]
    fn test_no_terms_is_date_only() {
        let empty: [&str; 0] = [];
        assert_eq!(
            build(&empty, since(), SearchField::Subject, true),
            "@SQL=\"urn:schemas:httpmail:datereceived\" >= '2026-01-17 10:00'"
        );
        assert_eq!(
            build(&["  "], since(), SearchField::Subject, true),
            build(&empty, since(), SearchField::Subject, false)
        );
    }

    #[test]
    fn test_quote_is_escaped() {
        let expr = build(&["O'Brien' OR 1=1 --"], since(), SearchField::Sender, true);
        let lits = literals(&expr).unwrap();
        assert_eq!(lits, vec!["%O'Brien' OR 1=1 --%", "2026-01-17 10:00"]);
    }

    #[test]
    fn test_wildcards_are_literal() {
        assert_eq!(escape_literal("50%_off[1]"), "50[%][_]off[[]1]");
        assert_eq!(escape_literal("a\nb"), "ab");
    }

    #[test]
    fn test_field_names() {
        assert_eq!(SearchField::from_name("From"), SearchField::Sender);
        assert_eq!(SearchField::from_name(" recipient "), SearchField::Recipient);
        assert_eq!(SearchField::from_name("to"), SearchField::Recipient);
        assert_eq!(SearchField::from_name("BODY"), SearchField::Body);
        assert_eq!(SearchField::from_name("headers"), SearchField::Subject);
        assert_eq!(SearchField::Body.to_string(), "body");
    }

    #[test]
    fn test_split_terms() {
        assert_eq!(split_terms("  invoice   march "), vec!["invoice", "march"]);
        assert_eq!(
            split_terms("\"net 30\" invoice"),
            vec!["net 30".to_string(), "invoice".to_string()]
        );
        assert_eq!(split_terms("\"unterminated phrase"), vec!["unterminated phrase"]);
        assert!(split_terms("   ").is_empty());
    }

    fn message(subject: &str) -> MessageSummary {
        MessageSummary {
            id: "1".to_string(),
            subject: subject.to_string(),
            sender: Recipient::new("Billing Team", "billing@example.com"),
            received: String::new(),
            unread: false,
            has_attachments: false,
            size: 0,
            to: vec![Recipient::new("Me", "me@example.com")],
            cc: Vec::new(),
            body: None,
            attachments: None,
        }
    }

    #[test]
    fn test_client_side_matching() {
        let inside = Some(since() + chrono::TimeDelta::hours(1));
        let before = Some(since() - chrono::TimeDelta::hours(1));
        let mut filter = Filter {
            terms: vec!["invoice".to_string(), "march".to_string()],
            since: since(),
            field: SearchField::Subject,
            match_all: true,
        };

        let msg = message("Your INVOICE for March");
        assert!(filter.matches(&msg, inside));
        assert!(!filter.matches(&msg, before));
        assert!(!filter.matches(&msg, None));
        assert!(!filter.matches(&message("Invoice"), inside));

        filter.match_all = false;
        assert!(filter.matches(&message("Invoice"), inside));

        filter.field = SearchField::Sender;
        filter.terms = vec!["billing".to_string()];
        assert!(filter.matches(&msg, inside));
        filter.terms = vec!["example.com".to_string()];
        assert!(!filter.matches(&msg, inside));

        filter.field = SearchField::Recipient;
        assert!(!filter.matches(&msg, inside));
        filter.terms = vec!["me".to_string()];
        assert!(filter.matches(&msg, inside));

        filter.field = SearchField::Body;
        assert!(!filter.matches(&msg, inside));

        filter.terms.clear();
        assert!(filter.matches(&msg, inside));
    }

    proptest! {
        #[test]
        fn prop_build_is_pure(terms in proptest::collection::vec(".{0,12}", 0..4), all in any::<bool>()) {
            let a = build(&terms, since(), SearchField::Subject, all);
            let b = build(&terms, since(), SearchField::Subject, all);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_literals_never_break_out(term in "[a-z' %_\\[\\]]{1,16}") {
            let expr = build(&[term.as_str()], since(), SearchField::Subject, true);
            let lits = literals(&expr);
            prop_assert!(lits.is_some());
            let lits = lits.unwrap();
            if term.trim().is_empty() {
                prop_assert_eq!(lits.len(), 1);
            } else {
                prop_assert_eq!(lits.len(), 2);
                prop_assert_eq!(&lits[1], "2026-01-17 10:00");
            }
        }
    }
}
