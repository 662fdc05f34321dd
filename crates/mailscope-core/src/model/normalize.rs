//! Conversion of backend items into [`MessageSummary`].
//!
//! This is the only place where the heterogeneous shapes a backend hands
//! out (sender as one string or as a name/address pair, recipients as a
//! delimited string, missing subjects) are reconciled.

use super::{AttachmentInfo, MessageSummary, Recipient};
use crate::backend::{RawItem, RawSender};

/// Placeholder subject for messages without one.
const NO_SUBJECT: &str = "(no subject)";

/// Errors converting a backend item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// The item carries no identifier.
    #[error("item has no identifier")]
    MissingId,
}

impl MessageSummary {
    /// Normalizes a backend item.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::MissingId`] if the item has a blank identifier.
    pub fn from_raw(raw: RawItem) -> Result<Self, ConversionError> {
        let id = raw.id.trim();
        if id.is_empty() {
            return Err(ConversionError::MissingId);
        }

        let sender = match raw.sender {
            RawSender::Missing => Recipient::default(),
            RawSender::Text(text) => parse_address(&text),
            RawSender::Structured { name, address } if address.trim().is_empty() => {
                parse_address(&name)
            }
            RawSender::Structured { name, address } => {
                Recipient::new(unquote(&name), address.trim())
            }
        };

        let attachments = raw.attachments.map(|list| {
            list.into_iter()
                .map(|a| AttachmentInfo {
                    name: a.name,
                    size: a.size,
                })
                .collect::<Vec<_>>()
        });
        let has_attachments =
            raw.attachment_count > 0 || attachments.as_ref().is_some_and(|a| !a.is_empty());

        let subject = raw
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_SUBJECT)
            .to_string();

        Ok(Self {
            id: id.to_string(),
            subject,
            sender,
            received: raw.received.as_deref().map(str::trim).unwrap_or_default().to_string(),
            unread: raw.unread,
            has_attachments,
            size: raw.size,
            to: split_recipients(&raw.to),
            cc: split_recipients(&raw.cc),
            body: raw.body,
            attachments,
        })
    }
}

/// Parses `"Name <addr>"`, `"<addr>"`, `"addr"` or `"Name"`.
pub(crate) fn parse_address(raw: &str) -> Recipient {
    let raw = raw.trim();

    if let Some(open) = raw.rfind('<')
        && let Some(rel_close) = raw[open..].find('>')
    {
        let address = raw[open + 1..open + rel_close].trim();
        return Recipient::new(unquote(&raw[..open]), address);
    }

    if raw.contains('@') && !raw.contains(' ') {
        Recipient::new("", unquote(raw))
    } else {
        Recipient::new(unquote(raw), "")
    }
}

/// Splits a recipient list string.
///
/// Semicolons separate entries when present (names like `Doe, John` are
/// common in that style); otherwise commas outside quotes and angle
/// brackets do.
pub(crate) fn split_recipients(raw: &str) -> Vec<Recipient> {
    let separator = if contains_outside_quotes(raw, ';') {
        ';'
    } else {
        ','
    };

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    for c in raw.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            c if c == separator && !in_quotes && !in_angle => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);

    parts
        .iter()
        .map(|p| parse_address(p))
        .filter(|r| !r.is_empty())
        .collect()
}

fn contains_outside_quotes(raw: &str, needle: char) -> bool {
    let mut in_quotes = false;
    raw.chars().any(|c| {
        if c == '"' {
            in_quotes = !in_quotes;
        }
        c == needle && !in_quotes
    })
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::RawAttachment;

    fn raw(id: &str) -> RawItem {
        RawItem {
            id: id.to_string(),
            subject: Some("  Hello  ".to_string()),
            received: Some(" 2026-01-24 10:00:00 ".to_string()),
            ..RawItem::default()
        }
    }

    #[test]
    fn test_missing_id_is_rejected() {
        assert_eq!(MessageSummary::from_raw(raw("  ")), Err(ConversionError::MissingId));
    }

    #[test]
    fn test_basic_fields_are_trimmed() {
        let msg = MessageSummary::from_raw(raw(" abc ")).unwrap();
        assert_eq!(msg.id, "abc");
        assert_eq!(msg.subject, "Hello");
        assert_eq!(msg.received, "2026-01-24 10:00:00");
        assert!(msg.body.is_none());
        assert!(msg.attachments.is_none());
    }

    #[test]
    fn test_missing_subject_placeholder() {
        let mut item = raw("a");
        item.subject = Some("   ".to_string());
        assert_eq!(MessageSummary::from_raw(item).unwrap().subject, "(no subject)");
    }

    #[test]
    fn test_sender_shapes() {
        let mut item = raw("a");
        item.sender = RawSender::Text("\"Alice Smith\" <alice@example.com>".to_string());
        assert_eq!(
            MessageSummary::from_raw(item.clone()).unwrap().sender,
            Recipient::new("Alice Smith", "alice@example.com")
        );

        item.sender = RawSender::Structured {
            name: "Bob".to_string(),
            address: " bob@example.com ".to_string(),
        };
        assert_eq!(
            MessageSummary::from_raw(item.clone()).unwrap().sender,
            Recipient::new("Bob", "bob@example.com")
        );

        item.sender = RawSender::Structured {
            name: "Carol <carol@example.com>".to_string(),
            address: String::new(),
        };
        assert_eq!(
            MessageSummary::from_raw(item.clone()).unwrap().sender,
            Recipient::new("Carol", "carol@example.com")
        );

        item.sender = RawSender::Missing;
        assert!(MessageSummary::from_raw(item).unwrap().sender.is_empty());
    }

    #[test]
    fn test_parse_address_forms() {
        assert_eq!(parse_address("<x@y.z>"), Recipient::new("", "x@y.z"));
        assert_eq!(parse_address("x@y.z"), Recipient::new("", "x@y.z"));
        assert_eq!(parse_address("Just A Name"), Recipient::new("Just A Name", ""));
    }

    #[test]
    fn test_split_semicolon_list_keeps_comma_names() {
        let list = split_recipients("Doe, John <john@example.com>; jane@example.com; ");
        assert_eq!(
            list,
            vec![
                Recipient::new("Doe, John", "john@example.com"),
                Recipient::new("", "jane@example.com"),
            ]
        );
    }

    #[test]
    fn test_split_comma_list_respects_quotes() {
        let list = split_recipients("\"Doe, John\" <john@example.com>, Team <team@example.com>");
        assert_eq!(
            list,
            vec![
                Recipient::new("Doe, John", "john@example.com"),
                Recipient::new("Team", "team@example.com"),
            ]
        );
        assert!(split_recipients("").is_empty());
    }

    #[test]
    fn test_attachments_imply_flag() {
        let mut item = raw("a");
        item.attachments = Some(vec![RawAttachment {
            name: "a.pdf".to_string(),
            size: 10,
        }]);
        let msg = MessageSummary::from_raw(item).unwrap();
        assert!(msg.has_attachments);
        assert_eq!(msg.attachments.unwrap()[0].name, "a.pdf");

        let mut item = raw("b");
        item.attachment_count = 2;
        let msg = MessageSummary::from_raw(item).unwrap();
        assert!(msg.has_attachments);
        assert!(msg.attachments.is_none());
    }
}
