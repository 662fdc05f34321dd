//! Message data models.
//!
//! [`MessageSummary`] is the single normalized shape every backend item is
//! converted into (see [`MessageSummary::from_raw`]).

mod normalize;
mod timestamp;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use normalize::ConversionError;
pub use timestamp::{TimestampMemo, parse_timestamp};

/// Sender or recipient of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    /// Display name (may be empty).
    pub name: String,
    /// Email address (may be empty when the backend only knows a name).
    pub address: String,
}

impl Recipient {
    /// Creates a recipient from a display name and address.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Returns true if neither name nor address is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.address.is_empty()
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name.is_empty(), self.address.is_empty()) {
            (false, false) => write!(f, "{} <{}>", self.name, self.address),
            (false, true) => f.write_str(&self.name),
            (true, false) => f.write_str(&self.address),
            (true, true) => f.write_str("(unknown)"),
        }
    }
}

/// Attachment metadata (populated on detail fetch only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// A cached message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    /// Backend-assigned stable identifier.
    pub id: String,
    /// Message subject.
    pub subject: String,
    /// Sender.
    pub sender: Recipient,
    /// Received time as supplied by the backend.
    pub received: String,
    /// Whether the message is unread.
    pub unread: bool,
    /// Whether the message has attachments.
    pub has_attachments: bool,
    /// Size in bytes.
    pub size: u64,
    /// To recipients.
    #[serde(default)]
    pub to: Vec<Recipient>,
    /// CC recipients.
    #[serde(default)]
    pub cc: Vec<Recipient>,
    /// Plain text body, absent until a detail fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Attachment list, absent until a detail fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentInfo>>,
}

impl MessageSummary {
    /// Parses the received time (unmemoized).
    #[must_use]
    pub fn received_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        parse_timestamp(&self.received)
    }

    /// Returns true if body or attachment details still have to be fetched.
    #[must_use]
    pub const fn needs_detail(&self) -> bool {
        self.body.is_none() || (self.has_attachments && self.attachments.is_none())
    }

    /// Copies the detail-only fields of `detail` into this summary.
    ///
    /// Fields the detail fetch did not provide are left as they were.
    pub fn merge_detail(&mut self, detail: Self) {
        if detail.body.is_some() {
            self.body = detail.body;
        }
        if let Some(attachments) = detail.attachments {
            self.has_attachments = self.has_attachments || !attachments.is_empty();
            self.attachments = Some(attachments);
        }
        self.unread = detail.unread;
        if self.to.is_empty() {
            self.to = detail.to;
        }
        if self.cc.is_empty() {
            self.cc = detail.cc;
        }
    }

    /// Received time formatted for display.
    #[must_use]
    pub fn display_date(&self) -> String {
        self.received_at().map_or_else(
            || {
                if self.received.is_empty() {
                    "unknown date".to_string()
                } else {
                    self.received.clone()
                }
            },
            |t| t.format("%Y-%m-%d %H:%M").to_string(),
        )
    }

    /// One-line listing entry for the message at `position`.
    #[must_use]
    pub fn render_line(&self, position: usize) -> String {
        let unread = if self.unread { "[UNREAD] " } else { "" };
        let clip = if self.has_attachments { " [+att]" } else { "" };
        format!(
            "{position}. {unread}{} | {} | {}{clip}",
            self.display_date(),
            self.sender,
            self.subject
        )
    }

    /// Multi-line detail view.
    #[must_use]
    pub fn render_detail(&self) -> String {
        let mut out = format!(
            "Subject: {}\nFrom: {}\nReceived: {}\n",
            self.subject,
            self.sender,
            self.display_date()
        );
        if !self.to.is_empty() {
            out.push_str(&format!("To: {}\n", join_recipients(&self.to)));
        }
        if !self.cc.is_empty() {
            out.push_str(&format!("CC: {}\n", join_recipients(&self.cc)));
        }
        out.push_str(&format!(
            "Status: {}\nSize: {} bytes\n",
            if self.unread { "unread" } else { "read" },
            self.size
        ));
        match &self.attachments {
            Some(list) if !list.is_empty() => {
                out.push_str("Attachments:\n");
                for a in list {
                    out.push_str(&format!("  - {} ({} bytes)\n", a.name, a.size));
                }
            }
            None if self.has_attachments => out.push_str("Attachments: (not loaded)\n"),
            _ => {}
        }
        out.push('\n');
        out.push_str(self.body.as_deref().unwrap_or("(body not loaded)"));
        out
    }
}

fn join_recipients(list: &[Recipient]) -> String {
    list.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
