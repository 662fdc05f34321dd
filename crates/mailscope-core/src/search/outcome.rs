//! Search and listing results.

use std::fmt::Write as _;

use crate::filter::SearchField;
use crate::model::MessageSummary;

use super::MatchMode;

/// Which attempt produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchStage {
    /// The request as given.
    Primary,
    /// Widened window, any-term matching.
    Widened,
    /// Another field over the widened window.
    CrossField,
    /// Every attempt came back empty.
    Exhausted,
}

impl SearchStage {
    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Widened => "widened",
            Self::CrossField => "cross-field",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Why an enumeration stopped before the backend ran out of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    /// The per-attempt item cap was reached.
    Cap(usize),
    /// The stop signal fired.
    Stopped,
}

impl Truncation {
    fn describe(self) -> String {
        match self {
            Self::Cap(cap) => {
                format!("Stopped after scanning {cap} items; results may be incomplete.")
            }
            Self::Stopped => "Stopped early on request; results may be incomplete.".to_string(),
        }
    }
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Matching messages, newest first.
    pub matches: Vec<MessageSummary>,
    /// Attempt that produced `matches`.
    pub stage: SearchStage,
    /// Field matched by that attempt.
    pub field: SearchField,
    /// Lookback window of that attempt in days.
    pub days: u32,
    /// Term combination of that attempt.
    pub mode: MatchMode,
    /// Whether the items were filtered locally instead of by the backend.
    pub client_side: bool,
    /// Set when the enumeration ended early.
    pub truncated: Option<Truncation>,
    /// Items skipped because they could not be read or converted.
    pub skipped: usize,
    /// Human-readable summary of what happened.
    pub note: String,
}

impl SearchOutcome {
    /// Number of matches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Returns true if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Fills in [`SearchOutcome::note`].
    pub(crate) fn compose_note(&mut self, term: &str, requested: SearchField, requested_days: u32) {
        let count = self.matches.len();
        let mut note = match self.stage {
            SearchStage::Primary => format!(
                "Found {count} emails matching '{term}' in {} (last {} days).",
                self.field, self.days
            ),
            SearchStage::Widened => format!(
                "No matches in the last {requested_days} days; widened to {} days and matched any term. Found {count} emails.",
                self.days
            ),
            SearchStage::CrossField => format!(
                "No matches in {requested}; searched {} instead over the last {} days. Found {count} emails.",
                self.field, self.days
            ),
            SearchStage::Exhausted => format!(
                "No emails matching '{term}' found in {requested} or {} (up to {} days).",
                self.field, self.days
            ),
        };
        if self.client_side {
            note.push_str(" Filtered locally.");
        }
        if self.skipped > 0 {
            let _ = write!(note, " Skipped {} unreadable items.", self.skipped);
        }
        if let Some(truncation) = self.truncated {
            note.push(' ');
            note.push_str(&truncation.describe());
        }
        self.note = note;
    }
}

/// Result of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOutcome {
    /// Messages ingested into the cache.
    pub count: usize,
    /// Folder that was listed.
    pub folder: String,
    /// Lookback window in days.
    pub days: u32,
    /// Whether the window was applied locally.
    pub client_side: bool,
    /// Set when the enumeration ended early.
    pub truncated: Option<Truncation>,
    /// Items skipped because they could not be read or converted.
    pub skipped: usize,
    /// Set when too many items failed and the listing gave up.
    pub abandoned: bool,
    /// Human-readable summary of what happened.
    pub note: String,
}

impl ListOutcome {
    /// Fills in [`ListOutcome::note`].
    pub(crate) fn compose_note(&mut self) {
        let mut note = format!(
            "Loaded {} emails from {} (last {} days).",
            self.count, self.folder, self.days
        );
        if self.abandoned {
            let _ = write!(
                note,
                " Gave up after {} unreadable items; the listing is partial.",
                self.skipped
            );
        } else if self.skipped > 0 {
            let _ = write!(note, " Skipped {} unreadable items.", self.skipped);
        }
        if let Some(truncation) = self.truncated {
            note.push(' ');
            note.push_str(&truncation.describe());
        }
        self.note = note;
    }
}
