//! Search request and its validated form.

use serde::{Deserialize, Serialize};

use super::ValidationError;
use crate::config::SearchConfig;
use crate::filter::{SearchField, split_terms};

/// How multiple terms combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every term must match.
    #[default]
    All,
    /// At least one term must match.
    Any,
}

impl MatchMode {
    /// Returns true for [`MatchMode::All`].
    #[must_use]
    pub const fn is_all(self) -> bool {
        matches!(self, Self::All)
    }
}

/// Parameters of one search.
///
/// # Example
///
/// ```
/// use mailscope_core::{SearchField, SearchRequest};
///
/// let request = SearchRequest::new("invoice")
///     .with_days(7)
///     .with_field(SearchField::Subject)
///     .in_folder("Inbox/Billing");
/// assert_eq!(request.days, Some(7));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Raw search string; quoted phrases form a single term.
    pub term: String,
    /// Lookback window in days; the configured default when absent.
    pub days: Option<u32>,
    /// Folder path; the configured default folder when absent.
    pub folder: Option<String>,
    /// Term combination.
    pub mode: MatchMode,
    /// Field the terms are matched against.
    pub field: SearchField,
}

impl SearchRequest {
    /// Creates a subject search for `term` with default window and folder.
    #[must_use]
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            days: None,
            folder: None,
            mode: MatchMode::All,
            field: SearchField::Subject,
        }
    }

    /// Sets the lookback window.
    #[must_use]
    pub const fn with_days(mut self, days: u32) -> Self {
        self.days = Some(days);
        self
    }

    /// Sets the folder.
    #[must_use]
    pub fn in_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Accepts messages matching any single term.
    #[must_use]
    pub const fn match_any(mut self) -> Self {
        self.mode = MatchMode::Any;
        self
    }

    /// Sets the target field.
    #[must_use]
    pub const fn with_field(mut self, field: SearchField) -> Self {
        self.field = field;
        self
    }

    /// Sets the target field by name; unknown names select subject.
    #[must_use]
    pub fn with_field_name(self, name: &str) -> Self {
        self.with_field(SearchField::from_name(name))
    }

    /// Validates the request and applies configured defaults and bounds.
    pub(crate) fn prepare(&self, config: &SearchConfig) -> Result<PreparedSearch, ValidationError> {
        let term = self.term.trim();
        let terms = split_terms(term);
        if terms.is_empty() {
            return Err(ValidationError::EmptyTerm);
        }

        let folder = self
            .folder
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(&config.default_folder)
            .to_string();

        Ok(PreparedSearch {
            term: term.to_string(),
            terms,
            days: config.clamp_days(self.days.unwrap_or(config.default_days)),
            folder,
            mode: self.mode,
            field: self.field,
        })
    }
}

/// A validated request with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PreparedSearch {
    pub(crate) term: String,
    pub(crate) terms: Vec<String>,
    pub(crate) days: u32,
    pub(crate) folder: String,
    pub(crate) mode: MatchMode,
    pub(crate) field: SearchField,
}
