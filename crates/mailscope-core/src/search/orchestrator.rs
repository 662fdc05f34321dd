//! Multi-stage search against the backend.

use std::cmp::Reverse;
use std::collections::HashSet;

use chrono::TimeDelta;
use futures::StreamExt;
use tracing::{Instrument, debug, info, info_span, warn};

use super::outcome::{ListOutcome, SearchOutcome, SearchStage, Truncation};
use super::request::PreparedSearch;
use super::{MatchMode, SearchRequest, StopSignal};
use crate::backend::{
    BackendError, FolderHandle, ItemStream, MailBackend, Restricted, RetryPolicy, with_backoff,
};
use crate::cache::OrderedCache;
use crate::config::{Config, SearchConfig};
use crate::filter::{Filter, SearchField};
use crate::model::MessageSummary;
use crate::time::Clock;
use crate::{Error, Result};

/// One planned attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attempt {
    stage: SearchStage,
    field: SearchField,
    days: u32,
    mode: MatchMode,
}

/// What one enumeration produced.
#[derive(Debug, Default)]
struct AttemptResult {
    matches: Vec<MessageSummary>,
    client_side: bool,
    truncated: Option<Truncation>,
    failures: usize,
    abandoned: bool,
    error: Option<BackendError>,
}

impl AttemptResult {
    fn failed(error: BackendError) -> Self {
        Self {
            abandoned: true,
            error: Some(error),
            ..Self::default()
        }
    }

    fn found(&self) -> bool {
        !self.abandoned && !self.matches.is_empty()
    }

    fn stopped(&self) -> bool {
        self.truncated == Some(Truncation::Stopped)
    }
}

/// Runs listings and searches, feeding everything found into the cache.
///
/// A search tries, in order and until one yields results: the request as
/// given, a widened window with any-term matching, and another field over
/// the widened window.
#[derive(Debug)]
pub struct SearchOrchestrator<'a, B> {
    backend: &'a B,
    cache: &'a OrderedCache,
    config: &'a SearchConfig,
    retry: &'a RetryPolicy,
    clock: &'a dyn Clock,
}

impl<'a, B: MailBackend> SearchOrchestrator<'a, B> {
    /// Creates an orchestrator over borrowed collaborators.
    #[must_use]
    pub fn new(backend: &'a B, cache: &'a OrderedCache, config: &'a Config, clock: &'a dyn Clock) -> Self {
        Self {
            backend,
            cache,
            config: &config.search,
            retry: &config.retry,
            clock,
        }
    }

    /// Ingests every message of the last `days` days (configured default when
    /// `None`) of `folder` (default folder when `None`).
    ///
    /// Listings do not escalate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FolderNotFound`] for an unknown folder and
    /// [`Error::Backend`] when the folder cannot be enumerated at all.
    pub async fn list(&self, folder: Option<&str>, days: Option<u32>, stop: &StopSignal) -> Result<ListOutcome> {
        let path = folder
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(&self.config.default_folder);
        let days = self.config.clamp_days(days.unwrap_or(self.config.default_days));
        let handle = self.resolve(path).await?;

        let filter = Filter {
            terms: Vec::new(),
            since: self.clock.now() - TimeDelta::days(i64::from(days)),
            field: SearchField::Subject,
            match_all: true,
        };
        let result = self
            .run_attempt(&handle, &filter, stop)
            .instrument(info_span!("list", folder = %path, days))
            .await;

        if let Some(error) = result.error {
            return Err(error.into());
        }

        let mut outcome = ListOutcome {
            count: result.matches.len(),
            folder: path.to_string(),
            days,
            client_side: result.client_side,
            truncated: result.truncated,
            skipped: result.failures,
            abandoned: result.abandoned,
            note: String::new(),
        };
        outcome.compose_note();
        info!(folder = %path, count = outcome.count, "Listing finished");
        Ok(outcome)
    }

    /// Runs a search with escalation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty term,
    /// [`Error::FolderNotFound`] for an unknown folder, and
    /// [`Error::Backend`] only when every attempt failed to enumerate.
    pub async fn search(&self, request: &SearchRequest, stop: &StopSignal) -> Result<SearchOutcome> {
        let prepared = request.prepare(self.config)?;
        let handle = self.resolve(&prepared.folder).await?;
        let plan = self.plan(&prepared);

        let mut last: Option<(Attempt, AttemptResult)> = None;
        let mut last_error = None;
        let mut any_enumerated = false;

        for attempt in plan {
            let filter = Filter {
                terms: prepared.terms.clone(),
                since: self.clock.now() - TimeDelta::days(i64::from(attempt.days)),
                field: attempt.field,
                match_all: attempt.mode.is_all(),
            };
            let span = info_span!(
                "search_attempt",
                stage = attempt.stage.as_str(),
                field = %attempt.field,
                days = attempt.days,
            );
            let mut result = self.run_attempt(&handle, &filter, stop).instrument(span).await;

            match result.error.take() {
                Some(error) => last_error = Some(error),
                None => any_enumerated = true,
            }

            if result.found() || result.stopped() {
                return Ok(Self::finish(&prepared, attempt, attempt.stage, result));
            }
            debug!(stage = attempt.stage.as_str(), "Attempt came back empty");
            last = Some((attempt, result));
        }

        if !any_enumerated && let Some(error) = last_error {
            return Err(Error::Backend(error));
        }
        let (attempt, mut result) = last.unwrap_or_else(|| {
            let primary = Self::primary(&prepared);
            (primary, AttemptResult::default())
        });
        // Matches of an abandoned attempt stay cached but are not reported.
        result.matches.clear();
        Ok(Self::finish(&prepared, attempt, SearchStage::Exhausted, result))
    }

    fn finish(
        prepared: &PreparedSearch,
        attempt: Attempt,
        stage: SearchStage,
        result: AttemptResult,
    ) -> SearchOutcome {
        let mut outcome = SearchOutcome {
            matches: result.matches,
            stage,
            field: attempt.field,
            days: attempt.days,
            mode: attempt.mode,
            client_side: result.client_side,
            truncated: result.truncated,
            skipped: result.failures,
            note: String::new(),
        };
        outcome.compose_note(&prepared.term, prepared.field, prepared.days);
        info!(
            stage = stage.as_str(),
            matches = outcome.matches.len(),
            days = outcome.days,
            "Search finished"
        );
        outcome
    }

    const fn primary(prepared: &PreparedSearch) -> Attempt {
        Attempt {
            stage: SearchStage::Primary,
            field: prepared.field,
            days: prepared.days,
            mode: prepared.mode,
        }
    }

    /// Lays out the attempts in escalation order.
    fn plan(&self, prepared: &PreparedSearch) -> Vec<Attempt> {
        let primary = Self::primary(prepared);
        let widened = Attempt {
            stage: SearchStage::Widened,
            field: prepared.field,
            days: self.config.widened_days(prepared.days),
            mode: MatchMode::Any,
        };
        let cross_field = if prepared.field == SearchField::Subject {
            self.config.secondary_field
        } else {
            SearchField::Subject
        };

        let mut plan = vec![primary];
        if widened.days != primary.days || widened.mode != primary.mode {
            plan.push(widened);
        }
        if cross_field != prepared.field {
            plan.push(Attempt {
                stage: SearchStage::CrossField,
                field: cross_field,
                ..widened
            });
        }
        plan
    }

    async fn resolve(&self, path: &str) -> Result<FolderHandle> {
        let backend = self.backend;
        with_backoff(self.retry, "resolve_folder", move || backend.resolve_folder(path))
            .await?
            .ok_or_else(|| Error::FolderNotFound(path.to_string()))
    }

    /// Opens the item stream, falling back to a full enumeration when the
    /// backend cannot restrict. The flag is true for the fallback.
    async fn open(&self, folder: &FolderHandle, filter: &Filter) -> std::result::Result<(ItemStream, bool), BackendError> {
        let backend = self.backend;
        let expression = filter.expression();
        let expression = expression.as_str();

        match with_backoff(self.retry, "enumerate_restricted", move || {
            backend.enumerate_restricted(folder, expression, true)
        })
        .await
        {
            Ok(Restricted::Items(items)) => return Ok((items, false)),
            Ok(Restricted::Unsupported) => {
                debug!("Backend cannot restrict, filtering client-side");
            }
            Err(e) => {
                warn!(error = %e, "Restricted enumeration failed, filtering client-side");
            }
        }

        let items = with_backoff(self.retry, "enumerate_all", move || backend.enumerate_all(folder)).await?;
        Ok((items, true))
    }

    async fn run_attempt(&self, folder: &FolderHandle, filter: &Filter, stop: &StopSignal) -> AttemptResult {
        let (mut items, client_side) = match self.open(folder, filter).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(folder = %folder.path, error = %e, "Enumeration failed, abandoning attempt");
                return AttemptResult::failed(e);
            }
        };

        let cap = self.config.max_items_per_attempt;
        let mut result = AttemptResult {
            client_side,
            ..AttemptResult::default()
        };
        let mut ids = HashSet::new();
        let mut seen = 0usize;

        loop {
            if stop.should_stop() {
                result.truncated = Some(Truncation::Stopped);
                break;
            }
            if seen >= cap {
                result.truncated = Some(Truncation::Cap(cap));
                break;
            }
            let Some(item) = items.next().await else {
                break;
            };
            seen += 1;

            let record = match item {
                Ok(raw) => match MessageSummary::from_raw(raw) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        debug!(error = %e, "Skipping unconvertible item");
                        None
                    }
                },
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable item");
                    None
                }
            };
            let Some(record) = record else {
                result.failures += 1;
                if self.config.exceeds_failure_tolerance(result.failures, seen) {
                    warn!(failures = result.failures, seen, "Too many unreadable items, abandoning attempt");
                    result.abandoned = true;
                    break;
                }
                continue;
            };

            if client_side {
                let received = self.cache.received_at(&record.received);
                if !filter.matches(&record, received) {
                    continue;
                }
            }
            if ids.insert(record.id.clone()) {
                result.matches.push(record.clone());
                self.cache.put(record);
            }
        }

        let cache = self.cache;
        result
            .matches
            .sort_by_cached_key(|m| Reverse(cache.received_at(&m.received)));
        debug!(seen, matches = result.matches.len(), client_side, "Enumeration finished");
        result
    }
}
