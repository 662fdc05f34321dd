//! Search orchestration.
//!
//! A [`SearchRequest`] is validated, then run by the
//! [`SearchOrchestrator`] as a short state machine:
//!
//! 1. the request as given (primary),
//! 2. the window widened and terms combined with OR,
//! 3. a different field over the widened window.
//!
//! The first attempt with results wins. Every match found on the way is
//! ingested into the cache. Listing is the same enumeration without terms
//! and without escalation.

mod orchestrator;
mod outcome;
mod request;
mod stop;
mod validation;

pub use orchestrator::SearchOrchestrator;
pub use outcome::{ListOutcome, SearchOutcome, SearchStage, Truncation};
pub use request::{MatchMode, SearchRequest};
pub use stop::StopSignal;
pub use validation::ValidationError;
