//! Cooperative stop signal.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Tells a long enumeration when to stop and return what it has.
///
/// Checked between items; neither a deadline nor a token means "never".
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    deadline: Option<Instant>,
    token: Option<CancellationToken>,
}

impl StopSignal {
    /// A signal that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            deadline: None,
            token: None,
        }
    }

    /// Fires once `deadline` has passed.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fires once `timeout` has elapsed from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Fires once `token` is cancelled.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Returns true if the enumeration should stop now.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|at| Instant::now() >= at)
    }
}
