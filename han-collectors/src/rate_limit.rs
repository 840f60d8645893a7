//! Per-source query budget over a fixed time window.
//!
//! Each source owns one [`RateLimiter`]. Every network call a source makes,
//! including sub-requests issued while widening a search, must first be
//! granted by the limiter.
//!
//! # Window
//!
//! ```text
//!  window_start                       window_start + window
//!  │ grant grant ... grant (limit)  deny deny │ reset → grant ...
//!  └──────────────────────────────────────────┘
//! ```
//!
//! This is a fixed-window counter: the call that reopens an elapsed window
//! consumes the first unit of the new window. Setting the error flag denies
//! every call until the window elapses.

use crate::error::CollectError;
use crate::types::SourceConfig;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Snapshot of a limiter's quota state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    /// Calls granted in the current window.
    pub count: u32,
    /// When the current window opened. `None` until the first call.
    pub window_start: Option<Instant>,
    /// Set after a persistent upstream failure such as an auth rejection.
    pub error_flag: bool,
}

impl Default for QuotaState {
    fn default() -> Self {
        Self {
            count: 0,
            window_start: None,
            error_flag: false,
        }
    }
}

/// Query budget for a single source.
#[derive(Debug, Default)]
pub struct RateLimiter {
    state: Mutex<QuotaState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QuotaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check whether a call may be made now, consuming one unit if so.
    pub fn able_to_query(&self, config: &SourceConfig) -> bool {
        self.able_to_query_at(config, Instant::now())
    }

    /// Clock-injected form of [`able_to_query`](Self::able_to_query).
    pub fn able_to_query_at(&self, config: &SourceConfig, now: Instant) -> bool {
        let window = Duration::from_secs(config.query_window_secs);
        let mut state = self.lock();

        let window_start = *state.window_start.get_or_insert(now);
        if now.saturating_duration_since(window_start) > window {
            state.count = 0;
            state.error_flag = false;
            state.window_start = Some(now);
        }

        if state.count < config.query_limit && !state.error_flag {
            state.count += 1;
            true
        } else {
            false
        }
    }

    /// Like [`able_to_query`](Self::able_to_query) but returns
    /// [`CollectError::QuotaExceeded`] on denial.
    pub fn try_acquire(&self, config: &SourceConfig) -> Result<(), CollectError> {
        if self.able_to_query(config) {
            Ok(())
        } else {
            tracing::debug!(source = %config.name, "query budget exhausted");
            Err(CollectError::QuotaExceeded(config.name.clone()))
        }
    }

    /// Suspend queries until the current window elapses.
    pub fn flag_error(&self) {
        let mut state = self.lock();
        state.error_flag = true;
        if state.window_start.is_none() {
            state.window_start = Some(Instant::now());
        }
    }

    pub fn snapshot(&self) -> QuotaState {
        *self.lock()
    }
}
