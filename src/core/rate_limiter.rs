//! Two-window sliding-window admission control, keyed by API key.
//!
//! Each key tracks the instants of its admitted requests over a trailing
//! minute and a trailing day. On every admission check both sequences are
//! pruned lazily, the minute window is checked first, then the day window,
//! and only then is the current instant appended to both. The whole
//! prune-check-append sequence runs while holding the `scc::HashMap` entry
//! lock for the key, so two concurrent requests from the same key can never
//! both be admitted into a single remaining slot.
use std::{
    fmt,
    time::{Duration, Instant},
};

use scc::HashMap;

use crate::config::RateLimits;

/// Trailing window lengths for the two quotas.
pub const MINUTE_WINDOW: Duration = Duration::from_secs(60);
pub const DAY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Which quota a denial was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Minute,
    Day,
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitScope::Minute => write!(f, "minute"),
            LimitScope::Day => write!(f, "day"),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { scope: LimitScope, limit: u32 },
}

/// Request instants within the trailing minute and day for one key.
#[derive(Debug, Default)]
struct WindowState {
    minute: Vec<Instant>,
    day: Vec<Instant>,
}

impl WindowState {
    /// Drop every instant that has fallen out of its window.
    fn prune(&mut self, now: Instant) {
        self.minute
            .retain(|t| now.saturating_duration_since(*t) < MINUTE_WINDOW);
        self.day
            .retain(|t| now.saturating_duration_since(*t) < DAY_WINDOW);
    }
}

/// Sliding-window rate limiter shared across all clients.
///
/// Window state for a key is created lazily on its first admission check and
/// removed when the client is deleted. `now` is injected rather than read
/// internally so the pruning behaviour is testable without sleeping.
#[derive(Default)]
pub struct SlidingWindowLimiter {
    windows: HashMap<String, WindowState>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self {
            windows: HashMap::new(),
        }
    }

    /// Check and consume one admission slot for `api_key` at `now`.
    pub async fn admit(&self, api_key: &str, limits: &RateLimits, now: Instant) -> Admission {
        let mut entry = self
            .windows
            .entry_async(api_key.to_string())
            .await
            .or_insert_with(WindowState::default);
        let state = entry.get_mut();

        state.prune(now);

        if state.minute.len() >= limits.per_minute as usize {
            return Admission::Denied {
                scope: LimitScope::Minute,
                limit: limits.per_minute,
            };
        }
        if state.day.len() >= limits.per_day as usize {
            return Admission::Denied {
                scope: LimitScope::Day,
                limit: limits.per_day,
            };
        }

        state.minute.push(now);
        state.day.push(now);
        Admission::Allowed
    }

    /// Current (pruned) window sizes for a key, for the stats endpoints.
    /// A key with no window state yet reports zero for both.
    pub async fn counts(&self, api_key: &str, now: Instant) -> (usize, usize) {
        self.windows
            .update_async(api_key, |_, state| {
                state.prune(now);
                (state.minute.len(), state.day.len())
            })
            .await
            .unwrap_or((0, 0))
    }

    /// Clear all window state for a key (client deletion cascade).
    pub async fn remove(&self, api_key: &str) {
        let _ = self.windows.remove_async(api_key).await;
    }
}
