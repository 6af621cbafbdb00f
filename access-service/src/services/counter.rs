//! Windowed request counters backing the API key rate and quota checks.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use dashmap::DashMap;

use crate::services::ServiceError;

/// How a counter's window is laid out in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterWindow {
    /// Opens on the first hit and resets once `length` has elapsed.
    Rolling(Duration),
    /// UTC calendar day.
    CalendarDay,
}

impl CounterWindow {
    /// Start of a window freshly opened at `now`.
    pub fn start_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            CounterWindow::Rolling(_) => now,
            CounterWindow::CalendarDay => now.date_naive().and_time(NaiveTime::MIN).and_utc(),
        }
    }

    pub fn end_of(&self, window_start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            CounterWindow::Rolling(length) => window_start + *length,
            CounterWindow::CalendarDay => window_start + Duration::days(1),
        }
    }

    /// Whether a window that opened at `window_start` still covers `now`.
    pub fn covers(&self, window_start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            CounterWindow::Rolling(_) => now >= window_start && now < self.end_of(window_start),
            CounterWindow::CalendarDay => self.start_at(now) == window_start,
        }
    }
}

/// Snapshot of one counter after an increment or peek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowedCount {
    pub window_start: DateTime<Utc>,
    pub count: u64,
    pub resets_at: DateTime<Utc>,
}

impl WindowedCount {
    pub fn new(window: CounterWindow, window_start: DateTime<Utc>, count: u64) -> Self {
        Self {
            window_start,
            count,
            resets_at: window.end_of(window_start),
        }
    }

    /// Whole seconds until the window resets, never less than one.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let remaining = (self.resets_at - now).num_milliseconds().max(0) as u64;
        remaining.div_ceil(1000).max(1)
    }
}

/// Atomic windowed counters. Implementations must make `increment` a single
/// read-modify-write so concurrent requests on one key are all counted.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(
        &self,
        key: &str,
        window: CounterWindow,
        now: DateTime<Utc>,
    ) -> Result<WindowedCount, ServiceError>;

    /// Current state without counting a request. An elapsed or missing window
    /// reads as a fresh one with zero hits.
    async fn peek(
        &self,
        key: &str,
        window: CounterWindow,
        now: DateTime<Utc>,
    ) -> Result<WindowedCount, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_start: DateTime<Utc>,
    count: u64,
}

#[derive(Default)]
pub struct InMemoryCounterStore {
    windows: DashMap<String, WindowState>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(
        &self,
        key: &str,
        window: CounterWindow,
        now: DateTime<Utc>,
    ) -> Result<WindowedCount, ServiceError> {
        // The entry guard holds the shard lock for the whole update.
        let mut state = self.windows.entry(key.to_string()).or_insert(WindowState {
            window_start: window.start_at(now),
            count: 0,
        });
        if !window.covers(state.window_start, now) {
            *state = WindowState {
                window_start: window.start_at(now),
                count: 0,
            };
        }
        state.count += 1;
        Ok(WindowedCount::new(window, state.window_start, state.count))
    }

    async fn peek(
        &self,
        key: &str,
        window: CounterWindow,
        now: DateTime<Utc>,
    ) -> Result<WindowedCount, ServiceError> {
        let live = self
            .windows
            .get(key)
            .map(|s| *s)
            .filter(|s| window.covers(s.window_start, now));
        Ok(match live {
            Some(s) => WindowedCount::new(window, s.window_start, s.count),
            None => WindowedCount::new(window, window.start_at(now), 0),
        })
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
