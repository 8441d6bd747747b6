//! Local session record, owned by the sync loop.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::commands::DEFAULT_SPEED;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No poll has settled yet.
    Connecting,
    Connected,
    Error,
    Stalled,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Error => "Connection Error",
            ConnectionStatus::Stalled => "Updates Stalled",
        }
    }

    pub fn is_healthy(self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// Status from the most recent attempt and the age of the last success.
    ///
    /// Staleness dominates: a run of failures that outlasts `stale_after` reads
    /// as `Stalled`, not `Error`.
    pub fn derive(
        last_attempt: Option<AttemptOutcome>,
        since_success: Duration,
        stale_after: Duration,
    ) -> Self {
        if since_success > stale_after {
            return ConnectionStatus::Stalled;
        }
        match last_attempt {
            None => ConnectionStatus::Connecting,
            Some(AttemptOutcome::Succeeded) => ConnectionStatus::Connected,
            Some(AttemptOutcome::Failed) => ConnectionStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

/// Optimistic control change waiting for the server to confirm it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pending<T> {
    pub value: T,
    pub issued_at: Instant,
}

#[derive(Debug, Clone)]
pub struct SyncSession {
    started_at: Instant,
    last_success: Option<Instant>,
    last_success_wall: Option<DateTime<Local>>,
    last_attempt: Option<AttemptOutcome>,
    status: ConnectionStatus,
    processed_logs: usize,
    last_episode: u32,
    speed: f64,
    paused: bool,
    pending_speed: Option<Pending<f64>>,
    pending_pause: Option<Pending<bool>>,
}

impl SyncSession {
    pub fn new(now: Instant) -> Self {
        Self {
            started_at: now,
            last_success: None,
            last_success_wall: None,
            last_attempt: None,
            status: ConnectionStatus::Connecting,
            processed_logs: 0,
            last_episode: 0,
            speed: DEFAULT_SPEED,
            paused: false,
            pending_speed: None,
            pending_pause: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn last_success(&self) -> Option<Instant> {
        self.last_success
    }

    pub fn last_success_wall(&self) -> Option<DateTime<Local>> {
        self.last_success_wall
    }

    pub fn processed_logs(&self) -> usize {
        self.processed_logs
    }

    pub fn last_episode(&self) -> u32 {
        self.last_episode
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pending_speed(&self) -> Option<Pending<f64>> {
        self.pending_speed
    }

    pub fn pending_pause(&self) -> Option<Pending<bool>> {
        self.pending_pause
    }

    /// Time since the last success, or since the session started if there was none.
    pub fn since_success(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_success.unwrap_or(self.started_at))
    }

    /// Re-derive the status at `now`. Returns the previous status when it changed.
    pub fn refresh_status(
        &mut self,
        now: Instant,
        stale_after: Duration,
    ) -> Option<ConnectionStatus> {
        let since = self.since_success(now);
        let next = ConnectionStatus::derive(self.last_attempt, since, stale_after);
        if next == self.status {
            return None;
        }
        let prev = self.status;
        self.status = next;
        Some(prev)
    }

    pub(crate) fn record_success(&mut self, now: Instant, wall: DateTime<Local>) {
        self.last_success = Some(now);
        self.last_success_wall = Some(wall);
        self.last_attempt = Some(AttemptOutcome::Succeeded);
    }

    pub(crate) fn record_failure(&mut self) {
        self.last_attempt = Some(AttemptOutcome::Failed);
    }

    pub(crate) fn set_processed_logs(&mut self, count: usize) {
        self.processed_logs = count;
    }

    pub(crate) fn set_last_episode(&mut self, episode: u32) {
        self.last_episode = episode;
    }

    pub(crate) fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub(crate) fn set_pending_speed(&mut self, pending: Option<Pending<f64>>) {
        self.pending_speed = pending;
    }

    pub(crate) fn set_pending_pause(&mut self, pending: Option<Pending<bool>>) {
        self.pending_pause = pending;
    }
}
