//! Pure reconciliation: (session, event) -> (session', view updates).
//!
//! Nothing in here awaits or reads a clock; the loop in `sync` passes time in.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::commands;
use crate::error::SyncError;
use crate::session::{ConnectionStatus, SyncSession};
use crate::state::{LogEntry, RemoteState};
use crate::view::{StatsPanel, ViewUpdate};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub episode: u32,
    pub score: f64,
    pub avg_score: f64,
    pub epsilon: f64,
}

/// A new point is accepted only for a positive episode past the last one recorded.
pub fn admits_episode(last_recorded: u32, episode: u32) -> bool {
    episode > 0 && episode > last_recorded
}

/// Chart history keyed by strictly increasing episode index. Never windowed.
#[derive(Debug, Clone, Default)]
pub struct ScoreSeries {
    points: Vec<ChartPoint>,
}

impl ScoreSeries {
    pub fn record(&mut self, point: ChartPoint) -> bool {
        if !admits_episode(self.last_episode(), point.episode) {
            return false;
        }
        self.points.push(point);
        true
    }

    pub fn last_episode(&self) -> u32 {
        self.points.last().map(|p| p.episode).unwrap_or(0)
    }

    pub fn points(&self) -> &[ChartPoint] {
        &self.points
    }

    pub fn episodes(&self) -> Vec<u32> {
        self.points.iter().map(|p| p.episode).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogDelta<'a> {
    /// Entries to append, in order.
    pub new_entries: &'a [LogEntry],
    /// Processed count after applying the delta.
    pub processed: usize,
    /// Set when the remote sequence got shorter; holds the count seen before.
    pub restarted_from: Option<usize>,
}

/// Suffix of `entries` not yet rendered.
///
/// A sequence shorter than `processed` means the remote log was rotated. The
/// count re-baselines to zero and the whole new sequence is rendered once.
pub fn reconcile_logs(entries: &[LogEntry], processed: usize) -> LogDelta<'_> {
    if entries.len() < processed {
        return LogDelta {
            new_entries: entries,
            processed: entries.len(),
            restarted_from: Some(processed),
        };
    }
    LogDelta {
        new_entries: &entries[processed..],
        processed: entries.len(),
        restarted_from: None,
    }
}

/// Timing knobs the reconciliation needs from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub stale_after: Duration,
    pub ack_grace: Duration,
}

fn push_status_change(
    session: &mut SyncSession,
    now: Instant,
    stale_after: Duration,
    out: &mut Vec<ViewUpdate>,
) {
    if let Some(prev) = session.refresh_status(now, stale_after) {
        let next = session.status();
        match next {
            ConnectionStatus::Connected => info!("connection {} -> {}", prev.label(), next.label()),
            _ => warn!("connection {} -> {}", prev.label(), next.label()),
        }
        out.push(ViewUpdate::Status(next));
    }
}

/// A fetch settled with a snapshot.
pub fn poll_succeeded(
    session: &mut SyncSession,
    state: &RemoteState,
    now: Instant,
    wall: DateTime<Local>,
    thresholds: Thresholds,
) -> Vec<ViewUpdate> {
    let mut out = Vec::new();
    session.record_success(now, wall);
    push_status_change(session, now, thresholds.stale_after, &mut out);

    match state.decode_frame() {
        Some(Ok(bytes)) => out.push(ViewUpdate::Frame(bytes)),
        Some(Err(e)) => warn!("skipping undecodable frame: {}", e),
        None => {}
    }

    out.push(ViewUpdate::Stats(StatsPanel::from_state(state, session.last_success_wall())));
    out.push(ViewUpdate::Progress(state.progress_percent()));

    if admits_episode(session.last_episode(), state.episode) {
        session.set_last_episode(state.episode);
        out.push(ViewUpdate::ChartPoint(ChartPoint {
            episode: state.episode,
            score: state.score,
            avg_score: state.avg_score,
            epsilon: state.epsilon,
        }));
    }

    // No entries reported: keep the processed count as it is.
    if let Some(entries) = state.reported_log() {
        let delta = reconcile_logs(entries, session.processed_logs());
        if let Some(before) = delta.restarted_from {
            warn!("remote log shrank from {} to {} entries", before, delta.processed);
            out.push(ViewUpdate::LocalLog(format!(
                "Remote log restarted ({} -> {} entries)",
                before, delta.processed
            )));
        }
        session.set_processed_logs(delta.processed);
        if !delta.new_entries.is_empty() {
            debug!("{} new log entries", delta.new_entries.len());
            out.push(ViewUpdate::AppendLogs(delta.new_entries.to_vec()));
        }
    }

    out.extend(commands::acknowledge(session, state, now, thresholds.ack_grace));
    out
}

/// A fetch settled with an error. The loop keeps going regardless.
pub fn poll_failed(
    session: &mut SyncSession,
    error: &SyncError,
    now: Instant,
    stale_after: Duration,
) -> Vec<ViewUpdate> {
    let mut out = Vec::new();
    session.record_failure();
    push_status_change(session, now, stale_after, &mut out);
    out.push(ViewUpdate::LocalLog(error.console_line()));
    out
}

/// Periodic staleness check, independent of the poll cadence.
pub fn watchdog_tick(
    session: &mut SyncSession,
    now: Instant,
    stale_after: Duration,
) -> Vec<ViewUpdate> {
    let mut out = Vec::new();
    push_status_change(session, now, stale_after, &mut out);
    if session.status() == ConnectionStatus::Stalled {
        let stale = SyncError::Stale {
            since: session.since_success(now),
        };
        warn!("{}", stale);
        out.push(ViewUpdate::LocalLog(format!(
            "No updates for {} seconds",
            session.since_success(now).as_secs()
        )));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::sample_state;

    const T: Thresholds = Thresholds {
        stale_after: Duration::from_secs(10),
        ack_grace: Duration::from_millis(800),
    };

    fn appended(updates: &[ViewUpdate]) -> Vec<String> {
        updates
            .iter()
            .filter_map(|u| match u {
                ViewUpdate::AppendLogs(e) => {
                    Some(e.iter().map(|l| l.message.clone()).collect::<Vec<_>>())
                }
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn overlapping_snapshots_append_only_new_suffix() {
        let now = Instant::now();
        let mut s = SyncSession::new(now);

        let a = sample_state(1, &["a", "b", "c"]);
        let first = poll_succeeded(&mut s, &a, now, Local::now(), T);
        assert_eq!(appended(&first), vec!["a", "b", "c"]);
        assert_eq!(s.processed_logs(), 3);

        let b = sample_state(1, &["a", "b", "c", "d", "e"]);
        let second = poll_succeeded(&mut s, &b, now, Local::now(), T);
        assert_eq!(appended(&second), vec!["d", "e"]);
        assert_eq!(s.processed_logs(), 5);

        let third = poll_succeeded(&mut s, &b, now, Local::now(), T);
        assert!(appended(&third).is_empty());
        assert_eq!(s.processed_logs(), 5);
    }

    #[test]
    fn every_entry_rendered_exactly_once_across_growth() {
        let now = Instant::now();
        let mut s = SyncSession::new(now);
        let all: Vec<String> = (0..12).map(|i| format!("m{i}")).collect();
        let mut rendered = Vec::new();
        for len in [0, 2, 2, 5, 9, 9, 12] {
            let msgs: Vec<&str> = all[..len].iter().map(String::as_str).collect();
            let ups = poll_succeeded(&mut s, &sample_state(1, &msgs), now, Local::now(), T);
            rendered.extend(appended(&ups));
            assert_eq!(s.processed_logs(), len);
        }
        assert_eq!(rendered, all);
    }

    #[test]
    fn shrinking_log_rebaselines_and_renders_new_sequence() {
        let now = Instant::now();
        let mut s = SyncSession::new(now);
        poll_succeeded(&mut s, &sample_state(1, &["a", "b", "c", "d"]), now, Local::now(), T);

        let ups = poll_succeeded(&mut s, &sample_state(2, &["x", "y"]), now, Local::now(), T);
        assert_eq!(appended(&ups), vec!["x", "y"]);
        assert_eq!(s.processed_logs(), 2);
        assert!(ups.contains(&ViewUpdate::LocalLog(
            "Remote log restarted (4 -> 2 entries)".to_string()
        )));

        let ups = poll_succeeded(&mut s, &sample_state(2, &["x", "y", "z"]), now, Local::now(), T);
        assert_eq!(appended(&ups), vec!["z"]);
    }

    #[test]
    fn snapshot_without_log_keeps_processed_count() {
        let now = Instant::now();
        let mut s = SyncSession::new(now);
        let full = sample_state(1, &["a", "b", "c"]);
        let mut bare = sample_state(1, &[]);
        bare.log_messages = None;

        let mut rendered = appended(&poll_succeeded(&mut s, &full, now, Local::now(), T));
        let ups = poll_succeeded(&mut s, &bare, now, Local::now(), T);
        assert!(!ups.iter().any(|u| matches!(u, ViewUpdate::LocalLog(_))));
        assert_eq!(s.processed_logs(), 3);
        rendered.extend(appended(&ups));

        // An empty list is treated the same way.
        let empty = sample_state(1, &[]);
        rendered.extend(appended(&poll_succeeded(&mut s, &empty, now, Local::now(), T)));
        assert_eq!(s.processed_logs(), 3);

        rendered.extend(appended(&poll_succeeded(&mut s, &full, now, Local::now(), T)));
        assert_eq!(rendered, vec!["a", "b", "c"]);
    }

    #[test]
    fn reconcile_logs_never_exceeds_latest_length() {
        let entries: Vec<LogEntry> = (0..3).map(|i| LogEntry::new("t", format!("{i}"))).collect();
        for processed in 0..6 {
            let d = reconcile_logs(&entries, processed);
            assert_eq!(d.processed, 3);
            assert_eq!(d.restarted_from.is_some(), processed > 3);
        }
        assert!(reconcile_logs(&entries, 3).new_entries.is_empty());
    }

    #[test]
    fn chart_records_strictly_increasing_episodes() {
        let now = Instant::now();
        let mut s = SyncSession::new(now);
        let mut series = ScoreSeries::default();
        for ep in [1, 1, 2, 2, 3] {
            for u in poll_succeeded(&mut s, &sample_state(ep, &[]), now, Local::now(), T) {
                if let ViewUpdate::ChartPoint(p) = u {
                    assert!(series.record(p));
                }
            }
        }
        assert_eq!(series.episodes(), vec![1, 2, 3]);
    }

    #[test]
    fn chart_ignores_episode_zero_and_regressions() {
        let mut series = ScoreSeries::default();
        let p = |episode| ChartPoint {
            episode,
            score: 0.0,
            avg_score: 0.0,
            epsilon: 1.0,
        };
        assert!(!series.record(p(0)));
        assert!(series.record(p(5)));
        assert!(!series.record(p(4)));
        assert!(series.record(p(9)));
        assert_eq!(series.episodes(), vec![5, 9]);
    }

    #[test]
    fn success_then_failure_reports_error_and_logs() {
        let now = Instant::now();
        let mut s = SyncSession::new(now);
        let ups = poll_succeeded(&mut s, &sample_state(1, &[]), now, Local::now(), T);
        assert_eq!(ups[0], ViewUpdate::Status(ConnectionStatus::Connected));

        let err = SyncError::Transport("connection refused".to_string());
        let ups = poll_failed(&mut s, &err, now + Duration::from_millis(100), T.stale_after);
        assert_eq!(s.status(), ConnectionStatus::Error);
        assert_eq!(
            ups,
            vec![
                ViewUpdate::Status(ConnectionStatus::Error),
                ViewUpdate::LocalLog(
                    "Connection error: transport failure: connection refused".to_string()
                ),
            ]
        );
    }

    #[test]
    fn rejected_snapshot_counts_as_failed_poll() {
        let now = Instant::now();
        let mut s = SyncSession::new(now);
        poll_succeeded(&mut s, &sample_state(1, &["a"]), now, Local::now(), T);

        let err = SyncError::Schema {
            field: "episode",
            reason: "episode 150 exceeds total 100".to_string(),
        };
        let ups = poll_failed(&mut s, &err, now + Duration::from_millis(100), T.stale_after);
        assert_eq!(s.status(), ConnectionStatus::Error);
        assert_eq!(s.processed_logs(), 1);
        let rejected = "Rejected state snapshot: schema violation in `episode`: episode 150 \
                        exceeds total 100";
        assert_eq!(
            ups,
            vec![
                ViewUpdate::Status(ConnectionStatus::Error),
                ViewUpdate::LocalLog(rejected.to_string()),
            ]
        );
    }

    #[test]
    fn repeated_success_does_not_repeat_status_update() {
        let now = Instant::now();
        let mut s = SyncSession::new(now);
        poll_succeeded(&mut s, &sample_state(1, &[]), now, Local::now(), T);
        let ups = poll_succeeded(&mut s, &sample_state(1, &[]), now, Local::now(), T);
        assert!(!ups.iter().any(|u| matches!(u, ViewUpdate::Status(_))));
    }

    #[test]
    fn bad_frame_is_skipped_but_snapshot_applies() {
        let now = Instant::now();
        let mut s = SyncSession::new(now);
        let mut state = sample_state(1, &["hello"]);
        state.frame_base64 = Some("%%%".to_string());
        let ups = poll_succeeded(&mut s, &state, now, Local::now(), T);
        assert!(!ups.iter().any(|u| matches!(u, ViewUpdate::Frame(_))));
        assert_eq!(appended(&ups), vec!["hello"]);
    }

    #[test]
    fn watchdog_stalls_after_threshold() {
        let t0 = Instant::now();
        let mut s = SyncSession::new(t0);
        poll_succeeded(&mut s, &sample_state(1, &[]), t0, Local::now(), T);

        assert!(watchdog_tick(&mut s, t0 + Duration::from_secs(5), T.stale_after).is_empty());
        assert!(watchdog_tick(&mut s, t0 + Duration::from_secs(10), T.stale_after).is_empty());

        let ups = watchdog_tick(&mut s, t0 + Duration::from_secs(15), T.stale_after);
        assert_eq!(s.status(), ConnectionStatus::Stalled);
        assert_eq!(
            ups,
            vec![
                ViewUpdate::Status(ConnectionStatus::Stalled),
                ViewUpdate::LocalLog("No updates for 15 seconds".to_string()),
            ]
        );

        // Still stalled: the diagnostic repeats, the status update does not.
        let ups = watchdog_tick(&mut s, t0 + Duration::from_secs(20), T.stale_after);
        assert_eq!(ups, vec![ViewUpdate::LocalLog("No updates for 20 seconds".to_string())]);
    }

    #[test]
    fn success_after_stall_recovers() {
        let t0 = Instant::now();
        let mut s = SyncSession::new(t0);
        watchdog_tick(&mut s, t0 + Duration::from_secs(15), T.stale_after);
        assert_eq!(s.status(), ConnectionStatus::Stalled);

        let t1 = t0 + Duration::from_secs(16);
        let ups = poll_succeeded(&mut s, &sample_state(1, &[]), t1, Local::now(), T);
        assert_eq!(ups[0], ViewUpdate::Status(ConnectionStatus::Connected));
    }
}
