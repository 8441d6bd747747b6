//! Rendering instructions and the views that apply them.
//!
//! The sync core never touches a display. It emits `ViewUpdate`s and a `View`
//! decides what they look like. `DashboardModel` is a headless view that keeps
//! everything a front end needs to draw.

use chrono::{DateTime, Local};

use crate::reconcile::{ChartPoint, ScoreSeries};
use crate::session::ConnectionStatus;
use crate::state::{LogEntry, RemoteState};

pub mod console;

pub use console::{ConsoleBuffer, ConsoleLine, LineOrigin};

#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    Status(ConnectionStatus),
    Stats(StatsPanel),
    Progress(f64),
    /// Decoded image bytes of the latest frame.
    Frame(Vec<u8>),
    ChartPoint(ChartPoint),
    /// Remote log entries not rendered before, in order.
    AppendLogs(Vec<LogEntry>),
    /// A line produced on this side (command echo, diagnostics).
    LocalLog(String),
    ClearConsole,
    Speed(f64),
    Paused(bool),
}

pub trait View {
    fn apply(&mut self, update: ViewUpdate);
}

/// Numbers shown next to the frame, formatted the way the dashboard prints them.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsPanel {
    pub episode: u32,
    pub total_episodes: u32,
    pub score: f64,
    pub avg_score: f64,
    pub epsilon: f64,
    pub timeouts: u32,
    pub step: u64,
    pub last_update: Option<DateTime<Local>>,
}

impl StatsPanel {
    pub fn from_state(state: &RemoteState, last_update: Option<DateTime<Local>>) -> Self {
        Self {
            episode: state.episode,
            total_episodes: state.total_episodes,
            score: state.score,
            avg_score: state.avg_score,
            epsilon: state.epsilon,
            timeouts: state.timeouts,
            step: state.step,
            last_update,
        }
    }

    pub fn episode_label(&self) -> String {
        format!("{}/{}", self.episode, self.total_episodes)
    }

    pub fn avg_score_label(&self) -> String {
        format!("{:.2}", self.avg_score)
    }

    pub fn epsilon_label(&self) -> String {
        format!("{:.4}", self.epsilon)
    }

    pub fn last_update_label(&self) -> String {
        self.last_update
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "Never".to_string())
    }
}

/// `1` for 1.0, `1.25` for 1.25.
pub fn format_speed(speed: f64) -> String {
    format!("{speed}")
}

pub fn progress_label(percent: f64) -> String {
    format!("{percent:.1}%")
}

pub fn console_timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Headless dashboard state, updated only through `View::apply`.
#[derive(Debug, Clone)]
pub struct DashboardModel {
    pub status: ConnectionStatus,
    pub stats: Option<StatsPanel>,
    pub progress: f64,
    pub frame: Option<Vec<u8>>,
    pub chart: ScoreSeries,
    pub console: ConsoleBuffer,
    pub speed: f64,
    pub paused: bool,
}

impl DashboardModel {
    pub fn new(console: ConsoleBuffer) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            stats: None,
            progress: 0.0,
            frame: None,
            chart: ScoreSeries::default(),
            console,
            speed: crate::commands::DEFAULT_SPEED,
            paused: false,
        }
    }

    pub fn speed_label(&self) -> String {
        format!("Speed: {}x", format_speed(self.speed))
    }

    pub fn pause_button_label(&self) -> &'static str {
        if self.paused {
            "Resume"
        } else {
            "Pause"
        }
    }
}

impl View for DashboardModel {
    fn apply(&mut self, update: ViewUpdate) {
        match update {
            ViewUpdate::Status(status) => self.status = status,
            ViewUpdate::Stats(stats) => self.stats = Some(stats),
            ViewUpdate::Progress(p) => self.progress = p,
            ViewUpdate::Frame(bytes) => self.frame = Some(bytes),
            ViewUpdate::ChartPoint(point) => {
                self.chart.record(point);
            }
            ViewUpdate::AppendLogs(entries) => self.console.append_remote(&entries),
            ViewUpdate::LocalLog(message) => self.console.push_local(console_timestamp(), message),
            ViewUpdate::ClearConsole => self.console.clear(),
            ViewUpdate::Speed(speed) => self.speed = speed,
            ViewUpdate::Paused(paused) => self.paused = paused,
        }
    }
}

/// A view that only records what it was told. Cloning shares the record.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingView {
    updates: std::sync::Arc<std::sync::Mutex<Vec<ViewUpdate>>>,
}

#[cfg(test)]
impl RecordingView {
    pub fn updates(&self) -> Vec<ViewUpdate> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn local_logs(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|u| match u {
                ViewUpdate::LocalLog(m) => Some(m),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl View for RecordingView {
    fn apply(&mut self, update: ViewUpdate) {
        if let Ok(mut u) = self.updates.lock() {
            u.push(update);
        }
    }
}
