//! Line-oriented terminal renderer.
//!
//! Keeps a `DashboardModel` current and prints what changed. Stats are printed
//! once per new chart point rather than on every poll.

use std::io::Write;
use std::path::PathBuf;

use tracing::warn;
use trainwatch::view::{console_timestamp, progress_label, DashboardModel, View, ViewUpdate};

pub struct TerminalView<W: Write> {
    out: W,
    model: DashboardModel,
    frame_out: Option<PathBuf>,
    frames_written: u64,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W, model: DashboardModel, frame_out: Option<PathBuf>) -> Self {
        Self {
            out,
            model,
            frame_out,
            frames_written: 0,
        }
    }

    pub fn model(&self) -> &DashboardModel {
        &self.model
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        // A closed stdout is not worth stopping the loop over.
        let _ = writeln!(self.out, "{text}");
    }

    fn write_frame(&mut self, bytes: &[u8]) {
        let Some(path) = self.frame_out.as_ref() else {
            return;
        };
        if self.model.frame.as_deref() == Some(bytes) {
            return;
        }
        match std::fs::write(path, bytes) {
            Ok(()) => self.frames_written += 1,
            Err(e) => warn!("Failed to write frame to {:?}: {}", path, e),
        }
    }
}

impl<W: Write> View for TerminalView<W> {
    fn apply(&mut self, update: ViewUpdate) {
        match &update {
            ViewUpdate::Status(status) => {
                let text = format!("== {} ==", status.label());
                self.line(&text);
            }
            ViewUpdate::ChartPoint(point) => {
                let progress = self
                    .model
                    .stats
                    .as_ref()
                    .map(|s| {
                        let percent = progress_label(self.model.progress);
                        format!("{} ({})", s.episode_label(), percent)
                    })
                    .unwrap_or_else(|| point.episode.to_string());
                let text = format!(
                    "episode {}  score {}  avg {:.2}  eps {:.4}",
                    progress, point.score, point.avg_score, point.epsilon
                );
                self.line(&text);
            }
            ViewUpdate::AppendLogs(entries) => {
                for e in entries {
                    let text = format!("[{}] {}", e.timestamp, e.message);
                    self.line(&text);
                }
            }
            ViewUpdate::LocalLog(message) => {
                let text = format!("[{}] * {}", console_timestamp(), message);
                self.line(&text);
            }
            ViewUpdate::Speed(_) | ViewUpdate::Paused(_) => {}
            ViewUpdate::Frame(bytes) => self.write_frame(bytes),
            ViewUpdate::Stats(_) | ViewUpdate::Progress(_) | ViewUpdate::ClearConsole => {}
        }

        let controls_changed = matches!(update, ViewUpdate::Speed(_) | ViewUpdate::Paused(_));
        self.model.apply(update);
        if controls_changed {
            let text = format!(
                "{}  [{}]",
                self.model.speed_label(),
                self.model.pause_button_label()
            );
            self.line(&text);
        }
    }
}
