//! Scrollback for the console panel.
//!
//! Heights are in abstract units (pixels for a graphical front end, rows for a
//! terminal with `line_height = 1`).

use crate::state::LogEntry;

/// How close to the bottom still counts as "at the bottom".
pub const PIN_TOLERANCE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrigin {
    Remote,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub timestamp: String,
    pub message: String,
    pub origin: LineOrigin,
}

#[derive(Debug, Clone)]
pub struct ConsoleBuffer {
    lines: Vec<ConsoleLine>,
    line_height: u32,
    viewport_height: u32,
    scroll_top: u32,
}

impl ConsoleBuffer {
    pub fn new(line_height: u32, viewport_height: u32) -> Self {
        Self {
            lines: Vec::new(),
            line_height: line_height.max(1),
            viewport_height,
            scroll_top: 0,
        }
    }

    pub fn lines(&self) -> &[ConsoleLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn scroll_top(&self) -> u32 {
        self.scroll_top
    }

    pub fn content_height(&self) -> u32 {
        (self.lines.len() as u32).saturating_mul(self.line_height)
    }

    fn max_scroll(&self) -> u32 {
        self.content_height().saturating_sub(self.viewport_height)
    }

    pub fn is_at_bottom(&self) -> bool {
        self.max_scroll() <= self.scroll_top.saturating_add(PIN_TOLERANCE)
    }

    /// Append remote entries. Stays pinned to the bottom only if it already was.
    pub fn append_remote(&mut self, entries: &[LogEntry]) {
        if entries.is_empty() {
            return;
        }
        let pinned = self.is_at_bottom();
        self.lines.extend(entries.iter().map(|e| ConsoleLine {
            timestamp: e.timestamp.clone(),
            message: e.message.clone(),
            origin: LineOrigin::Remote,
        }));
        if pinned {
            self.scroll_to_bottom();
        }
    }

    /// Local lines always bring the view to the bottom.
    pub fn push_local(&mut self, timestamp: String, message: String) {
        self.lines.push(ConsoleLine {
            timestamp,
            message,
            origin: LineOrigin::Local,
        });
        self.scroll_to_bottom();
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.scroll_top = 0;
    }

    pub fn scroll_to(&mut self, top: u32) {
        self.scroll_top = top.min(self.max_scroll());
    }

    pub fn scroll_by(&mut self, delta: i64) {
        let top = (self.scroll_top as i64 + delta).max(0);
        self.scroll_to(top.min(u32::MAX as i64) as u32);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_top = self.max_scroll();
    }

    pub fn resize(&mut self, viewport_height: u32) {
        let pinned = self.is_at_bottom();
        self.viewport_height = viewport_height;
        if pinned {
            self.scroll_to_bottom();
        } else {
            self.scroll_to(self.scroll_top);
        }
    }

    /// Lines intersecting the viewport.
    pub fn visible(&self) -> &[ConsoleLine] {
        let first = (self.scroll_top / self.line_height) as usize;
        let end = self.scroll_top.saturating_add(self.viewport_height);
        let last = end.div_ceil(self.line_height) as usize;
        let first = first.min(self.lines.len());
        let last = last.clamp(first, self.lines.len());
        &self.lines[first..last]
    }
}
