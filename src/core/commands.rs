//! User commands: optimistic local update, a control message for the server,
//! and a console line. Also reconciles optimistic state once the server reports
//! what it actually applied.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::{Pending, SyncSession};
use crate::state::RemoteState;
use crate::view::{format_speed, ViewUpdate};

pub const MIN_SPEED: f64 = 0.25;
pub const MAX_SPEED: f64 = 4.0;
pub const SPEED_STEP: f64 = 0.25;
pub const DEFAULT_SPEED: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    TogglePause,
    SpeedUp,
    SpeedDown,
    ClearConsole,
}

/// Body of `POST /api/control`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ControlCommand {
    Pause,
    Resume,
    Speed { value: f64 },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandEffect {
    /// Fire-and-forget message for the control endpoint.
    pub control: Option<ControlCommand>,
    pub updates: Vec<ViewUpdate>,
}

/// Apply a user command to the session without waiting for the server.
pub fn dispatch(session: &mut SyncSession, command: UserCommand, now: Instant) -> CommandEffect {
    match command {
        UserCommand::TogglePause => {
            let paused = !session.is_paused();
            session.set_paused(paused);
            session.set_pending_pause(Some(Pending {
                value: paused,
                issued_at: now,
            }));
            CommandEffect {
                control: Some(if paused {
                    ControlCommand::Pause
                } else {
                    ControlCommand::Resume
                }),
                updates: vec![
                    ViewUpdate::Paused(paused),
                    ViewUpdate::LocalLog(
                        if paused {
                            "Training paused"
                        } else {
                            "Training resumed"
                        }
                        .to_string(),
                    ),
                ],
            }
        }
        UserCommand::SpeedUp | UserCommand::SpeedDown => {
            let Some(speed) = step_speed(session.speed(), command == UserCommand::SpeedUp) else {
                return CommandEffect::default();
            };
            session.set_speed(speed);
            session.set_pending_speed(Some(Pending {
                value: speed,
                issued_at: now,
            }));
            CommandEffect {
                control: Some(ControlCommand::Speed { value: speed }),
                updates: vec![
                    ViewUpdate::Speed(speed),
                    ViewUpdate::LocalLog(format!("Speed changed to {}x", format_speed(speed))),
                ],
            }
        }
        UserCommand::ClearConsole => CommandEffect {
            control: None,
            updates: vec![
                ViewUpdate::ClearConsole,
                ViewUpdate::LocalLog("Console cleared".to_string()),
            ],
        },
    }
}

/// Next speed one step up or down, or `None` when already at the bound.
pub fn step_speed(current: f64, up: bool) -> Option<f64> {
    if up {
        (current < MAX_SPEED).then(|| (current + SPEED_STEP).min(MAX_SPEED))
    } else {
        (current > MIN_SPEED).then(|| (current - SPEED_STEP).max(MIN_SPEED))
    }
}

/// Bring a speed reported by the server into the range the controls step over.
pub fn clamp_speed(speed: f64) -> f64 {
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Ack<T> {
    Unchanged,
    Confirmed,
    Held,
    Overruled(T),
    Adopted(T),
}

fn settle<T: Copy>(
    local: T,
    pending: Option<Pending<T>>,
    remote: Option<T>,
    now: Instant,
    grace: Duration,
    same: impl Fn(T, T) -> bool,
) -> Ack<T> {
    let Some(remote) = remote else {
        return Ack::Unchanged;
    };
    match pending {
        Some(p) if same(p.value, remote) => Ack::Confirmed,
        Some(p) if now.saturating_duration_since(p.issued_at) < grace => Ack::Held,
        Some(_) => Ack::Overruled(remote),
        None if same(local, remote) => Ack::Unchanged,
        None => Ack::Adopted(remote),
    }
}

fn same_speed(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

/// Reconcile optimistic pause/speed state against what the server reports.
///
/// A pending change younger than `grace` survives a mismatching snapshot; the
/// server may simply not have applied it yet.
pub fn acknowledge(
    session: &mut SyncSession,
    state: &RemoteState,
    now: Instant,
    grace: Duration,
) -> Vec<ViewUpdate> {
    let mut updates = Vec::new();

    match settle(
        session.speed(),
        session.pending_speed(),
        state.speed.map(clamp_speed),
        now,
        grace,
        same_speed,
    ) {
        Ack::Unchanged | Ack::Held => {}
        Ack::Confirmed => {
            debug!("speed change acknowledged");
            session.set_pending_speed(None);
        }
        Ack::Overruled(speed) => {
            session.set_speed(speed);
            session.set_pending_speed(None);
            updates.push(ViewUpdate::Speed(speed));
            updates.push(ViewUpdate::LocalLog(format!(
                "Server kept speed at {}x",
                format_speed(speed)
            )));
        }
        Ack::Adopted(speed) => {
            session.set_speed(speed);
            updates.push(ViewUpdate::Speed(speed));
        }
    }

    match settle(
        session.is_paused(),
        session.pending_pause(),
        state.paused,
        now,
        grace,
        |a, b| a == b,
    ) {
        Ack::Unchanged | Ack::Held => {}
        Ack::Confirmed => {
            debug!("pause change acknowledged");
            session.set_pending_pause(None);
        }
        Ack::Overruled(paused) => {
            session.set_paused(paused);
            session.set_pending_pause(None);
            updates.push(ViewUpdate::Paused(paused));
            updates.push(ViewUpdate::LocalLog(
                if paused {
                    "Server reports training paused"
                } else {
                    "Server reports training resumed"
                }
                .to_string(),
            ));
        }
        Ack::Adopted(paused) => {
            session.set_paused(paused);
            updates.push(ViewUpdate::Paused(paused));
        }
    }

    updates
}
