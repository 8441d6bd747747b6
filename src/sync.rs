//! StatusSync: the cancellable poll loop.
//!
//! One task owns the session and the view. It multiplexes over cancellation,
//! the single in-flight fetch, the poll delay, the staleness watchdog and user
//! commands. At most one fetch is outstanding; the next one starts
//! `poll_interval` after the previous one settled.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{self, ControlCommand, UserCommand};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::reconcile::{self, Thresholds};
use crate::session::SyncSession;
use crate::state::RemoteState;
use crate::transport::RemoteSource;
use crate::view::{View, ViewUpdate};

type Fetch = Pin<Box<dyn Future<Output = Result<RemoteState, SyncError>> + Send>>;

/// Cheap handle for the outside world: send commands, stop the loop.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<UserCommand>,
    cancel: CancellationToken,
}

impl SyncHandle {
    /// Returns `false` once the loop is gone.
    pub fn send(&self, command: UserCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn toggle_pause(&self) -> bool {
        self.send(UserCommand::TogglePause)
    }

    pub fn speed_up(&self) -> bool {
        self.send(UserCommand::SpeedUp)
    }

    pub fn speed_down(&self) -> bool {
        self.send(UserCommand::SpeedDown)
    }

    pub fn clear_console(&self) -> bool {
        self.send(UserCommand::ClearConsole)
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What the loop hands back after cancellation.
#[derive(Debug)]
pub struct SyncOutcome<V> {
    pub session: SyncSession,
    pub view: V,
}

pub struct StatusSync<R, V> {
    remote: Arc<R>,
    view: V,
    commands: mpsc::UnboundedReceiver<UserCommand>,
    cancel: CancellationToken,
    poll_interval: Duration,
    watchdog_period: Duration,
    thresholds: Thresholds,
}

impl<R: RemoteSource, V: View + Send + 'static> StatusSync<R, V> {
    /// `cancel` may be a child of a wider shutdown token.
    pub fn new(
        remote: Arc<R>,
        view: V,
        config: &SyncConfig,
        cancel: CancellationToken,
    ) -> (Self, SyncHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SyncHandle {
            commands: tx,
            cancel: cancel.clone(),
        };
        let sync = Self {
            remote,
            view,
            commands: rx,
            cancel,
            poll_interval: config.poll_interval(),
            watchdog_period: config.watchdog_period(),
            thresholds: config.thresholds(),
        };
        (sync, handle)
    }

    pub fn spawn(self) -> JoinHandle<SyncOutcome<V>> {
        tokio::spawn(self.run())
    }

    /// Run until cancelled. Individual failures never end the loop.
    pub async fn run(mut self) -> SyncOutcome<V> {
        let start = Instant::now();
        let mut session = SyncSession::new(start.into_std());
        self.emit(ViewUpdate::LocalLog("Training dashboard initialized".to_string()));
        self.emit(ViewUpdate::LocalLog("Connecting to training server...".to_string()));
        info!(
            "sync loop started (poll every {:?}, watchdog every {:?})",
            self.poll_interval, self.watchdog_period
        );

        let mut in_flight: Option<Fetch> = None;
        let next_poll = time::sleep_until(start);
        tokio::pin!(next_poll);
        let mut watchdog = time::interval_at(start + self.watchdog_period, self.watchdog_period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("sync loop cancelled");
                    break;
                }
                result = settle(&mut in_flight) => {
                    in_flight = None;
                    self.on_settled(&mut session, result);
                    next_poll.as_mut().reset(Instant::now() + self.poll_interval);
                }
                _ = &mut next_poll, if in_flight.is_none() => {
                    let remote = Arc::clone(&self.remote);
                    in_flight = Some(Box::pin(async move { remote.fetch_state().await }));
                }
                _ = watchdog.tick() => {
                    let now = Instant::now().into_std();
                    let stale_after = self.thresholds.stale_after;
                    let updates = reconcile::watchdog_tick(&mut session, now, stale_after);
                    self.emit_all(updates);
                }
                Some(command) = self.commands.recv() => {
                    self.on_command(&mut session, command);
                }
            }
        }

        SyncOutcome {
            session,
            view: self.view,
        }
    }

    fn on_settled(&mut self, session: &mut SyncSession, result: Result<RemoteState, SyncError>) {
        let now = Instant::now().into_std();
        let updates = match result {
            Ok(state) => {
                reconcile::poll_succeeded(session, &state, now, Local::now(), self.thresholds)
            }
            Err(e) => {
                if e.is_connectivity() {
                    debug!("poll failed: {}", e);
                } else {
                    warn!("poll rejected: {}", e);
                }
                reconcile::poll_failed(session, &e, now, self.thresholds.stale_after)
            }
        };
        self.emit_all(updates);
    }

    fn on_command(&mut self, session: &mut SyncSession, command: UserCommand) {
        let effect = commands::dispatch(session, command, Instant::now().into_std());
        if let Some(control) = effect.control {
            self.send_control(control);
        }
        self.emit_all(effect.updates);
    }

    /// Fire-and-forget; the loop never waits on the control endpoint.
    fn send_control(&self, control: ControlCommand) {
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            if let Err(e) = remote.send_control(&control).await {
                warn!("control command {:?} failed: {}", control, e);
            }
        });
    }

    fn emit(&mut self, update: ViewUpdate) {
        self.view.apply(update);
    }

    fn emit_all(&mut self, updates: Vec<ViewUpdate>) {
        for update in updates {
            self.view.apply(update);
        }
    }
}

/// Resolves when the in-flight fetch settles; never resolves if there is none.
async fn settle(in_flight: &mut Option<Fetch>) -> Result<RemoteState, SyncError> {
    match in_flight.as_mut() {
        Some(fetch) => fetch.await,
        None => std::future::pending().await,
    }
}
