//! Keeps a local dashboard view consistent with a remote training process
//! that is only intermittently reachable.
//!
//! The pure core (`state`, `session`, `reconcile`, `commands`, `view`) turns
//! snapshots and user commands into view updates. `sync` drives it from a
//! cancellable poll loop over a `transport::RemoteSource`.

#[path = "core/commands.rs"]
pub mod commands;

#[path = "core/reconcile.rs"]
pub mod reconcile;

#[path = "core/session.rs"]
pub mod session;

#[path = "core/state.rs"]
pub mod state;

pub mod config;
pub mod error;
pub mod sync;
pub mod transport;
pub mod view;

pub use config::SyncConfig;
pub use error::SyncError;
pub use sync::{StatusSync, SyncHandle, SyncOutcome};
pub use tokio_util::sync::CancellationToken;
