//! Keyboard commands, one per line on stdin.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use trainwatch::commands::UserCommand;
use trainwatch::SyncHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Command(UserCommand),
    Quit,
}

pub const HELP: &str =
    "keys: p = pause/resume, + = faster, - = slower, c = clear console, q = quit";

pub fn parse_key(line: &str) -> Option<Key> {
    match line.trim() {
        "p" | "P" => Some(Key::Command(UserCommand::TogglePause)),
        "+" | "=" => Some(Key::Command(UserCommand::SpeedUp)),
        "-" | "_" => Some(Key::Command(UserCommand::SpeedDown)),
        "c" | "C" => Some(Key::Command(UserCommand::ClearConsole)),
        "q" | "Q" | "quit" | "exit" => Some(Key::Quit),
        _ => None,
    }
}

/// Forward stdin lines to the sync loop until quit, EOF, or shutdown.
pub async fn forward_stdin(handle: SyncHandle) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match parse_key(&line) {
            Some(Key::Command(command)) => {
                if !handle.send(command) {
                    break;
                }
            }
            Some(Key::Quit) => {
                info!("Quit requested");
                handle.shutdown();
                break;
            }
            None => debug!("ignoring input {:?}", line),
        }
    }

    Ok(())
}
