/*
Operator console: reads commands from stdin on a plain thread (tokio's
stdin would keep the runtime from exiting) and runs them on the runtime.
*/

use std::io::BufRead;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::server::Shutdown;
use crate::state::SharedState;

pub const HELP: &str = "Available commands: stop, status, save, repair_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Stop,
    Status,
    Save,
    Repair,
    Help,
}

impl ConsoleCommand {
    /// `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let cmd = line.trim().to_lowercase();
        Some(match cmd.as_str() {
            "" => return None,
            "stop" => ConsoleCommand::Stop,
            "status" => ConsoleCommand::Status,
            "save" => ConsoleCommand::Save,
            "repair_data" | "repair" => ConsoleCommand::Repair,
            _ => ConsoleCommand::Help,
        })
    }
}

pub async fn execute(cmd: ConsoleCommand, state: &SharedState, shutdown: &Shutdown) {
    match cmd {
        ConsoleCommand::Stop => {
            info!("stop requested from console");
            shutdown.trigger();
        }
        ConsoleCommand::Status => {
            let report = state.read().await.status();
            info!("status: {} connected users", report.online);
            info!("private chats: {}", report.private_chats);
            info!("groups: {:?}", report.groups);
            info!("users: {:?}", report.users);
        }
        ConsoleCommand::Save => {
            if state.write().await.persist().await {
                info!("data saved manually");
            }
        }
        ConsoleCommand::Repair => match state.write().await.repair().await {
            Ok(Some(backup)) => info!("data repaired, previous snapshot at {}", backup.display()),
            Ok(None) => info!("data repaired, there was no previous snapshot"),
            Err(e) => error!("repair failed: {e}"),
        },
        ConsoleCommand::Help => info!("{HELP}"),
    }
}

pub fn spawn(state: SharedState, shutdown: Shutdown, runtime: Handle) {
    info!("{HELP}");
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("console read failed: {e}");
                    break;
                }
            };
            let Some(cmd) = ConsoleCommand::parse(&line) else {
                continue;
            };
            runtime.block_on(execute(cmd, &state, &shutdown));
            if shutdown.is_triggered() {
                break;
            }
        }
    });
}
