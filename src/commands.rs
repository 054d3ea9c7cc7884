//! Operator commands: `!properties` runs a check now, `!clear [n]` removes
//! recently posted notifications. Both require the configured owner.

use crate::notify::Notifier;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};

const COMMAND_PREFIX: char = '!';
const DEFAULT_CLEAR_AMOUNT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Properties,
    Clear(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// A check was queued (or one was already pending)
    Triggered,
    Cleared(usize),
    /// Short-lived notice shown instead of running the command
    Rejected(String),
    Unknown(String),
    /// Not a command at all
    Ignored,
}

/// Parse one input line; `None` when it is not addressed to the bot
pub fn parse_command(line: &str) -> Option<Result<Command, String>> {
    let body = line.trim().strip_prefix(COMMAND_PREFIX)?;
    let mut parts = body.split_whitespace();
    let name = parts.next()?;

    let command = match name {
        "properties" => Ok(Command::Properties),
        "clear" => match parts.next() {
            None => Ok(Command::Clear(DEFAULT_CLEAR_AMOUNT)),
            Some(n) => n
                .parse::<usize>()
                .map(Command::Clear)
                .map_err(|_| format!("clear expects a number, got '{}'", n)),
        },
        other => Err(format!("unknown command '{}'", other)),
    };
    Some(command)
}

/// Routes commands to the scheduler and notifier after the owner check
pub struct CommandRouter {
    owner_id: String,
    triggers: mpsc::Sender<()>,
    notifier: Arc<dyn Notifier>,
}

impl CommandRouter {
    pub fn new(owner_id: String, triggers: mpsc::Sender<()>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            owner_id,
            triggers,
            notifier,
        }
    }

    pub async fn handle(&self, author: &str, line: &str) -> CommandOutcome {
        let command = match parse_command(line) {
            None => return CommandOutcome::Ignored,
            Some(Err(reason)) => return CommandOutcome::Unknown(reason),
            Some(Ok(command)) => command,
        };

        info!("Command executed: {} by {}", line.trim(), author);

        if author != self.owner_id {
            return CommandOutcome::Rejected(format!(
                "{} is not allowed to run this command",
                author
            ));
        }

        match command {
            Command::Properties => {
                info!("Checking for new properties...");
                match self.triggers.try_send(()) {
                    Ok(()) | Err(TrySendError::Full(())) => CommandOutcome::Triggered,
                    Err(TrySendError::Closed(())) => {
                        CommandOutcome::Rejected("scheduler is not running".to_string())
                    }
                }
            }
            Command::Clear(amount) => match self.notifier.clear_recent(amount).await {
                Ok(deleted) => CommandOutcome::Cleared(deleted),
                Err(e) => {
                    error!("Clear failed: {}", e);
                    CommandOutcome::Rejected("could not clear messages".to_string())
                }
            },
        }
    }
}

/// Identity of whoever is at the local console
pub fn console_identity() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

/// Read commands from stdin until it closes
pub async fn run_console(router: CommandRouter, identity: String) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Console closed, commands disabled");
                return;
            }
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                return;
            }
        };

        match router.handle(&identity, &line).await {
            CommandOutcome::Triggered => info!("Check queued"),
            CommandOutcome::Cleared(n) => info!("Cleared {} messages", n),
            CommandOutcome::Rejected(notice) | CommandOutcome::Unknown(notice) => {
                warn!("{}", notice)
            }
            CommandOutcome::Ignored => {}
        }
    }
}
