//! Command dispatcher - validates inbound commands and spawns their handlers

use super::handlers::{self, HandlerContext};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wake_shared::codec::decode_command;
use wake_shared::{CodecError, Command};

/// Result of command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Command carried out
    Completed { message: String },
    /// Command accepted but its action failed
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Wake,
    Status,
}

/// What happened to one inbound message
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Not addressed to the command topic
    Ignored,
    /// Malformed or missing required fields; nothing was started
    Rejected(CodecError),
    /// Well-formed but the id is not one we handle
    Unhandled(i64),
    /// A background task now owns the command
    Dispatched {
        kind: CommandKind,
        task: JoinHandle<CommandResult>,
    },
}

/// Turns inbound command messages into background work
pub struct CommandDispatcher {
    command_topic: String,
    ctx: HandlerContext,
}

impl CommandDispatcher {
    pub fn new(command_topic: impl Into<String>, ctx: HandlerContext) -> Self {
        Self {
            command_topic: command_topic.into(),
            ctx,
        }
    }

    /// Validate and dispatch one message
    ///
    /// Never waits on the command's action, so it is safe to call from the
    /// channel's receive path.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        if topic != self.command_topic {
            debug!("[CMD] ignoring message on {}", topic);
            return DispatchOutcome::Ignored;
        }

        let command = match decode_command(payload) {
            Ok(command) => command,
            Err(e) => return DispatchOutcome::Rejected(e),
        };

        let ctx = self.ctx.clone();
        let (kind, task) = match command {
            Command::Wake(request) => {
                info!("[CMD] wake {} (verify={})", request.mac, request.verify.is_some());
                let task = tokio::spawn(async move {
                    let result = handlers::handle_wake(&ctx, request).await;
                    log_result(CommandKind::Wake, &result);
                    result
                });
                (CommandKind::Wake, task)
            }
            Command::Status(request) => {
                info!("[CMD] status {} ({})", request.ip, request.mac);
                let task = tokio::spawn(async move {
                    let result = handlers::handle_status_request(&ctx, request).await;
                    log_result(CommandKind::Status, &result);
                    result
                });
                (CommandKind::Status, task)
            }
            Command::Unknown(id) => return DispatchOutcome::Unhandled(id),
        };

        DispatchOutcome::Dispatched { kind, task }
    }
}

fn log_result(kind: CommandKind, result: &CommandResult) {
    match result {
        CommandResult::Completed { message } => debug!("[CMD] {:?}: {}", kind, message),
        CommandResult::Failed { message } => warn!("[CMD] {:?}: {}", kind, message),
    }
}
