//! Interactive terminal drivers behind the `localchat` subcommands.

pub mod bench;
pub mod chat;
pub mod models;
pub mod tools;

use std::future::Future;
use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::chat::Conversation;
use crate::error::ClientError;

const BANNER_WIDTH: usize = 80;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("Terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Empty,
    Quit,
    Clear,
    Message(String),
}

#[must_use]
pub fn parse_input(line: &str) -> InputCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return InputCommand::Empty;
    }
    match trimmed.to_lowercase().as_str() {
        "quit" | "exit" => InputCommand::Quit,
        "clear" => InputCommand::Clear,
        _ => InputCommand::Message(trimmed.to_string()),
    }
}

/// Line reader over stdin that treats Ctrl-C and end of input as quitting.
pub struct LineReader {
    lines: Lines<BufReader<Stdin>>,
}

impl LineReader {
    #[must_use]
    pub fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Print `label` and wait for a line. `None` means the operator left.
    ///
    /// # Errors
    ///
    /// Returns the terminal I/O error.
    pub async fn read_line(&mut self, label: &str) -> Result<Option<String>, AppError> {
        write_flush(label);
        tokio::select! {
            line = self.lines.next_line() => Ok(line?),
            _ = tokio::signal::ctrl_c() => Ok(None),
        }
    }
}

/// Race `work` against Ctrl-C. On interrupt the future is dropped.
///
/// # Errors
///
/// Returns [`ClientError::Cancelled`] on interrupt, otherwise `work`'s error.
pub async fn cancellable<T, F>(work: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::debug!("operation interrupted by operator");
            Err(ClientError::Cancelled)
        }
    }
}

/// Close out one turn that started at `mark`.
///
/// A finished turn is handed to `commit`; a failed or interrupted one rolls
/// the history back to `mark` and returns the error for reporting.
///
/// # Errors
///
/// Returns the turn's error after the rollback.
pub fn settle_turn<T>(
    conversation: &mut Conversation,
    mark: usize,
    result: Result<T, ClientError>,
    commit: impl FnOnce(&mut Conversation, T),
) -> Result<(), ClientError> {
    match result {
        Ok(turn) => {
            commit(conversation, turn);
            Ok(())
        }
        Err(err) => {
            conversation.truncate(mark);
            Err(err)
        }
    }
}

/// Write to stdout and flush; terminal write failures are ignored.
pub fn write_flush(text: &str) {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(text.as_bytes());
    let _ = out.flush();
}

pub fn print_banner(title: &str) {
    let rule = "=".repeat(BANNER_WIDTH);
    println!("{rule}");
    println!("{title}");
    println!("{rule}");
}

/// Operator-facing explanation of a failed turn.
#[must_use]
pub fn describe_error(err: &ClientError) -> String {
    match err {
        ClientError::Cancelled => "Interrupted; the unfinished turn was discarded.".to_string(),
        ClientError::Connection(_) => {
            format!("Error: {err}\nMake sure the inference server is running and reachable.")
        }
        _ => format!("Error: {err}"),
    }
}
