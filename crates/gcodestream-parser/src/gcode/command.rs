//! Encoded commands and their lifecycle

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::parser::ProcessedLine;

/// Unique identifier for an encoded command
pub type CommandId = String;

/// Command execution state
///
/// Represents the lifecycle state of a command from queueing through
/// completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandState {
    /// Command created but not yet sent
    Pending,
    /// Command sent to controller, awaiting response
    Sent,
    /// Controller acknowledged the command
    Done,
    /// Command generated an error response
    Error,
    /// Command was skipped (not sent)
    Skipped,
}

impl std::fmt::Display for CommandState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Sent => write!(f, "Sent"),
            Self::Done => write!(f, "Done"),
            Self::Error => write!(f, "Error"),
            Self::Skipped => write!(f, "Skipped"),
        }
    }
}

/// A transmissible command with its bookkeeping
///
/// Created by the parser side; only the stream controller changes its
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedCommand {
    /// Unique identifier for this command
    pub id: CommandId,
    /// Text as it appeared in the job
    pub original: String,
    /// Text that is transmitted
    pub command: String,
    /// Comment from the source line, `""` when none
    pub comment: String,
    /// Source line number (0 for manual commands)
    pub line_number: u32,
    /// Position in the job, starting at 1
    pub sequence_number: u32,
    /// Command execution state
    pub state: CommandState,
    /// Firmware response when the command failed
    pub error: Option<String>,
    /// Sent as part of a temporary modal change (jogging)
    pub temporary_modal_change: bool,
    /// Timestamp when command was sent (milliseconds)
    pub sent_at: Option<u64>,
    /// Timestamp when command completed (milliseconds)
    pub completed_at: Option<u64>,
}

impl EncodedCommand {
    /// Create a pending command
    pub fn new(
        command: impl Into<String>,
        original: impl Into<String>,
        comment: impl Into<String>,
        line_number: u32,
        sequence_number: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            original: original.into(),
            command: command.into(),
            comment: comment.into(),
            line_number,
            sequence_number,
            state: CommandState::Pending,
            error: None,
            temporary_modal_change: false,
            sent_at: None,
            completed_at: None,
        }
    }

    /// Bytes on the wire, including the terminating newline
    pub fn wire_len(&self) -> usize {
        self.command.len() + 1
    }

    /// Nothing is transmitted; only the comment is reported
    pub fn is_empty(&self) -> bool {
        self.command.trim().is_empty()
    }

    /// Mark this command as sent
    pub fn mark_sent(&mut self) -> &mut Self {
        debug_assert!(
            self.state == CommandState::Pending,
            "mark_sent called on command in {:?} state (expected Pending)",
            self.state
        );
        self.state = CommandState::Sent;
        self.sent_at = Some(Self::current_timestamp());
        self
    }

    /// Mark this command as acknowledged
    pub fn mark_done(&mut self) -> &mut Self {
        debug_assert!(
            self.state == CommandState::Sent,
            "mark_done called on command in {:?} state (expected Sent)",
            self.state
        );
        self.state = CommandState::Done;
        self.completed_at = Some(Self::current_timestamp());
        self
    }

    /// Mark this command with an error
    pub fn mark_error(&mut self, message: impl Into<String>) -> &mut Self {
        debug_assert!(
            matches!(self.state, CommandState::Pending | CommandState::Sent),
            "mark_error called on command in {:?} state (expected Pending or Sent)",
            self.state
        );
        self.state = CommandState::Error;
        self.completed_at = Some(Self::current_timestamp());
        self.error = Some(message.into());
        self
    }

    /// Mark this command as skipped
    pub fn mark_skipped(&mut self) -> &mut Self {
        debug_assert!(
            self.state == CommandState::Pending,
            "mark_skipped called on command in {:?} state (expected Pending)",
            self.state
        );
        self.state = CommandState::Skipped;
        self.completed_at = Some(Self::current_timestamp());
        self
    }

    /// Acknowledged, successfully or not
    pub fn is_done(&self) -> bool {
        matches!(self.state, CommandState::Done | CommandState::Error)
    }

    /// Never transmitted
    pub fn is_skipped(&self) -> bool {
        self.state == CommandState::Skipped
    }

    /// Get duration from sent to completion (milliseconds)
    pub fn execution_duration(&self) -> Option<u64> {
        self.sent_at.and_then(|sent| {
            self.completed_at
                .map(|completed| completed.saturating_sub(sent))
        })
    }

    /// Get current timestamp in milliseconds
    fn current_timestamp() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

impl std::fmt::Display for EncodedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} [{}] {}", self.sequence_number, self.state, self.command)
    }
}

/// Command numbering generator for sequential tracking
#[derive(Clone)]
pub struct CommandNumberGenerator {
    counter: Arc<AtomicU32>,
}

impl CommandNumberGenerator {
    /// Generator whose first number is 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Generator whose first number is `first`
    pub fn starting_at(first: u32) -> Self {
        Self {
            counter: Arc::new(AtomicU32::new(first)),
        }
    }

    /// Get the next command number
    pub fn next(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Number the next call to [`next`](Self::next) returns
    pub fn current(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Reset the counter to 1
    pub fn reset(&self) {
        self.counter.store(1, Ordering::SeqCst);
    }
}

impl Default for CommandNumberGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps normalized lines into numbered [`EncodedCommand`]s
#[derive(Clone, Default)]
pub struct CommandCreator {
    numbers: CommandNumberGenerator,
}

impl CommandCreator {
    /// Creator numbering from 1
    pub fn new() -> Self {
        Self::default()
    }

    /// One command per normalized line
    ///
    /// A skipped line that carries a comment still yields a command with
    /// empty text so the comment is reported when the stream reaches it.
    pub fn create_commands(&self, line: &ProcessedLine) -> Vec<EncodedCommand> {
        if line.normalized.is_empty() {
            if line.comment.is_empty() {
                return Vec::new();
            }
            return vec![EncodedCommand::new(
                "",
                line.original.clone(),
                line.comment.clone(),
                line.line_number,
                self.numbers.next(),
            )];
        }

        line.normalized
            .iter()
            .map(|command| {
                EncodedCommand::new(
                    command.clone(),
                    line.original.clone(),
                    line.comment.clone(),
                    line.line_number,
                    self.numbers.next(),
                )
            })
            .collect()
    }

    /// A command typed by the operator rather than read from a job
    pub fn create_manual(&self, command: &str) -> EncodedCommand {
        let text = command.trim();
        EncodedCommand::new(text, text, "", 0, self.numbers.next())
    }

    /// Number the next command receives
    pub fn next_sequence(&self) -> u32 {
        self.numbers.current()
    }

    /// Restart numbering at 1
    pub fn reset(&self) {
        self.numbers.reset();
    }
}
