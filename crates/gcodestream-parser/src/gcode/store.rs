//! Command stores read forward by the stream controller

use gcodestream_core::GcodeError;
use std::collections::VecDeque;

use super::command::EncodedCommand;

/// Forward-only source of a job's commands
pub trait CommandSource: Send {
    /// Total rows in the job
    fn num_rows(&self) -> usize;

    /// Rows not yet returned by [`next_command`](Self::next_command)
    fn rows_remaining(&self) -> usize;

    /// Next command in job order, `None` once the job is exhausted
    fn next_command(&mut self) -> Result<Option<EncodedCommand>, GcodeError>;
}

/// Commands held in memory, for jobs below the spool threshold
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    commands: VecDeque<EncodedCommand>,
    total: usize,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command at the end of the job
    pub fn push(&mut self, command: EncodedCommand) {
        self.total += 1;
        self.commands.push_back(command);
    }

    /// Check if no rows remain
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl From<Vec<EncodedCommand>> for InMemoryStore {
    fn from(commands: Vec<EncodedCommand>) -> Self {
        Self {
            total: commands.len(),
            commands: commands.into(),
        }
    }
}

impl CommandSource for InMemoryStore {
    fn num_rows(&self) -> usize {
        self.total
    }

    fn rows_remaining(&self) -> usize {
        self.commands.len()
    }

    fn next_command(&mut self) -> Result<Option<EncodedCommand>, GcodeError> {
        Ok(self.commands.pop_front())
    }
}
