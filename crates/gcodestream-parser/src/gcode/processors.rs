//! G-Code command processor implementations

use gcodestream_core::{ConfigError, GcodeError};
use regex::Regex;
use std::sync::OnceLock;

use super::parser::ParserState;
use super::pipeline::CommandProcessor;
use super::tokenizer::{remove_comment, remove_whitespace, truncate_decimals};

/// Trims G-code commands, or strips every whitespace character
///
/// This is typically the first preprocessor in the pipeline after comment
/// removal.
#[derive(Debug, Clone, Default)]
pub struct WhitespaceProcessor {
    remove_all: bool,
}

impl WhitespaceProcessor {
    /// Trim leading and trailing whitespace only
    pub fn new() -> Self {
        Self { remove_all: false }
    }

    /// Remove all whitespace, `G1 X1` becomes `G1X1`
    pub fn remove_all() -> Self {
        Self { remove_all: true }
    }
}

impl CommandProcessor for WhitespaceProcessor {
    fn name(&self) -> &str {
        "whitespace"
    }

    fn description(&self) -> &str {
        "Removes whitespace from G-code commands"
    }

    fn process(&self, command: &str, _state: &ParserState) -> Result<Vec<String>, GcodeError> {
        let processed = if self.remove_all {
            remove_whitespace(command)
        } else {
            command.trim().to_string()
        };

        if processed.is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![processed])
        }
    }
}

/// Removes G-code comments from commands
///
/// Comments in G-code can be:
/// - Parentheses: (this is a comment)
/// - Semicolon: G01 X10 ; move to X10
#[derive(Debug, Clone, Default)]
pub struct CommentProcessor;

impl CommentProcessor {
    /// Create a new comment processor
    pub fn new() -> Self {
        Self
    }
}

impl CommandProcessor for CommentProcessor {
    fn name(&self) -> &str {
        "comment"
    }

    fn description(&self) -> &str {
        "Removes G-code comments (parentheses and semicolon style)"
    }

    fn process(&self, command: &str, _state: &ParserState) -> Result<Vec<String>, GcodeError> {
        let stripped = remove_comment(command);
        if stripped.is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![stripped])
        }
    }
}

/// Rejects commands longer than the controller accepts
///
/// GRBL's line buffer is small; an oversized line would be truncated by the
/// firmware instead of failing loudly.
#[derive(Debug, Clone)]
pub struct CommandLengthProcessor {
    max_length: usize,
}

impl CommandLengthProcessor {
    /// Create with a maximum command length in characters
    pub fn new(max_length: usize) -> Result<Self, ConfigError> {
        if max_length == 0 {
            return Err(ConfigError::invalid("max_line_length", "must be > 0"));
        }
        Ok(Self { max_length })
    }
}

impl CommandProcessor for CommandLengthProcessor {
    fn name(&self) -> &str {
        "command_length"
    }

    fn description(&self) -> &str {
        "Validates G-code command length against configurable limit"
    }

    fn process(&self, command: &str, _state: &ParserState) -> Result<Vec<String>, GcodeError> {
        let length = command.chars().count();
        if length > self.max_length {
            Err(GcodeError::CommandTooLong {
                line_number: 0,
                length,
                max: self.max_length,
            })
        } else {
            Ok(vec![command.to_string()])
        }
    }
}

/// Rounds decimal numbers in G-code to a configurable precision
///
/// For example with precision 3: `X10.123456` becomes `X10.123`.
#[derive(Debug, Clone)]
pub struct DecimalProcessor {
    precision: usize,
}

impl DecimalProcessor {
    /// Create with a specific decimal precision
    pub fn new(precision: usize) -> Self {
        Self { precision }
    }
}

impl CommandProcessor for DecimalProcessor {
    fn name(&self) -> &str {
        "decimal"
    }

    fn description(&self) -> &str {
        "Rounds decimal numbers in G-code commands to specified precision"
    }

    fn process(&self, command: &str, _state: &ParserState) -> Result<Vec<String>, GcodeError> {
        Ok(vec![truncate_decimals(command, self.precision)])
    }
}

/// Removes commands matching a regex
#[derive(Debug, Clone)]
pub struct PatternRemover {
    pattern: Regex,
}

impl PatternRemover {
    /// Create a new pattern remover with the specified regex pattern
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| ConfigError::invalid("pattern", e.to_string()))?;
        Ok(Self { pattern })
    }
}

impl CommandProcessor for PatternRemover {
    fn name(&self) -> &str {
        "pattern_remover"
    }

    fn description(&self) -> &str {
        "Removes commands matching a specific pattern"
    }

    fn process(&self, command: &str, _state: &ParserState) -> Result<Vec<String>, GcodeError> {
        if self.pattern.is_match(command) {
            Ok(vec![])
        } else {
            Ok(vec![command.to_string()])
        }
    }
}

fn m30_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?i)M0*30(?:[^0-9.]|$)").expect("invalid regex pattern"))
}

/// Strips M30 (program end and reset)
///
/// Streaming a job end rewinds some controllers and resets modal state
/// before the stream is finished.
#[derive(Debug, Clone, Default)]
pub struct M30Processor;

impl M30Processor {
    /// Create a new M30 processor
    pub fn new() -> Self {
        Self
    }
}

impl CommandProcessor for M30Processor {
    fn name(&self) -> &str {
        "m30"
    }

    fn description(&self) -> &str {
        "Removes M30 (program end and reset) commands"
    }

    fn process(&self, command: &str, _state: &ParserState) -> Result<Vec<String>, GcodeError> {
        let stripped = m30_regex().replace_all(command, "");
        let stripped = stripped.trim();
        if stripped.is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![stripped.to_string()])
        }
    }
}
