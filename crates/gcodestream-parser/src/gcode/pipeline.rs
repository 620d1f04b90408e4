//! G-Code processor pipeline

use gcodestream_core::{ConfigError, GcodeError};
use gcodestream_settings::FileProcessingSettings;
use std::sync::Arc;

use super::parser::ParserState;
use super::processors::{
    CommandLengthProcessor, CommentProcessor, DecimalProcessor, M30Processor, WhitespaceProcessor,
};

/// Trait for G-Code command processors
///
/// Processors transform command text before it is parsed and sent. They
/// are applied in a pipeline.
///
/// # Examples
/// - Comment removal
/// - Whitespace normalization
/// - Decimal truncation
/// - Line length enforcement
pub trait CommandProcessor: Send + Sync {
    /// Get the name/identifier of this processor
    fn name(&self) -> &str;

    /// Get a description of what this processor does
    fn description(&self) -> &str;

    /// Process a single G-Code command
    ///
    /// # Arguments
    /// * `command` - The command text to process
    /// * `state` - Parser state before the command
    ///
    /// # Returns
    /// The commands replacing `command`. Return an empty vector to skip it.
    fn process(&self, command: &str, state: &ParserState) -> Result<Vec<String>, GcodeError>;

    /// Check if this processor is enabled
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Arc-wrapped processor for thread-safe sharing
pub type ProcessorHandle = Arc<dyn CommandProcessor>;

/// G-Code command processor pipeline
///
/// Manages a sequence of command processors applied in registration order.
/// Each processor can transform the command, skip it, or replace it with
/// several commands. Blank results are always dropped.
///
/// # Example
/// ```ignore
/// let mut pipeline = ProcessorPipeline::new();
/// pipeline.register(Arc::new(CommentProcessor::new()));
/// pipeline.register(Arc::new(WhitespaceProcessor::new()));
///
/// let commands = pipeline.process("G1 X1 (move)", &ParserState::default())?;
/// ```
#[derive(Clone, Default)]
pub struct ProcessorPipeline {
    processors: Vec<ProcessorHandle>,
}

impl ProcessorPipeline {
    /// Create a new empty processor pipeline
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    /// Pipeline for the given file processing settings
    ///
    /// Order: comments, whitespace, M30, decimals, line length.
    pub fn from_settings(settings: &FileProcessingSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let mut pipeline = Self::new();

        if settings.remove_comments {
            pipeline.register(Arc::new(CommentProcessor::new()));
        }
        pipeline.register(Arc::new(if settings.remove_whitespace {
            WhitespaceProcessor::remove_all()
        } else {
            WhitespaceProcessor::new()
        }));
        if settings.strip_m30 {
            pipeline.register(Arc::new(M30Processor::new()));
        }
        if let Some(precision) = settings.decimal_precision {
            pipeline.register(Arc::new(DecimalProcessor::new(precision)));
        }
        pipeline.register(Arc::new(CommandLengthProcessor::new(settings.max_line_length)?));

        Ok(pipeline)
    }

    /// Register a processor in the pipeline
    ///
    /// Processors are applied in the order they are registered.
    pub fn register(&mut self, processor: ProcessorHandle) -> &mut Self {
        self.processors.push(processor);
        self
    }

    /// Get the number of registered processors
    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// Get a reference to a processor by name
    pub fn get_processor_by_name(&self, name: &str) -> Option<&ProcessorHandle> {
        self.processors.iter().find(|p| p.name() == name)
    }

    /// List all registered processors
    pub fn list_processors(&self) -> Vec<(&str, &str, bool)> {
        self.processors
            .iter()
            .map(|p| (p.name(), p.description(), p.is_enabled()))
            .collect()
    }

    /// Process a single command through the entire pipeline
    pub fn process(&self, command: &str, state: &ParserState) -> Result<Vec<String>, GcodeError> {
        let mut current = vec![command.to_string()];

        for processor in &self.processors {
            if !processor.is_enabled() {
                continue;
            }

            let mut next = Vec::with_capacity(current.len());
            for cmd in &current {
                match processor.process(cmd, state) {
                    Ok(processed) => next.extend(processed),
                    Err(e) => {
                        tracing::debug!(
                            "Processor '{}' failed on command '{}': {}",
                            processor.name(),
                            cmd,
                            e
                        );
                        return Err(e);
                    }
                }
            }
            current = next;

            if current.is_empty() {
                break;
            }
        }

        current.retain(|c| !c.trim().is_empty());
        Ok(current)
    }
}
