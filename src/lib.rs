//! # GCodeStream
//!
//! G-code streaming and machine state synchronization for GRBL-class CNC
//! controllers:
//! - Tokenizing, modal parsing and arc expansion of G-code jobs
//! - Normalization pipeline and spooled storage for large jobs
//! - Buffer-aware streaming with byte-counting (GRBL) or per-command
//!   (Smoothieware) flow control
//! - Status reconciliation and job duration estimates
//!
//! ## Architecture
//!
//! 1. **gcodestream-core** - Data model, errors, event channel
//! 2. **gcodestream-parser** - Tokenizer, parser, arc expander, job loading
//! 3. **gcodestream-communication** - Transport, firmware protocols, stream controller
//! 4. **gcodestream-settings** - Configuration and validation
//! 5. **gcodestream** - This facade and the command-line tool

pub use gcodestream_communication::firmware;
pub use gcodestream_core::data;

pub use gcodestream_core::{
    ConfigError, ConnectionError, ControllerError, ControllerState, ControllerStatus, Error,
    EventDispatcher, GcodeError, Point3D, Result, StreamEvent, StreamState, Units,
};

pub use gcodestream_parser::{
    ArcExpander, CommandCreator, CommandId, CommandProcessor, CommandSource, EncodedCommand,
    GcodeParser, InMemoryStore, JobLoader, LineError, LoadedJob, PointSegment, ProcessedLine,
    ProcessorPipeline, SpoolReader, SpoolWriter, StoreKind,
};

pub use gcodestream_communication::{
    list_ports, Communicator, ConnectionParams, FirmwareProtocol, IoThreads, JobEstimator,
    NoOpCommunicator, SerialCommunicator, SerialParity, SerialPortInfo, StatusReconciler,
    StreamController,
};

pub use gcodestream_settings::{
    ArcExpansionMode, Config, ConnectionSettings, FileProcessingSettings, FirmwareKind,
    SettingsError, StreamSettings,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support, `info` when unset
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
