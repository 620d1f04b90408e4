//! GCodeStream Settings Crate
//!
//! Handles configuration loading, saving, and validation.

pub mod config;
pub mod error;

pub use config::{
    ArcExpansionMode, Config, ConnectionSettings, FileProcessingSettings, FirmwareKind,
    StreamSettings,
};
pub use error::SettingsError;
