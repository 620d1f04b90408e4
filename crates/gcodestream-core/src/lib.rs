//! # GCodeStream Core
//!
//! Core types and utilities for GCodeStream.
//! Provides the data model shared by the parser and the streaming
//! controller, the error taxonomy, and the event channel.

pub mod core;
pub mod data;
pub mod error;

pub use core::event::{EventDispatcher, StreamEvent};

pub use data::{ControllerState, ControllerStatus, Point3D, StreamState, Units, MM_PER_INCH};

pub use error::{ConfigError, ConnectionError, ControllerError, Error, GcodeError, Result};
