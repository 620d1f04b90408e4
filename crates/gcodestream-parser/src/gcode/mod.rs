//! G-Code parser and command encoding
//!
//! This module provides:
//! - Line tokenizing and comment extraction
//! - Modal state tracking and toolpath segments
//! - Arc center reconstruction and arc expansion
//! - Normalization processor pipeline
//! - Encoded commands and their stores (in memory or spooled)
//! - Job loading with per-line error collection

pub mod arc;
pub mod command;
pub mod loader;
pub mod parser;
pub mod pipeline;
pub mod processors;
pub mod segment;
pub mod spool;
pub mod store;
pub mod tokenizer;

pub use arc::*;
pub use command::*;
pub use loader::*;
pub use parser::*;
pub use pipeline::*;
pub use processors::*;
pub use segment::*;
pub use spool::{SpoolReader, SpoolWriter, FIELD_SEPARATOR, META_PREFIX};
pub use store::*;
