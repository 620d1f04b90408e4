//! Controller-facing abstractions shared by every crate

pub mod event;

pub use event::{EventDispatcher, StreamEvent};
