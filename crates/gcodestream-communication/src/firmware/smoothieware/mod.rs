//! Smoothieware firmware
//!
//! Smoothieware queues whole commands and acknowledges each one; capacity
//! is counted in commands rather than bytes.

pub mod response_parser;

use super::{FirmwareProtocol, FlowControl, Response};

pub use response_parser::parse_response;

/// Smoothieware protocol: per-command acknowledgement
#[derive(Debug, Clone)]
pub struct SmoothiewareProtocol {
    buffer_capacity: usize,
}

impl SmoothiewareProtocol {
    /// Protocol allowing `buffer_capacity` commands in flight
    pub fn new(buffer_capacity: usize) -> Self {
        Self { buffer_capacity }
    }
}

impl FirmwareProtocol for SmoothiewareProtocol {
    fn name(&self) -> &'static str {
        "Smoothieware"
    }

    fn flow_control(&self) -> FlowControl {
        FlowControl::CommandCounting
    }

    fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    fn parse_response(&self, line: &str) -> Option<Response> {
        parse_response(line)
    }
}
