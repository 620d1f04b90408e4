//! GRBL firmware
//!
//! GRBL buffers up to 128 bytes of serial input (127 usable plus the line
//! terminator in older builds). The streamer keeps the sum of in-flight
//! command lengths under that limit; every command is answered by exactly
//! one `ok` or `error:N` in order.

pub mod error_decoder;
pub mod response_parser;
pub mod status_parser;

use super::{FirmwareProtocol, FlowControl, Response};

pub use error_decoder::{decode_alarm, decode_error};
pub use response_parser::parse_response;
pub use status_parser::parse_status_report;

/// GRBL error code for an overlong line
const LINE_OVERFLOW: u32 = 11;

/// GRBL protocol: byte-counting flow control
#[derive(Debug, Clone)]
pub struct GrblProtocol {
    buffer_capacity: usize,
}

impl GrblProtocol {
    /// Protocol with `buffer_capacity` bytes of receive buffer
    pub fn new(buffer_capacity: usize) -> Self {
        Self { buffer_capacity }
    }
}

impl Default for GrblProtocol {
    fn default() -> Self {
        Self::new(128)
    }
}

impl FirmwareProtocol for GrblProtocol {
    fn name(&self) -> &'static str {
        "GRBL"
    }

    fn flow_control(&self) -> FlowControl {
        FlowControl::ByteCounting
    }

    fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    fn parse_response(&self, line: &str) -> Option<Response> {
        parse_response(line)
    }

    fn is_overflow(&self, response: &Response) -> bool {
        matches!(
            response,
            Response::Error {
                code: Some(LINE_OVERFLOW),
                ..
            }
        )
    }

    fn feed_hold(&self) -> Option<u8> {
        Some(b'!')
    }

    fn cycle_start(&self) -> Option<u8> {
        Some(b'~')
    }
}
