//! Firmware flavors
//!
//! Supported controllers:
//! - GRBL: byte-counting receive buffer, `ok`/`error:N`/`ALARM:N` replies
//! - Smoothieware: one `ok` per command, GRBL-style status reports
//!
//! Each flavor implements [`FirmwareProtocol`], the capability interface the
//! stream controller schedules against.

pub mod grbl;
pub mod smoothieware;

use gcodestream_core::Point3D;
use gcodestream_parser::EncodedCommand;
use gcodestream_settings::{FirmwareKind, StreamSettings};
use serde::{Deserialize, Serialize};

pub use grbl::GrblProtocol;
pub use smoothieware::SmoothiewareProtocol;

/// How the firmware's receive buffer is accounted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    /// Capacity is in bytes; every command costs its length plus newline
    ByteCounting,
    /// Capacity is in commands; every command costs one slot
    CommandCounting,
}

/// Planner and serial buffer usage from a status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferState {
    /// Free planner blocks
    pub planner_blocks: u32,
    /// Free bytes in the serial receive buffer
    pub rx_bytes: u32,
}

/// A status report as sent by the firmware, not yet reconciled
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusReport {
    /// Raw state word, e.g. "Idle" or "Hold:0"
    pub state: String,
    /// Machine position, if reported
    pub machine_position: Option<Point3D>,
    /// Work position, if reported
    pub work_position: Option<Point3D>,
    /// Work coordinate offset, if reported
    pub work_coordinate_offset: Option<Point3D>,
    /// Current feed rate
    pub feed_rate: Option<f64>,
    /// Current spindle speed
    pub spindle_speed: Option<f64>,
    /// Buffer usage
    pub buffer: Option<BufferState>,
}

/// One line from the firmware, classified
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Oldest in-flight command completed
    Ack,
    /// Oldest in-flight command was rejected
    Error {
        /// Numeric code when the firmware sends one
        code: Option<u32>,
        /// Human-readable reason
        message: String,
    },
    /// Firmware entered an alarm state
    Alarm {
        /// Alarm code
        code: u32,
        /// Human-readable reason
        message: String,
    },
    /// Asynchronous status report
    Status(StatusReport),
    /// Startup banner; the firmware has just reset
    Welcome(String),
    /// Anything else (feedback messages, settings, echoes)
    Message(String),
}

/// Capability interface for a firmware family
pub trait FirmwareProtocol: Send + Sync {
    /// Firmware name for logging
    fn name(&self) -> &'static str;

    /// Receive buffer accounting
    fn flow_control(&self) -> FlowControl;

    /// Receive buffer capacity in [`FlowControl`] units
    fn buffer_capacity(&self) -> usize;

    /// Buffer slots `command` occupies until acknowledged
    fn command_cost(&self, command: &EncodedCommand) -> usize {
        match self.flow_control() {
            FlowControl::ByteCounting => command.wire_len(),
            FlowControl::CommandCounting => 1,
        }
    }

    /// Classify one received line; `None` for blank lines
    fn parse_response(&self, line: &str) -> Option<Response>;

    /// Whether an error reply means the receive buffer overflowed
    fn is_overflow(&self, _response: &Response) -> bool {
        false
    }

    /// Realtime byte requesting a status report
    fn status_query(&self) -> Option<u8> {
        Some(b'?')
    }

    /// Realtime byte pausing motion
    fn feed_hold(&self) -> Option<u8> {
        None
    }

    /// Realtime byte resuming motion after a feed hold
    fn cycle_start(&self) -> Option<u8> {
        None
    }

    /// Realtime byte resetting the firmware
    fn soft_reset(&self) -> Option<u8> {
        Some(0x18)
    }
}

/// Protocol for the firmware named in `settings`
pub fn protocol_for(settings: &StreamSettings) -> Box<dyn FirmwareProtocol> {
    match settings.firmware {
        FirmwareKind::Grbl => Box::new(GrblProtocol::new(settings.buffer_capacity)),
        FirmwareKind::Smoothieware => {
            Box::new(SmoothiewareProtocol::new(settings.buffer_capacity))
        }
    }
}
