//! Data models for positions, status, and machine state
//!
//! This module provides:
//! - Unit management (MM, INCH)
//! - Immutable 3-axis points
//! - Controller run-state as reported by firmware
//! - Controller status snapshots produced by status reconciliation
//! - Stream state machine states

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Millimeters per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Machine coordinate units (millimeters or inches)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Units {
    /// Millimeters (metric, G21)
    #[default]
    MM,
    /// Inches (imperial, G20)
    INCH,
}

impl Units {
    /// Convert a value from one unit to another
    ///
    /// # Arguments
    /// * `value` - The value to convert
    /// * `from` - The unit of the input value
    /// * `to` - The target unit
    pub fn convert(value: f64, from: Units, to: Units) -> f64 {
        match (from, to) {
            (Units::MM, Units::INCH) => value / MM_PER_INCH,
            (Units::INCH, Units::MM) => value * MM_PER_INCH,
            _ => value,
        }
    }

    /// Scale factor that converts a length in these units to millimeters
    pub fn to_mm_factor(self) -> f64 {
        match self {
            Units::MM => 1.0,
            Units::INCH => MM_PER_INCH,
        }
    }

    /// The G-code word selecting these units
    pub fn gcode(self) -> &'static str {
        match self {
            Units::MM => "G21",
            Units::INCH => "G20",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::MM => write!(f, "mm"),
            Units::INCH => write!(f, "in"),
        }
    }
}

/// A 3-axis coordinate
///
/// Points are values: every motion produces a new point from the previous
/// one, nothing is ever updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Point3D {
    /// Create a point from its coordinates
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The machine origin
    pub const fn origin() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Component-wise sum
    pub fn add(self, other: Point3D) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Component-wise difference
    pub fn subtract(self, other: Point3D) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Euclidean distance in XYZ
    pub fn distance(&self, other: &Point3D) -> f64 {
        let d = self.subtract(*other);
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }

    /// Distance projected on the XY plane
    pub fn distance_xy(&self, other: &Point3D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// True if every axis is a finite number
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Point3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.3} Y:{:.3} Z:{:.3}", self.x, self.y, self.z)
    }
}

/// Machine/Controller run-state
///
/// Represents the operational state reported by the CNC controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControllerState {
    /// Not connected to any controller
    #[default]
    Disconnected,
    /// Connected and idle, ready for commands
    Idle,
    /// Executing a G-code program
    Run,
    /// Program paused, awaiting resume
    Hold,
    /// Manual jog/movement mode
    Jog,
    /// Machine alarm state (requires manual intervention)
    Alarm,
    /// Check mode (dry-run without machine movement)
    Check,
    /// Safety door interlock triggered
    Door,
    /// Homing cycle in progress
    Home,
    /// Low-power sleep state
    Sleep,
    /// Reported state string was not recognized
    Unknown,
}

impl ControllerState {
    /// Map a firmware state word ("Idle", "Hold:0", "Door:1", ...) to a state
    pub fn from_firmware_state(state: &str) -> Self {
        let base = state.split(':').next().unwrap_or(state).trim();
        match base.to_ascii_lowercase().as_str() {
            "idle" => Self::Idle,
            "run" => Self::Run,
            "hold" | "queue" => Self::Hold,
            "jog" => Self::Jog,
            "alarm" => Self::Alarm,
            "check" => Self::Check,
            "door" => Self::Door,
            "home" | "homing" => Self::Home,
            "sleep" => Self::Sleep,
            _ => Self::Unknown,
        }
    }

    /// Check if this state indicates the controller is connected
    pub fn is_connected(&self) -> bool {
        !matches!(self, ControllerState::Disconnected)
    }

    /// Check if this state indicates an error condition
    pub fn is_error(&self) -> bool {
        matches!(self, ControllerState::Alarm)
    }

    /// Check if this state indicates active motion
    pub fn is_moving(&self) -> bool {
        matches!(
            self,
            ControllerState::Run | ControllerState::Jog | ControllerState::Home
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Idle => write!(f, "Idle"),
            Self::Run => write!(f, "Run"),
            Self::Hold => write!(f, "Hold"),
            Self::Jog => write!(f, "Jog"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Check => write!(f, "Check"),
            Self::Door => write!(f, "Door"),
            Self::Home => write!(f, "Home"),
            Self::Sleep => write!(f, "Sleep"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Snapshot of machine state built from asynchronous status reports
///
/// Overwritten wholesale each time a report is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    /// Run-state reported by the firmware
    pub state: ControllerState,
    /// Raw state word as reported, e.g. "Hold:0"
    pub state_string: String,
    /// Position in machine coordinates
    pub machine_coordinate: Point3D,
    /// Position in work coordinates
    pub work_coordinate: Point3D,
    /// Work coordinate offset, when the firmware reported one
    pub work_coordinate_offset: Option<Point3D>,
    /// Current feed rate
    pub feed_rate: Option<f64>,
    /// Current spindle speed (RPM)
    pub spindle_speed: Option<f64>,
    /// Units the coordinates are expressed in
    pub units: Units,
    /// When the report was applied
    pub timestamp: Option<DateTime<Utc>>,
}

impl ControllerStatus {
    /// Status of a controller that has not reported yet
    pub fn new() -> Self {
        Self {
            state: ControllerState::Disconnected,
            state_string: String::new(),
            machine_coordinate: Point3D::origin(),
            work_coordinate: Point3D::origin(),
            work_coordinate_offset: None,
            feed_rate: None,
            spindle_speed: None,
            units: Units::MM,
            timestamp: None,
        }
    }
}

impl Default for ControllerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} MPos[{}] WPos[{}] ({})",
            self.state, self.machine_coordinate, self.work_coordinate, self.units
        )
    }
}

/// Stream controller state machine
///
/// `Idle -> Sending <-> Paused -> Idle`, with `Alarm` reachable from any
/// state on a fatal firmware or link error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamState {
    /// No job is being streamed
    #[default]
    Idle,
    /// A job is being streamed
    Sending,
    /// Streaming suspended; in-flight commands still drain
    Paused,
    /// Stream aborted by an alarm or protocol error
    Alarm,
}

impl StreamState {
    /// True while a stream session exists
    pub fn is_streaming(&self) -> bool {
        matches!(self, StreamState::Sending | StreamState::Paused)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Sending => write!(f, "Sending"),
            Self::Paused => write!(f, "Paused"),
            Self::Alarm => write!(f, "Alarm"),
        }
    }
}
