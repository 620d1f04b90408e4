//! # GCodeStream Communication
//!
//! Buffer-aware streaming of encoded jobs to CNC firmware.
//! Provides the transport abstraction, firmware protocols (GRBL,
//! Smoothieware), the stream controller with its state machine, status
//! reconciliation, and the background job estimator.

pub mod communication;
pub mod controller;
pub mod estimator;
pub mod firmware;
pub mod status;

pub use communication::{
    list_ports, Communicator, ConnectionParams, NoOpCommunicator, SerialCommunicator,
    SerialParity, SerialPortInfo,
};
pub use controller::{linear_estimate, IoThreads, StreamController};
pub use estimator::{toolpath_duration_ms, JobEstimator, NOT_READY};
pub use firmware::{
    protocol_for, BufferState, FirmwareProtocol, FlowControl, GrblProtocol, Response,
    SmoothiewareProtocol, StatusReport,
};
pub use status::StatusReconciler;
