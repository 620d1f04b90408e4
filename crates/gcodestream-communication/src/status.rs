//! Status reconciliation
//!
//! Two inputs feed the externally visible machine state: ordered command
//! completions and unordered status reports. Position and run-state come
//! only from status reports, last write wins. The one exception is units:
//! a completed G20/G21 changes how later reports are interpreted.

use crate::firmware::StatusReport;
use gcodestream_core::{ControllerState, ControllerStatus, Point3D, Units};
use gcodestream_parser::tokenizer::{parse_codes, split_command};

/// Builds [`ControllerStatus`] snapshots from firmware reports
#[derive(Debug, Clone, Default)]
pub struct StatusReconciler {
    status: ControllerStatus,
    units: Units,
    last_wco: Option<Point3D>,
}

impl StatusReconciler {
    /// Reconciler with no report applied yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot
    pub fn status(&self) -> &ControllerStatus {
        &self.status
    }

    /// Units reports are currently interpreted in
    pub fn units(&self) -> Units {
        self.units
    }

    /// Override the reporting units, e.g. after reading `$13`
    pub fn set_units(&mut self, units: Units) {
        self.units = units;
        self.status.units = units;
    }

    /// Apply a status report, replacing position and run-state
    ///
    /// When only one of machine/work position is reported, the other is
    /// derived from the most recent work coordinate offset.
    pub fn apply(&mut self, report: &StatusReport) -> &ControllerStatus {
        if let Some(wco) = report.work_coordinate_offset {
            self.last_wco = Some(wco);
        }
        let wco = self.last_wco.unwrap_or_default();

        let (machine, work) = match (report.machine_position, report.work_position) {
            (Some(m), Some(w)) => (m, w),
            (Some(m), None) => (m, m.subtract(wco)),
            (None, Some(w)) => (w.add(wco), w),
            (None, None) => (
                self.status.machine_coordinate,
                self.status.work_coordinate,
            ),
        };

        self.status = ControllerStatus {
            state: ControllerState::from_firmware_state(&report.state),
            state_string: report.state.clone(),
            machine_coordinate: machine,
            work_coordinate: work,
            work_coordinate_offset: self.last_wco,
            feed_rate: report.feed_rate.or(self.status.feed_rate),
            spindle_speed: report.spindle_speed.or(self.status.spindle_speed),
            units: self.units,
            timestamp: Some(chrono::Utc::now()),
        };
        &self.status
    }

    /// Note a completed command; returns the new units if it switched them
    pub fn command_completed(&mut self, command: &str) -> Option<Units> {
        let words = split_command(command);
        let units = parse_codes(&words, 'G')
            .iter()
            .filter_map(|code| match code.as_str() {
                "20" => Some(Units::INCH),
                "21" => Some(Units::MM),
                _ => None,
            })
            .last()?;

        if units == self.units {
            return None;
        }
        tracing::debug!("Reporting units changed to {}", units);
        self.set_units(units);
        Some(units)
    }

    /// Forget the machine state after the link went down
    pub fn disconnected(&mut self) {
        self.status.state = ControllerState::Disconnected;
        self.status.state_string.clear();
        self.last_wco = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: &str) -> StatusReport {
        StatusReport {
            state: state.to_string(),
            ..StatusReport::default()
        }
    }

    #[test]
    fn test_work_position_derived_from_offset() {
        let mut reconciler = StatusReconciler::new();
        reconciler.apply(&StatusReport {
            machine_position: Some(Point3D::new(10.0, 10.0, 0.0)),
            work_coordinate_offset: Some(Point3D::new(2.0, 3.0, 0.0)),
            ..report("Idle")
        });

        // The offset is sent only periodically; later reports reuse it.
        let status = reconciler.apply(&StatusReport {
            machine_position: Some(Point3D::new(12.0, 10.0, -1.0)),
            ..report("Run")
        });
        assert_eq!(status.state, ControllerState::Run);
        assert_eq!(status.work_coordinate, Point3D::new(10.0, 7.0, -1.0));
    }

    #[test]
    fn test_machine_position_derived_from_work() {
        let mut reconciler = StatusReconciler::new();
        let status = reconciler.apply(&StatusReport {
            work_position: Some(Point3D::new(1.0, 1.0, 1.0)),
            work_coordinate_offset: Some(Point3D::new(5.0, 0.0, 0.0)),
            ..report("Idle")
        });
        assert_eq!(status.machine_coordinate, Point3D::new(6.0, 1.0, 1.0));
    }

    #[test]
    fn test_last_report_wins() {
        let mut reconciler = StatusReconciler::new();
        reconciler.apply(&StatusReport {
            machine_position: Some(Point3D::new(1.0, 0.0, 0.0)),
            ..report("Run")
        });
        let status = reconciler.apply(&StatusReport {
            machine_position: Some(Point3D::new(0.5, 0.0, 0.0)),
            ..report("Hold:0")
        });
        assert_eq!(status.machine_coordinate.x, 0.5);
        assert_eq!(status.state, ControllerState::Hold);
        assert_eq!(status.state_string, "Hold:0");
    }

    #[test]
    fn test_unit_change_from_completed_command() {
        let mut reconciler = StatusReconciler::new();
        assert_eq!(reconciler.command_completed("G1 X10"), None);
        assert_eq!(reconciler.command_completed("G20 G90"), Some(Units::INCH));
        assert_eq!(reconciler.command_completed("G20"), None);

        let status = reconciler.apply(&report("Idle"));
        assert_eq!(status.units, Units::INCH);
        assert_eq!(reconciler.command_completed("G21"), Some(Units::MM));
    }
}
