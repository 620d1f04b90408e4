//! Toolpath segments produced by the motion parser

use gcodestream_core::{Point3D, Units};
use serde::{Deserialize, Serialize};

/// Arc geometry attached to a G2/G3 segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcProperties {
    /// Arc center
    pub center: Point3D,
    /// Arc radius (always positive)
    pub radius: f64,
    /// G2 when true, G3 otherwise
    pub clockwise: bool,
}

/// One motion of the toolpath
///
/// Sequence numbers are gapless within a job; `0` is the implicit origin
/// and is never assigned to a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSegment {
    /// Where the motion ends
    pub endpoint: Point3D,
    /// Position in the toolpath, starting at 1
    pub sequence_number: u32,
    /// Arc geometry for G2/G3 motions
    pub arc: Option<ArcProperties>,
    /// Rapid (G0) rather than feed motion
    pub is_fast_traverse: bool,
    /// X and Y unchanged while Z moves
    pub is_z_only_move: bool,
    /// Units the endpoint is expressed in
    pub units: Units,
    /// Modal feed rate in effect for the motion
    pub feed_rate: Option<f64>,
    /// Source line, when known
    pub line_number: Option<u32>,
}

impl PointSegment {
    /// A straight line (G0/G1) segment
    pub fn line(endpoint: Point3D, sequence_number: u32, units: Units) -> Self {
        Self {
            endpoint,
            sequence_number,
            arc: None,
            is_fast_traverse: false,
            is_z_only_move: false,
            units,
            feed_rate: None,
            line_number: None,
        }
    }

    /// An arc (G2/G3) segment
    pub fn arc(endpoint: Point3D, sequence_number: u32, units: Units, arc: ArcProperties) -> Self {
        Self {
            arc: Some(arc),
            ..Self::line(endpoint, sequence_number, units)
        }
    }

    /// True for G2/G3 segments
    pub fn is_arc(&self) -> bool {
        self.arc.is_some()
    }

    /// Arc center, when this is an arc
    pub fn arc_center(&self) -> Option<Point3D> {
        self.arc.map(|a| a.center)
    }

    /// Arc radius, when this is an arc
    pub fn radius(&self) -> Option<f64> {
        self.arc.map(|a| a.radius)
    }

    /// Arc direction, when this is an arc
    pub fn clockwise(&self) -> Option<bool> {
        self.arc.map(|a| a.clockwise)
    }
}

impl std::fmt::Display for PointSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match (&self.arc, self.is_fast_traverse) {
            (Some(arc), _) if arc.clockwise => "G2",
            (Some(_), _) => "G3",
            (None, true) => "G0",
            (None, false) => "G1",
        };
        write!(f, "#{} {} {}", self.sequence_number, kind, self.endpoint)
    }
}
