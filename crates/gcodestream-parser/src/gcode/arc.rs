//! Arc geometry and arc-to-line expansion
//!
//! Center reconstruction from R words, quadrant-aware angles, direction
//! respecting sweeps, and interpolation of an arc into short lines.

use gcodestream_core::{ConfigError, GcodeError, Point3D};
use std::f64::consts::PI;

use super::segment::{ArcProperties, PointSegment};

const TWO_PI: f64 = 2.0 * PI;

/// Center of an arc given by its radius
///
/// A negative radius selects the major arc. Fails when the endpoints are
/// further apart than the diameter allows.
pub fn convert_r_to_center(
    start: Point3D,
    end: Point3D,
    radius: f64,
    clockwise: bool,
) -> Result<Point3D, GcodeError> {
    let x = end.x - start.x;
    let y = end.y - start.y;

    let discriminant = 4.0 * radius * radius - x * x - y * y;
    if discriminant < 0.0 {
        return Err(GcodeError::InvalidArc {
            line_number: 0,
            command: String::new(),
            reason: format!(
                "radius {} cannot span {:.4} between endpoints",
                radius,
                x.hypot(y)
            ),
        });
    }

    let chord = x.hypot(y);
    if chord == 0.0 {
        return Err(GcodeError::InvalidArc {
            line_number: 0,
            command: String::new(),
            reason: "radius arc with identical start and end point".to_string(),
        });
    }

    let mut h_x2_div_d = -discriminant.sqrt() / chord;
    if !clockwise {
        h_x2_div_d = -h_x2_div_d;
    }
    if radius < 0.0 {
        h_x2_div_d = -h_x2_div_d;
    }

    Ok(Point3D::new(
        start.x + 0.5 * (x - y * h_x2_div_d),
        start.y + 0.5 * (y + x * h_x2_div_d),
        start.z,
    ))
}

/// Resolve the arc center from I/J/K offsets or an R word
///
/// `offsets` holds the I/J/K values present on the line. In incremental
/// arc-offset mode they are relative to `start`; in absolute mode they are
/// the center itself.
pub fn resolve_center(
    start: Point3D,
    end: Point3D,
    offsets: (Option<f64>, Option<f64>, Option<f64>),
    radius: Option<f64>,
    absolute_offsets: bool,
    clockwise: bool,
) -> Result<Point3D, GcodeError> {
    let (i, j, k) = offsets;
    if i.is_some() || j.is_some() || k.is_some() {
        let base = if absolute_offsets {
            Point3D::origin()
        } else {
            start
        };
        return Ok(Point3D::new(
            base.x + i.unwrap_or(0.0),
            base.y + j.unwrap_or(0.0),
            base.z + k.unwrap_or(0.0),
        ));
    }

    match radius {
        Some(r) => convert_r_to_center(start, end, r, clockwise),
        None => Err(GcodeError::InvalidArc {
            line_number: 0,
            command: String::new(),
            reason: "arc has neither I/J/K offsets nor an R word".to_string(),
        }),
    }
}

/// Angle of `point` around `center` in `[0, 2π)`
pub fn get_angle(center: Point3D, point: Point3D) -> f64 {
    let delta_x = point.x - center.x;
    let delta_y = point.y - center.y;

    if delta_x != 0.0 {
        let angle = (delta_y / delta_x).atan().abs();
        if delta_x > 0.0 && delta_y >= 0.0 {
            angle
        } else if delta_x < 0.0 && delta_y >= 0.0 {
            PI - angle
        } else if delta_x < 0.0 {
            PI + angle
        } else {
            TWO_PI - angle
        }
    } else if delta_y > 0.0 {
        PI / 2.0
    } else {
        PI * 3.0 / 2.0
    }
}

/// Angular sweep from `start_angle` to `end_angle` in the commanded direction
///
/// Identical angles are a full circle. An end angle of exactly zero is
/// treated as 2π.
pub fn calculate_sweep(start_angle: f64, end_angle: f64, clockwise: bool) -> f64 {
    if start_angle == end_angle {
        return TWO_PI;
    }

    let end_angle = if end_angle == 0.0 { TWO_PI } else { end_angle };

    if !clockwise && end_angle < start_angle {
        (TWO_PI - start_angle) + end_angle
    } else if clockwise && end_angle > start_angle {
        (TWO_PI - end_angle) + start_angle
    } else {
        (end_angle - start_angle).abs()
    }
}

/// Sweep of an arc segment starting at `start`
pub fn arc_sweep(start: Point3D, end: Point3D, arc: &ArcProperties) -> f64 {
    let start_angle = get_angle(arc.center, start);
    let end_angle = get_angle(arc.center, end);
    calculate_sweep(start_angle, end_angle, arc.clockwise)
}

/// Points along an arc, first point at `start`, last point exactly `end`
///
/// Z is interpolated linearly for helical motion.
pub fn generate_points_along_arc(
    start: Point3D,
    end: Point3D,
    arc: &ArcProperties,
    num_points: usize,
) -> Vec<Point3D> {
    let num_points = num_points.max(1);
    let start_angle = get_angle(arc.center, start);
    let sweep = arc_sweep(start, end, arc);
    let z_increment = (end.z - start.z) / num_points as f64;

    let mut points = Vec::with_capacity(num_points + 1);
    for i in 0..num_points {
        let step = i as f64 * sweep / num_points as f64;
        let mut angle = if arc.clockwise {
            start_angle - step
        } else {
            start_angle + step
        };
        if angle >= TWO_PI {
            angle -= TWO_PI;
        }

        points.push(Point3D::new(
            arc.center.x + arc.radius * angle.cos(),
            arc.center.y + arc.radius * angle.sin(),
            start.z + z_increment * i as f64,
        ));
    }

    // The seam uses the commanded endpoint, not the last angle step.
    points.push(end);
    points
}

/// Replaces arcs with line segments
///
/// Either every arc is expanded, or only arcs whose length (in mm) is
/// at or below a threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcExpander {
    segment_length: f64,
    length_threshold: Option<f64>,
}

impl ArcExpander {
    /// Expand every arc into lines of at most `segment_length` mm
    pub fn new(segment_length: f64) -> Result<Self, ConfigError> {
        if segment_length <= 0.0 || !segment_length.is_finite() {
            return Err(ConfigError::invalid(
                "arc_segment_length",
                format!("must be > 0, got {}", segment_length),
            ));
        }
        Ok(Self {
            segment_length,
            length_threshold: None,
        })
    }

    /// Expand only arcs no longer than `threshold` mm
    pub fn below_threshold(segment_length: f64, threshold: f64) -> Result<Self, ConfigError> {
        let mut expander = Self::new(segment_length)?;
        if threshold < 0.0 || threshold.is_nan() {
            return Err(ConfigError::invalid(
                "arc_length_threshold",
                format!("must not be negative, got {}", threshold),
            ));
        }
        expander.length_threshold = Some(threshold);
        Ok(expander)
    }

    /// Configured segment length in mm
    pub fn segment_length(&self) -> f64 {
        self.segment_length
    }

    /// Arc length in millimeters regardless of the segment's units
    pub fn arc_length_mm(start: Point3D, segment: &PointSegment) -> Option<f64> {
        let arc = segment.arc.as_ref()?;
        let sweep = arc_sweep(start, segment.endpoint, arc);
        Some(sweep * arc.radius * segment.units.to_mm_factor())
    }

    /// Whether this arc is replaced by lines
    pub fn should_expand(&self, start: Point3D, segment: &PointSegment) -> bool {
        match Self::arc_length_mm(start, segment) {
            Some(length) => match self.length_threshold {
                Some(threshold) => length <= threshold,
                None => true,
            },
            None => false,
        }
    }

    /// Endpoints of the lines replacing `segment`, without the start point
    ///
    /// Returns `None` when the segment is not an arc or is kept native.
    pub fn expand_points(&self, start: Point3D, segment: &PointSegment) -> Option<Vec<Point3D>> {
        if !self.should_expand(start, segment) {
            return None;
        }
        let arc = segment.arc.as_ref()?;
        let length = Self::arc_length_mm(start, segment)?;
        let num_points = (length / self.segment_length).ceil().max(1.0) as usize;

        let mut points = generate_points_along_arc(start, segment.endpoint, arc, num_points);
        points.remove(0);
        Some(points)
    }

    /// Line segments replacing `segment`, numbered from its sequence number
    pub fn expand(&self, start: Point3D, segment: &PointSegment) -> Option<Vec<PointSegment>> {
        let points = self.expand_points(start, segment)?;
        Some(
            points
                .into_iter()
                .enumerate()
                .map(|(i, point)| PointSegment {
                    feed_rate: segment.feed_rate,
                    line_number: segment.line_number,
                    ..PointSegment::line(point, segment.sequence_number + i as u32, segment.units)
                })
                .collect(),
        )
    }
}
