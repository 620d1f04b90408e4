//! GRBL status report parsing
//!
//! Handles both report layouts:
//! - 1.1: `<Idle|MPos:0.000,0.000,0.000|FS:0,0|WCO:0.000,0.000,0.000>`
//! - 0.9 and Smoothieware: `<Idle,MPos:0.000,0.000,0.000,WPos:0.000,0.000,0.000>`

use crate::firmware::{BufferState, StatusReport};
use gcodestream_core::Point3D;

/// Parse a `<...>` status report
///
/// Returns `None` when the line is not a status report or a position field
/// is malformed.
pub fn parse_status_report(line: &str) -> Option<StatusReport> {
    let body = line.trim().strip_prefix('<')?.strip_suffix('>')?;
    let fields = split_fields(body);
    let (state, fields) = fields.split_first()?;
    if state.is_empty() {
        return None;
    }

    let mut report = StatusReport {
        state: state.clone(),
        ..StatusReport::default()
    };

    for field in fields {
        let Some((name, value)) = field.split_once(':') else {
            continue;
        };
        match name {
            "MPos" => report.machine_position = Some(parse_point(value)?),
            "WPos" => report.work_position = Some(parse_point(value)?),
            "WCO" => report.work_coordinate_offset = Some(parse_point(value)?),
            "FS" => {
                let mut parts = value.split(',');
                report.feed_rate = parts.next().and_then(|v| v.trim().parse().ok());
                report.spindle_speed = parts.next().and_then(|v| v.trim().parse().ok());
            }
            "F" => report.feed_rate = value.trim().parse().ok(),
            "Bf" | "Buf" => report.buffer = parse_buffer(value),
            _ => {}
        }
    }

    Some(report)
}

/// Split a report body into `name:value` fields
///
/// In the comma layout, values themselves contain commas, so a token
/// without a colon continues the previous field.
fn split_fields(body: &str) -> Vec<String> {
    if body.contains('|') {
        return body.split('|').map(|f| f.trim().to_string()).collect();
    }

    let mut fields: Vec<String> = Vec::new();
    for (index, token) in body.split(',').enumerate() {
        let token = token.trim();
        match fields.last_mut() {
            Some(last) if index > 1 && !token.contains(':') => {
                last.push(',');
                last.push_str(token);
            }
            _ => fields.push(token.to_string()),
        }
    }
    fields
}

fn parse_point(value: &str) -> Option<Point3D> {
    let coords = value
        .split(',')
        .map(|v| v.trim().parse::<f64>().ok())
        .collect::<Option<Vec<f64>>>()?;
    match coords.as_slice() {
        [x, y, z, ..] => Some(Point3D::new(*x, *y, *z)),
        _ => None,
    }
}

fn parse_buffer(value: &str) -> Option<BufferState> {
    let (planner, rx) = value.split_once(',')?;
    Some(BufferState {
        planner_blocks: planner.trim().parse().ok()?,
        rx_bytes: rx.trim().parse().ok()?,
    })
}
