//! GRBL response classification
//!
//! Parses acknowledgements, `error:N`, `ALARM:N`, status reports and the
//! startup banner. Older firmware sends textual errors (`error: Bad number
//! format`) and alarms (`ALARM: Hard/soft limit`); both forms are accepted.

use super::error_decoder::{decode_alarm, decode_error};
use super::status_parser::parse_status_report;
use crate::firmware::Response;

/// Classify one line received from GRBL
pub fn parse_response(line: &str) -> Option<Response> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.eq_ignore_ascii_case("ok") {
        return Some(Response::Ack);
    }

    if let Some(rest) = strip_prefix_ignore_case(line, "error:") {
        let rest = rest.trim();
        return Some(match rest.parse::<u32>() {
            Ok(code) => Response::Error {
                code: Some(code),
                message: decode_error(code).to_string(),
            },
            Err(_) => Response::Error {
                code: None,
                message: rest.to_string(),
            },
        });
    }

    if let Some(rest) = strip_prefix_ignore_case(line, "alarm:") {
        let rest = rest.trim();
        return Some(match rest.parse::<u32>() {
            Ok(code) => Response::Alarm {
                code,
                message: decode_alarm(code).to_string(),
            },
            Err(_) => Response::Alarm {
                code: 0,
                message: rest.to_string(),
            },
        });
    }

    if line.starts_with('<') {
        return match parse_status_report(line) {
            Some(report) => Some(Response::Status(report)),
            None => {
                tracing::debug!("Unparseable status report: {}", line);
                Some(Response::Message(line.to_string()))
            }
        };
    }

    if line.starts_with("Grbl ") {
        return Some(Response::Welcome(line.to_string()));
    }

    Some(Response::Message(line.to_string()))
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}
