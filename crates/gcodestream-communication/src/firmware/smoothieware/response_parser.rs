//! Smoothieware response classification

use crate::firmware::grbl::parse_status_report;
use crate::firmware::Response;

/// Classify one line received from Smoothieware
pub fn parse_response(line: &str) -> Option<Response> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.eq_ignore_ascii_case("ok") {
        return Some(Response::Ack);
    }

    if let Some(message) = line
        .strip_prefix("Error:")
        .or_else(|| line.strip_prefix("error:"))
    {
        return Some(Response::Error {
            code: None,
            message: message.trim().to_string(),
        });
    }

    // "!!" is sent once the machine halts (limit hit, M112, kill button).
    if line.starts_with("!!") || line.starts_with("ALARM") {
        let message = line
            .trim_start_matches('!')
            .trim_start_matches("ALARM")
            .trim_start_matches(':')
            .trim();
        return Some(Response::Alarm {
            code: 0,
            message: if message.is_empty() {
                "Halted".to_string()
            } else {
                message.to_string()
            },
        });
    }

    if line.starts_with('<') {
        if let Some(report) = parse_status_report(line) {
            return Some(Response::Status(report));
        }
    }

    if line.starts_with("Smoothie") {
        return Some(Response::Welcome(line.to_string()));
    }

    Some(Response::Message(line.to_string()))
}
