//! GRBL error and alarm code descriptions

/// Describe a GRBL `error:N` code
pub fn decode_error(code: u32) -> &'static str {
    match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid '$' system command",
        4 => "Negative value",
        5 => "Homing not enabled",
        6 => "Step pulse too short",
        7 => "EEPROM read failed",
        8 => "'$' command requires idle",
        9 => "G-code locked out during alarm or jog",
        10 => "Soft limits require homing",
        11 => "Line overflow",
        12 => "Step rate exceeded",
        13 => "Safety door open",
        14 => "Line length exceeded",
        15 => "Jog target exceeds travel",
        16 => "Invalid jog command",
        17 => "Laser mode requires PWM",
        20 => "Unsupported command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Command requires integer value",
        24 => "Two commands require axis words",
        25 => "Repeated word",
        26 => "No axis words",
        27 => "Invalid line number",
        28 => "Missing value word",
        29 => "Unsupported coordinate system",
        30 => "G53 requires G0 or G1",
        31 => "Unused axis words",
        32 => "Arc has no axis words in plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Arc missing offset word",
        36 => "Unused words",
        37 => "Tool length offset axis error",
        38 => "Tool number too large",
        _ => "Unknown error",
    }
}

/// Describe a GRBL `ALARM:N` code
pub fn decode_alarm(code: u32) -> &'static str {
    match code {
        1 => "Hard limit triggered",
        2 => "Soft limit exceeded",
        3 => "Reset while in motion",
        4 => "Probe fail: not in expected initial state",
        5 => "Probe fail: did not contact workpiece",
        6 => "Homing fail: reset during cycle",
        7 => "Homing fail: safety door opened",
        8 => "Homing fail: could not clear limit switch",
        9 => "Homing fail: limit switch not found",
        10 => "Homing fail: second limit switch not found",
        _ => "Unknown alarm",
    }
}
