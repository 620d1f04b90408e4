//! G-Code motion parser and modal state tracking
//!
//! [`parse_line`] is a pure step: it takes the parser state and one line's
//! words and returns the next state plus the segment the line produced.
//! [`GcodeParser`] is the per-job session that owns the state, runs the
//! normalization pipeline, and expands arcs.

use gcodestream_core::{ConfigError, GcodeError, Point3D, Units};
use gcodestream_settings::{ArcExpansionMode, FileProcessingSettings};
use serde::{Deserialize, Serialize};

use super::arc::{resolve_center, ArcExpander};
use super::pipeline::ProcessorPipeline;
use super::segment::{ArcProperties, PointSegment};
use super::tokenizer::{
    extract_word, format_decimal, has_axis_words, parse_codes, parse_comment, parse_coord,
    remove_whitespace, split_command,
};

/// Absolute (G90) or relative (G91) interpretation of coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Positioning {
    /// Coordinates are positions
    #[default]
    Absolute,
    /// Coordinates are offsets from the current position
    Relative,
}

/// Motion group codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionCode {
    /// G0
    Rapid,
    /// G1
    Linear,
    /// G2
    ArcClockwise,
    /// G3
    ArcCounterClockwise,
}

impl MotionCode {
    /// Motion code for a normalized G number ("0".."3")
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(Self::Rapid),
            "1" => Some(Self::Linear),
            "2" => Some(Self::ArcClockwise),
            "3" => Some(Self::ArcCounterClockwise),
            _ => None,
        }
    }

    /// G word for this motion
    pub fn gcode(self) -> &'static str {
        match self {
            Self::Rapid => "G0",
            Self::Linear => "G1",
            Self::ArcClockwise => "G2",
            Self::ArcCounterClockwise => "G3",
        }
    }

    /// True for G2/G3
    pub fn is_arc(self) -> bool {
        matches!(self, Self::ArcClockwise | Self::ArcCounterClockwise)
    }
}

/// Modal state carried from line to line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModalState {
    /// G20/G21
    pub units: Units,
    /// G90/G91
    pub positioning: Positioning,
    /// G90.1/G91.1: interpretation of I/J/K
    pub arc_offset_mode: Positioning,
    /// Motion reapplied by lines carrying only axis words
    pub last_motion: Option<MotionCode>,
    /// Last F word
    pub feed_rate: Option<f64>,
}

impl Default for ModalState {
    fn default() -> Self {
        Self {
            units: Units::MM,
            positioning: Positioning::Absolute,
            arc_offset_mode: Positioning::Relative,
            last_motion: None,
            feed_rate: None,
        }
    }
}

/// Modal state plus the current position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParserState {
    /// Modal groups
    pub modal: ModalState,
    /// Position after the last motion
    pub position: Point3D,
}

/// Result of parsing one command
#[derive(Debug, Clone, PartialEq)]
pub struct ParseStep {
    /// State after the command
    pub state: ParserState,
    /// Last segment the command produced
    pub segment: Option<PointSegment>,
    /// The segment came from a modal motion code, not one on the line
    pub implicit_motion: bool,
}

// Codes that take axis words without moving along them as a motion.
const NON_MOTION_AXIS_CODES: &[&str] = &[
    "10", "28", "28.1", "30", "30.1", "38.2", "38.3", "38.4", "38.5", "43.1", "92", "92.1",
];

fn checked_coord(words: &[String], letter: char) -> Result<Option<f64>, GcodeError> {
    match extract_word(words, letter) {
        None => Ok(None),
        Some(word) => match parse_coord(words, letter) {
            Some(value) if value.is_finite() => Ok(Some(value)),
            _ => Err(GcodeError::InvalidParameter {
                line_number: 0,
                param: letter.to_ascii_uppercase().to_string(),
                reason: format!("'{}' is not a number", word),
            }),
        },
    }
}

/// Apply X/Y/Z words to `initial` per the positioning mode
pub fn update_point_with_command(
    words: &[String],
    initial: Point3D,
    positioning: Positioning,
) -> Result<Point3D, GcodeError> {
    let apply = |current: f64, value: Option<f64>| match (value, positioning) {
        (Some(v), Positioning::Absolute) => v,
        (Some(v), Positioning::Relative) => current + v,
        (None, _) => current,
    };

    Ok(Point3D::new(
        apply(initial.x, checked_coord(words, 'X')?),
        apply(initial.y, checked_coord(words, 'Y')?),
        apply(initial.z, checked_coord(words, 'Z')?),
    ))
}

/// Parse one command's words against `state`
///
/// G codes are applied in the order they appear; when a line carries more
/// than one motion only the last segment is returned. A line with axis
/// words and no motion code reuses the modal motion. `sequence_number` is
/// assigned to the returned segment.
pub fn parse_line(
    state: &ParserState,
    words: &[String],
    sequence_number: u32,
) -> Result<ParseStep, GcodeError> {
    let mut modal = state.modal;
    let mut position = state.position;
    let mut segment = None;

    if let Some(feed) = checked_coord(words, 'F')? {
        modal.feed_rate = Some(feed);
    }

    let mut codes = parse_codes(words, 'G');
    let has_motion = codes.iter().any(|c| MotionCode::from_code(c).is_some());
    let non_motion_axes = codes
        .iter()
        .any(|c| NON_MOTION_AXIS_CODES.contains(&c.as_str()));
    let mut implicit_motion = false;
    if !has_motion && !non_motion_axes && has_axis_words(words) {
        if let Some(motion) = modal.last_motion {
            codes.push(motion.gcode()[1..].to_string());
            implicit_motion = true;
        }
    }

    for code in &codes {
        match code.as_str() {
            "20" => modal.units = Units::INCH,
            "21" => modal.units = Units::MM,
            "90" => modal.positioning = Positioning::Absolute,
            "91" => modal.positioning = Positioning::Relative,
            "90.1" => modal.arc_offset_mode = Positioning::Absolute,
            "91.1" => modal.arc_offset_mode = Positioning::Relative,
            other => {
                let Some(motion) = MotionCode::from_code(other) else {
                    continue;
                };
                let next = update_point_with_command(words, position, modal.positioning)?;
                let mut created = if motion.is_arc() {
                    let clockwise = motion == MotionCode::ArcClockwise;
                    let offsets = (
                        checked_coord(words, 'I')?,
                        checked_coord(words, 'J')?,
                        checked_coord(words, 'K')?,
                    );
                    let radius = checked_coord(words, 'R')?;
                    let center = resolve_center(
                        position,
                        next,
                        offsets,
                        radius,
                        modal.arc_offset_mode == Positioning::Absolute,
                        clockwise,
                    )
                    .map_err(|err| match err {
                        GcodeError::InvalidArc { reason, .. } => GcodeError::InvalidArc {
                            line_number: 0,
                            command: words.join(" "),
                            reason,
                        },
                        other => other,
                    })?;
                    let radius = match radius {
                        Some(r) => r.abs(),
                        None => position.distance_xy(&center),
                    };
                    PointSegment::arc(
                        next,
                        sequence_number,
                        modal.units,
                        ArcProperties {
                            center,
                            radius,
                            clockwise,
                        },
                    )
                } else {
                    let mut line = PointSegment::line(next, sequence_number, modal.units);
                    line.is_fast_traverse = motion == MotionCode::Rapid;
                    line.is_z_only_move =
                        next.x == position.x && next.y == position.y && next.z != position.z;
                    line
                };
                created.feed_rate = modal.feed_rate;

                position = next;
                modal.last_motion = Some(motion);
                segment = Some(created);
            }
        }
    }

    Ok(ParseStep {
        state: ParserState { modal, position },
        segment,
        implicit_motion,
    })
}

/// One source line after normalization and parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedLine {
    /// Line as read from the job
    pub original: String,
    /// 1-based line number in the job
    pub line_number: u32,
    /// First comment on the line, `""` when none
    pub comment: String,
    /// Commands to transmit; empty when the line is skipped
    pub normalized: Vec<String>,
    /// Segments produced, one per motion command sent
    pub segments: Vec<PointSegment>,
}

impl ProcessedLine {
    /// Representative segment of the line (the last one produced)
    pub fn segment(&self) -> Option<&PointSegment> {
        self.segments.last()
    }

    /// Nothing is transmitted for this line
    pub fn is_skipped(&self) -> bool {
        self.normalized.is_empty()
    }
}

/// Parsing session for one job
///
/// Created when a job is loaded; [`GcodeParser::reset`] starts over from
/// the origin with default modal state.
pub struct GcodeParser {
    state: ParserState,
    next_sequence: u32,
    pipeline: ProcessorPipeline,
    expander: Option<ArcExpander>,
    precision: usize,
    compact: bool,
    emitted_motion: Option<MotionCode>,
}

impl GcodeParser {
    /// Session with no normalization and native arcs
    pub fn new() -> Self {
        Self::with_pipeline(ProcessorPipeline::new())
    }

    /// Session using `pipeline` for normalization
    pub fn with_pipeline(pipeline: ProcessorPipeline) -> Self {
        Self {
            state: ParserState::default(),
            next_sequence: 1,
            pipeline,
            expander: None,
            precision: 4,
            compact: false,
            emitted_motion: None,
        }
    }

    /// Session configured from file processing settings
    pub fn from_settings(settings: &FileProcessingSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let mut parser = Self::with_pipeline(ProcessorPipeline::from_settings(settings)?);
        parser.expander = match settings.arc_expansion {
            ArcExpansionMode::Never => None,
            ArcExpansionMode::Always => Some(ArcExpander::new(settings.arc_segment_length)?),
            ArcExpansionMode::BelowThreshold => Some(ArcExpander::below_threshold(
                settings.arc_segment_length,
                settings.arc_length_threshold,
            )?),
        };
        parser.precision = settings.decimal_precision.unwrap_or(4);
        parser.compact = settings.remove_whitespace;
        Ok(parser)
    }

    /// Replace arcs with lines using `expander`
    pub fn set_arc_expander(&mut self, expander: Option<ArcExpander>) {
        self.expander = expander;
    }

    /// Current modal state and position
    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Position after the last parsed motion
    pub fn current_position(&self) -> Point3D {
        self.state.position
    }

    /// Sequence number the next segment will receive
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Start over at the origin with default modal state
    pub fn reset(&mut self) {
        self.state = ParserState::default();
        self.next_sequence = 1;
        self.emitted_motion = None;
    }

    /// Parse one command without normalization, returning its segment
    pub fn parse(&mut self, command: &str) -> Result<Option<PointSegment>, GcodeError> {
        let words = split_command(command);
        let step = parse_line(&self.state, &words, self.next_sequence)?;
        self.commit(&step);
        Ok(step.segment)
    }

    fn commit(&mut self, step: &ParseStep) {
        self.state = step.state;
        if let Some(segment) = &step.segment {
            self.next_sequence = segment.sequence_number + 1;
        }
        self.emitted_motion = step.state.modal.last_motion;
    }

    /// Normalize and parse one source line
    ///
    /// On error the session state is left untouched, so the caller may
    /// skip the line and continue.
    pub fn add_command(&mut self, line: &str, line_number: u32) -> Result<ProcessedLine, GcodeError> {
        let comment = parse_comment(line);
        let commands = self
            .pipeline
            .process(line, &self.state)
            .map_err(|e| e.at_line(line_number))?;

        let mut state = self.state;
        let mut sequence = self.next_sequence;
        let mut emitted_motion = self.emitted_motion;
        let mut normalized = Vec::with_capacity(commands.len());
        let mut segments = Vec::new();

        for command in commands {
            let words = split_command(&command);
            let step = parse_line(&state, &words, sequence).map_err(|e| e.at_line(line_number))?;

            let Some(mut segment) = step.segment else {
                state = step.state;
                normalized.push(command);
                continue;
            };
            segment.line_number = Some(line_number);

            let expanded = self
                .expander
                .as_ref()
                .and_then(|expander| expander.expand(state.position, &segment));

            match expanded {
                Some(lines) => {
                    normalized.extend(self.format_expansion(&words, &state, &step.state, &lines));
                    if let Some(last) = lines.last() {
                        sequence = last.sequence_number + 1;
                    }
                    segments.extend(lines);
                    emitted_motion = Some(MotionCode::Linear);
                }
                None => {
                    let motion = step.state.modal.last_motion;
                    if step.implicit_motion && emitted_motion != motion {
                        // The controller last saw a different motion mode.
                        let prefix = motion.map(MotionCode::gcode).unwrap_or_default();
                        normalized.push(self.join(&[prefix.to_string(), command]));
                    } else {
                        normalized.push(command);
                    }
                    sequence = segment.sequence_number + 1;
                    segments.push(segment);
                    emitted_motion = motion;
                }
            }
            state = step.state;
        }

        self.state = state;
        self.next_sequence = sequence;
        self.emitted_motion = emitted_motion;

        Ok(ProcessedLine {
            original: line.to_string(),
            line_number,
            comment,
            normalized,
            segments,
        })
    }

    fn join(&self, parts: &[String]) -> String {
        let joined = parts
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        if self.compact {
            remove_whitespace(&joined)
        } else {
            joined
        }
    }

    fn format_expansion(
        &self,
        words: &[String],
        before: &ParserState,
        after: &ParserState,
        lines: &[PointSegment],
    ) -> Vec<String> {
        let relative = after.modal.positioning == Positioning::Relative;

        // Words other than the motion itself go out with the first line.
        let carried: Vec<String> = words
            .iter()
            .filter(|w| {
                let letter = w.chars().next().map(|c| c.to_ascii_uppercase());
                match letter {
                    Some('X' | 'Y' | 'Z' | 'I' | 'J' | 'K' | 'R') => false,
                    Some('G') => MotionCode::from_code(&parse_codes(&[w.to_string()], 'G').concat())
                        .is_none(),
                    _ => true,
                }
            })
            .cloned()
            .collect();

        let mut out = Vec::with_capacity(lines.len());
        let mut previous = before.position;
        for (i, line) in lines.iter().enumerate() {
            let target = if relative {
                line.endpoint.subtract(previous)
            } else {
                line.endpoint
            };
            let mut parts = if i == 0 { carried.clone() } else { Vec::new() };
            parts.push("G1".to_string());
            parts.push(format!("X{}", format_decimal(target.x, self.precision)));
            parts.push(format!("Y{}", format_decimal(target.y, self.precision)));
            let z_moves = if relative {
                target.z != 0.0
            } else {
                line.endpoint.z != previous.z
            };
            if z_moves {
                parts.push(format!("Z{}", format_decimal(target.z, self.precision)));
            }
            out.push(self.join(&parts));
            previous = line.endpoint;
        }
        out
    }
}

impl Default for GcodeParser {
    fn default() -> Self {
        Self::new()
    }
}
