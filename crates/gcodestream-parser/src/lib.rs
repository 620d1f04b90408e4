//! # GCodeStream Parser
//!
//! G-code tokenizing, motion parsing, arc expansion, normalization, and
//! job encoding for GCodeStream.

pub mod gcode;

pub use gcode::{
    calculate_sweep, convert_r_to_center, generate_points_along_arc, get_angle, parse_line,
    tokenizer, update_point_with_command, ArcExpander, ArcProperties, CommandCreator, CommandId,
    CommandLengthProcessor, CommandNumberGenerator, CommandProcessor, CommandSource, CommandState,
    CommentProcessor, DecimalProcessor, EncodedCommand, GcodeParser, InMemoryStore, JobLoader,
    LineError, LoadedJob, M30Processor, ModalState, MotionCode, ParseStep, ParserState,
    PatternRemover, PointSegment, Positioning, ProcessedLine, ProcessorHandle, ProcessorPipeline,
    SpoolReader, SpoolWriter, StoreKind, WhitespaceProcessor,
};
