//! Job loading: raw lines to a command store

use gcodestream_core::{Error, GcodeError, Result};
use gcodestream_settings::FileProcessingSettings;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use super::command::{CommandCreator, EncodedCommand};
use super::parser::GcodeParser;
use super::segment::PointSegment;
use super::spool::{SpoolReader, SpoolWriter};
use super::store::{CommandSource, InMemoryStore};

/// A line that could not be parsed
#[derive(Debug, Clone, PartialEq)]
pub struct LineError {
    /// 1-based line number
    pub line_number: u32,
    /// Line as read
    pub text: String,
    /// What went wrong
    pub error: GcodeError,
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {} ({})", self.line_number, self.error, self.text)
    }
}

/// Which store a job is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// In memory until the spool threshold is crossed
    #[default]
    Auto,
    /// Always in memory
    InMemory,
    /// Always spooled to disk
    Spooled,
}

/// A loaded job ready to stream
pub struct LoadedJob {
    /// Commands in job order
    pub source: Box<dyn CommandSource>,
    /// Lines skipped because they failed to parse
    pub errors: Vec<LineError>,
    /// Spool file backing `source`, if any
    pub spool_path: Option<PathBuf>,
}

impl LoadedJob {
    /// Total rows in the job
    pub fn num_rows(&self) -> usize {
        self.source.num_rows()
    }

    /// True when the job was written to disk
    pub fn is_spooled(&self) -> bool {
        self.spool_path.is_some()
    }
}

impl std::fmt::Debug for LoadedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedJob")
            .field("rows", &self.source.num_rows())
            .field("errors", &self.errors.len())
            .field("spool_path", &self.spool_path)
            .finish()
    }
}

enum Sink {
    Memory(Vec<EncodedCommand>),
    Spool(SpoolWriter),
}

impl Sink {
    fn push(&mut self, command: EncodedCommand, spill_above: Option<usize>) -> Result<()> {
        match self {
            Sink::Memory(commands) => {
                commands.push(command);
                if let Some(limit) = spill_above.filter(|limit| commands.len() > *limit) {
                    let mut writer = SpoolWriter::create_temp()?;
                    for command in commands.iter() {
                        writer.add_command(command)?;
                    }
                    tracing::debug!(
                        "Job exceeded {} rows, spooling to {}",
                        limit,
                        writer.path().display()
                    );
                    *self = Sink::Spool(writer);
                }
            }
            Sink::Spool(writer) => writer.add_command(&command)?,
        }
        Ok(())
    }

    fn finish(self) -> Result<(Box<dyn CommandSource>, Option<PathBuf>)> {
        match self {
            Sink::Memory(commands) => Ok((Box::new(InMemoryStore::from(commands)), None)),
            Sink::Spool(writer) => {
                let path = writer.finish()?;
                let reader = SpoolReader::open_temporary(&path)?;
                Ok((Box::new(reader), Some(path)))
            }
        }
    }
}

/// Runs raw job lines through normalization and into a command store
#[derive(Debug, Clone, Default)]
pub struct JobLoader {
    settings: FileProcessingSettings,
}

impl JobLoader {
    /// Loader using `settings`; rejected before any line is read if invalid
    pub fn new(settings: FileProcessingSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Settings used for normalization
    pub fn settings(&self) -> &FileProcessingSettings {
        &self.settings
    }

    /// Load a job from text lines
    ///
    /// Malformed lines are collected in [`LoadedJob::errors`] and skipped,
    /// unless `strict` is set, in which case the first one aborts loading.
    pub fn load_lines<I, S>(&self, lines: I, kind: StoreKind) -> Result<LoadedJob>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.load(lines.into_iter().map(Ok), kind)
    }

    /// Load a job from a file
    pub fn load_file(&self, path: &Path, kind: StoreKind) -> Result<LoadedJob> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        tracing::info!("Loading job {}", path.display());
        self.load(reader.lines(), kind)
    }

    fn load<I, S>(&self, lines: I, kind: StoreKind) -> Result<LoadedJob>
    where
        I: Iterator<Item = std::io::Result<S>>,
        S: AsRef<str>,
    {
        let mut parser = GcodeParser::from_settings(&self.settings)?;
        let creator = CommandCreator::new();
        let mut errors = Vec::new();

        let (mut sink, spill_above) = match kind {
            StoreKind::Auto => (Sink::Memory(Vec::new()), Some(self.settings.spool_threshold_rows)),
            StoreKind::InMemory => (Sink::Memory(Vec::new()), None),
            StoreKind::Spooled => (Sink::Spool(SpoolWriter::create_temp()?), None),
        };

        for (index, line) in lines.enumerate() {
            let line = line?;
            let line = line.as_ref();
            let line_number = index as u32 + 1;

            match parser.add_command(line, line_number) {
                Ok(processed) => {
                    for command in creator.create_commands(&processed) {
                        sink.push(command, spill_above)?;
                    }
                }
                Err(error) if self.settings.strict => {
                    tracing::warn!("Aborting load at line {}: {}", line_number, error);
                    return Err(Error::Gcode(error));
                }
                Err(error) => {
                    tracing::warn!("Skipping line {}: {}", line_number, error);
                    errors.push(LineError {
                        line_number,
                        text: line.to_string(),
                        error,
                    });
                }
            }
        }

        let (source, spool_path) = sink.finish()?;
        tracing::info!(
            "Loaded {} rows ({}), {} line errors",
            source.num_rows(),
            if spool_path.is_some() { "spooled" } else { "in memory" },
            errors.len()
        );

        Ok(LoadedJob {
            source,
            errors,
            spool_path,
        })
    }

    /// Parse a job into its toolpath without building a command store
    pub fn toolpath<I, S>(&self, lines: I) -> Result<(Vec<PointSegment>, Vec<LineError>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parser = GcodeParser::from_settings(&self.settings)?;
        let mut segments = Vec::new();
        let mut errors = Vec::new();

        for (index, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            let line_number = index as u32 + 1;
            match parser.add_command(line, line_number) {
                Ok(processed) => segments.extend(processed.segments),
                Err(error) if self.settings.strict => return Err(Error::Gcode(error)),
                Err(error) => errors.push(LineError {
                    line_number,
                    text: line.to_string(),
                    error,
                }),
            }
        }

        Ok((segments, errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: [&str; 5] = ["G21 G90", "(start)", "G1 X10 F500", "G2 X0 Y0 R2", "G1 Y5"];

    #[test]
    fn test_bad_lines_collected() {
        let loader = JobLoader::default();
        let mut job = loader.load_lines(JOB, StoreKind::InMemory).unwrap();

        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.errors[0].line_number, 4);
        // "(start)" survives as a comment-only row.
        assert_eq!(job.num_rows(), 4);

        let first = job.source.next_command().unwrap().unwrap();
        assert_eq!(first.command, "G21 G90");
        assert_eq!(first.sequence_number, 1);
        let comment = job.source.next_command().unwrap().unwrap();
        assert!(comment.is_empty());
        assert_eq!(comment.comment, "start");
    }

    #[test]
    fn test_strict_aborts() {
        let settings = FileProcessingSettings {
            strict: true,
            ..FileProcessingSettings::default()
        };
        let loader = JobLoader::new(settings).unwrap();
        let err = loader.load_lines(JOB, StoreKind::InMemory).unwrap_err();
        assert!(err.is_gcode_error());
    }

    #[test]
    fn test_auto_spills_past_threshold() {
        let settings = FileProcessingSettings {
            spool_threshold_rows: 2,
            ..FileProcessingSettings::default()
        };
        let loader = JobLoader::new(settings).unwrap();
        let lines = ["G1 X1", "G1 X2", "G1 X3"];

        let mut job = loader.load_lines(lines, StoreKind::Auto).unwrap();
        assert!(job.is_spooled());
        assert_eq!(job.num_rows(), 3);
        let mut texts = Vec::new();
        while let Some(cmd) = job.source.next_command().unwrap() {
            texts.push(cmd.command);
        }
        assert_eq!(texts, lines);

        let job = loader.load_lines(&lines[..2], StoreKind::Auto).unwrap();
        assert!(!job.is_spooled());
    }

    #[test]
    fn test_toolpath() {
        let (segments, errors) = JobLoader::default().toolpath(JOB).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].sequence_number, 2);
    }
}
