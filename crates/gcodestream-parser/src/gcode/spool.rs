//! Disk-backed command store for very large jobs
//!
//! Format: a fixed-width header line `gsw_meta:<rows>` followed by one
//! record per row, `normalized␟original␟line␟comment`, where `␟` is the
//! ASCII unit separator. The header is rewritten in place when the writer
//! finishes, so the row count is known without scanning the file.

use gcodestream_core::GcodeError;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::command::EncodedCommand;
use super::store::CommandSource;

/// Header prefix of a spooled job
pub const META_PREFIX: &str = "gsw_meta:";

/// Field separator inside a record
pub const FIELD_SEPARATOR: char = '\u{1F}';

const ROW_COUNT_WIDTH: usize = 20;

fn spool_error(reason: impl std::fmt::Display) -> GcodeError {
    GcodeError::Spool {
        reason: reason.to_string(),
    }
}

fn header(rows: usize) -> String {
    format!("{}{:0width$}\n", META_PREFIX, rows, width = ROW_COUNT_WIDTH)
}

/// Appends commands to a spool file
pub struct SpoolWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl SpoolWriter {
    /// Create (or truncate) a spool at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self, GcodeError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| spool_error(format!("{}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(header(0).as_bytes())
            .map_err(spool_error)?;
        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    /// Create a uniquely named spool in the system temp directory
    pub fn create_temp() -> Result<Self, GcodeError> {
        let path = std::env::temp_dir().join(format!("gcodestream-{}.gsw", Uuid::new_v4()));
        Self::create(path)
    }

    /// Where the spool is written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append one row
    pub fn add_line(
        &mut self,
        command: &str,
        original: &str,
        line_number: u32,
        comment: &str,
    ) -> Result<(), GcodeError> {
        for (name, field) in [("command", command), ("original", original), ("comment", comment)] {
            if field.contains(FIELD_SEPARATOR) || field.contains('\n') || field.contains('\r') {
                return Err(spool_error(format!(
                    "{} at line {} contains a reserved character",
                    name, line_number
                )));
            }
        }

        writeln!(
            self.writer,
            "{}{sep}{}{sep}{}{sep}{}",
            command,
            original,
            line_number,
            comment,
            sep = FIELD_SEPARATOR
        )
        .map_err(spool_error)?;
        self.rows += 1;
        Ok(())
    }

    /// Append an encoded command
    pub fn add_command(&mut self, command: &EncodedCommand) -> Result<(), GcodeError> {
        self.add_line(
            &command.command,
            &command.original,
            command.line_number,
            &command.comment,
        )
    }

    /// Flush rows and record the final row count in the header
    pub fn finish(self) -> Result<PathBuf, GcodeError> {
        let rows = self.rows;
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| spool_error(e.error()))?;
        file.seek(SeekFrom::Start(0)).map_err(spool_error)?;
        file.write_all(header(rows).as_bytes()).map_err(spool_error)?;
        file.flush().map_err(spool_error)?;
        tracing::debug!("Spooled {} rows to {}", rows, self.path.display());
        Ok(self.path)
    }
}

/// Reads a spool file forward, one command per row
pub struct SpoolReader {
    path: PathBuf,
    reader: BufReader<File>,
    rows: usize,
    read: usize,
    delete_on_drop: bool,
    buffer: String,
}

impl SpoolReader {
    /// Open a finished spool
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GcodeError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| spool_error(format!("{}: {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);

        let mut first = String::new();
        reader.read_line(&mut first).map_err(spool_error)?;
        let rows = first
            .trim_end()
            .strip_prefix(META_PREFIX)
            .and_then(|count| count.trim().parse::<usize>().ok())
            .ok_or_else(|| spool_error(format!("{} has no spool header", path.display())))?;

        Ok(Self {
            path,
            reader,
            rows,
            read: 0,
            delete_on_drop: false,
            buffer: String::new(),
        })
    }

    /// Open a spool and delete the file when the reader is dropped
    pub fn open_temporary(path: impl AsRef<Path>) -> Result<Self, GcodeError> {
        let mut reader = Self::open(path)?;
        reader.delete_on_drop = true;
        Ok(reader)
    }

    /// Spool file location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CommandSource for SpoolReader {
    fn num_rows(&self) -> usize {
        self.rows
    }

    fn rows_remaining(&self) -> usize {
        self.rows - self.read
    }

    fn next_command(&mut self) -> Result<Option<EncodedCommand>, GcodeError> {
        if self.read >= self.rows {
            return Ok(None);
        }

        self.buffer.clear();
        let n = self.reader.read_line(&mut self.buffer).map_err(spool_error)?;
        if n == 0 {
            return Err(spool_error(format!(
                "truncated after {} of {} rows",
                self.read, self.rows
            )));
        }

        let record = self.buffer.trim_end_matches(['\n', '\r']);
        let mut fields = record.splitn(4, FIELD_SEPARATOR);
        let (Some(command), Some(original), Some(line), Some(comment)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(spool_error(format!("malformed row {}", self.read + 1)));
        };
        let line_number = line
            .parse::<u32>()
            .map_err(|_| spool_error(format!("bad line number '{}' in row {}", line, self.read + 1)))?;

        self.read += 1;
        Ok(Some(EncodedCommand::new(
            command,
            original,
            comment,
            line_number,
            self.read as u32,
        )))
    }
}

impl Drop for SpoolReader {
    fn drop(&mut self) {
        if self.delete_on_drop {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::debug!("Could not remove spool {}: {}", self.path.display(), e);
            }
        }
    }
}
