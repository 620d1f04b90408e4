//! # gcodestream
//!
//! ```bash
//! # Report malformed lines
//! gcodestream check part.nc
//!
//! # Write the normalized job
//! gcodestream preprocess part.nc part.out.nc --spool
//!
//! # Estimate run time from the toolpath
//! gcodestream estimate part.nc
//!
//! # Stream to a controller
//! gcodestream stream part.nc --port /dev/ttyUSB0
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gcodestream::{
    init_logging, list_ports, Config, ConnectionParams, IoThreads, JobEstimator, JobLoader,
    LoadedJob, SerialCommunicator, StoreKind, StreamController, StreamEvent, BUILD_DATE, VERSION,
};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// G-code streaming for GRBL-class CNC controllers
#[derive(Parser, Debug)]
#[command(name = "gcodestream")]
#[command(version)]
#[command(about = "G-code streaming and machine state synchronization")]
struct Args {
    /// Configuration file (.toml or .json); defaults to the user config dir
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a job and report every malformed line
    Check {
        file: PathBuf,
    },
    /// Write the normalized job, one command per line
    Preprocess {
        input: PathBuf,
        output: PathBuf,
        /// Stage the job on disk instead of in memory
        #[arg(long)]
        spool: bool,
    },
    /// Estimate run time from the toolpath
    Estimate {
        file: PathBuf,
        /// Rapid traverse rate in mm/min
        #[arg(long, default_value_t = 3000.0)]
        rapid_rate: f64,
    },
    /// List serial ports that look like CNC controllers
    Ports,
    /// Stream a job to a controller
    Stream {
        file: PathBuf,
        /// Serial port, overriding the configured one
        #[arg(short, long)]
        port: Option<String>,
        /// Baud rate, overriding the configured one
        #[arg(short, long)]
        baud: Option<u32>,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging()?;
    tracing::debug!("gcodestream {} built {}", VERSION, BUILD_DATE);

    let config = load_config(args.config.as_deref())?;
    let loader = JobLoader::new(config.file_processing.clone())
        .context("invalid file processing settings")?;

    match args.command {
        Command::Check { file } => check(&loader, &file),
        Command::Preprocess {
            input,
            output,
            spool,
        } => preprocess(&loader, &input, &output, spool),
        Command::Estimate { file, rapid_rate } => estimate(&loader, &file, rapid_rate),
        Command::Ports => ports(),
        Command::Stream { file, port, baud } => {
            let mut params = ConnectionParams::from(&config.connection);
            if let Some(port) = port {
                params.port = port;
            }
            if let Some(baud) = baud {
                params.baud_rate = baud;
            }
            stream(&config, &loader, &file, &params)
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = path {
        return Config::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }

    match Config::default_path() {
        Ok(path) if path.exists() => Config::load_from_file(&path)
            .with_context(|| format!("failed to load config {}", path.display())),
        _ => Ok(Config::default()),
    }
}

fn load(loader: &JobLoader, file: &Path, kind: StoreKind) -> anyhow::Result<LoadedJob> {
    loader
        .load_file(file, kind)
        .with_context(|| format!("failed to load {}", file.display()))
}

fn check(loader: &JobLoader, file: &Path) -> anyhow::Result<()> {
    let job = load(loader, file, StoreKind::Auto)?;
    for error in &job.errors {
        println!("{}:{}: {}", file.display(), error.line_number, error.error);
    }
    println!(
        "{}: {} rows, {} errors",
        file.display(),
        job.num_rows(),
        job.errors.len()
    );

    if !job.errors.is_empty() {
        bail!("{} malformed lines", job.errors.len());
    }
    Ok(())
}

fn preprocess(loader: &JobLoader, input: &Path, output: &Path, spool: bool) -> anyhow::Result<()> {
    let kind = if spool {
        StoreKind::Spooled
    } else {
        StoreKind::Auto
    };
    let mut job = load(loader, input, kind)?;
    for error in &job.errors {
        tracing::warn!("Dropped line {}: {}", error.line_number, error.error);
    }

    let file = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;
    while let Some(command) = job.source.next_command()? {
        if command.is_empty() {
            continue;
        }
        writeln!(writer, "{}", command.command)?;
        written += 1;
    }
    writer.flush()?;

    println!("{} -> {}: {} commands", input.display(), output.display(), written);
    Ok(())
}

fn estimate(loader: &JobLoader, file: &Path, rapid_rate: f64) -> anyhow::Result<()> {
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("failed to open {}", file.display()))?,
    );
    let lines = reader.lines().collect::<std::io::Result<Vec<String>>>()?;
    let (segments, errors) = loader.toolpath(&lines)?;
    if !errors.is_empty() {
        tracing::warn!("{} lines skipped while estimating", errors.len());
    }

    let count = segments.len();
    let duration = JobEstimator::spawn(segments, rapid_rate)
        .wait()
        .context("estimate was not produced")?;
    println!(
        "{}: {} segments, {}",
        file.display(),
        count,
        format_duration(duration)
    );
    Ok(())
}

fn ports() -> anyhow::Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}\t{}", port.port_name, port.description);
    }
    Ok(())
}

fn stream(
    config: &Config,
    loader: &JobLoader,
    file: &Path,
    params: &ConnectionParams,
) -> anyhow::Result<()> {
    let job = load(loader, file, StoreKind::Auto)?;
    if !job.errors.is_empty() {
        bail!(
            "{} malformed lines, run `gcodestream check` for details",
            job.errors.len()
        );
    }
    let rows = job.num_rows();

    let controller = Arc::new(StreamController::new(
        Box::new(SerialCommunicator::new()),
        config.stream.clone(),
    )?);
    controller
        .connect(params)
        .with_context(|| format!("failed to open {}", params.port))?;

    let reader = BufReader::new(File::open(file)?);
    let lines = reader.lines().collect::<std::io::Result<Vec<String>>>()?;
    let (segments, _) = loader.toolpath(&lines)?;
    controller.set_estimator(JobEstimator::spawn(segments, 3000.0));

    let mut events = controller.subscribe();
    let threads = IoThreads::spawn(&controller)?;
    controller.load_job(job.source)?;
    controller.send()?;

    let mut success = false;
    loop {
        match events.blocking_recv() {
            Ok(StreamEvent::CommandComplete {
                command,
                error: Some(error),
                ..
            }) => println!("{}: {}", command, error),
            Ok(StreamEvent::CommentSeen(comment)) => println!("({})", comment),
            Ok(StreamEvent::Alarm { code, message }) => println!("ALARM:{} {}", code, message),
            Ok(StreamEvent::StreamComplete {
                success: ok,
                duration_ms,
            }) => {
                success = ok;
                println!(
                    "{} of {} rows in {}",
                    controller.rows_completed(),
                    rows,
                    format_duration(Duration::from_millis(duration_ms))
                );
                break;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    threads.shutdown();
    controller.disconnect()?;

    if !success {
        bail!("stream failed with {} errors", controller.error_count());
    }
    Ok(())
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
