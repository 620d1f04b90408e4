//! Buffer-aware stream controller
//!
//! Streams a loaded job to the firmware without overrunning its receive
//! buffer. Every transmitted command adds its cost to the outstanding load;
//! every acknowledgement removes the cost of the oldest in-flight command.
//! The transmit path waits on a condition variable signalled by the receive
//! path instead of polling.
//!
//! State machine:
//!
//! ```text
//! Idle --send--> Sending --pause--> Paused --resume--> Sending
//! Sending --cancel--> Idle        Sending --last ack--> Idle
//! any --alarm / overflow / link failure--> Alarm --soft_reset--> Idle
//! ```
//!
//! `cancel` is rejected while paused: commands already in the firmware
//! buffer cannot be taken back.

use crate::communication::{Communicator, ConnectionParams};
use crate::estimator::JobEstimator;
use crate::firmware::{protocol_for, FirmwareProtocol, Response};
use crate::status::StatusReconciler;
use gcodestream_core::{
    ConfigError, ControllerError, ControllerStatus, Error, EventDispatcher, GcodeError, Result,
    StreamEvent, StreamState, Units,
};
use gcodestream_parser::tokenizer::format_decimal;
use gcodestream_parser::{CommandCreator, CommandId, CommandSource, EncodedCommand};
use gcodestream_settings::StreamSettings;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Completed outcomes kept for [`StreamController::await_completion`]
const MAX_TRACKED_OUTCOMES: usize = 256;

/// Decimals used in generated jog commands
const JOG_PRECISION: usize = 4;

struct InFlight {
    command: EncodedCommand,
    cost: usize,
    /// Stream session the command belongs to, `None` for manual commands
    session: Option<u64>,
}

struct Session {
    id: u64,
    source: Box<dyn CommandSource>,
    next: Option<EncodedCommand>,
}

impl Session {
    fn exhausted(&self) -> bool {
        self.next.is_none() && self.source.rows_remaining() == 0
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    total_rows: usize,
    rows_sent: usize,
    rows_completed: usize,
    error_count: usize,
    started: Option<Instant>,
    finished: Option<Instant>,
}

impl Progress {
    fn elapsed(&self) -> Option<Duration> {
        self.started
            .map(|start| self.finished.unwrap_or_else(Instant::now).duration_since(start))
    }
}

#[derive(Clone, Copy)]
enum Pending {
    Manual,
    Job,
}

struct Inner {
    state: StreamState,
    loaded: Option<Box<dyn CommandSource>>,
    session: Option<Session>,
    sessions_started: u64,
    manual: VecDeque<EncodedCommand>,
    in_flight: VecDeque<InFlight>,
    outstanding: usize,
    single_step: bool,
    progress: Progress,
    status: StatusReconciler,
    watched: HashMap<CommandId, String>,
    outcomes: VecDeque<(CommandId, Option<String>)>,
    estimator: Option<JobEstimator>,
    receive_buffer: String,
}

impl Inner {
    fn new(single_step: bool) -> Self {
        Self {
            state: StreamState::Idle,
            loaded: None,
            session: None,
            sessions_started: 0,
            manual: VecDeque::new(),
            in_flight: VecDeque::new(),
            outstanding: 0,
            single_step,
            progress: Progress::default(),
            status: StatusReconciler::new(),
            watched: HashMap::new(),
            outcomes: VecDeque::new(),
            estimator: None,
            receive_buffer: String::new(),
        }
    }

    fn record_outcome(&mut self, id: CommandId, outcome: Option<String>) {
        self.outcomes.push_back((id, outcome));
        while self.outcomes.len() > MAX_TRACKED_OUTCOMES {
            self.outcomes.pop_front();
        }
    }

    fn take_outcome(&mut self, id: &str) -> Option<Option<String>> {
        let index = self.outcomes.iter().position(|(oid, _)| oid == id)?;
        self.outcomes.remove(index).map(|(_, outcome)| outcome)
    }

    /// Drop queued manual and in-flight commands, failing their waiters
    fn discard_pending(&mut self, reason: &str) {
        let dropped: Vec<EncodedCommand> = self
            .manual
            .drain(..)
            .chain(self.in_flight.drain(..).map(|flight| flight.command))
            .collect();
        self.outstanding = 0;
        for command in dropped {
            if self.watched.remove(&command.id).is_some() {
                self.record_outcome(command.id, Some(reason.to_string()));
            }
        }
    }
}

/// Linear duration estimate: `elapsed * total / sent`, `None` before the first row
pub fn linear_estimate(elapsed: Duration, total_rows: usize, rows_sent: usize) -> Option<Duration> {
    if rows_sent == 0 {
        return None;
    }
    Some(elapsed.mul_f64(total_rows as f64 / rows_sent as f64))
}

/// Streams jobs and manual commands to a controller
pub struct StreamController {
    inner: Mutex<Inner>,
    changed: Condvar,
    communicator: Mutex<Box<dyn Communicator>>,
    protocol: Box<dyn FirmwareProtocol>,
    events: EventDispatcher,
    settings: StreamSettings,
    manual_commands: CommandCreator,
}

impl StreamController {
    /// Controller for the firmware named in `settings`
    pub fn new(communicator: Box<dyn Communicator>, settings: StreamSettings) -> Result<Self> {
        settings.validate()?;
        let protocol = protocol_for(&settings);
        Self::with_protocol(communicator, protocol, settings)
    }

    /// Controller speaking an explicit protocol
    pub fn with_protocol(
        communicator: Box<dyn Communicator>,
        protocol: Box<dyn FirmwareProtocol>,
        settings: StreamSettings,
    ) -> Result<Self> {
        settings.validate()?;
        if protocol.buffer_capacity() == 0 {
            return Err(ConfigError::invalid("stream.buffer_capacity", "must be > 0").into());
        }

        Ok(Self {
            inner: Mutex::new(Inner::new(settings.single_step_mode)),
            changed: Condvar::new(),
            communicator: Mutex::new(communicator),
            events: EventDispatcher::new(settings.event_buffer_size),
            protocol,
            settings,
            manual_commands: CommandCreator::new(),
        })
    }

    /// Subscribe to stream events
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Event dispatcher used by this controller
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Firmware protocol in use
    pub fn protocol(&self) -> &dyn FirmwareProtocol {
        self.protocol.as_ref()
    }

    /// Streaming settings
    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    // ---- connection -------------------------------------------------------

    /// Open the transport
    pub fn connect(&self, params: &ConnectionParams) -> Result<()> {
        self.communicator.lock().connect(params)?;
        let mut inner = self.inner.lock();
        inner.discard_pending("connection reopened");
        inner.receive_buffer.clear();
        self.changed.notify_all();
        Ok(())
    }

    /// Close the transport; an active stream is aborted
    pub fn disconnect(&self) -> Result<()> {
        let result = self.communicator.lock().disconnect();
        let mut inner = self.inner.lock();
        if inner.state.is_streaming() {
            self.abort(&mut inner, "connection closed while streaming", None);
        } else {
            inner.discard_pending("disconnected");
        }
        inner.status.disconnected();
        inner.receive_buffer.clear();
        self.changed.notify_all();
        result
    }

    /// Check if the transport is open
    pub fn is_connected(&self) -> bool {
        self.communicator.lock().is_connected()
    }

    // ---- state ------------------------------------------------------------

    /// Current stream state
    pub fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    /// Latest reconciled machine status
    pub fn status(&self) -> ControllerStatus {
        self.inner.lock().status.status().clone()
    }

    /// Units status reports are interpreted in
    pub fn units(&self) -> Units {
        self.inner.lock().status.units()
    }

    /// Keep at most one command in flight
    pub fn set_single_step_mode(&self, enabled: bool) {
        self.inner.lock().single_step = enabled;
        self.changed.notify_all();
    }

    /// Check if single-step mode is on
    pub fn single_step_mode(&self) -> bool {
        self.inner.lock().single_step
    }

    fn set_state(&self, inner: &mut Inner, state: StreamState) {
        if inner.state != state {
            tracing::info!("Stream state {} -> {}", inner.state, state);
            inner.state = state;
            self.events.publish(StreamEvent::StreamStateChanged(state));
        }
    }

    // ---- job lifecycle ----------------------------------------------------

    /// Load the job the next [`send`](Self::send) streams
    pub fn load_job(&self, source: Box<dyn CommandSource>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state.is_streaming() {
            return Err(Error::not_in_state(inner.state, "load a job"));
        }
        tracing::info!("Job loaded: {} rows", source.num_rows());
        inner.loaded = Some(source);
        Ok(())
    }

    /// Check if a job is waiting to be sent
    pub fn has_job(&self) -> bool {
        self.inner.lock().loaded.is_some()
    }

    /// Start streaming the loaded job
    pub fn send(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(ControllerError::NotConnected.into());
        }

        let mut inner = self.inner.lock();
        if inner.state != StreamState::Idle {
            return Err(Error::not_in_state(inner.state, "send"));
        }
        let Some(source) = inner.loaded.take() else {
            return Err(Error::not_in_state("idle with no job loaded", "send"));
        };

        inner.sessions_started += 1;
        let id = inner.sessions_started;
        let total_rows = source.num_rows();
        inner.session = Some(Session {
            id,
            source,
            next: None,
        });
        inner.progress = Progress {
            total_rows,
            started: Some(Instant::now()),
            ..Progress::default()
        };
        tracing::info!("Streaming {} rows to {}", total_rows, self.protocol.name());
        self.set_state(&mut inner, StreamState::Sending);
        self.check_stream_complete(&mut inner);
        self.changed.notify_all();
        Ok(())
    }

    /// Stop taking commands from the job; in-flight commands still drain
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Sending {
            return Err(Error::not_in_state(inner.state, "pause"));
        }
        if let Some(byte) = self.protocol.feed_hold() {
            self.communicator.lock().send(&[byte])?;
        }
        self.set_state(&mut inner, StreamState::Paused);
        Ok(())
    }

    /// Continue a paused stream
    pub fn resume(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Paused {
            return Err(Error::not_in_state(inner.state, "resume"));
        }
        if let Some(byte) = self.protocol.cycle_start() {
            self.communicator.lock().send(&[byte])?;
        }
        self.set_state(&mut inner, StreamState::Sending);
        self.check_stream_complete(&mut inner);
        self.changed.notify_all();
        Ok(())
    }

    /// Abandon the job; only legal while actively sending
    pub fn cancel(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Sending {
            return Err(Error::not_in_state(inner.state, "cancel"));
        }

        inner.session = None;
        inner.progress.finished = Some(Instant::now());
        let progress = inner.progress;
        tracing::info!(
            "Stream cancelled after {} of {} rows",
            progress.rows_sent,
            progress.total_rows
        );
        self.set_state(&mut inner, StreamState::Idle);
        self.events.publish(StreamEvent::StreamComplete {
            success: false,
            duration_ms: millis(progress.elapsed()),
        });
        self.changed.notify_all();
        Ok(())
    }

    /// Reset the firmware and forget every queued or in-flight command
    pub fn soft_reset(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(byte) = self.protocol.soft_reset() {
            self.communicator.lock().send(&[byte])?;
        }

        let was_streaming = inner.state.is_streaming();
        inner.session = None;
        inner.discard_pending("soft reset");
        if was_streaming {
            inner.progress.finished = Some(Instant::now());
        }
        self.set_state(&mut inner, StreamState::Idle);
        if was_streaming {
            self.events.publish(StreamEvent::StreamComplete {
                success: false,
                duration_ms: millis(inner.progress.elapsed()),
            });
        }
        tracing::info!("Soft reset sent to {}", self.protocol.name());
        self.changed.notify_all();
        Ok(())
    }

    /// Ask the firmware for a status report
    pub fn request_status(&self) -> Result<()> {
        if let Some(byte) = self.protocol.status_query() {
            self.communicator.lock().send(&[byte])?;
        }
        Ok(())
    }

    /// Write the firmware's feed hold byte without changing stream state
    pub fn feed_hold(&self) -> Result<()> {
        if let Some(byte) = self.protocol.feed_hold() {
            self.communicator.lock().send(&[byte])?;
        }
        Ok(())
    }

    /// Write the firmware's cycle start byte without changing stream state
    pub fn cycle_start(&self) -> Result<()> {
        if let Some(byte) = self.protocol.cycle_start() {
            self.communicator.lock().send(&[byte])?;
        }
        Ok(())
    }

    // ---- manual commands --------------------------------------------------

    /// Queue a command ahead of the job stream
    ///
    /// Manual commands are not counted in job progress. The returned id can
    /// be passed to [`await_completion`](Self::await_completion).
    pub fn send_command_immediately(&self, command: &str) -> Result<CommandId> {
        if !self.is_connected() {
            return Err(ControllerError::NotConnected.into());
        }
        let command = self.manual_commands.create_manual(command);
        if command.is_empty() {
            return Err(ControllerError::CommandRejected {
                command: command.original,
                reason: "empty command".to_string(),
            }
            .into());
        }

        let id = command.id.clone();
        let mut inner = self.inner.lock();
        self.enqueue_manual(&mut inner, command);
        self.changed.notify_all();
        Ok(id)
    }

    /// Jog by a relative distance
    ///
    /// Emits `G91 <units> G1 ...` followed by `G90 <units>` restoring
    /// absolute positioning and the current reporting units before any
    /// further job command.
    pub fn jog(&self, dx: f64, dy: f64, dz: f64, feed_rate: f64, units: Units) -> Result<CommandId> {
        if !feed_rate.is_finite() || feed_rate <= 0.0 {
            return Err(GcodeError::InvalidParameter {
                line_number: 0,
                param: "F".to_string(),
                reason: format!("jog feed rate must be > 0, got {}", feed_rate),
            }
            .into());
        }

        let mut words = vec!["G91".to_string(), units.gcode().to_string(), "G1".to_string()];
        for (letter, distance) in [('X', dx), ('Y', dy), ('Z', dz)] {
            if !distance.is_finite() {
                return Err(GcodeError::InvalidParameter {
                    line_number: 0,
                    param: letter.to_string(),
                    reason: "not a finite number".to_string(),
                }
                .into());
            }
            if distance != 0.0 {
                words.push(format!("{}{}", letter, format_decimal(distance, JOG_PRECISION)));
            }
        }
        if words.len() == 3 {
            return Err(GcodeError::MissingParameter {
                line_number: 0,
                param: "X, Y or Z".to_string(),
            }
            .into());
        }
        words.push(format!("F{}", format_decimal(feed_rate, JOG_PRECISION)));

        if !self.is_connected() {
            return Err(ControllerError::NotConnected.into());
        }

        let mut inner = self.inner.lock();
        if matches!(inner.state, StreamState::Sending | StreamState::Alarm) {
            return Err(Error::not_in_state(inner.state, "jog"));
        }

        let mut jog = self.manual_commands.create_manual(&words.join(" "));
        jog.temporary_modal_change = true;
        let restore_text = format!("G90 {}", inner.status.units().gcode());
        let mut restore = self.manual_commands.create_manual(&restore_text);
        restore.temporary_modal_change = true;

        let id = jog.id.clone();
        tracing::debug!("Jog: {} then {}", jog.command, restore.command);
        self.enqueue_manual(&mut inner, jog);
        self.enqueue_manual(&mut inner, restore);
        self.changed.notify_all();
        Ok(id)
    }

    fn enqueue_manual(&self, inner: &mut Inner, command: EncodedCommand) {
        inner
            .watched
            .insert(command.id.clone(), command.command.clone());
        self.events.publish(StreamEvent::CommandQueued {
            sequence_number: command.sequence_number,
            command: command.command.clone(),
            manual: true,
        });
        inner.manual.push_back(command);
    }

    /// Wait for a command to be acknowledged
    ///
    /// Fails with [`ControllerError::Timeout`] once `timeout` elapses and with
    /// [`ControllerError::CommandRejected`] if the firmware answered with an
    /// error or the command was discarded.
    pub fn await_completion(&self, id: &str, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut inner = self.inner.lock();

        let known_text = inner
            .in_flight
            .iter()
            .map(|flight| &flight.command)
            .chain(inner.manual.iter())
            .find(|command| command.id == id)
            .map(|command| command.command.clone());
        let command = inner
            .watched
            .entry(id.to_string())
            .or_insert_with(|| known_text.unwrap_or_else(|| id.to_string()))
            .clone();

        loop {
            if let Some(outcome) = inner.take_outcome(id) {
                return match outcome {
                    None => Ok(()),
                    Some(reason) => Err(ControllerError::CommandRejected { command, reason }.into()),
                };
            }
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                if let Some(outcome) = inner.take_outcome(id) {
                    return match outcome {
                        None => Ok(()),
                        Some(reason) => {
                            Err(ControllerError::CommandRejected { command, reason }.into())
                        }
                    };
                }
                inner.watched.remove(id);
                let elapsed_ms = millis(Some(started.elapsed()));
                tracing::warn!("Timed out after {}ms waiting for '{}'", elapsed_ms, command);
                return Err(ControllerError::Timeout {
                    command,
                    elapsed_ms,
                }
                .into());
            }
        }
    }

    // ---- transmit path ----------------------------------------------------

    /// Send every command that fits in the firmware buffer right now
    pub fn transmit_ready(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        let mut sent = 0;
        while self.transmit_one(&mut inner)? {
            sent += 1;
        }
        Ok(sent)
    }

    /// Wait up to `timeout` for buffer room, then send one command
    ///
    /// Returns `false` if nothing could be sent before the deadline.
    pub fn transmit_next(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if self.transmit_one(&mut inner)? {
                return Ok(true);
            }
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return self.transmit_one(&mut inner);
            }
        }
    }

    fn transmit_one(&self, inner: &mut Inner) -> Result<bool> {
        if !self.communicator.lock().is_connected() {
            return Ok(false);
        }

        let pending = match self.peek_next(inner) {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                self.check_stream_complete(inner);
                return Ok(false);
            }
            Err(e) => {
                self.abort(inner, &format!("job source failed: {}", e), None);
                return Err(e.into());
            }
        };

        let next = match pending {
            Pending::Manual => inner.manual.front(),
            Pending::Job => inner.session.as_ref().and_then(|s| s.next.as_ref()),
        };
        let Some(next) = next else {
            return Ok(false);
        };

        let cost = self.protocol.command_cost(next);
        let capacity = self.protocol.buffer_capacity();
        if cost > capacity {
            let message = format!(
                "'{}' needs {} of {} buffer slots",
                next.command, cost, capacity
            );
            self.abort(inner, &message, None);
            return Err(ControllerError::BufferOverflow { message }.into());
        }
        if inner.single_step && !inner.in_flight.is_empty() {
            return Ok(false);
        }
        if inner.outstanding + cost > capacity {
            tracing::trace!(
                "Waiting for buffer room: {} + {} > {}",
                inner.outstanding,
                cost,
                capacity
            );
            return Ok(false);
        }

        let (command, session) = match pending {
            Pending::Manual => (inner.manual.pop_front(), None),
            Pending::Job => match inner.session.as_mut() {
                Some(session) => (session.next.take(), Some(session.id)),
                None => (None, None),
            },
        };
        let Some(mut command) = command else {
            return Ok(false);
        };

        let line = format!("{}\n", command.command);
        if let Err(e) = self.communicator.lock().send(line.as_bytes()) {
            self.abort(inner, &format!("write failed: {}", e), None);
            return Err(e);
        }

        command.mark_sent();
        inner.outstanding += cost;
        self.events.publish(StreamEvent::CommandSent {
            sequence_number: command.sequence_number,
            command: command.command.clone(),
            manual: session.is_none(),
        });
        if session.is_some() {
            inner.progress.rows_sent += 1;
            if !command.comment.is_empty() {
                self.events
                    .publish(StreamEvent::CommentSeen(command.comment.clone()));
            }
        }
        tracing::debug!(
            "Sent #{} '{}' ({}/{} buffer)",
            command.sequence_number,
            command.command,
            inner.outstanding,
            capacity
        );
        inner.in_flight.push_back(InFlight {
            command,
            cost,
            session,
        });
        Ok(true)
    }

    /// Decide where the next command comes from, pulling a job row if needed
    ///
    /// Comment-only rows are consumed here: they count as sent and completed
    /// and only publish their comment.
    fn peek_next(&self, inner: &mut Inner) -> std::result::Result<Option<Pending>, GcodeError> {
        if !inner.manual.is_empty() {
            return Ok(Some(Pending::Manual));
        }
        if inner.state != StreamState::Sending {
            return Ok(None);
        }

        let Inner {
            session, progress, ..
        } = inner;
        let Some(session) = session.as_mut() else {
            return Ok(None);
        };

        loop {
            if session.next.is_none() {
                let Some(command) = session.source.next_command()? else {
                    return Ok(None);
                };
                self.events.publish(StreamEvent::CommandQueued {
                    sequence_number: command.sequence_number,
                    command: command.command.clone(),
                    manual: false,
                });
                session.next = Some(command);
            }

            let Some(mut command) = session.next.take() else {
                return Ok(None);
            };
            if !command.is_empty() {
                session.next = Some(command);
                return Ok(Some(Pending::Job));
            }

            command.mark_skipped();
            progress.rows_sent += 1;
            progress.rows_completed += 1;
            if !command.comment.is_empty() {
                self.events.publish(StreamEvent::CommentSeen(command.comment));
            }
        }
    }

    fn check_stream_complete(&self, inner: &mut Inner) {
        if inner.state != StreamState::Sending {
            return;
        }
        let Some(session) = inner.session.as_ref() else {
            return;
        };
        if !session.exhausted() {
            return;
        }
        let id = session.id;
        if inner.in_flight.iter().any(|flight| flight.session == Some(id)) {
            return;
        }

        inner.session = None;
        inner.progress.finished = Some(Instant::now());
        let progress = inner.progress;
        let success = progress.error_count == 0;
        tracing::info!(
            "Stream finished in {:.1}s: {} rows, {} errors",
            progress.elapsed().unwrap_or_default().as_secs_f64(),
            progress.rows_completed,
            progress.error_count
        );
        self.set_state(inner, StreamState::Idle);
        self.events.publish(StreamEvent::StreamComplete {
            success,
            duration_ms: millis(progress.elapsed()),
        });
    }

    /// Fatal session error: unsent commands are dropped, counters kept
    fn abort(&self, inner: &mut Inner, reason: &str, alarm: Option<(u32, String)>) {
        let was_streaming = inner.state.is_streaming();
        tracing::error!("Stream aborted: {}", reason);

        inner.session = None;
        inner.discard_pending(reason);
        if let Some((code, message)) = alarm {
            self.events.publish(StreamEvent::Alarm { code, message });
        }
        if was_streaming {
            inner.progress.finished = Some(Instant::now());
        }
        self.set_state(inner, StreamState::Alarm);
        if was_streaming {
            self.events.publish(StreamEvent::StreamComplete {
                success: false,
                duration_ms: millis(inner.progress.elapsed()),
            });
        }
        self.changed.notify_all();
    }

    // ---- receive path -----------------------------------------------------

    /// Read whatever the firmware sent and handle every complete line
    ///
    /// Returns the number of lines handled. Partial lines are kept until
    /// their terminator arrives.
    pub fn poll_receive(&self) -> Result<usize> {
        let received = self.communicator.lock().receive();
        let bytes = match received {
            Ok(bytes) => bytes,
            Err(e) => {
                let mut inner = self.inner.lock();
                if inner.state.is_streaming() && e.is_connection_error() {
                    self.abort(&mut inner, &format!("read failed: {}", e), None);
                }
                return Err(e);
            }
        };
        if bytes.is_empty() {
            return Ok(0);
        }

        let mut inner = self.inner.lock();
        inner
            .receive_buffer
            .push_str(&String::from_utf8_lossy(&bytes));

        let mut handled = 0;
        let mut first_error = None;
        while let Some(end) = inner.receive_buffer.find('\n') {
            let line: String = inner.receive_buffer.drain(..=end).collect();
            if let Err(e) = self.dispatch(&mut inner, &line) {
                first_error.get_or_insert(e);
            }
            handled += 1;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(handled),
        }
    }

    /// Handle one line received from the firmware
    pub fn handle_line(&self, line: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        self.dispatch(&mut inner, line)
    }

    fn dispatch(&self, inner: &mut Inner, line: &str) -> Result<()> {
        let Some(response) = self.protocol.parse_response(line) else {
            return Ok(());
        };

        if self.protocol.is_overflow(&response) {
            let message = format!("firmware reported '{}'", line.trim());
            self.abort(inner, &message, None);
            return Err(ControllerError::BufferOverflow { message }.into());
        }

        match response {
            Response::Ack => self.complete_oldest(inner, None),
            Response::Error { code, message } => {
                let text = match code {
                    Some(code) => format!("error:{} ({})", code, message),
                    None => format!("error: {}", message),
                };
                tracing::warn!("Firmware rejected command: {}", text);
                self.complete_oldest(inner, Some(text))
            }
            Response::Alarm { code, message } => {
                tracing::error!("ALARM:{} {}", code, message);
                self.abort(
                    inner,
                    &format!("ALARM:{} {}", code, message),
                    Some((code, message.clone())),
                );
                Err(ControllerError::Alarm { code, message }.into())
            }
            Response::Status(report) => {
                let status = inner.status.apply(&report).clone();
                self.events.publish(StreamEvent::StatusChanged(status));
                Ok(())
            }
            Response::Welcome(banner) => {
                tracing::info!("Controller reset: {}", banner);
                if inner.state.is_streaming() {
                    self.abort(inner, "controller reset while streaming", None);
                } else {
                    inner.discard_pending("controller reset");
                }
                Ok(())
            }
            Response::Message(message) => {
                tracing::debug!("Firmware: {}", message);
                Ok(())
            }
        }
    }

    fn complete_oldest(&self, inner: &mut Inner, error: Option<String>) -> Result<()> {
        let Some(InFlight {
            mut command,
            cost,
            session,
        }) = inner.in_flight.pop_front()
        else {
            let message = "acknowledgement with nothing in flight".to_string();
            if inner.state.is_streaming() {
                self.abort(inner, &message, None);
            } else {
                tracing::warn!("{}", message);
            }
            return Err(ControllerError::UnexpectedCommand { message }.into());
        };

        inner.outstanding = inner.outstanding.saturating_sub(cost);
        match &error {
            None => {
                command.mark_done();
                inner.status.command_completed(&command.command);
            }
            Some(reason) => {
                command.mark_error(reason.clone());
            }
        }

        let current = inner.session.as_ref().map(|s| s.id);
        if session.is_some() && session == current {
            inner.progress.rows_completed += 1;
            if error.is_some() {
                inner.progress.error_count += 1;
            }
        }

        if inner.watched.remove(&command.id).is_some() {
            inner.record_outcome(command.id.clone(), error.clone());
        }

        tracing::trace!(
            "Completed #{} '{}' after {:?} ms",
            command.sequence_number,
            command.command,
            command.execution_duration()
        );
        self.events.publish(StreamEvent::CommandComplete {
            sequence_number: command.sequence_number,
            command: command.command,
            error,
            manual: session.is_none(),
        });
        self.check_stream_complete(inner);
        self.changed.notify_all();
        Ok(())
    }

    // ---- progress ---------------------------------------------------------

    /// Rows in the current or last job
    pub fn total_rows(&self) -> usize {
        self.inner.lock().progress.total_rows
    }

    /// Job rows written to the firmware (comment-only rows included)
    pub fn rows_sent(&self) -> usize {
        self.inner.lock().progress.rows_sent
    }

    /// Job rows acknowledged
    pub fn rows_completed(&self) -> usize {
        self.inner.lock().progress.rows_completed
    }

    /// Job rows not yet sent
    pub fn rows_remaining(&self) -> usize {
        let progress = self.inner.lock().progress;
        progress.total_rows.saturating_sub(progress.rows_sent)
    }

    /// Job rows the firmware answered with an error
    pub fn error_count(&self) -> usize {
        self.inner.lock().progress.error_count
    }

    /// Buffer slots currently occupied by in-flight commands
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// Commands sent but not yet acknowledged
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Time since the stream started, frozen once it ends
    pub fn send_duration(&self) -> Option<Duration> {
        self.inner.lock().progress.elapsed()
    }

    /// Use a toolpath estimate instead of the linear extrapolation
    pub fn set_estimator(&self, estimator: JobEstimator) {
        self.inner.lock().estimator = Some(estimator);
    }

    /// Estimated total stream duration
    ///
    /// The toolpath estimate once it is ready, otherwise a linear
    /// extrapolation from rows sent so far. `None` until the first row is
    /// sent.
    pub fn estimated_duration(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        if let Some(estimate) = inner.estimator.as_ref().and_then(JobEstimator::estimate) {
            return Some(estimate);
        }
        let progress = inner.progress;
        linear_estimate(progress.elapsed()?, progress.total_rows, progress.rows_sent)
    }

    /// Estimated time left, `None` while unknown
    ///
    /// Unknown until the first row is sent, even with a toolpath estimate.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        if self.rows_sent() == 0 {
            return None;
        }
        let total = self.estimated_duration()?;
        let elapsed = self.send_duration().unwrap_or_default();
        Some(total.saturating_sub(elapsed))
    }
}

fn millis(duration: Option<Duration>) -> u64 {
    duration
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Transmit, receive and status-poll threads driving a controller
pub struct IoThreads {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl IoThreads {
    /// Start the I/O threads for `controller`
    pub fn spawn(controller: &Arc<StreamController>) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(3);

        let c = Arc::clone(controller);
        let s = Arc::clone(&stop);
        handles.push(
            std::thread::Builder::new()
                .name("gcodestream-tx".to_string())
                .spawn(move || {
                    while !s.load(Ordering::Relaxed) {
                        if let Err(e) = c.transmit_next(Duration::from_millis(50)) {
                            tracing::debug!("Transmit stopped: {}", e);
                            std::thread::sleep(Duration::from_millis(50));
                        }
                    }
                })?,
        );

        let c = Arc::clone(controller);
        let s = Arc::clone(&stop);
        handles.push(
            std::thread::Builder::new()
                .name("gcodestream-rx".to_string())
                .spawn(move || {
                    while !s.load(Ordering::Relaxed) {
                        match c.poll_receive() {
                            Ok(0) => std::thread::sleep(Duration::from_millis(1)),
                            Ok(_) => {}
                            Err(e) => {
                                tracing::debug!("Receive: {}", e);
                                std::thread::sleep(Duration::from_millis(10));
                            }
                        }
                    }
                })?,
        );

        let interval = controller.settings().status_poll_interval_ms;
        if interval > 0 {
            let c = Arc::clone(controller);
            let s = Arc::clone(&stop);
            handles.push(
                std::thread::Builder::new()
                    .name("gcodestream-status".to_string())
                    .spawn(move || {
                        while !s.load(Ordering::Relaxed) {
                            std::thread::sleep(Duration::from_millis(interval));
                            if c.is_connected() {
                                if let Err(e) = c.request_status() {
                                    tracing::debug!("Status poll failed: {}", e);
                                }
                            }
                        }
                    })?,
            );
        }

        Ok(Self { stop, handles })
    }

    /// Stop and join every thread
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.handles {
            if handle.join().is_err() {
                tracing::warn!("I/O thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_estimate_unknown_before_first_row() {
        assert_eq!(linear_estimate(Duration::from_secs(5), 100, 0), None);
    }

    #[test]
    fn test_linear_estimate_extrapolates() {
        assert_eq!(
            linear_estimate(Duration::from_secs(10), 100, 25),
            Some(Duration::from_secs(40))
        );
    }

    #[test]
    fn test_progress_elapsed_frozen_when_finished() {
        let start = Instant::now();
        let progress = Progress {
            started: Some(start),
            finished: Some(start + Duration::from_millis(1500)),
            ..Progress::default()
        };
        assert_eq!(progress.elapsed(), Some(Duration::from_millis(1500)));
        assert_eq!(Progress::default().elapsed(), None);
    }

    #[test]
    fn test_outcomes_bounded() {
        let mut inner = Inner::new(false);
        for id in 0..MAX_TRACKED_OUTCOMES + 10 {
            inner.record_outcome(id.to_string(), None);
        }
        assert_eq!(inner.outcomes.len(), MAX_TRACKED_OUTCOMES);
        assert_eq!(inner.take_outcome("9"), None);
        assert_eq!(inner.take_outcome("10"), Some(None));
    }

    #[test]
    fn test_discard_fails_watched_commands() {
        let mut inner = Inner::new(false);
        let command = EncodedCommand::new("$H", "$H", "", 0, 1);
        let id = command.id.clone();
        inner.watched.insert(id.clone(), "$H".to_string());
        inner.in_flight.push_back(InFlight {
            command,
            cost: 3,
            session: None,
        });
        inner.outstanding = 3;

        inner.discard_pending("soft reset");
        assert_eq!(inner.outstanding, 0);
        assert!(inner.in_flight.is_empty());
        assert_eq!(inner.take_outcome(&id), Some(Some("soft reset".to_string())));
    }
}
