//! Event system for stream and controller notifications
//!
//! Provides:
//! - Event types for the command lifecycle and machine state changes
//! - Event dispatcher publishing over a broadcast channel
//!
//! Subscribing and publishing never contend on a listener list: every
//! subscriber owns its own receiver.

use crate::data::{ControllerStatus, StreamState};
use tokio::sync::broadcast;

/// Stream and controller events, in the order they are published
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A command entered the send queue
    CommandQueued {
        /// Sequence number of the command.
        sequence_number: u32,
        /// Normalized command text.
        command: String,
        /// Queued outside the job; numbered separately from job rows.
        manual: bool,
    },
    /// A command was written to the controller
    CommandSent {
        /// Sequence number of the command.
        sequence_number: u32,
        /// Normalized command text.
        command: String,
        /// Queued outside the job; numbered separately from job rows.
        manual: bool,
    },
    /// The controller acknowledged a command
    CommandComplete {
        /// Sequence number of the command.
        sequence_number: u32,
        /// Normalized command text.
        command: String,
        /// Firmware error text when the command was rejected.
        error: Option<String>,
        /// Queued outside the job; numbered separately from job rows.
        manual: bool,
    },
    /// A comment was reached while streaming
    CommentSeen(String),
    /// A status report was applied
    StatusChanged(ControllerStatus),
    /// Stream state machine moved
    StreamStateChanged(StreamState),
    /// Firmware raised an alarm
    Alarm {
        /// Alarm code.
        code: u32,
        /// Alarm description.
        message: String,
    },
    /// Stream finished, was cancelled, or aborted
    StreamComplete {
        /// True when every command completed without error.
        success: bool,
        /// Wall-clock stream duration in milliseconds.
        duration_ms: u64,
    },
}

impl std::fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamEvent::CommandQueued {
                sequence_number,
                command,
                manual,
            } => write!(f, "Queued {}{}: {}", origin(*manual), sequence_number, command),
            StreamEvent::CommandSent {
                sequence_number,
                command,
                manual,
            } => write!(f, "Sent {}{}: {}", origin(*manual), sequence_number, command),
            StreamEvent::CommandComplete {
                sequence_number,
                command,
                error,
                manual,
            } => match error {
                Some(err) => write!(
                    f,
                    "Failed {}{}: {} ({})",
                    origin(*manual),
                    sequence_number,
                    command,
                    err
                ),
                None => write!(
                    f,
                    "Complete {}{}: {}",
                    origin(*manual),
                    sequence_number,
                    command
                ),
            },
            StreamEvent::CommentSeen(comment) => write!(f, "Comment: {}", comment),
            StreamEvent::StatusChanged(status) => write!(f, "Status: {}", status),
            StreamEvent::StreamStateChanged(state) => write!(f, "Stream: {}", state),
            StreamEvent::Alarm { code, message } => write!(f, "Alarm {} ({})", code, message),
            StreamEvent::StreamComplete {
                success,
                duration_ms,
            } => write!(
                f,
                "Stream complete ({}) in {}ms",
                if *success { "success" } else { "failed" },
                duration_ms
            ),
        }
    }
}

fn origin(manual: bool) -> &'static str {
    if manual {
        "manual #"
    } else {
        "#"
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for stream events.
    tx: broadcast::Sender<StreamEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 100)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of receivers; publishing with nobody listening is
    /// not an error.
    pub fn publish(&self, event: StreamEvent) -> usize {
        match self.tx.send(event) {
            Ok(count) => count,
            Err(_) => 0,
        }
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let dispatcher = EventDispatcher::default();
        assert_eq!(dispatcher.publish(StreamEvent::CommentSeen("x".into())), 0);
    }

    #[test]
    fn test_subscribers_receive_in_order() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx = dispatcher.subscribe();
        dispatcher.publish(StreamEvent::CommentSeen("first".into()));
        dispatcher.publish(StreamEvent::StreamStateChanged(StreamState::Sending));

        assert_eq!(
            rx.try_recv().unwrap(),
            StreamEvent::CommentSeen("first".into())
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StreamEvent::StreamStateChanged(StreamState::Sending)
        );
        assert_eq!(dispatcher.subscriber_count(), 1);
    }

    #[test]
    fn test_display_marks_manual_commands() {
        let manual = StreamEvent::CommandSent {
            sequence_number: 1,
            command: "G4 P0".into(),
            manual: true,
        };
        let job = StreamEvent::CommandSent {
            sequence_number: 1,
            command: "G1 X1".into(),
            manual: false,
        };
        assert_eq!(manual.to_string(), "Sent manual #1: G4 P0");
        assert_eq!(job.to_string(), "Sent #1: G1 X1");
    }
}
