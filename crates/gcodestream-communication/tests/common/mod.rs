#![allow(dead_code)]

use gcodestream_communication::{Communicator, ConnectionParams, StreamController};
use gcodestream_core::StreamEvent;
use gcodestream_parser::{CommandSource, JobLoader, StoreKind};
use gcodestream_settings::StreamSettings;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Shared view of what a [`MockCommunicator`] wrote and will read
#[derive(Clone, Default)]
pub struct MockLink {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    incoming: Arc<Mutex<Vec<u8>>>,
    connected: Arc<AtomicBool>,
    auto_reply: Arc<AtomicBool>,
}

impl MockLink {
    /// Newline-terminated commands written so far
    pub fn lines(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|bytes| bytes.ends_with(b"\n"))
            .map(|bytes| String::from_utf8_lossy(bytes).trim_end().to_string())
            .collect()
    }

    /// Single realtime bytes written so far
    pub fn realtime(&self) -> Vec<u8> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|bytes| bytes.len() == 1)
            .map(|bytes| bytes[0])
            .collect()
    }

    /// Queue bytes for the next `receive`
    pub fn push_incoming(&self, text: &str) {
        self.incoming.lock().unwrap().extend_from_slice(text.as_bytes());
    }

    /// Answer every command with `ok` and every `?` with an idle report
    pub fn auto_reply(&self) {
        self.auto_reply.store(true, Ordering::SeqCst);
    }
}

pub struct MockCommunicator {
    link: MockLink,
}

impl MockCommunicator {
    pub fn new() -> (Self, MockLink) {
        let link = MockLink::default();
        (Self { link: link.clone() }, link)
    }
}

impl Communicator for MockCommunicator {
    fn connect(&mut self, _params: &ConnectionParams) -> gcodestream_core::Result<()> {
        self.link.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&mut self) -> gcodestream_core::Result<()> {
        self.link.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    fn send(&mut self, data: &[u8]) -> gcodestream_core::Result<usize> {
        self.link.sent.lock().unwrap().push(data.to_vec());
        if self.link.auto_reply.load(Ordering::SeqCst) {
            if data.ends_with(b"\n") {
                self.link.push_incoming("ok\r\n");
            } else if data == b"?" {
                self.link.push_incoming("<Idle|MPos:0.000,0.000,0.000>\r\n");
            }
        }
        Ok(data.len())
    }

    fn receive(&mut self) -> gcodestream_core::Result<Vec<u8>> {
        Ok(std::mem::take(&mut *self.link.incoming.lock().unwrap()))
    }
}

/// GRBL settings with the given byte capacity
pub fn grbl_settings(buffer_capacity: usize) -> StreamSettings {
    StreamSettings {
        buffer_capacity,
        status_poll_interval_ms: 0,
        ..StreamSettings::default()
    }
}

/// A connected controller and the link behind it
pub fn connected_controller(settings: StreamSettings) -> (StreamController, MockLink) {
    let (comm, link) = MockCommunicator::new();
    let controller = StreamController::new(Box::new(comm), settings).unwrap();
    controller
        .connect(&ConnectionParams::serial("/dev/ttyMOCK", 115_200))
        .unwrap();
    (controller, link)
}

/// Job rows held in memory
pub fn job(lines: &[&str]) -> Box<dyn CommandSource> {
    JobLoader::default()
        .load_lines(lines, StoreKind::InMemory)
        .unwrap()
        .source
}

/// Every event published so far
pub fn drain(rx: &mut broadcast::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}

/// `success` of the first `StreamComplete` event, if any
pub fn stream_result(events: &[StreamEvent]) -> Option<bool> {
    events.iter().find_map(|event| match event {
        StreamEvent::StreamComplete { success, .. } => Some(*success),
        _ => None,
    })
}
