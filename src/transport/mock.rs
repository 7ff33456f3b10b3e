//! Mock transport for testing

use super::Transport;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock transport for unit testing
///
/// Reads drain an injected byte queue; an empty queue behaves like a read
/// timeout (`Ok(0)`), matching the serial transport contract. The handle is
/// cloneable so tests can keep injecting data after handing the transport to
/// the reader thread.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    disconnected: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                disconnected: false,
            })),
        }
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.read_buffer.extend(data);
    }

    /// Inject a complete NMEA sentence, terminator included
    pub fn inject_sentence(&self, sentence: &str) {
        self.inject_read(sentence.as_bytes());
        self.inject_read(b"\r\n");
    }

    /// Make subsequent reads fail, simulating a yanked device
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.disconnected = true;
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.disconnected {
            return Err(Error::DeviceUnavailable("mock transport disconnected".into()));
        }
        let available = inner.read_buffer.len().min(buffer.len());

        for item in buffer.iter_mut().take(available) {
            *item = inner.read_buffer.pop_front().unwrap();
        }

        Ok(available)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}
