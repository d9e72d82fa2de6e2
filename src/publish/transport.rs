//! Pub/sub transport seam
//!
//! The pipeline only needs fire-and-forget `publish(topic, bytes)`. Real
//! middleware bindings implement [`Transport`]; the in-process variants here
//! serve the CLI and tests.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    mpsc::{self, Receiver, Sender},
    Mutex,
};

use crate::error::{CaptureError, Result};

/// Destination of encoded messages
pub trait Transport: Send + Sync {
    /// Hand one encoded message to the middleware. Must not wait for delivery.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

/// A message as seen by a [`ChannelTransport`] receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Forwards every message over an in-process channel
#[derive(Debug)]
pub struct ChannelTransport {
    sender: Mutex<Sender<Envelope>>,
}

impl ChannelTransport {
    pub fn new() -> (Self, Receiver<Envelope>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }
}

impl Transport for ChannelTransport {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let envelope = Envelope {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        self.sender
            .lock()
            .unwrap()
            .send(envelope)
            .map_err(|_| CaptureError::transport(topic, "receiver disconnected"))
    }
}

/// Logs topic and size of each message and counts them
#[derive(Debug, Default)]
pub struct LogTransport {
    messages: AtomicU64,
    bytes: AtomicU64,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl Transport for LogTransport {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
        log::info!("publish {} ({} bytes)", topic, payload.len());
        Ok(())
    }
}
