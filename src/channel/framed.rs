//! Framed message protocol over bounded-record channels.
//!
//! Messages of arbitrary size are serialized to JSON, split into chunk
//! records no larger than [`defaults::RECORD_PAYLOAD_MAX`] bytes, and closed
//! with a sentinel record. Each record carries a leading type byte, so the
//! sentinel can never collide with chunk payload. Sends retry on transient
//! channel unavailability with a short fixed backoff up to a hard ceiling;
//! receives poll, reassemble, and drop malformed messages without ever
//! taking the receive loop down.
//!
//! One framed channel has exactly one sender and one receiver; a session
//! uses an independent channel per direction.

use crate::channel::record::{RecordReceiver, RecordRecvError, RecordSendError, RecordSender};
use crate::defaults;
use crate::error::{RemvoxError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::thread;
use tracing::{debug, warn};

/// Record type byte: one chunk of a serialized message.
const TAG_CHUNK: u8 = 0x01;
/// Record type byte: end of the current message.
const TAG_SENTINEL: u8 = 0x02;

/// Sending half of a framed channel.
pub struct FramedSender<S: RecordSender> {
    sender: S,
}

impl<S: RecordSender> FramedSender<S> {
    pub fn new(sender: S) -> Self {
        Self { sender }
    }

    /// Serialize `message` and send it as chunk records plus a sentinel.
    ///
    /// A broken channel surfaces as an `Err`; the caller decides whether that
    /// ends the session. The channel itself is left in a sane state either
    /// way, since the receiver discards any incomplete message on its side.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;

        let mut record = Vec::with_capacity(defaults::RECORD_PAYLOAD_MAX + 1);
        for chunk in payload.chunks(defaults::RECORD_PAYLOAD_MAX) {
            record.clear();
            record.push(TAG_CHUNK);
            record.extend_from_slice(chunk);
            self.send_record(&record)?;
        }
        self.send_record(&[TAG_SENTINEL])
    }

    /// Send one record, retrying on transient unavailability.
    ///
    /// At most [`defaults::SEND_RETRY_LIMIT`] attempts are made, spaced by
    /// [`defaults::SEND_RETRY_DELAY`].
    fn send_record(&self, record: &[u8]) -> Result<()> {
        for attempt in 1..=defaults::SEND_RETRY_LIMIT {
            match self.sender.try_send_record(record) {
                Ok(()) => return Ok(()),
                Err(RecordSendError::Full) => {
                    if attempt < defaults::SEND_RETRY_LIMIT {
                        thread::sleep(defaults::SEND_RETRY_DELAY);
                    }
                }
                Err(RecordSendError::Disconnected) => {
                    return Err(RemvoxError::ChannelDisconnected);
                }
            }
        }
        Err(RemvoxError::ChannelBroken {
            attempts: defaults::SEND_RETRY_LIMIT,
        })
    }
}

/// Receiving half of a framed channel.
///
/// Holds the reassembly buffer for the message currently in flight.
pub struct FramedReceiver<R: RecordReceiver> {
    receiver: R,
    buffer: Vec<u8>,
}

impl<R: RecordReceiver> FramedReceiver<R> {
    pub fn new(receiver: R) -> Self {
        Self {
            receiver,
            buffer: Vec::new(),
        }
    }

    /// Block until a complete message decodes.
    ///
    /// Malformed records and undecodable messages are logged, dropped, and a
    /// new receive cycle begins. The only exit besides a message is channel
    /// disconnection.
    pub fn recv<T: DeserializeOwned>(&mut self) -> Result<T> {
        loop {
            if let Some(message) = self.recv_until(|| false)? {
                return Ok(message);
            }
        }
    }

    /// Like [`recv`](Self::recv), but consults `should_stop` between polls
    /// and returns `Ok(None)` once it reports true. Any partially assembled
    /// message is discarded on interruption.
    pub fn recv_until<T, F>(&mut self, should_stop: F) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        F: Fn() -> bool,
    {
        loop {
            if should_stop() {
                self.buffer.clear();
                return Ok(None);
            }
            match self.receiver.try_recv_record() {
                Ok(record) => {
                    if let Some(message) = self.accept_record(&record) {
                        return Ok(Some(message));
                    }
                }
                Err(RecordRecvError::Empty) => {
                    thread::sleep(defaults::RECV_POLL_DELAY);
                }
                Err(RecordRecvError::Disconnected) => {
                    self.buffer.clear();
                    return Err(RemvoxError::ChannelDisconnected);
                }
            }
        }
    }

    /// Fold one record into the reassembly buffer; returns a message when a
    /// sentinel completes one that decodes.
    fn accept_record<T: DeserializeOwned>(&mut self, record: &[u8]) -> Option<T> {
        match record.split_first() {
            Some((&TAG_CHUNK, payload)) => {
                self.buffer.extend_from_slice(payload);
                None
            }
            Some((&TAG_SENTINEL, _)) => {
                let assembled = std::mem::take(&mut self.buffer);
                match serde_json::from_slice(&assembled) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        // Partial state must not leak into the next message.
                        debug!("dropping undecodable message ({} bytes): {}", assembled.len(), e);
                        None
                    }
                }
            }
            _ => {
                warn!(len = record.len(), "dropping malformed record");
                self.buffer.clear();
                None
            }
        }
    }
}
