//! Bounded-record channel transports.
//!
//! A record channel moves discrete byte records of bounded size in one
//! direction, with non-blocking send/receive that distinguishes transient
//! unavailability (full, empty) from a dead peer. The framed message
//! protocol in [`crate::channel::framed`] layers message boundaries, retry
//! and reassembly on top of these traits.
//!
//! Two transports are provided: an in-memory pair (worker runs as a
//! dedicated thread; also the test harness) and an OS pipe carrying
//! length-prefixed records (worker runs as a child process).

use crate::defaults;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use std::io::{Read, Write};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Largest record the pipe transport will accept: framed chunk payload plus
/// the frame tag byte, with a little slack. Anything bigger is corruption.
const RECORD_LEN_MAX: usize = defaults::RECORD_PAYLOAD_MAX + 8;

/// Why a record could not be sent right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSendError {
    /// Channel is transiently unavailable; the caller may retry.
    Full,
    /// The receiving side is gone; retrying is pointless.
    Disconnected,
}

/// Why a record could not be received right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRecvError {
    /// No record available yet; poll again later.
    Empty,
    /// The sending side is gone and the channel is drained.
    Disconnected,
}

/// Sending half of a record channel.
pub trait RecordSender: Send {
    fn try_send_record(&self, record: &[u8]) -> Result<(), RecordSendError>;
}

/// Receiving half of a record channel.
pub trait RecordReceiver: Send {
    fn try_recv_record(&self) -> Result<Vec<u8>, RecordRecvError>;
}

/// In-memory record sender over a bounded crossbeam channel.
pub struct MemoryRecordSender {
    tx: Sender<Vec<u8>>,
}

/// In-memory record receiver over a bounded crossbeam channel.
pub struct MemoryRecordReceiver {
    rx: Receiver<Vec<u8>>,
}

/// Create a connected in-memory record channel with the given capacity.
pub fn memory_record_channel(capacity: usize) -> (MemoryRecordSender, MemoryRecordReceiver) {
    let (tx, rx) = bounded(capacity);
    (MemoryRecordSender { tx }, MemoryRecordReceiver { rx })
}

impl RecordSender for MemoryRecordSender {
    fn try_send_record(&self, record: &[u8]) -> Result<(), RecordSendError> {
        match self.tx.try_send(record.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(RecordSendError::Full),
            Err(TrySendError::Disconnected(_)) => Err(RecordSendError::Disconnected),
        }
    }
}

impl RecordReceiver for MemoryRecordReceiver {
    fn try_recv_record(&self) -> Result<Vec<u8>, RecordRecvError> {
        match self.rx.try_recv() {
            Ok(record) => Ok(record),
            Err(TryRecvError::Empty) => Err(RecordRecvError::Empty),
            Err(TryRecvError::Disconnected) => Err(RecordRecvError::Disconnected),
        }
    }
}

/// Record sender over a byte stream (worker child stdin/stdout).
///
/// Each record is written as a little-endian u32 length prefix followed by
/// the record bytes, which preserves record boundaries over the stream.
pub struct PipeRecordWriter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> PipeRecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> RecordSender for PipeRecordWriter<W> {
    fn try_send_record(&self, record: &[u8]) -> Result<(), RecordSendError> {
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let len = (record.len() as u32).to_le_bytes();
        let result = writer
            .write_all(&len)
            .and_then(|_| writer.write_all(record))
            .and_then(|_| writer.flush());
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(RecordSendError::Full),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Err(RecordSendError::Full),
            Err(e) => {
                debug!("pipe record write failed: {}", e);
                Err(RecordSendError::Disconnected)
            }
        }
    }
}

/// Record receiver over a byte stream.
///
/// A dedicated reader thread blocks on the stream, reassembles
/// length-prefixed records and queues them, so `try_recv_record` has the
/// same non-blocking poll semantics as the in-memory transport. The thread
/// exits when the stream hits EOF or a framing violation; the queue then
/// reports disconnection once drained.
pub struct PipeRecordReader {
    rx: Receiver<Vec<u8>>,
}

impl PipeRecordReader {
    pub fn spawn<R: Read + Send + 'static>(mut reader: R) -> Self {
        let (tx, rx) = bounded::<Vec<u8>>(defaults::RECORD_CHANNEL_CAPACITY);
        std::thread::Builder::new()
            .name("record-reader".to_string())
            .spawn(move || {
                loop {
                    let mut len_buf = [0u8; 4];
                    if let Err(e) = reader.read_exact(&mut len_buf) {
                        if e.kind() != std::io::ErrorKind::UnexpectedEof {
                            debug!("pipe record read failed: {}", e);
                        }
                        break;
                    }
                    let len = u32::from_le_bytes(len_buf) as usize;
                    if len > RECORD_LEN_MAX {
                        warn!(len, "oversize record on pipe, treating stream as corrupt");
                        break;
                    }
                    let mut record = vec![0u8; len];
                    if let Err(e) = reader.read_exact(&mut record) {
                        debug!("pipe record body read failed: {}", e);
                        break;
                    }
                    if tx.send(record).is_err() {
                        break;
                    }
                }
                // Dropping tx disconnects the queue after it drains.
            })
            .map(|_| ())
            .unwrap_or_else(|e| warn!("failed to spawn record reader thread: {}", e));
        Self { rx }
    }
}

impl RecordReceiver for PipeRecordReader {
    fn try_recv_record(&self) -> Result<Vec<u8>, RecordRecvError> {
        match self.rx.try_recv() {
            Ok(record) => Ok(record),
            Err(TryRecvError::Empty) => Err(RecordRecvError::Empty),
            Err(TryRecvError::Disconnected) => Err(RecordRecvError::Disconnected),
        }
    }
}

// Boxed transports so the controller can hold either flavor.
impl RecordSender for Box<dyn RecordSender> {
    fn try_send_record(&self, record: &[u8]) -> Result<(), RecordSendError> {
        (**self).try_send_record(record)
    }
}

impl RecordReceiver for Box<dyn RecordReceiver> {
    fn try_recv_record(&self) -> Result<Vec<u8>, RecordRecvError> {
        (**self).try_recv_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_channel_roundtrip() {
        let (tx, rx) = memory_record_channel(4);
        tx.try_send_record(b"hello").expect("should send");
        tx.try_send_record(b"").expect("should send empty");

        assert_eq!(rx.try_recv_record().expect("should recv"), b"hello");
        assert_eq!(rx.try_recv_record().expect("should recv"), b"");
        assert_eq!(rx.try_recv_record(), Err(RecordRecvError::Empty));
    }

    #[test]
    fn memory_channel_full_is_transient() {
        let (tx, rx) = memory_record_channel(1);
        tx.try_send_record(b"a").expect("should send");
        assert_eq!(tx.try_send_record(b"b"), Err(RecordSendError::Full));

        // Draining makes room again
        rx.try_recv_record().expect("should recv");
        tx.try_send_record(b"b").expect("should send after drain");
    }

    #[test]
    fn memory_channel_disconnect_detected_both_sides() {
        let (tx, rx) = memory_record_channel(1);
        drop(rx);
        assert_eq!(tx.try_send_record(b"a"), Err(RecordSendError::Disconnected));

        let (tx, rx) = memory_record_channel(1);
        tx.try_send_record(b"last").expect("should send");
        drop(tx);
        // Queued records drain before disconnection is reported
        assert_eq!(rx.try_recv_record().expect("should recv"), b"last");
        assert_eq!(rx.try_recv_record(), Err(RecordRecvError::Disconnected));
    }

    #[test]
    fn pipe_transport_roundtrip() {
        let (pipe_rx, pipe_tx) = std::io::pipe().expect("should create pipe");
        let writer = PipeRecordWriter::new(pipe_tx);
        let reader = PipeRecordReader::spawn(pipe_rx);

        writer.try_send_record(b"one").expect("should send");
        writer.try_send_record(b"two").expect("should send");

        assert_eq!(recv_blocking(&reader), b"one");
        assert_eq!(recv_blocking(&reader), b"two");
    }

    #[test]
    fn pipe_reader_reports_disconnect_on_eof() {
        let (pipe_rx, pipe_tx) = std::io::pipe().expect("should create pipe");
        let writer = PipeRecordWriter::new(pipe_tx);
        let reader = PipeRecordReader::spawn(pipe_rx);

        writer.try_send_record(b"tail").expect("should send");
        drop(writer);

        assert_eq!(recv_blocking(&reader), b"tail");
        // Reader thread sees EOF and drops its queue sender
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            match reader.try_recv_record() {
                Err(RecordRecvError::Disconnected) => break,
                Err(RecordRecvError::Empty) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                other => panic!("expected disconnect, got {:?}", other),
            }
        }
    }

    #[test]
    fn pipe_reader_rejects_oversize_record() {
        let (pipe_rx, mut pipe_tx) = std::io::pipe().expect("should create pipe");
        let reader = PipeRecordReader::spawn(pipe_rx);

        // Length prefix far beyond the record ceiling
        pipe_tx
            .write_all(&(u32::MAX).to_le_bytes())
            .expect("should write");
        pipe_tx.flush().expect("should flush");

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            match reader.try_recv_record() {
                Err(RecordRecvError::Disconnected) => break,
                Err(RecordRecvError::Empty) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                other => panic!("expected disconnect, got {:?}", other),
            }
        }
    }

    fn recv_blocking(reader: &PipeRecordReader) -> Vec<u8> {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            match reader.try_recv_record() {
                Ok(record) => return record,
                Err(RecordRecvError::Empty) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                Err(e) => panic!("receive failed: {:?}", e),
            }
        }
    }
}
