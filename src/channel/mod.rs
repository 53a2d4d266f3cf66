//! Reliable message framing over bounded-record channels.
//!
//! `record` defines the transport seam (in-memory and pipe-backed), `framed`
//! layers message boundaries, retry and reassembly on top.

pub mod framed;
pub mod record;

pub use framed::{FramedReceiver, FramedSender};
pub use record::{
    MemoryRecordReceiver, MemoryRecordSender, PipeRecordReader, PipeRecordWriter, RecordReceiver,
    RecordRecvError, RecordSendError, RecordSender, memory_record_channel,
};
