//! Kestrel GPU trace stream format.
//!
//! A trace is a flat little-endian byte blob of sequential tagged records
//! captured from guest command-buffer traffic. This crate owns the record
//! layouts, a bounds-checked decoder over an assigned byte range, a small
//! writer used by tooling and tests, and the validated frame/command index
//! types the replay engine seeks over.
//!
//! Capture pipelines and on-disk container framing are out of scope here;
//! see `kestrel-gpu-replay` for playback.

mod decode;
mod format;
mod index;
mod writer;

pub use decode::{decompress_into, Record, TraceCursor, TraceDecodeError};
pub use format::{RecordTag, EVENT_SWAP};
pub use index::{Command, Frame, IndexError, TraceIndex};
pub use writer::TraceWriter;
