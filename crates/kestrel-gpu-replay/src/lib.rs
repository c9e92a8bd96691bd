//! Kestrel GPU trace playback engine.
//!
//! Re-executes a captured command-buffer trace against the virtual graphics
//! pipeline so prior execution can be inspected frame by frame and command
//! by command. The engine is split along its confinement boundary:
//!
//! - [`GpuExecutor`] owns the dedicated thread that holds all GPU-side
//!   mutable state (guest physical memory, swap mode, the packet executor)
//!   and runs queued tasks strictly in FIFO order;
//! - [`TracePlayer`] owns the playback cursor, turns seek requests into
//!   byte ranges and playback modes, and enqueues the decode/apply work.
//!
//! Seeks may be issued from any thread; everything that mutates hardware
//! state happens on the executor thread, which serializes all memory
//! mutations and packet executions without locks in the decode loop.

mod executor;
mod outcome;
mod player;
mod replay;

pub use executor::{CommandProcessor, GpuContext, GpuExecutor, PacketError, SwapMode};
pub use outcome::{ReplayOutcome, SeekRequest};
pub use player::{PlaybackCursor, PlayerInitError, ReplayConfig, SeekError, TracePlayer};
pub use replay::{PlaybackMode, ReplayError};
