//! Playback cursor and seek logic.
//!
//! Seeks validate their target, update the shared cursor, compute the byte
//! range that must be replayed, and enqueue one task on the executor. They
//! never block on the replay itself and never touch GPU-side state
//! directly.

use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

use kestrel_gpu_trace::{Frame, TraceIndex};
use kestrel_guest_phys::{GuestPhys, GuestPhysError};

use crate::executor::{CommandProcessor, GpuExecutor};
use crate::outcome::{OutcomeQueue, ReplayOutcome, SeekRequest};
use crate::replay::{replay_range, PlaybackMode, ReplayError};

#[derive(Debug, Clone, Copy)]
pub struct ReplayConfig {
    /// Size of the one-time guest physical reservation.
    pub guest_phys_size: u64,
    /// Surface and resolution of the synthetic swap issued when a replay
    /// range runs to exhaustion.
    pub swap_surface_id: u32,
    pub swap_width: u32,
    pub swap_height: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            guest_phys_size: 128 * 1024 * 1024,
            swap_surface_id: 0,
            swap_width: 1280,
            swap_height: 720,
        }
    }
}

/// Current playback position. `command_index = None` means "before the
/// first command of the frame".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackCursor {
    pub frame_index: usize,
    pub command_index: Option<usize>,
}

/// A seek target outside the index bounds. Rejected before any cursor
/// mutation or task submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SeekError {
    #[error("frame index {target} out of range ({frame_count} frames)")]
    FrameOutOfRange { target: usize, frame_count: usize },

    #[error("command index {target} out of range ({command_count} commands in frame {frame})")]
    CommandOutOfRange {
        target: usize,
        frame: usize,
        command_count: usize,
    },
}

/// Construction failure. Fatal: the engine cannot exist without its
/// reservation, its executor thread, and an index that fits the blob.
#[derive(Debug, thiserror::Error)]
pub enum PlayerInitError {
    #[error("guest physical memory reservation failed: {0}")]
    Reservation(#[from] GuestPhysError),

    #[error("failed to spawn the gpu executor thread: {0}")]
    ExecutorThread(#[from] std::io::Error),

    #[error("trace index end offset {end:#x} exceeds trace length {len:#x}")]
    IndexOutOfBounds { end: usize, len: usize },
}

/// Replay engine facade: owns the cursor, the executor handle, and the
/// shared trace blob.
pub struct TracePlayer {
    index: Arc<TraceIndex>,
    trace: Arc<[u8]>,
    executor: GpuExecutor,
    cursor: Arc<Mutex<PlaybackCursor>>,
    outcomes: Arc<OutcomeQueue>,
    config: ReplayConfig,
}

impl TracePlayer {
    pub fn new(
        index: Arc<TraceIndex>,
        trace: impl Into<Arc<[u8]>>,
        processor: Box<dyn CommandProcessor>,
        config: ReplayConfig,
    ) -> Result<Self, PlayerInitError> {
        let trace = trace.into();
        let end = index.max_end_offset();
        if end > trace.len() {
            return Err(PlayerInitError::IndexOutOfBounds {
                end,
                len: trace.len(),
            });
        }

        let mem = GuestPhys::reserve(config.guest_phys_size)?;
        let executor = GpuExecutor::spawn(mem, processor)?;
        Ok(Self {
            index,
            trace,
            executor,
            cursor: Arc::new(Mutex::new(PlaybackCursor {
                frame_index: 0,
                command_index: None,
            })),
            outcomes: Arc::new(OutcomeQueue::default()),
            config,
        })
    }

    pub fn index(&self) -> &TraceIndex {
        &self.index
    }

    pub fn cursor(&self) -> PlaybackCursor {
        *lock_cursor(&self.cursor)
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.index.frame(self.cursor().frame_index)
    }

    /// Completed replay results, in task completion order.
    pub fn drain_outcomes(&self) -> Vec<ReplayOutcome> {
        self.outcomes.drain()
    }

    /// Block until every replay task queued so far has finished.
    pub fn flush(&self) {
        self.executor.flush();
    }

    /// Seek to a frame. Replays the entire frame range in break-on-swap
    /// mode: frame boundaries are not guaranteed to start from a clean
    /// state, so a full replay is the only way to reconstruct guest memory
    /// for the frame. Seeking to the current frame is a no-op.
    pub fn seek_frame(&self, target: usize) -> Result<(), SeekError> {
        let frame_count = self.index.frame_count();
        let Some(frame) = self.index.frame(target) else {
            return Err(SeekError::FrameOutOfRange {
                target,
                frame_count,
            });
        };

        let mut cursor = lock_cursor(&self.cursor);
        if cursor.frame_index == target {
            return Ok(());
        }
        let previous = *cursor;
        cursor.frame_index = target;
        cursor.command_index = frame.commands.len().checked_sub(1);
        let installed = *cursor;
        drop(cursor);

        self.play(
            SeekRequest::Frame { target },
            previous,
            installed,
            frame.start_offset..frame.end_offset,
        );
        Ok(())
    }

    /// Seek to a command within the current frame. A single forward step
    /// replays only the incremental range past the previous command; any
    /// other jump replays from the frame start, because guest memory state
    /// cannot be assumed for arbitrary jumps. `None` rewinds the cursor to
    /// "before the first command" without replaying. Seeking to the current
    /// command is a no-op.
    pub fn seek_command(&self, target: Option<usize>) -> Result<(), SeekError> {
        let mut cursor = lock_cursor(&self.cursor);
        let frame_index = cursor.frame_index;
        let frame = self.index.frame(frame_index);
        let command_count = frame.map(|frame| frame.commands.len()).unwrap_or(0);
        if let Some(target) = target {
            if target >= command_count {
                return Err(SeekError::CommandOutOfRange {
                    target,
                    frame: frame_index,
                    command_count,
                });
            }
        }

        if cursor.command_index == target {
            return Ok(());
        }
        let previous = *cursor;
        cursor.command_index = target;
        let installed = *cursor;
        drop(cursor);

        let Some(target) = target else {
            // Cursor-only rewind; nothing to replay.
            return Ok(());
        };
        let Some(frame) = frame else {
            // Unreachable with a validated target, but keep the path total.
            return Ok(());
        };
        let start = match previous.command_index {
            // Exactly one step forward: guest memory already reflects the
            // previous command, so only the delta needs to be replayed.
            Some(previous) if target > 0 && previous == target - 1 => {
                frame.commands[previous].end_offset
            }
            _ => frame.start_offset,
        };
        self.play(
            SeekRequest::Command {
                frame: frame_index,
                target,
            },
            previous,
            installed,
            start..frame.commands[target].end_offset,
        );
        Ok(())
    }

    fn play(
        &self,
        request: SeekRequest,
        previous: PlaybackCursor,
        installed: PlaybackCursor,
        range: Range<usize>,
    ) {
        tracing::debug!(
            ?request,
            start = range.start,
            end = range.end,
            "queueing replay task"
        );
        let trace = Arc::clone(&self.trace);
        let cursor = Arc::clone(&self.cursor);
        let outcomes = Arc::clone(&self.outcomes);
        let config = self.config;
        self.executor.submit(move |ctx| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                replay_range(ctx, &trace[range], PlaybackMode::BreakOnSwap, &config)
            }))
            .unwrap_or(Err(ReplayError::TaskPanicked));
            match &result {
                Ok(()) => tracing::debug!(?request, "replay task completed"),
                Err(err) => {
                    // Applied mutations stand; the cursor must keep naming
                    // the last fully applied command. A later seek may have
                    // moved the cursor already, in which case this task has
                    // nothing to roll back.
                    tracing::warn!(?request, error = %err, "replay task failed");
                    let mut cursor = lock_cursor(&cursor);
                    if *cursor == installed {
                        *cursor = previous;
                    }
                }
            }
            outcomes.push(ReplayOutcome { request, result });
        });
    }
}

fn lock_cursor(cursor: &Mutex<PlaybackCursor>) -> MutexGuard<'_, PlaybackCursor> {
    match cursor.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
