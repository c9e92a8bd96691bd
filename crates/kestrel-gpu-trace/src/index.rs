//! Read-only frame/command index over a trace byte blob.
//!
//! Indexing a trace (walking its records to discover frame and command
//! boundaries) happens elsewhere; this module only defines the validated
//! shapes playback seeks over. Offsets are untrusted at construction and
//! checked once, so consumers can rely on the invariants structurally.

/// One packet-execution unit within a frame, identified by the byte offset
/// at which its payload ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub end_offset: usize,
}

/// One presented unit of GPU work, bounded by `[start_offset, end_offset)`
/// in the trace blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub start_offset: usize,
    pub end_offset: usize,
    pub commands: Vec<Command>,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("frame {frame}: start offset {start:#x} is past end offset {end:#x}")]
    FrameRangeInverted { frame: usize, start: usize, end: usize },

    #[error("frame {frame}, command {command}: end offset {offset:#x} is outside the frame range")]
    CommandOutsideFrame {
        frame: usize,
        command: usize,
        offset: usize,
    },

    #[error(
        "frame {frame}, command {command}: end offset {offset:#x} does not increase over {previous:#x}"
    )]
    CommandOffsetNotIncreasing {
        frame: usize,
        command: usize,
        offset: usize,
        previous: usize,
    },
}

/// Immutable, validated frame index. Built once before playback and shared
/// read-only thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceIndex {
    frames: Vec<Frame>,
}

impl TraceIndex {
    /// Validates every frame's bounds and command ordering. Offsets are
    /// untrusted input here; replay never re-checks them.
    pub fn new(frames: Vec<Frame>) -> Result<Self, IndexError> {
        for (frame_index, frame) in frames.iter().enumerate() {
            if frame.start_offset > frame.end_offset {
                return Err(IndexError::FrameRangeInverted {
                    frame: frame_index,
                    start: frame.start_offset,
                    end: frame.end_offset,
                });
            }
            let mut previous: Option<usize> = None;
            for (command_index, command) in frame.commands.iter().enumerate() {
                if command.end_offset <= frame.start_offset
                    || command.end_offset > frame.end_offset
                {
                    return Err(IndexError::CommandOutsideFrame {
                        frame: frame_index,
                        command: command_index,
                        offset: command.end_offset,
                    });
                }
                if let Some(previous) = previous {
                    if command.end_offset <= previous {
                        return Err(IndexError::CommandOffsetNotIncreasing {
                            frame: frame_index,
                            command: command_index,
                            offset: command.end_offset,
                            previous,
                        });
                    }
                }
                previous = Some(command.end_offset);
            }
        }
        Ok(Self { frames })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Largest end offset any frame claims; playback validates this against
    /// the actual blob length once, up front.
    pub fn max_end_offset(&self) -> usize {
        self.frames.iter().map(|f| f.end_offset).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(start: usize, end: usize, command_ends: &[usize]) -> Frame {
        Frame {
            start_offset: start,
            end_offset: end,
            commands: command_ends
                .iter()
                .map(|&end_offset| Command { end_offset })
                .collect(),
        }
    }

    #[test]
    fn accepts_ordered_frames() {
        let index = TraceIndex::new(vec![
            frame(0, 100, &[20, 60, 100]),
            frame(100, 100, &[]),
            frame(100, 240, &[240]),
        ])
        .unwrap();
        assert_eq!(index.frame_count(), 3);
        assert_eq!(index.max_end_offset(), 240);
        assert_eq!(index.frame(0).unwrap().commands.len(), 3);
        assert!(index.frame(3).is_none());
    }

    #[test]
    fn rejects_inverted_frame_range() {
        let err = TraceIndex::new(vec![frame(50, 10, &[])]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::FrameRangeInverted {
                frame: 0,
                start: 50,
                end: 10
            }
        ));
    }

    #[test]
    fn rejects_non_increasing_command_offsets() {
        let err = TraceIndex::new(vec![frame(0, 100, &[40, 40])]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::CommandOffsetNotIncreasing {
                command: 1,
                offset: 40,
                previous: 40,
                ..
            }
        ));
    }

    #[test]
    fn rejects_command_outside_frame() {
        let err = TraceIndex::new(vec![frame(10, 100, &[140])]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::CommandOutsideFrame { offset: 140, .. }
        ));

        // A command may not end exactly at the frame start either; ranges
        // replayed for it would be empty.
        let err = TraceIndex::new(vec![frame(10, 100, &[10])]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::CommandOutsideFrame { offset: 10, .. }
        ));
    }
}
