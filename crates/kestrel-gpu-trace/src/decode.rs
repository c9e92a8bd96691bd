//! Record decoding over an assigned byte range.
//!
//! [`TraceCursor`] carries `{buffer, offset}` so bounds checking is a
//! structural property of every read rather than a calling convention on raw
//! offset arithmetic. [`decode_record`](TraceCursor::decode_record) returns a
//! borrowed [`Record`] whose payloads are sub-slices of the input; records
//! are ephemeral and consumed within one decode step.

use crate::format::RecordTag;

#[derive(Debug, thiserror::Error)]
pub enum TraceDecodeError {
    #[error("unknown record tag {tag:#x} at offset {offset:#x}")]
    UnknownTag { tag: u32, offset: usize },

    #[error(
        "record at offset {offset:#x} is truncated (needed {needed} bytes, {available} available)"
    )]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("record payload length overflows at offset {offset:#x}")]
    LengthOverflow { offset: usize },

    #[error("lz4 decompression failed: {0}")]
    Lz4(#[from] lz4_flex::block::DecompressError),

    #[error("decompressed length mismatch (expected {expected} bytes, produced {produced})")]
    DecompressedLenMismatch { expected: usize, produced: usize },
}

/// One decoded trace record. Payload slices borrow from the decoded range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record<'a> {
    PrimaryBufferStart {
        word_count: u32,
    },
    PrimaryBufferEnd,
    IndirectBufferStart {
        word_count: u32,
    },
    IndirectBufferEnd,
    /// The payload is the packet's `word_count * 4` command-buffer bytes,
    /// copied verbatim into guest memory at `base_address` by playback.
    PacketStart {
        base_address: u32,
        word_count: u32,
        payload: &'a [u8],
    },
    PacketEnd,
    /// Captured guest-memory content read back during tracing. Raw bytes if
    /// `full_length == 0`, otherwise `payload` is an lz4 block that expands
    /// to exactly `full_length` bytes.
    MemoryRead {
        base_address: u32,
        length: u32,
        full_length: u32,
        payload: &'a [u8],
    },
    /// Write-direction memory traffic. Decoded for framing but not applied
    /// by playback.
    MemoryWrite {
        base_address: u32,
        length: u32,
    },
    Event {
        event_type: u32,
    },
}

/// Bounds-checked cursor over one assigned trace byte range.
#[derive(Debug)]
pub struct TraceCursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> TraceCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Byte offset of the next unread byte, relative to the range start.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], TraceDecodeError> {
        let available = self.remaining();
        if len > available {
            return Err(TraceDecodeError::Truncated {
                offset: self.offset,
                needed: len,
                available,
            });
        }
        let slice = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, TraceDecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Decode the record at the current offset, advancing past its header
    /// and payload.
    ///
    /// On error the cursor is left mid-record and must not be reused; the
    /// failing offset is carried in the error.
    pub fn decode_record(&mut self) -> Result<Record<'a>, TraceDecodeError> {
        let record_offset = self.offset;
        let raw_tag = self.read_u32()?;
        let tag = RecordTag::from_u32(raw_tag).ok_or(TraceDecodeError::UnknownTag {
            tag: raw_tag,
            offset: record_offset,
        })?;

        match tag {
            RecordTag::PrimaryBufferStart => {
                let word_count = self.read_u32()?;
                self.take(word_byte_len(word_count, record_offset)?)?;
                Ok(Record::PrimaryBufferStart { word_count })
            }
            RecordTag::PrimaryBufferEnd => Ok(Record::PrimaryBufferEnd),
            RecordTag::IndirectBufferStart => {
                let word_count = self.read_u32()?;
                self.take(word_byte_len(word_count, record_offset)?)?;
                Ok(Record::IndirectBufferStart { word_count })
            }
            RecordTag::IndirectBufferEnd => Ok(Record::IndirectBufferEnd),
            RecordTag::PacketStart => {
                let base_address = self.read_u32()?;
                let word_count = self.read_u32()?;
                let payload = self.take(word_byte_len(word_count, record_offset)?)?;
                Ok(Record::PacketStart {
                    base_address,
                    word_count,
                    payload,
                })
            }
            RecordTag::PacketEnd => Ok(Record::PacketEnd),
            RecordTag::MemoryRead => {
                let base_address = self.read_u32()?;
                let length = self.read_u32()?;
                let full_length = self.read_u32()?;
                let payload = self.take(usize_len(length, record_offset)?)?;
                Ok(Record::MemoryRead {
                    base_address,
                    length,
                    full_length,
                    payload,
                })
            }
            RecordTag::MemoryWrite => {
                let base_address = self.read_u32()?;
                let length = self.read_u32()?;
                self.take(usize_len(length, record_offset)?)?;
                Ok(Record::MemoryWrite {
                    base_address,
                    length,
                })
            }
            RecordTag::Event => {
                let event_type = self.read_u32()?;
                Ok(Record::Event { event_type })
            }
        }
    }
}

fn usize_len(len: u32, offset: usize) -> Result<usize, TraceDecodeError> {
    usize::try_from(len).map_err(|_| TraceDecodeError::LengthOverflow { offset })
}

fn word_byte_len(word_count: u32, offset: usize) -> Result<usize, TraceDecodeError> {
    usize_len(word_count, offset)?
        .checked_mul(4)
        .ok_or(TraceDecodeError::LengthOverflow { offset })
}

/// Decompress a `MemoryRead` lz4 block payload into `dst`, requiring that it
/// expands to exactly `dst.len()` bytes.
pub fn decompress_into(src: &[u8], dst: &mut [u8]) -> Result<(), TraceDecodeError> {
    let produced = lz4_flex::block::decompress_into(src, dst)?;
    if produced != dst.len() {
        return Err(TraceDecodeError::DecompressedLenMismatch {
            expected: dst.len(),
            produced,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_bytes(build: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
        let mut buf = Vec::new();
        build(&mut buf);
        buf
    }

    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn decodes_packet_start_with_payload() {
        let buf = record_bytes(|b| {
            push_u32(b, RecordTag::PacketStart as u32);
            push_u32(b, 0x1000);
            push_u32(b, 2);
            push_u32(b, 0xAAAA_AAAA);
            push_u32(b, 0xBBBB_BBBB);
        });
        let mut cursor = TraceCursor::new(&buf);
        let record = cursor.decode_record().unwrap();
        assert_eq!(
            record,
            Record::PacketStart {
                base_address: 0x1000,
                word_count: 2,
                payload: &buf[12..20],
            }
        );
        assert!(cursor.is_empty());
    }

    #[test]
    fn decodes_header_only_records() {
        let buf = record_bytes(|b| {
            push_u32(b, RecordTag::PrimaryBufferEnd as u32);
            push_u32(b, RecordTag::IndirectBufferEnd as u32);
            push_u32(b, RecordTag::PacketEnd as u32);
            push_u32(b, RecordTag::Event as u32);
            push_u32(b, 7);
        });
        let mut cursor = TraceCursor::new(&buf);
        assert_eq!(cursor.decode_record().unwrap(), Record::PrimaryBufferEnd);
        assert_eq!(cursor.decode_record().unwrap(), Record::IndirectBufferEnd);
        assert_eq!(cursor.decode_record().unwrap(), Record::PacketEnd);
        assert_eq!(
            cursor.decode_record().unwrap(),
            Record::Event { event_type: 7 }
        );
        assert!(cursor.is_empty());
    }

    #[test]
    fn buffer_markers_skip_trailing_words() {
        let buf = record_bytes(|b| {
            push_u32(b, RecordTag::PrimaryBufferStart as u32);
            push_u32(b, 3);
            b.extend_from_slice(&[0u8; 12]);
            push_u32(b, RecordTag::Event as u32);
            push_u32(b, 1);
        });
        let mut cursor = TraceCursor::new(&buf);
        assert_eq!(
            cursor.decode_record().unwrap(),
            Record::PrimaryBufferStart { word_count: 3 }
        );
        // The skipped words must not be re-interpreted as records.
        assert_eq!(
            cursor.decode_record().unwrap(),
            Record::Event { event_type: 1 }
        );
    }

    #[test]
    fn unknown_tag_is_an_error_not_a_fallback() {
        let buf = record_bytes(|b| push_u32(b, 0xDEAD_BEEF));
        let mut cursor = TraceCursor::new(&buf);
        let err = cursor.decode_record().unwrap_err();
        assert!(matches!(
            err,
            TraceDecodeError::UnknownTag {
                tag: 0xDEAD_BEEF,
                offset: 0
            }
        ));
    }

    #[test]
    fn truncated_payload_reports_offset_and_need() {
        let buf = record_bytes(|b| {
            push_u32(b, RecordTag::MemoryRead as u32);
            push_u32(b, 0x2000);
            push_u32(b, 16); // length
            push_u32(b, 0); // full_length
            b.extend_from_slice(&[0u8; 8]); // only half the payload
        });
        let mut cursor = TraceCursor::new(&buf);
        let err = cursor.decode_record().unwrap_err();
        assert!(matches!(
            err,
            TraceDecodeError::Truncated {
                needed: 16,
                available: 8,
                ..
            }
        ));
    }

    #[test]
    fn truncated_header_is_an_error() {
        let buf = record_bytes(|b| {
            push_u32(b, RecordTag::PacketStart as u32);
            push_u32(b, 0x1000);
            // word_count field missing entirely
        });
        let mut cursor = TraceCursor::new(&buf);
        assert!(matches!(
            cursor.decode_record().unwrap_err(),
            TraceDecodeError::Truncated { .. }
        ));
    }

    #[test]
    fn decompress_into_roundtrips_and_checks_length() {
        let original: Vec<u8> = (0..64u8).collect();
        let compressed = lz4_flex::block::compress(&original);

        let mut dst = vec![0u8; 64];
        decompress_into(&compressed, &mut dst).unwrap();
        assert_eq!(dst, original);

        let mut wrong = vec![0u8; 128];
        let err = decompress_into(&compressed, &mut wrong).unwrap_err();
        assert!(matches!(
            err,
            TraceDecodeError::DecompressedLenMismatch {
                expected: 128,
                produced: 64
            }
        ));
    }
}
