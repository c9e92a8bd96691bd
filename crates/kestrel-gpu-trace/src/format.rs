//! Record tags and fixed header layout constants.
//!
//! Every record starts with a 4-byte tag, followed by a kind-specific fixed
//! header and an optional variable payload whose length is a header field.

/// Record kind tag. Serialized as a little-endian `u32` at the start of
/// every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RecordTag {
    PrimaryBufferStart = 0,
    PrimaryBufferEnd = 1,
    IndirectBufferStart = 2,
    IndirectBufferEnd = 3,
    PacketStart = 4,
    PacketEnd = 5,
    MemoryRead = 6,
    MemoryWrite = 7,
    Event = 8,
}

impl RecordTag {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(RecordTag::PrimaryBufferStart),
            1 => Some(RecordTag::PrimaryBufferEnd),
            2 => Some(RecordTag::IndirectBufferStart),
            3 => Some(RecordTag::IndirectBufferEnd),
            4 => Some(RecordTag::PacketStart),
            5 => Some(RecordTag::PacketEnd),
            6 => Some(RecordTag::MemoryRead),
            7 => Some(RecordTag::MemoryWrite),
            8 => Some(RecordTag::Event),
            _ => None,
        }
    }
}

/// `Event` record type marking presentation of a completed frame.
///
/// Unknown event types are decoded and ignored by playback; only unknown
/// *record* tags are a hard decode failure.
pub const EVENT_SWAP: u32 = 0;
