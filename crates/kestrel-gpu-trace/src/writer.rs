//! Append-only record writer.
//!
//! Mirrors the decoder one push function per record kind so tooling and
//! tests can assemble trace byte streams. This is not a capture pipeline;
//! it only serializes records that are handed to it.

use crate::format::RecordTag;

#[derive(Debug, Default)]
pub struct TraceWriter {
    buf: Vec<u8>,
}

impl TraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length of the serialized stream. Frame/command index offsets
    /// are taken from here while a trace is being assembled.
    pub fn offset(&self) -> usize {
        self.buf.len()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn primary_buffer_start(&mut self, words: &[u32]) {
        self.tag(RecordTag::PrimaryBufferStart);
        self.words(words);
    }

    pub fn primary_buffer_end(&mut self) {
        self.tag(RecordTag::PrimaryBufferEnd);
    }

    pub fn indirect_buffer_start(&mut self, words: &[u32]) {
        self.tag(RecordTag::IndirectBufferStart);
        self.words(words);
    }

    pub fn indirect_buffer_end(&mut self) {
        self.tag(RecordTag::IndirectBufferEnd);
    }

    pub fn packet_start(&mut self, base_address: u32, words: &[u32]) {
        self.tag(RecordTag::PacketStart);
        self.u32(base_address);
        self.words(words);
    }

    pub fn packet_end(&mut self) {
        self.tag(RecordTag::PacketEnd);
    }

    /// Captured memory content stored uncompressed (`full_length = 0`).
    pub fn memory_read_raw(&mut self, base_address: u32, bytes: &[u8]) {
        self.tag(RecordTag::MemoryRead);
        self.u32(base_address);
        self.u32(bytes.len() as u32);
        self.u32(0);
        self.buf.extend_from_slice(bytes);
    }

    /// Captured memory content stored as an lz4 block; `full_length` records
    /// the uncompressed size playback must reproduce.
    pub fn memory_read_compressed(&mut self, base_address: u32, bytes: &[u8]) {
        let compressed = lz4_flex::block::compress(bytes);
        self.tag(RecordTag::MemoryRead);
        self.u32(base_address);
        self.u32(compressed.len() as u32);
        self.u32(bytes.len() as u32);
        self.buf.extend_from_slice(&compressed);
    }

    pub fn memory_write(&mut self, base_address: u32, bytes: &[u8]) {
        self.tag(RecordTag::MemoryWrite);
        self.u32(base_address);
        self.u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn event(&mut self, event_type: u32) {
        self.tag(RecordTag::Event);
        self.u32(event_type);
    }

    fn tag(&mut self, tag: RecordTag) {
        self.u32(tag as u32);
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn words(&mut self, words: &[u32]) {
        self.u32(words.len() as u32);
        for &word in words {
            self.u32(word);
        }
    }
}
