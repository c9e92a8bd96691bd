//! The record-by-record decode/apply loop.
//!
//! Runs on the executor thread against one assigned byte range. Guest
//! memory mutations and packet executions happen here and nowhere else.

use kestrel_gpu_trace::{decompress_into, Record, TraceCursor, TraceDecodeError, EVENT_SWAP};
use kestrel_guest_phys::GuestPhysError;

use crate::executor::{GpuContext, PacketError, SwapMode};
use crate::player::ReplayConfig;

/// How a replay range terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Decode the whole range, then present final state.
    UntilEnd,
    /// Stop at the first swap event; remaining bytes stay undecoded and the
    /// swap mode stays suppressed.
    BreakOnSwap,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("trace decode failed: {0}")]
    Decode(#[from] TraceDecodeError),

    #[error("guest memory access failed: {0}")]
    GuestPhys(#[from] GuestPhysError),

    #[error("packet execution failed: {0}")]
    Packet(#[from] PacketError),

    #[error("replay task panicked in the packet executor")]
    TaskPanicked,
}

/// The most recent unmatched `PacketStart`; at most one is in flight.
#[derive(Debug, Clone, Copy)]
struct PendingPacket {
    base_address: u32,
    word_count: u32,
}

/// Decode and apply `data`, a byte range assigned by the seek logic.
///
/// On error, decoding stops at the failing record; mutations already
/// applied stand (partial application is an accepted outcome, the same as
/// the break-on-swap partial frame). The pending packet is either executed
/// or dropped with the aborted range, never carried across tasks.
pub(crate) fn replay_range(
    ctx: &mut GpuContext,
    data: &[u8],
    mode: PlaybackMode,
    config: &ReplayConfig,
) -> Result<(), ReplayError> {
    ctx.set_swap_mode(SwapMode::Ignored);

    let mut cursor = TraceCursor::new(data);
    let mut pending_packet: Option<PendingPacket> = None;
    while !cursor.is_empty() {
        match cursor.decode_record()? {
            Record::PrimaryBufferStart { .. }
            | Record::PrimaryBufferEnd
            | Record::IndirectBufferStart { .. }
            | Record::IndirectBufferEnd => {}
            Record::PacketStart {
                base_address,
                word_count,
                payload,
            } => {
                ctx.mem_mut().write_from(base_address, payload)?;
                pending_packet = Some(PendingPacket {
                    base_address,
                    word_count,
                });
            }
            Record::PacketEnd => {
                if let Some(packet) = pending_packet.take() {
                    ctx.execute_packet(packet.base_address, packet.word_count)?;
                }
            }
            Record::MemoryRead {
                base_address,
                full_length,
                payload,
                ..
            } => {
                if full_length == 0 {
                    ctx.mem_mut().write_from(base_address, payload)?;
                } else {
                    let dst = ctx
                        .mem_mut()
                        .translate_mut(base_address, full_length as usize)?;
                    decompress_into(payload, dst)?;
                }
            }
            // Write-direction traffic is not replayed; see DESIGN.md.
            Record::MemoryWrite { .. } => {}
            Record::Event { event_type } => {
                if event_type == EVENT_SWAP && mode == PlaybackMode::BreakOnSwap {
                    // Finish the packet in flight, then stop mid-range. The
                    // swap mode deliberately stays suppressed; only natural
                    // exhaustion below presents state.
                    if let Some(packet) = pending_packet.take() {
                        ctx.execute_packet(packet.base_address, packet.word_count)?;
                    }
                    return Ok(());
                }
            }
        }
    }

    ctx.set_swap_mode(SwapMode::Normal);
    ctx.issue_swap(config.swap_surface_id, config.swap_width, config.swap_height);
    Ok(())
}
