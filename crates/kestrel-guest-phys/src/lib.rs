//! Guest physical memory backing for trace playback.
//!
//! Playback rewrites guest physical memory wholesale, so the entire guest
//! physical range is reserved and committed once, up front, as an explicit
//! initialization step; replay then writes through it for the engine's
//! lifetime. Addresses are `u32` (the virtual GPU's physical address width)
//! and every range is checked with overflow-safe arithmetic before any byte
//! moves.

#![forbid(unsafe_code)]

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuestPhysError {
    /// The one-time reservation could not be committed. Fatal to engine
    /// construction.
    #[error("guest physical reservation of {size} bytes failed")]
    ReservationFailed { size: u64 },

    #[error("guest physical access out of range: paddr={paddr:#x} len={len:#x} size={size:#x}")]
    OutOfRange { paddr: u32, len: usize, size: u64 },
}

pub type GuestPhysResult<T> = Result<T, GuestPhysError>;

/// A single fixed, committed guest physical memory reservation.
#[derive(Debug)]
pub struct GuestPhys {
    ram: Vec<u8>,
}

impl GuestPhys {
    /// Reserve and commit the full guest physical range, zero-filled.
    ///
    /// This is the documented one-time initialization precondition of
    /// playback, not an implicit side effect: callers decide the size and
    /// own the failure.
    pub fn reserve(size: u64) -> GuestPhysResult<Self> {
        let len = usize::try_from(size).map_err(|_| GuestPhysError::ReservationFailed { size })?;
        if len == 0 {
            return Err(GuestPhysError::ReservationFailed { size });
        }
        let mut ram = Vec::new();
        ram.try_reserve_exact(len)
            .map_err(|_| GuestPhysError::ReservationFailed { size })?;
        ram.resize(len, 0);
        Ok(Self { ram })
    }

    pub fn size(&self) -> u64 {
        self.ram.len() as u64
    }

    fn range(&self, paddr: u32, len: usize) -> GuestPhysResult<core::ops::Range<usize>> {
        let start = paddr as usize;
        let end = start.checked_add(len).ok_or(GuestPhysError::OutOfRange {
            paddr,
            len,
            size: self.size(),
        })?;
        if end > self.ram.len() {
            return Err(GuestPhysError::OutOfRange {
                paddr,
                len,
                size: self.size(),
            });
        }
        Ok(start..end)
    }

    /// Translate a guest physical range to a host-readable window.
    pub fn translate(&self, paddr: u32, len: usize) -> GuestPhysResult<&[u8]> {
        let range = self.range(paddr, len)?;
        Ok(&self.ram[range])
    }

    /// Translate a guest physical range to a host-writable window.
    pub fn translate_mut(&mut self, paddr: u32, len: usize) -> GuestPhysResult<&mut [u8]> {
        let range = self.range(paddr, len)?;
        Ok(&mut self.ram[range])
    }

    pub fn read_into(&self, paddr: u32, dst: &mut [u8]) -> GuestPhysResult<()> {
        dst.copy_from_slice(self.translate(paddr, dst.len())?);
        Ok(())
    }

    pub fn write_from(&mut self, paddr: u32, src: &[u8]) -> GuestPhysResult<()> {
        self.translate_mut(paddr, src.len())?.copy_from_slice(src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_commits_zeroed_ram() {
        let mem = GuestPhys::reserve(0x1000).unwrap();
        assert_eq!(mem.size(), 0x1000);
        assert_eq!(mem.translate(0, 0x1000).unwrap(), &[0u8; 0x1000][..]);
    }

    #[test]
    fn zero_size_reservation_fails() {
        assert_eq!(
            GuestPhys::reserve(0).unwrap_err(),
            GuestPhysError::ReservationFailed { size: 0 }
        );
    }

    #[test]
    fn write_then_read_roundtrips() {
        let mut mem = GuestPhys::reserve(0x100).unwrap();
        mem.write_from(0x10, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 4];
        mem.read_into(0x10, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        // Neighbouring bytes stay untouched.
        assert_eq!(mem.translate(0x0F, 1).unwrap(), &[0]);
        assert_eq!(mem.translate(0x14, 1).unwrap(), &[0]);
    }

    #[test]
    fn rejects_ranges_escaping_the_reservation() {
        let mut mem = GuestPhys::reserve(0x100).unwrap();
        let err = mem.write_from(0xFE, &[0; 4]).unwrap_err();
        assert!(matches!(
            err,
            GuestPhysError::OutOfRange {
                paddr: 0xFE,
                len: 4,
                size: 0x100
            }
        ));
    }

    #[test]
    fn rejects_address_arithmetic_overflow() {
        let mem = GuestPhys::reserve(0x100).unwrap();
        assert!(matches!(
            mem.translate(u32::MAX, usize::MAX).unwrap_err(),
            GuestPhysError::OutOfRange { .. }
        ));
    }

    #[test]
    fn empty_ranges_at_the_end_are_valid() {
        let mem = GuestPhys::reserve(0x100).unwrap();
        assert_eq!(mem.translate(0x100, 0).unwrap(), &[] as &[u8]);
    }
}
