//! Swap slot allocator (`spec.md` §4.A, component A).
//!
//! A fixed-size bitmap over a [`BlockDevice`] partitioned into page-sized
//! slots, convention `bit = free`. Finding a free slot is a word-at-a-time
//! scan using `trailing_zeros` to jump straight to the first free bit
//! instead of testing one bit at a time. The bitmap is a plain `Vec<u64>`
//! with no interior synchronization of its own: every caller already holds
//! the swap lock on [`crate::vm::VmSystem`] before touching it, so a second
//! layer of locking here would just be redundant.

use crate::blockdevice::BlockDevice;
use crate::config::{PAGE_SIZE, SECTORS_PER_PAGE, SECTOR_SIZE};
use crate::error::{VmError, VmResult};

/// Index of a page-sized region of the swap device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(u64);

impl SwapSlot {
    pub fn index(self) -> u64 {
        self.0
    }
}

pub struct SwapAllocator {
    device: Box<dyn BlockDevice>,
    /// One bit per slot; `1` means free. Word `i` covers slots `[64i, 64i+64)`.
    bitmap: Vec<u64>,
    num_slots: usize,
}

impl SwapAllocator {
    /// Acquires the backing device, sizes the bitmap, and marks every slot
    /// free (`spec.md` §4.A `init()`). Panics if the device reports zero
    /// sectors, matching the spec's "Panics if the device is absent".
    pub fn init(device: Box<dyn BlockDevice>) -> Self {
        let total_sectors = device.num_sectors();
        assert!(total_sectors > 0, "swap: backing device is absent (0 sectors)");

        let num_slots = (total_sectors as usize * SECTOR_SIZE) / PAGE_SIZE;
        let words = num_slots.div_ceil(64);
        let bitmap = vec![u64::MAX; words];

        log::info!("swap: initialized with {num_slots} slots ({} KiB)", num_slots * PAGE_SIZE / 1024);
        SwapAllocator { device, bitmap, num_slots }
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    fn mark(&mut self, slot: usize, free: bool) {
        let word = slot / 64;
        let bit = slot % 64;
        if free {
            self.bitmap[word] |= 1 << bit;
        } else {
            self.bitmap[word] &= !(1 << bit);
        }
    }

    fn is_free(&self, slot: usize) -> bool {
        (self.bitmap[slot / 64] >> (slot % 64)) & 1 == 1
    }

    fn find_free_slot(&self) -> Option<usize> {
        for (word_idx, &word) in self.bitmap.iter().enumerate() {
            if word == 0 {
                continue;
            }
            let bit = word.trailing_zeros() as usize;
            let slot = word_idx * 64 + bit;
            if slot < self.num_slots {
                return Some(slot);
            }
        }
        None
    }

    /// Writes `page` to a freshly allocated slot. `spec.md`: "scan for a
    /// free slot, mark occupied, write page contents... Returns ERROR when
    /// the bitmap is full."
    pub fn swap_out(&mut self, page: &[u8; PAGE_SIZE]) -> VmResult<SwapSlot> {
        let slot = self.find_free_slot().ok_or(VmError::OutOfFrames)?;
        self.mark(slot, false);

        let start_sector = slot as u64 * SECTORS_PER_PAGE as u64;
        if let Err(e) = self.device.write_sectors(start_sector, page) {
            self.mark(slot, true);
            return Err(e);
        }

        log::debug!("swap: wrote page to slot {slot}");
        Ok(SwapSlot(slot as u64))
    }

    /// Reads `slot` into `out` and frees it. `spec.md`: "Invalid or empty
    /// slot -> false (no side effect)."
    pub fn swap_in(&mut self, slot: SwapSlot, out: &mut [u8; PAGE_SIZE]) -> bool {
        let idx = slot.0 as usize;
        if idx >= self.num_slots || self.is_free(idx) {
            return false;
        }

        let start_sector = slot.0 * SECTORS_PER_PAGE as u64;
        if self.device.read_sectors(start_sector, out).is_err() {
            return false;
        }

        self.mark(idx, true);
        log::debug!("swap: read back slot {idx}, freed");
        true
    }

    /// Marks `slot` free without touching the device (`spec.md`: "marks
    /// slot free without I/O").
    pub fn free(&mut self, slot: SwapSlot) {
        let idx = slot.0 as usize;
        if idx < self.num_slots {
            self.mark(idx, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RamDisk;

    fn alloc(num_pages: usize) -> SwapAllocator {
        SwapAllocator::init(Box::new(RamDisk::new(num_pages * SECTORS_PER_PAGE)))
    }

    #[test]
    fn round_trip_preserves_bytes_and_frees_slot() {
        let mut sa = alloc(4);
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 0xAB;
        page[PAGE_SIZE - 1] = 0xCD;

        let slot = sa.swap_out(&page).unwrap();
        assert!(!sa.is_free(slot.index() as usize));

        let mut back = [0u8; PAGE_SIZE];
        assert!(sa.swap_in(slot, &mut back));
        assert_eq!(page, back);
        assert!(sa.is_free(slot.index() as usize));
    }

    #[test]
    fn swap_in_invalid_slot_is_false_and_side_effect_free() {
        let mut sa = alloc(2);
        let mut buf = [0u8; PAGE_SIZE];
        assert!(!sa.swap_in(SwapSlot(99), &mut buf));
        assert!(!sa.swap_in(SwapSlot(0), &mut buf)); // never written, still free
    }

    #[test]
    fn bitmap_full_returns_out_of_frames() {
        let mut sa = alloc(2);
        let page = [0u8; PAGE_SIZE];
        sa.swap_out(&page).unwrap();
        sa.swap_out(&page).unwrap();
        assert!(matches!(sa.swap_out(&page), Err(VmError::OutOfFrames)));
    }

    #[test]
    fn free_without_io_marks_slot_available() {
        let mut sa = alloc(2);
        let page = [0u8; PAGE_SIZE];
        let slot = sa.swap_out(&page).unwrap();
        sa.free(slot);
        assert!(sa.is_free(slot.index() as usize));
    }
}
