//! System-wide virtual memory state (`spec.md` §5).
//!
//! [`VmSystem`] owns the two pieces of state genuinely shared across
//! processes — the frame table and the swap device — behind the lock order
//! `spec.md` §5 mandates: **file lock, then frame-table lock, then swap
//! lock**. A [`crate::file::FileObject`] implementation owns its own file
//! lock internally (outside this crate); the two locks this module actually
//! takes are always acquired frame-table-then-swap, never the reverse, which
//! is enough to rule out the classic inverted-lock-order deadlock between a
//! faulting thread and the eviction path it can trigger.

use std::sync::{Arc, Mutex};

use crate::addr::VPage;
use crate::blockdevice::BlockDevice;
use crate::config::{VmConfig, FRAME_POOL_BASE};
use crate::error::VmResult;
use crate::file::FileObject;
use crate::frame::FrameTable;
use crate::mmap::MapId;
use crate::process::VmProcess;
use crate::spt::PteKind;
use crate::swap::SwapAllocator;

pub struct VmSystem {
    config: VmConfig,
    frame_table: Mutex<FrameTable>,
    swap: Mutex<SwapAllocator>,
}

impl VmSystem {
    pub fn new(config: VmConfig, frame_capacity: usize, swap_device: Box<dyn BlockDevice>) -> Self {
        log::info!("vm: {frame_capacity} frames, policy {:?}", config.replacement_policy);
        VmSystem {
            frame_table: Mutex::new(FrameTable::new(frame_capacity, FRAME_POOL_BASE, config.replacement_policy)),
            swap: Mutex::new(SwapAllocator::init(swap_device)),
            config,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn free_frames(&self) -> usize {
        self.frame_table.lock().unwrap().free_count()
    }

    /// Reads back the bytes currently resident in `frame`. Exposed for
    /// callers (tests, the demo binary) that already know a page is
    /// resident and want to inspect it; the fault and eviction paths reach
    /// the frame table directly and never need this.
    pub fn read_frame(&self, frame: crate::addr::PhysFrame) -> [u8; crate::config::PAGE_SIZE] {
        self.frame_table.lock().unwrap().read_frame(frame)
    }

    /// Overwrites the bytes currently resident in `frame`, simulating a
    /// write through an installed mapping. For tests and the demo binary;
    /// real writes happen through the page directory's hardware mapping,
    /// invisible to this crate until the next dirty-bit check.
    pub fn write_frame(&self, frame: crate::addr::PhysFrame, bytes: &[u8]) {
        self.frame_table.lock().unwrap().write_frame(frame, bytes);
    }

    /// Resolves a page fault for `proc` (`spec.md` §4.D), taking the frame
    /// table and swap locks in that order.
    pub fn page_fault(&self, proc: &mut VmProcess, fault_addr: usize, write: bool, user: bool, esp: usize) -> VmResult<()> {
        let mut frame_table = self.frame_table.lock().unwrap();
        let mut swap = self.swap.lock().unwrap();
        crate::fault::resolve_fault(
            &mut proc.spt,
            &mut frame_table,
            &mut swap,
            &proc.pagedir,
            fault_addr,
            write,
            user,
            esp,
            &self.config,
        )
    }

    /// Maps `file` into `proc` at `addr` (`spec.md` §4.F `mmap`). No frame
    /// or swap lock needed: nothing becomes resident until the first fault.
    pub fn mmap(&self, proc: &mut VmProcess, file: &Arc<dyn FileObject>, addr: VPage) -> VmResult<MapId> {
        proc.mmap_manager.mmap(&mut proc.spt, &proc.pagedir, file, addr, self.config.phys_base)
    }

    pub fn munmap(&self, proc: &mut VmProcess, id: MapId) -> VmResult<()> {
        let mut frame_table = self.frame_table.lock().unwrap();
        proc.mmap_manager.munmap(&mut proc.spt, &mut frame_table, id)
    }

    /// Releases every frame and swap slot `proc`'s SPT still owns
    /// (`spec.md` §4.C `destroy`). Mapped regions must already have been
    /// unmapped by the caller (`VmProcess::teardown` does this in order).
    pub fn destroy_process(&self, proc: &mut VmProcess) {
        let mut frame_table = self.frame_table.lock().unwrap();
        let mut swap = self.swap.lock().unwrap();
        for entry in proc.spt.drain() {
            entry.with_inner(|inner| {
                if let Some(frame) = inner.frame {
                    frame_table.free_frame(frame);
                }
                if let PteKind::Swap { slot } = inner.kind {
                    swap.free(slot);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReplacementPolicy, SECTORS_PER_PAGE};
    use crate::mocks::{RamDisk, SimPageDirectory};

    fn system(capacity: usize) -> VmSystem {
        VmSystem::new(VmConfig::new(), capacity, Box::new(RamDisk::new(8 * SECTORS_PER_PAGE)))
    }

    #[test]
    fn page_fault_then_destroy_returns_frame_to_pool() {
        let vm = system(2);
        let mut proc = VmProcess::new(Arc::new(SimPageDirectory::new()));
        let esp = vm.config().phys_base - 0x1000;
        vm.page_fault(&mut proc, esp - 4, true, true, esp).unwrap();
        assert_eq!(vm.free_frames(), 1);
        vm.destroy_process(&mut proc);
        assert_eq!(vm.free_frames(), 2);
    }
}
