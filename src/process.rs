//! Per-process virtual memory state (`spec.md` §10, a supplemental module:
//! the original components are deliberately per-process data without a
//! struct tying them together, since `spec.md` treats "process" as an
//! external concept it only borrows fields from).
//!
//! Bundles the three pieces of state one user process owns outright — its
//! page directory handle, its supplemental page table, and its mmap
//! bookkeeping — and gives them a single, ordered teardown so callers cannot
//! accidentally destroy the SPT before writing back dirty mmap pages.

use std::sync::Arc;

use crate::mmap::MmapManager;
use crate::pagedir::PageDirectory;
use crate::spt::SupplementalPageTable;
use crate::vm::VmSystem;

pub struct VmProcess {
    pub pagedir: Arc<dyn PageDirectory>,
    pub spt: SupplementalPageTable,
    pub mmap_manager: MmapManager,
}

impl VmProcess {
    pub fn new(pagedir: Arc<dyn PageDirectory>) -> Self {
        VmProcess { pagedir, spt: SupplementalPageTable::new(), mmap_manager: MmapManager::new() }
    }

    /// Unmaps every live mapping (writing back dirty pages), then releases
    /// whatever frames and swap slots remain. The order matters: mmap
    /// writeback must happen before the address space itself goes away, or
    /// a dirty page's last contents are lost instead of reaching its file.
    pub fn teardown(mut self, vm: &VmSystem) {
        for id in self.mmap_manager.ids() {
            if let Err(e) = vm.munmap(&mut self, id) {
                log::warn!("process: munmap during teardown failed: {e}");
            }
        }
        vm.destroy_process(&mut self);
    }
}
