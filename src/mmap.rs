//! Memory-mapped files (`spec.md` §4.F, component F).
//!
//! `mmap` installs one `PteKind::File { is_mmap: true, writable: true, .. }`
//! SPT entry per page and defers the actual read to the ordinary fault path
//! (`fault::load_page`); `munmap` is the interesting half, since it has to
//! decide, per page, whether there is anything left to write back.
//!
//! Resolves the "does writeback need a temporary swapped-in frame" open
//! question from `spec.md` §9 by construction rather than by a special case:
//! [`crate::frame::FrameTable`]'s eviction path already writes a dirty mmap
//! page straight back to its file at the moment it is evicted (see
//! `writeback_and_clear`), so an mmap page is never demoted to swap. By the
//! time `munmap` runs, a non-resident mmap page's content is therefore
//! already persisted; `munmap` only has writeback work left to do for pages
//! still resident in a frame.

use std::collections::HashMap;
use std::sync::Arc;

use crate::addr::VPage;
use crate::config::PAGE_SIZE;
use crate::error::{VmError, VmResult};
use crate::file::FileObject;
use crate::frame::FrameTable;
use crate::pagedir::PageDirectory;
use crate::spt::{PteKind, SupplementalPageTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapId(u32);

struct MmapRecord {
    start: VPage,
    page_count: usize,
}

/// Tracks live mappings for one process, so `munmap` knows a mapping's
/// extent without re-deriving it from the file.
#[derive(Default)]
pub struct MmapManager {
    records: HashMap<MapId, MmapRecord>,
    next_id: u32,
}

impl MmapManager {
    pub fn new() -> Self {
        MmapManager::default()
    }

    /// Every still-live mapping, for process teardown (`spec.md` §4.C
    /// `destroy`, via [`crate::process::VmProcess::teardown`]).
    pub fn ids(&self) -> Vec<MapId> {
        self.records.keys().copied().collect()
    }

    /// Maps `file` starting at `addr`. `spec.md` §4.F: rejects a zero-length
    /// file, address zero, a region reaching past `user_space_top`, and any
    /// overlap with an existing mapping.
    pub fn mmap(
        &mut self,
        spt: &mut SupplementalPageTable,
        pagedir: &Arc<dyn PageDirectory>,
        file: &Arc<dyn FileObject>,
        addr: VPage,
        user_space_top: usize,
    ) -> VmResult<MapId> {
        if addr.addr() == 0 {
            return Err(VmError::MmapReject("cannot map at address 0"));
        }

        let length = file.length()?;
        if length == 0 {
            return Err(VmError::MmapReject("cannot map a zero-length file"));
        }

        let page_count = (length as usize).div_ceil(PAGE_SIZE);
        if addr.addr() + page_count * PAGE_SIZE > user_space_top {
            return Err(VmError::MmapReject("mapping would extend outside user space"));
        }
        for i in 0..page_count {
            if spt.get(addr.offset_up(i)).is_some() {
                return Err(VmError::MmapReject("overlaps an existing mapping"));
            }
        }

        // Independent handle (own cursor, own lifetime) per `spec.md` §4.F
        // step 2: mapping the same file twice must not alias state.
        let handle = file.reopen()?;

        for i in 0..page_count {
            let page = addr.offset_up(i);
            let ofs = (i * PAGE_SIZE) as u64;
            let read_bytes = ((length - ofs).min(PAGE_SIZE as u64)) as u32;
            let zero_bytes = PAGE_SIZE as u32 - read_bytes;
            spt.set_file(page, Arc::clone(pagedir), Arc::clone(&handle), ofs, read_bytes, zero_bytes, true, true)?;
        }

        let id = MapId(self.next_id);
        self.next_id += 1;
        self.records.insert(id, MmapRecord { start: addr, page_count });
        log::info!("mmap: id {} covers {page_count} page(s) at {addr}", id.0);
        Ok(id)
    }

    /// Tears down mapping `id`, writing back any still-resident dirty pages
    /// (`spec.md` §4.F `munmap`).
    pub fn munmap(&mut self, spt: &mut SupplementalPageTable, frame_table: &mut FrameTable, id: MapId) -> VmResult<()> {
        let record = self.records.remove(&id).ok_or(VmError::NotMapped(id.0 as usize))?;

        for i in 0..record.page_count {
            let upage = record.start.offset_up(i);
            let Some(entry) = spt.get(upage) else { continue };

            if let Some(frame) = entry.frame() {
                let dirty = entry.refresh_dirty();
                if dirty {
                    let (file, ofs, read_bytes) = entry.with_inner(|inner| match &inner.kind {
                        PteKind::File { file, ofs, read_bytes, .. } => (Arc::clone(file), *ofs, *read_bytes),
                        _ => unreachable!("mmap entry must carry PteKind::File"),
                    });
                    let bytes = frame_table.read_frame(frame);
                    file.write_at(&bytes[..read_bytes as usize], ofs)?;
                }
                frame_table.free_frame(frame);
            }

            spt.clear_page(upage);
        }

        log::info!("munmap: id {} released", id.0);
        Ok(())
    }
}
