//! Page-fault resolution (`spec.md` §4.D, component D).
//!
//! The one function every other module exists to serve: given a faulting
//! address, decide whether it is a legitimate demand-paging request, a
//! stack-growth request, or a genuine access violation, and if legitimate,
//! bring the page in. The decision of *whether* to grow the stack lives in
//! `stack.rs`; the mechanism of actually materializing a page lives in
//! `frame.rs`/`swap.rs`. This module is just the dispatcher between them.

use std::sync::Arc;

use crate::addr::VPage;
use crate::config::{VmConfig, PAGE_SIZE};
use crate::error::{VmError, VmResult};
use crate::frame::FrameTable;
use crate::pagedir::PageDirectory;
use crate::spt::{PteKind, SptEntry, SupplementalPageTable};
use crate::stack;
use crate::swap::SwapAllocator;

/// Brings `fault_addr` into residency, growing the stack or faulting fatally
/// as appropriate (`spec.md` §4.D).
///
/// Lock ordering is the caller's responsibility (`spec.md` §5): `spt`,
/// `frame_table`, and `swap` must already be held in that order by the time
/// this is called, which is exactly what [`crate::vm::VmSystem::page_fault`]
/// arranges.
#[allow(clippy::too_many_arguments)]
pub fn resolve_fault(
    spt: &mut SupplementalPageTable,
    frame_table: &mut FrameTable,
    swap: &mut SwapAllocator,
    pagedir: &Arc<dyn PageDirectory>,
    fault_addr: usize,
    write: bool,
    user: bool,
    esp: usize,
    config: &VmConfig,
) -> VmResult<()> {
    if !user {
        return Err(VmError::BadAccess { addr: fault_addr, reason: "fault from kernel mode" });
    }

    let upage = VPage::containing(fault_addr);

    let entry = match spt.get(upage) {
        Some(entry) => entry,
        None => {
            if !stack::should_grow_stack(fault_addr, esp, config) {
                return Err(VmError::BadAccess { addr: fault_addr, reason: "no mapping and not a stack-growth candidate" });
            }
            log::debug!("fault: growing stack to {}", stack::growth_page(fault_addr));
            spt.set_zero(stack::growth_page(fault_addr), Arc::clone(pagedir))?
        }
    };

    if entry.is_resident() {
        // Already mapped; a second fault here under `write` means the page
        // was genuinely read-only (write to a non-writable FILE segment is
        // the fatal case `spec.md` §4.D names explicitly).
        let writable = entry.with_inner(|inner| match &inner.kind {
            PteKind::File { writable, .. } => *writable,
            PteKind::Zero | PteKind::Swap { .. } => true,
        });
        return if write && !writable {
            Err(VmError::BadAccess { addr: fault_addr, reason: "write to read-only page" })
        } else {
            Ok(())
        };
    }

    load_page(&entry, frame_table, swap, pagedir)
}

/// Materializes `entry`'s content into a fresh frame and installs the
/// hardware mapping. Shared by the fault path and any other caller that
/// needs a page resident. Refuses an entry that is already resident: that
/// indicates a re-entrant or stale fault, and allocating a second frame for
/// it would leak the one the entry already owns.
pub fn load_page(
    entry: &SptEntry,
    frame_table: &mut FrameTable,
    swap: &mut SwapAllocator,
    pagedir: &Arc<dyn PageDirectory>,
) -> VmResult<()> {
    if entry.is_resident() {
        let upage = entry.upage();
        return Err(VmError::BadAccess { addr: upage.addr(), reason: "load_page called on an already-resident page" });
    }

    let frame = frame_table.frame_alloc(entry, swap)?;

    let (upage, writable) = entry.with_inner(|inner| {
        let writable = match &inner.kind {
            PteKind::File { writable, .. } => *writable,
            PteKind::Zero | PteKind::Swap { .. } => true,
        };
        (inner.upage, writable)
    });

    let kind_snapshot = entry.with_inner(|inner| inner.kind.clone());
    match kind_snapshot {
        PteKind::Zero => {
            frame_table.write_frame(frame, &[0u8; PAGE_SIZE]);
        }
        PteKind::File { file, ofs, read_bytes, .. } => {
            let mut buf = vec![0u8; PAGE_SIZE];
            let n = file.read_at(&mut buf[..read_bytes as usize], ofs)?;
            if n < read_bytes as usize {
                // Short read past EOF: the remainder of `read_bytes` is
                // zero, same as `zero_bytes`.
                buf[n..read_bytes as usize].fill(0);
            }
            frame_table.write_frame(frame, &buf);
        }
        PteKind::Swap { slot } => {
            let mut buf = [0u8; PAGE_SIZE];
            if !swap.swap_in(slot, &mut buf) {
                frame_table.free_frame(frame);
                return Err(VmError::BadAccess { addr: upage.addr(), reason: "swap slot unreadable" });
            }
            frame_table.write_frame(frame, &buf);
        }
    }

    if !pagedir.install(upage, frame, writable) {
        frame_table.free_frame(frame);
        return Err(VmError::OutOfFrames);
    }

    entry.with_inner_mut(|inner| {
        inner.frame = Some(frame);
        inner.dirty = false;
    });

    log::trace!("fault: resolved {upage} -> {frame}");
    Ok(())
}
