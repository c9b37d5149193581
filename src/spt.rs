//! Supplemental page table (`spec.md` §4.C, component C).
//!
//! Per-process map from virtual page to content provenance. A frame and its
//! SPT entry naturally want to reference each other (the frame needs to know
//! who to write back to on eviction; the entry needs to know which frame it
//! occupies), which would be a reference cycle if both sides owned. Instead
//! the SPT entry owns the content descriptor via `Arc`, and the frame table
//! holds only a non-owning `Weak` back-reference: destroying the `Arc` (SPT
//! entry release) is what invalidates any frame record still pointing at it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::addr::{PhysFrame, VPage};
use crate::error::{VmError, VmResult};
use crate::file::FileObject;
use crate::pagedir::PageDirectory;

/// Discriminated provenance of a page's content (`spec.md` §3).
#[derive(Clone)]
pub enum PteKind {
    /// Materializes as all-zero bytes on first touch.
    Zero,
    /// Backed by a file region. `read_bytes < PAGE_SIZE` means the trailing
    /// `zero_bytes` are synthesized, not read.
    File {
        file: Arc<dyn FileObject>,
        ofs: u64,
        read_bytes: u32,
        zero_bytes: u32,
        writable: bool,
        is_mmap: bool,
    },
    /// Resident in swap slot `slot`.
    Swap { slot: crate::swap::SwapSlot },
}

impl std::fmt::Debug for PteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PteKind::Zero => write!(f, "Zero"),
            PteKind::File { ofs, read_bytes, zero_bytes, writable, is_mmap, .. } => f
                .debug_struct("File")
                .field("ofs", ofs)
                .field("read_bytes", read_bytes)
                .field("zero_bytes", zero_bytes)
                .field("writable", writable)
                .field("is_mmap", is_mmap)
                .finish(),
            PteKind::Swap { slot } => f.debug_struct("Swap").field("slot", slot).finish(),
        }
    }
}

/// Shared fields plus provenance, guarded so the frame table's eviction path
/// can mutate it under the frame lock while the owning process holds the
/// `Arc`.
pub struct PteInner {
    pub upage: VPage,
    pub pagedir: Arc<dyn PageDirectory>,
    pub frame: Option<PhysFrame>,
    /// Dirty bit persisted across evictions (the union of hardware dirty
    /// bits folded in by `refresh_dirty`, per §4.C).
    pub dirty: bool,
    pub kind: PteKind,
}

/// A handle to one virtual page's SPT entry. Cloning shares the same
/// underlying page (used when the frame table stores a `Weak` tenant
/// reference); `spec.md`'s "collisions are a programming error" means each
/// [`VPage`] maps to exactly one live `SptEntry`.
#[derive(Clone)]
pub struct SptEntry(pub(crate) Arc<Mutex<PteInner>>);

impl SptEntry {
    fn new(inner: PteInner) -> Self {
        SptEntry(Arc::new(Mutex::new(inner)))
    }

    pub fn upage(&self) -> VPage {
        self.0.lock().unwrap().upage
    }

    pub fn is_resident(&self) -> bool {
        self.0.lock().unwrap().frame.is_some()
    }

    pub fn frame(&self) -> Option<PhysFrame> {
        self.0.lock().unwrap().frame
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<Mutex<PteInner>> {
        Arc::downgrade(&self.0)
    }

    pub fn with_inner<R>(&self, f: impl FnOnce(&PteInner) -> R) -> R {
        f(&self.0.lock().unwrap())
    }

    pub fn with_inner_mut<R>(&self, f: impl FnOnce(&mut PteInner) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }

    /// Folds the hardware dirty bit (user alias) into the persisted dirty
    /// flag and returns the accumulated value (`spec.md` §4.C
    /// `refresh_dirty`). The "kernel alias" half of the union that §4.C and
    /// §5 describe is the page-directory implementation's concern when it
    /// tracks a separate kernel mapping; this crate only owns the user-alias
    /// side of that union, which is all the trait in `pagedir.rs` exposes.
    pub fn refresh_dirty(&self) -> bool {
        let mut inner = self.0.lock().unwrap();
        let hw_dirty = inner.pagedir.is_dirty(inner.upage);
        inner.dirty |= hw_dirty;
        inner.dirty
    }
}

/// Per-process map from virtual page to [`SptEntry`].
#[derive(Default)]
pub struct SupplementalPageTable {
    entries: HashMap<VPage, SptEntry>,
}

impl SupplementalPageTable {
    pub fn new() -> Self {
        SupplementalPageTable::default()
    }

    fn insert(&mut self, upage: VPage, entry: SptEntry) -> VmResult<SptEntry> {
        if self.entries.contains_key(&upage) {
            return Err(VmError::AlreadyMapped(upage.addr()));
        }
        self.entries.insert(upage, entry.clone());
        Ok(entry)
    }

    pub fn set_zero(&mut self, upage: VPage, pagedir: Arc<dyn PageDirectory>) -> VmResult<SptEntry> {
        self.insert(
            upage,
            SptEntry::new(PteInner { upage, pagedir, frame: None, dirty: false, kind: PteKind::Zero }),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_file(
        &mut self,
        upage: VPage,
        pagedir: Arc<dyn PageDirectory>,
        file: Arc<dyn FileObject>,
        ofs: u64,
        read_bytes: u32,
        zero_bytes: u32,
        writable: bool,
        is_mmap: bool,
    ) -> VmResult<SptEntry> {
        self.insert(
            upage,
            SptEntry::new(PteInner {
                upage,
                pagedir,
                frame: None,
                dirty: false,
                kind: PteKind::File { file, ofs, read_bytes, zero_bytes, writable, is_mmap },
            }),
        )
    }

    pub fn get(&self, upage: VPage) -> Option<SptEntry> {
        self.entries.get(&upage).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resident_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_resident()).count()
    }

    /// Clears the hardware mapping for `upage` and releases the SPT entry,
    /// as `spec.md` §4.C describes; a no-op if already absent. Used by
    /// `munmap` and process teardown, not by eviction (which keeps the
    /// entry, just non-resident).
    pub fn clear_page(&mut self, upage: VPage) {
        if let Some(entry) = self.entries.remove(&upage) {
            entry.with_inner(|inner| inner.pagedir.clear(inner.upage));
        }
    }

    /// Removes and returns every entry, in insertion-independent order, for
    /// `destroy()` (§4.C) to release frame-table/swap resources against.
    pub fn drain(&mut self) -> Vec<SptEntry> {
        self.entries.drain().map(|(_, e)| e).collect()
    }
}
