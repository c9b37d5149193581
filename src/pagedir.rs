//! The hardware page-directory collaborator.
//!
//! The VM core never talks to the MMU directly; it only calls
//! `install`/`clear`/`is_dirty`/`set_dirty`/`is_accessed`/`set_accessed`
//! through this trait, so there is no real hardware backing it in this
//! crate. [`PageDirectory`] is the seam; `mocks::SimPageDirectory` provides a
//! software implementation for tests and the demo binary.

use crate::addr::{PhysFrame, VPage};

/// One process's hardware address-space handle. Implementations back this
/// with whatever the real MMU driver needs; the VM core only ever calls the
/// methods below, in the ordering `spec.md` §5 documents.
pub trait PageDirectory: Send + Sync {
    /// Installs `upage -> kpage` with the given writability. Returns `false`
    /// if the underlying allocator could not find room for a new page-table
    /// page (a distinct failure from running out of user frames).
    fn install(&self, upage: VPage, kpage: PhysFrame, writable: bool) -> bool;

    /// Clears the mapping for `upage`, if any. No-op if unmapped.
    fn clear(&self, upage: VPage);

    /// Hardware dirty bit for the *user* virtual alias.
    fn is_dirty(&self, upage: VPage) -> bool;

    fn set_dirty(&self, upage: VPage, value: bool);

    /// Hardware accessed bit, consulted by the clock sweep (§4.B).
    fn is_accessed(&self, upage: VPage) -> bool;

    fn set_accessed(&self, upage: VPage, value: bool);

    /// Whether `upage` currently has a present mapping at all.
    fn is_present(&self, upage: VPage) -> bool;

    /// Switches the CPU's active address space to this one. Exercised only
    /// by process lifecycle, not by the fault/eviction paths.
    fn activate(&self) {}
}
