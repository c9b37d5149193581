//! The file-system collaborator.
//!
//! `spec.md` §1 treats the file system, buffer cache, and block drivers as
//! external, reached only through `open/read_at/write_at/length/close/
//! deny_write/reopen` (§6). [`FileObject`] is that seam. Production
//! implementations wrap a real VFS handle; [`crate::mocks::InMemoryFile`]
//! backs the unit and integration tests.

use std::sync::Arc;

use crate::error::VmResult;

/// A process-owned, reference-counted file handle. `reopen` must return an
/// independent handle with its own cursor/identity, immune to a later
/// `close` of the original (`spec.md` §4.F step 2) — this is why `mmap`
/// stores `Arc<dyn FileObject>` rather than cloning a raw descriptor.
pub trait FileObject: Send + Sync {
    /// Total length in bytes.
    fn length(&self) -> VmResult<u64>;

    /// Reads up to `buf.len()` bytes starting at `ofs`, returning the number
    /// actually read (short reads are not an error here; callers decide).
    fn read_at(&self, buf: &mut [u8], ofs: u64) -> VmResult<usize>;

    /// Writes `buf` at `ofs`, returning the number of bytes written.
    fn write_at(&self, buf: &[u8], ofs: u64) -> VmResult<usize>;

    /// Opens an independent handle to the same underlying file
    /// (`spec.md` §4.F: "mmap of the same file twice is allowed and
    /// independent (each reopen holds its own cursor)").
    fn reopen(&self) -> VmResult<Arc<dyn FileObject>>;

    /// Marks the file as non-writable at the file-system level. The VM core
    /// never calls this itself (mmap writes that fail are a file-system
    /// concern per §6 policy), but the trait carries it for completeness
    /// with the interface spec.md names.
    fn deny_write(&self) {}
}
