//! Crate-wide error type.
//!
//! One enum for everything fallible in this crate, derived with `thiserror`
//! so each variant carries its own `Display` message instead of callers
//! having to format one. The fault-path variants (`OutOfFrames`,
//! `BadAccess`, `IoFailure`) are kept separate from the structural bookkeeping
//! variants (`AlreadyMapped`, `NotMapped`, `OutOfBounds`) that the
//! supplemental page table and frame table raise on programmer error.

use thiserror::Error;

/// Errors produced by the VM core. See `spec.md` §7 for the kind taxonomy.
#[derive(Debug, Error)]
pub enum VmError {
    /// Physical frames and swap slots are both exhausted. Fatal to the
    /// faulting process; never propagates across processes (§7).
    #[error("out of frames: physical pool and swap are both exhausted")]
    OutOfFrames,

    /// A fault at an address with no SPT entry that does not qualify for
    /// stack growth, or a write to a read-only mapping (§7).
    #[error("bad access at {addr:#x}: {reason}")]
    BadAccess { addr: usize, reason: &'static str },

    /// mmap precondition failed: bad alignment, overlap, empty file, or an
    /// invalid file handle (§7). Returned as -1 to the caller; no process
    /// state is mutated.
    #[error("mmap rejected: {0}")]
    MmapReject(&'static str),

    /// Swap or file-system I/O returned short or failed outright.
    #[error("I/O failure during {during}: {source}")]
    IoFailure { during: &'static str, #[source] source: std::io::Error },

    /// A virtual page already has an SPT entry (`spec.md` §3: "collisions
    /// are a programming error").
    #[error("page {0:#x} is already mapped in the supplemental page table")]
    AlreadyMapped(usize),

    /// Lookup of a virtual page with no SPT entry, outside the fault path
    /// (the fault path's "no entry" case is not an error, see [`VmError::BadAccess`]).
    #[error("page {0:#x} has no supplemental page table entry")]
    NotMapped(usize),

    /// A swap slot index outside `[0, N_slots)`.
    #[error("swap slot {0} is out of bounds")]
    OutOfBounds(u64),
}

pub type VmResult<T> = Result<T, VmError>;
