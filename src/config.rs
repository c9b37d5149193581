//! Configuration constants and the `VmConfig` builder.
//!
//! Named constants instead of magic numbers scattered through the fault and
//! eviction paths. There are no global statics here: every tunable value
//! flows in through [`VmConfig`] as an explicit parameter to
//! [`crate::vm::VmSystem`], so two systems in the same process never share
//! state by accident and tests can construct whatever configuration a case
//! needs.

/// Bytes per page. `spec.md` assumes a single fixed page size throughout.
pub const PAGE_SIZE: usize = 4096;

/// Bytes per disk sector on the swap block device (`spec.md` §6).
pub const SECTOR_SIZE: usize = 512;

/// Sectors occupied by one page-sized swap slot.
pub const SECTORS_PER_PAGE: usize = PAGE_SIZE / SECTOR_SIZE;

/// x86 `PUSHA` writes 32 bytes below the current stack pointer before it
/// faults; a fault in that window still counts as a stack-growth candidate
/// (`spec.md` §4.E).
pub const PUSHA_PROBE_BYTES: usize = 32;

/// Default ceiling on how far the user stack may grow downward from
/// `PHYS_BASE`, matching `spec.md`'s "at least 8 MiB below PHYS_BASE is
/// typical".
pub const DEFAULT_STACK_LIMIT: usize = 8 * 1024 * 1024;

/// Base address of the simulated physical frame pool (`crate::frame::
/// FrameTable`). Distinct from [`VmConfig::phys_base`], which names the top
/// of *user virtual* address space; frame 0 is reserved the way real boot
/// allocators reserve low memory.
pub const FRAME_POOL_BASE: usize = 0x1000;

/// Replacement policy for frame eviction (`spec.md` §4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacementPolicy {
    /// Second-chance clock sweep. Default, per spec.
    #[default]
    Clock,
    /// Evict the oldest frame, rotating it to the tail (alternate build
    /// option named in spec.md §4.B).
    Fifo,
}

/// Per-[`crate::vm::VmSystem`] configuration. Built with defaults matching
/// `spec.md`, overridable by the embedder.
#[derive(Debug, Clone)]
pub struct VmConfig {
    pub replacement_policy: ReplacementPolicy,
    /// `PHYS_BASE - stack_limit` is the lowest address stack growth may
    /// reach (`spec.md` §4.E).
    pub stack_limit: usize,
    /// Top of the user address space (`PHYS_BASE` in spec terms).
    pub phys_base: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            replacement_policy: ReplacementPolicy::default(),
            stack_limit: DEFAULT_STACK_LIMIT,
            phys_base: 0xC000_0000,
        }
    }
}

impl VmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replacement_policy(mut self, policy: ReplacementPolicy) -> Self {
        self.replacement_policy = policy;
        self
    }

    pub fn with_stack_limit(mut self, bytes: usize) -> Self {
        self.stack_limit = bytes;
        self
    }

    pub fn with_phys_base(mut self, addr: usize) -> Self {
        self.phys_base = addr;
        self
    }
}
