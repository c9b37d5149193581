//! Stack growth policy (`spec.md` §4.E, component E).
//!
//! A pure decision function kept separate from the fault resolver so the
//! boundary arithmetic can be unit-tested in isolation, without needing a
//! frame table, a swap device, or a page directory in scope.

use crate::addr::VPage;
use crate::config::{VmConfig, PAGE_SIZE, PUSHA_PROBE_BYTES};

/// Whether a fault at `fault_addr`, with the current user stack pointer at
/// `esp`, should be satisfied by growing the stack rather than rejected.
///
/// `spec.md` §4.E: the fault must land below `PHYS_BASE`, no further down
/// than `PHYS_BASE - stack_limit`, and no further below `esp` than the
/// widest single instruction can write before updating it (`PUSHA`, 32
/// bytes). The caller is responsible for having already checked that no SPT
/// entry exists for the faulting page.
pub fn should_grow_stack(fault_addr: usize, esp: usize, config: &VmConfig) -> bool {
    if fault_addr >= config.phys_base {
        return false;
    }

    let lowest_allowed = config.phys_base.saturating_sub(config.stack_limit);
    if fault_addr < lowest_allowed {
        return false;
    }

    let probe_floor = esp.saturating_sub(PUSHA_PROBE_BYTES);
    fault_addr >= probe_floor
}

/// The page that should be installed to satisfy a stack-growth fault.
pub fn growth_page(fault_addr: usize) -> VPage {
    VPage::containing(fault_addr)
}
