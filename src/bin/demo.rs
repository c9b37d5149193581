//! Walks a single simulated process through page faults, a forced eviction,
//! and an mmap/munmap round trip, logging each step. Run with
//! `RUST_LOG=debug` to see the frame table and swap allocator narrate their
//! decisions.

use std::sync::Arc;

use forge_vm::addr::VPage;
use forge_vm::config::{ReplacementPolicy, PAGE_SIZE, SECTORS_PER_PAGE};
use forge_vm::file::FileObject;
use forge_vm::mocks::{InMemoryFile, RamDisk, SimPageDirectory};
use forge_vm::{VmConfig, VmProcess, VmSystem};

fn main() {
    env_logger::init();

    let config = VmConfig::new().with_replacement_policy(ReplacementPolicy::Clock);
    // A single frame, to force an eviction on every subsequent fault.
    let vm = VmSystem::new(config, 1, Box::new(RamDisk::new(16 * SECTORS_PER_PAGE)));

    let pagedir = Arc::new(SimPageDirectory::new());
    let mut proc = VmProcess::new(pagedir);

    let esp = vm.config().phys_base - 0x1000;
    println!("faulting in a stack page at {esp:#x}");
    vm.page_fault(&mut proc, esp - 4, true, true, esp).unwrap();

    println!("faulting in a second stack page, forcing the first out under eviction");
    vm.page_fault(&mut proc, esp - PAGE_SIZE - 4, true, true, esp).unwrap();
    println!("free frames remaining: {}", vm.free_frames());

    let readme: Arc<dyn FileObject> = InMemoryFile::new(b"hello from a memory-mapped file\n".to_vec());
    let map_addr = VPage::containing(0x5000_0000);
    let id = vm.mmap(&mut proc, &readme, map_addr).unwrap();
    vm.page_fault(&mut proc, map_addr.addr(), false, true, esp).unwrap();

    let frame = proc.spt.get(map_addr).unwrap().frame().unwrap();
    let page = vm.read_frame(frame);
    let text = String::from_utf8_lossy(&page[..32]);
    println!("mapped file content resident: {text:?}");

    vm.munmap(&mut proc, id).unwrap();
    println!("unmapped; process now owns {} resident page(s)", proc.spt.resident_count());

    proc.teardown(&vm);
    println!("teardown complete, free frames restored: {}", vm.free_frames());
}
