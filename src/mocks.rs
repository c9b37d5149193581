//! In-memory stand-ins for the three external collaborators
//! ([`PageDirectory`], [`FileObject`], [`BlockDevice`]), used by unit tests
//! throughout the crate and by `src/bin/demo.rs`. Each one is a thin
//! `Mutex`-guarded in-memory structure that satisfies the trait contract
//! without any real hardware, file system, or disk underneath it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::addr::{PhysFrame, VPage};
use crate::blockdevice::BlockDevice;
use crate::error::{VmError, VmResult};
use crate::file::FileObject;
use crate::pagedir::PageDirectory;

#[derive(Default, Clone, Copy)]
struct MapState {
    frame: PhysFrame,
    writable: bool,
    dirty: bool,
    accessed: bool,
}

/// A software page table: `upage -> (kpage, writable, dirty, accessed)`.
/// Stands in for a real MMU driver in tests, where there is no hardware to
/// fault against.
#[derive(Default)]
pub struct SimPageDirectory {
    map: Mutex<HashMap<VPage, MapState>>,
}

impl SimPageDirectory {
    pub fn new() -> Self {
        SimPageDirectory::default()
    }
}

impl PageDirectory for SimPageDirectory {
    fn install(&self, upage: VPage, kpage: PhysFrame, writable: bool) -> bool {
        self.map.lock().unwrap().insert(
            upage,
            MapState { frame: kpage, writable, dirty: false, accessed: false },
        );
        true
    }

    fn clear(&self, upage: VPage) {
        self.map.lock().unwrap().remove(&upage);
    }

    fn is_dirty(&self, upage: VPage) -> bool {
        self.map.lock().unwrap().get(&upage).map(|s| s.dirty).unwrap_or(false)
    }

    fn set_dirty(&self, upage: VPage, value: bool) {
        if let Some(s) = self.map.lock().unwrap().get_mut(&upage) {
            s.dirty = value;
        }
    }

    fn is_accessed(&self, upage: VPage) -> bool {
        self.map.lock().unwrap().get(&upage).map(|s| s.accessed).unwrap_or(false)
    }

    fn set_accessed(&self, upage: VPage, value: bool) {
        if let Some(s) = self.map.lock().unwrap().get_mut(&upage) {
            s.accessed = value;
        }
    }

    fn is_present(&self, upage: VPage) -> bool {
        self.map.lock().unwrap().contains_key(&upage)
    }
}

impl SimPageDirectory {
    /// Test helper: simulates a CPU write/access through the mapping,
    /// setting the hardware bits the way real hardware would on a memory
    /// reference. Not part of the [`PageDirectory`] trait.
    pub fn touch(&self, upage: VPage, write: bool) {
        if let Some(s) = self.map.lock().unwrap().get_mut(&upage) {
            s.accessed = true;
            if write {
                s.dirty = true;
            }
        }
    }

    pub fn is_writable(&self, upage: VPage) -> bool {
        self.map.lock().unwrap().get(&upage).map(|s| s.writable).unwrap_or(false)
    }
}

/// An in-memory file, sized to a fixed byte vector, for exercising the
/// file-backed [`crate::spt::PteKind::File`] path without a real file
/// system. The byte storage itself lives behind a shared `Arc<Mutex<_>>` so
/// that [`InMemoryFile::reopen`] can hand out an independent handle — its
/// own object identity, no shared cursor state — that still reads and
/// writes the same underlying bytes, matching what a real file system's
/// `reopen` gives two callers of the same path.
pub struct InMemoryFile {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl InMemoryFile {
    pub fn new(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(InMemoryFile { bytes: Arc::new(Mutex::new(bytes)) })
    }
}

impl FileObject for InMemoryFile {
    fn length(&self) -> VmResult<u64> {
        Ok(self.bytes.lock().unwrap().len() as u64)
    }

    fn read_at(&self, buf: &mut [u8], ofs: u64) -> VmResult<usize> {
        let data = self.bytes.lock().unwrap();
        let ofs = ofs as usize;
        if ofs >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - ofs);
        buf[..n].copy_from_slice(&data[ofs..ofs + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], ofs: u64) -> VmResult<usize> {
        let mut data = self.bytes.lock().unwrap();
        let ofs = ofs as usize;
        if data.len() < ofs + buf.len() {
            data.resize(ofs + buf.len(), 0);
        }
        data[ofs..ofs + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn reopen(&self) -> VmResult<Arc<dyn FileObject>> {
        Ok(Arc::new(InMemoryFile { bytes: Arc::clone(&self.bytes) }))
    }
}

/// A swap device backed by a `Vec<u8>` instead of a real disk.
pub struct RamDisk {
    sectors: Mutex<Vec<u8>>,
    num_sectors: u64,
}

impl RamDisk {
    pub fn new(num_sectors: usize) -> Self {
        RamDisk { sectors: Mutex::new(vec![0u8; num_sectors * crate::config::SECTOR_SIZE]), num_sectors: num_sectors as u64 }
    }
}

impl BlockDevice for RamDisk {
    fn num_sectors(&self) -> u64 {
        self.num_sectors
    }

    fn read_sectors(&self, start_sector: u64, buf: &mut [u8]) -> VmResult<()> {
        let data = self.sectors.lock().unwrap();
        let ofs = start_sector as usize * crate::config::SECTOR_SIZE;
        if ofs + buf.len() > data.len() {
            return Err(VmError::OutOfBounds(start_sector));
        }
        buf.copy_from_slice(&data[ofs..ofs + buf.len()]);
        Ok(())
    }

    fn write_sectors(&self, start_sector: u64, buf: &[u8]) -> VmResult<()> {
        let mut data = self.sectors.lock().unwrap();
        let ofs = start_sector as usize * crate::config::SECTOR_SIZE;
        if ofs + buf.len() > data.len() {
            return Err(VmError::OutOfBounds(start_sector));
        }
        data[ofs..ofs + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_page_directory_round_trips_bits() {
        let pd = SimPageDirectory::new();
        let up = VPage::containing(0x1000);
        assert!(pd.install(up, PhysFrame::new(0x2000), true));
        assert!(pd.is_present(up));
        pd.touch(up, true);
        assert!(pd.is_dirty(up));
        assert!(pd.is_accessed(up));
        pd.clear(up);
        assert!(!pd.is_present(up));
    }

    #[test]
    fn in_memory_file_short_read_past_end() {
        let f = InMemoryFile::new(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        let n = f.read_at(&mut buf, 1).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], &[2, 3]);
    }

    #[test]
    fn ram_disk_out_of_bounds_errors() {
        let d = RamDisk::new(2);
        let mut buf = [0u8; 4096];
        assert!(matches!(d.read_sectors(0, &mut buf), Err(VmError::OutOfBounds(_))));
    }
}
