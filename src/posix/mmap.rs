/*!
 * Anonymous Memory Mapper
 * Page-granular anonymous mappings over the hypervisor page interface
 *
 * Only the anonymous read-write shape is supported; callers asking for
 * anything else have a broken build, so the contract is enforced with
 * assertions rather than errno.
 */

use log::{debug, error};

use crate::backend::types::PageUnmap;
use crate::core::errors::{SysError, SysResult};
use crate::core::types::{page_aligned, page_round_up, Address, Size, PAGE_SIZE};

use super::PosixShim;

/// Pages must be readable and writable
pub const PROT_READ: i32 = 0x1;
pub const PROT_WRITE: i32 = 0x2;

pub const MAP_SHARED: i32 = 0x01;
pub const MAP_PRIVATE: i32 = 0x02;
pub const MAP_ANON: i32 = 0x20;

impl PosixShim {
    /// Map `length` bytes of fresh zeroed memory.
    ///
    /// The only accepted shape is an anonymous read-write mapping with no
    /// address hint, no backing descriptor, and offset zero. Length is
    /// rounded up to the page size.
    pub fn mmap(
        &self,
        addr: Option<Address>,
        length: Size,
        prot: i32,
        flags: i32,
        fd: Option<usize>,
        offset: i64,
    ) -> SysResult<Address> {
        assert!(addr.is_none(), "mmap: address hints are not supported");
        assert_eq!(prot, PROT_READ | PROT_WRITE, "mmap: only PROT_READ|PROT_WRITE");
        assert!(
            flags == (MAP_ANON | MAP_SHARED) || flags == (MAP_ANON | MAP_PRIVATE),
            "mmap: only anonymous shared or private mappings"
        );
        assert!(fd.is_none(), "mmap: file-backed mappings are not supported");
        assert_eq!(offset, 0, "mmap: nonzero offsets are not supported");

        let result = self.map_anonymous(length);
        self.track(result)
    }

    /// Allocate a zeroed anonymous region of at least `length` bytes
    pub fn map_anonymous(&self, length: Size) -> SysResult<Address> {
        let bytes = page_round_up(length);
        let pages = bytes / PAGE_SIZE;
        match self.hypervisor.alloc_zeroed_pages(pages) {
            Some(vaddr) => {
                debug!("mapped {} anonymous pages at {:#x}", pages, vaddr);
                Ok(vaddr)
            }
            None => {
                error!("page allocator exhausted ({} pages requested)", pages);
                Err(SysError::OutOfMemory)
            }
        }
    }

    /// Tear down a mapping. Start and length must be page-aligned; each page
    /// is invalidated through one batched hypervisor call.
    pub fn munmap(&self, start: Address, length: Size) -> SysResult<()> {
        assert!(page_aligned(start), "munmap: unaligned start address");
        assert!(page_aligned(length), "munmap: unaligned length");

        let result = self.munmap_inner(start, length);
        self.track(result)
    }

    fn munmap_inner(&self, start: Address, length: Size) -> SysResult<()> {
        let mut calls: Vec<PageUnmap> = (0..length / PAGE_SIZE)
            .map(|page| PageUnmap::new(start + page * PAGE_SIZE))
            .collect();
        if calls.is_empty() {
            return Ok(());
        }

        if let Err(code) = self.hypervisor.unmap_batch(&mut calls) {
            error!("page invalidation batch failed (status {})", code);
            return Err(SysError::Hypervisor { code });
        }
        // The batch as a whole succeeded; entries can still fail one by one
        for call in &calls {
            if call.result != 0 {
                error!(
                    "page invalidation failed at {:#x} (status {})",
                    call.vaddr, call.result
                );
                return Err(SysError::Hypervisor { code: call.result });
            }
        }
        debug!("unmapped {} pages at {:#x}", calls.len(), start);
        Ok(())
    }
}
