/*!
 * Descriptor Table
 * Fixed-capacity registry mapping descriptor values to tagged backend
 * resources
 *
 * The table is the only shared structure in the shim. One mutex serializes
 * allocation and reclamation; per-operation payload access clones the entry
 * out so no backend call ever runs under the lock.
 */

use std::fmt;
use std::sync::Arc;

use log::{error, warn};
use parking_lot::Mutex;

use crate::backend::traits::{BlockDevice, EventChannel, KeyboardDevice, StoreSession, TapDevice};
use crate::backend::types::{FsHandle, SockHandle};
use crate::core::types::{Fd, NOFILE};

/// One descriptor slot: the kind tag determines which payload is valid, so
/// the two are a single sum type. Device payloads are shared handles into
/// the owning front-end; the file payload carries the shim-maintained byte
/// offset.
#[derive(Clone, Default)]
pub enum FdEntry {
    #[default]
    Empty,
    Console,
    File {
        handle: FsHandle,
        offset: i64,
    },
    Store {
        session: Arc<dyn StoreSession>,
    },
    EventChannel {
        channel: Arc<dyn EventChannel>,
    },
    Socket {
        handle: SockHandle,
    },
    Tap {
        dev: Arc<dyn TapDevice>,
    },
    Block {
        dev: Arc<dyn BlockDevice>,
    },
    Keyboard {
        dev: Arc<dyn KeyboardDevice>,
    },
}

impl FdEntry {
    pub fn is_empty(&self) -> bool {
        matches!(self, FdEntry::Empty)
    }

    /// Kind tag for log messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            FdEntry::Empty => "empty",
            FdEntry::Console => "console",
            FdEntry::File { .. } => "file",
            FdEntry::Store { .. } => "store",
            FdEntry::EventChannel { .. } => "event-channel",
            FdEntry::Socket { .. } => "socket",
            FdEntry::Tap { .. } => "tap",
            FdEntry::Block { .. } => "block",
            FdEntry::Keyboard { .. } => "keyboard",
        }
    }
}

impl fmt::Debug for FdEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdEntry::File { handle, offset } => f
                .debug_struct("File")
                .field("handle", handle)
                .field("offset", offset)
                .finish(),
            FdEntry::Socket { handle } => {
                f.debug_struct("Socket").field("handle", handle).finish()
            }
            other => f.write_str(other.kind_name()),
        }
    }
}

/// Fixed-capacity descriptor table. Slots 0/1/2 are pre-seeded console
/// descriptors (stdin/stdout/stderr).
pub struct FdTable {
    slots: Mutex<[FdEntry; NOFILE]>,
}

impl FdTable {
    pub fn new() -> Self {
        let slots = std::array::from_fn(|i| {
            if i < 3 {
                FdEntry::Console
            } else {
                FdEntry::Empty
            }
        });
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Claim the first empty slot for `entry` and return its index.
    ///
    /// Running out of descriptors is a configuration error in a
    /// fixed-capacity guest, not a runtime condition: there is deliberately
    /// no recoverable "too many open files" path, the guest terminates.
    pub fn allocate(&self, entry: FdEntry) -> Fd {
        let mut slots = self.slots.lock();
        for (fd, slot) in slots.iter_mut().enumerate() {
            if slot.is_empty() {
                *slot = entry;
                return fd;
            }
        }
        error!("descriptor table exhausted ({} slots)", NOFILE);
        panic!("too many open descriptors");
    }

    /// Snapshot of the slot for `fd`. Out-of-range descriptors classify as
    /// `Empty`, which every operation rejects as a bad descriptor.
    pub fn entry(&self, fd: Fd) -> FdEntry {
        if fd >= NOFILE {
            return FdEntry::Empty;
        }
        self.slots.lock()[fd].clone()
    }

    /// Replace the slot for `fd`
    pub fn set(&self, fd: Fd, entry: FdEntry) {
        debug_assert!(fd < NOFILE);
        self.slots.lock()[fd] = entry;
    }

    /// Reset the slot for `fd` to empty
    pub fn clear(&self, fd: Fd) {
        self.set(fd, FdEntry::Empty);
    }

    /// Stored byte offset of a plain-file descriptor
    pub fn file_offset(&self, fd: Fd) -> Option<i64> {
        if fd >= NOFILE {
            return None;
        }
        match &self.slots.lock()[fd] {
            FdEntry::File { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Store the byte offset of a plain-file descriptor. Returns false if
    /// the slot no longer holds a file.
    pub fn set_file_offset(&self, fd: Fd, new_offset: i64) -> bool {
        if fd >= NOFILE {
            return false;
        }
        match &mut self.slots.lock()[fd] {
            FdEntry::File { offset, .. } => {
                *offset = new_offset;
                true
            }
            other => {
                warn!(
                    "set_file_offset({}): descriptor changed kind to {}",
                    fd,
                    other.kind_name()
                );
                false
            }
        }
    }

    /// Some slot still holds a plain-file entry for this backend handle.
    /// Duplicated descriptors share the handle, so teardown waits for the
    /// last reference.
    pub fn file_handle_in_use(&self, handle: FsHandle) -> bool {
        let slots = self.slots.lock();
        slots
            .iter()
            .any(|slot| matches!(slot, FdEntry::File { handle: h, .. } if *h == handle))
    }

    /// Occupied descriptors above the console slots, highest first; the
    /// shutdown order for `reclaim_all`
    pub fn occupied_rev(&self) -> Vec<Fd> {
        let slots = self.slots.lock();
        (3..NOFILE).rev().filter(|&fd| !slots[fd].is_empty()).collect()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
