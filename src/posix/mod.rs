/*!
 * POSIX Surface
 * Backend dispatch, readiness engine, and the auxiliary stateful resources
 *
 * Every generic operation enters through `PosixShim`, classifies the
 * descriptor's kind, and forwards to the owning backend with that backend's
 * own semantics and error mapping. Results use `SysResult`; the errno of the
 * most recent failure is additionally recorded process-wide for the
 * C-convention surface.
 */

pub mod dir;
pub mod file;
pub mod mmap;
pub mod select;
pub mod socket;
pub mod time;
pub mod unsupported;

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use log::info;

use crate::backend::sched::Scheduler;
use crate::backend::traits::{
    BlockDevice, Console, EventChannel, FsImport, Hypervisor, KeyboardDevice, NetStack,
    StoreSession, TapDevice, WallClock,
};
use crate::core::errors::SysResult;
use crate::core::types::Fd;
use crate::fd::{FdEntry, FdTable};

pub use dir::DirStream;
pub use file::FileStat;

/// External collaborators the shim dispatches to
pub struct Backends {
    pub fs: Arc<dyn FsImport>,
    pub net: Arc<dyn NetStack>,
    pub console: Arc<dyn Console>,
    pub sched: Arc<dyn Scheduler>,
    pub clock: Arc<dyn WallClock>,
    pub hypervisor: Arc<dyn Hypervisor>,
}

/// The descriptor multiplexer.
///
/// Owns the descriptor table and routes the POSIX surface to the backends.
/// One instance per guest; the application logic is single-threaded, so
/// operations on an already-owned descriptor need no locking beyond the
/// table's own allocation mutex.
pub struct PosixShim {
    pub(crate) table: FdTable,
    pub(crate) fs: Arc<dyn FsImport>,
    pub(crate) net: Arc<dyn NetStack>,
    pub(crate) console: Arc<dyn Console>,
    pub(crate) sched: Arc<dyn Scheduler>,
    pub(crate) clock: Arc<dyn WallClock>,
    pub(crate) hypervisor: Arc<dyn Hypervisor>,
    last_errno: AtomicI32,
}

impl PosixShim {
    pub fn new(backends: Backends) -> Self {
        Self {
            table: FdTable::new(),
            fs: backends.fs,
            net: backends.net,
            console: backends.console,
            sched: backends.sched,
            clock: backends.clock,
            hypervisor: backends.hypervisor,
            last_errno: AtomicI32::new(0),
        }
    }

    /// Errno of the most recent failed operation (the C surface's
    /// sentinel-plus-last-error convention)
    pub fn last_errno(&self) -> i32 {
        self.last_errno.load(Ordering::Relaxed)
    }

    /// Record the errno of a failing result on its way out
    pub(crate) fn track<T>(&self, result: SysResult<T>) -> SysResult<T> {
        if let Err(ref error) = result {
            self.last_errno.store(error.errno(), Ordering::Relaxed);
        }
        result
    }

    /// Close every descriptor above the console slots, highest first; called
    /// at guest shutdown. Teardown failures are logged by `close` and do not
    /// stop the sweep.
    pub fn reclaim_all(&self) {
        for fd in self.table.occupied_rev() {
            let _ = self.close(fd);
        }
    }

    /// Read-only view of the descriptor table (diagnostics and tests)
    pub fn table(&self) -> &FdTable {
        &self.table
    }

    // Front-end drivers hand their opened devices to the shim through the
    // attach family, which wraps each one in a descriptor.

    pub fn attach_tap(&self, dev: Arc<dyn TapDevice>) -> Fd {
        let fd = self.table.allocate(FdEntry::Tap { dev });
        info!("attached network tap as fd {}", fd);
        fd
    }

    pub fn attach_block(&self, dev: Arc<dyn BlockDevice>) -> Fd {
        let fd = self.table.allocate(FdEntry::Block { dev });
        info!("attached block device as fd {}", fd);
        fd
    }

    pub fn attach_keyboard(&self, dev: Arc<dyn KeyboardDevice>) -> Fd {
        let fd = self.table.allocate(FdEntry::Keyboard { dev });
        info!("attached keyboard as fd {}", fd);
        fd
    }

    pub fn attach_store(&self, session: Arc<dyn StoreSession>) -> Fd {
        let fd = self.table.allocate(FdEntry::Store { session });
        info!("attached store session as fd {}", fd);
        fd
    }

    pub fn attach_event_channel(&self, channel: Arc<dyn EventChannel>) -> Fd {
        let fd = self.table.allocate(FdEntry::EventChannel { channel });
        info!("attached event channel as fd {}", fd);
        fd
    }

    // Process identity: the guest is single-process by construction.

    pub fn getpid(&self) -> u32 {
        1
    }

    pub fn getppid(&self) -> u32 {
        1
    }

    pub fn setsid(&self) -> u32 {
        1
    }

    pub fn getcwd(&self) -> &'static str {
        "/"
    }

    pub fn isatty(&self, fd: Fd) -> bool {
        matches!(self.table.entry(fd), FdEntry::Console)
    }
}
