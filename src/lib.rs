/*!
 * guest-posix
 * POSIX compatibility shim for a single-address-space guest kernel
 *
 * Application code sees a conventional file-descriptor I/O model; the
 * underlying kernel exposes only heterogeneous protocol-specific backends
 * (console channel, filesystem-import session, TCP/IP stack, paravirtual
 * front-ends, configuration store, hypervisor memory calls). This crate
 * multiplexes descriptors across those backends and implements the
 * cooperative synchronous-wait (select) engine on top of the kernel's
 * scheduler.
 */

pub mod backend;
pub mod core;
pub mod fd;
pub mod posix;

// Re-exports
pub use crate::core::errors::{Errno, SysError, SysResult};
pub use crate::core::types::{Address, ClockId, Fd, Whence, NOFILE, PAGE_SIZE};
pub use backend::sched::{EventSource, Scheduler, WaiterGuard};
pub use fd::{FdEntry, FdTable};
pub use posix::select::FdSet;
pub use posix::{Backends, DirStream, FileStat, PosixShim};
