/*!
 * Backend Traits
 * Collaborator seams: filesystem import, network stack, device front-ends,
 * configuration store, console, clocks, and the hypervisor page interface
 */

use std::net::SocketAddr;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::core::errors::Errno;
use crate::core::types::Address;

use super::types::{DirPage, FsError, FsHandle, FsStat, PageUnmap, SockHandle, SocketReadiness};

/// Filesystem-import session.
///
/// Handles are owned by the session; offsets are explicit because the
/// protocol is positionless (the shim keeps the per-descriptor offset).
#[cfg_attr(test, automock)]
pub trait FsImport: Send + Sync {
    fn open(&self, path: &str) -> Result<FsHandle, FsError>;

    /// Create a file or directory; returns a handle for files
    fn create(&self, path: &str, directory: bool, mode: u32) -> Result<FsHandle, FsError>;

    /// Read at an explicit offset; `Ok(0)` signals end of file
    fn read(&self, handle: FsHandle, buf: &mut [u8], offset: u64) -> Result<usize, FsError>;

    fn write(&self, handle: FsHandle, buf: &[u8], offset: u64) -> Result<usize, FsError>;

    fn stat(&self, handle: FsHandle) -> Result<FsStat, FsError>;

    fn sync(&self, handle: FsHandle) -> Result<(), FsError>;

    fn truncate(&self, handle: FsHandle, length: u64) -> Result<(), FsError>;

    fn close(&self, handle: FsHandle) -> Result<(), FsError>;

    fn remove(&self, path: &str) -> Result<(), FsError>;

    /// Fetch one page of directory entries starting at a running entry
    /// offset into the directory's virtual entry stream
    fn list_dir(&self, path: &str, offset: u64) -> Result<DirPage, FsError>;
}

/// TCP/IP stack, keyed by its own socket handles. Errors pass through to the
/// caller verbatim.
#[cfg_attr(test, automock)]
pub trait NetStack: Send + Sync {
    fn socket(&self, domain: i32, socktype: i32, protocol: i32) -> Result<SockHandle, Errno>;

    fn accept(&self, handle: SockHandle) -> Result<(SockHandle, SocketAddr), Errno>;

    fn bind(&self, handle: SockHandle, addr: SocketAddr) -> Result<(), Errno>;

    fn connect(&self, handle: SockHandle, addr: SocketAddr) -> Result<(), Errno>;

    fn listen(&self, handle: SockHandle, backlog: i32) -> Result<(), Errno>;

    fn read(&self, handle: SockHandle, buf: &mut [u8]) -> Result<usize, Errno>;

    fn write(&self, handle: SockHandle, buf: &[u8]) -> Result<usize, Errno>;

    fn recv(&self, handle: SockHandle, buf: &mut [u8], flags: i32) -> Result<usize, Errno>;

    fn send(&self, handle: SockHandle, buf: &[u8], flags: i32) -> Result<usize, Errno>;

    fn recvfrom(
        &self,
        handle: SockHandle,
        buf: &mut [u8],
        flags: i32,
    ) -> Result<(usize, SocketAddr), Errno>;

    fn sendto(
        &self,
        handle: SockHandle,
        buf: &[u8],
        flags: i32,
        addr: SocketAddr,
    ) -> Result<usize, Errno>;

    fn getsockopt(
        &self,
        handle: SockHandle,
        level: i32,
        optname: i32,
        optval: &mut [u8],
    ) -> Result<usize, Errno>;

    fn setsockopt(
        &self,
        handle: SockHandle,
        level: i32,
        optname: i32,
        optval: &[u8],
    ) -> Result<(), Errno>;

    fn getsockname(&self, handle: SockHandle) -> Result<SocketAddr, Errno>;

    fn set_nonblocking(&self, handle: SockHandle, nonblocking: bool) -> Result<(), Errno>;

    /// Non-blocking readiness query over the given sockets. The stack clears
    /// interest bits that are not currently ready and returns the number of
    /// sockets with anything left set.
    fn poll(&self, entries: &mut [SocketReadiness]) -> Result<usize, Errno>;

    fn close(&self, handle: SockHandle) -> Result<(), Errno>;
}

/// Paravirtual network front-end (datagram-like frames)
#[cfg_attr(test, automock)]
pub trait TapDevice: Send + Sync {
    /// Receive one pending frame; non-positive means nothing pending
    fn receive(&self, buf: &mut [u8]) -> isize;

    /// Queue a frame for transmission (fire-and-forget)
    fn transmit(&self, buf: &[u8]);

    /// Pending-event indicator, set by the front-end's interrupt path
    fn has_event(&self) -> bool;

    fn shutdown(&self);
}

/// Paravirtual block front-end. Data transfer goes through the block layer,
/// not through read/write; the descriptor only carries event readiness.
#[cfg_attr(test, automock)]
pub trait BlockDevice: Send + Sync {
    fn has_event(&self) -> bool;

    fn shutdown(&self);
}

/// Paravirtual keyboard front-end. Transfers are in whole input events of
/// `KBD_EVENT_SIZE` bytes.
#[cfg_attr(test, automock)]
pub trait KeyboardDevice: Send + Sync {
    /// Receive up to `buf.len() / KBD_EVENT_SIZE` events; returns the event
    /// count, non-positive when nothing is pending
    fn receive_events(&self, buf: &mut [u8]) -> isize;

    fn has_event(&self) -> bool;

    fn shutdown(&self);
}

/// Configuration-store session with a watch queue
#[cfg_attr(test, automock)]
pub trait StoreSession: Send + Sync {
    /// A watch event is pending on the session's queue
    fn has_watch_event(&self) -> bool;

    /// Best-effort teardown; failures are not surfaced
    fn close(&self);
}

/// Raw kernel event channel
#[cfg_attr(test, automock)]
pub trait EventChannel: Send + Sync {
    fn has_event(&self) -> bool;

    /// Best-effort teardown; failures are not surfaced
    fn close(&self);
}

/// Character-output console transport (fire-and-forget)
#[cfg_attr(test, automock)]
pub trait Console: Send + Sync {
    fn write(&self, buf: &[u8]);
}

/// Calendar time source
#[cfg_attr(test, automock)]
pub trait WallClock: Send + Sync {
    /// Wall-clock time as a duration since the Unix epoch
    fn wall_time(&self) -> Duration;
}

/// Privileged hypervisor memory interface
#[cfg_attr(test, automock)]
pub trait Hypervisor: Send + Sync {
    /// Allocate `count` zero-filled pages and map them at a fresh virtual
    /// address; `None` when the page allocator is exhausted
    fn alloc_zeroed_pages(&self, count: usize) -> Option<Address>;

    /// Submit a batch of page-table-invalidation calls. `Err` carries the
    /// failing status of the batch call itself; on `Ok` each entry's
    /// individual `result` has been filled in and must still be checked.
    fn unmap_batch(&self, calls: &mut [PageUnmap]) -> Result<(), i32>;
}
