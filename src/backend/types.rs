/*!
 * Backend Types
 * Value types crossing the collaborator seams
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::Address;

/// Opaque file handle owned by the filesystem-import session
pub type FsHandle = i32;

/// Opaque socket handle owned by the TCP/IP stack
pub type SockHandle = i32;

/// Failure reported by the filesystem-import backend. The protocol carries a
/// bare status code; the shim translates every one of these uniformly to an
/// I/O error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[error("filesystem backend error (status {0})")]
pub struct FsError(pub i32);

/// Stat response from the filesystem-import backend. The protocol does not
/// carry device/inode/link/block information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsStat {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime_secs: i64,
    pub mtime_secs: i64,
    pub ctime_secs: i64,
}

/// One page of directory entries, fetched at a running entry offset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirPage {
    pub entries: Vec<String>,
    /// More pages might exist past this one
    pub has_more: bool,
}

/// Per-socket readiness interest and result, keyed by the stack's own handle.
/// The shim fills in the requested interest; the stack clears whatever is not
/// currently ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketReadiness {
    pub handle: SockHandle,
    pub read: bool,
    pub write: bool,
    pub except: bool,
}

impl SocketReadiness {
    pub fn new(handle: SockHandle) -> Self {
        Self {
            handle,
            read: false,
            write: false,
            except: false,
        }
    }

    /// Any interest or readiness left set
    pub fn any(&self) -> bool {
        self.read || self.write || self.except
    }
}

/// One page-table-invalidation request within a batched hypervisor call.
/// `result` is filled in by the hypervisor for each entry individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageUnmap {
    pub vaddr: Address,
    pub result: i32,
}

impl PageUnmap {
    pub fn new(vaddr: Address) -> Self {
        Self { vaddr, result: 0 }
    }
}
