/*!
 * Error Types
 * Errno taxonomy of the POSIX surface, with thiserror and serde support
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// POSIX error codes surfaced by the shim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Errno {
    Eintr,
    Eio,
    Ebadf,
    Eagain,
    Enomem,
    Einval,
    Espipe,
    Enosys,
}

impl Errno {
    /// Numeric errno value (Linux numbering)
    pub fn code(self) -> i32 {
        match self {
            Errno::Eintr => 4,
            Errno::Eio => 5,
            Errno::Ebadf => 9,
            Errno::Eagain => 11,
            Errno::Enomem => 12,
            Errno::Einval => 22,
            Errno::Espipe => 29,
            Errno::Enosys => 38,
        }
    }
}

/// Shim operation errors. Each variant maps onto exactly one errno; the
/// variant carries whatever context the dispatch site has.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SysError {
    /// Out-of-range, empty, or wrong-kind descriptor for the operation
    #[error("bad descriptor")]
    BadDescriptor,

    /// Backend-reported failure, translated uniformly
    #[error("I/O error")]
    Io,

    /// Datagram-style backend has nothing pending
    #[error("operation would block")]
    WouldBlock,

    /// A blocking wait was woken but nothing became ready
    #[error("interrupted wait")]
    Interrupted,

    /// Unsupported flag/mode/clock-kind combination
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Permanently unsupported POSIX surface
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Seek on a non-seekable descriptor
    #[error("illegal seek")]
    IllegalSeek,

    /// The kernel page allocator could not satisfy the request
    #[error("out of memory")]
    OutOfMemory,

    /// Error forwarded verbatim from the network stack
    #[error("network stack error: {0:?}")]
    Net(Errno),

    /// Failing status from a batched hypervisor call
    #[error("hypervisor call failed with status {code}")]
    Hypervisor { code: i32 },
}

impl SysError {
    /// The errno this error surfaces as
    pub fn errno(&self) -> i32 {
        match self {
            SysError::BadDescriptor => Errno::Ebadf.code(),
            SysError::Io => Errno::Eio.code(),
            SysError::WouldBlock => Errno::Eagain.code(),
            SysError::Interrupted => Errno::Eintr.code(),
            SysError::InvalidArgument(_) => Errno::Einval.code(),
            SysError::NotImplemented(_) => Errno::Enosys.code(),
            SysError::IllegalSeek => Errno::Espipe.code(),
            SysError::OutOfMemory => Errno::Enomem.code(),
            SysError::Net(errno) => errno.code(),
            SysError::Hypervisor { code } => *code,
        }
    }
}

impl From<Errno> for SysError {
    /// Lift a bare network-stack errno into the shim taxonomy
    fn from(errno: Errno) -> Self {
        SysError::Net(errno)
    }
}

/// Result type for shim operations
pub type SysResult<T> = Result<T, SysError>;
