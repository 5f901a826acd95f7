/*!
 * Core Types
 * Common types and constants used across the shim
 */

use serde::{Deserialize, Serialize};

use super::errors::{SysError, SysResult};

/// Descriptor value: an index into the fixed-size descriptor table
pub type Fd = usize;

/// Cooperative thread identifier, assigned by the scheduler
pub type ThreadId = u32;

/// Virtual address
pub type Address = usize;

/// Size type for memory operations
pub type Size = usize;

/// Descriptor table capacity. Slots 0/1/2 are the pre-seeded console
/// descriptors; exhausting the remainder is fatal (see `FdTable::allocate`).
pub const NOFILE: usize = 32;

/// Guest page size
pub const PAGE_SIZE: usize = 4096;

/// Size in bytes of one keyboard input event on the wire. Keyboard reads
/// transfer whole events only.
pub const KBD_EVENT_SIZE: usize = 40;

// open(2) flag bits (Linux numeric values)
pub const O_ACCMODE: u32 = 0o3;
pub const O_CREAT: u32 = 0o100;
pub const O_TRUNC: u32 = 0o1000;
pub const O_NONBLOCK: u32 = 0o4000;

// fcntl(2) commands
pub const F_SETFL: i32 = 4;

/// Seek origin for `lseek`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl Whence {
    /// Decode a raw `whence` value; anything unknown is an input error
    pub fn from_raw(whence: i32) -> SysResult<Self> {
        match whence {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Cur),
            2 => Ok(Whence::End),
            other => Err(SysError::InvalidArgument(format!(
                "unknown seek whence {}",
                other
            ))),
        }
    }
}

/// Clock selector for `clock_gettime`. Only the wall clock and the
/// scheduler's monotonic counter are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockId {
    Realtime,
    Monotonic,
}

impl ClockId {
    /// Decode a raw clock id; anything unknown is an input error
    pub fn from_raw(clk_id: i32) -> SysResult<Self> {
        match clk_id {
            0 => Ok(ClockId::Realtime),
            1 => Ok(ClockId::Monotonic),
            other => Err(SysError::InvalidArgument(format!(
                "unknown clock id {}",
                other
            ))),
        }
    }
}

/// Round a byte length up to a whole number of pages
pub fn page_round_up(length: usize) -> usize {
    (length + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// True if the value sits on a page boundary
pub fn page_aligned(value: usize) -> bool {
    value & (PAGE_SIZE - 1) == 0
}
