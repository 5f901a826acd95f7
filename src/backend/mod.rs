/*!
 * Backend Module
 * Interfaces the shim consumes from its external collaborators
 *
 * The shim performs no I/O of its own: every descriptor kind is served by a
 * protocol-specific backend behind one of these traits. Implementations live
 * in the kernel proper (or in test fakes); the shim only multiplexes.
 */

pub mod sched;
pub mod traits;
pub mod types;

pub use sched::{EventSource, Scheduler, WaiterGuard};
pub use traits::{
    BlockDevice, Console, EventChannel, FsImport, Hypervisor, KeyboardDevice, NetStack,
    StoreSession, TapDevice, WallClock,
};
pub use types::{DirPage, FsError, FsHandle, FsStat, PageUnmap, SockHandle, SocketReadiness};
