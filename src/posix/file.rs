/*!
 * File Operations
 * Per-kind dispatch for read/write/seek/stat/close and the path calls
 *
 * Reads and writes on plain files are capped at one page per call because
 * that is what the import protocol transfers; the stored offset advances by
 * the amount actually moved. Console writes are fire-and-forget. Tap and
 * keyboard reads are datagram-like: nothing pending means would-block, not
 * end-of-stream.
 */

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::backend::types::FsStat;
use crate::core::errors::{SysError, SysResult};
use crate::core::types::{Fd, Whence, F_SETFL, KBD_EVENT_SIZE, O_ACCMODE, O_CREAT, O_NONBLOCK, O_TRUNC, PAGE_SIZE};
use crate::fd::FdEntry;

use super::PosixShim;

// File mode bits
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IRUSR: u32 = 0o400;
pub const S_IWUSR: u32 = 0o200;

/// Writes to paths under this prefix go to the console instead of the
/// filesystem import (log capture for the guest)
const LOG_PATH: &str = "/var/log/";

/// POSIX stat result. The import protocol carries mode/ownership/size/times;
/// device id, inode, link count and block geometry are fixed defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blksize: u32,
    pub blocks: u64,
    pub atime_secs: i64,
    pub mtime_secs: i64,
    pub ctime_secs: i64,
}

impl FileStat {
    fn defaults() -> Self {
        Self {
            dev: 0,
            ino: 0,
            mode: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            size: 0,
            blksize: 4096,
            blocks: 0,
            atime_secs: 0,
            mtime_secs: 0,
            ctime_secs: 0,
        }
    }

    fn from_backend(stat: FsStat) -> Self {
        Self {
            mode: stat.mode,
            uid: stat.uid,
            gid: stat.gid,
            size: stat.size,
            atime_secs: stat.atime_secs,
            mtime_secs: stat.mtime_secs,
            ctime_secs: stat.ctime_secs,
            ..Self::defaults()
        }
    }

    /// Fixed-mode entry for kinds the import protocol knows nothing about
    /// (console, socket): zero size, current time everywhere
    fn synthetic(mode: u32, now_secs: i64) -> Self {
        Self {
            mode,
            atime_secs: now_secs,
            mtime_secs: now_secs,
            ctime_secs: now_secs,
            ..Self::defaults()
        }
    }
}

impl PosixShim {
    /// Open a path on the filesystem import.
    ///
    /// Exactly two flag shapes are supported: a plain access mode opens an
    /// existing file, and `O_CREAT|O_TRUNC` creates one. Anything else is an
    /// input error.
    pub fn open(&self, path: &str, flags: u32, mode: u32) -> SysResult<Fd> {
        let result = self.open_inner(path, flags, mode);
        self.track(result)
    }

    fn open_inner(&self, path: &str, flags: u32, mode: u32) -> SysResult<Fd> {
        if path.starts_with(LOG_PATH) {
            let fd = self.table.allocate(FdEntry::Console);
            info!("open({}) -> console fd {}", path, fd);
            return Ok(fd);
        }

        let handle = match flags & !O_ACCMODE {
            0 => self.fs.open(path),
            f if f == O_CREAT | O_TRUNC => self.fs.create(path, false, mode),
            other => {
                warn!("open({}): unsupported flags {:#o}", path, other);
                return Err(SysError::InvalidArgument(format!(
                    "unsupported open flags {:#o}",
                    other
                )));
            }
        }
        .map_err(|_| SysError::Io)?;

        let fd = self.table.allocate(FdEntry::File { handle, offset: 0 });
        info!("open({}, {:#x}) -> {}", path, flags, fd);
        Ok(fd)
    }

    pub fn read(&self, fd: Fd, buf: &mut [u8]) -> SysResult<usize> {
        let result = self.read_inner(fd, buf);
        self.track(result)
    }

    fn read_inner(&self, fd: Fd, buf: &mut [u8]) -> SysResult<usize> {
        match self.table.entry(fd) {
            // The console never produces input: permanent end-of-stream
            FdEntry::Console => Ok(0),
            FdEntry::File { handle, offset } => {
                let cap = buf.len().min(PAGE_SIZE);
                let n = self
                    .fs
                    .read(handle, &mut buf[..cap], offset as u64)
                    .map_err(|_| SysError::Io)?;
                if n > 0 {
                    self.table.set_file_offset(fd, offset + n as i64);
                }
                Ok(n)
            }
            FdEntry::Socket { handle } => self.net.read(handle, buf).map_err(SysError::from),
            FdEntry::Tap { dev } => {
                let n = dev.receive(buf);
                if n <= 0 {
                    return Err(SysError::WouldBlock);
                }
                Ok(n as usize)
            }
            FdEntry::Keyboard { dev } => {
                let whole = buf.len() / KBD_EVENT_SIZE * KBD_EVENT_SIZE;
                let n = dev.receive_events(&mut buf[..whole]);
                if n <= 0 {
                    return Err(SysError::WouldBlock);
                }
                Ok(n as usize * KBD_EVENT_SIZE)
            }
            other => {
                debug!("read({}): bad descriptor ({})", fd, other.kind_name());
                Err(SysError::BadDescriptor)
            }
        }
    }

    pub fn write(&self, fd: Fd, buf: &[u8]) -> SysResult<usize> {
        let result = self.write_inner(fd, buf);
        self.track(result)
    }

    fn write_inner(&self, fd: Fd, buf: &[u8]) -> SysResult<usize> {
        match self.table.entry(fd) {
            FdEntry::Console => {
                // Fire-and-forget: the transport reports no partial writes
                self.console.write(buf);
                Ok(buf.len())
            }
            FdEntry::File { handle, offset } => {
                let cap = buf.len().min(PAGE_SIZE);
                let n = self
                    .fs
                    .write(handle, &buf[..cap], offset as u64)
                    .map_err(|_| SysError::Io)?;
                if n > 0 {
                    self.table.set_file_offset(fd, offset + n as i64);
                }
                Ok(n)
            }
            FdEntry::Socket { handle } => self.net.write(handle, buf).map_err(SysError::from),
            FdEntry::Tap { dev } => {
                dev.transmit(buf);
                Ok(buf.len())
            }
            other => {
                debug!("write({}): bad descriptor ({})", fd, other.kind_name());
                Err(SysError::BadDescriptor)
            }
        }
    }

    /// Reposition a plain-file descriptor. `Whence::End` needs the backend's
    /// current size, so it stats the handle first and fails if that fails.
    pub fn lseek(&self, fd: Fd, offset: i64, whence: Whence) -> SysResult<i64> {
        let result = self.lseek_inner(fd, offset, whence);
        self.track(result)
    }

    fn lseek_inner(&self, fd: Fd, offset: i64, whence: Whence) -> SysResult<i64> {
        let current = match self.table.entry(fd) {
            FdEntry::File { offset, .. } => offset,
            _ => return Err(SysError::IllegalSeek),
        };
        let new_offset = match whence {
            Whence::Set => offset,
            Whence::Cur => current + offset,
            Whence::End => {
                let stat = self.fstat_inner(fd)?;
                stat.size as i64 + offset
            }
        };
        self.table.set_file_offset(fd, new_offset);
        Ok(new_offset)
    }

    pub fn fsync(&self, fd: Fd) -> SysResult<()> {
        let result = self.fsync_inner(fd);
        self.track(result)
    }

    fn fsync_inner(&self, fd: Fd) -> SysResult<()> {
        match self.table.entry(fd) {
            FdEntry::File { handle, .. } => self.fs.sync(handle).map_err(|_| SysError::Io),
            other => {
                debug!("fsync({}): bad descriptor ({})", fd, other.kind_name());
                Err(SysError::BadDescriptor)
            }
        }
    }

    pub fn ftruncate(&self, fd: Fd, length: u64) -> SysResult<()> {
        let result = self.ftruncate_inner(fd, length);
        self.track(result)
    }

    fn ftruncate_inner(&self, fd: Fd, length: u64) -> SysResult<()> {
        match self.table.entry(fd) {
            FdEntry::File { handle, .. } => {
                self.fs.truncate(handle, length).map_err(|_| SysError::Io)
            }
            other => {
                debug!("ftruncate({}): bad descriptor ({})", fd, other.kind_name());
                Err(SysError::BadDescriptor)
            }
        }
    }

    /// Close a descriptor. Teardown is per-kind: filesystem handles and
    /// sockets surface their backend's failure; console, store, event
    /// channel and device descriptors are cheap transient resources released
    /// best-effort. The slot is reset to empty in every case.
    pub fn close(&self, fd: Fd) -> SysResult<()> {
        let result = self.close_inner(fd);
        self.track(result)
    }

    fn close_inner(&self, fd: Fd) -> SysResult<()> {
        let entry = self.table.entry(fd);
        debug!("close({}) [{}]", fd, entry.kind_name());
        match entry {
            FdEntry::Empty => {
                debug!("close({}): bad descriptor", fd);
                Err(SysError::BadDescriptor)
            }
            FdEntry::Console => {
                self.table.clear(fd);
                Ok(())
            }
            FdEntry::File { handle, .. } => {
                self.table.clear(fd);
                if self.table.file_handle_in_use(handle) {
                    // A duplicate still references the backend handle
                    return Ok(());
                }
                self.fs.close(handle).map_err(|_| SysError::Io)
            }
            FdEntry::Store { session } => {
                session.close();
                self.table.clear(fd);
                Ok(())
            }
            FdEntry::EventChannel { channel } => {
                channel.close();
                self.table.clear(fd);
                Ok(())
            }
            FdEntry::Socket { handle } => {
                let result = self.net.close(handle);
                self.table.clear(fd);
                result.map_err(SysError::from)
            }
            FdEntry::Tap { dev } => {
                dev.shutdown();
                self.table.clear(fd);
                Ok(())
            }
            FdEntry::Block { dev } => {
                dev.shutdown();
                self.table.clear(fd);
                Ok(())
            }
            FdEntry::Keyboard { dev } => {
                dev.shutdown();
                self.table.clear(fd);
                Ok(())
            }
        }
    }

    /// Duplicate `oldfd` onto `newfd`, closing an occupied `newfd` first.
    ///
    /// The slot is copied by value: a duplicated file descriptor gets its
    /// own offset and the two diverge afterwards. (POSIX dup2 shares the
    /// file position; this layer deliberately does not.)
    pub fn dup2(&self, oldfd: Fd, newfd: Fd) -> SysResult<Fd> {
        let result = self.dup2_inner(oldfd, newfd);
        self.track(result)
    }

    fn dup2_inner(&self, oldfd: Fd, newfd: Fd) -> SysResult<Fd> {
        let entry = self.table.entry(oldfd);
        if entry.is_empty() || newfd >= crate::core::types::NOFILE {
            debug!("dup2({}, {}): bad descriptor", oldfd, newfd);
            return Err(SysError::BadDescriptor);
        }
        if !self.table.entry(newfd).is_empty() {
            if let Err(error) = self.close_inner(newfd) {
                warn!("dup2({}, {}): close failed: {}", oldfd, newfd, error);
            }
        }
        self.table.set(newfd, entry);
        Ok(newfd)
    }

    /// Stat by path: transient open, stat, close on the import session
    pub fn stat(&self, path: &str) -> SysResult<FileStat> {
        let result = self.stat_inner(path);
        self.track(result)
    }

    fn stat_inner(&self, path: &str) -> SysResult<FileStat> {
        debug!("stat({})", path);
        let handle = self.fs.open(path).map_err(|_| SysError::Io)?;
        let stat = self.fs.stat(handle).map_err(|_| SysError::Io);
        if self.fs.close(handle).is_err() {
            warn!("stat({}): transient handle close failed", path);
        }
        Ok(FileStat::from_backend(stat?))
    }

    pub fn fstat(&self, fd: Fd) -> SysResult<FileStat> {
        let result = self.fstat_inner(fd);
        self.track(result)
    }

    fn fstat_inner(&self, fd: Fd) -> SysResult<FileStat> {
        match self.table.entry(fd) {
            entry @ (FdEntry::Console | FdEntry::Socket { .. }) => {
                let mode = if matches!(entry, FdEntry::Console) {
                    S_IFCHR | S_IRUSR | S_IWUSR
                } else {
                    S_IFSOCK | S_IRUSR | S_IWUSR
                };
                let now_secs = self.clock.wall_time().as_secs() as i64;
                Ok(FileStat::synthetic(mode, now_secs))
            }
            FdEntry::File { handle, .. } => {
                let stat = self.fs.stat(handle).map_err(|_| SysError::Io)?;
                Ok(FileStat::from_backend(stat))
            }
            other => {
                debug!("fstat({}): bad descriptor ({})", fd, other.kind_name());
                Err(SysError::BadDescriptor)
            }
        }
    }

    /// The only supported command is `F_SETFL` with `O_NONBLOCK` on a
    /// socket, which forwards to the stack's non-blocking toggle
    pub fn fcntl(&self, fd: Fd, cmd: i32, arg: i64) -> SysResult<i32> {
        let result = self.fcntl_inner(fd, cmd, arg);
        self.track(result)
    }

    fn fcntl_inner(&self, fd: Fd, cmd: i32, arg: i64) -> SysResult<i32> {
        if cmd == F_SETFL && arg as u32 & !O_NONBLOCK == 0 {
            if let FdEntry::Socket { handle } = self.table.entry(fd) {
                let nonblocking = arg as u32 & O_NONBLOCK != 0;
                self.net
                    .set_nonblocking(handle, nonblocking)
                    .map_err(SysError::from)?;
                return Ok(0);
            }
        }
        warn!("fcntl({}, {}, {:#x}): unsupported", fd, cmd, arg);
        Err(SysError::NotImplemented("fcntl command"))
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> SysResult<()> {
        let result = self.mkdir_inner(path, mode);
        self.track(result)
    }

    fn mkdir_inner(&self, path: &str, mode: u32) -> SysResult<()> {
        self.fs
            .create(path, true, mode)
            .map(|_| ())
            .map_err(|_| SysError::Io)
    }

    pub fn remove(&self, path: &str) -> SysResult<()> {
        let result = self.fs.remove(path).map_err(|_| SysError::Io);
        self.track(result)
    }

    pub fn unlink(&self, path: &str) -> SysResult<()> {
        self.remove(path)
    }

    pub fn rmdir(&self, path: &str) -> SysResult<()> {
        self.remove(path)
    }
}
