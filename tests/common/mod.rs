/*!
 * Shared Test Fixtures
 * Working in-memory backends for integration tests
 *
 * The unit tests use mock expectations; these fakes instead carry real
 * state so whole call sequences (open/write/read, select wakeups,
 * mapping round-trips) can run against them.
 */

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use guest_posix::backend::sched::{EventSource, Scheduler};
use guest_posix::backend::traits::{
    BlockDevice, Console, EventChannel, FsImport, Hypervisor, KeyboardDevice, NetStack,
    StoreSession, TapDevice, WallClock,
};
use guest_posix::backend::types::{
    DirPage, FsError, FsHandle, FsStat, PageUnmap, SockHandle, SocketReadiness,
};
use guest_posix::core::types::ThreadId;
use guest_posix::{Backends, Errno, PosixShim};

pub const MAIN_THREAD: ThreadId = 1;

/// Capture shim logs in test output (RUST_LOG to enable)
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory filesystem-import session
pub struct FakeFs {
    state: Mutex<FsState>,
    pub page_size: usize,
    pub list_calls: AtomicUsize,
}

struct FsState {
    files: HashMap<String, Vec<u8>>,
    dirs: HashMap<String, Vec<String>>,
    handles: HashMap<FsHandle, String>,
    next_handle: FsHandle,
}

impl FakeFs {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FsState {
                files: HashMap::new(),
                dirs: HashMap::new(),
                handles: HashMap::new(),
                next_handle: 1,
            }),
            page_size: 3,
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(page_size: usize) -> Self {
        let mut fs = Self::new();
        fs.page_size = page_size;
        fs
    }

    pub fn seed_file(&self, path: &str, data: &[u8]) {
        self.state.lock().files.insert(path.into(), data.to_vec());
    }

    pub fn seed_dir(&self, path: &str, entries: &[&str]) {
        self.state
            .lock()
            .dirs
            .insert(path.into(), entries.iter().map(|e| e.to_string()).collect());
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn open_handles(&self) -> usize {
        self.state.lock().handles.len()
    }
}

impl FsImport for FakeFs {
    fn open(&self, path: &str) -> Result<FsHandle, FsError> {
        let mut state = self.state.lock();
        if !state.files.contains_key(path) {
            return Err(FsError(-2));
        }
        let handle = state.next_handle;
        state.next_handle += 1;
        state.handles.insert(handle, path.into());
        Ok(handle)
    }

    fn create(&self, path: &str, directory: bool, _mode: u32) -> Result<FsHandle, FsError> {
        let mut state = self.state.lock();
        if directory {
            state.dirs.entry(path.into()).or_default();
            return Ok(0);
        }
        state.files.insert(path.into(), Vec::new());
        let handle = state.next_handle;
        state.next_handle += 1;
        state.handles.insert(handle, path.into());
        Ok(handle)
    }

    fn read(&self, handle: FsHandle, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        let state = self.state.lock();
        let path = state.handles.get(&handle).ok_or(FsError(-9))?;
        let data = state.files.get(path).ok_or(FsError(-2))?;
        let start = (offset as usize).min(data.len());
        let n = (data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write(&self, handle: FsHandle, buf: &[u8], offset: u64) -> Result<usize, FsError> {
        let mut state = self.state.lock();
        let path = state.handles.get(&handle).ok_or(FsError(-9))?.clone();
        let data = state.files.get_mut(&path).ok_or(FsError(-2))?;
        let end = offset as usize + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset as usize..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn stat(&self, handle: FsHandle) -> Result<FsStat, FsError> {
        let state = self.state.lock();
        let path = state.handles.get(&handle).ok_or(FsError(-9))?;
        let data = state.files.get(path).ok_or(FsError(-2))?;
        Ok(FsStat {
            mode: 0o100644,
            uid: 0,
            gid: 0,
            size: data.len() as u64,
            atime_secs: 0,
            mtime_secs: 0,
            ctime_secs: 0,
        })
    }

    fn sync(&self, _handle: FsHandle) -> Result<(), FsError> {
        Ok(())
    }

    fn truncate(&self, handle: FsHandle, length: u64) -> Result<(), FsError> {
        let mut state = self.state.lock();
        let path = state.handles.get(&handle).ok_or(FsError(-9))?.clone();
        let data = state.files.get_mut(&path).ok_or(FsError(-2))?;
        data.resize(length as usize, 0);
        Ok(())
    }

    fn close(&self, handle: FsHandle) -> Result<(), FsError> {
        self.state
            .lock()
            .handles
            .remove(&handle)
            .map(|_| ())
            .ok_or(FsError(-9))
    }

    fn remove(&self, path: &str) -> Result<(), FsError> {
        let mut state = self.state.lock();
        if state.files.remove(path).is_none() && state.dirs.remove(path).is_none() {
            return Err(FsError(-2));
        }
        Ok(())
    }

    fn list_dir(&self, path: &str, offset: u64) -> Result<DirPage, FsError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        let entries = state.dirs.get(path).ok_or(FsError(-2))?;
        let start = (offset as usize).min(entries.len());
        let end = (start + self.page_size).min(entries.len());
        Ok(DirPage {
            entries: entries[start..end].to_vec(),
            has_more: end < entries.len(),
        })
    }
}

/// Scripted TCP/IP stack: per-handle receive queues and readiness flags
pub struct FakeNet {
    state: Mutex<NetState>,
}

struct NetState {
    next_handle: SockHandle,
    rx: HashMap<SockHandle, Vec<u8>>,
    sent: HashMap<SockHandle, Vec<u8>>,
    open: usize,
}

impl FakeNet {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NetState {
                next_handle: 1,
                rx: HashMap::new(),
                sent: HashMap::new(),
                open: 0,
            }),
        }
    }

    pub fn push_rx(&self, handle: SockHandle, data: &[u8]) {
        self.state
            .lock()
            .rx
            .entry(handle)
            .or_default()
            .extend_from_slice(data);
    }

    pub fn sent(&self, handle: SockHandle) -> Vec<u8> {
        self.state.lock().sent.get(&handle).cloned().unwrap_or_default()
    }

    pub fn open_sockets(&self) -> usize {
        self.state.lock().open
    }
}

impl NetStack for FakeNet {
    fn socket(&self, _domain: i32, _socktype: i32, _protocol: i32) -> Result<SockHandle, Errno> {
        let mut state = self.state.lock();
        let handle = state.next_handle;
        state.next_handle += 1;
        state.open += 1;
        Ok(handle)
    }

    fn accept(&self, _handle: SockHandle) -> Result<(SockHandle, SocketAddr), Errno> {
        let mut state = self.state.lock();
        let handle = state.next_handle;
        state.next_handle += 1;
        state.open += 1;
        Ok((handle, "127.0.0.1:40000".parse().map_err(|_| Errno::Einval)?))
    }

    fn bind(&self, _handle: SockHandle, _addr: SocketAddr) -> Result<(), Errno> {
        Ok(())
    }

    fn connect(&self, _handle: SockHandle, _addr: SocketAddr) -> Result<(), Errno> {
        Ok(())
    }

    fn listen(&self, _handle: SockHandle, _backlog: i32) -> Result<(), Errno> {
        Ok(())
    }

    fn read(&self, handle: SockHandle, buf: &mut [u8]) -> Result<usize, Errno> {
        let mut state = self.state.lock();
        let queue = state.rx.entry(handle).or_default();
        if queue.is_empty() {
            return Err(Errno::Eagain);
        }
        let n = queue.len().min(buf.len());
        buf[..n].copy_from_slice(&queue[..n]);
        queue.drain(..n);
        Ok(n)
    }

    fn write(&self, handle: SockHandle, buf: &[u8]) -> Result<usize, Errno> {
        self.state
            .lock()
            .sent
            .entry(handle)
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn recv(&self, handle: SockHandle, buf: &mut [u8], _flags: i32) -> Result<usize, Errno> {
        self.read(handle, buf)
    }

    fn send(&self, handle: SockHandle, buf: &[u8], _flags: i32) -> Result<usize, Errno> {
        self.write(handle, buf)
    }

    fn recvfrom(
        &self,
        handle: SockHandle,
        buf: &mut [u8],
        _flags: i32,
    ) -> Result<(usize, SocketAddr), Errno> {
        let n = self.read(handle, buf)?;
        Ok((n, "127.0.0.1:40000".parse().map_err(|_| Errno::Einval)?))
    }

    fn sendto(
        &self,
        handle: SockHandle,
        buf: &[u8],
        _flags: i32,
        _addr: SocketAddr,
    ) -> Result<usize, Errno> {
        self.write(handle, buf)
    }

    fn getsockopt(
        &self,
        _handle: SockHandle,
        _level: i32,
        _optname: i32,
        _optval: &mut [u8],
    ) -> Result<usize, Errno> {
        Ok(0)
    }

    fn setsockopt(
        &self,
        _handle: SockHandle,
        _level: i32,
        _optname: i32,
        _optval: &[u8],
    ) -> Result<(), Errno> {
        Ok(())
    }

    fn getsockname(&self, _handle: SockHandle) -> Result<SocketAddr, Errno> {
        "127.0.0.1:40000".parse().map_err(|_| Errno::Einval)
    }

    fn set_nonblocking(&self, _handle: SockHandle, _nonblocking: bool) -> Result<(), Errno> {
        Ok(())
    }

    fn poll(&self, entries: &mut [SocketReadiness]) -> Result<usize, Errno> {
        let state = self.state.lock();
        let mut ready = 0;
        for entry in entries.iter_mut() {
            let has_rx = state.rx.get(&entry.handle).is_some_and(|q| !q.is_empty());
            entry.read = entry.read && has_rx;
            // Transmit buffers never fill in the fake
            entry.except = false;
            if entry.any() {
                ready += 1;
            }
        }
        Ok(ready)
    }

    fn close(&self, _handle: SockHandle) -> Result<(), Errno> {
        self.state.lock().open -= 1;
        Ok(())
    }
}

/// Cooperative scheduler over a condvar: single application thread, real
/// deadline waits, per-source waiter counts
pub struct FakeScheduler {
    state: Mutex<SchedState>,
    wake: Condvar,
    epoch: Instant,
    pub schedule_calls: AtomicUsize,
}

struct SchedState {
    runnable: bool,
    deadline_ns: Option<u64>,
    waiters: HashMap<EventSource, usize>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SchedState {
                runnable: true,
                deadline_ns: None,
                waiters: HashMap::new(),
            }),
            wake: Condvar::new(),
            epoch: Instant::now(),
            schedule_calls: AtomicUsize::new(0),
        }
    }

    /// Wake the application thread if it is registered on `source`
    pub fn post_event(&self, source: EventSource) -> bool {
        let mut state = self.state.lock();
        if state.waiters.get(&source).copied().unwrap_or(0) == 0 {
            return false;
        }
        state.runnable = true;
        self.wake.notify_all();
        true
    }

    pub fn waiter_count(&self, source: EventSource) -> usize {
        self.state.lock().waiters.get(&source).copied().unwrap_or(0)
    }

    pub fn total_waiters(&self) -> usize {
        self.state.lock().waiters.values().sum()
    }
}

impl Scheduler for FakeScheduler {
    fn current(&self) -> ThreadId {
        MAIN_THREAD
    }

    fn main_thread(&self) -> ThreadId {
        MAIN_THREAD
    }

    fn monotonic_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn mark_runnable(&self, _thread: ThreadId) {
        self.state.lock().runnable = true;
        self.wake.notify_all();
    }

    fn clear_runnable(&self, _thread: ThreadId) {
        self.state.lock().runnable = false;
    }

    fn set_wakeup(&self, _thread: ThreadId, deadline_ns: u64) {
        self.state.lock().deadline_ns = Some(deadline_ns);
    }

    fn schedule(&self) {
        self.schedule_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        while !state.runnable {
            match state.deadline_ns {
                Some(deadline_ns) => {
                    let now = self.monotonic_ns();
                    if now >= deadline_ns {
                        state.runnable = true;
                        break;
                    }
                    let until = self.epoch + Duration::from_nanos(deadline_ns);
                    if self.wake.wait_until(&mut state, until).timed_out() {
                        state.runnable = true;
                    }
                }
                None => self.wake.wait(&mut state),
            }
        }
        state.deadline_ns = None;
    }

    fn add_waiter(&self, _thread: ThreadId, source: EventSource) {
        let mut state = self.state.lock();
        *state.waiters.entry(source).or_insert(0) += 1;
        state.runnable = false;
    }

    fn remove_waiter(&self, _thread: ThreadId, source: EventSource) {
        let mut state = self.state.lock();
        if let Some(count) = state.waiters.get_mut(&source) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Paravirtual network front-end with a frame queue
pub struct FakeTap {
    frames: Mutex<Vec<Vec<u8>>>,
    transmitted: Mutex<Vec<Vec<u8>>>,
    pub shutdowns: AtomicUsize,
}

impl FakeTap {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            transmitted: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub fn push_frame(&self, frame: &[u8]) {
        self.frames.lock().push(frame.to_vec());
    }

    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.transmitted.lock().clone()
    }
}

impl TapDevice for FakeTap {
    fn receive(&self, buf: &mut [u8]) -> isize {
        let mut frames = self.frames.lock();
        if frames.is_empty() {
            return -1;
        }
        let frame = frames.remove(0);
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        n as isize
    }

    fn transmit(&self, buf: &[u8]) {
        self.transmitted.lock().push(buf.to_vec());
    }

    fn has_event(&self) -> bool {
        !self.frames.lock().is_empty()
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeBlock {
    pub event: AtomicBool,
    pub shutdowns: AtomicUsize,
}

impl FakeBlock {
    pub fn new() -> Self {
        Self {
            event: AtomicBool::new(false),
            shutdowns: AtomicUsize::new(0),
        }
    }
}

impl BlockDevice for FakeBlock {
    fn has_event(&self) -> bool {
        self.event.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeKeyboard {
    pub pending_events: Mutex<Vec<u8>>,
    pub shutdowns: AtomicUsize,
}

impl FakeKeyboard {
    pub fn new() -> Self {
        Self {
            pending_events: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
        }
    }
}

impl KeyboardDevice for FakeKeyboard {
    fn receive_events(&self, buf: &mut [u8]) -> isize {
        let mut pending = self.pending_events.lock();
        if pending.is_empty() {
            return -1;
        }
        let n = pending.len().min(buf.len());
        buf[..n].copy_from_slice(&pending[..n]);
        pending.drain(..n);
        (n / guest_posix::core::types::KBD_EVENT_SIZE) as isize
    }

    fn has_event(&self) -> bool {
        !self.pending_events.lock().is_empty()
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeStore {
    pub watch_event: AtomicBool,
    pub closes: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            watch_event: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
        }
    }
}

impl StoreSession for FakeStore {
    fn has_watch_event(&self) -> bool {
        self.watch_event.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeEventChannel {
    pub event: AtomicBool,
    pub closes: AtomicUsize,
}

impl FakeEventChannel {
    pub fn new() -> Self {
        Self {
            event: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
        }
    }
}

impl EventChannel for FakeEventChannel {
    fn has_event(&self) -> bool {
        self.event.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeConsole {
    pub written: Mutex<Vec<u8>>,
}

impl FakeConsole {
    pub fn new() -> Self {
        Self {
            written: Mutex::new(Vec::new()),
        }
    }
}

impl Console for FakeConsole {
    fn write(&self, buf: &[u8]) {
        self.written.lock().extend_from_slice(buf);
    }
}

pub struct FakeWallClock(pub Duration);

impl WallClock for FakeWallClock {
    fn wall_time(&self) -> Duration {
        self.0
    }
}

/// Bump page allocator with recorded invalidation batches
pub struct FakeHypervisor {
    next_vaddr: AtomicUsize,
    pub unmapped: Mutex<Vec<Vec<PageUnmap>>>,
    pub fail_allocations: AtomicBool,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self {
            next_vaddr: AtomicUsize::new(0x100000),
            unmapped: Mutex::new(Vec::new()),
            fail_allocations: AtomicBool::new(false),
        }
    }
}

impl Hypervisor for FakeHypervisor {
    fn alloc_zeroed_pages(&self, count: usize) -> Option<usize> {
        if self.fail_allocations.load(Ordering::SeqCst) {
            return None;
        }
        Some(
            self.next_vaddr
                .fetch_add(count * guest_posix::PAGE_SIZE, Ordering::SeqCst),
        )
    }

    fn unmap_batch(&self, calls: &mut [PageUnmap]) -> Result<(), i32> {
        self.unmapped.lock().push(calls.to_vec());
        Ok(())
    }
}

/// Every fake wired into one shim, with the fakes still reachable
pub struct Harness {
    pub shim: PosixShim,
    pub fs: Arc<FakeFs>,
    pub net: Arc<FakeNet>,
    pub console: Arc<FakeConsole>,
    pub sched: Arc<FakeScheduler>,
    pub hypervisor: Arc<FakeHypervisor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_fs(FakeFs::new())
    }

    pub fn with_fs(fs: FakeFs) -> Self {
        init_logging();
        let fs = Arc::new(fs);
        let net = Arc::new(FakeNet::new());
        let console = Arc::new(FakeConsole::new());
        let sched = Arc::new(FakeScheduler::new());
        let hypervisor = Arc::new(FakeHypervisor::new());
        let shim = PosixShim::new(Backends {
            fs: fs.clone(),
            net: net.clone(),
            console: console.clone(),
            sched: sched.clone(),
            clock: Arc::new(FakeWallClock(Duration::from_secs(1_700_000_000))),
            hypervisor: hypervisor.clone(),
        });
        Self {
            shim,
            fs,
            net,
            console,
            sched,
            hypervisor,
        }
    }
}
