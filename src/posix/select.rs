/*!
 * Synchronous Readiness Engine
 * Non-blocking readiness pass plus the blocking `select` protocol
 *
 * Blocking waits register on every event source *before* the first
 * readiness check. An event posted after registration is therefore
 * guaranteed to wake the thread; the check-then-sleep race is closed by
 * ordering, not by locking.
 */

use std::time::Duration;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::backend::sched::{EventSource, WaiterGuard};
use crate::backend::types::SocketReadiness;
use crate::core::errors::{SysError, SysResult};
use crate::core::types::{Fd, NOFILE};
use crate::fd::FdEntry;

use super::PosixShim;

/// Descriptor interest set for `select`, one bit per table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FdSet(u64);

impl FdSet {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn set(&mut self, fd: Fd) {
        debug_assert!(fd < NOFILE);
        self.0 |= 1 << fd;
    }

    pub fn clear(&mut self, fd: Fd) {
        self.0 &= !(1 << fd);
    }

    pub fn contains(&self, fd: Fd) -> bool {
        fd < NOFILE && self.0 & (1 << fd) != 0
    }

    pub fn zero(&mut self) {
        self.0 = 0;
    }

    /// Number of descriptors set
    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }
}

impl PosixShim {
    /// One non-blocking readiness pass over `[0, nfds)`.
    ///
    /// Clears every interest bit that is not currently ready and returns the
    /// total number of bits left across the three sets. Infallible: a stack
    /// poll failure reads as nothing ready.
    pub fn poll_once(
        &self,
        nfds: usize,
        readfds: &mut FdSet,
        writefds: &mut FdSet,
        exceptfds: &mut FdSet,
    ) -> usize {
        let nfds = nfds.min(NOFILE);

        // Phase 1: one batched stack query for all socket descriptors
        let mut sockets: Vec<(Fd, SocketReadiness)> = Vec::new();
        for fd in 0..nfds {
            if !(readfds.contains(fd) || writefds.contains(fd) || exceptfds.contains(fd)) {
                continue;
            }
            if let FdEntry::Socket { handle } = self.table.entry(fd) {
                sockets.push((
                    fd,
                    SocketReadiness {
                        handle,
                        read: readfds.contains(fd),
                        write: writefds.contains(fd),
                        except: exceptfds.contains(fd),
                    },
                ));
            }
        }
        if !sockets.is_empty() {
            let mut entries: Vec<SocketReadiness> =
                sockets.iter().map(|(_, query)| *query).collect();
            match self.net.poll(&mut entries) {
                Ok(_) => {
                    for ((_, query), polled) in sockets.iter_mut().zip(entries) {
                        *query = polled;
                    }
                }
                Err(error) => {
                    warn!("socket readiness poll failed: {:?}", error);
                    for (_, query) in sockets.iter_mut() {
                        query.read = false;
                        query.write = false;
                        query.except = false;
                    }
                }
            }
        }
        // Phase 2 walks the descriptors in the same order phase 1 collected
        // them, so the socket answers line up one-to-one.
        let mut socket_results = sockets.into_iter();

        // Phase 2: per-kind readiness rules
        for fd in 0..nfds {
            if !(readfds.contains(fd) || writefds.contains(fd) || exceptfds.contains(fd)) {
                continue;
            }
            match self.table.entry(fd) {
                FdEntry::Console => {
                    // Write always ready, never readable
                    readfds.clear(fd);
                    exceptfds.clear(fd);
                }
                FdEntry::Socket { .. } => {
                    let ready = socket_results
                        .next()
                        .map(|(_, query)| query)
                        .unwrap_or_else(|| SocketReadiness::new(0));
                    if !ready.read {
                        readfds.clear(fd);
                    }
                    if !ready.write {
                        writefds.clear(fd);
                    }
                    if !ready.except {
                        exceptfds.clear(fd);
                    }
                }
                FdEntry::Store { session } => {
                    if !session.has_watch_event() {
                        readfds.clear(fd);
                    }
                    writefds.clear(fd);
                    exceptfds.clear(fd);
                }
                FdEntry::EventChannel { channel } => {
                    if !channel.has_event() {
                        readfds.clear(fd);
                    }
                    writefds.clear(fd);
                    exceptfds.clear(fd);
                }
                FdEntry::Tap { dev } => {
                    if !dev.has_event() {
                        readfds.clear(fd);
                    }
                    writefds.clear(fd);
                    exceptfds.clear(fd);
                }
                FdEntry::Block { dev } => {
                    if !dev.has_event() {
                        readfds.clear(fd);
                    }
                    writefds.clear(fd);
                    exceptfds.clear(fd);
                }
                FdEntry::Keyboard { dev } => {
                    if !dev.has_event() {
                        readfds.clear(fd);
                    }
                    writefds.clear(fd);
                    exceptfds.clear(fd);
                }
                FdEntry::File { .. } | FdEntry::Empty => {
                    // Regular files never participate; empty slots are inert
                    readfds.clear(fd);
                    writefds.clear(fd);
                    exceptfds.clear(fd);
                }
            }
        }

        readfds.count() + writefds.count() + exceptfds.count()
    }

    /// Block until a watched descriptor is ready or the timeout expires.
    ///
    /// Restricted to the application thread. On success the sets are reduced
    /// to the ready descriptors and the count is returned; on timeout the
    /// sets are zeroed, `timeout` is zeroed, and 0 is returned. A wakeup that
    /// finds nothing ready (and an unexpired deadline) reports `EINTR`.
    pub fn select(
        &self,
        nfds: usize,
        readfds: &mut FdSet,
        writefds: &mut FdSet,
        exceptfds: &mut FdSet,
        timeout: Option<&mut Duration>,
    ) -> SysResult<usize> {
        let result = self.select_inner(nfds, readfds, writefds, exceptfds, timeout);
        self.track(result)
    }

    fn select_inner(
        &self,
        nfds: usize,
        readfds: &mut FdSet,
        writefds: &mut FdSet,
        exceptfds: &mut FdSet,
        timeout: Option<&mut Duration>,
    ) -> SysResult<usize> {
        let thread = self.sched.current();
        assert_eq!(
            thread,
            self.sched.main_thread(),
            "select is restricted to the application thread"
        );

        let deadline_ns = timeout
            .as_deref()
            .map(|t| self.sched.monotonic_ns().saturating_add(t.as_nanos() as u64));

        // Register on every source before looking at readiness. Registration
        // also clears the runnable flag, so the fast paths below re-mark it.
        let _guards: Vec<WaiterGuard<'_>> = EventSource::ALL
            .iter()
            .map(|source| WaiterGuard::register(&*self.sched, thread, *source))
            .collect();

        let (mut rd, mut wr, mut ex) = (*readfds, *writefds, *exceptfds);
        let ready = self.poll_once(nfds, &mut rd, &mut wr, &mut ex);
        if ready > 0 {
            trace!("select: {} ready without blocking", ready);
            *readfds = rd;
            *writefds = wr;
            *exceptfds = ex;
            self.sched.mark_runnable(thread);
            return Ok(ready);
        }
        if let Some(deadline) = deadline_ns {
            if self.sched.monotonic_ns() >= deadline {
                readfds.zero();
                writefds.zero();
                exceptfds.zero();
                if let Some(t) = timeout {
                    *t = Duration::ZERO;
                }
                self.sched.mark_runnable(thread);
                return Ok(0);
            }
            self.sched.set_wakeup(thread, deadline);
        }

        self.sched.schedule();

        let (mut rd, mut wr, mut ex) = (*readfds, *writefds, *exceptfds);
        let ready = self.poll_once(nfds, &mut rd, &mut wr, &mut ex);
        if ready > 0 {
            *readfds = rd;
            *writefds = wr;
            *exceptfds = ex;
            return Ok(ready);
        }
        if let Some(deadline) = deadline_ns {
            if self.sched.monotonic_ns() >= deadline {
                readfds.zero();
                writefds.zero();
                exceptfds.zero();
                if let Some(t) = timeout {
                    *t = Duration::ZERO;
                }
                return Ok(0);
            }
        }
        debug!("select: woken with nothing ready");
        Err(SysError::Interrupted)
    }
}
