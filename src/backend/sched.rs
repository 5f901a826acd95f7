/*!
 * Cooperative Scheduler Interface
 *
 * The shim never spins: blocking waits and sleeps go through the kernel's
 * cooperative scheduler. Suspension points are explicit — a thread is only
 * ever descheduled inside `select` and the sleep family.
 */

use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::core::types::ThreadId;

/// The five independently waitable event sources a blocking wait registers
/// against. One per backend wakeup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    /// Network front-end receive queue
    Network,
    /// Generic kernel event-channel queue
    Events,
    /// Block front-end completion queue
    Block,
    /// Configuration-store watch queue
    StoreWatch,
    /// Keyboard front-end input queue
    Keyboard,
}

impl EventSource {
    /// Every source, in registration order
    pub const ALL: [EventSource; 5] = [
        EventSource::Network,
        EventSource::Events,
        EventSource::Block,
        EventSource::StoreWatch,
        EventSource::Keyboard,
    ];
}

/// Cooperative scheduler operations the shim consumes.
///
/// `add_waiter` both enqueues the thread on the source's wait queue and
/// clears its runnable state, so registration must happen *before* any
/// readiness check: an event posted after registration is guaranteed to wake
/// the thread. Fast paths that never suspend re-mark themselves runnable.
#[cfg_attr(test, automock)]
pub trait Scheduler: Send + Sync {
    /// The calling thread
    fn current(&self) -> ThreadId;

    /// The single application ("main") thread; blocking waits are restricted
    /// to it
    fn main_thread(&self) -> ThreadId;

    /// Raw monotonic counter, nanoseconds since boot
    fn monotonic_ns(&self) -> u64;

    /// Mark the thread runnable again
    fn mark_runnable(&self, thread: ThreadId);

    /// Clear the thread's runnable state ahead of a voluntary yield
    fn clear_runnable(&self, thread: ThreadId);

    /// Record an absolute wakeup deadline (monotonic ns) for the thread; the
    /// scheduler clears it once the thread resumes
    fn set_wakeup(&self, thread: ThreadId, deadline_ns: u64);

    /// Yield. Returns once the calling thread is runnable again, whether by
    /// an event wakeup or by deadline expiry.
    fn schedule(&self);

    /// Enqueue the thread on the source's wait queue and clear its runnable
    /// state
    fn add_waiter(&self, thread: ThreadId, source: EventSource);

    /// Remove the thread from the source's wait queue
    fn remove_waiter(&self, thread: ThreadId, source: EventSource);
}

/// RAII waiter registration.
///
/// Registration must be deregistered on every exit path of a blocking wait,
/// success or failure, or future wakeups leak. Encoding the registration as
/// a guard makes that unconditional.
pub struct WaiterGuard<'a> {
    sched: &'a dyn Scheduler,
    thread: ThreadId,
    source: EventSource,
}

impl<'a> WaiterGuard<'a> {
    pub fn register(sched: &'a dyn Scheduler, thread: ThreadId, source: EventSource) -> Self {
        sched.add_waiter(thread, source);
        Self {
            sched,
            thread,
            source,
        }
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.sched.remove_waiter(self.thread, self.source);
    }
}
