/*!
 * Clocks and Sleeps
 * Deadline sleeps through the cooperative scheduler, clock reads from the
 * monotonic counter and the wall-clock source
 */

use std::time::Duration;

use log::trace;

use crate::core::errors::SysResult;
use crate::core::types::ClockId;

use super::PosixShim;

impl PosixShim {
    /// Sleep for at least `duration`. Returns the unslept remainder, which
    /// is zero unless the scheduler resumed the thread early.
    pub fn nanosleep(&self, duration: Duration) -> Duration {
        let thread = self.sched.current();
        let deadline = self
            .sched
            .monotonic_ns()
            .saturating_add(duration.as_nanos() as u64);
        trace!("nanosleep until {} ns", deadline);

        self.sched.clear_runnable(thread);
        self.sched.set_wakeup(thread, deadline);
        self.sched.schedule();

        let now = self.sched.monotonic_ns();
        Duration::from_nanos(deadline.saturating_sub(now))
    }

    /// Sleep for `seconds`; a sub-second unslept remainder counts as a whole
    /// second
    pub fn sleep(&self, seconds: u32) -> u32 {
        let remaining = self.nanosleep(Duration::from_secs(u64::from(seconds)));
        if remaining.is_zero() {
            return 0;
        }
        let mut whole = remaining.as_secs() as u32;
        if remaining.subsec_nanos() > 0 {
            whole += 1;
        }
        whole
    }

    pub fn usleep(&self, micros: u64) -> Duration {
        self.nanosleep(Duration::from_micros(micros))
    }

    /// Read a clock. `Monotonic` is time since boot from the scheduler's
    /// counter; `Realtime` is wall time since the Unix epoch.
    pub fn clock_gettime(&self, clock: ClockId) -> SysResult<Duration> {
        let result = match clock {
            ClockId::Monotonic => Ok(Duration::from_nanos(self.sched.monotonic_ns())),
            ClockId::Realtime => Ok(self.clock.wall_time()),
        };
        self.track(result)
    }
}
