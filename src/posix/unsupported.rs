/*!
 * Unsupported Surface
 * Calls outside the shim's scope: most report ENOSYS, a few terminate
 *
 * Signals, dynamic loading, and resource accounting have no backing in a
 * single-process guest. Callers that can tolerate the absence get ENOSYS;
 * `link` and `kill` mean the application depends on semantics the guest
 * cannot fake, so they terminate by policy.
 */

use log::warn;

use crate::core::errors::{SysError, SysResult};

use super::PosixShim;

macro_rules! not_implemented {
    ($self:expr, $name:literal) => {{
        warn!(concat!($name, ": not implemented"));
        $self.track(Err(SysError::NotImplemented($name)))
    }};
}

impl PosixShim {
    pub fn readlink(&self, _path: &str) -> SysResult<String> {
        not_implemented!(self, "readlink")
    }

    pub fn chdir(&self, _path: &str) -> SysResult<()> {
        not_implemented!(self, "chdir")
    }

    pub fn sigemptyset(&self) -> SysResult<()> {
        not_implemented!(self, "sigemptyset")
    }

    pub fn sigfillset(&self) -> SysResult<()> {
        not_implemented!(self, "sigfillset")
    }

    pub fn sigaddset(&self, _signum: i32) -> SysResult<()> {
        not_implemented!(self, "sigaddset")
    }

    pub fn sigdelset(&self, _signum: i32) -> SysResult<()> {
        not_implemented!(self, "sigdelset")
    }

    pub fn sigismember(&self, _signum: i32) -> SysResult<bool> {
        not_implemented!(self, "sigismember")
    }

    pub fn sigprocmask(&self, _how: i32) -> SysResult<()> {
        not_implemented!(self, "sigprocmask")
    }

    pub fn sigaction(&self, _signum: i32) -> SysResult<()> {
        not_implemented!(self, "sigaction")
    }

    pub fn dlopen(&self, _path: &str) -> SysResult<()> {
        not_implemented!(self, "dlopen")
    }

    pub fn dlsym(&self, _symbol: &str) -> SysResult<()> {
        not_implemented!(self, "dlsym")
    }

    pub fn dlclose(&self) -> SysResult<()> {
        not_implemented!(self, "dlclose")
    }

    pub fn getrusage(&self) -> SysResult<()> {
        not_implemented!(self, "getrusage")
    }

    pub fn getrlimit(&self, _resource: i32) -> SysResult<()> {
        not_implemented!(self, "getrlimit")
    }

    /// Hard links cannot be faked over the import protocol; an application
    /// that needs one cannot run here
    pub fn link(&self, _oldpath: &str, _newpath: &str) -> ! {
        panic!("link is not supported in this guest");
    }

    /// There is exactly one process and no signal delivery
    pub fn kill(&self, _pid: u32, _signum: i32) -> ! {
        panic!("kill is not supported in this guest");
    }
}
