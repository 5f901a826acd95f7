/*!
 * Socket Operations
 * Thin descriptor wrappers over the TCP/IP stack
 *
 * The stack keeps all protocol state behind its own handles; this layer
 * only pairs those handles with descriptors and forwards everything else
 * verbatim, errors included.
 */

use std::net::SocketAddr;

use log::{debug, info};

use crate::backend::types::SockHandle;
use crate::core::errors::{SysError, SysResult};
use crate::core::types::Fd;
use crate::fd::FdEntry;

use super::PosixShim;

impl PosixShim {
    /// The stack handle behind a socket descriptor, or EBADF
    fn socket_handle(&self, fd: Fd, op: &str) -> SysResult<SockHandle> {
        match self.table.entry(fd) {
            FdEntry::Socket { handle } => Ok(handle),
            other => {
                debug!("{}({}): bad descriptor ({})", op, fd, other.kind_name());
                Err(SysError::BadDescriptor)
            }
        }
    }

    pub fn socket(&self, domain: i32, socktype: i32, protocol: i32) -> SysResult<Fd> {
        let result = self.socket_inner(domain, socktype, protocol);
        self.track(result)
    }

    fn socket_inner(&self, domain: i32, socktype: i32, protocol: i32) -> SysResult<Fd> {
        let handle = self
            .net
            .socket(domain, socktype, protocol)
            .map_err(SysError::from)?;
        let fd = self.table.allocate(FdEntry::Socket { handle });
        info!("socket -> {}", fd);
        Ok(fd)
    }

    /// Accept a connection; the new stack handle gets its own descriptor
    pub fn accept(&self, fd: Fd) -> SysResult<(Fd, SocketAddr)> {
        let result = self.accept_inner(fd);
        self.track(result)
    }

    fn accept_inner(&self, fd: Fd) -> SysResult<(Fd, SocketAddr)> {
        let handle = self.socket_handle(fd, "accept")?;
        let (accepted, peer) = self.net.accept(handle).map_err(SysError::from)?;
        let new_fd = self.table.allocate(FdEntry::Socket { handle: accepted });
        info!("accepted on {} -> {}", fd, new_fd);
        Ok((new_fd, peer))
    }

    pub fn bind(&self, fd: Fd, addr: SocketAddr) -> SysResult<()> {
        let result = self
            .socket_handle(fd, "bind")
            .and_then(|h| self.net.bind(h, addr).map_err(SysError::from));
        self.track(result)
    }

    pub fn connect(&self, fd: Fd, addr: SocketAddr) -> SysResult<()> {
        let result = self
            .socket_handle(fd, "connect")
            .and_then(|h| self.net.connect(h, addr).map_err(SysError::from));
        self.track(result)
    }

    pub fn listen(&self, fd: Fd, backlog: i32) -> SysResult<()> {
        let result = self
            .socket_handle(fd, "listen")
            .and_then(|h| self.net.listen(h, backlog).map_err(SysError::from));
        self.track(result)
    }

    pub fn recv(&self, fd: Fd, buf: &mut [u8], flags: i32) -> SysResult<usize> {
        let result = self
            .socket_handle(fd, "recv")
            .and_then(|h| self.net.recv(h, buf, flags).map_err(SysError::from));
        self.track(result)
    }

    pub fn send(&self, fd: Fd, buf: &[u8], flags: i32) -> SysResult<usize> {
        let result = self
            .socket_handle(fd, "send")
            .and_then(|h| self.net.send(h, buf, flags).map_err(SysError::from));
        self.track(result)
    }

    pub fn recvfrom(&self, fd: Fd, buf: &mut [u8], flags: i32) -> SysResult<(usize, SocketAddr)> {
        let result = self
            .socket_handle(fd, "recvfrom")
            .and_then(|h| self.net.recvfrom(h, buf, flags).map_err(SysError::from));
        self.track(result)
    }

    pub fn sendto(&self, fd: Fd, buf: &[u8], flags: i32, addr: SocketAddr) -> SysResult<usize> {
        let result = self
            .socket_handle(fd, "sendto")
            .and_then(|h| self.net.sendto(h, buf, flags, addr).map_err(SysError::from));
        self.track(result)
    }

    pub fn getsockopt(
        &self,
        fd: Fd,
        level: i32,
        optname: i32,
        optval: &mut [u8],
    ) -> SysResult<usize> {
        let result = self.socket_handle(fd, "getsockopt").and_then(|h| {
            self.net
                .getsockopt(h, level, optname, optval)
                .map_err(SysError::from)
        });
        self.track(result)
    }

    pub fn setsockopt(&self, fd: Fd, level: i32, optname: i32, optval: &[u8]) -> SysResult<()> {
        let result = self.socket_handle(fd, "setsockopt").and_then(|h| {
            self.net
                .setsockopt(h, level, optname, optval)
                .map_err(SysError::from)
        });
        self.track(result)
    }

    pub fn getsockname(&self, fd: Fd) -> SysResult<SocketAddr> {
        let result = self
            .socket_handle(fd, "getsockname")
            .and_then(|h| self.net.getsockname(h).map_err(SysError::from));
        self.track(result)
    }
}
