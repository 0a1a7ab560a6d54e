//! `NETLINK_NETFILTER` socket subscribed to conntrack multicast groups.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::MessageSource;
use crate::netfilter::{NetlinkMessage, parse_messages};

/// Largest datagram read in one receive. Conntrack notifications are far
/// smaller.
const RECEIVE_BUFFER_LEN: usize = 16 * 1024;

/// Conntrack multicast groups (`NFNLGRP_CONNTRACK_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NetlinkGroup {
    New = 1,
    Update = 2,
    Destroy = 3,
}

/// A non-blocking netfilter netlink socket driven by the tokio reactor.
pub struct NetfilterSocket {
    fd: AsyncFd<Socket>,
    joined: AtomicBool,
}

impl NetfilterSocket {
    /// Open and bind a socket. Must be called inside a tokio runtime.
    pub fn open() -> io::Result<Self> {
        let socket = Socket::new(
            Domain::from(libc::AF_NETLINK),
            Type::RAW,
            Some(Protocol::from(libc::NETLINK_NETFILTER)),
        )?;
        socket.set_nonblocking(true)?;

        let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        let ret = unsafe {
            libc::bind(
                socket.as_raw_fd(),
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            fd: AsyncFd::with_interest(socket, Interest::READABLE)?,
            joined: AtomicBool::new(false),
        })
    }

    /// Subscribe to `groups`. Only one call per socket is allowed.
    pub fn join_groups(&self, groups: &[NetlinkGroup]) -> io::Result<()> {
        if self.joined.swap(true, Ordering::SeqCst) {
            return Err(io::Error::other("netlink groups already joined"));
        }
        for group in groups {
            setsockopt_u32(
                self.raw_fd(),
                libc::SOL_NETLINK,
                libc::NETLINK_ADD_MEMBERSHIP,
                *group as u32,
            )?;
        }
        Ok(())
    }

    /// Set the kernel receive buffer. `force` bypasses `rmem_max` and needs
    /// `CAP_NET_ADMIN`.
    pub fn set_read_buffer(&self, bytes: usize, force: bool) -> io::Result<()> {
        if force {
            let size = u32::try_from(bytes).unwrap_or(u32::MAX);
            setsockopt_u32(
                self.raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVBUFFORCE,
                size,
            )
        } else {
            self.fd.get_ref().set_recv_buffer_size(bytes)
        }
    }

    async fn receive_batch(&self) -> io::Result<Option<Vec<NetlinkMessage>>> {
        let mut buf = [0u8; RECEIVE_BUFFER_LEN];
        let len = loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| recv(inner.as_raw_fd(), &mut buf)) {
                Ok(result) => break result?,
                Err(_would_block) => continue,
            }
        };
        if len == 0 {
            return Ok(None);
        }

        let messages = parse_messages(&buf[..len])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(errno) = messages.iter().find_map(NetlinkMessage::errno) {
            return Err(io::Error::from_raw_os_error(errno));
        }
        Ok(Some(messages))
    }

    fn raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}

impl MessageSource for NetfilterSocket {
    fn receive(
        &self,
    ) -> impl std::future::Future<Output = io::Result<Option<Vec<NetlinkMessage>>>> + Send {
        self.receive_batch()
    }
}

fn recv(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as usize)
}

fn setsockopt_u32(fd: RawFd, level: libc::c_int, name: libc::c_int, value: u32) -> io::Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const u32 as *const libc::c_void,
            std::mem::size_of::<u32>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
