//! AF_PACKET socket implementation

use super::{Capture, RxInfo};
use crate::{Error, Result};
use std::ffi::CString;
use std::os::unix::io::{AsRawFd, RawFd};
use tokio::io::unix::AsyncFd;
use tracing::debug;

/// How the socket sees the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketMode {
    /// SOCK_RAW: link header included, promiscuous
    Raw,
    /// SOCK_DGRAM: link header handled by the kernel
    Datagram,
}

impl SocketMode {
    fn socket_type(self) -> i32 {
        match self {
            SocketMode::Raw => libc::SOCK_RAW,
            SocketMode::Datagram => libc::SOCK_DGRAM,
        }
    }
}

/// AF_PACKET socket wrapper, IPv6 only
pub struct AfPacketSocket {
    async_fd: AsyncFd<RawFd>,
    ifindex: i32,
    mode: SocketMode,
}

impl AfPacketSocket {
    /// Create a new AF_PACKET socket bound to the specified interface
    pub fn bind(ifname: &str, mode: SocketMode) -> Result<Self> {
        let protocol = (libc::ETH_P_IPV6 as u16).to_be();
        let fd = unsafe { libc::socket(libc::AF_PACKET, mode.socket_type(), protocol as i32) };

        if fd < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let ifindex = match Self::get_ifindex(fd, ifname) {
            Ok(ifindex) => ifindex,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        let sockaddr = link_sockaddr(ifindex, None);
        let ret = unsafe {
            libc::bind(
                fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };

        if ret < 0 {
            unsafe { libc::close(fd) };
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        // Set non-blocking
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };

        // Proxied addresses are not ours, so their multicast groups are not
        // joined on the Ethernet side
        if mode == SocketMode::Raw {
            if let Err(e) = Self::set_promisc(fd, ifindex, true) {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        }

        let async_fd = AsyncFd::new(fd).map_err(Error::Io)?;
        debug!(ifname, ifindex, ?mode, "packet socket bound");

        Ok(Self {
            async_fd,
            ifindex,
            mode,
        })
    }

    fn get_ifindex(fd: RawFd, ifname: &str) -> Result<i32> {
        let ifname_c = CString::new(ifname).map_err(|_| Error::InterfaceNotFound {
            name: ifname.to_string(),
        })?;

        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        let name_bytes = ifname_c.as_bytes_with_nul();
        if name_bytes.len() > ifr.ifr_name.len() {
            return Err(Error::InterfaceNotFound {
                name: ifname.to_string(),
            });
        }
        for (dst, src) in ifr.ifr_name.iter_mut().zip(name_bytes) {
            *dst = *src as libc::c_char;
        }

        let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut ifr) };
        if ret < 0 {
            return Err(Error::InterfaceNotFound {
                name: ifname.to_string(),
            });
        }

        Ok(unsafe { ifr.ifr_ifru.ifru_ifindex })
    }

    fn set_promisc(fd: RawFd, ifindex: i32, enable: bool) -> Result<()> {
        let mreq = libc::packet_mreq {
            mr_ifindex: ifindex,
            mr_type: libc::PACKET_MR_PROMISC as u16,
            mr_alen: 0,
            mr_address: [0; 8],
        };

        let optname = if enable {
            libc::PACKET_ADD_MEMBERSHIP
        } else {
            libc::PACKET_DROP_MEMBERSHIP
        };

        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                optname,
                &mreq as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::packet_mreq>() as u32,
            )
        };

        if ret < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        Ok(())
    }

    /// Receive a packet (async)
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<RxInfo> {
        loop {
            let mut guard = self.async_fd.readable_mut().await.map_err(Error::Io)?;

            match guard.try_io(|inner| {
                let fd = *inner.get_ref();
                let mut from: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
                let mut from_len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
                let n = unsafe {
                    libc::recvfrom(
                        fd,
                        buf.as_mut_ptr() as *mut _,
                        buf.len(),
                        0,
                        &mut from as *mut _ as *mut libc::sockaddr,
                        &mut from_len,
                    )
                };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok((n as usize, from.sll_pkttype == libc::PACKET_OUTGOING as u8))
                }
            }) {
                Ok(Ok((len, outgoing))) => return Ok(RxInfo { len, outgoing }),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }

    /// Send a packet (async)
    ///
    /// Raw sockets take a complete frame. Datagram sockets need the
    /// link-layer destination, which the kernel puts in the link header.
    pub async fn send(&mut self, buf: &[u8], link_dst: Option<&[u8]>) -> Result<usize> {
        let dest = match (self.mode, link_dst) {
            (SocketMode::Datagram, None) => {
                return Err(Error::InvalidPacket(
                    "datagram socket needs a link-layer destination".into(),
                ))
            }
            (SocketMode::Datagram, Some(addr)) => Some(link_sockaddr(self.ifindex, Some(addr))),
            (SocketMode::Raw, _) => None,
        };

        loop {
            let mut guard = self.async_fd.writable_mut().await.map_err(Error::Io)?;

            match guard.try_io(|inner| {
                let fd = *inner.get_ref();
                let n = match &dest {
                    Some(addr) => unsafe {
                        libc::sendto(
                            fd,
                            buf.as_ptr() as *const _,
                            buf.len(),
                            0,
                            addr as *const _ as *const libc::sockaddr,
                            std::mem::size_of::<libc::sockaddr_ll>() as u32,
                        )
                    },
                    None => unsafe { libc::send(fd, buf.as_ptr() as *const _, buf.len(), 0) },
                };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }

    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }

    pub fn mode(&self) -> SocketMode {
        self.mode
    }
}

/// sockaddr_ll for IPv6 on `ifindex`, optionally addressed to `dst`
fn link_sockaddr(ifindex: i32, dst: Option<&[u8]>) -> libc::sockaddr_ll {
    let mut addr = libc::sockaddr_ll {
        sll_family: libc::AF_PACKET as u16,
        sll_protocol: (libc::ETH_P_IPV6 as u16).to_be(),
        sll_ifindex: ifindex,
        sll_hatype: 0,
        sll_pkttype: 0,
        sll_halen: 0,
        sll_addr: [0; 8],
    };
    if let Some(dst) = dst {
        let len = dst.len().min(addr.sll_addr.len());
        addr.sll_addr[..len].copy_from_slice(&dst[..len]);
        addr.sll_halen = len as u8;
    }
    addr
}

impl AsRawFd for AfPacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        *self.async_fd.get_ref()
    }
}

impl Drop for AfPacketSocket {
    fn drop(&mut self) {
        if self.mode == SocketMode::Raw {
            let _ = Self::set_promisc(*self.async_fd.get_ref(), self.ifindex, false);
        }
        unsafe { libc::close(*self.async_fd.get_ref()) };
    }
}

impl Capture for AfPacketSocket {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<RxInfo> {
        AfPacketSocket::recv(self, buf).await
    }

    async fn send(&mut self, buf: &[u8], link_dst: Option<&[u8]>) -> Result<usize> {
        AfPacketSocket::send(self, buf, link_dst).await
    }
}
