//! Thin wrapper over a `socket2` UDP socket configured per a
//! [`UdpChannel`]: multicast group membership, TTL, and non-blocking
//! mode so the sender/receiver agents can poll it from their duty cycle
//! instead of blocking a dedicated thread per socket.
//!
//! `socket2` is the same crate `redhat-performance rusty-comms` uses for
//! multicast-join-plus-TTL configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};

use crate::Transport::udp_channel::UdpChannel;

pub struct UdpTransport {
    socket: Socket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind a socket for sending/receiving on `channel`. For a multicast
    /// channel this also joins the group and sets the outbound TTL.
    /// `rcvbuf`/`sndbuf` of `0` leave the OS default buffer size in
    /// place.
    pub fn new(channel: &UdpChannel, rcvbuf: u32, sndbuf: u32) -> std::io::Result<Self> {
        let domain = match channel.endpoint {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        if rcvbuf > 0 {
            socket.set_recv_buffer_size(rcvbuf as usize)?;
        }
        if sndbuf > 0 {
            socket.set_send_buffer_size(sndbuf as usize)?;
        }

        if channel.is_multicast() {
            let bind_addr: SocketAddr = match channel.endpoint {
                SocketAddr::V4(v4) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), v4.port()),
                SocketAddr::V6(v6) => SocketAddr::new(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), v6.port()),
            };
            socket.bind(&bind_addr.into())?;

            match (channel.endpoint.ip(), channel.interface) {
                (IpAddr::V4(group), Some(IpAddr::V4(iface))) => {
                    socket.join_multicast_v4(&group, &iface)?;
                }
                (IpAddr::V4(group), None) => {
                    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
                }
                _ => {}
            }
            socket.set_multicast_ttl_v4(channel.default_ttl())?;
        } else {
            socket.bind(&channel.endpoint.into())?;
        }

        let local_addr = socket.local_addr()?.as_socket().unwrap_or(channel.endpoint);

        Ok(Self { socket, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> std::io::Result<usize> {
        self.socket.send_to(buf, &target.into())
    }

    /// Non-blocking receive. Returns `Ok(None)` on `WouldBlock` rather
    /// than an error, since that's the normal "nothing to read yet" case
    /// in the agents' poll loop.
    pub fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<Option<(usize, SocketAddr)>> {
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [std::mem::MaybeUninit<u8>]) };
        match self.socket.recv_from(uninit) {
            Ok((len, addr)) => Ok(Some((len, addr.as_socket().unwrap_or(self.local_addr)))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        self.socket.as_raw_fd()
    }
}
