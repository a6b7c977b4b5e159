//! Sender-side endpoint for one channel: owns the bound socket and the
//! set of destinations publications on this channel fan out to (usually
//! one, more for multi-destination-cast).

use std::net::SocketAddr;

use crate::Transport::destination_tracker::DestinationTracker;
use crate::Transport::udp_channel::UdpChannel;
use crate::Transport::udp_transport::UdpTransport;

pub struct SendChannelEndpoint {
    transport: UdpTransport,
    destinations: DestinationTracker,
}

impl SendChannelEndpoint {
    pub fn new(channel: &UdpChannel, rcvbuf: u32, sndbuf: u32) -> std::io::Result<Self> {
        let transport = UdpTransport::new(channel, rcvbuf, sndbuf)?;
        let destinations = DestinationTracker::new(channel.endpoint);
        Ok(Self { transport, destinations })
    }

    pub fn add_destination(&mut self, destination: SocketAddr) {
        self.destinations.add(destination);
    }

    pub fn remove_destination(&mut self, destination: SocketAddr) -> bool {
        self.destinations.remove(destination)
    }

    /// Send `frame` to every tracked destination. Returns the number of
    /// destinations the send succeeded for.
    pub fn send(&self, frame: &[u8]) -> std::io::Result<usize> {
        let mut sent = 0;
        for &destination in self.destinations.destinations() {
            self.transport.send_to(frame, destination)?;
            sent += 1;
        }
        Ok(sent)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Read back one inbound datagram -- NAKs, status messages, and RTT
    /// measurements from receivers all arrive at the publication's own
    /// send socket.
    pub fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<Option<(usize, SocketAddr)>> {
        self.transport.recv_from(buf)
    }

    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        self.transport.raw_fd()
    }
}
