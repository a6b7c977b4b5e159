//! A pair of `UdpTransport`s on loopback, each bound to an OS-assigned
//! port, exchange a datagram. Covers the non-blocking send/recv path the
//! sender and receiver agents poll every duty cycle.

use std::time::{Duration, Instant};

use mediadriver::Transport::udp_channel::UdpChannel;
use mediadriver::Transport::udp_transport::UdpTransport;

fn poll_recv(transport: &UdpTransport, buf: &mut [u8], timeout: Duration) -> Option<(usize, std::net::SocketAddr)> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(result) = transport.recv_from(buf).unwrap() {
            return Some(result);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    None
}

#[test]
fn unicast_send_and_recv_round_trip() {
    let a = UdpTransport::new(&UdpChannel::parse("udp://127.0.0.1:0").unwrap(), 0, 0).unwrap();
    let b = UdpTransport::new(&UdpChannel::parse("udp://127.0.0.1:0").unwrap(), 0, 0).unwrap();

    a.send_to(b"hello driver", b.local_addr()).unwrap();

    let mut buf = [0u8; 64];
    let (len, from) = poll_recv(&b, &mut buf, Duration::from_secs(2)).expect("datagram should arrive");
    assert_eq!(&buf[..len], b"hello driver");
    assert_eq!(from.ip(), a.local_addr().ip());
}

#[test]
fn recv_from_returns_none_when_nothing_is_pending() {
    let a = UdpTransport::new(&UdpChannel::parse("udp://127.0.0.1:0").unwrap(), 0, 0).unwrap();
    let mut buf = [0u8; 64];
    assert!(a.recv_from(&mut buf).unwrap().is_none());
}
