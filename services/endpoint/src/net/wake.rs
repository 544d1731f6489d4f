//! Wake-on-LAN magic packets.
//!
//! A magic packet is 6 bytes of `0xFF` followed by the target MAC repeated
//! 16 times, sent as a UDP broadcast.

use super::mac::MacAddr;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::net::UdpSocket;

pub const MAGIC_PACKET_LEN: usize = 102;

/// Default broadcast destination (discard port).
pub const DEFAULT_WAKE_TARGET: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::BROADCAST, 9);

pub fn magic_packet(mac: &MacAddr) -> [u8; MAGIC_PACKET_LEN] {
    let mut pkt = [0xFFu8; MAGIC_PACKET_LEN];
    let octets = mac.octets();
    for chunk in pkt[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&octets);
    }
    pkt
}

/// Broadcast one magic packet for `mac` to `target`.
pub async fn send_magic_packet(mac: &MacAddr, target: SocketAddrV4) -> Result<(), WakeError> {
    let pkt = magic_packet(mac);
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(WakeError::Socket)?;
    sock.set_broadcast(true).map_err(WakeError::Socket)?;
    let sent = sock.send_to(&pkt, target).await.map_err(WakeError::Socket)?;
    if sent != pkt.len() {
        return Err(WakeError::ShortWrite(sent));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum WakeError {
    #[error("wake socket error: {0}")]
    Socket(#[source] std::io::Error),
    #[error("magic packet truncated: sent {0} of 102 bytes")]
    ShortWrite(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_is_sync_stream_then_sixteen_macs() {
        let mac: MacAddr = "01:23:45:67:89:AB".parse().unwrap();
        let pkt = magic_packet(&mac);
        assert_eq!(&pkt[..6], &[0xFF; 6]);
        for rep in pkt[6..].chunks(6) {
            assert_eq!(rep, &[0x01, 0x23, 0x45, 0x67, 0x89, 0xAB]);
        }
        assert_eq!(pkt[6..].chunks(6).count(), 16);
    }

    #[tokio::test]
    async fn magic_packet_reaches_a_local_listener() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mac: MacAddr = "AA:BB:CC:DD:EE:FF".parse().unwrap();

        send_magic_packet(&mac, SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
            .await
            .unwrap();

        let mut buf = [0u8; 256];
        let (n, _) = listener.recv_from(&mut buf).await.unwrap();
        assert_eq!(n, MAGIC_PACKET_LEN);
        assert_eq!(&buf[..n], &magic_packet(&mac)[..]);
    }
}
