//! TWAMP Light session reflector.
//!
//! A bound UDP receive loop: stamps `t2` as early as possible after the
//! datagram arrives, builds the reflected payload with `t3` taken just
//! before the send, and echoes it to the source. Malformed or unsendable
//! packets are counted and logged; only a socket-level receive failure ends
//! the session.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use domain::common::error::CoreError;
use domain::twamp::codec::{MAX_PACKET_LEN, ReflectedPacket, SenderPacket, TTL_UNKNOWN};
use domain::twamp::entity::ResponderSpec;
use domain::twamp::timestamp::NtpTimestamp;
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ResponderSummary {
    pub reflected: u64,
    pub malformed: u64,
    pub peers: usize,
}

struct PeerState {
    next_seq: u32,
    last_seen: Instant,
}

pub struct TwampResponder {
    socket: UdpSocket,
    spec: ResponderSpec,
}

impl TwampResponder {
    pub fn new(socket: UdpSocket, spec: ResponderSpec) -> Self {
        Self { socket, spec }
    }

    /// Reflect test packets until canceled.
    pub async fn run(self, cancel: CancellationToken) -> Result<ResponderSummary, CoreError> {
        info!(port = self.spec.port, "TWAMP responder listening");

        let mut peers: HashMap<SocketAddr, PeerState> = HashMap::new();
        let mut buf = vec![0u8; MAX_PACKET_LEN + 1];
        let mut reflected = 0u64;
        let mut malformed = 0u64;

        loop {
            let (len, peer) = tokio::select! {
                () = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => {
                    received.map_err(|e| CoreError::Network(format!("recv: {e}")))?
                }
            };
            let t2 = NtpTimestamp::now();

            let request = match SenderPacket::decode(&buf[..len]) {
                Ok(pkt) => pkt,
                Err(e) => {
                    malformed += 1;
                    debug!(%peer, len, error = %e, "dropping malformed test packet");
                    continue;
                }
            };

            let seq = self.reflector_seq(&mut peers, peer);

            let t3 = NtpTimestamp::now();
            let reply = ReflectedPacket {
                seq,
                timestamp: t3,
                err_estimate: 0,
                recv_timestamp: t2,
                sender_seq: request.seq,
                sender_timestamp: request.timestamp,
                sender_err_estimate: request.err_estimate,
                sender_ttl: TTL_UNKNOWN,
            };
            let payload = reply.encode(self.spec.padding).map_err(CoreError::from)?;

            match self.socket.send_to(&payload, peer).await {
                Ok(_) => {
                    reflected += 1;
                    debug!(%peer, seq, sender_seq = request.seq, "reflected");
                }
                Err(e) => warn!(%peer, error = %e, "reflect send failed"),
            }
        }

        let summary = ResponderSummary {
            reflected,
            malformed,
            peers: peers.len(),
        };
        info!(reflected = summary.reflected, peers = summary.peers, "responder stopped");
        Ok(summary)
    }

    /// Next reflector sequence for a peer, restarting after the configured
    /// idle window.
    fn reflector_seq(&self, peers: &mut HashMap<SocketAddr, PeerState>, peer: SocketAddr) -> u32 {
        let now = Instant::now();
        let state = peers.entry(peer).or_insert(PeerState {
            next_seq: 0,
            last_seen: now,
        });
        if self.spec.reset_timer > Duration::ZERO
            && now.duration_since(state.last_seen) > self.spec.reset_timer
        {
            debug!(%peer, "idle peer, restarting reflector sequence");
            state.next_seq = 0;
        }
        state.last_seen = now;
        let seq = state.next_seq;
        state.next_seq = state.next_seq.wrapping_add(1);
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn spec(port: u16) -> ResponderSpec {
        ResponderSpec {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            padding: 0,
            ttl: 64,
            tos: 0,
            do_not_fragment: false,
            reset_timer: Duration::ZERO,
        }
    }

    async fn start_responder() -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<ResponderSummary>) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = socket.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let responder = TwampResponder::new(socket, spec(addr.port()));
        let token = cancel.clone();
        let handle = tokio::spawn(async move { responder.run(token).await.unwrap() });
        (addr, cancel, handle)
    }

    #[tokio::test]
    async fn reflects_with_both_timestamps() {
        let (addr, cancel, handle) = start_responder().await;
        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();

        let t1 = NtpTimestamp::now();
        let request = SenderPacket {
            seq: 5,
            timestamp: t1,
            err_estimate: 0x8001,
        };
        client
            .send_to(&request.encode(0).unwrap(), addr)
            .await
            .unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        let reply = ReflectedPacket::decode(&buf[..len]).unwrap();

        assert_eq!(reply.seq, 0);
        assert_eq!(reply.sender_seq, 5);
        assert_eq!(reply.sender_timestamp, t1);
        assert_eq!(reply.sender_err_estimate, 0x8001);
        // t3 is stamped at (or after) t2.
        assert!(reply.timestamp.micros_since(reply.recv_timestamp) >= 0);

        cancel.cancel();
        let summary = handle.await.unwrap();
        assert_eq!(summary.reflected, 1);
        assert_eq!(summary.peers, 1);
    }

    #[tokio::test]
    async fn reflector_sequence_increments_per_peer() {
        let (addr, cancel, handle) = start_responder().await;
        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();

        let mut buf = [0u8; 512];
        for expected_rseq in 0..3u32 {
            let request = SenderPacket {
                seq: 100 + expected_rseq,
                timestamp: NtpTimestamp::now(),
                err_estimate: 0,
            };
            client
                .send_to(&request.encode(0).unwrap(), addr)
                .await
                .unwrap();
            let (len, _) = client.recv_from(&mut buf).await.unwrap();
            let reply = ReflectedPacket::decode(&buf[..len]).unwrap();
            assert_eq!(reply.seq, expected_rseq);
        }

        cancel.cancel();
        assert_eq!(handle.await.unwrap().reflected, 3);
    }

    #[tokio::test]
    async fn short_packets_are_counted_not_fatal() {
        let (addr, cancel, handle) = start_responder().await;
        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();

        client.send_to(&[1, 2, 3], addr).await.unwrap();
        // A valid packet afterwards still gets reflected.
        let request = SenderPacket {
            seq: 0,
            timestamp: NtpTimestamp::now(),
            err_estimate: 0,
        };
        client
            .send_to(&request.encode(0).unwrap(), addr)
            .await
            .unwrap();
        let mut buf = [0u8; 512];
        client.recv_from(&mut buf).await.unwrap();

        cancel.cancel();
        let summary = handle.await.unwrap();
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.reflected, 1);
    }

    #[tokio::test]
    async fn responder_padding_is_appended() {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = socket.local_addr().unwrap();
        let mut padded = spec(addr.port());
        padded.padding = 40;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle =
            tokio::spawn(async move { TwampResponder::new(socket, padded).run(token).await });

        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let request = SenderPacket {
            seq: 0,
            timestamp: NtpTimestamp::now(),
            err_estimate: 0,
        };
        client
            .send_to(&request.encode(0).unwrap(), addr)
            .await
            .unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, 41 + 40);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
