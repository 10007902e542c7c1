//! Integration test for the UDP/IPv6 direct path.
//!
//! Exercises `P2pService` against a mock peer socket: a probe marks the
//! mock peer active, then a real `Data` frame round-trips in both
//! directions, covering the probe-then-deliver flow end to end.

use meshlink::codec::{Codec, DataFrame, Frame, ProbeIpv6Frame};
use meshlink::crypto::CryptoSuite;
use meshlink::dispatch::PacketSink;
use meshlink::peer::PeerTable;
use meshlink::p2p::P2pService;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Records every `Data` frame delivered by the P2P service, so the test can
/// assert on what arrived without a real TUN device.
#[derive(Default)]
struct RecordingSink {
    received: Mutex<Vec<Vec<u8>>>,
}

impl PacketSink for RecordingSink {
    fn on_data_frame(&self, frame: &DataFrame) {
        self.received.lock().unwrap().push(frame.payload.clone());
    }
}

fn ipv4_packet(dst: [u8; 4]) -> Vec<u8> {
    let mut pkt = vec![0u8; 20];
    pkt[0] = 0x45; // version 4, IHL 5
    pkt[16..20].copy_from_slice(&dst);
    pkt
}

#[tokio::test]
async fn probe_then_data_round_trips_over_udp() {
    let crypto = CryptoSuite::from_config("chacha20:itest-key").unwrap();
    let crypto: Arc<dyn meshlink::crypto::Block> = Arc::from(crypto);

    let peers = Arc::new(PeerTable::new());
    let sink = Arc::new(RecordingSink::default());

    let service = P2pService::bind(peers.clone(), crypto.clone(), "self".to_string(), sink.clone())
        .await
        .unwrap();
    service.spawn();

    // Mock peer: its own IPv6 UDP socket, standing in for a remote client.
    let mock_peer = UdpSocket::bind("[::1]:0").await.unwrap();
    let mock_peer_addr = mock_peer.local_addr().unwrap();
    let SocketAddr::V6(mock_peer_v6) = mock_peer_addr else {
        panic!("expected an ipv6 local address");
    };

    peers.rewrite(vec![meshlink::codec::PeerDetail {
        identity: "peer-a".to_string(),
        private_ip: "10.0.9.2".to_string(),
        ciders: vec![],
        ipv6: "::1".to_string(),
        port: mock_peer_v6.port(),
        stun_ip: String::new(),
        stun_port: 0,
        last_active: 0,
    }]);

    // Not yet proved alive: a send must be refused.
    let peer = peers.find_by_destination_ip("10.0.9.2".parse().unwrap()).unwrap();
    assert!(!service.send_packet(ipv4_packet([10, 0, 9, 2]), &peer).await);

    // Mock peer proves itself alive by sending a probe frame our way. The
    // service always listens on the fixed P2P port.
    let our_addr: SocketAddr = format!("[::1]:{}", meshlink::p2p::P2P_PORT).parse().unwrap();
    let probe = Frame::ProbeIpv6(ProbeIpv6Frame {
        identity: "peer-a".to_string(),
    });
    let encoded = Codec::encode(probe, crypto.as_ref()).unwrap();
    mock_peer.send_to(&encoded, our_addr).await.unwrap();

    // Give the receive loop a moment to process the probe.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(peers.is_active("peer-a"));

    // Now a direct send should succeed and the mock peer should see it.
    let peer = peers.find_by_destination_ip("10.0.9.2".parse().unwrap()).unwrap();
    let payload = ipv4_packet([10, 0, 9, 2]);
    assert!(service.send_packet(payload.clone(), &peer).await);

    let mut buf = vec![0u8; 2048];
    let (len, _from) = tokio::time::timeout(Duration::from_secs(2), mock_peer.recv_from(&mut buf))
        .await
        .expect("timed out waiting for data frame")
        .unwrap();
    buf.truncate(len);
    let (frame, _) = Codec::decode(&buf, crypto.as_ref()).unwrap();
    match frame {
        Frame::Data(data) => assert_eq!(data.payload, payload),
        other => panic!("expected a data frame, got {:?}", other),
    }

    // And the reverse direction: mock peer sends data, our sink records it.
    let reverse_payload = ipv4_packet([10, 0, 9, 99]);
    let reverse_frame = Frame::Data(DataFrame {
        payload: reverse_payload.clone(),
    });
    let encoded = Codec::encode(reverse_frame, crypto.as_ref()).unwrap();
    mock_peer.send_to(&encoded, our_addr).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if sink.received.lock().unwrap().iter().any(|p| *p == reverse_payload) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sink never received the reverse data frame");

    service.stop();
}
