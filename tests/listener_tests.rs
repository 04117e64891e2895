//! Capture loop tests driven by a scripted datagram source

use ipsniff::error::CaptureError;
use ipsniff::listener::{CaptureState, CaptureStats, PacketListener};
use ipsniff::messages::PacketEvent;
use ipsniff::socket::DatagramSource;
use pnet::packet::icmp::{IcmpCode, IcmpType, MutableIcmpPacket};
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::MutableIpv4Packet;
use std::collections::VecDeque;
use std::io;
use std::net::Ipv4Addr;

/// Hands out queued datagrams, then reports an interrupt.
struct ScriptedSource {
    datagrams: VecDeque<io::Result<Vec<u8>>>,
}

impl ScriptedSource {
    fn new(datagrams: Vec<Vec<u8>>) -> Self {
        ScriptedSource { datagrams: datagrams.into_iter().map(Ok).collect() }
    }
}

impl DatagramSource for ScriptedSource {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.datagrams.pop_front() {
            Some(Ok(datagram)) => {
                buf[..datagram.len()].copy_from_slice(&datagram);
                Ok(datagram.len())
            }
            Some(Err(e)) => Err(e),
            None => Err(io::Error::new(io::ErrorKind::Interrupted, "stop")),
        }
    }
}

fn datagram(protocol: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 20 + payload.len()];
    {
        let mut ip = MutableIpv4Packet::new(&mut buf).unwrap();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length((20 + payload.len()) as u16);
        ip.set_ttl(64);
        ip.set_next_level_protocol(IpNextHeaderProtocol::new(protocol));
        ip.set_source(Ipv4Addr::new(192, 168, 1, 20));
        ip.set_destination(Ipv4Addr::new(192, 168, 1, 1));
    }
    buf[20..].copy_from_slice(payload);
    buf
}

fn icmp_bytes(icmp_type: u8, icmp_code: u8) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    let mut icmp = MutableIcmpPacket::new(&mut buf).unwrap();
    icmp.set_icmp_type(IcmpType::new(icmp_type));
    icmp.set_icmp_code(IcmpCode::new(icmp_code));
    buf
}

fn run(datagrams: Vec<Vec<u8>>) -> (Vec<PacketEvent>, CaptureStats) {
    let mut listener = PacketListener::new(ScriptedSource::new(datagrams), Vec::new(), 65535);
    assert_eq!(listener.state(), CaptureState::Idle);

    let result = listener.run();
    assert!(matches!(result, CaptureError::Interrupted));
    assert_eq!(listener.state(), CaptureState::Stopped);

    (listener.sink().clone(), listener.stats())
}

#[test]
fn test_icmp_datagram_emits_ip_then_icmp() {
    let (events, stats) = run(vec![datagram(1, &icmp_bytes(3, 1))]);

    assert_eq!(events.len(), 2);
    match &events[0] {
        PacketEvent::Ip(ip) => {
            assert_eq!(ip.protocol_name(), "ICMP");
            assert_eq!(ip.source_address, Ipv4Addr::new(192, 168, 1, 20));
        }
        other => panic!("expected IP event, got {:?}", other),
    }
    match &events[1] {
        PacketEvent::Icmp(icmp) => {
            assert_eq!(icmp.icmp_type, 3);
            assert_eq!(icmp.icmp_code, 1);
        }
        other => panic!("expected ICMP event, got {:?}", other),
    }
    assert_eq!(stats, CaptureStats { datagrams: 1, malformed: 0, icmp: 1 });
}

#[test]
fn test_report_lines() {
    let (events, _) = run(vec![datagram(1, &icmp_bytes(0, 0))]);
    let lines: Vec<String> = events.iter().map(|e| e.to_string()).collect();
    assert_eq!(lines, vec![
        "Protocol: ICMP 192.168.1.20 -> 192.168.1.1",
        "ICMP -> Type: 0 Code: 0",
    ]);
}

#[test]
fn test_tcp_datagram_emits_only_ip() {
    let (events, stats) = run(vec![datagram(6, &[])]);

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], PacketEvent::Ip(ip) if ip.protocol_name() == "TCP"));
    assert_eq!(stats.icmp, 0);
}

#[test]
fn test_short_datagram_is_skipped_and_loop_continues() {
    let short = vec![0x45u8; 12];
    let (events, stats) = run(vec![short, datagram(17, &[0; 8])]);

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], PacketEvent::Ip(ip) if ip.protocol_name() == "UDP"));
    assert_eq!(stats, CaptureStats { datagrams: 2, malformed: 1, icmp: 0 });
}

#[test]
fn test_truncated_icmp_emits_only_ip() {
    let (events, _) = run(vec![datagram(1, &[8, 0, 0])]);
    assert_eq!(events.len(), 1);
}

#[test]
fn test_events_keep_receive_order() {
    let (events, _) = run(vec![
        datagram(6, &[]),
        datagram(1, &icmp_bytes(11, 0)),
        datagram(47, &[]),
    ]);

    let lines: Vec<String> = events.iter().map(|e| e.to_string()).collect();
    assert_eq!(lines, vec![
        "Protocol: TCP 192.168.1.20 -> 192.168.1.1",
        "Protocol: ICMP 192.168.1.20 -> 192.168.1.1",
        "ICMP -> Type: 11 Code: 0",
        "Protocol: 47 192.168.1.20 -> 192.168.1.1",
    ]);
}

#[test]
fn test_receive_failure_ends_capture() {
    let source = ScriptedSource {
        datagrams: VecDeque::from(vec![
            Ok(datagram(6, &[])),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "gone")),
            Ok(datagram(6, &[])),
        ]),
    };
    let mut listener = PacketListener::new(source, Vec::new(), 65535);

    let result = listener.run();
    assert!(matches!(result, CaptureError::Receive(_)));
    assert_eq!(listener.state(), CaptureState::Stopped);
    // no retry after the failed receive
    assert_eq!(listener.sink().len(), 1);
}
