use crate::messages::PacketEvent;
use log::info;

/// Receives decoded events in the order the capture loop emits them.
pub trait EventSink {
    fn emit(&mut self, event: PacketEvent);
}

/// Writes one log line per event.
#[derive(Debug, Default)]
pub struct LogReporter;

impl EventSink for LogReporter {
    fn emit(&mut self, event: PacketEvent) {
        info!("{}", event);
    }
}

impl EventSink for Vec<PacketEvent> {
    fn emit(&mut self, event: PacketEvent) {
        self.push(event);
    }
}

#[cfg(test)]
mod tests {
    use crate::messages::PacketEvent;
    use crate::parser::{IcmpHeader, IpHeader};
    use std::net::Ipv4Addr;

    fn ip_header(protocol_number: u8) -> IpHeader {
        IpHeader {
            header_length_words: 5,
            version: 4,
            type_of_service: 0,
            total_length: 28,
            identification: 1,
            fragment_offset: 0,
            time_to_live: 64,
            protocol_number,
            checksum: 0,
            source_address: Ipv4Addr::new(10, 0, 0, 2),
            destination_address: Ipv4Addr::new(8, 8, 8, 8),
        }
    }

    #[test]
    fn test_ip_line_format() {
        let line = PacketEvent::Ip(ip_header(1)).to_string();
        assert_eq!(line, "Protocol: ICMP 10.0.0.2 -> 8.8.8.8");

        let line = PacketEvent::Ip(ip_header(47)).to_string();
        assert_eq!(line, "Protocol: 47 10.0.0.2 -> 8.8.8.8");
    }

    #[test]
    fn test_icmp_line_format() {
        let icmp = IcmpHeader { icmp_type: 3, icmp_code: 1, checksum: 0xffff, unused: 0, next_hop_mtu: 0 };
        assert_eq!(PacketEvent::Icmp(icmp).to_string(), "ICMP -> Type: 3 Code: 1");
    }
}
