use crate::parser::{IcmpHeader, IpHeader};
use std::fmt;

pub struct ParsedPacket {
    pub ip: IpHeader,
    pub icmp: Option<IcmpHeader>,
}

impl ParsedPacket {
    /// Events in the order they are reported: the IP header first.
    pub fn into_events(self) -> impl Iterator<Item = PacketEvent> {
        std::iter::once(PacketEvent::Ip(self.ip)).chain(self.icmp.map(PacketEvent::Icmp))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketEvent {
    Ip(IpHeader),
    Icmp(IcmpHeader),
}

impl fmt::Display for PacketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketEvent::Ip(ip) => write!(
                f,
                "Protocol: {} {} -> {}",
                ip.protocol_name(),
                ip.source_address,
                ip.destination_address
            ),
            PacketEvent::Icmp(icmp) => {
                write!(f, "ICMP -> Type: {} Code: {}", icmp.icmp_type, icmp.icmp_code)
            }
        }
    }
}
