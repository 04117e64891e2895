use crate::error::CaptureError;
use crate::messages::ParsedPacket;

use pnet::packet::icmp::IcmpPacket;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use std::borrow::Cow;
use std::net::Ipv4Addr;

pub const IP_HEADER_LEN: usize = 20;
pub const ICMP_HEADER_LEN: usize = 8;

/// Decoded view of the fixed 20-byte part of an IPv4 header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpHeader {
    pub header_length_words: u8,
    pub version: u8,
    pub type_of_service: u8,
    pub total_length: u16,
    pub identification: u16,
    /// Flags and fragment offset, as the 16-bit word found on the wire.
    pub fragment_offset: u16,
    pub time_to_live: u8,
    pub protocol_number: u8,
    pub checksum: u16,
    pub source_address: Ipv4Addr,
    pub destination_address: Ipv4Addr,
}

impl IpHeader {

    /// Decodes the IP header at the start of `datagram`.
    ///
    /// The whole datagram is expected so the declared header length can be
    /// checked against what was actually received. The checksum is not verified.
    pub fn parse(datagram: &[u8]) -> Result<IpHeader, CaptureError> {
        let ipv4 = Ipv4Packet::new(datagram).ok_or_else(|| {
            CaptureError::Malformed(format!(
                "{} bytes is shorter than an IP header ({} bytes)",
                datagram.len(),
                IP_HEADER_LEN
            ))
        })?;

        let header_length_words = ipv4.get_header_length();
        let header_len = header_length_words as usize * 4;
        if header_len < IP_HEADER_LEN {
            return Err(CaptureError::Malformed(format!(
                "header length of {} words is below the minimum of 5",
                header_length_words
            )));
        }
        if header_len > datagram.len() {
            return Err(CaptureError::Malformed(format!(
                "header length of {} bytes exceeds the {} byte datagram",
                header_len,
                datagram.len()
            )));
        }

        Ok(IpHeader {
            header_length_words,
            version: ipv4.get_version(),
            type_of_service: (ipv4.get_dscp() << 2) | ipv4.get_ecn(),
            total_length: ipv4.get_total_length(),
            identification: ipv4.get_identification(),
            fragment_offset: ((ipv4.get_flags() as u16) << 13) | ipv4.get_fragment_offset(),
            time_to_live: ipv4.get_ttl(),
            protocol_number: ipv4.get_next_level_protocol().0,
            checksum: ipv4.get_checksum(),
            // addresses keep the byte order of the capture buffer
            source_address: ipv4.get_source(),
            destination_address: ipv4.get_destination(),
        })
    }

    /// Byte offset of the next-layer header.
    pub fn payload_offset(&self) -> usize {
        self.header_length_words as usize * 4
    }

    pub fn protocol_name(&self) -> Cow<'static, str> {
        protocol_name(self.protocol_number)
    }

    pub fn is_icmp(&self) -> bool {
        self.protocol_number == IpNextHeaderProtocols::Icmp.0
    }

    /// The three flag bits (reserved, DF, MF).
    pub fn flags(&self) -> u8 {
        (self.fragment_offset >> 13) as u8
    }

    /// Fragment offset in 8-byte units, without the flag bits.
    pub fn fragment_position(&self) -> u16 {
        self.fragment_offset & 0x1FFF
    }
}

/// Maps an IANA protocol number to the name used in reports.
pub fn protocol_name(protocol_number: u8) -> Cow<'static, str> {
    match protocol_number {
        1 => Cow::Borrowed("ICMP"),
        6 => Cow::Borrowed("TCP"),
        17 => Cow::Borrowed("UDP"),
        other => Cow::Owned(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub checksum: u16,
    pub unused: u16,
    pub next_hop_mtu: u16,
}

impl IcmpHeader {

    /// Decodes the 8-byte ICMP header at the start of `window`.
    /// The last four bytes are read in the destination-unreachable layout.
    pub fn parse(window: &[u8]) -> Result<IcmpHeader, CaptureError> {
        if window.len() < ICMP_HEADER_LEN {
            return Err(CaptureError::Malformed(format!(
                "{} bytes is shorter than an ICMP header ({} bytes)",
                window.len(),
                ICMP_HEADER_LEN
            )));
        }

        let icmp_packet = IcmpPacket::new(&window[..ICMP_HEADER_LEN])
            .ok_or_else(|| CaptureError::Malformed("ICMP header".to_string()))?;
        let rest = icmp_packet.payload();

        Ok(IcmpHeader {
            icmp_type: icmp_packet.get_icmp_type().0,
            icmp_code: icmp_packet.get_icmp_code().0,
            checksum: icmp_packet.get_checksum(),
            unused: u16::from_be_bytes([rest[0], rest[1]]),
            next_hop_mtu: u16::from_be_bytes([rest[2], rest[3]]),
        })
    }
}

/// Decodes the IP header of a received datagram and, for ICMP, the header
/// that follows it. A datagram too short to hold the ICMP header yields
/// only the IP part.
pub fn parse(datagram: &[u8]) -> Result<ParsedPacket, CaptureError> {
    let ip = IpHeader::parse(datagram)?;

    let icmp = if ip.is_icmp() {
        let offset = ip.payload_offset();
        match datagram.get(offset..offset + ICMP_HEADER_LEN) {
            Some(window) => Some(IcmpHeader::parse(window)?),
            None => None,
        }
    } else {
        None
    };

    Ok(ParsedPacket { ip, icmp })
}
