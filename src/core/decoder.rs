//! Decoding of raw Ethernet frames into [`NormalizedPacket`]s.
//!
//! Only the fields the pipeline needs are read: addresses, ports, a
//! protocol label and the frame length. Frames without an IP layer or
//! with a truncated transport header are not decodable.

use std::net::IpAddr;

use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmp::IcmpPacket;
use pnet::packet::icmpv6::Icmpv6Packet;
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::{TcpFlags, TcpPacket};
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;

use crate::core::packet_source::RawPacket;
use crate::models::NormalizedPacket;
use crate::utils::format_endpoint;

/// Decode a raw frame, or `None` if it is malformed or carries no IP layer
pub fn decode(raw: &RawPacket) -> Option<NormalizedPacket> {
    let ethernet = EthernetPacket::new(&raw.data)?;
    let length = u32::try_from(raw.data.len()).ok()?;

    let (source, destination, next, payload) = match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ip = Ipv4Packet::new(ethernet.payload())?;
            let transport = decode_transport(ip.get_next_level_protocol(), ip.payload())?;
            (
                IpAddr::V4(ip.get_source()),
                IpAddr::V4(ip.get_destination()),
                ip.get_next_level_protocol(),
                transport,
            )
        }
        EtherTypes::Ipv6 => {
            let ip = Ipv6Packet::new(ethernet.payload())?;
            let transport = decode_transport(ip.get_next_header(), ip.payload())?;
            (
                IpAddr::V6(ip.get_source()),
                IpAddr::V6(ip.get_destination()),
                ip.get_next_header(),
                transport,
            )
        }
        _ => return None,
    };

    let source_ip = source.to_string();
    let destination_ip = destination.to_string();
    let protocol = protocol_label(next, &payload);
    let info = format!(
        "{} → {} {}",
        format_endpoint(&source_ip, payload.source_port),
        format_endpoint(&destination_ip, payload.destination_port),
        payload.summary
    );

    Some(NormalizedPacket {
        timestamp: raw.timestamp,
        source_ip,
        destination_ip,
        protocol,
        length,
        info,
        source_port: payload.source_port,
        destination_port: payload.destination_port,
    })
}

struct Transport {
    source_port: Option<u16>,
    destination_port: Option<u16>,
    summary: String,
}

fn decode_transport(next: IpNextHeaderProtocol, payload: &[u8]) -> Option<Transport> {
    let transport = match next {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(payload)?;
            Transport {
                source_port: Some(tcp.get_source()),
                destination_port: Some(tcp.get_destination()),
                summary: format!(
                    "[{}] Seq={} Win={} len={}",
                    tcp_flags(tcp.get_flags()),
                    tcp.get_sequence(),
                    tcp.get_window(),
                    tcp.payload().len()
                ),
            }
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(payload)?;
            Transport {
                source_port: Some(udp.get_source()),
                destination_port: Some(udp.get_destination()),
                summary: format!("len={}", udp.payload().len()),
            }
        }
        IpNextHeaderProtocols::Icmp => {
            let icmp = IcmpPacket::new(payload)?;
            Transport {
                source_port: None,
                destination_port: None,
                summary: format!(
                    "type {} code {}",
                    icmp.get_icmp_type().0,
                    icmp.get_icmp_code().0
                ),
            }
        }
        IpNextHeaderProtocols::Icmpv6 => {
            let icmp = Icmpv6Packet::new(payload)?;
            Transport {
                source_port: None,
                destination_port: None,
                summary: format!(
                    "type {} code {}",
                    icmp.get_icmpv6_type().0,
                    icmp.get_icmpv6_code().0
                ),
            }
        }
        other => Transport {
            source_port: None,
            destination_port: None,
            summary: format!("proto={} len={}", other.0, payload.len()),
        },
    };
    Some(transport)
}

fn tcp_flags(flags: u8) -> String {
    const NAMES: [(u8, &str); 6] = [
        (TcpFlags::SYN, "SYN"),
        (TcpFlags::ACK, "ACK"),
        (TcpFlags::FIN, "FIN"),
        (TcpFlags::RST, "RST"),
        (TcpFlags::PSH, "PSH"),
        (TcpFlags::URG, "URG"),
    ];
    let set: Vec<&str> = NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    set.join(", ")
}

/// Highest recognised layer for a packet
fn protocol_label(next: IpNextHeaderProtocol, transport: &Transport) -> String {
    let label = match next {
        IpNextHeaderProtocols::Tcp => well_known_service(transport).unwrap_or("TCP"),
        IpNextHeaderProtocols::Udp => well_known_service(transport).unwrap_or("UDP"),
        IpNextHeaderProtocols::Icmp => "ICMP",
        IpNextHeaderProtocols::Icmpv6 => "ICMPv6",
        IpNextHeaderProtocols::Igmp => "IGMP",
        IpNextHeaderProtocols::Gre => "GRE",
        IpNextHeaderProtocols::Esp => "ESP",
        _ => "IP",
    };
    label.to_string()
}

fn well_known_service(transport: &Transport) -> Option<&'static str> {
    // The lower port is usually the service side
    let ports = [transport.destination_port, transport.source_port];
    let mut candidates: Vec<u16> = ports.into_iter().flatten().collect();
    candidates.sort_unstable();
    candidates.into_iter().find_map(service_name)
}

fn service_name(port: u16) -> Option<&'static str> {
    let name = match port {
        20 | 21 => "FTP",
        22 => "SSH",
        23 => "TELNET",
        25 | 587 => "SMTP",
        53 => "DNS",
        67 | 68 => "DHCP",
        80 | 8080 => "HTTP",
        110 => "POP",
        123 => "NTP",
        143 => "IMAP",
        161 | 162 => "SNMP",
        443 => "TLS",
        445 => "SMB",
        3389 => "RDP",
        5353 => "MDNS",
        _ => return None,
    };
    Some(name)
}
