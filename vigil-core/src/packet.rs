//! Parsed frame model handed to detectors.
//!
//! The capture loop decodes raw Ethernet bytes into a [`Frame`] once;
//! detectors only ever see the parsed representation. Constructors are
//! provided so tests and traffic generators can build frames without going
//! through a NIC.
use pnet::datalink::MacAddr;
use pnet::packet::{
    arp::ArpPacket,
    ethernet::{EtherTypes, EthernetPacket},
    icmp::IcmpPacket,
    icmpv6::Icmpv6Packet,
    ip::IpNextHeaderProtocols,
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    tcp::TcpPacket,
    udp::UdpPacket,
    Packet,
};

use std::net::{IpAddr, Ipv4Addr};

/// TCP control bits as they appear on the wire
pub mod tcp_flags {
    /// connection teardown
    pub const FIN: u16 = 0x01;
    /// connection initiation
    pub const SYN: u16 = 0x02;
    /// reset
    pub const RST: u16 = 0x04;
    /// push
    pub const PSH: u16 = 0x08;
    /// acknowledgement
    pub const ACK: u16 = 0x10;
}

/// ICMPv6 echo request type
pub const ICMPV6_ECHO_REQUEST: u8 = 128;
/// ICMPv6 echo reply type
pub const ICMPV6_ECHO_REPLY: u8 = 129;

/// Sender info extracted from an ARP payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpInfo {
    /// ARP opcode (1 request, 2 reply)
    pub operation: u16,
    /// protocol address of the sender
    pub sender_ip: Ipv4Addr,
    /// hardware address of the sender
    pub sender_mac: MacAddr,
    /// protocol address of the target
    pub target_ip: Ipv4Addr,
}

/// Network-layer addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetInfo {
    /// source address
    pub src: IpAddr,
    /// destination address
    pub dst: IpAddr,
}

/// Transport-layer info, as much of it as the detectors need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// TCP segment
    Tcp {
        /// source port
        src_port: u16,
        /// destination port
        dst_port: u16,
        /// control bits, see [`tcp_flags`]
        flags: u16,
    },
    /// UDP datagram
    Udp {
        /// source port
        src_port: u16,
        /// destination port
        dst_port: u16,
    },
    /// ICMPv4 message
    Icmpv4 {
        /// ICMP type
        icmp_type: u8,
        /// ICMP code
        icmp_code: u8,
    },
    /// ICMPv6 message
    Icmpv6 {
        /// ICMPv6 type
        icmp_type: u8,
    },
}

/// One parsed link-layer frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// present when the frame carried an ARP payload
    pub arp: Option<ArpInfo>,
    /// present when the frame carried an IPv4/IPv6 packet
    pub net: Option<NetInfo>,
    /// parsed transport header, when the protocol is one we track
    pub transport: Option<Transport>,
}

impl Frame {
    /// Decode an Ethernet frame. Returns `None` for frames we don't track
    /// (other ethertypes, truncated headers, unknown transports).
    pub fn decode(bytes: &[u8]) -> Option<Frame> {
        let eth = EthernetPacket::new(bytes)?;
        match eth.get_ethertype() {
            EtherTypes::Arp => {
                let arp = ArpPacket::new(eth.payload())?;
                Some(Frame {
                    arp: Some(ArpInfo {
                        operation: arp.get_operation().0,
                        sender_ip: arp.get_sender_proto_addr(),
                        sender_mac: arp.get_sender_hw_addr(),
                        target_ip: arp.get_target_proto_addr(),
                    }),
                    net: None,
                    transport: None,
                })
            }
            EtherTypes::Ipv4 => {
                let ip = Ipv4Packet::new(eth.payload())?;
                let net = NetInfo {
                    src: IpAddr::V4(ip.get_source()),
                    dst: IpAddr::V4(ip.get_destination()),
                };
                let transport = match ip.get_next_level_protocol() {
                    IpNextHeaderProtocols::Tcp => TcpPacket::new(ip.payload()).map(|tcp| {
                        Transport::Tcp {
                            src_port: tcp.get_source(),
                            dst_port: tcp.get_destination(),
                            flags: tcp.get_flags() as u16,
                        }
                    }),
                    IpNextHeaderProtocols::Udp => {
                        UdpPacket::new(ip.payload()).map(|udp| Transport::Udp {
                            src_port: udp.get_source(),
                            dst_port: udp.get_destination(),
                        })
                    }
                    IpNextHeaderProtocols::Icmp => {
                        IcmpPacket::new(ip.payload()).map(|icmp| Transport::Icmpv4 {
                            icmp_type: icmp.get_icmp_type().0,
                            icmp_code: icmp.get_icmp_code().0,
                        })
                    }
                    _ => None,
                };
                Some(Frame {
                    arp: None,
                    net: Some(net),
                    transport,
                })
            }
            EtherTypes::Ipv6 => {
                let ip = Ipv6Packet::new(eth.payload())?;
                let net = NetInfo {
                    src: IpAddr::V6(ip.get_source()),
                    dst: IpAddr::V6(ip.get_destination()),
                };
                let transport = match ip.get_next_header() {
                    IpNextHeaderProtocols::Tcp => TcpPacket::new(ip.payload()).map(|tcp| {
                        Transport::Tcp {
                            src_port: tcp.get_source(),
                            dst_port: tcp.get_destination(),
                            flags: tcp.get_flags() as u16,
                        }
                    }),
                    IpNextHeaderProtocols::Udp => {
                        UdpPacket::new(ip.payload()).map(|udp| Transport::Udp {
                            src_port: udp.get_source(),
                            dst_port: udp.get_destination(),
                        })
                    }
                    IpNextHeaderProtocols::Icmpv6 => {
                        Icmpv6Packet::new(ip.payload()).map(|icmp| Transport::Icmpv6 {
                            icmp_type: icmp.get_icmpv6_type().0,
                        })
                    }
                    _ => None,
                };
                Some(Frame {
                    arp: None,
                    net: Some(net),
                    transport,
                })
            }
            _ => None,
        }
    }

    /// Build a TCP frame
    pub fn tcp(src: IpAddr, dst: IpAddr, src_port: u16, dst_port: u16, flags: u16) -> Frame {
        Frame {
            arp: None,
            net: Some(NetInfo { src, dst }),
            transport: Some(Transport::Tcp {
                src_port,
                dst_port,
                flags,
            }),
        }
    }

    /// Build a UDP frame
    pub fn udp(src: IpAddr, dst: IpAddr, src_port: u16, dst_port: u16) -> Frame {
        Frame {
            arp: None,
            net: Some(NetInfo { src, dst }),
            transport: Some(Transport::Udp { src_port, dst_port }),
        }
    }

    /// Build an ICMPv4 frame
    pub fn icmpv4(src: IpAddr, dst: IpAddr, icmp_type: u8, icmp_code: u8) -> Frame {
        Frame {
            arp: None,
            net: Some(NetInfo { src, dst }),
            transport: Some(Transport::Icmpv4 {
                icmp_type,
                icmp_code,
            }),
        }
    }

    /// Build an ICMPv6 frame
    pub fn icmpv6(src: IpAddr, dst: IpAddr, icmp_type: u8) -> Frame {
        Frame {
            arp: None,
            net: Some(NetInfo { src, dst }),
            transport: Some(Transport::Icmpv6 { icmp_type }),
        }
    }

    /// Build an ARP frame
    pub fn arp(sender_ip: Ipv4Addr, sender_mac: MacAddr, target_ip: Ipv4Addr, operation: u16) -> Frame {
        Frame {
            arp: Some(ArpInfo {
                operation,
                sender_ip,
                sender_mac,
                target_ip,
            }),
            net: None,
            transport: None,
        }
    }
}
