//! Raw frame construction. Ethernet broadcast destination keeps the frames
//! visible on a promiscuous capture without needing a victim MAC.
use pnet::datalink::MacAddr;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::packet::icmp::{self, echo_request::MutableEchoRequestPacket, IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::tcp::{self, MutableTcpPacket, TcpFlags};
use pnet::packet::Packet;

use std::net::Ipv4Addr;

const ETH_LEN: usize = 14;
const IPV4_LEN: usize = 20;
const TCP_LEN: usize = 20;
const ICMP_ECHO_LEN: usize = 16;
const ARP_LEN: usize = 28;

fn ethernet(buf: &mut [u8], src: MacAddr, ethertype: pnet::packet::ethernet::EtherType) {
    let mut eth = MutableEthernetPacket::new(buf).expect("buffer sized for ethernet");
    eth.set_destination(MacAddr::broadcast());
    eth.set_source(src);
    eth.set_ethertype(ethertype);
}

fn ipv4_header(buf: &mut [u8], src: Ipv4Addr, dst: Ipv4Addr, proto: pnet::packet::ip::IpNextHeaderProtocol, total_len: u16) {
    let mut ip = MutableIpv4Packet::new(buf).expect("buffer sized for ipv4");
    ip.set_version(4);
    ip.set_header_length(5);
    ip.set_total_length(total_len);
    ip.set_ttl(64);
    ip.set_next_level_protocol(proto);
    ip.set_source(src);
    ip.set_destination(dst);
    let checksum = ipv4::checksum(&ip.to_immutable());
    ip.set_checksum(checksum);
}

/// TCP SYN, checksummed
pub(crate) fn tcp_syn(
    src_mac: MacAddr,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
) -> Vec<u8> {
    let mut buf = vec![0u8; ETH_LEN + IPV4_LEN + TCP_LEN];
    ethernet(&mut buf, src_mac, EtherTypes::Ipv4);
    ipv4_header(
        &mut buf[ETH_LEN..],
        src,
        dst,
        IpNextHeaderProtocols::Tcp,
        (IPV4_LEN + TCP_LEN) as u16,
    );
    {
        let mut seg = MutableTcpPacket::new(&mut buf[ETH_LEN + IPV4_LEN..])
            .expect("buffer sized for tcp");
        seg.set_source(src_port);
        seg.set_destination(dst_port);
        seg.set_sequence(0x1000);
        seg.set_data_offset(5);
        seg.set_flags(TcpFlags::SYN);
        seg.set_window(64240);
        let checksum = tcp::ipv4_checksum(&seg.to_immutable(), &src, &dst);
        seg.set_checksum(checksum);
    }
    buf
}

/// ICMP echo request, checksummed
pub(crate) fn icmp_echo(src_mac: MacAddr, src: Ipv4Addr, dst: Ipv4Addr, seq: u16) -> Vec<u8> {
    let mut buf = vec![0u8; ETH_LEN + IPV4_LEN + ICMP_ECHO_LEN];
    ethernet(&mut buf, src_mac, EtherTypes::Ipv4);
    ipv4_header(
        &mut buf[ETH_LEN..],
        src,
        dst,
        IpNextHeaderProtocols::Icmp,
        (IPV4_LEN + ICMP_ECHO_LEN) as u16,
    );
    {
        let icmp_buf = &mut buf[ETH_LEN + IPV4_LEN..];
        let mut echo = MutableEchoRequestPacket::new(icmp_buf).expect("buffer sized for echo");
        echo.set_icmp_type(IcmpTypes::EchoRequest);
        echo.set_identifier(0x4242);
        echo.set_sequence_number(seq);
        let checksum = icmp::checksum(&IcmpPacket::new(echo.packet()).expect("echo is icmp"));
        echo.set_checksum(checksum);
    }
    buf
}

/// Gratuitous ARP reply binding `claimed_ip` to `claimed_mac`
pub(crate) fn arp_reply(claimed_mac: MacAddr, claimed_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    let mut buf = vec![0u8; ETH_LEN + ARP_LEN];
    ethernet(&mut buf, claimed_mac, EtherTypes::Arp);
    {
        let mut arp = MutableArpPacket::new(&mut buf[ETH_LEN..]).expect("buffer sized for arp");
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(ArpOperations::Reply);
        arp.set_sender_hw_addr(claimed_mac);
        arp.set_sender_proto_addr(claimed_ip);
        arp.set_target_hw_addr(MacAddr::broadcast());
        arp.set_target_proto_addr(target_ip);
    }
    buf
}
