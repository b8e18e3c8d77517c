//
// Copyright 2024-2025 Jeff Bush
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

// Internet Protocol as described in RFC 791. ICMP doesn't own the IP layer;
// this module has just enough of it to read the datagrams ICMP reacts to,
// and the seams (IpLayer, TransportLayer) through which ICMP sends packets
// and notifies the transports.

use crate::error::{IcmpError, Result};
use crate::packet::Packet;
use crate::util;
use crate::util::IPv4Addr;

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

pub const IP_BASE_HEADER_LEN: usize = 20;
const IP_MAX_OPTIONS_LEN: usize = 40;

pub const DEFAULT_TTL: u8 = 64;

// Type of service precedence
pub const IPTOS_PREC_ROUTINE: u8 = 0x00;
pub const IPTOS_PREC_INTERNETCONTROL: u8 = 0xc0;

pub const IPOPT_EOL: u8 = 0;
pub const IPOPT_NOP: u8 = 1;
pub const IPOPT_RR: u8 = 7;
pub const IPOPT_TS: u8 = 68;
pub const IPOPT_TRACEROUTE: u8 = 82;
pub const IPOPT_LSRR: u8 = 131;
pub const IPOPT_SSRR: u8 = 137;

const FLAG_MORE_FRAGMENTS: u16 = 0x2000;
const FRAGMENT_OFFSET_MASK: u16 = 0x1fff;

//    0               1               2               3
//    +-------+-------+---------------+-------------------------------+
//  0 |Version|  IHL  |Type of Service|          Total Length         |
//    +-------+-------+---------------+-----+-------------------------+
//  4 |         Identification        |Flags|      Fragment Offset    |
//    +---------------+---------------+-----+-------------------------+
//  8 |  Time to Live |    Protocol   |         Header Checksum       |
//    +---------------+---------------+-------------------------------+
// 12 |                       Source Address                          |
//    +---------------------------------------------------------------+
// 16 |                    Destination Address                        |
//    +-----------------------------------------------+---------------+
// 20 |                    Options                    |    Padding    |
//    +-----------------------------------------------+---------------+

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpHeader {
    pub tos: u8,
    pub total_len: u16,
    pub id: u16,
    pub more_fragments: bool,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub source: IPv4Addr,
    pub dest: IPv4Addr,
    pub options: Vec<u8>,
}

/// Fields of the traceroute option (RFC 1393).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracerouteOption {
    pub id: u16,
    pub outbound_hops: u16,
    pub return_hops: u16,
    pub originator: IPv4Addr,
}

impl IpHeader {
    pub fn new(source: IPv4Addr, dest: IPv4Addr, protocol: u8) -> IpHeader {
        IpHeader {
            tos: IPTOS_PREC_ROUTINE,
            total_len: IP_BASE_HEADER_LEN as u16,
            id: 0,
            more_fragments: false,
            fragment_offset: 0,
            ttl: DEFAULT_TTL,
            protocol,
            source,
            dest,
            options: Vec::new(),
        }
    }

    /// Decode the header at the start of `data`. The header checksum
    /// is not checked; that's the job of the IP input path.
    pub fn parse(data: &[u8]) -> Result<IpHeader> {
        if data.len() < IP_BASE_HEADER_LEN {
            return Err(IcmpError::Truncated {
                needed: IP_BASE_HEADER_LEN,
                actual: data.len(),
            });
        }

        if data[0] >> 4 != 4 {
            return Err(IcmpError::BadIpHeader("version is not 4"));
        }

        let header_len = ((data[0] & 0xf) as usize) * 4;
        if header_len < IP_BASE_HEADER_LEN {
            return Err(IcmpError::BadIpHeader("header length too small"));
        }

        if data.len() < header_len {
            return Err(IcmpError::Truncated {
                needed: header_len,
                actual: data.len(),
            });
        }

        let flags_fragment = util::get_be16(&data[6..8]);
        Ok(IpHeader {
            tos: data[1],
            total_len: util::get_be16(&data[2..4]),
            id: util::get_be16(&data[4..6]),
            more_fragments: (flags_fragment & FLAG_MORE_FRAGMENTS) != 0,
            fragment_offset: flags_fragment & FRAGMENT_OFFSET_MASK,
            ttl: data[8],
            protocol: data[9],
            source: IPv4Addr::new_from(&data[12..16]),
            dest: IPv4Addr::new_from(&data[16..20]),
            options: data[IP_BASE_HEADER_LEN..header_len].to_vec(),
        })
    }

    /// Length of the encoded header, options padded to a word boundary.
    pub fn header_len(&self) -> usize {
        IP_BASE_HEADER_LEN + ((self.options.len() + 3) & !3)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let header_len = self.header_len();
        let mut header = vec![0u8; header_len];
        header[0] = 0x40 | (header_len / 4) as u8; // Version/IHL
        header[1] = self.tos;
        util::set_be16(&mut header[2..4], self.total_len);
        util::set_be16(&mut header[4..6], self.id);
        let mut flags_fragment = self.fragment_offset & FRAGMENT_OFFSET_MASK;
        if self.more_fragments {
            flags_fragment |= FLAG_MORE_FRAGMENTS;
        }

        util::set_be16(&mut header[6..8], flags_fragment);
        header[8] = self.ttl;
        header[9] = self.protocol;
        self.source.copy_to(&mut header[12..16]);
        self.dest.copy_to(&mut header[16..20]);
        header[IP_BASE_HEADER_LEN..IP_BASE_HEADER_LEN + self.options.len()]
            .copy_from_slice(&self.options);

        let checksum = util::compute_checksum(&header);
        util::set_be16(&mut header[10..12], checksum);

        header
    }

    /// A fragment other than the first one.
    pub fn is_fragment_non_initial(&self) -> bool {
        self.fragment_offset != 0
    }

    /// Walk the option list and return the first option (type and length
    /// bytes included) whose type is in `kinds`. Stops at end-of-list or
    /// at the first malformed option.
    fn find_option(&self, kinds: &[u8]) -> Option<&[u8]> {
        let options = &self.options;
        let mut i = 0;
        while i < options.len() {
            match options[i] {
                IPOPT_EOL => return None,
                IPOPT_NOP => i += 1,
                kind => {
                    if i + 1 >= options.len() {
                        return None;
                    }

                    let len = options[i + 1] as usize;
                    if len < 2 || i + len > options.len() {
                        return None;
                    }

                    if kinds.contains(&kind) {
                        return Some(&options[i..i + len]);
                    }

                    i += len;
                }
            }
        }

        None
    }

    /// Loose or strict source route.
    pub fn source_route_option(&self) -> Option<&[u8]> {
        self.find_option(&[IPOPT_LSRR, IPOPT_SSRR])
    }

    pub fn has_source_route(&self) -> bool {
        self.source_route_option().is_some()
    }

    pub fn record_route_option(&self) -> Option<&[u8]> {
        self.find_option(&[IPOPT_RR])
    }

    pub fn timestamp_option(&self) -> Option<&[u8]> {
        self.find_option(&[IPOPT_TS])
    }

    pub fn traceroute_option(&self) -> Option<TracerouteOption> {
        let option = self.find_option(&[IPOPT_TRACEROUTE])?;
        if option.len() < 12 {
            return None;
        }

        Some(TracerouteOption {
            id: util::get_be16(&option[2..4]),
            outbound_hops: util::get_be16(&option[4..6]),
            return_hops: util::get_be16(&option[6..8]),
            originator: IPv4Addr::new_from(&option[8..12]),
        })
    }
}

/// Route for a reply that must retrace a source-routed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoute {
    /// Placed in the IP destination field of the outgoing header.
    pub immediate_dest: IPv4Addr,
    pub route: Vec<IPv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Look up the destination in the forwarding table.
    Routed,

    /// Hand straight to the link layer of the given interface as a
    /// link-level broadcast.
    LinkBroadcast(usize),

    /// Send with a strict source route built from the route list.
    SourceRouted(SourceRoute),
}

/// Everything ICMP hands to the IP layer for one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub source: IPv4Addr,
    pub dest: IPv4Addr,
    pub interface: usize,
    pub priority: u8,
    pub ttl: u8,
    pub delivery: Delivery,
    pub record_route: Option<Vec<u8>>,
    pub timestamp: Option<Vec<u8>>,
    pub payload: Packet,
}

impl OutboundPacket {
    /// IP header as it would appear on the wire for this packet.
    pub fn ip_header(&self) -> IpHeader {
        let mut header = IpHeader::new(self.source, self.dest, PROTO_ICMP);
        header.tos = self.priority;
        header.ttl = self.ttl;

        if let Delivery::SourceRouted(source_route) = &self.delivery {
            header.dest = source_route.immediate_dest;
            let option_len = 3 + source_route.route.len() * 4;
            if option_len <= IP_MAX_OPTIONS_LEN {
                header.options.push(IPOPT_SSRR);
                header.options.push(option_len as u8);
                header.options.push(4);
                for hop in &source_route.route {
                    header.options.extend_from_slice(&hop.octets());
                }
            }
        }

        for option in [&self.record_route, &self.timestamp].into_iter().flatten() {
            if header.options.len() + option.len() <= IP_MAX_OPTIONS_LEN {
                header.options.extend_from_slice(option);
            }
        }

        header.total_len = (header.header_len() + self.payload.total_len()) as u16;

        header
    }

    /// Complete datagram: encoded IP header followed by the payload.
    pub fn to_datagram(&self) -> Packet {
        let mut datagram = self.payload.clone();
        let header = self.ip_header().to_bytes();
        datagram.alloc_header(header.len());
        datagram.header_mut()[..header.len()].copy_from_slice(&header);

        datagram
    }
}

/// Services ICMP needs from the IP layer.
pub trait IpLayer {
    fn send(&mut self, packet: OutboundPacket);

    fn update_forwarding_table(
        &mut self,
        dest: IPv4Addr,
        mask: IPv4Addr,
        next_hop: IPv4Addr,
        interface: usize,
    );

    /// True if a dynamic routing protocol owns routes on this interface.
    fn runs_routing_protocol(&self, interface: usize) -> bool;
}

/// ICMP error notifications for the transport protocols.
pub trait TransportLayer {
    /// `message` starts at the transport header of the datagram that
    /// caused the error.
    fn handle_icmp_message(&mut self, protocol: u8, message: &[u8], icmp_type: u8, code: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteUpdate {
    pub dest: IPv4Addr,
    pub mask: IPv4Addr,
    pub next_hop: IPv4Addr,
    pub interface: usize,
}

/// IP layer that just keeps what it is given. Used to drive nodes from
/// a simulation loop.
#[derive(Debug, Default)]
pub struct RecordingIpLayer {
    pub sent: Vec<OutboundPacket>,
    pub routes: Vec<RouteUpdate>,
    pub routing_protocol_interfaces: Vec<usize>,
}

impl RecordingIpLayer {
    pub fn new() -> RecordingIpLayer {
        RecordingIpLayer::default()
    }

    pub fn take_sent(&mut self) -> Vec<OutboundPacket> {
        std::mem::take(&mut self.sent)
    }
}

impl IpLayer for RecordingIpLayer {
    fn send(&mut self, packet: OutboundPacket) {
        self.sent.push(packet);
    }

    fn update_forwarding_table(
        &mut self,
        dest: IPv4Addr,
        mask: IPv4Addr,
        next_hop: IPv4Addr,
        interface: usize,
    ) {
        self.routes.push(RouteUpdate {
            dest,
            mask,
            next_hop,
            interface,
        });
    }

    fn runs_routing_protocol(&self, interface: usize) -> bool {
        self.routing_protocol_interfaces.contains(&interface)
    }
}

/// Transport that ignores notifications.
#[derive(Debug, Default)]
pub struct NullTransport;

impl TransportLayer for NullTransport {
    fn handle_icmp_message(&mut self, _protocol: u8, _message: &[u8], _icmp_type: u8, _code: u8) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpNotification {
    pub protocol: u8,
    pub message: Vec<u8>,
    pub icmp_type: u8,
    pub code: u8,
}

/// Transport that keeps every notification it is given.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub notifications: Vec<IcmpNotification>,
}

impl TransportLayer for RecordingTransport {
    fn handle_icmp_message(&mut self, protocol: u8, message: &[u8], icmp_type: u8, code: u8) {
        self.notifications.push(IcmpNotification {
            protocol,
            message: message.to_vec(),
            icmp_type,
            code,
        });
    }
}
