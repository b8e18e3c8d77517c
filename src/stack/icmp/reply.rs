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

// Echo, timestamp, and traceroute (RFC 1393) queries.

use super::header::{set_header, HeaderFields, IcmpHeader, IcmpType, ICMP_HEADER_LEN};
use super::IcmpModule;
use crate::error::{IcmpError, Result};
use crate::ip::{
    Delivery, IpHeader, IpLayer, SourceRoute, IPTOS_PREC_INTERNETCONTROL, IPTOS_PREC_ROUTINE,
};
use crate::packet::Packet;
use crate::util::{self, IPv4Addr};
use log::debug;

//    0               1               2               3
//    +---------------+---------------+-------------------------------+
//  0 |                     Originate Timestamp                       |
//    +---------------------------------------------------------------+
//  4 |                     Receive Timestamp                         |
//    +---------------------------------------------------------------+
//  8 |                     Transmit Timestamp                        |
//    +---------------------------------------------------------------+
const TIMESTAMP_DATA_LEN: usize = 12;
const RECEIVE_TIMESTAMP_OFFSET: usize = ICMP_HEADER_LEN + 4;
const TRANSMIT_TIMESTAMP_OFFSET: usize = ICMP_HEADER_LEN + 8;

//    0               1               2               3
//    +---------------+---------------+-------------------------------+
//  0 |         Outbound Hop Count    |       Return Hop Count        |
//    +---------------------------------------------------------------+
//  4 |                     Output Link Speed                         |
//    +---------------------------------------------------------------+
//  8 |                     Output Link MTU                           |
//    +---------------------------------------------------------------+
const TRACEROUTE_DATA_LEN: usize = 12;

/// Route back to the sender of a source-routed request: the requester
/// followed by the recorded hops, reversed. The first hop is the address
/// just before the option's pointer.
fn reverse_source_route(requester: IPv4Addr, option: &[u8]) -> Option<SourceRoute> {
    if option.len() < 3 {
        return None;
    }

    let len = option[1] as usize;
    let pointer = option[2] as usize;
    if len > option.len() || len < 7 || pointer < 8 || pointer - 1 > len {
        return None;
    }

    let immediate_dest = IPv4Addr::new_from(&option[pointer - 5..pointer - 1]);
    let hops = (len - 3) / 4;
    let mut route = Vec::with_capacity(hops);
    route.push(requester);
    for i in 0..hops - 1 {
        let offset = 3 + i * 4;
        route.push(IPv4Addr::new_from(&option[offset..offset + 4]));
    }

    route.reverse();

    Some(SourceRoute {
        immediate_dest,
        route,
    })
}

impl IcmpModule {
    /// Send a reply to `request`, copying its record-route and timestamp
    /// options and retracing its source route if it had one.
    fn send_reply(
        &mut self,
        ip: &mut dyn IpLayer,
        message: Packet,
        request: &IpHeader,
        interface: usize,
    ) {
        let delivery = request
            .source_route_option()
            .and_then(|option| reverse_source_route(request.source, option))
            .map_or(Delivery::Routed, Delivery::SourceRouted);

        let mut packet = self.outbound(
            request.source,
            interface,
            IPTOS_PREC_INTERNETCONTROL,
            delivery,
            message,
        );
        packet.record_route = request.record_route_option().map(|o| o.to_vec());
        packet.timestamp = request.timestamp_option().map(|o| o.to_vec());
        ip.send(packet);
    }

    pub(super) fn receive_echo(
        &mut self,
        ip: &mut dyn IpLayer,
        message: &Packet,
        header: &IcmpHeader,
        ip_header: &IpHeader,
        interface: usize,
    ) {
        if let Some(stats) = self.stats_mut() {
            stats.echo_received += 1;
        }

        if self.is_group_address(ip_header.dest) {
            debug!("not answering echo sent to {}", ip_header.dest);
            return;
        }

        let mut reply = message.clone();
        set_header(reply.header_mut(), IcmpType::EchoReply as u8, 0, header.fields);
        self.send_reply(ip, reply, ip_header, interface);
        if let Some(stats) = self.stats_mut() {
            stats.echo_reply_generated += 1;
        }
    }

    pub(super) fn receive_timestamp(
        &mut self,
        ip: &mut dyn IpLayer,
        message: &Packet,
        header: &IcmpHeader,
        ip_header: &IpHeader,
        interface: usize,
    ) -> Result<()> {
        if message.len() < ICMP_HEADER_LEN + TIMESTAMP_DATA_LEN {
            return Err(IcmpError::Truncated {
                needed: ICMP_HEADER_LEN + TIMESTAMP_DATA_LEN,
                actual: message.len(),
            });
        }

        if let Some(stats) = self.stats_mut() {
            stats.timestamp_received += 1;
        }

        if self.is_group_address(ip_header.dest) {
            debug!("not answering timestamp sent to {}", ip_header.dest);
            return Ok(());
        }

        // Simulated time doesn't move while a message is handled, so the
        // receive and transmit stamps are the same.
        let now = self.timestamp_ms();
        let mut reply = message.clone();
        {
            let bytes = reply.header_mut();
            util::set_be32(&mut bytes[RECEIVE_TIMESTAMP_OFFSET..RECEIVE_TIMESTAMP_OFFSET + 4], now);
            util::set_be32(
                &mut bytes[TRANSMIT_TIMESTAMP_OFFSET..TRANSMIT_TIMESTAMP_OFFSET + 4],
                now,
            );
            set_header(bytes, IcmpType::TimestampReply as u8, 0, header.fields);
        }

        self.send_reply(ip, reply, ip_header, interface);
        if let Some(stats) = self.stats_mut() {
            stats.timestamp_reply_generated += 1;
        }

        Ok(())
    }

    /// Answer a datagram carrying the IP traceroute option. Returns false
    /// if it has no such option.
    pub fn generate_traceroute(
        &mut self,
        ip: &mut dyn IpLayer,
        datagram: &IpHeader,
        interface: usize,
    ) -> bool {
        if interface >= self.interfaces.len() {
            return false;
        }

        let option = match datagram.traceroute_option() {
            Some(option) => option,
            None => return false,
        };

        let mut message = Packet::from_slice(&[0u8; ICMP_HEADER_LEN + TRACEROUTE_DATA_LEN]);
        {
            let bytes = message.header_mut();
            util::set_be16(
                &mut bytes[ICMP_HEADER_LEN..ICMP_HEADER_LEN + 2],
                option.outbound_hops,
            );
            set_header(
                bytes,
                IcmpType::Traceroute as u8,
                0,
                HeaderFields::Traceroute { id: option.id },
            );
        }

        let packet = self.outbound(
            datagram.source,
            interface,
            IPTOS_PREC_ROUTINE,
            Delivery::Routed,
            message,
        );
        ip.send(packet);
        if let Some(stats) = self.stats_mut() {
            stats.traceroute_generated += 1;
        }

        true
    }

    pub fn send_echo_request(
        &mut self,
        ip: &mut dyn IpLayer,
        interface: usize,
        dest: IPv4Addr,
        id: u16,
        sequence: u16,
        data: &[u8],
    ) -> Result<()> {
        if interface >= self.interfaces.len() {
            return Err(IcmpError::NoSuchInterface(interface));
        }

        let mut message = Packet::from_slice(&[0u8; ICMP_HEADER_LEN]);
        message.append_from_slice(data);
        set_header(
            message.header_mut(),
            IcmpType::Echo as u8,
            0,
            HeaderFields::EchoOrTimestamp { id, sequence },
        );

        let packet = self.outbound(dest, interface, IPTOS_PREC_ROUTINE, Delivery::Routed, message);
        ip.send(packet);

        Ok(())
    }

    pub fn send_timestamp_request(
        &mut self,
        ip: &mut dyn IpLayer,
        interface: usize,
        dest: IPv4Addr,
        id: u16,
        sequence: u16,
    ) -> Result<()> {
        if interface >= self.interfaces.len() {
            return Err(IcmpError::NoSuchInterface(interface));
        }

        let mut message = Packet::from_slice(&[0u8; ICMP_HEADER_LEN + TIMESTAMP_DATA_LEN]);
        {
            let originate = self.timestamp_ms();
            let bytes = message.header_mut();
            util::set_be32(&mut bytes[ICMP_HEADER_LEN..ICMP_HEADER_LEN + 4], originate);
            set_header(
                bytes,
                IcmpType::Timestamp as u8,
                0,
                HeaderFields::EchoOrTimestamp { id, sequence },
            );
        }

        let packet = self.outbound(dest, interface, IPTOS_PREC_ROUTINE, Delivery::Routed, message);
        ip.send(packet);

        Ok(())
    }
}
