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

//
// ICMP error messages: generating them for datagrams this node couldn't
// deliver, and handling the ones other nodes send back. Redirects are
// sent through the same path, rate limited per (source, destination) by
// the redirect cache.
//

use super::header::{
    redirect, security_failure, set_header, unreachable, HeaderFields, IcmpHeader, IcmpType,
    ICMP_HEADER_LEN,
};
use super::{IcmpModule, IcmpTimer};
use crate::error::Result;
use crate::ip::{
    Delivery, IpHeader, IpLayer, SourceRoute, TransportLayer, IPTOS_PREC_ROUTINE,
    IP_BASE_HEADER_LEN, PROTO_ICMP, PROTO_TCP, PROTO_UDP,
};
use crate::packet::Packet;
use crate::util::IPv4Addr;
use log::{debug, warn};

/// Largest error message sent, including the IP header, any source
/// route option, and the ICMP header.
pub const ICMP_MAX_ERROR_MESSAGE_SIZE: usize = 96;

/// Type, code, and type specific fields of an error to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpErrorMessage {
    pub icmp_type: u8,
    pub code: u8,
    pub pointer: u8,
    pub gateway: IPv4Addr,
}

impl IcmpErrorMessage {
    fn new(icmp_type: IcmpType, code: u8) -> IcmpErrorMessage {
        IcmpErrorMessage {
            icmp_type: icmp_type as u8,
            code,
            pointer: 0,
            gateway: IPv4Addr::UNSPECIFIED,
        }
    }

    pub fn unreachable(code: u8) -> IcmpErrorMessage {
        Self::new(IcmpType::DestinationUnreachable, code)
    }

    pub fn source_quench() -> IcmpErrorMessage {
        Self::new(IcmpType::SourceQuench, 0)
    }

    pub fn time_exceeded(code: u8) -> IcmpErrorMessage {
        Self::new(IcmpType::TimeExceeded, code)
    }

    /// `pointer` is the offset of the offending byte in the datagram.
    pub fn parameter_problem(pointer: u8) -> IcmpErrorMessage {
        IcmpErrorMessage {
            pointer,
            ..Self::new(IcmpType::ParameterProblem, 0)
        }
    }

    pub fn redirect(code: u8, gateway: IPv4Addr) -> IcmpErrorMessage {
        IcmpErrorMessage {
            gateway,
            ..Self::new(IcmpType::Redirect, code)
        }
    }

    pub fn security_failure(code: u8) -> IcmpErrorMessage {
        Self::new(IcmpType::SecurityFailure, code)
    }

    fn fields(&self) -> HeaderFields {
        match IcmpType::from_u8(self.icmp_type) {
            Some(IcmpType::Redirect) => HeaderFields::Redirect {
                gateway: self.gateway,
            },
            Some(IcmpType::ParameterProblem) => HeaderFields::ParameterProblem {
                pointer: self.pointer,
            },
            _ => HeaderFields::Unused,
        }
    }
}

/// Return path for an error about a source-routed datagram. By the time
/// some errors are detected the pointer has already been advanced past
/// the next hop, so it is backed up by two addresses instead of one.
fn error_source_route(
    destination: IPv4Addr,
    option: &[u8],
    error: &IcmpErrorMessage,
) -> Option<SourceRoute> {
    let advanced = (error.icmp_type == IcmpType::DestinationUnreachable as u8
        && matches!(
            error.code,
            unreachable::NETWORK | unreachable::HOST | unreachable::FRAGMENTATION_NEEDED
        ))
        || error.icmp_type == IcmpType::SourceQuench as u8;
    let rewind = if advanced { 8 } else { 4 };

    let pointer = (*option.get(2)? as usize).checked_sub(rewind)?;
    let route_len = pointer / 4;
    if route_len == 0 || pointer + 3 > option.len() || 3 + (route_len - 1) * 4 > option.len() {
        return None;
    }

    let immediate_dest = IPv4Addr::new_from(&option[pointer - 1..pointer + 3]);
    let mut route = Vec::with_capacity(route_len);
    route.push(destination);
    for i in 0..route_len - 1 {
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
    fn error_enabled(&self, icmp_type: u8, code: u8) -> bool {
        let config = &self.config;
        match IcmpType::from_u8(icmp_type) {
            Some(IcmpType::DestinationUnreachable) => match code {
                unreachable::NETWORK => config.network_unreachable_enabled,
                unreachable::HOST => config.host_unreachable_enabled,
                unreachable::PROTOCOL => config.protocol_unreachable_enabled,
                unreachable::PORT => config.port_unreachable_enabled,
                unreachable::FRAGMENTATION_NEEDED => config.fragmentation_needed_enabled,
                unreachable::SOURCE_ROUTE_FAILED => config.source_route_failed_enabled,
                _ => true,
            },
            Some(IcmpType::SourceQuench) => config.source_quench_enabled,
            Some(IcmpType::TimeExceeded) => match code {
                super::header::time_exceeded::REASSEMBLY_TIMEOUT => {
                    config.reassembly_timeout_enabled
                }
                _ => config.ttl_exceeded_enabled,
            },
            Some(IcmpType::ParameterProblem) => config.parameter_problem_enabled,
            Some(IcmpType::SecurityFailure) => config.security_failure_enabled,
            Some(IcmpType::Redirect) => config.redirect_enabled,
            _ => {
                warn!("ICMP type {} is not an error message", icmp_type);
                false
            }
        }
    }

    /// RFC 1122 3.2.2: never send an error about an error, a broadcast,
    /// or a fragment other than the first.
    fn error_suppressed(&self, header: &IpHeader, datagram: &[u8]) -> bool {
        if header.dest.is_multicast()
            || header.dest.is_broadcast()
            || header.source.is_multicast()
            || header.source.is_broadcast()
            || header.source.is_loopback()
            || header.source.is_unspecified()
            || header.is_fragment_non_initial()
            || self.is_local_broadcast(header.dest)
        {
            return true;
        }

        if header.protocol == PROTO_ICMP {
            return datagram.get(header.header_len()) != Some(&(IcmpType::Echo as u8));
        }

        false
    }

    /// Send an ICMP error about `trigger`, a complete datagram starting
    /// at its IP header, to `destination` via `interface`. Returns false
    /// if the error is disabled or not allowed for this datagram.
    pub fn generate_error(
        &mut self,
        ip: &mut dyn IpLayer,
        trigger: &Packet,
        destination: IPv4Addr,
        interface: usize,
        error: &IcmpErrorMessage,
    ) -> bool {
        if interface >= self.interfaces.len() || !self.error_enabled(error.icmp_type, error.code) {
            return false;
        }

        let bytes = trigger.header();
        let header = match IpHeader::parse(bytes) {
            Ok(header) => header,
            Err(err) => {
                debug!("no ICMP error for unparsable datagram: {}", err);
                return false;
            }
        };

        if self.error_suppressed(&header, bytes) {
            return false;
        }

        let is_redirect = error.icmp_type == IcmpType::Redirect as u8;
        if is_redirect && self.redirect_cache.contains(header.source, header.dest) {
            return false;
        }

        let mut budget = ICMP_MAX_ERROR_MESSAGE_SIZE - IP_BASE_HEADER_LEN - ICMP_HEADER_LEN;
        let mut delivery = Delivery::Routed;
        if let Some(option) = header.source_route_option() {
            let source_route = error_source_route(destination, option, error);
            let route_len = source_route.as_ref().map_or(0, |r| r.route.len());
            budget -= (route_len + 1) * 4;
            if let Some(source_route) = source_route {
                delivery = Delivery::SourceRouted(source_route);
            }
        }

        // The original header goes back without its options
        let header_len = header.header_len();
        let mut stripped = header.clone();
        stripped.options.clear();
        let mut embedded = stripped.to_bytes();
        embedded.extend_from_slice(&bytes[header_len..]);
        embedded.truncate(budget);

        let virtual_len = (budget - embedded.len()).min(trigger.virtual_len());

        let mut message = Packet::from_slice(&[0u8; ICMP_HEADER_LEN]);
        message.append_from_slice(&embedded);
        message.add_virtual_payload(virtual_len);
        set_header(message.header_mut(), error.icmp_type, error.code, error.fields());

        if is_redirect {
            self.record_suppression(header.source, header.dest);
        }

        debug!(
            "ICMP error type {} code {} to {} about {} -> {}",
            error.icmp_type, error.code, destination, header.source, header.dest
        );

        let packet = self.outbound(destination, interface, IPTOS_PREC_ROUTINE, delivery, message);
        ip.send(packet);
        if let Some(stats) = self.error_stats_mut() {
            stats.record_sent(error.icmp_type, error.code);
        }

        true
    }

    /// Whether a router should tell the sender of `header` about a better
    /// first hop. `next_hop` is None when the destination is unreachable.
    pub fn should_redirect(
        &self,
        header: &IpHeader,
        incoming: usize,
        outgoing: usize,
        next_hop: Option<IPv4Addr>,
    ) -> bool {
        incoming == outgoing
            && self.config.redirect_enabled
            && next_hop.is_some()
            && !header.has_source_route()
            && self.config.router
            && !self.is_own_address(header.source)
            && !self.redirect_cache.contains(header.source, header.dest)
    }

    /// Don't send another redirect for this pair until the retry time
    /// has passed.
    pub fn record_suppression(&mut self, source: IPv4Addr, destination: IPv4Addr) {
        let retry = self.config.redirect_retry_time;
        self.redirect_cache
            .insert(source, destination, self.timers.now() + retry);
        self.timers.set_timer(
            retry,
            IcmpTimer::RedirectExpiry {
                source,
                destination,
            },
        );
    }

    /// Called by the forwarding path for every datagram it routes. Sends
    /// a redirect if the datagram is leaving through the interface it came
    /// in on and its sender is on that subnet. A next hop of 0.0.0.0
    /// means the destination is directly attached.
    pub fn redirect_if_applicable(
        &mut self,
        ip: &mut dyn IpLayer,
        datagram: &Packet,
        incoming: usize,
        outgoing: usize,
        next_hop: Option<IPv4Addr>,
        host_route: bool,
    ) -> bool {
        let header = match IpHeader::parse(datagram.header()) {
            Ok(header) => header,
            Err(_) => return false,
        };

        if !self.should_redirect(&header, incoming, outgoing, next_hop) {
            return false;
        }

        match self.interfaces.get(outgoing) {
            Some(iface) if iface.contains(header.source) => {}
            _ => return false,
        }

        let gateway = match next_hop {
            Some(hop) if hop.is_unspecified() => header.dest,
            Some(hop) => hop,
            None => return false,
        };

        let code = if host_route {
            redirect::HOST
        } else {
            redirect::NETWORK
        };

        self.generate_error(
            ip,
            datagram,
            header.source,
            incoming,
            &IcmpErrorMessage::redirect(code, gateway),
        )
    }

    /// Tell the sender of `datagram` that it failed authentication.
    pub fn create_security_error(
        &mut self,
        ip: &mut dyn IpLayer,
        datagram: &Packet,
        incoming: usize,
    ) -> bool {
        let source = match IpHeader::parse(datagram.header()) {
            Ok(header) => header.source,
            Err(_) => return false,
        };

        self.generate_error(
            ip,
            datagram,
            source,
            incoming,
            &IcmpErrorMessage::security_failure(security_failure::AUTHENTICATION_FAILED),
        )
    }

    pub(super) fn receive_redirect(
        &mut self,
        ip: &mut dyn IpLayer,
        message: &Packet,
        header: &IcmpHeader,
        interface: usize,
    ) -> Result<()> {
        if let Some(stats) = self.error_stats_mut() {
            stats.record_received(header.icmp_type, header.code);
        }

        let gateway = match header.fields {
            HeaderFields::Redirect { gateway } => gateway,
            _ => return Ok(()),
        };

        let original = IpHeader::parse(&message.header()[ICMP_HEADER_LEN..])?;
        if ip.runs_routing_protocol(interface) && !self.config.redirect_override_routing {
            warn!(
                "ignoring redirect to {} via {}: interface {} is managed by a routing protocol",
                original.dest, gateway, interface
            );
            return Ok(());
        }

        debug!("redirect: {} via {}", original.dest, gateway);
        ip.update_forwarding_table(original.dest, IPv4Addr::BROADCAST, gateway, interface);

        Ok(())
    }

    /// Pass an error about one of our UDP or TCP datagrams up to the
    /// transport layer.
    pub(super) fn receive_error(
        &mut self,
        transport: &mut dyn TransportLayer,
        message: &Packet,
        header: &IcmpHeader,
    ) -> Result<()> {
        if let Some(stats) = self.error_stats_mut() {
            stats.record_received(header.icmp_type, header.code);
        }

        let embedded = &message.header()[ICMP_HEADER_LEN..];
        let original = IpHeader::parse(embedded)?;
        match original.protocol {
            PROTO_UDP | PROTO_TCP => transport.handle_icmp_message(
                original.protocol,
                &embedded[original.header_len()..],
                header.icmp_type,
                header.code,
            ),
            protocol => debug!(
                "ICMP type {} about protocol {} has no receiver",
                header.icmp_type, protocol
            ),
        }

        Ok(())
    }
}
