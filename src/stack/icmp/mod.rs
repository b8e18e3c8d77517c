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

// Internet Control Message Protocol, as described in RFC 792, with router
// discovery from RFC 1256 and the host/router rules of RFC 1122 and 1812.
//
// Each node owns one IcmpModule. The owner feeds it inbound messages with
// icmp_input and moves simulated time forward with advance_time; the
// module answers through the IpLayer it is handed on each call.

mod discovery;
mod error;
pub mod header;
pub mod redirect_cache;
mod reply;
pub mod router_list;
pub mod stats;

#[cfg(test)]
mod testutil;

pub use discovery::{DiscoveryPhase, HostInterface, InterfaceState, RouterInterface};
pub use error::IcmpErrorMessage;

use crate::config::IcmpConfig;
use crate::error::{ConfigError, IcmpError, Result};
use crate::ip::{Delivery, IpHeader, IpLayer, OutboundPacket, TransportLayer, DEFAULT_TTL};
use crate::netif::Interface;
use crate::packet::Packet;
use crate::timer::TimerQueue;
use crate::util::IPv4Addr;
use header::{icmp_checksum, parse_header, IcmpType};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use redirect_cache::RedirectCache;
use router_list::RouterList;
use stats::{IcmpErrorStats, IcmpStats};
use std::time::Duration;

/// Protocol timers. A fired timer is never cancelled, so each handler
/// checks that the event still applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpTimer {
    /// Router: send an advertisement. Periodic timers reschedule
    /// themselves; the other kind answers a solicitation once.
    Advertisement { interface: usize, periodic: bool },

    /// Host: send a solicitation. The initial one is not counted against
    /// the retry limit.
    Solicitation { interface: usize, initial: bool },

    /// Host: one advertised lifetime for this router has run out.
    RouterValidation(IPv4Addr),

    /// Router: a redirect for this pair may be sent again.
    RedirectExpiry {
        source: IPv4Addr,
        destination: IPv4Addr,
    },
}

pub trait RouterDiscoveryListener {
    /// Called for every router advertisement a host accepts. `message`
    /// is a private copy of the ICMP message.
    fn router_discovered(
        &mut self,
        message: Packet,
        source: IPv4Addr,
        destination: IPv4Addr,
        interface: usize,
    );
}

impl<F> RouterDiscoveryListener for F
where
    F: FnMut(Packet, IPv4Addr, IPv4Addr, usize),
{
    fn router_discovered(
        &mut self,
        message: Packet,
        source: IPv4Addr,
        destination: IPv4Addr,
        interface: usize,
    ) {
        self(message, source, destination, interface)
    }
}

pub trait RouterTimeoutListener {
    fn router_timed_out(&mut self, router: IPv4Addr);
}

impl<F> RouterTimeoutListener for F
where
    F: FnMut(IPv4Addr),
{
    fn router_timed_out(&mut self, router: IPv4Addr) {
        self(router)
    }
}

pub struct IcmpModule {
    config: IcmpConfig,
    interfaces: Vec<Interface>,
    interface_state: Vec<InterfaceState>,
    router_list: RouterList,
    redirect_cache: RedirectCache,
    timers: TimerQueue<IcmpTimer>,
    rng: StdRng,
    stats: IcmpStats,
    error_stats: IcmpErrorStats,
    discovery_listeners: Vec<Box<dyn RouterDiscoveryListener>>,
    timeout_listeners: Vec<Box<dyn RouterTimeoutListener>>,
}

impl IcmpModule {
    /// Set up ICMP for a node with the given interfaces and arm the
    /// startup timers for router discovery.
    pub fn new(config: IcmpConfig, interfaces: Vec<Interface>) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let interface_state = interfaces
            .iter()
            .map(|_| {
                if config.router {
                    InterfaceState::Router(RouterInterface::default())
                } else {
                    InterfaceState::Host(HostInterface::default())
                }
            })
            .collect();

        let mut module = IcmpModule {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            interfaces,
            interface_state,
            router_list: RouterList::new(),
            redirect_cache: RedirectCache::new(),
            timers: TimerQueue::new(),
            stats: IcmpStats::default(),
            error_stats: IcmpErrorStats::default(),
            discovery_listeners: Vec::new(),
            timeout_listeners: Vec::new(),
        };

        module.start_discovery();

        Ok(module)
    }

    pub fn config(&self) -> &IcmpConfig {
        &self.config
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn interface_state(&self, interface: usize) -> Option<&InterfaceState> {
        self.interface_state.get(interface)
    }

    pub fn router_list(&self) -> &RouterList {
        &self.router_list
    }

    /// Routers can be configured statically on hosts. These are never
    /// timed out or displaced by advertised routers.
    pub fn router_list_mut(&mut self) -> &mut RouterList {
        &mut self.router_list
    }

    pub fn redirect_cache(&self) -> &RedirectCache {
        &self.redirect_cache
    }

    pub fn stats(&self) -> &IcmpStats {
        &self.stats
    }

    pub fn error_stats(&self) -> &IcmpErrorStats {
        &self.error_stats
    }

    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    pub fn next_timer_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn pending_timers(&self) -> impl Iterator<Item = (Duration, &IcmpTimer)> {
        self.timers.iter()
    }

    pub fn register_router_discovery_callback<L>(&mut self, listener: L)
    where
        L: RouterDiscoveryListener + 'static,
    {
        self.discovery_listeners.push(Box::new(listener));
    }

    pub fn register_router_timeout_callback<L>(&mut self, listener: L)
    where
        L: RouterTimeoutListener + 'static,
    {
        self.timeout_listeners.push(Box::new(listener));
    }

    /// Fire every timer due at or before `until`, in deadline order, then
    /// move the clock to `until`.
    pub fn advance_time(&mut self, ip: &mut dyn IpLayer, until: Duration) {
        while let Some(event) = self.timers.pop_expired(until) {
            self.handle_timer(ip, event);
        }

        self.timers.advance_to(until);
    }

    pub fn handle_timer(&mut self, ip: &mut dyn IpLayer, event: IcmpTimer) {
        match event {
            IcmpTimer::Advertisement {
                interface,
                periodic,
            } => self.advertisement_timer(ip, interface, periodic),
            IcmpTimer::Solicitation { interface, initial } => {
                self.solicitation_timer(ip, interface, initial)
            }
            IcmpTimer::RouterValidation(router) => self.router_validation_timer(router),
            IcmpTimer::RedirectExpiry {
                source,
                destination,
            } => {
                self.redirect_cache
                    .expire(source, destination, self.timers.now());
            }
        }
    }

    /// Process an ICMP message. `message` starts at the ICMP header;
    /// `ip_header` is the header of the datagram that carried it.
    pub fn icmp_input(
        &mut self,
        ip: &mut dyn IpLayer,
        transport: &mut dyn TransportLayer,
        message: Packet,
        ip_header: &IpHeader,
        interface: usize,
    ) -> Result<()> {
        if interface >= self.interfaces.len() {
            return Err(IcmpError::NoSuchInterface(interface));
        }

        let header = parse_header(message.header())?;
        if icmp_checksum(message.header()) != 0 {
            warn!(
                "ICMP checksum error from {} (type {})",
                ip_header.source, header.icmp_type
            );
            return Err(IcmpError::BadChecksum);
        }

        let icmp_type = IcmpType::from_u8(header.icmp_type)
            .ok_or(IcmpError::UnknownType(header.icmp_type))?;
        match icmp_type {
            IcmpType::RouterAdvertisement => {
                self.receive_advertisement(&message, &header, ip_header, interface)
            }
            IcmpType::RouterSolicitation => {
                self.receive_solicitation(ip, ip_header, interface);
                Ok(())
            }
            IcmpType::Redirect => self.receive_redirect(ip, &message, &header, interface),
            IcmpType::Echo => {
                self.receive_echo(ip, &message, &header, ip_header, interface);
                Ok(())
            }
            IcmpType::Timestamp => self.receive_timestamp(ip, &message, &header, ip_header, interface),
            IcmpType::EchoReply | IcmpType::TimestampReply | IcmpType::Traceroute => {
                warn!(
                    "{:?} from {} is only handled by the application, dropping",
                    icmp_type, ip_header.source
                );
                Ok(())
            }
            IcmpType::DestinationUnreachable
            | IcmpType::SourceQuench
            | IcmpType::TimeExceeded
            | IcmpType::ParameterProblem
            | IcmpType::SecurityFailure => self.receive_error(transport, &message, &header),
            IcmpType::InformationRequest | IcmpType::InformationReply => {
                Err(IcmpError::UnknownType(header.icmp_type))
            }
        }
    }

    /// Log the counters that are being collected.
    pub fn finalize(&self) {
        if self.config.collect_statistics {
            self.stats.log();
        }

        if self.config.collect_error_statistics {
            self.error_stats.log(&self.config);
        }

        for entry in self.router_list.valid_entries() {
            debug!(
                "router {} interface {} preference {} refs {}{}",
                entry.router,
                entry.interface,
                entry.preference,
                entry.ref_count,
                if entry.system_configured { " (static)" } else { "" }
            );
        }
    }

    fn stats_mut(&mut self) -> Option<&mut IcmpStats> {
        if self.config.collect_statistics {
            Some(&mut self.stats)
        } else {
            None
        }
    }

    fn error_stats_mut(&mut self) -> Option<&mut IcmpErrorStats> {
        if self.config.collect_error_statistics {
            Some(&mut self.error_stats)
        } else {
            None
        }
    }

    fn is_own_address(&self, addr: IPv4Addr) -> bool {
        self.interfaces.iter().any(|i| i.address == addr)
    }

    fn is_local_broadcast(&self, addr: IPv4Addr) -> bool {
        self.interfaces.iter().any(|i| i.broadcast() == addr)
    }

    /// Addresses nothing should answer: multicast, limited broadcast, or
    /// the directed broadcast of one of our subnets.
    fn is_group_address(&self, addr: IPv4Addr) -> bool {
        addr.is_multicast() || addr.is_broadcast() || self.is_local_broadcast(addr)
    }

    /// Simulated time in milliseconds, as carried in timestamp messages.
    fn timestamp_ms(&self) -> u32 {
        self.timers.now().as_millis() as u32
    }

    fn outbound(
        &self,
        dest: IPv4Addr,
        interface: usize,
        priority: u8,
        delivery: Delivery,
        payload: Packet,
    ) -> OutboundPacket {
        OutboundPacket {
            source: self.interfaces[interface].address,
            dest,
            interface,
            priority,
            ttl: DEFAULT_TTL,
            delivery,
            record_route: None,
            timestamp: None,
            payload,
        }
    }
}
