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

// ICMP router discovery, RFC 1256

use super::header::{set_header, HeaderFields, IcmpHeader, IcmpType, ICMP_HEADER_LEN};
use super::router_list::RouterUpdate;
use super::{IcmpModule, IcmpTimer};
use crate::error::{IcmpError, Result};
use crate::ip::{Delivery, IpHeader, IpLayer, IPTOS_PREC_INTERNETCONTROL};
use crate::packet::Packet;
use crate::util::{self, IPv4Addr};
use log::debug;
use rand::Rng;
use std::time::Duration;

const MAX_INITIAL_ADVERT_INTERVAL: Duration = Duration::from_secs(16);
const MAX_INITIAL_ADVERTISEMENTS: u32 = 3;
const MAX_RESPONSE_DELAY: Duration = Duration::from_secs(2);
const MAX_SOLICITATION_DELAY: Duration = Duration::from_secs(1);
const SOLICITATION_INTERVAL: Duration = Duration::from_secs(3);

const ADVERTISEMENT_ENTRY_WORDS: u8 = 2;
const DEFAULT_PREFERENCE: i32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterInterface {
    pub advertise: bool,

    /// A solicitation from an unconfigured host is waiting for the
    /// delayed response.
    pub solicitation_pending: bool,
    pub advertisement_scheduled: bool,
    pub advertisement_number: u32,
    pub preference: i32,
}

impl Default for RouterInterface {
    fn default() -> Self {
        RouterInterface {
            advertise: true,
            solicitation_pending: false,
            advertisement_scheduled: false,
            advertisement_number: 0,
            preference: DEFAULT_PREFERENCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInterface {
    pub perform_discovery: bool,
    pub received_advertisement: bool,
    pub solicitation_number: u32,
    pub stopped: bool,
}

impl Default for HostInterface {
    fn default() -> Self {
        HostInterface {
            perform_discovery: true,
            received_advertisement: false,
            solicitation_number: 0,
            stopped: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceState {
    Router(RouterInterface),
    Host(HostInterface),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryPhase {
    Idle,
    AwaitingFirstAdvertisement,
    Periodic,
    Soliciting,
    Discovered,
    GaveUp,
}

impl InterfaceState {
    pub fn phase(&self) -> DiscoveryPhase {
        match self {
            InterfaceState::Router(router) => {
                if !router.advertise || !router.advertisement_scheduled {
                    DiscoveryPhase::Idle
                } else if router.advertisement_number == 0 {
                    DiscoveryPhase::AwaitingFirstAdvertisement
                } else {
                    DiscoveryPhase::Periodic
                }
            }
            InterfaceState::Host(host) => {
                if !host.perform_discovery {
                    DiscoveryPhase::Idle
                } else if host.received_advertisement {
                    DiscoveryPhase::Discovered
                } else if host.stopped {
                    DiscoveryPhase::GaveUp
                } else {
                    DiscoveryPhase::Soliciting
                }
            }
        }
    }
}

impl IcmpModule {
    pub(super) fn start_discovery(&mut self) {
        for interface in 0..self.interface_state.len() {
            let (is_router, enabled) = match &self.interface_state[interface] {
                InterfaceState::Router(state) => (true, state.advertise),
                InterfaceState::Host(state) => (false, state.perform_discovery),
            };

            if !enabled {
                continue;
            }

            if is_router {
                let delay = self.advertisement_delay(true);
                self.timers.set_timer(
                    delay,
                    IcmpTimer::Advertisement {
                        interface,
                        periodic: true,
                    },
                );
                if let InterfaceState::Router(state) = &mut self.interface_state[interface] {
                    state.advertisement_scheduled = true;
                }
            } else {
                let delay = self.rng.gen_range(Duration::ZERO..=MAX_SOLICITATION_DELAY);
                self.timers.set_timer(
                    delay,
                    IcmpTimer::Solicitation {
                        interface,
                        initial: true,
                    },
                );
            }
        }
    }

    /// Uniform in [min, max] advertisement interval. The first few are
    /// kept short so hosts learn about a new router quickly.
    fn advertisement_delay(&mut self, initial: bool) -> Duration {
        let delay = self.rng.gen_range(
            self.config.min_advertisement_interval..=self.config.max_advertisement_interval,
        );
        if initial {
            delay.min(MAX_INITIAL_ADVERT_INTERVAL)
        } else {
            delay
        }
    }

    fn send_advertisement(
        &mut self,
        ip: &mut dyn IpLayer,
        interface: usize,
        dest: IPv4Addr,
        delivery: Delivery,
    ) {
        let preference = match &self.interface_state[interface] {
            InterfaceState::Router(state) => state.preference,
            InterfaceState::Host(_) => return,
        };

        let lifetime = self
            .config
            .advertisement_lifetime
            .as_secs()
            .min(u16::MAX as u64) as u16;

        let mut message = Packet::from_slice(&[0u8; ICMP_HEADER_LEN + 8]);
        {
            let bytes = message.header_mut();
            self.interfaces[interface]
                .address
                .copy_to(&mut bytes[ICMP_HEADER_LEN..ICMP_HEADER_LEN + 4]);
            util::set_be32(
                &mut bytes[ICMP_HEADER_LEN + 4..ICMP_HEADER_LEN + 8],
                preference as u32,
            );
            set_header(
                bytes,
                IcmpType::RouterAdvertisement as u8,
                0,
                HeaderFields::RouterAdvertisement {
                    num_addrs: 1,
                    entry_size: ADVERTISEMENT_ENTRY_WORDS,
                    lifetime,
                },
            );
        }

        debug!(
            "interface {}: router advertisement to {} at {:?}",
            interface,
            dest,
            self.timers.now()
        );

        let packet = self.outbound(dest, interface, IPTOS_PREC_INTERNETCONTROL, delivery, message);
        ip.send(packet);
        if let Some(stats) = self.stats_mut() {
            stats.advertisement_generated += 1;
        }
    }

    fn send_solicitation(&mut self, ip: &mut dyn IpLayer, interface: usize) {
        let mut message = Packet::from_slice(&[0u8; ICMP_HEADER_LEN]);
        set_header(
            message.header_mut(),
            IcmpType::RouterSolicitation as u8,
            0,
            HeaderFields::RouterSolicitation,
        );

        debug!(
            "interface {}: router solicitation at {:?}",
            interface,
            self.timers.now()
        );

        let packet = self.outbound(
            IPv4Addr::BROADCAST,
            interface,
            IPTOS_PREC_INTERNETCONTROL,
            Delivery::LinkBroadcast(interface),
            message,
        );
        ip.send(packet);
        if let Some(stats) = self.stats_mut() {
            stats.solicitation_generated += 1;
        }
    }

    pub(super) fn advertisement_timer(
        &mut self,
        ip: &mut dyn IpLayer,
        interface: usize,
        periodic: bool,
    ) {
        let (pending, number) = match self.interface_state.get(interface) {
            Some(InterfaceState::Router(state)) => {
                (state.solicitation_pending, state.advertisement_number)
            }
            _ => return,
        };

        if !periodic {
            // A periodic advertisement may already have answered it.
            if pending {
                self.send_advertisement(
                    ip,
                    interface,
                    IPv4Addr::BROADCAST,
                    Delivery::LinkBroadcast(interface),
                );
                if let InterfaceState::Router(state) = &mut self.interface_state[interface] {
                    state.solicitation_pending = false;
                }
            }

            return;
        }

        // start_discovery already clamped the first delay, so this clamps
        // the next MAX_INITIAL_ADVERTISEMENTS as well.
        let delay = self.advertisement_delay(number < MAX_INITIAL_ADVERTISEMENTS);
        self.send_advertisement(
            ip,
            interface,
            IPv4Addr::BROADCAST,
            Delivery::LinkBroadcast(interface),
        );
        if let InterfaceState::Router(state) = &mut self.interface_state[interface] {
            state.solicitation_pending = false;
            state.advertisement_number += 1;
        }

        self.timers.set_timer(
            delay,
            IcmpTimer::Advertisement {
                interface,
                periodic: true,
            },
        );
    }

    pub(super) fn solicitation_timer(
        &mut self,
        ip: &mut dyn IpLayer,
        interface: usize,
        initial: bool,
    ) {
        let max_solicitations = self.config.max_solicitations;
        let state = match self.interface_state.get_mut(interface) {
            Some(InterfaceState::Host(state)) => state,
            _ => return,
        };

        if state.received_advertisement {
            state.stopped = true;
            return;
        }

        if !initial {
            if state.solicitation_number >= max_solicitations {
                debug!("interface {}: no router answered, giving up", interface);
                state.stopped = true;
                return;
            }

            state.solicitation_number += 1;
        }

        self.send_solicitation(ip, interface);
        self.timers.set_timer(
            SOLICITATION_INTERVAL,
            IcmpTimer::Solicitation {
                interface,
                initial: false,
            },
        );
    }

    pub(super) fn router_validation_timer(&mut self, router: IPv4Addr) {
        if !self.router_list.expire(router) {
            return;
        }

        debug!("router {} timed out", router);
        for listener in self.timeout_listeners.iter_mut() {
            listener.router_timed_out(router);
        }
    }

    pub(super) fn receive_solicitation(
        &mut self,
        ip: &mut dyn IpLayer,
        ip_header: &IpHeader,
        interface: usize,
    ) {
        let pending = match &self.interface_state[interface] {
            InterfaceState::Router(state) => state.solicitation_pending,
            InterfaceState::Host(_) => return,
        };

        if let Some(stats) = self.stats_mut() {
            stats.solicitation_received += 1;
        }

        if !ip_header.source.is_unspecified() {
            self.send_advertisement(ip, interface, ip_header.source, Delivery::Routed);
            return;
        }

        // The host doesn't have an address yet. Answer with a broadcast
        // after a short random delay, coalescing solicitations that
        // arrive in the meantime.
        if pending {
            return;
        }

        let delay = self.rng.gen_range(Duration::ZERO..=MAX_RESPONSE_DELAY);
        self.timers.set_timer(
            delay,
            IcmpTimer::Advertisement {
                interface,
                periodic: false,
            },
        );
        if let InterfaceState::Router(state) = &mut self.interface_state[interface] {
            state.solicitation_pending = true;
        }
    }

    pub(super) fn receive_advertisement(
        &mut self,
        message: &Packet,
        header: &IcmpHeader,
        ip_header: &IpHeader,
        interface: usize,
    ) -> Result<()> {
        if let InterfaceState::Router(_) = self.interface_state[interface] {
            debug!("router ignoring advertisement from {}", ip_header.source);
            return Ok(());
        }

        let (num_addrs, entry_size, lifetime) = match header.fields {
            HeaderFields::RouterAdvertisement {
                num_addrs,
                entry_size,
                lifetime,
            } => (num_addrs as usize, entry_size as usize, lifetime),
            _ => return Ok(()),
        };

        if entry_size < ADVERTISEMENT_ENTRY_WORDS as usize {
            debug!("advertisement from {} has entry size {}", ip_header.source, entry_size);
            return Ok(());
        }

        let entry_len = entry_size * 4;
        let needed = ICMP_HEADER_LEN + num_addrs * entry_len;
        let bytes = message.header();
        if bytes.len() < needed {
            return Err(IcmpError::Truncated {
                needed,
                actual: bytes.len(),
            });
        }

        if let InterfaceState::Host(state) = &mut self.interface_state[interface] {
            state.received_advertisement = true;
        }

        if let Some(stats) = self.stats_mut() {
            stats.advertisement_received += 1;
        }

        let lifetime = Duration::from_secs(lifetime as u64);
        for i in 0..num_addrs {
            let offset = ICMP_HEADER_LEN + i * entry_len;
            let router = IPv4Addr::new_from(&bytes[offset..offset + 4]);
            let preference = util::get_be32(&bytes[offset + 4..offset + 8]) as i32;
            if !self.interfaces[interface].contains(router) {
                debug!(
                    "advertised router {} is not on interface {}'s subnet",
                    router, interface
                );
                continue;
            }

            let update = self
                .router_list
                .update_or_insert(router, preference, lifetime, interface);
            if let RouterUpdate::Inserted {
                evicted: Some(evicted),
            } = update
            {
                debug!("router list full, {} replaces {}", router, evicted);
            }

            if update.needs_validation_timer() {
                self.timers
                    .set_timer(lifetime, IcmpTimer::RouterValidation(router));
            }
        }

        for listener in self.discovery_listeners.iter_mut() {
            listener.router_discovered(message.clone(), ip_header.source, ip_header.dest, interface);
        }

        Ok(())
    }
}
