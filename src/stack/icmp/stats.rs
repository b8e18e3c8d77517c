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

use super::header::{redirect, time_exceeded, unreachable, IcmpType};
use crate::config::IcmpConfig;
use log::info;

/// Discovery and query counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IcmpStats {
    pub advertisement_generated: u32,
    pub advertisement_received: u32,
    pub solicitation_generated: u32,
    pub solicitation_received: u32,
    pub echo_received: u32,
    pub echo_reply_generated: u32,
    pub timestamp_received: u32,
    pub timestamp_reply_generated: u32,
    pub traceroute_generated: u32,
}

/// Error message counters. Some codes are only ever received, since this
/// stack has no reason to generate them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IcmpErrorStats {
    pub network_unreachable_sent: u32,
    pub network_unreachable_received: u32,
    pub host_unreachable_sent: u32,
    pub host_unreachable_received: u32,
    pub protocol_unreachable_sent: u32,
    pub protocol_unreachable_received: u32,
    pub port_unreachable_sent: u32,
    pub port_unreachable_received: u32,
    pub source_route_failed_sent: u32,
    pub source_route_failed_received: u32,
    pub fragmentation_needed_sent: u32,
    pub fragmentation_needed_received: u32,

    pub network_unknown_received: u32,
    pub host_unknown_received: u32,
    pub network_prohibited_received: u32,
    pub host_prohibited_received: u32,
    pub network_unreachable_tos_received: u32,
    pub host_unreachable_tos_received: u32,
    pub communication_prohibited_received: u32,
    pub host_precedence_violation_received: u32,
    pub precedence_cutoff_received: u32,

    pub redirect_generated: u32,
    pub redirect_received: u32,
    pub source_quench_sent: u32,
    pub source_quench_received: u32,
    pub ttl_exceeded_sent: u32,
    pub ttl_exceeded_received: u32,
    pub reassembly_timeout_sent: u32,
    pub reassembly_timeout_received: u32,
    pub parameter_problem_sent: u32,
    pub parameter_problem_received: u32,
    pub security_failure_sent: u32,
    pub security_failure_received: u32,
}

impl IcmpStats {
    pub fn log(&self) {
        info!("Advertisements Generated = {}", self.advertisement_generated);
        info!("Advertisements Received = {}", self.advertisement_received);
        info!("Solicitations Generated = {}", self.solicitation_generated);
        info!("Solicitations Received = {}", self.solicitation_received);
        info!("Echo Requests Received = {}", self.echo_received);
        info!("Echo Replies Generated = {}", self.echo_reply_generated);
        info!("Timestamp Requests Received = {}", self.timestamp_received);
        info!("Timestamp Replies Generated = {}", self.timestamp_reply_generated);
        info!("Traceroute Replies Generated = {}", self.traceroute_generated);
    }
}

impl IcmpErrorStats {
    fn sent_counter(&mut self, icmp_type: u8, code: u8) -> Option<&mut u32> {
        let counter = match IcmpType::from_u8(icmp_type)? {
            IcmpType::DestinationUnreachable => match code {
                unreachable::NETWORK => &mut self.network_unreachable_sent,
                unreachable::HOST => &mut self.host_unreachable_sent,
                unreachable::PROTOCOL => &mut self.protocol_unreachable_sent,
                unreachable::PORT => &mut self.port_unreachable_sent,
                unreachable::FRAGMENTATION_NEEDED => &mut self.fragmentation_needed_sent,
                unreachable::SOURCE_ROUTE_FAILED => &mut self.source_route_failed_sent,
                _ => return None,
            },
            IcmpType::Redirect => &mut self.redirect_generated,
            IcmpType::SourceQuench => &mut self.source_quench_sent,
            IcmpType::TimeExceeded => match code {
                time_exceeded::TTL_EXPIRED => &mut self.ttl_exceeded_sent,
                time_exceeded::REASSEMBLY_TIMEOUT => &mut self.reassembly_timeout_sent,
                _ => return None,
            },
            IcmpType::ParameterProblem => &mut self.parameter_problem_sent,
            IcmpType::SecurityFailure => &mut self.security_failure_sent,
            _ => return None,
        };

        Some(counter)
    }

    fn received_counter(&mut self, icmp_type: u8, code: u8) -> Option<&mut u32> {
        let counter = match IcmpType::from_u8(icmp_type)? {
            IcmpType::DestinationUnreachable => match code {
                unreachable::NETWORK => &mut self.network_unreachable_received,
                unreachable::HOST => &mut self.host_unreachable_received,
                unreachable::PROTOCOL => &mut self.protocol_unreachable_received,
                unreachable::PORT => &mut self.port_unreachable_received,
                unreachable::FRAGMENTATION_NEEDED => &mut self.fragmentation_needed_received,
                unreachable::SOURCE_ROUTE_FAILED => &mut self.source_route_failed_received,
                unreachable::NETWORK_UNKNOWN => &mut self.network_unknown_received,
                unreachable::HOST_UNKNOWN => &mut self.host_unknown_received,
                unreachable::NETWORK_PROHIBITED => &mut self.network_prohibited_received,
                unreachable::HOST_PROHIBITED => &mut self.host_prohibited_received,
                unreachable::NETWORK_UNREACHABLE_TOS => &mut self.network_unreachable_tos_received,
                unreachable::HOST_UNREACHABLE_TOS => &mut self.host_unreachable_tos_received,
                unreachable::COMMUNICATION_PROHIBITED => {
                    &mut self.communication_prohibited_received
                }
                unreachable::HOST_PRECEDENCE_VIOLATION => {
                    &mut self.host_precedence_violation_received
                }
                unreachable::PRECEDENCE_CUTOFF => &mut self.precedence_cutoff_received,
                _ => return None,
            },
            IcmpType::Redirect => match code {
                redirect::NETWORK..=redirect::TOS_HOST => &mut self.redirect_received,
                _ => return None,
            },
            IcmpType::SourceQuench => &mut self.source_quench_received,
            IcmpType::TimeExceeded => match code {
                time_exceeded::TTL_EXPIRED => &mut self.ttl_exceeded_received,
                time_exceeded::REASSEMBLY_TIMEOUT => &mut self.reassembly_timeout_received,
                _ => return None,
            },
            IcmpType::ParameterProblem => &mut self.parameter_problem_received,
            IcmpType::SecurityFailure => &mut self.security_failure_received,
            _ => return None,
        };

        Some(counter)
    }

    pub fn record_sent(&mut self, icmp_type: u8, code: u8) {
        if let Some(counter) = self.sent_counter(icmp_type, code) {
            *counter += 1;
        }
    }

    pub fn record_received(&mut self, icmp_type: u8, code: u8) {
        if let Some(counter) = self.received_counter(icmp_type, code) {
            *counter += 1;
        }
    }

    /// Dump counters. Sent counts are only shown for error types that
    /// are enabled.
    pub fn log(&self, config: &IcmpConfig) {
        let pairs = [
            (
                config.network_unreachable_enabled,
                "Network Unreachable",
                self.network_unreachable_sent,
                self.network_unreachable_received,
            ),
            (
                config.host_unreachable_enabled,
                "Host Unreachable",
                self.host_unreachable_sent,
                self.host_unreachable_received,
            ),
            (
                config.protocol_unreachable_enabled,
                "Protocol Unreachable",
                self.protocol_unreachable_sent,
                self.protocol_unreachable_received,
            ),
            (
                config.port_unreachable_enabled,
                "Port Unreachable",
                self.port_unreachable_sent,
                self.port_unreachable_received,
            ),
            (
                config.fragmentation_needed_enabled,
                "Fragmentation Needed",
                self.fragmentation_needed_sent,
                self.fragmentation_needed_received,
            ),
            (
                config.source_route_failed_enabled,
                "Source Route Failed",
                self.source_route_failed_sent,
                self.source_route_failed_received,
            ),
            (
                config.source_quench_enabled,
                "Source Quench",
                self.source_quench_sent,
                self.source_quench_received,
            ),
            (
                config.ttl_exceeded_enabled,
                "TTL Exceeded",
                self.ttl_exceeded_sent,
                self.ttl_exceeded_received,
            ),
            (
                config.reassembly_timeout_enabled,
                "Fragment Reassembly Timeout",
                self.reassembly_timeout_sent,
                self.reassembly_timeout_received,
            ),
            (
                config.parameter_problem_enabled,
                "Parameter Problem",
                self.parameter_problem_sent,
                self.parameter_problem_received,
            ),
            (
                config.security_failure_enabled,
                "Security Failure",
                self.security_failure_sent,
                self.security_failure_received,
            ),
            (
                config.redirect_enabled,
                "Redirect",
                self.redirect_generated,
                self.redirect_received,
            ),
        ];

        for (enabled, name, sent, received) in pairs {
            if enabled {
                info!("{} Messages Sent = {}", name, sent);
            }

            info!("{} Messages Received = {}", name, received);
        }

        let received_only = [
            ("Destination Network Unknown", self.network_unknown_received),
            ("Destination Host Unknown", self.host_unknown_received),
            ("Network Administratively Prohibited", self.network_prohibited_received),
            ("Host Administratively Prohibited", self.host_prohibited_received),
            ("Network Unreachable For TOS", self.network_unreachable_tos_received),
            ("Host Unreachable For TOS", self.host_unreachable_tos_received),
            ("Communication Administratively Prohibited", self.communication_prohibited_received),
            ("Host Precedence Violation", self.host_precedence_violation_received),
            ("Precedence Cutoff In Effect", self.precedence_cutoff_received),
        ];

        for (name, received) in received_only {
            info!("{} Messages Received = {}", name, received);
        }
    }
}
