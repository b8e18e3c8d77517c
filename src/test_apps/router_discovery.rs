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

// One router and two hosts on 10.0.0.0/24. The hosts solicit, the router
// answers and keeps advertising, and both hosts end up with it as their
// default router. Pass -v to see the protocol debug messages.

mod console_log;

use icmpstack::icmp::header::IcmpType;
use icmpstack::packet::Packet;
use icmpstack::sim::Segment;
use icmpstack::util::IPv4Addr;
use icmpstack::IcmpConfig;
use std::time::Duration;

const ROUTER_CONFIG: &str = "
    ICMP-ROUTER                              YES
    ICMP-ROUTER-ADVERTISEMENT-MIN-INTERVAL   5S
    ICMP-ROUTER-ADVERTISEMENT-MAX-INTERVAL   7S
    ICMP-ROUTER-ADVERTISEMENT-LIFE-TIME      20S
    ICMP-STATISTICS                          YES
";

const HOST_CONFIG: &str = "
    ICMP-STATISTICS                          YES
";

fn type_name(icmp_type: Option<u8>) -> String {
    match icmp_type.and_then(IcmpType::from_u8) {
        Some(icmp_type) => format!("{:?}", icmp_type),
        None => "?".to_string(),
    }
}

fn main() {
    console_log::init(std::env::args().any(|arg| arg == "-v"));

    let router_config = match IcmpConfig::parse(ROUTER_CONFIG) {
        Ok(config) => config,
        Err(err) => {
            println!("Bad router configuration: {}", err);
            return;
        }
    };

    let host_config = match IcmpConfig::parse(HOST_CONFIG) {
        Ok(config) => config,
        Err(err) => {
            println!("Bad host configuration: {}", err);
            return;
        }
    };

    let mut segment = Segment::new();
    let nodes = [
        (router_config, IPv4Addr::from_octets(10, 0, 0, 1)),
        (
            IcmpConfig {
                seed: 1,
                ..host_config.clone()
            },
            IPv4Addr::from_octets(10, 0, 0, 2),
        ),
        (
            IcmpConfig {
                seed: 2,
                ..host_config
            },
            IPv4Addr::from_octets(10, 0, 0, 3),
        ),
    ];

    for (config, address) in nodes {
        match segment.add_node(config, address, 24) {
            Ok(index) => {
                let name = address;
                segment.node_mut(index).icmp.register_router_discovery_callback(
                    move |_message: Packet, source: IPv4Addr, _destination: IPv4Addr, interface: usize| {
                        println!("{}: advertisement from {} on interface {}", name, source, interface);
                    },
                );
            }
            Err(err) => {
                println!("Failed to create node {}: {}", address, err);
                return;
            }
        }
    }

    segment.run_until(Duration::from_secs(60));

    println!("Packets sent:");
    for transmission in segment.trace() {
        println!(
            "{:>8.3}s  {} -> {}  {}",
            transmission.time.as_secs_f64(),
            transmission.packet.source,
            transmission.packet.ip_header().dest,
            type_name(transmission.icmp_type())
        );
    }

    for node in segment.nodes() {
        println!("{}:", node.address());
        match node.icmp.router_list().best() {
            Some(entry) => println!(
                "  default router {} (preference {})",
                entry.router, entry.preference
            ),
            None => println!("  no default router"),
        }

        if let Some(state) = node.icmp.interface_state(0) {
            println!("  {:?}", state.phase());
        }

        node.icmp.finalize();
    }
}
