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

// Echo and timestamp queries between two simulated hosts.

mod console_log;

use icmpstack::icmp::header::IcmpType;
use icmpstack::sim::Segment;
use icmpstack::util::{self, IPv4Addr};
use icmpstack::IcmpConfig;
use std::time::Duration;

const PING_ID: u16 = 0x4d2;
const PING_COUNT: u16 = 4;

fn main() {
    console_log::init(std::env::args().any(|arg| arg == "-v"));

    let source_addr = IPv4Addr::from_octets(10, 0, 0, 2);
    let dest_addr = IPv4Addr::from_octets(10, 0, 0, 3);

    let mut segment = Segment::new();
    let source = match segment.add_node(IcmpConfig::default(), source_addr, 24) {
        Ok(index) => index,
        Err(err) => {
            println!("Failed to create {}: {}", source_addr, err);
            return;
        }
    };

    if let Err(err) = segment.add_node(IcmpConfig::default(), dest_addr, 24) {
        println!("Failed to create {}: {}", dest_addr, err);
        return;
    }

    println!("PING {}", dest_addr);
    for sequence in 0..PING_COUNT {
        let start = segment.trace().len();
        let node = segment.node_mut(source);
        if let Err(err) = node.icmp.send_echo_request(
            &mut node.ip,
            0,
            dest_addr,
            PING_ID,
            sequence,
            b"abcdefghijklmnopqrstuvwabcdefghi",
        ) {
            println!("Failed to send echo request: {}", err);
            return;
        }

        segment.flush();
        match segment
            .trace_since(start)
            .iter()
            .find(|t| t.icmp_type() == Some(IcmpType::EchoReply as u8))
        {
            Some(reply) => {
                let message = reply.packet.payload.header();
                println!(
                    "{} bytes from {}: icmp_seq={} ttl={}",
                    reply.packet.payload.total_len(),
                    reply.packet.source,
                    util::get_be16(&message[6..8]),
                    reply.packet.ttl
                );
            }
            None => println!("Request timeout for icmp_seq {}", sequence),
        }

        segment.run_until(segment.now() + Duration::from_secs(1));
    }

    let start = segment.trace().len();
    let node = segment.node_mut(source);
    if let Err(err) = node
        .icmp
        .send_timestamp_request(&mut node.ip, 0, dest_addr, PING_ID, 0)
    {
        println!("Failed to send timestamp request: {}", err);
        return;
    }

    segment.flush();
    if let Some(reply) = segment
        .trace_since(start)
        .iter()
        .find(|t| t.icmp_type() == Some(IcmpType::TimestampReply as u8))
    {
        let message = reply.packet.payload.header();
        println!(
            "timestamp from {}: originate={} receive={} transmit={}",
            reply.packet.source,
            util::get_be32(&message[8..12]),
            util::get_be32(&message[12..16]),
            util::get_be32(&message[16..20])
        );
    }

    println!("{} packets on the wire", segment.trace().len());
}
