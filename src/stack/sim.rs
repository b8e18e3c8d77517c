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
// A single broadcast segment with zero link delay. Every node has one
// interface on the segment. Packets a node hands to its IP layer are
// delivered to the node owning the destination address, or to every
// other node for broadcasts. Nothing is forwarded past the segment.
//

use crate::config::IcmpConfig;
use crate::error::ConfigError;
use crate::icmp::IcmpModule;
use crate::ip::{Delivery, IpHeader, OutboundPacket, RecordingIpLayer, RecordingTransport};
use crate::netif::Interface;
use crate::util::IPv4Addr;
use log::{trace, warn};
use std::time::Duration;

pub struct SimNode {
    pub icmp: IcmpModule,
    pub ip: RecordingIpLayer,
    pub transport: RecordingTransport,
}

impl SimNode {
    pub fn address(&self) -> IPv4Addr {
        self.icmp.interfaces()[0].address
    }
}

/// One packet put on the wire.
#[derive(Debug, Clone)]
pub struct Transmission {
    pub time: Duration,
    pub from: usize,
    pub to: Vec<usize>,
    pub packet: OutboundPacket,
}

impl Transmission {
    pub fn icmp_type(&self) -> Option<u8> {
        self.packet.payload.header().first().copied()
    }
}

#[derive(Default)]
pub struct Segment {
    nodes: Vec<SimNode>,
    now: Duration,
    trace: Vec<Transmission>,
}

impl Segment {
    pub fn new() -> Segment {
        Segment::default()
    }

    /// Returns the index of the new node.
    pub fn add_node(
        &mut self,
        config: IcmpConfig,
        address: IPv4Addr,
        prefix_len: u8,
    ) -> Result<usize, ConfigError> {
        let icmp = IcmpModule::new(config, vec![Interface::new(address, prefix_len)])?;
        self.nodes.push(SimNode {
            icmp,
            ip: RecordingIpLayer::new(),
            transport: RecordingTransport::default(),
        });

        // Startup may already have queued packets.
        self.flush();
        Ok(self.nodes.len() - 1)
    }

    pub fn node(&self, index: usize) -> &SimNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut SimNode {
        &mut self.nodes[index]
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn trace(&self) -> &[Transmission] {
        &self.trace
    }

    /// Transmissions after the first `start`.
    pub fn trace_since(&self, start: usize) -> &[Transmission] {
        &self.trace[start.min(self.trace.len())..]
    }

    /// Run every node's timers up to and including `until`.
    pub fn run_until(&mut self, until: Duration) {
        self.flush();
        while let Some(deadline) = self
            .nodes
            .iter()
            .filter_map(|node| node.icmp.next_timer_deadline())
            .filter(|deadline| *deadline <= until)
            .min()
        {
            self.now = deadline;
            for node in self.nodes.iter_mut() {
                node.icmp.advance_time(&mut node.ip, deadline);
            }

            self.flush();
        }

        self.now = self.now.max(until);
        for node in self.nodes.iter_mut() {
            node.icmp.advance_time(&mut node.ip, self.now);
        }

        self.flush();
    }

    /// Deliver everything the nodes have sent, including anything sent
    /// in response, until the segment is quiet.
    pub fn flush(&mut self) {
        loop {
            let mut pending = Vec::new();
            for (index, node) in self.nodes.iter_mut().enumerate() {
                pending.extend(node.ip.take_sent().into_iter().map(|packet| (index, packet)));
            }

            if pending.is_empty() {
                return;
            }

            for (from, packet) in pending {
                let to = self.receivers(from, &packet);
                for &receiver in &to {
                    self.deliver(receiver, &packet);
                }

                self.trace.push(Transmission {
                    time: self.now,
                    from,
                    to,
                    packet,
                });
            }
        }
    }

    fn receivers(&self, from: usize, packet: &OutboundPacket) -> Vec<usize> {
        let dest = packet.ip_header().dest;
        let broadcast = matches!(packet.delivery, Delivery::LinkBroadcast(_))
            || dest.is_broadcast()
            || dest.is_multicast()
            || dest == self.nodes[from].icmp.interfaces()[0].broadcast();

        (0..self.nodes.len())
            .filter(|&index| index != from)
            .filter(|&index| broadcast || self.nodes[index].address() == dest)
            .collect()
    }

    fn deliver(&mut self, receiver: usize, packet: &OutboundPacket) {
        let mut datagram = packet.to_datagram();
        let header = match IpHeader::parse(datagram.header()) {
            Ok(header) => header,
            Err(err) => {
                warn!("node {} dropping unparseable datagram: {}", receiver, err);
                return;
            }
        };

        datagram.trim_head(header.header_len());
        trace!(
            "{} -> {} ({} bytes)",
            header.source,
            header.dest,
            datagram.total_len()
        );

        let node = &mut self.nodes[receiver];
        if let Err(err) = node
            .icmp
            .icmp_input(&mut node.ip, &mut node.transport, datagram, &header, 0)
        {
            warn!("node {} rejected message from {}: {}", receiver, header.source, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp::header::IcmpType;

    fn addr(a: u8, b: u8, c: u8, d: u8) -> IPv4Addr {
        IPv4Addr::from_octets(a, b, c, d)
    }

    #[test]
    fn test_echo_delivered_to_owner() {
        let mut segment = Segment::new();
        let a = segment
            .add_node(IcmpConfig::default(), addr(10, 0, 0, 2), 24)
            .unwrap();
        let b = segment
            .add_node(IcmpConfig::default(), addr(10, 0, 0, 3), 24)
            .unwrap();
        let _c = segment
            .add_node(IcmpConfig::default(), addr(10, 0, 0, 4), 24)
            .unwrap();
        let start = segment.trace().len();

        let node = segment.node_mut(a);
        node.icmp
            .send_echo_request(&mut node.ip, 0, addr(10, 0, 0, 3), 1, 1, b"hi")
            .unwrap();
        segment.flush();

        let trace = segment.trace_since(start);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].icmp_type(), Some(IcmpType::Echo as u8));
        assert_eq!(trace[0].to, vec![b]);
        assert_eq!(trace[1].icmp_type(), Some(IcmpType::EchoReply as u8));
        assert_eq!(trace[1].to, vec![a]);
    }

    #[test]
    fn test_broadcast_reaches_everyone_else() {
        let mut segment = Segment::new();
        let host = segment
            .add_node(IcmpConfig::default(), addr(10, 0, 0, 2), 24)
            .unwrap();
        segment
            .add_node(IcmpConfig::default(), addr(10, 0, 0, 3), 24)
            .unwrap();
        segment
            .add_node(IcmpConfig::default(), addr(10, 0, 0, 4), 24)
            .unwrap();

        segment.run_until(Duration::from_secs(2));

        let solicitation = segment
            .trace()
            .iter()
            .find(|t| t.from == host && t.icmp_type() == Some(IcmpType::RouterSolicitation as u8))
            .unwrap();
        assert_eq!(solicitation.to, vec![1, 2]);
    }

    #[test]
    fn test_run_until_moves_clock() {
        let mut segment = Segment::new();
        segment
            .add_node(IcmpConfig::default(), addr(10, 0, 0, 2), 24)
            .unwrap();
        segment.run_until(Duration::from_secs(30));
        assert_eq!(segment.now(), Duration::from_secs(30));
        assert_eq!(segment.node(0).icmp.now(), Duration::from_secs(30));
    }
}
