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

// Multi-node runs on a simulated segment.

use icmpstack::icmp::header::{icmp_checksum, set_header, unreachable, HeaderFields, IcmpType};
use icmpstack::icmp::{DiscoveryPhase, IcmpErrorMessage};
use icmpstack::ip::{IpHeader, NullTransport, PROTO_ICMP, PROTO_UDP};
use icmpstack::packet::Packet;
use icmpstack::sim::{Segment, Transmission};
use icmpstack::util::{self, IPv4Addr};
use icmpstack::IcmpConfig;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

const ROUTER_ADDR: IPv4Addr = IPv4Addr::from_octets(10, 0, 0, 1);
const HOST_ADDR: IPv4Addr = IPv4Addr::from_octets(10, 0, 0, 2);
const HOST2_ADDR: IPv4Addr = IPv4Addr::from_octets(10, 0, 0, 3);
const REMOTE_ADDR: IPv4Addr = IPv4Addr::from_octets(10, 0, 5, 9);

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn sent_by(trace: &[Transmission], node: usize, icmp_type: IcmpType) -> Vec<Duration> {
    trace
        .iter()
        .filter(|t| t.from == node && t.icmp_type() == Some(icmp_type as u8))
        .map(|t| t.time)
        .collect()
}

fn udp_datagram(source: IPv4Addr, dest: IPv4Addr) -> Packet {
    let payload = [0x12, 0x34, 0x00, 0x35, 0x00, 0x0c, 0x00, 0x00, 1, 2, 3, 4];
    let mut header = IpHeader::new(source, dest, PROTO_UDP);
    header.total_len = (header.header_len() + payload.len()) as u16;
    let mut datagram = Packet::from_slice(&header.to_bytes());
    datagram.append_from_slice(&payload);
    datagram
}

fn advertisement(routers: &[(IPv4Addr, i32)], lifetime: u16) -> Packet {
    let mut message = Packet::from_slice(&[0u8; 8]);
    for (router, preference) in routers {
        message.append_from_slice(&router.octets());
        message.append_from_slice(&preference.to_be_bytes());
    }

    set_header(
        message.header_mut(),
        IcmpType::RouterAdvertisement as u8,
        0,
        HeaderFields::RouterAdvertisement {
            num_addrs: routers.len() as u8,
            entry_size: 2,
            lifetime,
        },
    );
    message
}

fn inject_advertisement(segment: &mut Segment, node: usize, source: IPv4Addr, message: Packet) {
    let header = IpHeader::new(source, IPv4Addr::BROADCAST, PROTO_ICMP);
    let node = segment.node_mut(node);
    node.icmp
        .icmp_input(&mut node.ip, &mut NullTransport, message, &header, 0)
        .unwrap();
}

#[test]
fn test_echo_round_trip() {
    let mut segment = Segment::new();
    let a = segment.add_node(IcmpConfig::default(), HOST_ADDR, 24).unwrap();
    let b = segment
        .add_node(
            IcmpConfig {
                collect_statistics: true,
                ..IcmpConfig::default()
            },
            HOST2_ADDR,
            24,
        )
        .unwrap();
    let start = segment.trace().len();

    let node = segment.node_mut(a);
    node.icmp
        .send_echo_request(&mut node.ip, 0, HOST2_ADDR, 7, 3, b"0123456789")
        .unwrap();
    segment.flush();

    let trace = segment.trace_since(start);
    assert_eq!(trace.len(), 2);
    let reply = &trace[1];
    assert_eq!(reply.from, b);
    assert_eq!(reply.packet.source, HOST2_ADDR);
    assert_eq!(reply.packet.dest, HOST_ADDR);

    let message = reply.packet.payload.header();
    assert_eq!(message[0], IcmpType::EchoReply as u8);
    assert_eq!(icmp_checksum(message), 0);
    assert_eq!(util::get_be16(&message[4..6]), 7);
    assert_eq!(util::get_be16(&message[6..8]), 3);
    assert_eq!(&message[8..], b"0123456789");
    assert_eq!(segment.node(b).icmp.stats().echo_received, 1);
    assert_eq!(segment.node(b).icmp.stats().echo_reply_generated, 1);
}

#[test]
fn test_initial_advertisements_are_fast() {
    let mut segment = Segment::new();
    let router = segment
        .add_node(IcmpConfig::router(), ROUTER_ADDR, 24)
        .unwrap();
    segment.run_until(secs(2000));

    let times = sent_by(segment.trace(), router, IcmpType::RouterAdvertisement);
    assert!(times.len() >= 6);

    let mut previous = Duration::ZERO;
    for (i, time) in times.iter().enumerate() {
        let gap = *time - previous;
        if i < 4 {
            assert!(gap <= secs(16), "advertisement {} after {:?}", i, gap);
        } else {
            assert!(gap >= secs(450) && gap <= secs(600), "advertisement {} after {:?}", i, gap);
        }

        previous = *time;
    }
}

#[test]
fn test_host_discovers_router() {
    let mut segment = Segment::new();
    let router = segment
        .add_node(IcmpConfig::router(), ROUTER_ADDR, 24)
        .unwrap();
    let host = segment.add_node(IcmpConfig::default(), HOST_ADDR, 24).unwrap();
    segment.run_until(secs(5));

    // The host's first solicitation is answered within the response delay.
    let solicitations = sent_by(segment.trace(), host, IcmpType::RouterSolicitation);
    assert_eq!(solicitations.len(), 1);
    let adverts = sent_by(segment.trace(), router, IcmpType::RouterAdvertisement);
    assert!(!adverts.is_empty());
    assert!(adverts[0] <= solicitations[0] + secs(2));

    let entry = segment.node(host).icmp.router_list().best().unwrap();
    assert_eq!(entry.router, ROUTER_ADDR);
    assert_eq!(
        segment.node(host).icmp.interface_state(0).unwrap().phase(),
        DiscoveryPhase::Discovered
    );
}

#[test]
fn test_solicitation_gives_up() {
    let mut segment = Segment::new();
    let host = segment.add_node(IcmpConfig::default(), HOST_ADDR, 24).unwrap();
    segment.run_until(secs(60));

    let times = sent_by(segment.trace(), host, IcmpType::RouterSolicitation);
    assert_eq!(times.len(), 4);
    assert!(times[0] <= secs(1));
    for pair in times.windows(2) {
        assert_eq!(pair[1] - pair[0], secs(3));
    }

    assert_eq!(
        segment.node(host).icmp.interface_state(0).unwrap().phase(),
        DiscoveryPhase::GaveUp
    );
}

#[test]
fn test_router_validation_timeout() {
    let mut segment = Segment::new();
    let host = segment.add_node(IcmpConfig::default(), HOST_ADDR, 24).unwrap();
    let timed_out = Rc::new(RefCell::new(Vec::new()));
    let log = timed_out.clone();
    segment
        .node_mut(host)
        .icmp
        .register_router_timeout_callback(move |router: IPv4Addr| log.borrow_mut().push(router));

    inject_advertisement(&mut segment, host, ROUTER_ADDR, advertisement(&[(ROUTER_ADDR, 0)], 10));
    segment.run_until(secs(5));
    inject_advertisement(&mut segment, host, ROUTER_ADDR, advertisement(&[(ROUTER_ADDR, 0)], 10));

    // The first lifetime runs out, but the second advertisement still
    // holds a reference.
    segment.run_until(secs(11));
    assert!(segment.node(host).icmp.router_list().find(ROUTER_ADDR).is_some());
    assert!(timed_out.borrow().is_empty());

    segment.run_until(secs(16));
    assert!(segment.node(host).icmp.router_list().find(ROUTER_ADDR).is_none());
    assert_eq!(*timed_out.borrow(), vec![ROUTER_ADDR]);
}

#[test]
fn test_advertisement_from_other_subnet_ignored() {
    let mut segment = Segment::new();
    let host = segment.add_node(IcmpConfig::default(), HOST_ADDR, 24).unwrap();
    let off_subnet = IPv4Addr::from_octets(192, 168, 1, 1);

    inject_advertisement(
        &mut segment,
        host,
        ROUTER_ADDR,
        advertisement(&[(off_subnet, 10), (ROUTER_ADDR, 0)], 1800),
    );

    let list = segment.node(host).icmp.router_list();
    assert_eq!(list.valid_count(), 1);
    assert!(list.find(off_subnet).is_none());
    assert_eq!(list.best().unwrap().router, ROUTER_ADDR);
}

#[test]
fn test_duplicate_redirect_suppressed() {
    let mut segment = Segment::new();
    let router = segment
        .add_node(IcmpConfig::router(), ROUTER_ADDR, 24)
        .unwrap();
    let host = segment.add_node(IcmpConfig::default(), HOST_ADDR, 24).unwrap();
    let gateway = IPv4Addr::from_octets(10, 0, 0, 254);
    let datagram = udp_datagram(HOST_ADDR, REMOTE_ADDR);

    let node = segment.node_mut(router);
    assert!(node
        .icmp
        .redirect_if_applicable(&mut node.ip, &datagram, 0, 0, Some(gateway), true));
    assert!(!node
        .icmp
        .redirect_if_applicable(&mut node.ip, &datagram, 0, 0, Some(gateway), true));
    segment.flush();

    let routes = &segment.node(host).ip.routes;
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].dest, REMOTE_ADDR);
    assert_eq!(routes[0].mask, IPv4Addr::BROADCAST);
    assert_eq!(routes[0].next_hop, gateway);

    // Allowed again once the retry time has passed.
    segment.run_until(segment.now() + secs(1));
    assert!(segment.node(router).icmp.redirect_cache().is_empty());
    let node = segment.node_mut(router);
    assert!(node
        .icmp
        .redirect_if_applicable(&mut node.ip, &datagram, 0, 0, Some(gateway), true));
}

#[test]
fn test_recorded_suppression_blocks_redirect() {
    let mut segment = Segment::new();
    let router = segment
        .add_node(IcmpConfig::router(), ROUTER_ADDR, 24)
        .unwrap();
    segment.add_node(IcmpConfig::default(), HOST_ADDR, 24).unwrap();
    let datagram = udp_datagram(HOST_ADDR, REMOTE_ADDR);
    let start = segment.trace().len();

    let node = segment.node_mut(router);
    node.icmp.record_suppression(HOST_ADDR, REMOTE_ADDR);
    assert!(!node.icmp.generate_error(
        &mut node.ip,
        &datagram,
        HOST_ADDR,
        0,
        &IcmpErrorMessage::redirect(1, IPv4Addr::from_octets(10, 0, 0, 254)),
    ));
    segment.flush();

    assert!(segment.trace_since(start).is_empty());
    assert_eq!(segment.node(router).icmp.redirect_cache().len(), 1);
}

#[test]
fn test_port_unreachable_reaches_transport() {
    let mut segment = Segment::new();
    let host = segment.add_node(IcmpConfig::default(), HOST_ADDR, 24).unwrap();
    let peer = segment.add_node(IcmpConfig::default(), HOST2_ADDR, 24).unwrap();
    let datagram = udp_datagram(HOST_ADDR, HOST2_ADDR);

    let node = segment.node_mut(peer);
    assert!(node.icmp.generate_error(
        &mut node.ip,
        &datagram,
        HOST_ADDR,
        0,
        &IcmpErrorMessage::unreachable(unreachable::PORT),
    ));
    segment.flush();

    let notifications = &segment.node(host).transport.notifications;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].protocol, PROTO_UDP);
    assert_eq!(notifications[0].icmp_type, IcmpType::DestinationUnreachable as u8);
    assert_eq!(notifications[0].code, unreachable::PORT);
    assert_eq!(&notifications[0].message[..4], &[0x12, 0x34, 0x00, 0x35]);
}
