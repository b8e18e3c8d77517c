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

// Fixtures shared by the unit tests of the icmp submodules.

use super::header::{set_header, HeaderFields, IcmpType, ICMP_HEADER_LEN};
use super::IcmpModule;
use crate::config::IcmpConfig;
use crate::netif::Interface;
use crate::packet::Packet;
use crate::util::IPv4Addr;

pub const HOST_ADDR: IPv4Addr = IPv4Addr::from_octets(10, 0, 0, 2);
pub const ROUTER_ADDR: IPv4Addr = IPv4Addr::from_octets(10, 0, 0, 1);
pub const ROUTER_ADDR2: IPv4Addr = IPv4Addr::from_octets(10, 0, 1, 1);

pub fn addr(a: u8, b: u8, c: u8, d: u8) -> IPv4Addr {
    IPv4Addr::from_octets(a, b, c, d)
}

pub fn host_interface() -> Interface {
    Interface::new(HOST_ADDR, 24)
}

pub fn host() -> IcmpModule {
    IcmpModule::new(IcmpConfig::default(), vec![host_interface()]).unwrap()
}

pub fn host_with(config: IcmpConfig) -> IcmpModule {
    IcmpModule::new(config, vec![host_interface()]).unwrap()
}

/// Router with one interface on 10.0.0.0/24 and one on 10.0.1.0/24.
pub fn router_with(config: IcmpConfig) -> IcmpModule {
    IcmpModule::new(
        IcmpConfig {
            router: true,
            ..config
        },
        vec![Interface::new(ROUTER_ADDR, 24), Interface::new(ROUTER_ADDR2, 24)],
    )
    .unwrap()
}

pub fn router() -> IcmpModule {
    router_with(IcmpConfig::router())
}

pub fn echo_message(id: u16, sequence: u16, data: &[u8]) -> Packet {
    let mut message = Packet::from_slice(&[0u8; ICMP_HEADER_LEN]);
    message.append_from_slice(data);
    set_header(
        message.header_mut(),
        IcmpType::Echo as u8,
        0,
        HeaderFields::EchoOrTimestamp { id, sequence },
    );
    message
}

/// Router advertisement listing each (address, preference) pair.
pub fn advertisement_message(routers: &[(IPv4Addr, i32)], lifetime: u16) -> Packet {
    let mut message = Packet::from_slice(&[0u8; ICMP_HEADER_LEN]);
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
