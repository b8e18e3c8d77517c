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

// Addressing for one network interface of a node.

use crate::util::IPv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interface {
    pub address: IPv4Addr,
    pub prefix_len: u8,
}

impl Interface {
    pub fn new(address: IPv4Addr, prefix_len: u8) -> Interface {
        Interface {
            address,
            prefix_len: prefix_len.min(32),
        }
    }

    pub fn netmask(&self) -> IPv4Addr {
        IPv4Addr::netmask(self.prefix_len)
    }

    pub fn network(&self) -> IPv4Addr {
        self.address.mask(self.netmask())
    }

    /// Directed broadcast address for this subnet.
    pub fn broadcast(&self) -> IPv4Addr {
        IPv4Addr::from_u32(self.network().to_u32() | !self.netmask().to_u32())
    }

    /// True if `addr` is on the same subnet as this interface.
    pub fn contains(&self, addr: IPv4Addr) -> bool {
        addr.mask(self.netmask()) == self.network()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet() {
        let iface = Interface::new(IPv4Addr::from_octets(192, 168, 4, 17), 24);
        assert_eq!(iface.network(), IPv4Addr::from_octets(192, 168, 4, 0));
        assert_eq!(iface.broadcast(), IPv4Addr::from_octets(192, 168, 4, 255));
        assert!(iface.contains(IPv4Addr::from_octets(192, 168, 4, 1)));
        assert!(!iface.contains(IPv4Addr::from_octets(192, 168, 5, 1)));
    }

    #[test]
    fn test_odd_prefix() {
        let iface = Interface::new(IPv4Addr::from_octets(10, 0, 0, 70), 26);
        assert_eq!(iface.network(), IPv4Addr::from_octets(10, 0, 0, 64));
        assert_eq!(iface.broadcast(), IPv4Addr::from_octets(10, 0, 0, 127));
        assert!(!iface.contains(IPv4Addr::from_octets(10, 0, 0, 128)));
    }

    #[test]
    fn test_host_route_prefix() {
        let iface = Interface::new(IPv4Addr::from_octets(10, 1, 1, 1), 32);
        assert_eq!(iface.broadcast(), iface.address);
        assert!(iface.contains(iface.address));
        assert!(!iface.contains(IPv4Addr::from_octets(10, 1, 1, 2)));
    }
}
