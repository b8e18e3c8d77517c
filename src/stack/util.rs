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

use std::convert::TryInto;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct IPv4Addr {
    addr: [u8; 4],
}

impl IPv4Addr {
    /// 0.0.0.0, also used as "no address"
    pub const UNSPECIFIED: IPv4Addr = IPv4Addr::from_octets(0, 0, 0, 0);

    /// Limited broadcast (ANY_DEST). Router discovery messages are sent here.
    pub const BROADCAST: IPv4Addr = IPv4Addr::from_octets(255, 255, 255, 255);

    pub const fn new() -> Self {
        Self { addr: [0; 4] }
    }

    pub const fn from_octets(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self { addr: [a, b, c, d] }
    }

    /// Panics if the slice isn't exactly four bytes.
    pub fn new_from(addr: &[u8]) -> Self {
        Self {
            addr: addr.try_into().unwrap(),
        }
    }

    pub const fn from_u32(value: u32) -> Self {
        Self {
            addr: value.to_be_bytes(),
        }
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.addr)
    }

    pub fn copy_to(&self, buffer: &mut [u8]) {
        buffer.copy_from_slice(&self.addr);
    }

    pub fn octets(&self) -> [u8; 4] {
        self.addr
    }

    pub fn is_unspecified(&self) -> bool {
        self.addr == [0; 4]
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    // 224.0.0.0/4
    pub fn is_multicast(&self) -> bool {
        self.addr[0] & 0xf0 == 0xe0
    }

    // 127.0.0.0/8
    pub fn is_loopback(&self) -> bool {
        self.addr[0] == 127
    }

    /// Mask with the top `prefix_len` bits set.
    pub fn netmask(prefix_len: u8) -> Self {
        if prefix_len == 0 {
            Self::UNSPECIFIED
        } else {
            Self::from_u32(u32::MAX << (32 - u32::from(prefix_len.min(32))))
        }
    }

    pub fn mask(&self, mask: IPv4Addr) -> Self {
        Self::from_u32(self.to_u32() & mask.to_u32())
    }
}

impl std::fmt::Display for IPv4Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.addr[0], self.addr[1], self.addr[2], self.addr[3]
        )
    }
}

// Compute one's complement sum, per RFV 1071
// https://datatracker.ietf.org/doc/html/rfc1071
pub fn compute_ones_comp(in_checksum: u16, slice: &[u8]) -> u16 {
    let mut checksum: u32 = in_checksum as u32;

    let mut i = 0;
    while i + 1 < slice.len() {
        checksum += u16::from_be_bytes([slice[i], slice[i + 1]]) as u32;
        i += 2;
    }

    // Odd trailing byte is padded with zero on the right.
    if i < slice.len() {
        checksum += (slice[i] as u32) << 8;
    }

    while checksum > 0xffff {
        checksum = (checksum & 0xffff) + (checksum >> 16);
    }

    checksum as u16
}

pub fn compute_checksum(slice: &[u8]) -> u16 {
    0xffff ^ compute_ones_comp(0, slice)
}

pub fn get_be16(buffer: &[u8]) -> u16 {
    ((buffer[0] as u16) << 8) | buffer[1] as u16
}

pub fn get_be32(buffer: &[u8]) -> u32 {
    ((buffer[0] as u32) << 24)
        | ((buffer[1] as u32) << 16)
        | ((buffer[2] as u32) << 8)
        | buffer[3] as u32
}

pub fn set_be16(buffer: &mut [u8], value: u16) {
    buffer[0] = ((value >> 8) & 0xff) as u8;
    buffer[1] = (value & 0xff) as u8;
}

pub fn set_be32(buffer: &mut [u8], value: u32) {
    buffer[0] = ((value >> 24) & 0xff) as u8;
    buffer[1] = ((value >> 16) & 0xff) as u8;
    buffer[2] = ((value >> 8) & 0xff) as u8;
    buffer[3] = (value & 0xff) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_ones_comp() {
        assert_eq!(compute_ones_comp(0, &[0x00, 0x00]), 0);
        assert_eq!(compute_ones_comp(0, &[0x00, 0x01]), 0x1);
        assert_eq!(compute_ones_comp(0, &[0x00, 0xff]), 0xff);
        assert_eq!(compute_ones_comp(0, &[0xff, 0x23, 0xef, 0x55]), 0xee79);
    }

    #[test]
    fn test_compute_ones_comp_empty() {
        assert_eq!(compute_ones_comp(0, &[]), 0);
        assert_eq!(compute_ones_comp(0x1234, &[]), 0x1234);
    }

    #[test]
    fn test_compute_ones_comp_odd_length() {
        assert_eq!(compute_ones_comp(0, &[0x12, 0x34, 0x56]), 0x6834);
    }

    #[test]
    fn test_compute_ones_comp_carry() {
        // 0xffff + 0x0002 = 0x10001, folds to 0x0002
        assert_eq!(compute_ones_comp(0, &[0xff, 0xff, 0x00, 0x02]), 0x0002);
    }

    #[test]
    fn test_compute_checksum() {
        assert_eq!(compute_checksum(&[0x00, 0x00]), 0xffff);
        assert_eq!(compute_checksum(&[0x00, 0x01]), 0xfffe);
        assert_eq!(compute_checksum(&[0x00, 0xff]), 0xff00);
        assert_eq!(compute_checksum(&[0xff, 0x23, 0xef, 0x55]), 0x1186);
    }

    #[test]
    fn test_get_be16() {
        assert_eq!(get_be16(&[0x00, 0x00]), 0x0000);
        assert_eq!(get_be16(&[0x35, 0xa5]), 0x35a5);
    }

    #[test]
    fn test_get_be32() {
        assert_eq!(get_be32(&[0xde, 0xad, 0xbe, 0xef]), 0xdeadbeef);
        assert_eq!(get_be32(&[0x00, 0x00, 0x00, 0x01]), 0x00000001);
        assert_eq!(get_be32(&[0xff, 0x00, 0x00, 0x00]), 0xff000000);
    }

    #[test]
    fn test_set_be16() {
        let mut buffer = [0u8; 2];
        set_be16(&mut buffer, 0x0100);
        assert_eq!(buffer, [0x01, 0x00]);
        set_be16(&mut buffer, 0xffff);
        assert_eq!(buffer, [0xff, 0xff]);
    }

    #[test]
    fn test_set_be32() {
        let mut buffer = [0u8; 4];
        set_be32(&mut buffer, 0x00010000);
        assert_eq!(buffer, [0x00, 0x01, 0x00, 0x00]);
        set_be32(&mut buffer, 0xdeadbeef);
        assert_eq!(buffer, [0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_ip_to_str() {
        assert_eq!(
            IPv4Addr::new_from(&[18u8, 52, 86, 120]).to_string(),
            "18.52.86.120"
        );
    }

    #[test]
    fn test_ip_u32_conversion() {
        let ip = IPv4Addr::from_octets(10, 0, 1, 2);
        assert_eq!(ip.to_u32(), 0x0a000102);
        assert_eq!(IPv4Addr::from_u32(0x0a000102), ip);
    }

    #[test]
    fn test_ip_predicates() {
        assert!(IPv4Addr::from_octets(224, 0, 0, 1).is_multicast());
        assert!(IPv4Addr::from_octets(239, 255, 255, 250).is_multicast());
        assert!(!IPv4Addr::from_octets(240, 0, 0, 1).is_multicast());
        assert!(IPv4Addr::from_octets(127, 0, 0, 1).is_loopback());
        assert!(IPv4Addr::BROADCAST.is_broadcast());
        assert!(IPv4Addr::new().is_unspecified());
    }

    #[test]
    fn test_netmask() {
        assert_eq!(IPv4Addr::netmask(24), IPv4Addr::from_octets(255, 255, 255, 0));
        assert_eq!(IPv4Addr::netmask(0), IPv4Addr::UNSPECIFIED);
        assert_eq!(IPv4Addr::netmask(32), IPv4Addr::BROADCAST);
        assert_eq!(
            IPv4Addr::from_octets(10, 1, 2, 3).mask(IPv4Addr::netmask(16)),
            IPv4Addr::from_octets(10, 1, 0, 0)
        );
    }

    #[test]
    fn test_copy_to() {
        let ip = IPv4Addr::new_from(&[192, 168, 1, 1]);
        let mut buffer = [0u8; 4];
        ip.copy_to(&mut buffer);
        assert_eq!(buffer, [192, 168, 1, 1]);
    }
}
