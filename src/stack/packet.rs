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
// A packet is a byte buffer with an optional "virtual" payload: a count of
// bytes that are accounted for on the wire (and in size budgets) but never
// materialized. Headers are prepended with alloc_header and stripped with
// trim_head, so a packet travels down the stack growing at the front.
//

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    data: Vec<u8>,
    virtual_len: usize,
}

impl Packet {
    pub fn new() -> Packet {
        Packet {
            data: Vec::new(),
            virtual_len: 0,
        }
    }

    pub fn from_slice(data: &[u8]) -> Packet {
        Packet {
            data: data.to_vec(),
            virtual_len: 0,
        }
    }

    /// Number of real bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.virtual_len == 0
    }

    pub fn virtual_len(&self) -> usize {
        self.virtual_len
    }

    /// Size on the wire: real bytes plus virtual payload.
    pub fn total_len(&self) -> usize {
        self.data.len() + self.virtual_len
    }

    pub fn add_virtual_payload(&mut self, len: usize) {
        self.virtual_len += len;
    }

    /// Prepend `size` zeroed bytes.
    pub fn alloc_header(&mut self, size: usize) {
        self.data.splice(0..0, std::iter::repeat(0).take(size));
    }

    /// Remove `size` bytes from the front. Trimming past the end
    /// leaves an empty buffer.
    pub fn trim_head(&mut self, size: usize) {
        let size = size.min(self.data.len());
        self.data.drain(..size);
    }

    /// Drop real bytes past `len`. Does not touch the virtual payload.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub fn append_from_slice(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    pub fn header(&self) -> &[u8] {
        &self.data
    }

    pub fn header_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_header() {
        let mut packet = Packet::from_slice(&[1, 2, 3]);
        packet.alloc_header(2);
        assert_eq!(packet.header(), &[0, 0, 1, 2, 3]);
        packet.header_mut()[0] = 0xaa;
        assert_eq!(packet.header()[0], 0xaa);
    }

    #[test]
    fn test_trim_head() {
        let mut packet = Packet::from_slice(&[1, 2, 3, 4]);
        packet.trim_head(3);
        assert_eq!(packet.header(), &[4]);
        packet.trim_head(10);
        assert_eq!(packet.len(), 0);
    }

    #[test]
    fn test_virtual_payload() {
        let mut packet = Packet::from_slice(&[0; 20]);
        packet.add_virtual_payload(100);
        assert_eq!(packet.len(), 20);
        assert_eq!(packet.virtual_len(), 100);
        assert_eq!(packet.total_len(), 120);

        packet.truncate(8);
        assert_eq!(packet.total_len(), 108);
        assert!(!packet.is_empty());
    }

    #[test]
    fn test_append() {
        let mut packet = Packet::new();
        assert!(packet.is_empty());
        packet.append_from_slice(&[5, 6]);
        packet.append_from_slice(&[7]);
        assert_eq!(packet.header(), &[5, 6, 7]);
    }
}
