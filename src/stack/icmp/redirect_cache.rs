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
// Suppresses duplicate redirects. After a router sends a redirect for a
// (source, destination) pair it won't send another for the same pair
// until the retry time has passed. Every entry has the same lifetime, so
// entries expire in insertion order.
//

use crate::util::IPv4Addr;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectEntry {
    pub source: IPv4Addr,
    pub destination: IPv4Addr,
    pub expires_at: Duration,
}

#[derive(Debug, Default)]
pub struct RedirectCache {
    entries: VecDeque<RedirectEntry>,
}

impl RedirectCache {
    pub fn new() -> RedirectCache {
        RedirectCache::default()
    }

    pub fn contains(&self, source: IPv4Addr, destination: IPv4Addr) -> bool {
        self.entries
            .iter()
            .any(|e| e.source == source && e.destination == destination)
    }

    pub fn insert(&mut self, source: IPv4Addr, destination: IPv4Addr, expires_at: Duration) {
        self.entries.push_back(RedirectEntry {
            source,
            destination,
            expires_at,
        });
    }

    /// Remove the entry whose timer just fired. It must be the oldest
    /// one: timers with equal deadlines fire in the order they were set,
    /// so anything else means the FIFO invariant was broken.
    pub fn expire(&mut self, source: IPv4Addr, destination: IPv4Addr, now: Duration) {
        match self.entries.front() {
            Some(head) if head.source == source && head.destination == destination => {
                self.entries.pop_front();
            }
            head => panic!(
                "redirect cache out of order: expiring {} -> {} at {:?}, head is {:?}",
                source, destination, now, head
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RedirectEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> IPv4Addr {
        IPv4Addr::from_octets(10, 0, 0, n)
    }

    #[test]
    fn test_insert_contains() {
        let mut cache = RedirectCache::new();
        assert!(!cache.contains(addr(1), addr(2)));
        cache.insert(addr(1), addr(2), Duration::from_secs(1));
        assert!(cache.contains(addr(1), addr(2)));
        assert!(!cache.contains(addr(2), addr(1)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expire_in_order() {
        let mut cache = RedirectCache::new();
        cache.insert(addr(1), addr(2), Duration::from_secs(1));
        cache.insert(addr(3), addr(4), Duration::from_secs(2));
        cache.expire(addr(1), addr(2), Duration::from_secs(1));
        assert!(!cache.contains(addr(1), addr(2)));
        assert!(cache.contains(addr(3), addr(4)));
        cache.expire(addr(3), addr(4), Duration::from_secs(2));
        assert!(cache.is_empty());
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_expire_same_deadline_not_head() {
        let mut cache = RedirectCache::new();
        cache.insert(addr(1), addr(2), Duration::from_secs(5));
        cache.insert(addr(3), addr(4), Duration::from_secs(5));
        cache.expire(addr(3), addr(4), Duration::from_secs(5));
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_expire_out_of_order() {
        let mut cache = RedirectCache::new();
        cache.insert(addr(1), addr(2), Duration::from_secs(1));
        cache.insert(addr(3), addr(4), Duration::from_secs(2));
        cache.expire(addr(3), addr(4), Duration::from_secs(2));
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_expire_missing() {
        let mut cache = RedirectCache::new();
        cache.expire(addr(1), addr(2), Duration::from_secs(1));
    }
}
