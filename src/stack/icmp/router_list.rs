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
// Routers a host has learned about from advertisements (RFC 1256).
// The table is a fixed array. Each advertisement for a router bumps its
// reference count and arms one validation timer; each timer that fires
// drops the count, and the row goes invalid when it reaches zero. Rows
// marked system_configured are static: advertisements don't refresh
// them, timers don't expire them, and they are never evicted.
//

use crate::util::IPv4Addr;
use std::time::Duration;

pub const ROUTER_LIST_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterListEntry {
    pub system_configured: bool,
    pub valid: bool,
    pub ref_count: u32,
    pub interface: usize,
    pub router: IPv4Addr,
    pub preference: i32,
    pub time_to_live: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterUpdate {
    /// Existing row refreshed.
    Refreshed,

    /// New row created, possibly evicting the router in `evicted`.
    Inserted { evicted: Option<IPv4Addr> },

    /// Router is a static entry and was left alone.
    Static,

    /// No room: every row is valid and static.
    NoRoom,
}

impl RouterUpdate {
    /// True if the caller needs to arm a validation timer for the router.
    pub fn needs_validation_timer(&self) -> bool {
        matches!(self, RouterUpdate::Refreshed | RouterUpdate::Inserted { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouterList {
    entries: [RouterListEntry; ROUTER_LIST_SIZE],
}

impl RouterList {
    pub fn new() -> RouterList {
        RouterList::default()
    }

    fn find_valid(&self, router: IPv4Addr) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.valid && e.router == router)
    }

    /// First invalid row, otherwise the non-static row with the lowest
    /// preference (earliest in the table on ties).
    fn free_or_min_row(&self) -> Option<usize> {
        if let Some(index) = self.entries.iter().position(|e| !e.valid) {
            return Some(index);
        }

        let mut best: Option<usize> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.system_configured {
                continue;
            }

            best = match best {
                Some(b) if self.entries[b].preference <= entry.preference => Some(b),
                _ => Some(i),
            };
        }

        best
    }

    /// Record an advertisement for `router`. The caller has already
    /// checked that the router is on the receiving interface's subnet.
    pub fn update_or_insert(
        &mut self,
        router: IPv4Addr,
        preference: i32,
        lifetime: Duration,
        interface: usize,
    ) -> RouterUpdate {
        if let Some(index) = self.find_valid(router) {
            let entry = &mut self.entries[index];
            if entry.system_configured {
                return RouterUpdate::Static;
            }

            entry.preference = preference;
            entry.time_to_live = lifetime;
            entry.ref_count += 1;
            entry.interface = interface;
            return RouterUpdate::Refreshed;
        }

        let index = match self.free_or_min_row() {
            Some(index) => index,
            None => return RouterUpdate::NoRoom,
        };

        let evicted = if self.entries[index].valid {
            Some(self.entries[index].router)
        } else {
            None
        };

        self.entries[index] = RouterListEntry {
            system_configured: false,
            valid: true,
            ref_count: 1,
            interface,
            router,
            preference,
            time_to_live: lifetime,
        };

        RouterUpdate::Inserted { evicted }
    }

    /// Add a static row. Returns false if the table has no free row and
    /// nothing can be evicted.
    pub fn insert_static(&mut self, router: IPv4Addr, preference: i32, interface: usize) -> bool {
        let index = match self.find_valid(router).or_else(|| self.free_or_min_row()) {
            Some(index) => index,
            None => return false,
        };

        self.entries[index] = RouterListEntry {
            system_configured: true,
            valid: true,
            ref_count: 0,
            interface,
            router,
            preference,
            time_to_live: Duration::ZERO,
        };

        true
    }

    /// Handle one validation timer for `router`. Returns true if that
    /// made the row invalid.
    pub fn expire(&mut self, router: IPv4Addr) -> bool {
        let entry = match self
            .entries
            .iter_mut()
            .find(|e| e.valid && !e.system_configured && e.router == router)
        {
            Some(entry) => entry,
            None => return false,
        };

        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            entry.valid = false;
            return true;
        }

        false
    }

    pub fn find(&self, router: IPv4Addr) -> Option<&RouterListEntry> {
        self.find_valid(router).map(|i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouterListEntry> {
        self.entries.iter()
    }

    pub fn valid_entries(&self) -> impl Iterator<Item = &RouterListEntry> {
        self.entries.iter().filter(|e| e.valid)
    }

    pub fn valid_count(&self) -> usize {
        self.valid_entries().count()
    }

    /// Valid router with the highest preference, used as the default
    /// gateway.
    pub fn best(&self) -> Option<&RouterListEntry> {
        let mut best: Option<&RouterListEntry> = None;
        for entry in self.valid_entries() {
            best = match best {
                Some(b) if b.preference >= entry.preference => Some(b),
                _ => Some(entry),
            };
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LIFETIME: Duration = Duration::from_secs(1800);

    fn router(n: u8) -> IPv4Addr {
        IPv4Addr::from_octets(10, 0, 0, n)
    }

    #[test]
    fn test_insert_and_refresh() {
        let mut list = RouterList::new();
        assert_eq!(
            list.update_or_insert(router(1), 5, LIFETIME, 0),
            RouterUpdate::Inserted { evicted: None }
        );
        assert_eq!(list.find(router(1)).unwrap().ref_count, 1);

        assert_eq!(
            list.update_or_insert(router(1), 7, Duration::from_secs(900), 1),
            RouterUpdate::Refreshed
        );
        let entry = list.find(router(1)).unwrap();
        assert_eq!(entry.ref_count, 2);
        assert_eq!(entry.preference, 7);
        assert_eq!(entry.interface, 1);
        assert_eq!(entry.time_to_live, Duration::from_secs(900));
        assert_eq!(list.valid_count(), 1);
    }

    #[test]
    fn test_expire_counts_down() {
        let mut list = RouterList::new();
        list.update_or_insert(router(1), 0, LIFETIME, 0);
        list.update_or_insert(router(1), 0, LIFETIME, 0);
        assert!(!list.expire(router(1)));
        assert!(list.find(router(1)).is_some());
        assert!(list.expire(router(1)));
        assert!(list.find(router(1)).is_none());

        // Later timers for the same router are stale
        assert!(!list.expire(router(1)));
    }

    #[test]
    fn test_evicts_lowest_preference() {
        let mut list = RouterList::new();
        let preferences = [4, -2, 9, -2, 3];
        for (i, preference) in preferences.iter().enumerate() {
            list.update_or_insert(router(i as u8 + 1), *preference, LIFETIME, 0);
        }

        // Tie between router 2 and 4: the first in the table goes
        assert_eq!(
            list.update_or_insert(router(10), 1, LIFETIME, 0),
            RouterUpdate::Inserted {
                evicted: Some(router(2))
            }
        );
        assert!(list.find(router(2)).is_none());
        assert!(list.find(router(4)).is_some());
        assert_eq!(list.valid_count(), ROUTER_LIST_SIZE);
    }

    #[test]
    fn test_static_rows_are_not_evicted() {
        let mut list = RouterList::new();
        assert!(list.insert_static(router(1), -100, 0));
        for n in 2..=5 {
            list.update_or_insert(router(n), 10, LIFETIME, 0);
        }

        let update = list.update_or_insert(router(6), 20, LIFETIME, 0);
        assert_eq!(
            update,
            RouterUpdate::Inserted {
                evicted: Some(router(2))
            }
        );
        assert!(list.find(router(1)).unwrap().system_configured);

        // Static rows ignore advertisements and timers
        assert_eq!(list.update_or_insert(router(1), 50, LIFETIME, 0), RouterUpdate::Static);
        assert!(!RouterUpdate::Static.needs_validation_timer());
        assert!(!list.expire(router(1)));
        assert_eq!(list.find(router(1)).unwrap().preference, -100);
    }

    #[test]
    fn test_no_room_when_all_static() {
        let mut list = RouterList::new();
        for n in 1..=5 {
            assert!(list.insert_static(router(n), 0, 0));
        }

        assert_eq!(list.update_or_insert(router(9), 0, LIFETIME, 0), RouterUpdate::NoRoom);
        assert!(!list.insert_static(router(9), 0, 0));
    }

    #[test]
    fn test_best() {
        let mut list = RouterList::new();
        assert!(list.best().is_none());
        list.update_or_insert(router(1), 1, LIFETIME, 0);
        list.update_or_insert(router(2), 8, LIFETIME, 0);
        list.update_or_insert(router(3), 8, LIFETIME, 0);
        assert_eq!(list.best().unwrap().router, router(2));
    }

    proptest! {
        #[test]
        fn prop_capacity_and_uniqueness(
            ops in prop::collection::vec((1u8..12, -5i32..5, any::<bool>()), 1..200)
        ) {
            let mut list = RouterList::new();
            for (n, preference, is_expire) in ops {
                if is_expire {
                    list.expire(router(n));
                } else {
                    list.update_or_insert(router(n), preference, LIFETIME, 0);
                }

                prop_assert!(list.valid_count() <= ROUTER_LIST_SIZE);
                let mut seen: Vec<IPv4Addr> = list.valid_entries().map(|e| e.router).collect();
                seen.sort();
                seen.dedup();
                prop_assert_eq!(seen.len(), list.valid_count());
                prop_assert!(list.valid_entries().all(|e| e.ref_count > 0));
            }
        }

        #[test]
        fn prop_eviction_picks_a_minimum(
            preferences in prop::collection::vec(-50i32..50, ROUTER_LIST_SIZE),
            newcomer in -50i32..50
        ) {
            let mut list = RouterList::new();
            for (i, preference) in preferences.iter().enumerate() {
                list.update_or_insert(router(i as u8 + 1), *preference, LIFETIME, 0);
            }

            let lowest = *preferences.iter().min().unwrap();
            match list.update_or_insert(router(100), newcomer, LIFETIME, 0) {
                RouterUpdate::Inserted { evicted: Some(gone) } => {
                    let index = (gone.octets()[3] - 1) as usize;
                    prop_assert_eq!(preferences[index], lowest);
                    prop_assert_eq!(preferences.iter().position(|p| *p == lowest), Some(index));
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
