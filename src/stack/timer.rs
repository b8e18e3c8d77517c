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

use std::time::Duration;

//
// Per-node timer queue running on simulated time.
// Protocol timers are set far more often than they are inspected, so this
// doesn't keep them sorted; finding the next one to fire is a linear scan
// of the pending list. The number of outstanding timers per node is small
// (a few per interface plus one per cached router or redirect), so the scan
// is cheap.
//
// Time only moves when the owner pops an expired timer or calls advance_to.
// Events are plain values rather than closures so the owner can dispatch
// them with mutable access to its own state. Timers are never cancelled;
// the handler decides whether a fired event still matters.
//

struct Timer<E> {
    deadline: Duration,
    event: E,
}

pub struct TimerQueue<E> {
    now: Duration,
    pending: Vec<Timer<E>>,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> TimerQueue<E> {
        TimerQueue {
            now: Duration::ZERO,
            pending: Vec::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `event` to fire `timeout` after the current time.
    pub fn set_timer(&mut self, timeout: Duration, event: E) {
        self.pending.push(Timer {
            deadline: self.now + timeout,
            event,
        });
    }

    fn earliest(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, timer) in self.pending.iter().enumerate() {
            best = match best {
                Some(b) if self.pending[b].deadline <= timer.deadline => Some(b),
                _ => Some(i),
            };
        }

        best
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.earliest().map(|i| self.pending[i].deadline)
    }

    /// Remove and return the earliest timer whose deadline is at or before
    /// `until`, moving the clock forward to its deadline. Timers with equal
    /// deadlines come out in the order they were set.
    pub fn pop_expired(&mut self, until: Duration) -> Option<E> {
        let index = self.earliest()?;
        if self.pending[index].deadline > until {
            return None;
        }

        let timer = self.pending.remove(index);
        if timer.deadline > self.now {
            self.now = timer.deadline;
        }

        Some(timer.event)
    }

    /// Move the clock forward without firing anything. Never moves backward.
    pub fn advance_to(&mut self, time: Duration) {
        if time > self.now {
            self.now = time;
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending events with their absolute deadlines, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (Duration, &E)> {
        self.pending.iter().map(|t| (t.deadline, &t.event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_timer() {
        let mut queue = TimerQueue::new();
        queue.set_timer(Duration::from_millis(100), 'a');
        assert_eq!(queue.pop_expired(Duration::from_millis(99)), None);
        assert_eq!(queue.pop_expired(Duration::from_millis(100)), Some('a'));
        assert_eq!(queue.now(), Duration::from_millis(100));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_multiple_timers() {
        let mut queue = TimerQueue::new();
        queue.set_timer(Duration::from_millis(500), 1);
        queue.set_timer(Duration::from_millis(100), 2);
        assert_eq!(queue.next_deadline(), Some(Duration::from_millis(100)));

        let until = Duration::from_millis(300);
        assert_eq!(queue.pop_expired(until), Some(2));
        assert_eq!(queue.pop_expired(until), None);
        queue.advance_to(until);
        assert_eq!(queue.now(), until);

        // Relative to the new current time
        queue.set_timer(Duration::from_millis(100), 3);
        let until = Duration::from_millis(1000);
        assert_eq!(queue.pop_expired(until), Some(3));
        assert_eq!(queue.pop_expired(until), Some(1));
        assert_eq!(queue.now(), Duration::from_millis(500));
    }

    #[test]
    fn test_equal_deadlines_fire_in_set_order() {
        let mut queue = TimerQueue::new();
        for i in 0..4 {
            queue.set_timer(Duration::from_secs(1), i);
        }

        let until = Duration::from_secs(1);
        let fired: Vec<i32> = std::iter::from_fn(|| queue.pop_expired(until)).collect();
        assert_eq!(fired, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_clock_never_moves_backward() {
        let mut queue: TimerQueue<()> = TimerQueue::new();
        queue.advance_to(Duration::from_secs(5));
        queue.advance_to(Duration::from_secs(2));
        assert_eq!(queue.now(), Duration::from_secs(5));
    }
}
