//! Bounded, ordered change log.

use std::collections::VecDeque;

use sortie_client::{EventList, WatchEvent};

use super::error::{StoreError, StoreResult};

/// Default number of events kept in memory.
pub const DEFAULT_RETAINED_EVENTS: usize = 10_000;

/// Change log with monotonically increasing sequence numbers.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<WatchEvent>,
    next_seq: u64,
    retained: usize,
}

impl EventLog {
    pub fn new(retained: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_seq: 1,
            retained: retained.max(1),
        }
    }

    /// Append an event, assigning its sequence number.
    pub fn append(&mut self, mut event: WatchEvent) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        event.seq = seq;
        self.events.push_back(event);

        while self.events.len() > self.retained {
            self.events.pop_front();
        }
        seq
    }

    /// Sequence number of the newest event, 0 if none.
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    /// Events with `seq > after`, at most `limit` of them.
    ///
    /// A cursor at or past the newest event yields an empty page whose
    /// `next_after` is the newest sequence number. Fails if events after
    /// `after` were already dropped.
    pub fn read_after(&self, after: u64, limit: usize) -> StoreResult<EventList> {
        if after >= self.last_seq() {
            return Ok(EventList {
                items: Vec::new(),
                next_after: self.last_seq(),
            });
        }

        if let Some(oldest) = self.events.front().map(|e| e.seq) {
            if after + 1 < oldest {
                return Err(StoreError::Expired {
                    requested: after,
                    oldest,
                });
            }
        }

        let items: Vec<WatchEvent> = self
            .events
            .iter()
            .filter(|e| e.seq > after)
            .take(limit)
            .cloned()
            .collect();
        let next_after = items.last().map(|e| e.seq).unwrap_or(after);

        Ok(EventList { items, next_after })
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_RETAINED_EVENTS)
    }
}
