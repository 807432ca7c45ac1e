//! `Dispatcher`: the time-ordered event queue and the simulation clock.
//!
//! # Ordering
//!
//! Events are kept in a `BTreeMap` keyed by `(timestamp, priority, seq)`,
//! where `seq` is a counter stamped at registration.  The key is a total
//! order, so two runs that register the same events in the same sequence
//! fire them in the same sequence: by time, then by priority, then FIFO.
//!
//! # Performance note
//!
//! `BTreeMap` gives O(log E) insert and pop where E = pending events.  A
//! scenario keeps roughly one pending event per demand generator, sensor,
//! controller, and lane selector, plus one model update, so E stays small.
//! Cancellation is a linear scan; it happens on configuration changes, not
//! per step.

use std::collections::BTreeMap;

use log::trace;

use ctm_core::SimTime;

use crate::{ActionKind, DispatchError, DispatchResult, Event, Recipient};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
struct EventOrder {
    timestamp: SimTime,
    priority:  u8,
    seq:       u64,
}

/// Holds pending events and the current simulation time.
///
/// The dispatcher is the only thing that advances time: `current_time`
/// moves forward as events are popped, and to the horizon when a
/// [`dispatch_until`](Self::dispatch_until) call drains.
#[derive(Debug, Default)]
pub struct Dispatcher {
    queue:        BTreeMap<EventOrder, Event>,
    next_seq:     u64,
    current_time: SimTime,
    fired:        u64,
}

impl Dispatcher {
    pub fn new(start: SimTime) -> Self {
        Self { current_time: start, ..Self::default() }
    }

    /// Drop every pending event and move the clock to `start`.
    pub fn reset(&mut self, start: SimTime) {
        self.queue.clear();
        self.next_seq = 0;
        self.fired = 0;
        self.current_time = start;
    }

    #[inline]
    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    /// Number of events fired since construction or the last reset.
    pub fn fired_count(&self) -> u64 {
        self.fired
    }

    /// Queue `event`.  Events in the past are rejected; an event at exactly
    /// `current_time` fires later in the same instant.
    pub fn register_event(&mut self, event: Event) -> DispatchResult<()> {
        if event.timestamp < self.current_time {
            return Err(DispatchError::EventInPast {
                timestamp: event.timestamp,
                now:       self.current_time,
            });
        }
        let order = EventOrder {
            timestamp: event.timestamp,
            priority:  event.priority,
            seq:       self.next_seq,
        };
        self.next_seq += 1;
        self.queue.insert(order, event);
        Ok(())
    }

    /// Cancel every pending event of `kind` addressed to `recipient`.
    /// Returns how many were removed.
    pub fn remove_events_for_recipient(&mut self, kind: ActionKind, recipient: Recipient) -> usize {
        self.remove_where(|e| e.action.kind() == kind && e.action.recipient() == recipient)
    }

    /// Cancel every pending event of `kind`, whoever it is addressed to.
    pub fn remove_events_of_kind(&mut self, kind: ActionKind) -> usize {
        self.remove_where(|e| e.action.kind() == kind)
    }

    fn remove_where(&mut self, mut pred: impl FnMut(&Event) -> bool) -> usize {
        let before = self.queue.len();
        self.queue.retain(|_, e| !pred(e));
        before - self.queue.len()
    }

    /// Pending events addressed to `recipient`, in firing order.
    pub fn pending_for(&self, recipient: Recipient) -> impl Iterator<Item = &Event> + '_ {
        self.queue.values().filter(move |e| e.action.recipient() == recipient)
    }

    /// Timestamp of the earliest pending event, or `None` if empty.
    pub fn next_time(&self) -> Option<SimTime> {
        self.queue.keys().next().map(|o| o.timestamp)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remove the earliest event and advance the clock to its timestamp.
    pub fn pop_next(&mut self) -> Option<Event> {
        let (_, event) = self.queue.pop_first()?;
        self.current_time = event.timestamp;
        self.fired += 1;
        Some(event)
    }

    /// Like [`pop_next`](Self::pop_next), but only for events strictly
    /// before `horizon`.
    pub fn pop_next_before(&mut self, horizon: SimTime) -> Option<Event> {
        match self.next_time() {
            Some(t) if t < horizon => self.pop_next(),
            _ => None,
        }
    }

    /// Fire every event before `horizon` through `handler`, in order.
    ///
    /// The handler gets the dispatcher back so it can register or cancel
    /// events.  The first handler error stops the loop and is returned; the
    /// event that failed is not retried.  On success the clock ends at
    /// `horizon` (or stays put if it is already later).  Returns the number of
    /// events fired.
    pub fn dispatch_until<E, F>(&mut self, horizon: SimTime, mut handler: F) -> Result<u64, E>
    where
        F: FnMut(&mut Dispatcher, Event) -> Result<(), E>,
    {
        let mut count = 0;
        while let Some(event) = self.pop_next_before(horizon) {
            trace!("{}: firing {:?}", event.timestamp, event.action);
            handler(self, event)?;
            count += 1;
        }
        if horizon > self.current_time {
            self.current_time = horizon;
        }
        Ok(count)
    }
}
