// src/engine/slot.rs

//! Event slots.
//!
//! [`SlotTable`] is shared between callers pushing events and the
//! controller; a slot is claimed with a compare-exchange in the caller's
//! thread and released by the controller once its event finished.
//! [`EventSlot`] is the controller-private record of what happens inside a
//! slot.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::dag::ControlFlowState;
use crate::engine::EventContext;

#[derive(Debug, Clone)]
pub struct EventSlot {
    /// `None` while the slot is free.
    pub ctx: Option<EventContext>,
    pub control_flow: ControlFlowState,
    /// Algorithms of this slot currently SCHEDULED.
    pub in_flight: usize,
    /// An algorithm failed or the event was aborted.
    pub failed: bool,
    pub aborted: bool,
}

impl EventSlot {
    pub fn new(control_flow: ControlFlowState) -> Self {
        Self {
            ctx: None,
            control_flow,
            in_flight: 0,
            failed: false,
            aborted: false,
        }
    }

    /// Take a new event; forgets everything about the previous one.
    pub fn assign(&mut self, ctx: EventContext) {
        self.ctx = Some(ctx);
        self.control_flow.reset();
        self.in_flight = 0;
        self.failed = false;
        self.aborted = false;
    }

    pub fn release(&mut self) {
        self.ctx = None;
    }

    pub fn is_occupied(&self) -> bool {
        self.ctx.is_some()
    }

    /// No more algorithms may be dispatched for this event.
    pub fn is_closed(&self) -> bool {
        self.failed || self.aborted
    }
}

/// Lock-free record of which slots are taken.
#[derive(Debug)]
pub struct SlotTable {
    claimed: Vec<AtomicBool>,
    free: AtomicUsize,
}

impl SlotTable {
    pub fn new(slots: usize) -> Self {
        Self {
            claimed: (0..slots).map(|_| AtomicBool::new(false)).collect(),
            free: AtomicUsize::new(slots),
        }
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    /// Claim the first free slot, if any.
    pub fn try_claim(&self) -> Option<usize> {
        for (slot, flag) in self.claimed.iter().enumerate() {
            if flag
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.free.fetch_sub(1, Ordering::AcqRel);
                return Some(slot);
            }
        }
        None
    }

    /// Give a slot back. Releasing a free slot is a no-op.
    pub fn release(&self, slot: usize) {
        if let Some(flag) = self.claimed.get(slot) {
            if flag
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.free.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    pub fn is_claimed(&self, slot: usize) -> bool {
        self.claimed
            .get(slot)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub fn free_slots(&self) -> usize {
        self.free.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn claims_until_full_then_recycles() {
        let table = SlotTable::new(2);
        assert_eq!(table.try_claim(), Some(0));
        assert_eq!(table.try_claim(), Some(1));
        assert_eq!(table.try_claim(), None);
        assert_eq!(table.free_slots(), 0);

        table.release(0);
        table.release(0);
        assert_eq!(table.free_slots(), 1);
        assert_eq!(table.try_claim(), Some(0));
    }

    #[test]
    fn concurrent_claims_never_share_a_slot() {
        let table = Arc::new(SlotTable::new(8));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || table.try_claim())
            })
            .collect();

        let claimed: Vec<usize> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<usize> = claimed.iter().copied().collect();

        assert_eq!(claimed.len(), 8);
        assert_eq!(unique.len(), 8);
        assert_eq!(table.free_slots(), 0);
    }
}
