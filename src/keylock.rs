//! KeyLock Module
//!
//! Synchronization primitive for the store: per-key mutual exclusion plus a
//! global barrier that excludes all keys at once. Pure concurrency, no I/O.
//!
//! ## Responsibilities
//! - Serialize operations against the same key across threads (FIFO)
//! - Let operations on distinct keys run fully in parallel
//! - Provide a store-wide barrier for enumeration and destruction
//!
//! ## Fairness
//! Each key has a ticket pair (`next_ticket`, `now_serving`). Acquisition
//! takes a ticket and waits until served, so admission per key is strictly
//! first-in-first-out and writers cannot starve readers or vice versa.
//!
//! ## Limits
//! No timeouts, no cancellation: a stuck holder blocks that key forever.
//! Recursive acquisition of the same key by the same thread deadlocks.

use std::collections::HashMap;

use parking_lot::{Condvar, Mutex};

use crate::error::{FolioError, Result};

/// Per-key FIFO exclusion with a global barrier
///
/// ## Concurrency:
/// - One mutex guards the whole lock table; it is held only for bookkeeping,
///   never across a key's critical section
/// - One condvar wakes waiters on any state change (ticket served, barrier
///   cleared); waiters re-check their own condition
pub struct KeyLock {
    state: Mutex<LockTable>,
    cond: Condvar,
}

#[derive(Default)]
struct LockTable {
    /// One slot per key ever seen. Slots are never removed; the map only
    /// grows with the set of keys the store has touched.
    slots: HashMap<String, Slot>,

    /// Set while a global barrier is held; new per-key acquisitions park
    /// before taking a ticket.
    barrier_held: bool,
}

#[derive(Default)]
struct Slot {
    /// Next ticket to hand out
    next_ticket: u64,
    /// Ticket currently admitted to the critical section
    now_serving: u64,
}

impl Slot {
    /// A slot is idle when every handed-out ticket has been released
    fn idle(&self) -> bool {
        self.now_serving == self.next_ticket
    }
}

impl KeyLock {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockTable::default()),
            cond: Condvar::new(),
        }
    }

    /// Acquire exclusive access to `key`, blocking until granted.
    ///
    /// Blocks first while a global barrier is held, then queues FIFO behind
    /// earlier acquirers of the same key. Must be paired with a later
    /// [`release`](Self::release) on the same key by the same thread.
    pub fn acquire(&self, key: &str) {
        let mut state = self.state.lock();

        // Park until no store-wide barrier is pending; the barrier flag is
        // checked before ticketing so barrier holders never wait on threads
        // admitted after them.
        while state.barrier_held {
            self.cond.wait(&mut state);
        }

        let ticket = {
            let slot = state.slots.entry(key.to_string()).or_default();
            let ticket = slot.next_ticket;
            slot.next_ticket += 1;
            ticket
        };

        while state.slots[key].now_serving != ticket {
            self.cond.wait(&mut state);
        }
    }

    /// Release exclusive access to `key`.
    ///
    /// Calling this without a matching prior [`acquire`](Self::acquire)
    /// returns [`FolioError::ProtocolViolation`] — a bug in the caller, not
    /// a condition to recover from.
    pub fn release(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();

        let slot = state.slots.get_mut(key).ok_or_else(|| {
            FolioError::ProtocolViolation(format!("release of never-acquired key {key:?}"))
        })?;
        if slot.idle() {
            return Err(FolioError::ProtocolViolation(format!(
                "release without matching acquire for key {key:?}"
            )));
        }

        slot.now_serving += 1;
        self.cond.notify_all();
        Ok(())
    }

    /// Acquire the global barrier.
    ///
    /// Sets the barrier flag so no new per-key acquisition is admitted, then
    /// acquires every currently-known key slot one by one, waiting out any
    /// in-flight per-key operation. Returns only once no per-key operation
    /// is running. Only one barrier holder at a time.
    pub fn acquire_global(&self) {
        let mut state = self.state.lock();

        while state.barrier_held {
            self.cond.wait(&mut state);
        }
        state.barrier_held = true;

        // No slot can be added while the flag is set, so this snapshot is
        // exhaustive for the whole barrier window.
        let keys: Vec<String> = state.slots.keys().cloned().collect();
        for key in keys {
            let ticket = {
                // Slots are never removed, but avoid indexing panics anyway.
                let Some(slot) = state.slots.get_mut(&key) else {
                    continue;
                };
                let ticket = slot.next_ticket;
                slot.next_ticket += 1;
                ticket
            };

            while state.slots[key.as_str()].now_serving != ticket {
                self.cond.wait(&mut state);
            }
        }
    }

    /// Release the global barrier: release every key slot acquired by
    /// [`acquire_global`](Self::acquire_global), then clear the flag.
    pub fn release_global(&self) -> Result<()> {
        let mut state = self.state.lock();

        if !state.barrier_held {
            return Err(FolioError::ProtocolViolation(
                "release_global without matching acquire_global".to_string(),
            ));
        }

        for slot in state.slots.values_mut() {
            slot.now_serving += 1;
        }
        state.barrier_held = false;
        self.cond.notify_all();
        Ok(())
    }
}

impl Default for KeyLock {
    fn default() -> Self {
        Self::new()
    }
}
