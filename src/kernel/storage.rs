//! Journaled contract storage.
//!
//! Every write records the slot's previous value. An execution frame takes a
//! checkpoint (journal length) when it starts; aborting the frame replays the
//! journal back to that checkpoint. A committed top-level execution drops
//! the journal and keeps the writes.

use std::collections::BTreeMap;

use super::exec::ContractId;

/// (contract, key)
pub type Slot = (ContractId, u64);

#[derive(Clone, Debug, PartialEq, Eq)]
struct JournalEntry {
    slot: Slot,
    previous: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct Storage {
    slots: BTreeMap<Slot, u64>,
    journal: Vec<JournalEntry>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a slot, `None` if never written.
    pub fn load(&self, contract: ContractId, key: u64) -> Option<u64> {
        self.slots.get(&(contract, key)).copied()
    }

    /// Write a slot, journaling its previous value.
    pub fn store(&mut self, contract: ContractId, key: u64, value: u64) {
        let previous = self.slots.insert((contract, key), value);
        self.journal.push(JournalEntry {
            slot: (contract, key),
            previous,
        });
    }

    /// Write a slot outside any execution. Not journaled.
    pub fn seed(&mut self, contract: ContractId, key: u64, value: u64) {
        self.slots.insert((contract, key), value);
    }

    pub fn checkpoint(&self) -> usize {
        self.journal.len()
    }

    /// Undo every write made after `checkpoint`, newest first.
    pub fn rollback(&mut self, checkpoint: usize) {
        while self.journal.len() > checkpoint {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry.previous {
                Some(value) => self.slots.insert(entry.slot, value),
                None => self.slots.remove(&entry.slot),
            };
        }
    }

    /// Make all journaled writes permanent.
    pub fn commit(&mut self) {
        self.journal.clear();
    }

    /// Number of journaled (uncommitted) writes.
    pub fn pending(&self) -> usize {
        self.journal.len()
    }

    /// Slots of one contract in key order.
    pub fn slots(&self, contract: ContractId) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.slots
            .range((contract, 0)..=(contract, u64::MAX))
            .map(|(&(_, key), &value)| (key, value))
    }
}
