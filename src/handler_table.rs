/*
 * An append-only table mapping an event identifier to a handler closure.
 *
 * Index 0 holds a sentinel. `find` writes the probed key into the sentinel and
 * scans from the newest entry backward, so the scan always terminates and the
 * most recently registered handler for a key shadows older ones without
 * removing them. Tables stay small (tens of ids per window), which keeps the
 * linear scan cheaper than hashing in practice.
 */
use std::cell::Cell;
use std::fmt;

use crate::error::HandlerResult;
use crate::types::EventArgs;

/// A registered handler body.
pub type Handler = dyn Fn(EventArgs) -> HandlerResult;

enum Slot {
    Sentinel,
    Owned(Box<Handler>),
    // Index of an earlier `Owned` entry whose closure this id shares.
    Forward(usize),
}

struct Entry<K> {
    key: Cell<K>,
    slot: Slot,
}

pub struct HandlerTable<K> {
    entries: Vec<Entry<K>>,
}

impl<K: Copy + Eq + Default> HandlerTable<K> {
    pub fn new() -> Self {
        Self {
            entries: vec![Entry {
                key: Cell::new(K::default()),
                slot: Slot::Sentinel,
            }],
        }
    }

    pub fn reserve(&mut self, additional: usize) {
        self.entries.reserve(additional);
    }

    pub fn register<F>(&mut self, id: K, handler: F)
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        self.entries.push(Entry {
            key: Cell::new(id),
            slot: Slot::Owned(Box::new(handler)),
        });
    }

    /*
     * Registers one closure under several ids. The body is stored once under
     * the first id; every later id gets a forwarding entry pointing at it, so
     * each id still follows the newest-wins rule independently.
     */
    pub fn register_many<F>(&mut self, ids: &[K], handler: F)
    where
        F: Fn(EventArgs) -> HandlerResult + 'static,
    {
        let Some((&first, rest)) = ids.split_first() else {
            return;
        };
        let owner = self.entries.len();
        self.entries.reserve(ids.len());
        self.register(first, handler);
        for &id in rest.iter().filter(|&&id| id != first) {
            self.entries.push(Entry {
                key: Cell::new(id),
                slot: Slot::Forward(owner),
            });
        }
    }

    pub fn find(&self, id: K) -> Option<&Handler> {
        self.entries[0].key.set(id);
        let mut index = self.entries.len() - 1;
        while self.entries[index].key.get() != id {
            index -= 1;
        }
        self.resolve(index)
    }

    fn resolve(&self, index: usize) -> Option<&Handler> {
        match &self.entries[index].slot {
            Slot::Sentinel => None,
            Slot::Owned(handler) => Some(handler.as_ref()),
            Slot::Forward(owner) => self.resolve(*owner),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    /// Number of entries, forwarding entries included.
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    #[cfg(test)]
    fn owned_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.slot, Slot::Owned(_)))
            .count()
    }
}

impl<K: Copy + Eq + Default> Default for HandlerTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for HandlerTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("entries", &(self.entries.len() - 1))
            .finish()
    }
}
