use super::transaction::Txn;
use crate::frame::StreamId;

use fnv::FnvBuildHasher;
use indexmap::IndexMap;
use slab::Slab;

/// Storage for transactions
///
/// Ids iterate in creation order, which is the order pause and resume
/// notifications are delivered in.
#[derive(Debug)]
pub(super) struct Store {
    slab: Slab<Txn>,
    ids: IndexMap<StreamId, usize, FnvBuildHasher>,
}

impl Store {
    pub fn new() -> Self {
        Store {
            slab: Slab::new(),
            ids: IndexMap::default(),
        }
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.ids.contains_key(&id)
    }

    pub fn get(&self, id: StreamId) -> Option<&Txn> {
        let key = *self.ids.get(&id)?;
        self.slab.get(key)
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut Txn> {
        let key = *self.ids.get(&id)?;
        self.slab.get_mut(key)
    }

    pub fn insert(&mut self, txn: Txn) {
        let id = txn.id;
        assert!(!self.ids.contains_key(&id), "stream {:?} already live", id);
        let key = self.slab.insert(txn);
        self.ids.insert(id, key);
    }

    pub fn remove(&mut self, id: StreamId) -> Option<Txn> {
        // `shift_remove` keeps the remaining ids in creation order
        let key = self.ids.shift_remove(&id)?;
        Some(self.slab.remove(key))
    }

    /// A snapshot of the live ids, so callers may mutate the store while
    /// walking it.
    pub fn ids(&self) -> Vec<StreamId> {
        self.ids.keys().copied().collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Txn> {
        self.slab.iter_mut().map(|(_, txn)| txn)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
