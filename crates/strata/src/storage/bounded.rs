use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use super::{StorageHandle, StorageKey, StoredResource};
use crate::error::StorageError;

const FREE: u64 = 0;
const RESERVED: u64 = u64::MAX;

///Fixed-size sub-pool on top of a [DynamicStorage](super::DynamicStorage). Each pool slot holds the key of the arena
/// object that occupies it, for instance the shadow cascade slots of directional lights.
///
/// A slot goes `free -> reserved -> key` when claimed, and `key -> free` when released. All transitions are
/// compare-and-swaps, and the key comparison includes the object's generation.
#[derive(Debug)]
pub struct BoundedPool {
    name: &'static str,
    slots: Box<[AtomicU64]>,
}

impl BoundedPool {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        BoundedPool {
            name,
            slots: (0..capacity).map(|_| AtomicU64::new(FREE)).collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    ///Number of reserved or occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.load(Ordering::Acquire) != FREE)
            .count()
    }

    ///Reserves a free slot. The reservation is given back if it is dropped without being committed.
    ///
    /// Fails with [StorageError::SlotExhausted] if all slots are taken.
    pub fn reserve(self: &Arc<Self>) -> Result<PoolReservation, StorageError> {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot
                .compare_exchange(FREE, RESERVED, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(PoolReservation {
                    pool: self.clone(),
                    index,
                    committed: false,
                });
            }
        }

        #[cfg(feature = "logging")]
        log::warn!(
            "Can not claim slot in {}, all {} slots are taken",
            self.name,
            self.capacity()
        );

        Err(StorageError::SlotExhausted {
            pool: self.name,
            capacity: self.capacity(),
        })
    }

    ///Frees the slot occupied by `key`. Returns the freed slot, or `None` if `key` occupies no slot.
    pub fn release(&self, key: StorageKey) -> Option<usize> {
        let bits = key.to_bits();
        self.slots.iter().position(|slot| {
            slot.compare_exchange(bits, FREE, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        })
    }

    ///The slot occupied by `key`, if any.
    pub fn slot_of(&self, key: StorageKey) -> Option<usize> {
        let bits = key.to_bits();
        self.slots
            .iter()
            .position(|slot| slot.load(Ordering::Acquire) == bits)
    }

    ///All committed slots and the key that occupies them.
    pub fn occupants(&self) -> impl Iterator<Item = (usize, StorageKey)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            match slot.load(Ordering::Acquire) {
                FREE | RESERVED => None,
                bits => StorageKey::from_bits(bits).map(|key| (index, key)),
            }
        })
    }
}

///A reserved slot of a [BoundedPool].
#[must_use = "dropping a reservation frees the slot again"]
#[derive(Debug)]
pub struct PoolReservation {
    pool: Arc<BoundedPool>,
    index: usize,
    committed: bool,
}

impl PoolReservation {
    pub fn index(&self) -> usize {
        self.index
    }

    ///Moves the reservation to `handle`. The slot is released again when the handle is erased or dropped.
    pub fn commit<R: StoredResource>(mut self, handle: &mut StorageHandle<R>) -> usize {
        self.pool.slots[self.index].store(handle.key().to_bits(), Ordering::Release);
        handle.link_pool(&self.pool);
        self.committed = true;
        self.index
    }
}

impl Drop for PoolReservation {
    fn drop(&mut self) {
        if !self.committed {
            self.pool.slots[self.index].store(FREE, Ordering::Release);
        }
    }
}
