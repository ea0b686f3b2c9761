use std::sync::{
    Mutex, MutexGuard, OnceLock,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use bytemuck::Pod;

///Identifies one claim of a slot. The generation is bumped whenever the slot is released, so a key of an erased object
/// never matches the slot again, even if the slot was reused in the meantime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    index: u32,
    generation: u32,
}

impl StorageKey {
    pub fn new(index: u32, generation: u32) -> Self {
        StorageKey { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    ///Packs the key into a non-zero u64. Never returns `u64::MAX` for keys of a [SlotTable].
    pub fn to_bits(&self) -> u64 {
        ((self.index as u64 + 1) << 32) | self.generation as u64
    }

    pub fn from_bits(bits: u64) -> Option<Self> {
        let index = (bits >> 32).checked_sub(1)?;
        Some(StorageKey {
            index: index as u32,
            generation: bits as u32,
        })
    }

    //state word of the slot while it is claimed by this key
    fn claimed_state(&self) -> u64 {
        ((self.generation as u64) << 1) | CLAIMED
    }
}

const CLAIMED: u64 = 1;
//size of the first chunk, every following chunk doubles in size.
const BASE_CHUNK: usize = 16;
const MAX_CHUNKS: usize = 26;

struct Payload<T> {
    value: T,
    dirty: bool,
}

struct Slot<T> {
    //generation << 1 | claimed
    state: AtomicU64,
    payload: Mutex<Payload<T>>,
}

impl<T: Pod> Slot<T> {
    fn new() -> Self {
        Slot {
            state: AtomicU64::new(0),
            payload: Mutex::new(Payload {
                value: T::zeroed(),
                dirty: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Payload<T>> {
        //payloads are plain data, a panic while holding the lock can't leave them in a broken state.
        self.payload.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_claim(&self, index: u32) -> Option<StorageKey> {
        let state = self.state.load(Ordering::Acquire);
        if state & CLAIMED != 0 {
            return None;
        }
        self.state
            .compare_exchange(state, state | CLAIMED, Ordering::AcqRel, Ordering::Relaxed)
            .ok()
            .map(|_| StorageKey::new(index, (state >> 1) as u32))
    }
}

///Append-only table of slots. Slots live in chunks of growing size that are never moved or freed, so a slot index stays
/// valid (and its memory stable) for the lifetime of the table, and appending never invalidates concurrent readers.
///
/// Claiming and releasing a slot is a single compare-and-swap on the slot's state word. The payload of each slot is
/// guarded by its own lock, which is only ever contended by a release racing a write to the same slot.
pub struct SlotTable<T> {
    chunks: [OnceLock<Box<[Slot<T>]>>; MAX_CHUNKS],
    len: AtomicUsize,
    max_slots: usize,
}

impl<T: Pod> SlotTable<T> {
    ///Maximum number of slots any table can hold.
    pub const MAX_SLOTS: usize = BASE_CHUNK * ((1 << MAX_CHUNKS) - 1);

    ///Creates an empty table that can grow up to `max_slots` slots (clamped to [MAX_SLOTS](Self::MAX_SLOTS)).
    pub fn new(max_slots: usize) -> Self {
        SlotTable {
            chunks: std::array::from_fn(|_| OnceLock::new()),
            len: AtomicUsize::new(0),
            max_slots: max_slots.min(Self::MAX_SLOTS),
        }
    }

    ///Number of slots that were ever appended. This is the high-water mark of the table.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    //chunk index and offset within the chunk
    fn locate(index: usize) -> (usize, usize) {
        let n = index / BASE_CHUNK + 1;
        let chunk = (usize::BITS - 1 - n.leading_zeros()) as usize;
        let start = BASE_CHUNK * ((1 << chunk) - 1);
        (chunk, index - start)
    }

    fn slot(&self, index: usize) -> &Slot<T> {
        let (chunk, offset) = Self::locate(index);
        let chunk = self.chunks[chunk].get_or_init(|| {
            (0..(BASE_CHUNK << chunk))
                .map(|_| Slot::new())
                .collect()
        });
        &chunk[offset]
    }

    //reserves a new slot index at the end of the table
    fn reserve(&self) -> Option<usize> {
        let mut len = self.len.load(Ordering::Acquire);
        loop {
            if len >= self.max_slots {
                return None;
            }
            match self
                .len
                .compare_exchange_weak(len, len + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(len),
                Err(current) => len = current,
            }
        }
    }

    ///Claims a free slot. Existing slots are scanned first, if none is free a new one is appended. `on_grow` is called with
    /// the new length whenever this call appended a slot.
    ///
    /// Returns `None` if the table is full.
    pub fn claim(&self, mut on_grow: impl FnMut(usize)) -> Option<StorageKey> {
        loop {
            let len = self.len();
            for index in 0..len {
                if let Some(key) = self.slot(index).try_claim(index as u32) {
                    return Some(key);
                }
            }

            let index = self.reserve()?;
            on_grow(index + 1);
            if let Some(key) = self.slot(index).try_claim(index as u32) {
                return Some(key);
            }
            //a concurrent scan took the freshly appended slot, start over.
        }
    }

    ///Releases the slot claimed by `key` and resets its payload. Returns false if `key` does not own the slot (anymore).
    pub fn release(&self, key: StorageKey) -> bool {
        if key.index as usize >= self.len() {
            return false;
        }
        let slot = self.slot(key.index as usize);
        //hold the payload lock, so that a new claimer can only write after the reset.
        let mut payload = slot.lock();
        let released = slot
            .state
            .compare_exchange(
                key.claimed_state(),
                (key.generation.wrapping_add(1) as u64) << 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok();
        if released {
            payload.value = T::zeroed();
            payload.dirty = true;
        }
        released
    }

    ///True if `key` currently owns its slot.
    pub fn is_claimed(&self, key: StorageKey) -> bool {
        (key.index as usize) < self.len()
            && self.slot(key.index as usize).state.load(Ordering::Acquire) == key.claimed_state()
    }

    ///Writes `value` into the slot of `key` and marks it for upload. Does nothing (and returns false) if `key` does not own
    /// the slot.
    pub fn write(&self, key: StorageKey, value: T) -> bool {
        if key.index as usize >= self.len() {
            return false;
        }
        let slot = self.slot(key.index as usize);
        let mut payload = slot.lock();
        //a release needs the lock, so the state can't change while we hold it
        if slot.state.load(Ordering::Acquire) != key.claimed_state() {
            return false;
        }
        payload.value = value;
        payload.dirty = true;
        true
    }

    pub fn read(&self, key: StorageKey) -> Option<T> {
        if key.index as usize >= self.len() {
            return None;
        }
        let slot = self.slot(key.index as usize);
        let payload = slot.lock();
        (slot.state.load(Ordering::Acquire) == key.claimed_state()).then_some(payload.value)
    }

    ///Number of currently claimed slots.
    pub fn claimed_count(&self) -> usize {
        (0..self.len())
            .filter(|idx| self.slot(*idx).state.load(Ordering::Acquire) & CLAIMED != 0)
            .count()
    }

    ///Calls `f` for every slot below `len` whose payload changed since the last call, and clears its dirty flag.
    pub fn drain_dirty(&self, len: usize, mut f: impl FnMut(usize, &T)) {
        for index in 0..len.min(self.len()) {
            let mut payload = self.slot(index).lock();
            if payload.dirty {
                payload.dirty = false;
                f(index, &payload.value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(SlotTable<[f32; 4]>: Send, Sync);
    }

    #[test]
    fn chunk_layout() {
        type T = SlotTable<u32>;
        assert_eq!(T::locate(0), (0, 0));
        assert_eq!(T::locate(15), (0, 15));
        assert_eq!(T::locate(16), (1, 0));
        assert_eq!(T::locate(47), (1, 31));
        assert_eq!(T::locate(48), (2, 0));
    }

    #[test]
    fn key_bits() {
        let key = StorageKey::new(0, 0);
        assert_ne!(key.to_bits(), 0);
        assert_eq!(StorageKey::from_bits(key.to_bits()), Some(key));
        let key = StorageKey::new(77, u32::MAX);
        assert_eq!(StorageKey::from_bits(key.to_bits()), Some(key));
        assert_eq!(StorageKey::from_bits(0), None);
    }

    #[test]
    fn claim_release_reuse() {
        let table = SlotTable::<u32>::new(64);
        let mut grown = Vec::new();
        let a = table.claim(|len| grown.push(len)).unwrap();
        let b = table.claim(|len| grown.push(len)).unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));
        assert_eq!(grown, vec![1, 2]);

        assert!(table.release(a));
        assert!(!table.is_claimed(a));
        //released slots are found by the scan, no growth
        let c = table.claim(|len| grown.push(len)).unwrap();
        assert_eq!(c.index(), 0);
        assert_ne!(c.generation(), a.generation());
        assert_eq!(grown.len(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn stale_keys_do_nothing() {
        let table = SlotTable::<u32>::new(4);
        let a = table.claim(|_| {}).unwrap();
        assert!(table.write(a, 7));
        assert!(table.release(a));
        assert!(!table.release(a));

        let b = table.claim(|_| {}).unwrap();
        assert!(table.write(b, 9));
        //the old key neither frees nor overwrites the new claim
        assert!(!table.release(a));
        assert!(!table.write(a, 1));
        assert_eq!(table.read(b), Some(9));
        assert_eq!(table.read(a), None);
        assert!(!table.release(StorageKey::new(3, 0)));
    }

    #[test]
    fn full_table() {
        let table = SlotTable::<u32>::new(2);
        table.claim(|_| {}).unwrap();
        table.claim(|_| {}).unwrap();
        assert!(table.claim(|_| {}).is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn dirty_payloads() {
        let table = SlotTable::<u32>::new(8);
        let a = table.claim(|_| {}).unwrap();
        let b = table.claim(|_| {}).unwrap();
        table.write(a, 1);
        table.write(b, 2);

        let mut seen = Vec::new();
        table.drain_dirty(table.len(), |idx, v| seen.push((idx, *v)));
        assert_eq!(seen, vec![(0, 1), (1, 2)]);

        seen.clear();
        table.drain_dirty(table.len(), |idx, v| seen.push((idx, *v)));
        assert!(seen.is_empty());

        //releasing resets to zero and needs an upload
        table.release(b);
        table.drain_dirty(table.len(), |idx, v| seen.push((idx, *v)));
        assert_eq!(seen, vec![(1, 0)]);
    }

    #[test]
    fn concurrent_claims_are_unique() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 200;
        let table = Arc::new(SlotTable::<u64>::new(2 * THREADS * PER_THREAD));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let table = table.clone();
                std::thread::spawn(move || {
                    let mut keys = Vec::with_capacity(PER_THREAD);
                    for i in 0..PER_THREAD {
                        let key = table.claim(|_| {}).unwrap();
                        //churn a bit, so that scans and appends race
                        if i % 3 == 0 {
                            assert!(table.release(key));
                            keys.push(table.claim(|_| {}).unwrap());
                        } else {
                            keys.push(key);
                        }
                    }
                    keys
                })
            })
            .collect();

        let mut indices = HashSet::new();
        for handle in handles {
            for key in handle.join().unwrap() {
                assert!(indices.insert(key.index()), "slot {} claimed twice", key.index());
            }
        }
        assert_eq!(indices.len(), THREADS * PER_THREAD);
        assert_eq!(table.claimed_count(), THREADS * PER_THREAD);
    }
}
