use std::{
    ops::Deref,
    sync::{Arc, Mutex},
};

use ash::vk;
use bytemuck::Pod;

use super::{BoundedPool, GrowthCoalescer, SlotTable, StorageKey};
use crate::{
    allocator::{Allocator, MemoryUsage, SparsePolicy},
    context::{Ctx, QueueSelector},
    error::{ResourceError, StorageError},
    recorder::CommandRecorder,
    resources::{BufDesc, Buffer, DeviceResource},
};

///An object that can be hosted in a [DynamicStorage]. The storage keeps the object's [Descriptor](StoredResource::Descriptor)
/// in its slot and uploads it to the storage buffer whenever it changes.
pub trait StoredResource: Send + Sync + 'static {
    type Descriptor: Pod + Send + Sync;
    fn descriptor(&self) -> Self::Descriptor;
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    ///Debug name, also reported by [StorageError::SlotExhausted].
    pub name: &'static str,
    ///Maximum number of slots. The storage buffer is created with room for all of them, but memory is only bound for
    /// the slots that are in use.
    pub max_slots: usize,
    pub usage: vk::BufferUsageFlags,
    ///Family that initially owns the storage buffer.
    pub queue: QueueSelector,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            name: "dynamic storage",
            max_slots: 4096,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER,
            queue: QueueSelector::Capabilities(vk::QueueFlags::SPARSE_BINDING),
        }
    }
}

//the part of the storage that handles keep alive
struct StorageShared<T> {
    name: &'static str,
    slots: SlotTable<T>,
    growth: GrowthCoalescer,
    //bounded pools objects of this storage were committed to
    pools: Mutex<Vec<Arc<BoundedPool>>>,
}

impl<T: Pod + Send + Sync> StorageShared<T> {
    fn release(&self, key: StorageKey) -> bool {
        for pool in self.pools.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            pool.release(key);
        }
        self.slots.release(key)
    }

    fn link_pool(&self, pool: &Arc<BoundedPool>) {
        let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        if !pools.iter().any(|p| Arc::ptr_eq(p, pool)) {
            pools.push(pool.clone());
        }
    }
}

///Growable arena of typed slots backed by a sparse storage buffer.
///
/// Objects can be allocated and erased concurrently from any thread. Slot `i` lives at byte `i * stride` of the
/// [buffer](DynamicStorage::buffer) for as long as it is claimed. Growth of the buffer and uploads of changed
/// descriptors are deferred to [update](DynamicStorage::update), which has to be called once per frame on the
/// recording thread.
pub struct DynamicStorage<T: Pod + Send + Sync> {
    shared: Arc<StorageShared<T>>,
    buffer: DeviceResource<Buffer>,
}

impl<T: Pod + Send + Sync> DynamicStorage<T> {
    ///Size of one slot in the storage buffer.
    pub const STRIDE: u64 = std::mem::size_of::<T>() as u64;

    pub fn new<A: Allocator + Send + Sync + 'static>(
        ctx: &Ctx<A>,
        config: StorageConfig,
    ) -> Result<Self, ResourceError> {
        let slots = SlotTable::new(config.max_slots);
        let desc = BufDesc::sparse_storage(slots.max_slots() as u64 * Self::STRIDE)
            .add_usage(config.usage);
        let buffer = DeviceResource::new(
            ctx,
            config.queue,
            desc,
            MemoryUsage::GpuOnly,
            &SparsePolicy,
            Some(config.name),
        )?;

        Ok(DynamicStorage {
            shared: Arc::new(StorageShared {
                name: config.name,
                slots,
                growth: GrowthCoalescer::new(),
                pools: Mutex::new(Vec::new()),
            }),
            buffer,
        })
    }

    ///Claims a slot for `resource` and writes its descriptor.
    ///
    /// Fails with [StorageError::SlotExhausted] if all `max_slots` slots are in use.
    pub fn allocate_resource<R: StoredResource<Descriptor = T>>(
        &self,
        resource: R,
    ) -> Result<StorageHandle<R>, StorageError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let shared = &self.shared;
        let Some(key) = shared.slots.claim(|_len| shared.growth.request_growth()) else {
            #[cfg(feature = "logging")]
            log::warn!(
                "{} is full, can not allocate more than {} objects",
                shared.name,
                shared.slots.max_slots()
            );
            return Err(StorageError::SlotExhausted {
                pool: shared.name,
                capacity: shared.slots.max_slots(),
            });
        };

        shared.slots.write(key, resource.descriptor());

        Ok(StorageHandle {
            resource,
            key,
            storage: self.shared.clone(),
        })
    }

    ///Erases the object of `handle`. Erasing a handle twice, or a handle of another storage does nothing and returns false.
    pub fn erase<R: StoredResource<Descriptor = T>>(&self, handle: &StorageHandle<R>) -> bool {
        if !Arc::ptr_eq(&self.shared, &handle.storage) {
            return false;
        }
        handle.release()
    }

    ///Erases the object stored under `key`, including the bounded pool slots it occupies.
    pub fn erase_key(&self, key: StorageKey) -> bool {
        self.shared.release(key)
    }

    pub fn is_live(&self, key: StorageKey) -> bool {
        self.shared.slots.is_claimed(key)
    }

    ///The descriptor currently stored for `key`.
    pub fn descriptor(&self, key: StorageKey) -> Option<T> {
        self.shared.slots.read(key)
    }

    ///Logical size in slots. Slots are never given back, so this is the high-water mark of concurrently used slots.
    pub fn size(&self) -> usize {
        self.shared.slots.len()
    }

    ///Number of live objects.
    pub fn live_count(&self) -> usize {
        self.shared.slots.claimed_count()
    }

    ///Number of slots that are backed by memory after the last update.
    pub fn capacity(&self) -> usize {
        self.shared.growth.capacity() as usize
    }

    pub fn max_slots(&self) -> usize {
        self.shared.slots.max_slots()
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    ///The storage buffer. Slot `i` starts at byte `i * STRIDE`.
    pub fn buffer(&self) -> &DeviceResource<Buffer> {
        &self.buffer
    }

    ///Records the growth of the storage buffer (if the logical size changed since the last update) followed by
    /// uploads of all changed descriptors.
    ///
    /// Must be called once per frame, before any command that reads the buffer, and never concurrently with itself.
    pub fn update(&self, recorder: &mut CommandRecorder) {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        if let Err(_e) = recorder.use_resource(&self.buffer) {
            #[cfg(feature = "logging")]
            log::error!("Updating {} on the wrong queue: {}", self.shared.name, _e);
        }

        let buffer = self.buffer.inner;
        self.shared.growth.record_growth(
            recorder,
            buffer,
            Self::STRIDE,
            self.buffer.desc.size,
            || self.shared.slots.len() as u64,
        );

        //slots that are not backed yet stay dirty until the update that grows the buffer over them.
        self.shared
            .slots
            .drain_dirty(self.capacity(), |index, descriptor| {
                recorder.update_buffer(
                    buffer,
                    index as u64 * Self::STRIDE,
                    bytemuck::bytes_of(descriptor),
                );
            });
    }
}

///Owning handle of an object in a [DynamicStorage]. Dereferences to the object and erases it when dropped.
pub struct StorageHandle<R: StoredResource> {
    resource: R,
    key: StorageKey,
    storage: Arc<StorageShared<R::Descriptor>>,
}

impl<R: StoredResource> StorageHandle<R> {
    pub fn key(&self) -> StorageKey {
        self.key
    }

    ///Index of the object's slot.
    pub fn index(&self) -> u32 {
        self.key.index()
    }

    ///False once the object was erased.
    pub fn is_valid(&self) -> bool {
        self.storage.slots.is_claimed(self.key)
    }

    pub fn get(&self) -> &R {
        &self.resource
    }

    ///Changes the object and schedules its descriptor for upload. Returns false (but still changes the local object)
    /// if the object was already erased.
    pub fn modify(&mut self, f: impl FnOnce(&mut R)) -> bool {
        f(&mut self.resource);
        self.storage.slots.write(self.key, self.resource.descriptor())
    }

    pub(crate) fn link_pool(&self, pool: &Arc<BoundedPool>) {
        self.storage.link_pool(pool);
    }

    fn release(&self) -> bool {
        self.storage.release(self.key)
    }
}

impl<R: StoredResource> Deref for StorageHandle<R> {
    type Target = R;
    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

impl<R: StoredResource> Drop for StorageHandle<R> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<R: StoredResource + std::fmt::Debug> std::fmt::Debug for StorageHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandle")
            .field("key", &self.key)
            .field("resource", &self.resource)
            .finish()
    }
}
