use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use ahash::AHashMap;
use ash::vk::{self, Handle};

use super::{Queue, RawDevice};
use crate::{
    allocator::{HeadlessAllocator, ResourceKind},
    error::DeviceError,
    resources::{BufDesc, ImgDesc},
};

///Configuration of a [HeadlessDevice] and the [HeadlessAllocator] that goes with it.
#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    ///Bytes the allocator can hand out in total.
    pub memory_budget: u64,
    ///Maximum number of live device objects. Creating more fails with [DeviceError::TooManyObjects].
    pub max_objects: usize,
    ///Size of a shared memory block.
    pub shared_block_size: u64,
    ///Page size sparse resources are bound with.
    pub sparse_page_size: u64,
    ///Capabilities of the queue families, family index is the position in this list.
    pub queue_families: Vec<vk::QueueFlags>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        HeadlessConfig {
            memory_budget: 256 * 1024 * 1024,
            max_objects: 4096,
            shared_block_size: HeadlessAllocator::DEFAULT_BLOCK_SIZE,
            sparse_page_size: 64 * 1024,
            queue_families: vec![
                vk::QueueFlags::GRAPHICS
                    | vk::QueueFlags::COMPUTE
                    | vk::QueueFlags::TRANSFER
                    | vk::QueueFlags::SPARSE_BINDING,
                vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                vk::QueueFlags::TRANSFER,
            ],
        }
    }
}

#[derive(Debug)]
struct ObjectRecord {
    kind: ResourceKind,
    requirements: vk::MemoryRequirements,
    bound: Option<(vk::DeviceMemory, u64)>,
}

///Software device without any GPU behind it. Hands out monotonic, non-zero object ids, enforces an object budget
/// and keeps track of which objects are alive and bound.
pub struct HeadlessDevice {
    config: HeadlessConfig,
    queues: Vec<Queue>,
    next_id: AtomicU64,
    objects: Mutex<AHashMap<u64, ObjectRecord>>,
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl HeadlessDevice {
    const BUFFER_ALIGNMENT: u64 = 256;
    const IMAGE_ALIGNMENT: u64 = 1024;

    pub fn new(config: HeadlessConfig) -> Self {
        let queues = config
            .queue_families
            .iter()
            .enumerate()
            .map(|(idx, flags)| Queue {
                inner: vk::Queue::from_raw(idx as u64 + 1),
                family_index: idx as u32,
                properties: vk::QueueFamilyProperties {
                    queue_flags: *flags,
                    queue_count: 1,
                    ..Default::default()
                },
            })
            .collect();

        HeadlessDevice {
            config,
            queues,
            next_id: AtomicU64::new(1),
            objects: Mutex::new(AHashMap::default()),
            created: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &HeadlessConfig {
        &self.config
    }

    pub fn live_objects(&self) -> usize {
        self.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn created_objects(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn destroyed_objects(&self) -> usize {
        self.destroyed.load(Ordering::Relaxed)
    }

    ///True if the object with the raw id `raw` is alive and bound to memory.
    pub fn is_bound(&self, raw: u64) -> bool {
        self.lock()
            .ok()
            .and_then(|objects| objects.get(&raw).map(|o| o.bound.is_some()))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, AHashMap<u64, ObjectRecord>>, DeviceError> {
        self.objects.lock().map_err(|_| {
            #[cfg(feature = "logging")]
            log::error!("Headless device object table is poisoned");
            DeviceError::VkError(vk::Result::ERROR_DEVICE_LOST)
        })
    }

    fn create(
        &self,
        kind: ResourceKind,
        requirements: vk::MemoryRequirements,
    ) -> Result<u64, DeviceError> {
        let mut objects = self.lock()?;
        if objects.len() >= self.config.max_objects {
            #[cfg(feature = "logging")]
            log::warn!(
                "Headless device object budget of {} exhausted",
                self.config.max_objects
            );
            return Err(DeviceError::TooManyObjects(objects.len()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        objects.insert(
            id,
            ObjectRecord {
                kind,
                requirements,
                bound: None,
            },
        );
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    fn destroy(&self, kind: ResourceKind, raw: u64) {
        let Ok(mut objects) = self.lock() else {
            return;
        };
        match objects.get(&raw) {
            Some(record) if record.kind == kind => {
                objects.remove(&raw);
                self.destroyed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                #[cfg(feature = "logging")]
                log::error!("Destroying unknown {:?} {:#x}", kind, raw);
            }
        }
    }

    fn requirements(&self, raw: u64) -> vk::MemoryRequirements {
        self.lock()
            .ok()
            .and_then(|objects| objects.get(&raw).map(|o| o.requirements))
            .unwrap_or_default()
    }

    fn bind(&self, raw: u64, memory: vk::DeviceMemory, offset: u64) -> Result<(), DeviceError> {
        let mut objects = self.lock()?;
        let record = objects
            .get_mut(&raw)
            .ok_or(DeviceError::UnknownObject(raw))?;
        if record.bound.is_some() {
            return Err(DeviceError::AlreadyBound(raw));
        }
        record.bound = Some((memory, offset));
        Ok(())
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

impl RawDevice for HeadlessDevice {
    fn queues(&self) -> &[Queue] {
        &self.queues
    }

    fn create_buffer(&self, desc: &BufDesc) -> Result<vk::Buffer, DeviceError> {
        if desc.size == 0 {
            return Err(DeviceError::VkError(vk::Result::ERROR_INITIALIZATION_FAILED));
        }
        let alignment = if desc.is_sparse() {
            self.config.sparse_page_size
        } else {
            Self::BUFFER_ALIGNMENT
        };
        let requirements = vk::MemoryRequirements {
            size: align_up(desc.size, alignment),
            alignment,
            memory_type_bits: 1,
        };
        self.create(ResourceKind::Buffer, requirements)
            .map(vk::Buffer::from_raw)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.destroy(ResourceKind::Buffer, buffer.as_raw())
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        self.requirements(buffer.as_raw())
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> Result<(), DeviceError> {
        self.bind(buffer.as_raw(), memory, offset)
    }

    fn create_image(&self, desc: &ImgDesc) -> Result<vk::Image, DeviceError> {
        let extent = desc.img_type.valid_extent(desc.extent);
        //NOTE: assumes 4 bytes per texel, which is good enough for budget checks.
        let texels = extent.width as u64
            * extent.height as u64
            * extent.depth as u64
            * desc.img_type.layer_count() as u64;
        if texels == 0 {
            return Err(DeviceError::VkError(vk::Result::ERROR_INITIALIZATION_FAILED));
        }
        let requirements = vk::MemoryRequirements {
            size: align_up(texels * 4, Self::IMAGE_ALIGNMENT),
            alignment: Self::IMAGE_ALIGNMENT,
            memory_type_bits: 1,
        };
        self.create(ResourceKind::Image, requirements)
            .map(vk::Image::from_raw)
    }

    fn destroy_image(&self, image: vk::Image) {
        self.destroy(ResourceKind::Image, image.as_raw())
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        self.requirements(image.as_raw())
    }

    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> Result<(), DeviceError> {
        self.bind(image.as_raw(), memory, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueueSelector;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(HeadlessDevice: Send, Sync);
    }

    #[test]
    fn ids_are_non_zero_and_unique() {
        let device = HeadlessDevice::new(HeadlessConfig::default());
        let a = device.create_buffer(&BufDesc::storage(16)).unwrap();
        let b = device.create_buffer(&BufDesc::storage(16)).unwrap();
        assert_ne!(a.as_raw(), 0);
        assert_ne!(a, b);
        assert_eq!(device.live_objects(), 2);

        device.destroy_buffer(a);
        let c = device.create_buffer(&BufDesc::storage(16)).unwrap();
        //ids are never reused
        assert_ne!(a, c);
        assert_eq!(device.created_objects(), 3);
        assert_eq!(device.destroyed_objects(), 1);
    }

    #[test]
    fn object_budget() {
        let device = HeadlessDevice::new(HeadlessConfig {
            max_objects: 2,
            ..Default::default()
        });
        device.create_buffer(&BufDesc::storage(16)).unwrap();
        device
            .create_image(&ImgDesc::image_2d(
                4,
                4,
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
            ))
            .unwrap();
        let err = device.create_buffer(&BufDesc::storage(16)).unwrap_err();
        assert!(matches!(err, DeviceError::TooManyObjects(2)));
        assert!(err.is_exhausted());
    }

    #[test]
    fn requirements_and_binding() {
        let device = HeadlessDevice::new(HeadlessConfig::default());
        let buffer = device.create_buffer(&BufDesc::storage(300)).unwrap();
        let req = device.buffer_memory_requirements(buffer);
        assert_eq!(req.size, 512);
        assert_eq!(req.alignment, 256);

        let sparse = device
            .create_buffer(&BufDesc::sparse_storage(1000))
            .unwrap();
        assert_eq!(device.buffer_memory_requirements(sparse).size, 64 * 1024);

        let memory = vk::DeviceMemory::from_raw(7);
        assert!(!device.is_bound(buffer.as_raw()));
        device.bind_buffer_memory(buffer, memory, 0).unwrap();
        assert!(device.is_bound(buffer.as_raw()));
        assert!(matches!(
            device.bind_buffer_memory(buffer, memory, 0),
            Err(DeviceError::AlreadyBound(_))
        ));
        assert!(matches!(
            device.bind_buffer_memory(vk::Buffer::from_raw(999), memory, 0),
            Err(DeviceError::UnknownObject(999))
        ));
    }

    #[test]
    fn image_size_from_extent() {
        let device = HeadlessDevice::new(HeadlessConfig::default());
        let image = device
            .create_image(&ImgDesc::image_2d(
                16,
                16,
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
            ))
            .unwrap();
        assert_eq!(device.image_memory_requirements(image).size, 16 * 16 * 4);
        //destroying with the wrong kind is ignored
        device.destroy_buffer(vk::Buffer::from_raw(image.as_raw()));
        assert_eq!(device.live_objects(), 1);
        device.destroy_image(image);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn queue_resolution() {
        let device = HeadlessDevice::new(HeadlessConfig::default());
        assert_eq!(device.resolve_queue(QueueSelector::Family(2)).unwrap(), 2);
        assert_eq!(
            device
                .resolve_queue(vk::QueueFlags::SPARSE_BINDING.into())
                .unwrap(),
            0
        );
        assert!(matches!(
            device.resolve_queue(QueueSelector::Family(3)),
            Err(DeviceError::NoMatchingQueue(_))
        ));
    }
}
