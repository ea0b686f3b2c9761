use ash::vk;

use super::{DeviceObject, SharingMode, TransferObject};
use crate::{
    allocator::{DedicatedObject, MemoryUsage, ResourceUsage},
    context::RawDevice,
    error::DeviceError,
};
use ash::vk::Handle;

///Static description of a buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub sharing: SharingMode,
    pub flags: vk::BufferCreateFlags,
}

impl Default for BufDesc {
    fn default() -> Self {
        BufDesc {
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
            sharing: SharingMode::Exclusive,
            flags: vk::BufferCreateFlags::empty(),
        }
    }
}

impl BufDesc {
    ///Storage buffer that can be written by transfer commands.
    pub fn storage(size: vk::DeviceSize) -> Self {
        BufDesc {
            size,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            ..Default::default()
        }
    }

    ///Storage buffer whose memory is bound page-wise via sparse binding. `size` is the maximum size the buffer
    /// can ever be grown to.
    pub fn sparse_storage(size: vk::DeviceSize) -> Self {
        BufDesc {
            flags: vk::BufferCreateFlags::SPARSE_BINDING | vk::BufferCreateFlags::SPARSE_RESIDENCY,
            ..Self::storage(size)
        }
    }

    pub fn uniform(size: vk::DeviceSize) -> Self {
        BufDesc {
            size,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            ..Default::default()
        }
    }

    ///Appends the additional usage
    pub fn add_usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    pub fn is_sparse(&self) -> bool {
        self.flags.contains(vk::BufferCreateFlags::SPARSE_BINDING)
    }

    pub fn as_create_info(&self) -> vk::BufferCreateInfo<'_> {
        let info = vk::BufferCreateInfo::default()
            .flags(self.flags)
            .size(self.size)
            .usage(self.usage);

        match &self.sharing {
            SharingMode::Exclusive => info.sharing_mode(vk::SharingMode::EXCLUSIVE),
            SharingMode::Concurrent {
                queue_family_indices,
            } => info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(queue_family_indices),
        }
    }
}

///Buffer object. Destruction and memory handling is done by the owning [DeviceResource](super::DeviceResource).
#[derive(Debug)]
pub struct Buffer {
    pub desc: BufDesc,
    pub inner: vk::Buffer,
}

impl DeviceObject for Buffer {
    type Desc = BufDesc;

    fn allocate(device: &dyn RawDevice, desc: Self::Desc) -> Result<Self, DeviceError> {
        let inner = device.create_buffer(&desc)?;
        Ok(Buffer { desc, inner })
    }

    fn usage(&self, memory: MemoryUsage) -> ResourceUsage {
        ResourceUsage::Buffer {
            usage: self.desc.usage,
            memory,
            sparse: self.desc.is_sparse(),
        }
    }

    fn memory_requirements(&self, device: &dyn RawDevice) -> vk::MemoryRequirements {
        device.buffer_memory_requirements(self.inner)
    }

    fn dedicated(&self) -> DedicatedObject {
        DedicatedObject::Buffer(self.inner)
    }

    fn is_linear(&self) -> bool {
        //NOTE: Buffers are always "linear" in memory
        true
    }

    fn allocate_storage(
        &self,
        device: &dyn RawDevice,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> Result<(), DeviceError> {
        device.bind_buffer_memory(self.inner, memory, offset)
    }

    fn deallocate(&mut self, device: &dyn RawDevice) {
        if self.inner != vk::Buffer::null() {
            device.destroy_buffer(self.inner);
            self.inner = vk::Buffer::null();
        }
    }

    fn raw(&self) -> u64 {
        self.inner.as_raw()
    }

    fn transfer_object(&self) -> TransferObject {
        TransferObject::Buffer {
            buffer: self.inner,
            offset: 0,
            size: vk::WHOLE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Buffer: Send, Sync);
        assert_impl_all!(BufDesc: Send, Sync);
    }

    #[test]
    fn sparse_description() {
        let desc = BufDesc::sparse_storage(1 << 20);
        assert!(desc.is_sparse());
        assert!(!BufDesc::storage(16).is_sparse());

        let info = desc.as_create_info();
        assert_eq!(info.size, 1 << 20);
        assert!(info.flags.contains(vk::BufferCreateFlags::SPARSE_RESIDENCY));
        assert_eq!(info.sharing_mode, vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn concurrent_sharing_sets_families() {
        let desc = BufDesc {
            sharing: SharingMode::Concurrent {
                queue_family_indices: smallvec::smallvec![0, 2],
            },
            ..BufDesc::uniform(64)
        };
        let info = desc.as_create_info();
        assert_eq!(info.sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(info.queue_family_index_count, 2);
    }
}
