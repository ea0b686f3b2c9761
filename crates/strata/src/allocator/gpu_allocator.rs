use ash::vk;
use gpu_allocator::{
    MemoryLocation,
    vulkan::{AllocationCreateDesc, AllocationScheme},
};

use super::{Allocation, DedicatedObject, MemoryUsage};
use crate::error::AllocationError;

pub fn memory_usage_to_location(usage: MemoryUsage) -> MemoryLocation {
    match usage {
        MemoryUsage::CpuToGpu => MemoryLocation::CpuToGpu,
        MemoryUsage::GpuOnly => MemoryLocation::GpuOnly,
        MemoryUsage::GpuToCpu => MemoryLocation::GpuToCpu,
        MemoryUsage::Unknown => MemoryLocation::Unknown,
    }
}

///gpu-allocator's allocation, plus the knowledge whether it was requested as a dedicated block.
pub struct GpuAllocation {
    pub inner: gpu_allocator::vulkan::Allocation,
    private: bool,
}

impl Allocation for GpuAllocation {
    fn memory(&self) -> vk::DeviceMemory {
        unsafe { self.inner.memory() }
    }

    fn offset(&self) -> u64 {
        self.inner.offset()
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn is_private(&self) -> bool {
        self.private
    }
}

fn map_error(err: gpu_allocator::AllocationError) -> AllocationError {
    match err {
        gpu_allocator::AllocationError::OutOfMemory => AllocationError::Exhausted {
            requested: 0,
            available: 0,
        },
        other => AllocationError::Backend(Box::new(other)),
    }
}

///Default memory allocator implementation.
impl super::Allocator for gpu_allocator::vulkan::Allocator {
    type Allocation = GpuAllocation;

    fn allocate(
        &mut self,
        name: Option<&str>,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
        is_linear: bool,
        dedicated: Option<DedicatedObject>,
    ) -> Result<Self::Allocation, AllocationError> {
        let allocation_scheme = match dedicated {
            Some(DedicatedObject::Buffer(buffer)) => AllocationScheme::DedicatedBuffer(buffer),
            Some(DedicatedObject::Image(image)) => AllocationScheme::DedicatedImage(image),
            None => AllocationScheme::GpuAllocatorManaged,
        };

        let alloc_desc = AllocationCreateDesc {
            linear: is_linear,
            location: memory_usage_to_location(usage),
            name: name.unwrap_or("strata allocation"),
            requirements,
            allocation_scheme,
        };

        let inner = gpu_allocator::vulkan::Allocator::allocate(self, &alloc_desc).map_err(map_error)?;
        Ok(GpuAllocation {
            inner,
            private: dedicated.is_some(),
        })
    }

    ///Frees a allocation
    fn free(&mut self, allocation: Self::Allocation) -> Result<(), AllocationError> {
        gpu_allocator::vulkan::Allocator::free(self, allocation.inner).map_err(map_error)
    }
}
