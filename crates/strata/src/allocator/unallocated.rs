use std::marker::PhantomData;

use ash::vk;

use super::{Allocation, DedicatedObject, MemoryUsage};
use crate::error::AllocationError;

///Allocator implementation that does nothing. Any attempt at `allocate` will fail, any attempt to `free` will do nothing.
/// Is used for contexts that only ever create [Sparse](super::AllocationMode::Sparse) resources, since their memory is bound
/// by sparse bind commands instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmanagedAllocator;

#[derive(Debug)]
pub struct UnmanagedAllocation {
    //exists so that this struct cannot be created by anyone else.
    hidden: PhantomData<()>,
}

//Those function cannot be called, since the struct cannot be created.
impl Allocation for UnmanagedAllocation {
    fn memory(&self) -> vk::DeviceMemory {
        let _ = self.hidden;
        vk::DeviceMemory::null()
    }
    fn offset(&self) -> u64 {
        0
    }
    fn size(&self) -> u64 {
        0
    }
    fn is_private(&self) -> bool {
        false
    }
}

impl super::Allocator for UnmanagedAllocator {
    type Allocation = UnmanagedAllocation;

    fn allocate(
        &mut self,
        _name: Option<&str>,
        _requirements: vk::MemoryRequirements,
        _usage: MemoryUsage,
        _is_linear: bool,
        _dedicated: Option<DedicatedObject>,
    ) -> Result<Self::Allocation, AllocationError> {
        Err(AllocationError::Unsupported)
    }

    fn free(&mut self, _allocation: Self::Allocation) -> Result<(), AllocationError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Allocator;

    #[test]
    fn never_allocates() {
        let mut allocator = UnmanagedAllocator;
        let res = allocator.allocate(
            Some("test"),
            vk::MemoryRequirements {
                size: 64,
                alignment: 16,
                memory_type_bits: !0,
            },
            MemoryUsage::GpuOnly,
            true,
            None,
        );
        assert!(matches!(res, Err(AllocationError::Unsupported)));
    }
}
