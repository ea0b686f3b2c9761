//! ## Allocator
//!
//! In Vulkan the application itself is responsible for allocating memory.
//! Most of the time however this will be done trough some external allocator.
//!
//! Strata provides a simple abstraction via the [Allocator] trait. *Which kind* of allocation a resource gets
//! is decided before that by an [AllocationPolicy]: either a [Private](AllocationMode::Private) memory block that lives exactly as long as the resource,
//! a sub-allocation in a [Shared](AllocationMode::Shared) block, or no memory at all for [Sparse](AllocationMode::Sparse) resources that get their
//! storage bound later.
//!
//! A default implementation based on [Traverse Researche's](https://github.com/Traverse-Research/gpu-allocator) `gpu-allocator` crate is included trough the `default_allocator` feature that is enabled by default.
//! The [HeadlessAllocator] is a budgeted software allocator that works together with the [HeadlessDevice](crate::context::HeadlessDevice).

use std::sync::{Arc, Mutex};

use ash::vk;

use crate::error::AllocationError;

#[cfg(feature = "default_allocator")]
mod gpu_allocator;
#[cfg(feature = "default_allocator")]
pub use self::gpu_allocator::GpuAllocation;

mod headless;
pub use headless::{HeadlessAllocation, HeadlessAllocator};

mod policy;
pub use policy::{
    AllocationMode, AllocationPolicy, DefaultPolicy, PrivatePolicy, ResourceKind, ResourceUsage,
    SharedPolicy, SparsePolicy,
};

mod unallocated;
pub use unallocated::{UnmanagedAllocation, UnmanagedAllocator};

///Types of memory usage. Make sure to use GpuOnly wherever it applies to get optimal performance.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[allow(dead_code)]
pub enum MemoryUsage {
    Unknown,
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

///The device object a private allocation is dedicated to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DedicatedObject {
    Buffer(vk::Buffer),
    Image(vk::Image),
}

///Abstract allocation trait that allows finding the memory handle of an allocation, as well as its offset on that memory.
pub trait Allocation {
    fn memory(&self) -> vk::DeviceMemory;
    fn offset(&self) -> u64;
    fn size(&self) -> u64;
    ///True if the memory block belongs to this allocation alone.
    fn is_private(&self) -> bool;
}

///Implemented for all managed allocations. Allows the [DeviceResource](crate::resources::DeviceResource) to hide its allocator type.
pub trait AnonymAllocation {
    ///Returns false if the allocation is for some reason invalid, aka. shouldn't be used.
    fn is_valid(&self) -> bool;
    fn memory(&self) -> Option<vk::DeviceMemory>;
    fn offset(&self) -> u64;
    fn size(&self) -> u64;
    fn is_private(&self) -> bool;
}

impl<A: Allocator + Send + Sync + 'static> AnonymAllocation for ManagedAllocation<A> {
    fn is_valid(&self) -> bool {
        self.allocation.is_some()
    }
    fn memory(&self) -> Option<vk::DeviceMemory> {
        self.allocation.as_ref().map(|a| a.memory())
    }
    fn offset(&self) -> u64 {
        self.allocation.as_ref().map(|a| a.offset()).unwrap_or(0)
    }
    fn size(&self) -> u64 {
        self.allocation.as_ref().map(|a| a.size()).unwrap_or(0)
    }
    fn is_private(&self) -> bool {
        self.allocation
            .as_ref()
            .map(|a| a.is_private())
            .unwrap_or(false)
    }
}

///An allocation that frees itself when dropped.
pub struct ManagedAllocation<A: Allocator + Send + Sync + 'static> {
    pub allocator: Arc<Mutex<A>>,
    pub allocation: Option<<A as Allocator>::Allocation>,
}

impl<A: Allocator + Send + Sync + 'static> Drop for ManagedAllocation<A> {
    fn drop(&mut self) {
        let Some(allocation) = self.allocation.take() else {
            return;
        };

        match self.allocator.lock() {
            Ok(mut lck) => {
                if let Err(_e) = lck.free(allocation) {
                    //NOTE: failed free happens "silently" as in, we don't panic. The allocator "knows" something is wrong
                    //      and wont hand out the allocation anymore.
                    #[cfg(feature = "logging")]
                    log::error!("Freeing allocation failed with: {}", _e);
                }
            }
            Err(_) => {
                #[cfg(feature = "logging")]
                log::warn!("Could not free managed allocation, allocator lock is poisoned");
            }
        }
    }
}

///Trait that can be implemented by anything that can hand out device memory.
pub trait Allocator {
    type Allocation: Allocation + Send + Sync + 'static;
    ///Creates a single allocation (possibly tagged via `name` for debugging). If `dedicated` is set, the allocation must
    /// be a private memory block for that object.
    fn allocate(
        &mut self,
        name: Option<&str>,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
        is_linear: bool,
        dedicated: Option<DedicatedObject>,
    ) -> Result<Self::Allocation, AllocationError>;

    ///Frees a allocation
    fn free(&mut self, allocation: Self::Allocation) -> Result<(), AllocationError>;
}
