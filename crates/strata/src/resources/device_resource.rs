use std::{
    hash::{Hash, Hasher},
    ops::Deref,
    sync::Arc,
};

use ash::vk;

use super::{OwnershipTransfer, QueueOwnership, TransferObject};
use crate::{
    allocator::{
        AllocationMode, AllocationPolicy, Allocator, AnonymAllocation, DedicatedObject,
        ManagedAllocation, MemoryUsage, ResourceUsage,
    },
    context::{Ctx, QueueSelector, RawDevice},
    error::{AllocationError, DeviceError, OwnershipError, ResourceError},
    recorder::CommandRecorder,
};

///A kind of device object that can be owned by a [DeviceResource]. Implemented per resource kind (buffers, images).
///
/// The three capabilities map to the life of the object: `allocate` creates the object (and thereby its id),
/// `allocate_storage` binds memory to it, `deallocate` destroys it and invalidates the id.
pub trait DeviceObject: Sized + Send + Sync + 'static {
    type Desc;

    ///Creates the device object for `desc`. No memory is bound yet.
    fn allocate(device: &dyn RawDevice, desc: Self::Desc) -> Result<Self, DeviceError>;

    ///Declared usage, as seen by the [AllocationPolicy].
    fn usage(&self, memory: MemoryUsage) -> ResourceUsage;
    fn memory_requirements(&self, device: &dyn RawDevice) -> vk::MemoryRequirements;
    fn dedicated(&self) -> DedicatedObject;
    fn is_linear(&self) -> bool;

    fn allocate_storage(
        &self,
        device: &dyn RawDevice,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> Result<(), DeviceError>;

    ///Destroys the object and clears its id. Must be a no-op if the id is already cleared.
    fn deallocate(&mut self, device: &dyn RawDevice);

    ///Raw device id, 0 if invalid.
    fn raw(&self) -> u64;

    fn is_valid(&self) -> bool {
        self.raw() != 0
    }

    ///The whole object as target of a queue ownership transfer.
    fn transfer_object(&self) -> TransferObject;
}

///Exclusively owned device object together with its memory and queue ownership record.
///
/// The object is destroyed and its memory released exactly once, either by [destroy](DeviceResource::destroy) or when dropped.
//NOTE: The allocation is type erased. The allocator type is only needed once (to free the memory), and erasing it lets us
//      collect resources from different allocators in the same Vec.
pub struct DeviceResource<T: DeviceObject> {
    resource: T,
    allocation: Option<Box<dyn AnonymAllocation + Send + Sync + 'static>>,
    mode: AllocationMode,
    memory_usage: MemoryUsage,
    queue_ownership: QueueOwnership,
    device: Arc<dyn RawDevice>,
}

impl<T: DeviceObject> DeviceResource<T> {
    ///Creates the object described by `desc`, lets `policy` select how its memory is backed, allocates and binds that memory
    /// and registers `initial_queue` as owner.
    ///
    /// Fails with [ResourceError::AllocationExhausted] if the device is out of memory or object ids. Anything created up
    /// to the failure is destroyed again.
    pub fn new<A: Allocator + Send + Sync + 'static>(
        ctx: &Ctx<A>,
        initial_queue: impl Into<QueueSelector>,
        desc: T::Desc,
        memory_usage: MemoryUsage,
        policy: &dyn AllocationPolicy,
        name: Option<&str>,
    ) -> Result<Self, ResourceError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let device = ctx.device.clone();
        let owner = device.resolve_queue(initial_queue.into())?;

        let mut resource = T::allocate(device.as_ref(), desc)?;
        let mode = policy.resolve(&resource.usage(memory_usage));

        let allocation = match mode {
            AllocationMode::Sparse => None,
            AllocationMode::Private | AllocationMode::Shared => {
                match Self::bind_memory(ctx, &resource, mode, memory_usage, name) {
                    Ok(allocation) => Some(allocation),
                    Err(e) => {
                        #[cfg(feature = "logging")]
                        log::warn!(
                            "Could not allocate memory for {}: {}",
                            name.unwrap_or("unnamed resource"),
                            e
                        );
                        resource.deallocate(device.as_ref());
                        return Err(e);
                    }
                }
            }
        };

        #[cfg(feature = "logging")]
        log::trace!(
            "created {} [{:#x}] as {:?}, owned by family {}",
            name.unwrap_or("unnamed resource"),
            resource.raw(),
            mode,
            owner
        );

        Ok(DeviceResource {
            resource,
            allocation,
            mode,
            memory_usage,
            queue_ownership: QueueOwnership::new(owner),
            device,
        })
    }

    fn bind_memory<A: Allocator + Send + Sync + 'static>(
        ctx: &Ctx<A>,
        resource: &T,
        mode: AllocationMode,
        memory_usage: MemoryUsage,
        name: Option<&str>,
    ) -> Result<Box<dyn AnonymAllocation + Send + Sync + 'static>, ResourceError> {
        let requirements = resource.memory_requirements(ctx.device.as_ref());
        let dedicated = (mode == AllocationMode::Private).then(|| resource.dedicated());

        let allocation = ctx
            .allocator
            .lock()
            .map_err(|_| {
                ResourceError::Allocation(AllocationError::Backend("allocator lock poisoned".into()))
            })?
            .allocate(
                name,
                requirements,
                memory_usage,
                resource.is_linear(),
                dedicated,
            )?;

        let memory = crate::allocator::Allocation::memory(&allocation);
        let offset = crate::allocator::Allocation::offset(&allocation);

        //from here on the allocation frees itself if binding fails
        let managed = ManagedAllocation {
            allocator: ctx.allocator.clone(),
            allocation: Some(allocation),
        };

        resource.allocate_storage(ctx.device.as_ref(), memory, offset)?;
        Ok(Box::new(managed))
    }

    ///Destroys the object and releases its memory. Calling this on an already destroyed resource does nothing.
    pub fn destroy(&mut self) {
        if !self.resource.is_valid() {
            return;
        }
        self.resource.deallocate(self.device.as_ref());
        //drops the managed allocation, which frees the memory (or decrements the shared block)
        self.allocation = None;
    }

    pub fn get(&self) -> &T {
        &self.resource
    }

    ///True until the resource is destroyed.
    pub fn is_valid(&self) -> bool {
        self.resource.is_valid()
    }

    pub fn raw(&self) -> u64 {
        self.resource.raw()
    }

    ///The memory block this resource is bound to. `None` for sparse or destroyed resources.
    pub fn get_underlying_memory(&self) -> Option<vk::DeviceMemory> {
        self.allocation.as_ref().and_then(|a| a.memory())
    }

    ///Offset of this resource within its memory block.
    pub fn memory_offset(&self) -> u64 {
        self.allocation.as_ref().map(|a| a.offset()).unwrap_or(0)
    }

    pub fn has_private_underlying_memory(&self) -> bool {
        self.allocation
            .as_ref()
            .map(|a| a.is_private())
            .unwrap_or(false)
    }

    pub fn allocation_mode(&self) -> AllocationMode {
        self.mode
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        self.memory_usage
    }

    pub fn device(&self) -> &Arc<dyn RawDevice> {
        &self.device
    }

    pub fn queue_ownership(&self) -> &QueueOwnership {
        &self.queue_ownership
    }

    pub fn current_owner(&self) -> u32 {
        self.queue_ownership.current_owner()
    }

    ///Starts a transfer of the whole resource to `dst_family`. See [OwnershipTransfer].
    pub fn begin_transfer(&self, dst_family: u32) -> Result<OwnershipTransfer<'_>, OwnershipError> {
        self.queue_ownership
            .begin_transfer(dst_family, self.resource.transfer_object())
    }

    ///Records the release half on `release`, the acquire half on `acquire` and switches the owner to `dst_family`.
    pub fn transfer_to(
        &self,
        dst_family: u32,
        release: &mut CommandRecorder,
        acquire: &mut CommandRecorder,
    ) -> Result<(), OwnershipError> {
        let mut transfer = self.begin_transfer(dst_family)?;
        //check both families before recording either half
        if acquire.family() != dst_family {
            return Err(OwnershipError::Violation {
                expected: dst_family,
                used: acquire.family(),
            });
        }
        release.release(&mut transfer)?;
        acquire.acquire(&mut transfer)?;
        transfer.complete().map(|_| ())
    }
}

impl<T: DeviceObject> Deref for DeviceResource<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

impl<T: DeviceObject> AsRef<T> for DeviceResource<T> {
    fn as_ref(&self) -> &T {
        &self.resource
    }
}

impl<T: DeviceObject> Drop for DeviceResource<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

///The hash implementation is based on the raw device id.
impl<T: DeviceObject> Hash for DeviceResource<T> {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.resource.raw().hash(hasher)
    }
}
