//! ## Context
//!
//! Every resource needs two things to be created: a device that creates the object and binds memory to it, and an
//! allocator that hands out that memory. Both are bundled in the [Ctx].
//!
//! The device is abstracted by the [RawDevice] trait. [Device] implements it on top of a Vulkan device created through ash,
//! [HeadlessDevice] is a software device that has no GPU behind it and is used wherever no GPU is available, for instance
//! in tests.
//!
//! The context is always passed explicitly. Resources keep a clone of the device handle, but there is no global
//! context.
use std::sync::{Arc, Mutex};

mod device;
pub use device::{Device, RawDevice};

mod headless;
pub use headless::{HeadlessConfig, HeadlessDevice};

mod queue;
pub use queue::{Queue, QueueBuilder, QueueSelector};

use crate::allocator::{Allocator, HeadlessAllocator};

///Strata's device context. Can either be constructed by hand, or via helper functions.
pub struct Ctx<A: Allocator + Send> {
    ///Allocator instance used for all buffer and image allocation in this context.
    pub allocator: Arc<Mutex<A>>,
    ///Device including assosiated queues.
    pub device: Arc<dyn RawDevice>,
}

impl<A: Allocator + Send> Clone for Ctx<A> {
    fn clone(&self) -> Self {
        Ctx {
            allocator: self.allocator.clone(),
            device: self.device.clone(),
        }
    }
}

impl<A: Allocator + Send> Ctx<A> {
    ///Creates the context from its elements.
    ///
    /// Assumes that the allocator was created for the device.
    pub fn new(allocator: A, device: Arc<dyn RawDevice>) -> Self {
        Ctx {
            allocator: Arc::new(Mutex::new(allocator)),
            device,
        }
    }
}

impl Ctx<HeadlessAllocator> {
    ///Creates a context on a [HeadlessDevice] with a matching software allocator.
    pub fn headless(config: HeadlessConfig) -> Self {
        Self::headless_with_device(config).0
    }

    ///Same as [headless](Ctx::headless), but also returns the concrete device for inspection.
    pub fn headless_with_device(config: HeadlessConfig) -> (Self, Arc<HeadlessDevice>) {
        let allocator = HeadlessAllocator::new(config.memory_budget, config.shared_block_size);
        let device = Arc::new(HeadlessDevice::new(config));
        (Ctx::new(allocator, device.clone()), device)
    }
}

#[cfg(feature = "default_allocator")]
impl Ctx<gpu_allocator::vulkan::Allocator> {
    ///Creates a context for an already created Vulkan `device`, using the gpu-allocator crate as allocator.
    pub fn new_default_from_device(device: Arc<Device>) -> Result<Self, crate::StrataError> {
        let allocator =
            gpu_allocator::vulkan::Allocator::new(&gpu_allocator::vulkan::AllocatorCreateDesc {
                buffer_device_address: false,
                debug_settings: gpu_allocator::AllocatorDebugSettings {
                    log_leaks_on_shutdown: true,
                    ..Default::default()
                },
                device: device.inner.clone(),
                instance: device.instance.clone(),
                physical_device: device.physical_device,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| crate::error::AllocationError::Backend(Box::new(e)))?;

        Ok(Ctx {
            allocator: Arc::new(Mutex::new(allocator)),
            device,
        })
    }
}
