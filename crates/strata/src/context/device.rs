use ash::vk;

use super::{Queue, QueueBuilder, QueueSelector};
use crate::{
    error::DeviceError,
    recorder::BarrierBuilder,
    resources::{BufDesc, ImgDesc},
};

///The entry points a resource needs from a device: object creation and destruction, memory requirements and
/// memory binding, as well as the queue families that can own a resource.
///
/// Implemented by the Vulkan backed [Device] and by the software [HeadlessDevice](super::HeadlessDevice).
pub trait RawDevice: Send + Sync + 'static {
    ///All queues that were created for this device.
    fn queues(&self) -> &[Queue];

    fn create_buffer(&self, desc: &BufDesc) -> Result<vk::Buffer, DeviceError>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> Result<(), DeviceError>;

    fn create_image(&self, desc: &ImgDesc) -> Result<vk::Image, DeviceError>;
    fn destroy_image(&self, image: vk::Image);
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> Result<(), DeviceError>;

    ///Resolves `selector` to a queue family of this device.
    fn resolve_queue(&self, selector: QueueSelector) -> Result<u32, DeviceError> {
        selector
            .resolve(self.queues())
            .ok_or(DeviceError::NoMatchingQueue(selector))
    }
}

///Thin device abstraction that keeps the underlying instance alive and takes care of device destruction once its dropped.
///
/// # Safety and self creation
/// Since the struct is compleatly public it is possible to create a device "on your own". In that case you'll have to make sure
/// that the instance is assosiated with the device and the queues actually exist.
pub struct Device {
    ///The raw ash device
    pub inner: ash::Device,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub queues: Vec<Queue>,
}

impl Device {
    ///Mini helper function that creates the device from an already created instance and physical device, using
    /// the supplied device and creation infos.
    /// The function assumes that device and queues can be created from the device. No additional checking is done.
    ///
    /// # Safety
    /// The biggest concern when using this function should be that the queue_families of the `queue_builder` actully exist in that way,
    /// and that possibly enabled extensions in the `device_create_info` exist. Sparse resources additionally need the
    /// `sparseBinding` and `sparseResidencyBuffer` features to be enabled.
    pub unsafe fn new_from_info(
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device_create_info: &vk::DeviceCreateInfo<'_>,
        queue_builder: &[QueueBuilder],
    ) -> Result<Self, DeviceError> {
        let device = unsafe { instance.create_device(physical_device, device_create_info, None)? };

        //now setup the queues for the infos we prepared before
        let queues = queue_builder
            .iter()
            .flat_map(|queue_family| {
                (0..queue_family.priorities.len()).map(|queue_index| Queue {
                    family_index: queue_family.family_index,
                    properties: queue_family.properties,
                    inner: unsafe {
                        device.get_device_queue(queue_family.family_index, queue_index as u32)
                    },
                })
            })
            .collect();

        Ok(Device {
            inner: device,
            instance,
            physical_device,
            queues,
        })
    }

    ///Returns the first queue for the given family, if there is any.
    pub fn get_first_queue_for_family(&self, family: u32) -> Option<&Queue> {
        self.queues.iter().find(|q| q.family_index == family)
    }

    ///Records all barriers of `barriers` into `command_buffer`. Does nothing if no barrier was added.
    ///
    /// # Safety
    /// `command_buffer` must be in the recording state and belong to the queue family the barriers were built for.
    pub unsafe fn cmd_pipeline_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        barriers: &BarrierBuilder,
    ) {
        if !barriers.has_barrier() {
            return;
        }
        unsafe {
            self.inner
                .cmd_pipeline_barrier2(command_buffer, &barriers.as_dependency_info())
        };
    }
}

impl RawDevice for Device {
    fn queues(&self) -> &[Queue] {
        &self.queues
    }

    fn create_buffer(&self, desc: &BufDesc) -> Result<vk::Buffer, DeviceError> {
        let info = desc.as_create_info();
        Ok(unsafe { self.inner.create_buffer(&info, None)? })
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.inner.destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.inner.get_buffer_memory_requirements(buffer) }
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> Result<(), DeviceError> {
        Ok(unsafe { self.inner.bind_buffer_memory(buffer, memory, offset)? })
    }

    fn create_image(&self, desc: &ImgDesc) -> Result<vk::Image, DeviceError> {
        let info = desc.as_create_info();
        Ok(unsafe { self.inner.create_image(&info, None)? })
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.inner.destroy_image(image, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.inner.get_image_memory_requirements(image) }
    }

    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> Result<(), DeviceError> {
        Ok(unsafe { self.inner.bind_image_memory(image, memory, offset)? })
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe { self.inner.destroy_device(None) };
    }
}
