use ash::vk;
use tinyvec::TinyVec;

///Barrier building helper. Lets you add barriers for images and buffers
/// via a simple builder API.
///
/// Uses tinyvec internally. [STACK_ALLOCATION](BarrierBuilder::STACK_ALLOCATION) barriers per type are pre allocated into an array. The builder
/// however can outgrow that value.
#[derive(Debug, Default)]
pub struct BarrierBuilder {
    pub images: TinyVec<[vk::ImageMemoryBarrier2<'static>; Self::STACK_ALLOCATION]>,
    pub buffers: TinyVec<[vk::BufferMemoryBarrier2<'static>; Self::STACK_ALLOCATION]>,
}

impl BarrierBuilder {
    ///Ammount of barriers that can be stack allocated.
    pub const STACK_ALLOCATION: usize = 6;

    pub fn new() -> Self {
        Self::default()
    }

    ///pushes only a queue transition for the given region.
    ///
    /// # Safety
    ///
    /// Make sure that the `buffer` handle is alive until the barrier is used on the GPU.
    /// This is not enforced by this object since it is dropped whenever the commandbuffer is build.
    pub fn buffer_queue_transition(
        &mut self,
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        src_queue_family: u32,
        dst_queue_family: u32,
    ) -> &mut Self {
        let item = vk::BufferMemoryBarrier2::default()
            .buffer(buffer)
            .src_queue_family_index(src_queue_family)
            .dst_queue_family_index(dst_queue_family)
            .offset(offset)
            .size(size);
        self.buffers.push(item);

        self
    }

    pub fn buffer_custom_barrier(&mut self, barrier: vk::BufferMemoryBarrier2<'static>) -> &mut Self {
        self.buffers.push(barrier);
        self
    }

    ///pushes only a queue transition for the given region.
    ///
    /// # Safety see [Self::buffer_queue_transition].
    pub fn image_queue_transition(
        &mut self,
        image: vk::Image,
        subresource_range: vk::ImageSubresourceRange,
        src_queue_family: u32,
        dst_queue_family: u32,
    ) -> &mut Self {
        #[cfg(feature = "logging")]
        log::trace!(
            "queue[{:?}] {:#?} -> {:#?}",
            image,
            src_queue_family,
            dst_queue_family
        );

        let item = vk::ImageMemoryBarrier2::default()
            .image(image)
            .subresource_range(subresource_range)
            .src_queue_family_index(src_queue_family)
            .dst_queue_family_index(dst_queue_family);
        self.images.push(item);

        self
    }

    pub fn image_custom_barrier(&mut self, barrier: vk::ImageMemoryBarrier2<'static>) -> &mut Self {
        self.images.push(barrier);
        self
    }

    ///Returns a dependency info containing the currently pushed barriers.
    pub fn as_dependency_info(&self) -> vk::DependencyInfo<'_> {
        vk::DependencyInfo::default()
            .image_memory_barriers(self.images.as_slice())
            .buffer_memory_barriers(self.buffers.as_slice())
    }

    ///Returns true if at least one barrier has been added.
    pub fn has_barrier(&self) -> bool {
        !self.images.is_empty() || !self.buffers.is_empty()
    }
}
