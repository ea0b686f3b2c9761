use ash::vk;

use super::MemoryUsage;

///The kind of device object an allocation is requested for.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Buffer,
    Image,
}

///Declared usage of a resource. This is everything a [AllocationPolicy] is allowed to look at.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResourceUsage {
    Buffer {
        usage: vk::BufferUsageFlags,
        memory: MemoryUsage,
        sparse: bool,
    },
    Image {
        usage: vk::ImageUsageFlags,
        memory: MemoryUsage,
        sparse: bool,
    },
}

impl ResourceUsage {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceUsage::Buffer { .. } => ResourceKind::Buffer,
            ResourceUsage::Image { .. } => ResourceKind::Image,
        }
    }

    pub fn memory(&self) -> MemoryUsage {
        match self {
            ResourceUsage::Buffer { memory, .. } | ResourceUsage::Image { memory, .. } => *memory,
        }
    }

    ///True if the object was created with sparse binding flags. Those can't be bound to memory at creation time.
    pub fn is_sparse(&self) -> bool {
        match self {
            ResourceUsage::Buffer { sparse, .. } | ResourceUsage::Image { sparse, .. } => *sparse,
        }
    }
}

///How the memory of a resource is backed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AllocationMode {
    ///Memory block dedicated to exactly one resource. Lives as long as the resource.
    Private,
    ///Sub-allocation in a block that is shared with other resources of compatible type. The block outlives the resource.
    Shared,
    ///No memory is bound when the resource is created. Storage is bound later via sparse bind commands.
    Sparse,
}

///Strategy that decides the [AllocationMode] of a resource. Selection must be a pure function of the resource's kind
/// and declared usage.
pub trait AllocationPolicy {
    fn select(&self, usage: &ResourceUsage) -> AllocationMode;

    ///Resolves the final mode. Sparse resources never get memory at creation, regardless of the policy.
    fn resolve(&self, usage: &ResourceUsage) -> AllocationMode {
        if usage.is_sparse() {
            AllocationMode::Sparse
        } else {
            self.select(usage)
        }
    }
}

///Render targets, storage images and read-back buffers get a private block, everything else is
/// sub-allocated from shared blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl AllocationPolicy for DefaultPolicy {
    fn select(&self, usage: &ResourceUsage) -> AllocationMode {
        match usage {
            ResourceUsage::Image { usage, .. }
                if usage.intersects(
                    vk::ImageUsageFlags::COLOR_ATTACHMENT
                        | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                        | vk::ImageUsageFlags::STORAGE,
                ) =>
            {
                AllocationMode::Private
            }
            ResourceUsage::Buffer {
                memory: MemoryUsage::GpuToCpu,
                ..
            } => AllocationMode::Private,
            _ => AllocationMode::Shared,
        }
    }
}

///Always allocates a dedicated block.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivatePolicy;

impl AllocationPolicy for PrivatePolicy {
    fn select(&self, _usage: &ResourceUsage) -> AllocationMode {
        AllocationMode::Private
    }
}

///Always sub-allocates from shared blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedPolicy;

impl AllocationPolicy for SharedPolicy {
    fn select(&self, _usage: &ResourceUsage) -> AllocationMode {
        AllocationMode::Shared
    }
}

///Never binds memory at creation. Useful for resources whose storage is bound page-wise later, even if they were
/// not created with sparse flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparsePolicy;

impl AllocationPolicy for SparsePolicy {
    fn select(&self, _usage: &ResourceUsage) -> AllocationMode {
        AllocationMode::Sparse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(usage: vk::ImageUsageFlags) -> ResourceUsage {
        ResourceUsage::Image {
            usage,
            memory: MemoryUsage::GpuOnly,
            sparse: false,
        }
    }

    fn buffer(memory: MemoryUsage, sparse: bool) -> ResourceUsage {
        ResourceUsage::Buffer {
            usage: vk::BufferUsageFlags::STORAGE_BUFFER,
            memory,
            sparse,
        }
    }

    #[test]
    fn default_policy_selection() {
        let policy = DefaultPolicy;
        assert_eq!(
            policy.resolve(&image(vk::ImageUsageFlags::COLOR_ATTACHMENT)),
            AllocationMode::Private
        );
        assert_eq!(
            policy.resolve(&image(
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST
            )),
            AllocationMode::Shared
        );
        assert_eq!(
            policy.resolve(&buffer(MemoryUsage::GpuOnly, false)),
            AllocationMode::Shared
        );
        assert_eq!(
            policy.resolve(&buffer(MemoryUsage::GpuToCpu, false)),
            AllocationMode::Private
        );
    }

    #[test]
    fn sparse_wins_over_policy() {
        assert_eq!(
            PrivatePolicy.resolve(&buffer(MemoryUsage::GpuOnly, true)),
            AllocationMode::Sparse
        );
        assert_eq!(
            SharedPolicy.resolve(&buffer(MemoryUsage::GpuOnly, true)),
            AllocationMode::Sparse
        );
        assert_eq!(
            SharedPolicy.resolve(&image(vk::ImageUsageFlags::STORAGE)),
            AllocationMode::Shared
        );
    }

    #[test]
    fn sparse_policy_never_binds() {
        assert_eq!(
            SparsePolicy.resolve(&image(vk::ImageUsageFlags::COLOR_ATTACHMENT)),
            AllocationMode::Sparse
        );
        assert_eq!(
            SparsePolicy.resolve(&buffer(MemoryUsage::GpuToCpu, false)),
            AllocationMode::Sparse
        );
    }

    #[test]
    fn usage_accessors() {
        let usage = buffer(MemoryUsage::CpuToGpu, false);
        assert_eq!(usage.kind(), ResourceKind::Buffer);
        assert_eq!(usage.memory(), MemoryUsage::CpuToGpu);
        assert!(!usage.is_sparse());
        assert_eq!(
            image(vk::ImageUsageFlags::SAMPLED).kind(),
            ResourceKind::Image
        );
    }
}
