//! # Strata
//!
//! GPU resource layer of a real-time renderer. Strata creates, tracks and reclaims device objects (buffers and images)
//! whose memory and queue affinity have to be managed explicitly, and hosts variable-count scene objects in a concurrent
//! arena backed by a sparse GPU buffer.
//!
//! # Usage
//!
//! Everything starts with a [Ctx](context::Ctx) that bundles a device and an allocator. It is passed explicitly to every
//! constructor.
//!
//! - [DeviceResource](resources::DeviceResource) owns one device object. An [AllocationPolicy](allocator::AllocationPolicy)
//!   decides if its memory is private, shared with siblings or bound later via sparse binding.
//! - Each resource tracks the queue family that owns it in a [QueueOwnership](resources::QueueOwnership) record. Ownership
//!   moves only after both barrier halves were recorded on the two families' [CommandRecorder](recorder::CommandRecorder)s.
//! - [DynamicStorage](storage::DynamicStorage) hosts small objects in slots that can be claimed and released from any thread.
//!   Its [update](storage::DynamicStorage::update) records at most one growth of the storage buffer per frame.
//!
//! Without a GPU, [Ctx::headless](context::Ctx::headless) creates a context on a software device.

pub use ash;
pub use bytemuck;
#[cfg(feature = "default_allocator")]
pub use gpu_allocator;

///Allocator related details. Strata allows for custom allocators (usually the `A` parameter on the [Context](context::Ctx)),
/// and custom allocation policies.
pub mod allocator;

///The device seam ([RawDevice](context::RawDevice)), its Vulkan and headless implementations, queues and the [Ctx](context::Ctx).
pub mod context;

///Device resources. Mostly [Image](resources::Image) and [Buffer](resources::Buffer) owned by a [DeviceResource](resources::DeviceResource),
/// plus queue ownership tracking.
pub mod resources;

///Command streams handed to the rendering code.
pub mod recorder;

///Dynamic, concurrency-safe resource arena.
pub mod storage;

mod error;
pub use error::{
    AllocationError, DeviceError, OwnershipError, ResourceError, StorageError, StrataError,
};
