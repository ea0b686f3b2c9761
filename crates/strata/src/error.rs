use std::error::Error;

use ash::vk;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Object budget of the device exhausted ({0} live objects)")]
    TooManyObjects(usize),
    #[error("Object {0:#x} is not known to the device")]
    UnknownObject(u64),
    #[error("Object {0:#x} is already bound to memory")]
    AlreadyBound(u64),
    #[error("No queue family matches the selector {0:?}")]
    NoMatchingQueue(crate::context::QueueSelector),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

impl DeviceError {
    ///Returns true if the device ran out of memory or object ids, in contrast to being used wrongly.
    pub fn is_exhausted(&self) -> bool {
        match self {
            DeviceError::TooManyObjects(_) => true,
            DeviceError::VkError(res) => matches!(
                *res,
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
                    | vk::Result::ERROR_OUT_OF_HOST_MEMORY
                    | vk::Result::ERROR_TOO_MANY_OBJECTS
            ),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("Allocator is out of memory. Requested {requested} bytes, {available} available")]
    Exhausted { requested: u64, available: u64 },
    #[error("Allocator can not allocate memory at all")]
    Unsupported,
    //FIXME: Not happy about that Box :/
    #[error("Allocator backend error: {0}")]
    Backend(#[from] Box<dyn Error + Send + Sync + 'static>),
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Device can not satisfy resource request: {0}")]
    AllocationExhausted(String),
    #[error("Device error: {0}")]
    Device(DeviceError),
    #[error("Allocation error: {0}")]
    Allocation(AllocationError),
}

impl From<DeviceError> for ResourceError {
    fn from(err: DeviceError) -> Self {
        if err.is_exhausted() {
            ResourceError::AllocationExhausted(err.to_string())
        } else {
            ResourceError::Device(err)
        }
    }
}

impl From<AllocationError> for ResourceError {
    fn from(err: AllocationError) -> Self {
        match err {
            e @ AllocationError::Exhausted { .. } => {
                ResourceError::AllocationExhausted(e.to_string())
            }
            other => ResourceError::Allocation(other),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnershipError {
    #[error("Resource owned by queue family {expected} was used on queue family {used}")]
    Violation { expected: u32, used: u32 },
    #[error("Transfer {src} -> {dst} is missing its {missing} half")]
    IncompleteTransfer {
        src: u32,
        dst: u32,
        missing: &'static str,
    },
    #[error("A transfer is already pending for this resource")]
    TransferPending,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Slot pool {pool} is full, capacity is {capacity}")]
    SlotExhausted { pool: &'static str, capacity: usize },
}

#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),
    #[error("Allocation error: {0}")]
    AllocationError(#[from] AllocationError),
    #[error("Resource error: {0}")]
    ResourceError(#[from] ResourceError),
    #[error("Queue ownership error: {0}")]
    OwnershipError(#[from] OwnershipError),
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Other error: {0}")]
    Other(String),
}
