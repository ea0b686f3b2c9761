mod image;
pub use image::{Image, ImageType, ImgDesc};

mod buffer;
pub use buffer::{BufDesc, Buffer};

mod device_resource;
pub use device_resource::{DeviceObject, DeviceResource};

mod ownership;
pub use ownership::{OwnershipTransfer, QueueOwnership, TransferObject};

use smallvec::SmallVec;

///How a resource can be accessed by multiple queue families. Only [Exclusive](SharingMode::Exclusive) resources need
/// queue ownership transfers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SharingMode {
    Exclusive,
    Concurrent {
        ///The queue family indices of families that can access the image concurrently.
        queue_family_indices: SmallVec<[u32; 4]>,
    },
}
