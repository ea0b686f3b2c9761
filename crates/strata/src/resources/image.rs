use ash::vk::{self, Handle};

use super::{DeviceObject, SharingMode, TransferObject};
use crate::{
    allocator::{DedicatedObject, MemoryUsage, ResourceUsage},
    context::RawDevice,
    error::DeviceError,
};

///Dimensionality of an [Image]. Array variants carry the layer count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageType {
    Tex2d,
    Tex2dArray(u32),
    Tex3d,
}

impl ImageType {
    ///Clamps the depth of 2d images to 1.
    pub fn valid_extent(&self, extent: vk::Extent3D) -> vk::Extent3D {
        match self {
            ImageType::Tex3d => extent,
            ImageType::Tex2d | ImageType::Tex2dArray(_) => vk::Extent3D { depth: 1, ..extent },
        }
    }

    pub fn layer_count(&self) -> u32 {
        match self {
            ImageType::Tex2d | ImageType::Tex3d => 1,
            ImageType::Tex2dArray(layers) => *layers,
        }
    }
}

impl From<ImageType> for vk::ImageType {
    fn from(ty: ImageType) -> vk::ImageType {
        match ty {
            ImageType::Tex3d => vk::ImageType::TYPE_3D,
            ImageType::Tex2d | ImageType::Tex2dArray(_) => vk::ImageType::TYPE_2D,
        }
    }
}

///Image description, the creation relevant part of [ImageCreateInfo](vk::ImageCreateInfo).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImgDesc {
    pub img_type: ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub sharing_mode: SharingMode,
    pub flags: vk::ImageCreateFlags,
}

impl ImgDesc {
    ///Single layer 2d image without mip levels.
    pub fn image_2d(
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        ImgDesc {
            img_type: ImageType::Tex2d,
            format,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            mip_levels: 1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: SharingMode::Exclusive,
            flags: vk::ImageCreateFlags::empty(),
        }
    }

    pub fn as_create_info(&self) -> vk::ImageCreateInfo<'_> {
        let info = vk::ImageCreateInfo::default()
            .flags(self.flags)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .image_type(self.img_type.into())
            .format(self.format)
            .extent(self.img_type.valid_extent(self.extent))
            .mip_levels(self.mip_levels)
            .array_layers(self.img_type.layer_count())
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(self.tiling)
            .usage(self.usage);

        match &self.sharing_mode {
            SharingMode::Exclusive => info.sharing_mode(vk::SharingMode::EXCLUSIVE),
            SharingMode::Concurrent {
                queue_family_indices,
            } => info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(queue_family_indices),
        }
    }

    pub fn is_sparse(&self) -> bool {
        self.flags.contains(vk::ImageCreateFlags::SPARSE_BINDING)
    }
}

///Image object. Destruction and memory handling is done by the owning [DeviceResource](super::DeviceResource).
#[derive(Debug)]
pub struct Image {
    pub desc: ImgDesc,
    pub inner: vk::Image,
}

impl Image {
    ///Sub resource range that covers all layers and mip levels.
    pub fn subresource_all(&self) -> vk::ImageSubresourceRange {
        let aspect_mask = match self.desc.format {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT => vk::ImageAspectFlags::DEPTH,
            vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            _ => vk::ImageAspectFlags::COLOR,
        };

        vk::ImageSubresourceRange {
            aspect_mask,
            base_array_layer: 0,
            base_mip_level: 0,
            layer_count: self.desc.img_type.layer_count(),
            level_count: self.desc.mip_levels,
        }
    }
}

impl DeviceObject for Image {
    type Desc = ImgDesc;

    fn allocate(device: &dyn RawDevice, desc: Self::Desc) -> Result<Self, DeviceError> {
        let inner = device.create_image(&desc)?;
        Ok(Image { desc, inner })
    }

    fn usage(&self, memory: MemoryUsage) -> ResourceUsage {
        ResourceUsage::Image {
            usage: self.desc.usage,
            memory,
            sparse: self.desc.is_sparse(),
        }
    }

    fn memory_requirements(&self, device: &dyn RawDevice) -> vk::MemoryRequirements {
        device.image_memory_requirements(self.inner)
    }

    fn dedicated(&self) -> DedicatedObject {
        DedicatedObject::Image(self.inner)
    }

    fn is_linear(&self) -> bool {
        self.desc.tiling == vk::ImageTiling::LINEAR
    }

    fn allocate_storage(
        &self,
        device: &dyn RawDevice,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> Result<(), DeviceError> {
        device.bind_image_memory(self.inner, memory, offset)
    }

    fn deallocate(&mut self, device: &dyn RawDevice) {
        if self.inner != vk::Image::null() {
            device.destroy_image(self.inner);
            self.inner = vk::Image::null();
        }
    }

    fn raw(&self) -> u64 {
        self.inner.as_raw()
    }

    fn transfer_object(&self) -> TransferObject {
        TransferObject::Image {
            image: self.inner,
            range: self.subresource_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Image: Send, Sync);
    }

    #[test]
    fn array_layers_and_depth() {
        let desc = ImgDesc {
            img_type: ImageType::Tex2dArray(3),
            extent: vk::Extent3D {
                width: 8,
                height: 4,
                depth: 2,
            },
            ..ImgDesc::image_2d(
                8,
                4,
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
            )
        };
        let info = desc.as_create_info();
        assert_eq!(info.array_layers, 3);
        assert_eq!(info.extent.depth, 1);
        assert_eq!(ImageType::Tex3d.valid_extent(desc.extent).depth, 2);
    }

    #[test]
    fn depth_aspect() {
        let img = Image {
            desc: ImgDesc::image_2d(
                16,
                16,
                vk::Format::D32_SFLOAT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ),
            inner: vk::Image::null(),
        };
        let range = img.subresource_all();
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!((range.layer_count, range.level_count), (1, 1));
    }
}
