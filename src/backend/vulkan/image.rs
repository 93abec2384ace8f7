// Vulkan images with explicitly bound device memory
//
// Each image gets its own DEVICE_LOCAL allocation, bound at offset 0. The
// allocation is the image's backing and is freed just before the image.

use ash::vk::{self, Handle};

use crate::backend::image::{ImageBackend, ImageCreateInfo, ImageDimension, ImageUsage};
use crate::backend::GraphicsBackend;
use crate::error::{GraphicsError, Result};

const BACKEND: GraphicsBackend = GraphicsBackend::Vulkan;

pub struct VulkanImages {
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanImages {
    pub fn new(device: ash::Device, memory_properties: vk::PhysicalDeviceMemoryProperties) -> Self {
        Self {
            device,
            memory_properties,
        }
    }

    fn allocate_and_bind(&self, image: vk::Image) -> Result<vk::DeviceMemory> {
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let memory_type_index = find_memory_type(
            &self.memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .ok_or(GraphicsError::NoMemoryType(BACKEND))?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { self.device.allocate_memory(&alloc_info, None) }
            .map_err(|e| GraphicsError::native(BACKEND, "vkAllocateMemory", e))?;

        if let Err(e) = unsafe { self.device.bind_image_memory(image, memory, 0) } {
            unsafe { self.device.free_memory(memory, None) };
            return Err(GraphicsError::native(BACKEND, "vkBindImageMemory", e));
        }

        Ok(memory)
    }
}

impl ImageBackend for VulkanImages {
    type Image = vk::Image;
    type Backing = vk::DeviceMemory;

    fn backend(&self) -> GraphicsBackend {
        BACKEND
    }

    fn image_key(image: &vk::Image) -> u64 {
        image.as_raw()
    }

    fn create(
        &self,
        info: &ImageCreateInfo,
        dimension: ImageDimension,
        usage: &ImageUsage,
    ) -> Result<(vk::Image, Option<vk::DeviceMemory>)> {
        let create_info = image_create_info(info, dimension, usage);

        let image = unsafe { self.device.create_image(&create_info, None) }
            .map_err(|e| GraphicsError::native(BACKEND, "vkCreateImage", e))?;

        match self.allocate_and_bind(image) {
            Ok(memory) => Ok((image, Some(memory))),
            Err(e) => {
                log::error!("{}", e);
                unsafe { self.device.destroy_image(image, None) };
                Err(e)
            }
        }
    }

    fn release_backing(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) };
    }

    fn release_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) };
    }
}

/// Native create info for a validated descriptor.
pub fn image_create_info(
    info: &ImageCreateInfo,
    dimension: ImageDimension,
    usage: &ImageUsage,
) -> vk::ImageCreateInfo {
    let image_type = match dimension {
        ImageDimension::D1 => vk::ImageType::TYPE_1D,
        ImageDimension::D2 => vk::ImageType::TYPE_2D,
        ImageDimension::D3 => vk::ImageType::TYPE_3D,
    };

    let mut flags = vk::ImageCreateFlags::empty();
    if usage.cube_compatible {
        flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
    }
    if dimension == ImageDimension::D3 {
        flags |= vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE;
    }

    let mut image_usage = vk::ImageUsageFlags::empty();
    if usage.shader_resource {
        image_usage |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.render_target {
        image_usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.depth_stencil {
        image_usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    // Mips are generated by blitting level to level.
    if usage.generate_mips {
        image_usage |= vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    }

    vk::ImageCreateInfo::builder()
        .flags(flags)
        .image_type(image_type)
        .format(vk::Format::from_raw(info.format as i32))
        .extent(vk::Extent3D {
            width: info.width,
            height: info.height,
            depth: info.depth,
        })
        .mip_levels(info.mip_levels)
        .array_layers(info.array_layers)
        .samples(vk::SampleCountFlags::from_raw(info.sample_count))
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(image_usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .build()
}

/// First memory type allowed by `type_bits` that has all `required` flags.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..properties.memory_type_count).find(|&i| {
        let allowed = (type_bits & (1 << i)) != 0;
        allowed
            && properties.memory_types[i as usize]
                .property_flags
                .contains(required)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derived(info: &ImageCreateInfo) -> vk::ImageCreateInfo {
        let dimension = ImageDimension::try_from(info.dimension).unwrap();
        image_create_info(info, dimension, &ImageUsage::derive(info, dimension))
    }

    #[test]
    fn cubemap_flag_only_on_2d_images() {
        let cube = ImageCreateInfo {
            cubemap: true,
            array_layers: 6,
            ..Default::default()
        };
        assert!(derived(&cube).flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));

        let volume = ImageCreateInfo {
            dimension: 3,
            cubemap: true,
            ..Default::default()
        };
        let flags = derived(&volume).flags;
        assert!(!flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
        assert!(flags.contains(vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE));
    }

    #[test]
    fn mip_chain_requests_transfer_usage() {
        let mipped = ImageCreateInfo {
            mip_levels: 5,
            sampled: true,
            ..Default::default()
        };
        let usage = derived(&mipped).usage;
        assert!(usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert!(usage.contains(vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST));

        let single = ImageCreateInfo {
            sampled: true,
            ..Default::default()
        };
        assert!(!derived(&single).usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
    }

    #[test]
    fn depth_image_descriptor() {
        let depth = ImageCreateInfo {
            width: 1024,
            height: 768,
            format: vk::Format::D32_SFLOAT.as_raw() as i64,
            depth_attachment: true,
            sample_count: 4,
            ..Default::default()
        };
        let info = derived(&depth);
        assert_eq!(info.image_type, vk::ImageType::TYPE_2D);
        assert_eq!(info.format, vk::Format::D32_SFLOAT);
        assert_eq!(info.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(info.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        assert_eq!(info.extent.width, 1024);
        assert_eq!(info.tiling, vk::ImageTiling::OPTIMAL);
    }

    #[test]
    fn memory_type_respects_type_bits_and_flags() {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        properties.memory_types[1].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        properties.memory_types[2].property_flags =
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;

        let local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        assert_eq!(find_memory_type(&properties, 0b111, local), Some(1));
        assert_eq!(find_memory_type(&properties, 0b101, local), Some(2));
        assert_eq!(find_memory_type(&properties, 0b001, local), None);
    }
}
