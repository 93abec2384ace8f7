// Vulkan backend
//
// Device setup is negotiated with the runtime (extensions, physical device);
// images are explicitly memory-backed.

mod device;
mod image;

pub use device::VulkanDevice;
pub use image::{find_memory_type, image_create_info, VulkanImages};

use ash::vk::{self, Handle};
use openxr as xr;

use super::{AppInfo, GraphicsApi, GraphicsBackend, ImageCreateInfo, ImageManager, SwapchainImageSet};
use crate::error::Result;
use crate::runtime::XrRuntime;

pub const SWAPCHAIN_FORMATS: [vk::Format; 4] = [
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::R8G8B8A8_SRGB,
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::R8G8B8A8_UNORM,
];

pub struct VulkanGraphics {
    // Dropped before the device.
    images: ImageManager<VulkanImages>,
    swapchain_images: SwapchainImageSet<xr::sys::SwapchainImageVulkanKHR>,
    device: VulkanDevice,
}

impl VulkanGraphics {
    pub fn new(runtime: &dyn XrRuntime, app: &AppInfo) -> Result<Self> {
        let device = VulkanDevice::new(runtime, app)?;
        let images = ImageManager::new(VulkanImages::new(
            device.device.clone(),
            device.memory_properties,
        ));

        Ok(Self {
            images,
            swapchain_images: SwapchainImageSet::new(),
            device,
        })
    }

    pub fn device(&self) -> &VulkanDevice {
        &self.device
    }

    pub fn image_manager(&self) -> &ImageManager<VulkanImages> {
        &self.images
    }
}

impl GraphicsApi for VulkanGraphics {
    type Xr = xr::Vulkan;
    type SwapchainImage = xr::sys::SwapchainImageVulkanKHR;
    type Image = vk::Image;

    fn backend(&self) -> GraphicsBackend {
        GraphicsBackend::Vulkan
    }

    fn graphics_binding(&self) -> xr::vulkan::SessionCreateInfo {
        xr::vulkan::SessionCreateInfo {
            instance: self.device.instance.handle().as_raw() as _,
            physical_device: self.device.physical_device.as_raw() as _,
            device: self.device.device.handle().as_raw() as _,
            queue_family_index: self.device.queue_family_index,
            queue_index: self.device.queue_index,
        }
    }

    fn allocate_swapchain_image_data(
        &mut self,
        count: u32,
    ) -> &mut SwapchainImageSet<xr::sys::SwapchainImageVulkanKHR> {
        self.swapchain_images.allocate(count)
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<vk::Image> {
        self.images.create_image(info)
    }

    fn destroy_image(&self, image: &mut Option<vk::Image>) {
        self.images.destroy_image(image)
    }

    fn supported_swapchain_formats(&self) -> Vec<i64> {
        SWAPCHAIN_FORMATS
            .iter()
            .map(|format| format.as_raw() as i64)
            .collect()
    }
}

impl Drop for VulkanGraphics {
    fn drop(&mut self) {
        self.images.release_outstanding();
    }
}
