// D3D12 backend
//
// Device + one direct queue on the runtime's adapter. Every image is a placed
// resource in its own DEFAULT heap; the heap is the image's backing.

use openxr as xr;
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D::{D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_11_0};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use super::dxgi::find_adapter;
use super::extensions::{require_entry_points, requirements_entry_point, EntryPoints};
use super::image::{ClearValue, ImageBackend, ImageDimension, ImageUsage};
use super::{GraphicsApi, GraphicsBackend, ImageCreateInfo, ImageManager, SwapchainImageSet};
use crate::error::{GraphicsError, Result};
use crate::runtime::XrRuntime;

const BACKEND: GraphicsBackend = GraphicsBackend::D3D12;

pub const SWAPCHAIN_FORMATS: [DXGI_FORMAT; 4] = [
    DXGI_FORMAT_R8G8B8A8_UNORM,
    DXGI_FORMAT_B8G8R8A8_UNORM,
    DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
    DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
];

pub struct D3D12Device {
    pub device: ID3D12Device,
    pub command_queue: ID3D12CommandQueue,
    pub entry_points: EntryPoints,
}

impl D3D12Device {
    pub fn new(runtime: &dyn XrRuntime) -> Result<Self> {
        log::info!("Creating D3D12 device for XR");

        let entry_points = require_entry_points(runtime, &[requirements_entry_point(BACKEND)])?;
        let requirements = runtime.graphics_requirements(BACKEND)?;

        let adapter = find_adapter(BACKEND, requirements.adapter_luid)?;
        let feature_level = requirements
            .min_feature_level
            .map_or(D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL);

        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(&adapter, feature_level, &mut device) }
            .map_err(|e| GraphicsError::native(BACKEND, "D3D12CreateDevice", e))?;
        let device = device
            .ok_or_else(|| GraphicsError::native(BACKEND, "D3D12CreateDevice", "no device returned"))?;

        let queue_desc = D3D12_COMMAND_QUEUE_DESC {
            Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
            Priority: D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            NodeMask: 0,
        };
        let command_queue: ID3D12CommandQueue = unsafe { device.CreateCommandQueue(&queue_desc) }
            .map_err(|e| GraphicsError::native(BACKEND, "CreateCommandQueue", e))?;

        Ok(Self {
            device,
            command_queue,
            entry_points,
        })
    }
}

pub fn resource_flags(info: &ImageCreateInfo, usage: &ImageUsage) -> D3D12_RESOURCE_FLAGS {
    let mut flags = D3D12_RESOURCE_FLAG_NONE;
    if usage.render_target {
        flags |= D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET;
    }
    if usage.depth_stencil {
        flags |= D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL;
        if !info.sampled {
            flags |= D3D12_RESOURCE_FLAG_DENY_SHADER_RESOURCE;
        }
    }
    flags
}

pub fn resource_desc(
    info: &ImageCreateInfo,
    dimension: ImageDimension,
    usage: &ImageUsage,
) -> D3D12_RESOURCE_DESC {
    let (resource_dimension, depth_or_array_size) = match dimension {
        ImageDimension::D1 => (D3D12_RESOURCE_DIMENSION_TEXTURE1D, info.array_layers),
        ImageDimension::D2 => (D3D12_RESOURCE_DIMENSION_TEXTURE2D, info.array_layers),
        ImageDimension::D3 => (D3D12_RESOURCE_DIMENSION_TEXTURE3D, info.depth),
    };

    D3D12_RESOURCE_DESC {
        Dimension: resource_dimension,
        Alignment: 0,
        Width: u64::from(info.width),
        Height: info.height,
        DepthOrArraySize: depth_or_array_size as u16,
        MipLevels: info.mip_levels as u16,
        Format: DXGI_FORMAT(info.format as i32),
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: info.sample_count,
            Quality: 0,
        },
        Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
        Flags: resource_flags(info, usage),
    }
}

/// Optimized clear value for render target and depth-stencil resources.
pub fn clear_value(format: DXGI_FORMAT, usage: &ImageUsage) -> Option<D3D12_CLEAR_VALUE> {
    let clear = ClearValue::for_usage(usage)?;
    let anonymous = match clear {
        ClearValue::Color(color) => D3D12_CLEAR_VALUE_0 { Color: color },
        ClearValue::DepthStencil { depth, stencil } => D3D12_CLEAR_VALUE_0 {
            DepthStencil: D3D12_DEPTH_STENCIL_VALUE {
                Depth: depth,
                Stencil: stencil,
            },
        },
    };
    Some(D3D12_CLEAR_VALUE {
        Format: format,
        Anonymous: anonymous,
    })
}

pub struct D3D12Images {
    device: ID3D12Device,
}

impl D3D12Images {
    fn create_heap(&self, info: &D3D12_RESOURCE_ALLOCATION_INFO) -> Result<ID3D12Heap> {
        let heap_desc = D3D12_HEAP_DESC {
            SizeInBytes: info.SizeInBytes,
            Properties: D3D12_HEAP_PROPERTIES {
                Type: D3D12_HEAP_TYPE_DEFAULT,
                CPUPageProperty: D3D12_CPU_PAGE_PROPERTY_UNKNOWN,
                MemoryPoolPreference: D3D12_MEMORY_POOL_UNKNOWN,
                CreationNodeMask: 0,
                VisibleNodeMask: 0,
            },
            Alignment: info.Alignment,
            Flags: D3D12_HEAP_FLAG_NONE,
        };

        let mut heap: Option<ID3D12Heap> = None;
        unsafe { self.device.CreateHeap(&heap_desc, &mut heap) }
            .map_err(|e| GraphicsError::native(BACKEND, "CreateHeap", e))?;
        heap.ok_or_else(|| GraphicsError::native(BACKEND, "CreateHeap", "no heap returned"))
    }
}

impl ImageBackend for D3D12Images {
    type Image = ID3D12Resource;
    type Backing = ID3D12Heap;

    fn backend(&self) -> GraphicsBackend {
        BACKEND
    }

    fn image_key(image: &ID3D12Resource) -> u64 {
        image.as_raw() as u64
    }

    fn create(
        &self,
        info: &ImageCreateInfo,
        dimension: ImageDimension,
        usage: &ImageUsage,
    ) -> Result<(ID3D12Resource, Option<ID3D12Heap>)> {
        let desc = resource_desc(info, dimension, usage);
        let allocation = unsafe {
            self.device
                .GetResourceAllocationInfo(0, std::slice::from_ref(&desc))
        };
        let heap = self.create_heap(&allocation)?;

        let clear = clear_value(desc.Format, usage);
        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.device.CreatePlacedResource(
                &heap,
                0,
                &desc,
                D3D12_RESOURCE_STATE_COMMON,
                clear.as_ref().map(|clear| clear as *const _),
                &mut resource,
            )
        }
        .map_err(|e| GraphicsError::native(BACKEND, "CreatePlacedResource", e))?;

        // The heap is released on drop if the resource never materialized.
        let resource = resource.ok_or_else(|| {
            GraphicsError::native(BACKEND, "CreatePlacedResource", "no resource returned")
        })?;
        Ok((resource, Some(heap)))
    }

    fn release_backing(&self, heap: ID3D12Heap) {
        drop(heap);
    }

    fn release_image(&self, image: ID3D12Resource) {
        drop(image);
    }
}

pub struct D3D12Graphics {
    images: ImageManager<D3D12Images>,
    swapchain_images: SwapchainImageSet<xr::sys::SwapchainImageD3D12KHR>,
    device: D3D12Device,
}

impl D3D12Graphics {
    pub fn new(runtime: &dyn XrRuntime) -> Result<Self> {
        let device = D3D12Device::new(runtime)?;
        let images = ImageManager::new(D3D12Images {
            device: device.device.clone(),
        });

        Ok(Self {
            images,
            swapchain_images: SwapchainImageSet::new(),
            device,
        })
    }

    pub fn device(&self) -> &D3D12Device {
        &self.device
    }
}

impl GraphicsApi for D3D12Graphics {
    type Xr = xr::D3D12;
    type SwapchainImage = xr::sys::SwapchainImageD3D12KHR;
    type Image = ID3D12Resource;

    fn backend(&self) -> GraphicsBackend {
        BACKEND
    }

    fn graphics_binding(&self) -> xr::d3d::SessionCreateInfoD3D12 {
        xr::d3d::SessionCreateInfoD3D12 {
            device: self.device.device.as_raw() as *mut _,
            queue: self.device.command_queue.as_raw() as *mut _,
        }
    }

    fn allocate_swapchain_image_data(
        &mut self,
        count: u32,
    ) -> &mut SwapchainImageSet<xr::sys::SwapchainImageD3D12KHR> {
        self.swapchain_images.allocate(count)
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<ID3D12Resource> {
        self.images.create_image(info)
    }

    fn destroy_image(&self, image: &mut Option<ID3D12Resource>) {
        self.images.destroy_image(image)
    }

    fn supported_swapchain_formats(&self) -> Vec<i64> {
        SWAPCHAIN_FORMATS
            .iter()
            .map(|format| format.0 as i64)
            .collect()
    }
}

impl Drop for D3D12Graphics {
    fn drop(&mut self) {
        self.images.release_outstanding();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_only_images_deny_shader_access() {
        let info = ImageCreateInfo {
            depth_attachment: true,
            ..Default::default()
        };
        let usage = ImageUsage::derive(&info, ImageDimension::D2);
        let flags = resource_flags(&info, &usage);
        assert!(flags.contains(D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL));
        assert!(flags.contains(D3D12_RESOURCE_FLAG_DENY_SHADER_RESOURCE));

        let sampled = ImageCreateInfo {
            sampled: true,
            ..info
        };
        let usage = ImageUsage::derive(&sampled, ImageDimension::D2);
        assert!(!resource_flags(&sampled, &usage).contains(D3D12_RESOURCE_FLAG_DENY_SHADER_RESOURCE));
    }

    #[test]
    fn volume_descriptor_uses_depth_for_size() {
        let info = ImageCreateInfo {
            dimension: 3,
            width: 64,
            height: 32,
            depth: 16,
            array_layers: 1,
            ..Default::default()
        };
        let desc = resource_desc(&info, ImageDimension::D3, &ImageUsage::default());
        assert_eq!(desc.Dimension, D3D12_RESOURCE_DIMENSION_TEXTURE3D);
        assert_eq!(desc.DepthOrArraySize, 16);
        assert_eq!(desc.Width, 64);
    }

    #[test]
    fn clear_value_only_for_attachments() {
        assert!(clear_value(DXGI_FORMAT_R8G8B8A8_UNORM, &ImageUsage::default()).is_none());

        let usage = ImageUsage {
            render_target: true,
            depth_stencil: true,
            ..Default::default()
        };
        let clear = clear_value(DXGI_FORMAT_D32_FLOAT, &usage).unwrap();
        let depth = unsafe { clear.Anonymous.DepthStencil };
        assert_eq!(depth.Depth, 0.0);
        assert_eq!(depth.Stencil, 0);
    }
}
