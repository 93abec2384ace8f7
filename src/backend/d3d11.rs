// D3D11 backend
//
// Device + immediate context on the adapter the runtime names by LUID.
// Texture storage is managed by the driver, so images carry no backing.

use openxr as xr;
use windows::core::Interface;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::{D3D_DRIVER_TYPE_UNKNOWN, D3D_FEATURE_LEVEL};
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::IDXGIAdapter;

use super::dxgi::find_adapter;
use super::extensions::{require_entry_points, requirements_entry_point, EntryPoints};
use super::image::{ImageBackend, ImageDimension, ImageUsage};
use super::{GraphicsApi, GraphicsBackend, ImageCreateInfo, ImageManager, SwapchainImageSet};
use crate::error::{GraphicsError, Result};
use crate::runtime::XrRuntime;

const BACKEND: GraphicsBackend = GraphicsBackend::D3D11;

pub const SWAPCHAIN_FORMATS: [DXGI_FORMAT; 4] = [
    DXGI_FORMAT_R8G8B8A8_UNORM,
    DXGI_FORMAT_B8G8R8A8_UNORM,
    DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
    DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
];

pub struct D3D11Device {
    pub device: ID3D11Device,
    pub immediate_context: ID3D11DeviceContext,
    pub entry_points: EntryPoints,
}

impl D3D11Device {
    pub fn new(runtime: &dyn XrRuntime) -> Result<Self> {
        log::info!("Creating D3D11 device for XR");

        let entry_points = require_entry_points(runtime, &[requirements_entry_point(BACKEND)])?;
        let requirements = runtime.graphics_requirements(BACKEND)?;

        let adapter: IDXGIAdapter = find_adapter(BACKEND, requirements.adapter_luid)?
            .cast()
            .map_err(|e| GraphicsError::native(BACKEND, "IDXGIAdapter cast", e))?;

        let feature_levels = requirements
            .min_feature_level
            .map(|level| [D3D_FEATURE_LEVEL(level)]);

        let mut device: Option<ID3D11Device> = None;
        let mut immediate_context: Option<ID3D11DeviceContext> = None;
        unsafe {
            D3D11CreateDevice(
                &adapter,
                D3D_DRIVER_TYPE_UNKNOWN,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_FLAG(0),
                feature_levels.as_ref().map(|levels| levels.as_slice()),
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut immediate_context),
            )
        }
        .map_err(|e| GraphicsError::native(BACKEND, "D3D11CreateDevice", e))?;

        let device = device.ok_or_else(|| {
            GraphicsError::native(BACKEND, "D3D11CreateDevice", "no device returned")
        })?;
        let immediate_context = immediate_context.ok_or_else(|| {
            GraphicsError::native(BACKEND, "D3D11CreateDevice", "no immediate context returned")
        })?;

        Ok(Self {
            device,
            immediate_context,
            entry_points,
        })
    }
}

/// D3D11 has a distinct interface per texture dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum D3D11Texture {
    Texture1D(ID3D11Texture1D),
    Texture2D(ID3D11Texture2D),
    Texture3D(ID3D11Texture3D),
}

impl D3D11Texture {
    pub fn as_raw(&self) -> *mut std::ffi::c_void {
        match self {
            D3D11Texture::Texture1D(texture) => texture.as_raw(),
            D3D11Texture::Texture2D(texture) => texture.as_raw(),
            D3D11Texture::Texture3D(texture) => texture.as_raw(),
        }
    }
}

pub fn bind_flags(usage: &ImageUsage) -> u32 {
    let mut flags = 0;
    if usage.shader_resource {
        flags |= D3D11_BIND_SHADER_RESOURCE.0 as u32;
    }
    if usage.render_target {
        flags |= D3D11_BIND_RENDER_TARGET.0 as u32;
    }
    if usage.depth_stencil {
        flags |= D3D11_BIND_DEPTH_STENCIL.0 as u32;
    }
    flags
}

pub fn misc_flags(usage: &ImageUsage) -> u32 {
    let mut flags = 0;
    if usage.generate_mips {
        flags |= D3D11_RESOURCE_MISC_GENERATE_MIPS.0 as u32;
    }
    if usage.cube_compatible {
        flags |= D3D11_RESOURCE_MISC_TEXTURECUBE.0 as u32;
    }
    flags
}

pub struct D3D11Images {
    device: ID3D11Device,
}

impl ImageBackend for D3D11Images {
    type Image = D3D11Texture;
    type Backing = ();

    fn backend(&self) -> GraphicsBackend {
        BACKEND
    }

    fn image_key(image: &D3D11Texture) -> u64 {
        image.as_raw() as u64
    }

    fn create(
        &self,
        info: &ImageCreateInfo,
        dimension: ImageDimension,
        usage: &ImageUsage,
    ) -> Result<(D3D11Texture, Option<()>)> {
        let format = DXGI_FORMAT(info.format as i32);
        let bind = bind_flags(usage);
        let misc = misc_flags(usage);

        let texture = match dimension {
            ImageDimension::D1 => {
                let desc = D3D11_TEXTURE1D_DESC {
                    Width: info.width,
                    MipLevels: info.mip_levels,
                    ArraySize: info.array_layers,
                    Format: format,
                    Usage: D3D11_USAGE_DEFAULT,
                    BindFlags: bind,
                    CPUAccessFlags: 0,
                    MiscFlags: misc,
                };
                let mut texture: Option<ID3D11Texture1D> = None;
                unsafe { self.device.CreateTexture1D(&desc, None, Some(&mut texture)) }
                    .map_err(|e| GraphicsError::native(BACKEND, "CreateTexture1D", e))?;
                texture.map(D3D11Texture::Texture1D)
            }
            ImageDimension::D2 => {
                let desc = D3D11_TEXTURE2D_DESC {
                    Width: info.width,
                    Height: info.height,
                    MipLevels: info.mip_levels,
                    ArraySize: info.array_layers,
                    Format: format,
                    SampleDesc: DXGI_SAMPLE_DESC {
                        Count: info.sample_count,
                        Quality: 0,
                    },
                    Usage: D3D11_USAGE_DEFAULT,
                    BindFlags: bind,
                    CPUAccessFlags: 0,
                    MiscFlags: misc,
                };
                let mut texture: Option<ID3D11Texture2D> = None;
                unsafe { self.device.CreateTexture2D(&desc, None, Some(&mut texture)) }
                    .map_err(|e| GraphicsError::native(BACKEND, "CreateTexture2D", e))?;
                texture.map(D3D11Texture::Texture2D)
            }
            ImageDimension::D3 => {
                let desc = D3D11_TEXTURE3D_DESC {
                    Width: info.width,
                    Height: info.height,
                    Depth: info.depth,
                    MipLevels: info.mip_levels,
                    Format: format,
                    Usage: D3D11_USAGE_DEFAULT,
                    BindFlags: bind,
                    CPUAccessFlags: 0,
                    MiscFlags: misc,
                };
                let mut texture: Option<ID3D11Texture3D> = None;
                unsafe { self.device.CreateTexture3D(&desc, None, Some(&mut texture)) }
                    .map_err(|e| GraphicsError::native(BACKEND, "CreateTexture3D", e))?;
                texture.map(D3D11Texture::Texture3D)
            }
        };

        let texture = texture
            .ok_or_else(|| GraphicsError::native(BACKEND, "CreateTexture", "no texture returned"))?;
        Ok((texture, None))
    }

    fn release_backing(&self, _backing: ()) {}

    fn release_image(&self, image: D3D11Texture) {
        // COM release happens on drop.
        drop(image);
    }
}

pub struct D3D11Graphics {
    images: ImageManager<D3D11Images>,
    swapchain_images: SwapchainImageSet<xr::sys::SwapchainImageD3D11KHR>,
    device: D3D11Device,
}

impl D3D11Graphics {
    pub fn new(runtime: &dyn XrRuntime) -> Result<Self> {
        let device = D3D11Device::new(runtime)?;
        let images = ImageManager::new(D3D11Images {
            device: device.device.clone(),
        });

        Ok(Self {
            images,
            swapchain_images: SwapchainImageSet::new(),
            device,
        })
    }

    pub fn device(&self) -> &D3D11Device {
        &self.device
    }
}

impl GraphicsApi for D3D11Graphics {
    type Xr = xr::D3D11;
    type SwapchainImage = xr::sys::SwapchainImageD3D11KHR;
    type Image = D3D11Texture;

    fn backend(&self) -> GraphicsBackend {
        BACKEND
    }

    fn graphics_binding(&self) -> xr::d3d::SessionCreateInfoD3D11 {
        xr::d3d::SessionCreateInfoD3D11 {
            device: self.device.device.as_raw() as *mut _,
        }
    }

    fn allocate_swapchain_image_data(
        &mut self,
        count: u32,
    ) -> &mut SwapchainImageSet<xr::sys::SwapchainImageD3D11KHR> {
        self.swapchain_images.allocate(count)
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<D3D11Texture> {
        self.images.create_image(info)
    }

    fn destroy_image(&self, image: &mut Option<D3D11Texture>) {
        self.images.destroy_image(image)
    }

    fn supported_swapchain_formats(&self) -> Vec<i64> {
        SWAPCHAIN_FORMATS
            .iter()
            .map(|format| format.0 as i64)
            .collect()
    }
}

impl Drop for D3D11Graphics {
    fn drop(&mut self) {
        self.images.release_outstanding();
    }
}
