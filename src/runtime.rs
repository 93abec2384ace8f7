// Runtime - the host XR runtime as seen by the graphics backends
//
// Backends only ever need three things from the runtime:
// - entry point lookup by name
// - graphics requirements (API version range, adapter identity)
// - the Vulkan negotiation queries (extension lists, physical device)
//
// `XrRuntime` captures exactly that surface so backends can be driven by a
// real OpenXR instance or by a test double.

use std::ffi::{c_void, CString};
use std::fmt;
use std::ptr;

use openxr as xr;

use crate::backend::swapchain::{SwapchainImage, SwapchainImageSet};
use crate::backend::GraphicsBackend;
use crate::error::{GraphicsError, Result};

/// Untyped runtime function pointer, as returned by `xrGetInstanceProcAddr`.
pub type EntryPoint = xr::sys::pfn::VoidFunction;

/// Graphics API version as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ApiVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u32,
}

impl ApiVersion {
    pub const fn new(major: u16, minor: u16, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl From<xr::Version> for ApiVersion {
    fn from(version: xr::Version) -> Self {
        Self::new(version.major(), version.minor(), version.patch())
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Locally unique adapter identifier (D3D only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterLuid {
    pub low_part: u32,
    pub high_part: i32,
}

/// What the runtime demands from the graphics device it will bind to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphicsRequirements {
    pub min_api_version: ApiVersion,
    pub max_api_version: ApiVersion,
    /// Adapter the runtime renders on (D3D11/D3D12).
    pub adapter_luid: Option<AdapterLuid>,
    /// Minimum `D3D_FEATURE_LEVEL` (D3D11/D3D12).
    pub min_feature_level: Option<i32>,
}

pub trait XrRuntime {
    /// Look up a runtime function by name. `None` when the runtime does not
    /// expose it (usually because its extension was not enabled).
    fn resolve_entry_point(&self, name: &str) -> Option<EntryPoint>;

    fn graphics_requirements(&self, backend: GraphicsBackend) -> Result<GraphicsRequirements>;

    /// Space-delimited Vulkan instance extensions the runtime needs.
    fn vulkan_instance_extensions(&self) -> Result<String>;

    /// Space-delimited Vulkan device extensions the runtime needs.
    fn vulkan_device_extensions(&self) -> Result<String>;

    /// The physical device the runtime wants, given a raw `VkInstance`.
    /// Returns the raw `VkPhysicalDevice` handle.
    fn vulkan_graphics_device(&self, instance: u64) -> Result<u64>;
}

/// `XrRuntime` backed by a live OpenXR instance and system.
pub struct OpenXrRuntime {
    instance: xr::Instance,
    system: xr::SystemId,
}

impl OpenXrRuntime {
    pub fn new(instance: xr::Instance, system: xr::SystemId) -> Self {
        Self { instance, system }
    }

    pub fn instance(&self) -> &xr::Instance {
        &self.instance
    }

    pub fn system(&self) -> xr::SystemId {
        self.system
    }

    /// Number of images the runtime created for `swapchain`.
    pub fn swapchain_image_count(&self, swapchain: xr::sys::Swapchain) -> Result<u32> {
        let mut count = 0;
        let result = unsafe {
            (self.instance.fp().enumerate_swapchain_images)(
                swapchain,
                0,
                &mut count,
                ptr::null_mut(),
            )
        };
        check(result, "xrEnumerateSwapchainImages")?;
        Ok(count)
    }

    /// Let the runtime fill a previously allocated image set in place.
    /// Returns how many entries were written.
    pub fn enumerate_swapchain_images<T: SwapchainImage>(
        &self,
        swapchain: xr::sys::Swapchain,
        images: &mut SwapchainImageSet<T>,
    ) -> Result<u32> {
        let capacity = images.len() as u32;
        let mut count = 0;
        let result = unsafe {
            (self.instance.fp().enumerate_swapchain_images)(
                swapchain,
                capacity,
                &mut count,
                images.as_base_header_mut(),
            )
        };
        check(result, "xrEnumerateSwapchainImages")?;
        Ok(count)
    }
}

impl XrRuntime for OpenXrRuntime {
    fn resolve_entry_point(&self, name: &str) -> Option<EntryPoint> {
        let name = CString::new(name).ok()?;
        let mut function = None;
        let result = unsafe {
            (self.instance.entry().fp().get_instance_proc_addr)(
                self.instance.as_raw(),
                name.as_ptr(),
                &mut function,
            )
        };
        if result.into_raw() < 0 {
            return None;
        }
        function
    }

    #[allow(unreachable_patterns)]
    fn graphics_requirements(&self, backend: GraphicsBackend) -> Result<GraphicsRequirements> {
        match backend {
            GraphicsBackend::Vulkan => {
                let reqs = self
                    .instance
                    .graphics_requirements::<xr::Vulkan>(self.system)
                    .map_err(|e| GraphicsError::runtime("xrGetVulkanGraphicsRequirementsKHR", e))?;
                Ok(GraphicsRequirements {
                    min_api_version: reqs.min_api_version_supported.into(),
                    max_api_version: reqs.max_api_version_supported.into(),
                    ..Default::default()
                })
            }
            #[cfg(feature = "opengl")]
            GraphicsBackend::OpenGl => {
                let reqs = self
                    .instance
                    .graphics_requirements::<xr::OpenGL>(self.system)
                    .map_err(|e| GraphicsError::runtime("xrGetOpenGLGraphicsRequirementsKHR", e))?;
                Ok(GraphicsRequirements {
                    min_api_version: reqs.min_api_version_supported.into(),
                    max_api_version: reqs.max_api_version_supported.into(),
                    ..Default::default()
                })
            }
            #[cfg(all(feature = "opengl-es", target_os = "android"))]
            GraphicsBackend::OpenGlEs => {
                let reqs = self
                    .instance
                    .graphics_requirements::<xr::OpenGlEs>(self.system)
                    .map_err(|e| {
                        GraphicsError::runtime("xrGetOpenGLESGraphicsRequirementsKHR", e)
                    })?;
                Ok(GraphicsRequirements {
                    min_api_version: reqs.min_api_version_supported.into(),
                    max_api_version: reqs.max_api_version_supported.into(),
                    ..Default::default()
                })
            }
            #[cfg(all(feature = "d3d11", windows))]
            GraphicsBackend::D3D11 => {
                let reqs = self
                    .instance
                    .graphics_requirements::<xr::D3D11>(self.system)
                    .map_err(|e| GraphicsError::runtime("xrGetD3D11GraphicsRequirementsKHR", e))?;
                Ok(d3d_requirements(
                    reqs.adapter_luid.LowPart,
                    reqs.adapter_luid.HighPart,
                    reqs.min_feature_level as i32,
                ))
            }
            #[cfg(all(feature = "d3d12", windows))]
            GraphicsBackend::D3D12 => {
                let reqs = self
                    .instance
                    .graphics_requirements::<xr::D3D12>(self.system)
                    .map_err(|e| GraphicsError::runtime("xrGetD3D12GraphicsRequirementsKHR", e))?;
                Ok(d3d_requirements(
                    reqs.adapter_luid.LowPart,
                    reqs.adapter_luid.HighPart,
                    reqs.min_feature_level as i32,
                ))
            }
            other => Err(GraphicsError::Unavailable(other)),
        }
    }

    fn vulkan_instance_extensions(&self) -> Result<String> {
        self.instance
            .vulkan_legacy_instance_extensions(self.system)
            .map_err(|e| GraphicsError::runtime("xrGetVulkanInstanceExtensionsKHR", e))
    }

    fn vulkan_device_extensions(&self) -> Result<String> {
        self.instance
            .vulkan_legacy_device_extensions(self.system)
            .map_err(|e| GraphicsError::runtime("xrGetVulkanDeviceExtensionsKHR", e))
    }

    fn vulkan_graphics_device(&self, instance: u64) -> Result<u64> {
        let physical_device = unsafe {
            self.instance
                .vulkan_graphics_device(self.system, instance as usize as *const c_void)
        }
        .map_err(|e| GraphicsError::runtime("xrGetVulkanGraphicsDeviceKHR", e))?;
        Ok(physical_device as u64)
    }
}

#[cfg(all(any(feature = "d3d11", feature = "d3d12"), windows))]
fn d3d_requirements(low_part: u32, high_part: i32, min_feature_level: i32) -> GraphicsRequirements {
    GraphicsRequirements {
        adapter_luid: Some(AdapterLuid {
            low_part,
            high_part,
        }),
        min_feature_level: Some(min_feature_level),
        ..Default::default()
    }
}

fn check(result: xr::sys::Result, context: &'static str) -> Result<()> {
    if result.into_raw() < 0 {
        log::error!("OpenXR: {} failed: {:?}", context, result);
        return Err(GraphicsError::runtime(context, result));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_versions_order_by_major_then_minor_then_patch() {
        assert!(ApiVersion::new(4, 5, 0) > ApiVersion::new(4, 3, 9));
        assert!(ApiVersion::new(3, 2, 0) < ApiVersion::new(4, 0, 0));
        assert!(ApiVersion::new(1, 1, 2) > ApiVersion::new(1, 1, 1));
    }

    #[test]
    fn api_version_converts_from_openxr_version() {
        let version: ApiVersion = xr::Version::new(1, 3, 7).into();
        assert_eq!(version, ApiVersion::new(1, 3, 7));
        assert_eq!(version.to_string(), "1.3.7");
    }
}
