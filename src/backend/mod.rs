// Backend module - graphics API abstraction for XR sessions
//
// Every backend owns its native device, hands the runtime a session binding,
// keeps the swapchain image array the runtime fills, and creates offscreen
// images through an `ImageManager`.
//
// Backends: D3D11, D3D12 (Windows), OpenGL (Xlib), OpenGL ES (Android), Vulkan

pub mod adapter;
pub mod extensions;
pub mod format;
pub mod image;
pub mod swapchain;

#[cfg(all(feature = "d3d11", windows))]
pub mod d3d11;
#[cfg(all(feature = "d3d12", windows))]
pub mod d3d12;
#[cfg(all(any(feature = "d3d11", feature = "d3d12"), windows))]
mod dxgi;
#[cfg(any(feature = "opengl", all(feature = "opengl-es", target_os = "android")))]
pub mod opengl;
#[cfg(feature = "vulkan")]
pub mod vulkan;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GraphicsError, Result};

pub use image::{ImageCreateInfo, ImageManager};
pub use swapchain::{SwapchainImage, SwapchainImageSet};

/// The graphics APIs an XR session can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphicsBackend {
    #[serde(rename = "d3d11")]
    D3D11,
    #[serde(rename = "d3d12")]
    D3D12,
    #[serde(rename = "opengl")]
    OpenGl,
    #[serde(rename = "opengl_es")]
    OpenGlEs,
    #[serde(rename = "vulkan")]
    Vulkan,
}

impl GraphicsBackend {
    pub const ALL: [GraphicsBackend; 5] = [
        GraphicsBackend::D3D11,
        GraphicsBackend::D3D12,
        GraphicsBackend::OpenGl,
        GraphicsBackend::OpenGlEs,
        GraphicsBackend::Vulkan,
    ];
}

impl fmt::Display for GraphicsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GraphicsBackend::D3D11 => "D3D11",
            GraphicsBackend::D3D12 => "D3D12",
            GraphicsBackend::OpenGl => "OpenGL",
            GraphicsBackend::OpenGlEs => "OpenGL ES",
            GraphicsBackend::Vulkan => "Vulkan",
        };
        f.write_str(name)
    }
}

/// Windowing platform the application runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Xlib,
    Wayland,
    Android,
}

impl Platform {
    /// Detect the platform of the running process.
    ///
    /// On Linux, Wayland wins when `WAYLAND_DISPLAY` is set; otherwise Xlib.
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(windows) {
            Platform::Windows
        } else if std::env::var_os("WAYLAND_DISPLAY").is_some() {
            Platform::Wayland
        } else {
            Platform::Xlib
        }
    }

    /// Whether `backend` can run on this platform at all.
    pub fn supports(self, backend: GraphicsBackend) -> bool {
        use GraphicsBackend::*;
        match self {
            Platform::Windows => matches!(backend, D3D11 | D3D12 | OpenGl | Vulkan),
            Platform::Xlib | Platform::Wayland => matches!(backend, OpenGl | Vulkan),
            Platform::Android => matches!(backend, OpenGlEs | Vulkan),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Windows => "Windows",
            Platform::Xlib => "Linux (Xlib)",
            Platform::Wayland => "Linux (Wayland)",
            Platform::Android => "Android",
        };
        f.write_str(name)
    }
}

/// Reject backends the platform cannot host.
pub fn check_backend_for_platform(backend: GraphicsBackend, platform: Platform) -> Result<()> {
    if platform.supports(backend) {
        return Ok(());
    }
    log::error!("{} is not valid for {}", backend, platform);
    Err(GraphicsError::UnsupportedPlatform(backend, platform))
}

/// Names reported to the native API at instance creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub application_name: String,
    pub engine_name: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            application_name: "XR Graphics".to_string(),
            engine_name: "XR Graphics".to_string(),
        }
    }
}

/// The uniform surface every backend exposes to the application.
pub trait GraphicsApi {
    /// OpenXR graphics binding type for this API.
    type Xr: openxr::Graphics;
    /// Runtime-filled swapchain image record.
    type SwapchainImage: SwapchainImage;
    /// Native image handle returned by `create_image`.
    type Image;

    fn backend(&self) -> GraphicsBackend;

    /// Session binding for `xrCreateSession`, pointing at this device.
    fn graphics_binding(&self) -> <Self::Xr as openxr::Graphics>::SessionCreateInfo;

    /// Replace the swapchain image array with `count` tagged, empty records
    /// ready to be filled by the runtime.
    fn allocate_swapchain_image_data(
        &mut self,
        count: u32,
    ) -> &mut SwapchainImageSet<Self::SwapchainImage>;

    fn create_image(&self, info: &ImageCreateInfo) -> Result<Self::Image>;

    /// Destroy the image and its backing storage, resetting the handle.
    fn destroy_image(&self, image: &mut Option<Self::Image>);

    /// Colour formats this backend would like to use, in preference order.
    fn supported_swapchain_formats(&self) -> Vec<i64>;

    /// Pick the first runtime format this backend also supports.
    fn select_swapchain_format(&self, candidates: &[i64]) -> Option<i64> {
        format::select_swapchain_format(
            self.backend(),
            candidates,
            &self.supported_swapchain_formats(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_hosts_everything_but_gles() {
        for backend in GraphicsBackend::ALL {
            let expected = backend != GraphicsBackend::OpenGlEs;
            assert_eq!(Platform::Windows.supports(backend), expected, "{}", backend);
        }
    }

    #[test]
    fn android_hosts_only_gles_and_vulkan() {
        assert!(check_backend_for_platform(GraphicsBackend::OpenGlEs, Platform::Android).is_ok());
        assert!(check_backend_for_platform(GraphicsBackend::Vulkan, Platform::Android).is_ok());
        assert!(check_backend_for_platform(GraphicsBackend::OpenGl, Platform::Android).is_err());
        assert!(check_backend_for_platform(GraphicsBackend::D3D12, Platform::Android).is_err());
    }

    #[test]
    fn linux_rejects_direct3d() {
        let err = check_backend_for_platform(GraphicsBackend::D3D11, Platform::Xlib).unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::UnsupportedPlatform(GraphicsBackend::D3D11, Platform::Xlib)
        ));
        assert!(!Platform::Wayland.supports(GraphicsBackend::D3D12));
        assert!(Platform::Wayland.supports(GraphicsBackend::Vulkan));
    }

    #[test]
    fn backend_names_parse_from_config_strings() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: GraphicsBackend,
        }

        let parsed: Wrapper = toml::from_str(r#"backend = "opengl_es""#).unwrap();
        assert_eq!(parsed.backend, GraphicsBackend::OpenGlEs);
        let parsed: Wrapper = toml::from_str(r#"backend = "d3d12""#).unwrap();
        assert_eq!(parsed.backend, GraphicsBackend::D3D12);
    }
}
