// OpenGL / OpenGL ES backend
//
// GL has no device object to hand the runtime; a small offscreen window
// provides the context, and the session binds to that window's handles.
// Helpers: GLX (X11), WGL (Windows), EGL (Android).
// Textures get immutable storage matching their target; GL manages the
// memory, so images carry no backing.

#[cfg(all(feature = "opengl-es", target_os = "android"))]
mod egl;
#[cfg(all(feature = "opengl", windows))]
mod wgl;
#[cfg(all(feature = "opengl", target_os = "linux"))]
mod xlib;

#[cfg(all(feature = "opengl-es", target_os = "android"))]
pub use egl::{egl_session_create_info, EglWindow};
#[cfg(all(feature = "opengl", windows))]
pub use wgl::{wgl_session_create_info, WglWindow};
#[cfg(all(feature = "opengl", target_os = "linux"))]
pub use xlib::{xlib_session_create_info, XlibGlWindow};

use std::ffi::c_void;

use glow::HasContext;
use openxr as xr;

use super::extensions::{require_entry_points, requirements_entry_point, EntryPoints};
use super::image::{ImageBackend, ImageDimension, ImageUsage};
use super::{GraphicsApi, GraphicsBackend, ImageCreateInfo, ImageManager, SwapchainImage, SwapchainImageSet};
use crate::error::{GraphicsError, Result};
use crate::runtime::{ApiVersion, XrRuntime};

/// Size of the helper window. It is never shown to the user.
pub const WINDOW_WIDTH: u32 = 640;
pub const WINDOW_HEIGHT: u32 = 480;

/// Platform windowing helper that owns a current GL context.
pub trait GlWindow: Sized {
    /// `OpenGl` or `OpenGlEs`, depending on the context this window creates.
    const BACKEND: GraphicsBackend;
    type Xr: xr::Graphics;
    type SwapchainImage: SwapchainImage;

    /// Create the window and make its context current on this thread.
    fn create(width: u32, height: u32) -> Result<Self>;

    fn proc_address(&self, name: &str) -> *const c_void;

    fn session_create_info(&self) -> <Self::Xr as xr::Graphics>::SessionCreateInfo;
}

type TexStorage3DMultisample = unsafe extern "system" fn(u32, i32, u32, i32, i32, i32, u8);

/// Texture target for a validated descriptor.
pub fn texture_target(info: &ImageCreateInfo, dimension: ImageDimension) -> u32 {
    match dimension {
        ImageDimension::D1 if info.array_layers > 1 => glow::TEXTURE_1D_ARRAY,
        ImageDimension::D1 => glow::TEXTURE_1D,
        ImageDimension::D2 if info.cubemap => {
            if info.array_layers > 6 {
                glow::TEXTURE_CUBE_MAP_ARRAY
            } else {
                glow::TEXTURE_CUBE_MAP
            }
        }
        ImageDimension::D2 if info.sample_count > 1 => {
            if info.array_layers > 1 {
                glow::TEXTURE_2D_MULTISAMPLE_ARRAY
            } else {
                glow::TEXTURE_2D_MULTISAMPLE
            }
        }
        ImageDimension::D2 if info.array_layers > 1 => glow::TEXTURE_2D_ARRAY,
        ImageDimension::D2 => glow::TEXTURE_2D,
        ImageDimension::D3 => glow::TEXTURE_3D,
    }
}

/// The one immutable-storage call a target needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureStorage {
    Storage2D {
        target: u32,
        levels: i32,
        width: i32,
        height: i32,
    },
    Storage3D {
        target: u32,
        levels: i32,
        width: i32,
        height: i32,
        depth: i32,
    },
    Multisample2D {
        target: u32,
        samples: i32,
        width: i32,
        height: i32,
    },
    Multisample3D {
        target: u32,
        samples: i32,
        width: i32,
        height: i32,
        depth: i32,
    },
}

impl TextureStorage {
    pub fn for_target(info: &ImageCreateInfo, target: u32) -> Self {
        let levels = info.mip_levels as i32;
        let samples = info.sample_count as i32;
        let width = info.width as i32;
        let height = info.height as i32;
        let layers = info.array_layers as i32;

        match target {
            // No glTexStorage1D: store 1D textures as 2D with a height of 1.
            glow::TEXTURE_1D => TextureStorage::Storage2D {
                target: glow::TEXTURE_2D,
                levels,
                width,
                height: 1,
            },
            glow::TEXTURE_1D_ARRAY => TextureStorage::Storage2D {
                target,
                levels,
                width,
                height: layers,
            },
            glow::TEXTURE_2D_MULTISAMPLE => TextureStorage::Multisample2D {
                target,
                samples,
                width,
                height,
            },
            glow::TEXTURE_2D_MULTISAMPLE_ARRAY => TextureStorage::Multisample3D {
                target,
                samples,
                width,
                height,
                depth: layers,
            },
            glow::TEXTURE_3D => TextureStorage::Storage3D {
                target,
                levels,
                width,
                height,
                depth: info.depth as i32,
            },
            glow::TEXTURE_2D_ARRAY | glow::TEXTURE_CUBE_MAP_ARRAY => TextureStorage::Storage3D {
                target,
                levels,
                width,
                height,
                depth: layers,
            },
            // TEXTURE_2D, TEXTURE_CUBE_MAP
            _ => TextureStorage::Storage2D {
                target,
                levels,
                width,
                height,
            },
        }
    }

    /// Target the texture is bound to while storage is allocated.
    pub fn bind_target(&self) -> u32 {
        match *self {
            TextureStorage::Storage2D { target, .. }
            | TextureStorage::Storage3D { target, .. }
            | TextureStorage::Multisample2D { target, .. }
            | TextureStorage::Multisample3D { target, .. } => target,
        }
    }
}

/// Swapchain formats for a GL flavour, in preference order.
pub fn swapchain_formats(backend: GraphicsBackend, major_version: u16) -> Vec<i64> {
    let formats: &[u32] = match backend {
        GraphicsBackend::OpenGlEs if major_version >= 3 => {
            &[glow::RGBA8, glow::RGBA8_SNORM, glow::SRGB8_ALPHA8]
        }
        GraphicsBackend::OpenGlEs => &[glow::RGBA8, glow::RGBA8_SNORM],
        // RGBA8 and RGBA8_SNORM band visibly; they are fallbacks.
        _ => &[glow::RGB10_A2, glow::RGBA16F, glow::RGBA8, glow::RGBA8_SNORM],
    };
    formats.iter().map(|&format| i64::from(format)).collect()
}

/// Log when the context is older than the runtime's minimum. Not fatal.
pub fn check_context_version(
    backend: GraphicsBackend,
    context: ApiVersion,
    required: ApiVersion,
) -> bool {
    if context < required {
        log::error!(
            "{}: context version {} is below the runtime minimum {}",
            backend,
            context,
            required
        );
        return false;
    }
    true
}

/// Upper bound on queued errors read back; a lost context may never report
/// `NO_ERROR`.
const MAX_PENDING_ERRORS: usize = 32;

/// Pop every queued GL error so the next check only sees fresh ones.
pub fn drain_errors(mut next_error: impl FnMut() -> u32) -> Vec<u32> {
    let mut pending = Vec::new();
    while pending.len() < MAX_PENDING_ERRORS {
        match next_error() {
            glow::NO_ERROR => break,
            code => pending.push(code),
        }
    }
    pending
}

pub struct GlImages {
    gl: glow::Context,
    backend: GraphicsBackend,
    tex_storage_3d_multisample: Option<TexStorage3DMultisample>,
}

impl GlImages {
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    unsafe fn allocate_storage(&self, storage: TextureStorage, format: u32) -> Result<()> {
        match storage {
            TextureStorage::Storage2D {
                target,
                levels,
                width,
                height,
            } => self.gl.tex_storage_2d(target, levels, format, width, height),
            TextureStorage::Storage3D {
                target,
                levels,
                width,
                height,
                depth,
            } => self.gl.tex_storage_3d(target, levels, format, width, height, depth),
            TextureStorage::Multisample2D {
                target,
                samples,
                width,
                height,
            } => self
                .gl
                .tex_storage_2d_multisample(target, samples, format, width, height, true),
            TextureStorage::Multisample3D {
                target,
                samples,
                width,
                height,
                depth,
            } => {
                let Some(tex_storage) = self.tex_storage_3d_multisample else {
                    return Err(GraphicsError::native(
                        self.backend,
                        "glTexStorage3DMultisample",
                        "entry point unavailable",
                    ));
                };
                tex_storage(target, samples, format, width, height, depth, 1);
            }
        }
        Ok(())
    }
}

impl ImageBackend for GlImages {
    type Image = glow::NativeTexture;
    type Backing = ();

    fn backend(&self) -> GraphicsBackend {
        self.backend
    }

    fn image_key(image: &glow::NativeTexture) -> u64 {
        u64::from(image.0.get())
    }

    fn create(
        &self,
        info: &ImageCreateInfo,
        dimension: ImageDimension,
        _usage: &ImageUsage,
    ) -> Result<(glow::NativeTexture, Option<()>)> {
        let storage = TextureStorage::for_target(info, texture_target(info, dimension));
        let bind_target = storage.bind_target();

        let texture = unsafe { self.gl.create_texture() }
            .map_err(|e| GraphicsError::native(self.backend, "glGenTextures", e))?;

        let stale = drain_errors(|| unsafe { self.gl.get_error() });
        if !stale.is_empty() {
            log::warn!("{}: discarding earlier GL errors {:x?}", self.backend, stale);
        }

        let (result, error) = unsafe {
            self.gl.bind_texture(bind_target, Some(texture));
            let result = self.allocate_storage(storage, info.format as u32);
            let error = self.gl.get_error();
            self.gl.bind_texture(bind_target, None);
            (result, error)
        };

        let result = result.and_then(|()| match error {
            glow::NO_ERROR => Ok(()),
            code => Err(GraphicsError::native(
                self.backend,
                "glTexStorage",
                format!("GL error {:#x}", code),
            )),
        });

        if let Err(e) = result {
            unsafe { self.gl.delete_texture(texture) };
            return Err(e);
        }
        Ok((texture, None))
    }

    fn release_backing(&self, _backing: ()) {}

    fn release_image(&self, image: glow::NativeTexture) {
        unsafe { self.gl.delete_texture(image) };
    }
}

pub struct GlGraphics<W: GlWindow> {
    images: ImageManager<GlImages>,
    swapchain_images: SwapchainImageSet<W::SwapchainImage>,
    context_version: ApiVersion,
    entry_points: EntryPoints,
    // Last: the context must outlive every texture.
    window: W,
}

impl<W: GlWindow> GlGraphics<W> {
    pub fn new(runtime: &dyn XrRuntime) -> Result<Self> {
        let backend = W::BACKEND;
        log::info!("Creating {} context for XR", backend);

        let entry_points = require_entry_points(runtime, &[requirements_entry_point(backend)])?;
        let requirements = runtime.graphics_requirements(backend)?;

        let window = W::create(WINDOW_WIDTH, WINDOW_HEIGHT)?;
        let gl = unsafe { glow::Context::from_loader_function(|name| window.proc_address(name)) };

        let (major, minor) = unsafe {
            (
                gl.get_parameter_i32(glow::MAJOR_VERSION),
                gl.get_parameter_i32(glow::MINOR_VERSION),
            )
        };
        let context_version = ApiVersion::new(major.max(0) as u16, minor.max(0) as u16, 0);
        log::info!("{}: context version {}", backend, context_version);
        check_context_version(backend, context_version, requirements.min_api_version);

        let tex_storage_3d_multisample = {
            let address = window.proc_address("glTexStorage3DMultisample");
            (!address.is_null()).then(|| unsafe {
                std::mem::transmute::<*const c_void, TexStorage3DMultisample>(address)
            })
        };

        let images = ImageManager::new(GlImages {
            gl,
            backend,
            tex_storage_3d_multisample,
        });

        Ok(Self {
            images,
            swapchain_images: SwapchainImageSet::new(),
            context_version,
            entry_points,
            window,
        })
    }

    pub fn gl(&self) -> &glow::Context {
        self.images.backend().gl()
    }

    pub fn context_version(&self) -> ApiVersion {
        self.context_version
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry_points
    }
}

impl<W: GlWindow> Drop for GlGraphics<W> {
    fn drop(&mut self) {
        self.images.release_outstanding();
    }
}

impl<W: GlWindow> GraphicsApi for GlGraphics<W> {
    type Xr = W::Xr;
    type SwapchainImage = W::SwapchainImage;
    type Image = glow::NativeTexture;

    fn backend(&self) -> GraphicsBackend {
        W::BACKEND
    }

    fn graphics_binding(&self) -> <W::Xr as xr::Graphics>::SessionCreateInfo {
        self.window.session_create_info()
    }

    fn allocate_swapchain_image_data(
        &mut self,
        count: u32,
    ) -> &mut SwapchainImageSet<W::SwapchainImage> {
        self.swapchain_images.allocate(count)
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<glow::NativeTexture> {
        self.images.create_image(info)
    }

    fn destroy_image(&self, image: &mut Option<glow::NativeTexture>) {
        self.images.destroy_image(image)
    }

    fn supported_swapchain_formats(&self) -> Vec<i64> {
        swapchain_formats(W::BACKEND, self.context_version.major)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_of(info: ImageCreateInfo) -> u32 {
        let dimension = ImageDimension::try_from(info.dimension).unwrap();
        texture_target(&info, dimension)
    }

    #[test]
    fn targets_follow_dimension_layers_cube_and_samples() {
        let base = ImageCreateInfo::default();
        assert_eq!(target_of(ImageCreateInfo { dimension: 1, ..base }), glow::TEXTURE_1D);
        assert_eq!(
            target_of(ImageCreateInfo { dimension: 1, array_layers: 4, ..base }),
            glow::TEXTURE_1D_ARRAY
        );
        assert_eq!(target_of(base), glow::TEXTURE_2D);
        assert_eq!(target_of(ImageCreateInfo { array_layers: 2, ..base }), glow::TEXTURE_2D_ARRAY);
        assert_eq!(
            target_of(ImageCreateInfo { cubemap: true, array_layers: 6, ..base }),
            glow::TEXTURE_CUBE_MAP
        );
        assert_eq!(
            target_of(ImageCreateInfo { cubemap: true, array_layers: 12, ..base }),
            glow::TEXTURE_CUBE_MAP_ARRAY
        );
        assert_eq!(
            target_of(ImageCreateInfo { sample_count: 4, ..base }),
            glow::TEXTURE_2D_MULTISAMPLE
        );
        assert_eq!(
            target_of(ImageCreateInfo { sample_count: 4, array_layers: 2, ..base }),
            glow::TEXTURE_2D_MULTISAMPLE_ARRAY
        );
        assert_eq!(target_of(ImageCreateInfo { dimension: 3, ..base }), glow::TEXTURE_3D);
    }

    #[test]
    fn one_dimensional_storage_is_a_single_row_2d_texture() {
        let info = ImageCreateInfo {
            dimension: 1,
            width: 256,
            mip_levels: 3,
            ..Default::default()
        };
        let storage = TextureStorage::for_target(&info, glow::TEXTURE_1D);
        assert_eq!(
            storage,
            TextureStorage::Storage2D {
                target: glow::TEXTURE_2D,
                levels: 3,
                width: 256,
                height: 1,
            }
        );
    }

    #[test]
    fn array_targets_store_layers_in_the_last_extent() {
        let info = ImageCreateInfo {
            width: 64,
            height: 64,
            array_layers: 2,
            sample_count: 4,
            ..Default::default()
        };
        assert_eq!(
            TextureStorage::for_target(&info, glow::TEXTURE_2D_MULTISAMPLE_ARRAY),
            TextureStorage::Multisample3D {
                target: glow::TEXTURE_2D_MULTISAMPLE_ARRAY,
                samples: 4,
                width: 64,
                height: 64,
                depth: 2,
            }
        );
        assert_eq!(
            TextureStorage::for_target(&info, glow::TEXTURE_2D_ARRAY).bind_target(),
            glow::TEXTURE_2D_ARRAY
        );
    }

    #[test]
    fn gles_adds_srgb_from_version_three() {
        let gles2 = swapchain_formats(GraphicsBackend::OpenGlEs, 2);
        let gles3 = swapchain_formats(GraphicsBackend::OpenGlEs, 3);
        assert!(!gles2.contains(&i64::from(glow::SRGB8_ALPHA8)));
        assert_eq!(gles3.last(), Some(&i64::from(glow::SRGB8_ALPHA8)));

        let desktop = swapchain_formats(GraphicsBackend::OpenGl, 4);
        assert_eq!(desktop[0], i64::from(glow::RGB10_A2));
        assert_eq!(desktop.len(), 4);
    }

    #[test]
    fn earlier_errors_are_drained_before_storage_checks() {
        let mut queue =
            vec![glow::INVALID_ENUM, glow::INVALID_OPERATION, glow::NO_ERROR].into_iter();
        let drained = drain_errors(|| queue.next().unwrap_or(glow::NO_ERROR));
        assert_eq!(drained, vec![glow::INVALID_ENUM, glow::INVALID_OPERATION]);

        assert!(drain_errors(|| glow::NO_ERROR).is_empty());
    }

    #[test]
    fn draining_stops_when_errors_never_clear() {
        let mut calls = 0;
        let drained = drain_errors(|| {
            calls += 1;
            glow::CONTEXT_LOST
        });
        assert_eq!(drained.len(), MAX_PENDING_ERRORS);
        assert_eq!(calls, MAX_PENDING_ERRORS);
    }

    #[test]
    fn old_context_fails_version_check() {
        let required = ApiVersion::new(4, 3, 0);
        assert!(!check_context_version(GraphicsBackend::OpenGl, ApiVersion::new(4, 1, 0), required));
        assert!(check_context_version(GraphicsBackend::OpenGl, ApiVersion::new(4, 6, 0), required));
    }
}
