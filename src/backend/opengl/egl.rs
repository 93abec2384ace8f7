// EGL helper context for OpenGL ES on Android
//
// A pbuffer surface stands in for the window: the runtime only needs the
// display, config and context handles.

use std::ffi::c_void;
use std::ptr;

use khronos_egl as egl;
use openxr as xr;

use super::GlWindow;
use crate::backend::GraphicsBackend;
use crate::error::{GraphicsError, Result};

const BACKEND: GraphicsBackend = GraphicsBackend::OpenGlEs;

type Egl = egl::DynamicInstance<egl::EGL1_4>;

/// EGL display with a current ES 3 context on an offscreen pbuffer.
pub struct EglWindow {
    egl: Egl,
    display: egl::Display,
    config: egl::Config,
    context: egl::Context,
    surface: egl::Surface,
}

/// Session binding for an EGL context.
pub fn egl_session_create_info(
    display: *mut c_void,
    config: *mut c_void,
    context: *mut c_void,
) -> xr::opengles::SessionCreateInfo {
    xr::opengles::SessionCreateInfo::Android {
        display: display as _,
        config: config as _,
        context: context as _,
    }
}

fn egl_error(context: &'static str, err: impl std::fmt::Display) -> GraphicsError {
    GraphicsError::native(BACKEND, context, err)
}

impl EglWindow {
    fn release(egl: &Egl, display: egl::Display, context: Option<egl::Context>) {
        if let Some(context) = context {
            let _ = egl.destroy_context(display, context);
        }
        let _ = egl.terminate(display);
    }
}

impl GlWindow for EglWindow {
    const BACKEND: GraphicsBackend = BACKEND;
    type Xr = xr::OpenGlEs;
    type SwapchainImage = xr::sys::SwapchainImageOpenGLESKHR;

    fn create(width: u32, height: u32) -> Result<Self> {
        let egl = unsafe { Egl::load_required() }.map_err(|e| egl_error("load libEGL", e))?;

        let display = unsafe { egl.get_display(egl::DEFAULT_DISPLAY) }
            .ok_or_else(|| egl_error("eglGetDisplay", "no default display"))?;
        let (major, minor) = egl
            .initialize(display)
            .map_err(|e| egl_error("eglInitialize", e))?;
        log::debug!("OpenGL ES: EGL {}.{}", major, minor);

        let config_attribs = [
            egl::RENDERABLE_TYPE,
            egl::OPENGL_ES3_BIT,
            egl::SURFACE_TYPE,
            egl::PBUFFER_BIT,
            egl::RED_SIZE,
            8,
            egl::GREEN_SIZE,
            8,
            egl::BLUE_SIZE,
            8,
            egl::ALPHA_SIZE,
            8,
            egl::DEPTH_SIZE,
            0,
            egl::NONE,
        ];
        let config = match egl.choose_first_config(display, &config_attribs) {
            Ok(Some(config)) => config,
            Ok(None) => {
                Self::release(&egl, display, None);
                return Err(egl_error("eglChooseConfig", "no matching config"));
            }
            Err(e) => {
                Self::release(&egl, display, None);
                return Err(egl_error("eglChooseConfig", e));
            }
        };

        if let Err(e) = egl.bind_api(egl::OPENGL_ES_API) {
            Self::release(&egl, display, None);
            return Err(egl_error("eglBindAPI", e));
        }

        let context_attribs = [egl::CONTEXT_CLIENT_VERSION, 3, egl::NONE];
        let context = match egl.create_context(display, config, None, &context_attribs) {
            Ok(context) => context,
            Err(e) => {
                Self::release(&egl, display, None);
                return Err(egl_error("eglCreateContext", e));
            }
        };

        let surface_attribs = [egl::WIDTH, width as i32, egl::HEIGHT, height as i32, egl::NONE];
        let surface = match egl.create_pbuffer_surface(display, config, &surface_attribs) {
            Ok(surface) => surface,
            Err(e) => {
                Self::release(&egl, display, Some(context));
                return Err(egl_error("eglCreatePbufferSurface", e));
            }
        };

        if let Err(e) = egl.make_current(display, Some(surface), Some(surface), Some(context)) {
            let _ = egl.destroy_surface(display, surface);
            Self::release(&egl, display, Some(context));
            return Err(egl_error("eglMakeCurrent", e));
        }

        log::debug!("OpenGL ES: EGL context on a {}x{} pbuffer", width, height);
        Ok(Self {
            egl,
            display,
            config,
            context,
            surface,
        })
    }

    fn proc_address(&self, name: &str) -> *const c_void {
        self.egl
            .get_proc_address(name)
            .map_or(ptr::null(), |function| function as *const c_void)
    }

    fn session_create_info(&self) -> xr::opengles::SessionCreateInfo {
        egl_session_create_info(
            self.display.as_ptr(),
            self.config.as_ptr(),
            self.context.as_ptr(),
        )
    }
}

impl Drop for EglWindow {
    fn drop(&mut self) {
        let _ = self.egl.make_current(self.display, None, None, None);
        let _ = self.egl.destroy_surface(self.display, self.surface);
        let _ = self.egl.destroy_context(self.display, self.context);
        let _ = self.egl.terminate(self.display);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_carries_display_config_and_context() {
        let display = 0x10 as *mut c_void;
        let config = 0x20 as *mut c_void;
        let context = 0x30 as *mut c_void;

        match egl_session_create_info(display, config, context) {
            xr::opengles::SessionCreateInfo::Android {
                display: d,
                config: c,
                context: x,
            } => {
                assert_eq!(d as usize, 0x10);
                assert_eq!(c as usize, 0x20);
                assert_eq!(x as usize, 0x30);
            }
        }
    }
}
