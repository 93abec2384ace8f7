// GLX helper window for desktop OpenGL on X11

use std::ffi::{c_void, CString};
use std::ptr;

use openxr as xr;
use x11::{glx, xlib};

use super::GlWindow;
use crate::backend::GraphicsBackend;
use crate::error::{GraphicsError, Result};

const BACKEND: GraphicsBackend = GraphicsBackend::OpenGl;

/// Unmapped-size X11 window with a current GLX context.
pub struct XlibGlWindow {
    display: *mut xlib::Display,
    fb_config: glx::GLXFBConfig,
    visualid: u64,
    drawable: glx::GLXDrawable,
    context: glx::GLXContext,
}

/// Session binding for a GLX context.
pub fn xlib_session_create_info(
    display: *mut c_void,
    visualid: u64,
    fb_config: *mut c_void,
    drawable: glx::GLXDrawable,
    context: *mut c_void,
) -> xr::opengl::SessionCreateInfo {
    xr::opengl::SessionCreateInfo::Xlib {
        x_display: display as _,
        visualid: visualid as u32,
        glx_fb_config: fb_config as _,
        glx_drawable: drawable,
        glx_context: context as _,
    }
}

fn glx_error(context: &'static str) -> GraphicsError {
    GraphicsError::native(BACKEND, context, "call failed")
}

impl GlWindow for XlibGlWindow {
    const BACKEND: GraphicsBackend = BACKEND;
    type Xr = xr::OpenGL;
    type SwapchainImage = xr::sys::SwapchainImageOpenGLKHR;

    fn create(width: u32, height: u32) -> Result<Self> {
        unsafe {
            let display = xlib::XOpenDisplay(ptr::null());
            if display.is_null() {
                return Err(glx_error("XOpenDisplay"));
            }

            let screen = xlib::XDefaultScreen(display);
            let attrs = [
                glx::GLX_X_RENDERABLE,
                1,
                glx::GLX_DRAWABLE_TYPE,
                glx::GLX_WINDOW_BIT,
                glx::GLX_RENDER_TYPE,
                glx::GLX_RGBA_BIT,
                glx::GLX_X_VISUAL_TYPE,
                glx::GLX_TRUE_COLOR,
                glx::GLX_RED_SIZE,
                8,
                glx::GLX_GREEN_SIZE,
                8,
                glx::GLX_BLUE_SIZE,
                8,
                glx::GLX_ALPHA_SIZE,
                8,
                glx::GLX_DEPTH_SIZE,
                24,
                glx::GLX_DOUBLEBUFFER,
                1,
                0,
            ];

            let mut config_count = 0;
            let fb_configs =
                glx::glXChooseFBConfig(display, screen, attrs.as_ptr(), &mut config_count);
            if fb_configs.is_null() || config_count == 0 {
                xlib::XCloseDisplay(display);
                return Err(glx_error("glXChooseFBConfig"));
            }
            let fb_config = *fb_configs;

            let visual_info = glx::glXGetVisualFromFBConfig(display, fb_config);
            if visual_info.is_null() {
                xlib::XFree(fb_configs as *mut _);
                xlib::XCloseDisplay(display);
                return Err(glx_error("glXGetVisualFromFBConfig"));
            }
            let visualid = (*visual_info).visualid;

            let root = xlib::XDefaultRootWindow(display);
            let colormap =
                xlib::XCreateColormap(display, root, (*visual_info).visual, xlib::AllocNone);
            let mut attributes: xlib::XSetWindowAttributes = std::mem::zeroed();
            attributes.colormap = colormap;

            let window = xlib::XCreateWindow(
                display,
                root,
                0,
                0,
                width,
                height,
                0,
                (*visual_info).depth,
                xlib::InputOutput as u32,
                (*visual_info).visual,
                xlib::CWColormap,
                &mut attributes,
            );
            if let Ok(title) = CString::new("xr-graphics") {
                xlib::XStoreName(display, window, title.as_ptr());
            }

            xlib::XFree(visual_info as *mut _);
            xlib::XFree(fb_configs as *mut _);

            let context =
                glx::glXCreateNewContext(display, fb_config, glx::GLX_RGBA_TYPE, ptr::null_mut(), 1);
            if context.is_null() {
                xlib::XDestroyWindow(display, window);
                xlib::XCloseDisplay(display);
                return Err(glx_error("glXCreateNewContext"));
            }

            if glx::glXMakeCurrent(display, window, context) == 0 {
                glx::glXDestroyContext(display, context);
                xlib::XDestroyWindow(display, window);
                xlib::XCloseDisplay(display);
                return Err(glx_error("glXMakeCurrent"));
            }

            log::debug!("OpenGL: GLX context on a {}x{} window", width, height);
            Ok(Self {
                display,
                fb_config,
                visualid,
                drawable: window,
                context,
            })
        }
    }

    fn proc_address(&self, name: &str) -> *const c_void {
        let Ok(name) = CString::new(name) else {
            return ptr::null();
        };
        unsafe {
            glx::glXGetProcAddress(name.as_ptr() as *const u8)
                .map_or(ptr::null(), |function| function as *const c_void)
        }
    }

    fn session_create_info(&self) -> xr::opengl::SessionCreateInfo {
        xlib_session_create_info(
            self.display as *mut c_void,
            self.visualid,
            self.fb_config as *mut c_void,
            self.drawable,
            self.context as *mut c_void,
        )
    }
}

impl Drop for XlibGlWindow {
    fn drop(&mut self) {
        unsafe {
            glx::glXMakeCurrent(self.display, 0, ptr::null_mut());
            glx::glXDestroyContext(self.display, self.context);
            xlib::XDestroyWindow(self.display, self.drawable);
            xlib::XCloseDisplay(self.display);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_carries_glx_handles() {
        let info = xlib_session_create_info(
            0x10 as *mut c_void,
            0x21,
            0x30 as *mut c_void,
            0x44,
            0x50 as *mut c_void,
        );
        match info {
            xr::opengl::SessionCreateInfo::Xlib {
                x_display,
                visualid,
                glx_fb_config,
                glx_drawable,
                glx_context,
            } => {
                assert_eq!(x_display as usize, 0x10);
                assert_eq!(visualid, 0x21);
                assert_eq!(glx_fb_config as usize, 0x30);
                assert_eq!(glx_drawable, 0x44);
                assert_eq!(glx_context as usize, 0x50);
            }
            _ => panic!("expected the Xlib binding"),
        }
    }
}
