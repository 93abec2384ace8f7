// WGL helper window for desktop OpenGL on Windows

use std::ffi::{c_void, CString};
use std::ptr;

use openxr as xr;
use windows::core::{w, PCSTR};
use windows::Win32::Foundation::{HMODULE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Gdi::{GetDC, ReleaseDC, HDC};
use windows::Win32::Graphics::OpenGL::{
    wglCreateContext, wglDeleteContext, wglGetProcAddress, wglMakeCurrent, ChoosePixelFormat,
    SetPixelFormat, HGLRC, PFD_DOUBLEBUFFER, PFD_DRAW_TO_WINDOW, PFD_SUPPORT_OPENGL,
    PFD_TYPE_RGBA, PIXELFORMATDESCRIPTOR,
};
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress, LoadLibraryW};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, RegisterClassW, CS_OWNDC, WINDOW_EX_STYLE,
    WNDCLASSW, WS_OVERLAPPEDWINDOW,
};

use super::GlWindow;
use crate::backend::GraphicsBackend;
use crate::error::{GraphicsError, Result};

const BACKEND: GraphicsBackend = GraphicsBackend::OpenGl;

/// Hidden Win32 window with a current WGL context.
pub struct WglWindow {
    window: HWND,
    hdc: HDC,
    hglrc: HGLRC,
    opengl32: HMODULE,
}

/// Session binding for a WGL context.
pub fn wgl_session_create_info(
    hdc: *mut c_void,
    hglrc: *mut c_void,
) -> xr::opengl::SessionCreateInfo {
    xr::opengl::SessionCreateInfo::Windows {
        h_dc: hdc as _,
        h_glrc: hglrc as _,
    }
}

/// `wglGetProcAddress` reports failure with a handful of small sentinels,
/// not just null. Core 1.1 functions always come back that way.
pub fn is_valid_wgl_address(address: isize) -> bool {
    !matches!(address, -1 | 0 | 1 | 2 | 3)
}

unsafe extern "system" fn window_proc(
    window: HWND,
    message: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    DefWindowProcW(window, message, wparam, lparam)
}

fn wgl_error(context: &'static str, err: impl std::fmt::Display) -> GraphicsError {
    GraphicsError::native(BACKEND, context, err)
}

impl GlWindow for WglWindow {
    const BACKEND: GraphicsBackend = BACKEND;
    type Xr = xr::OpenGL;
    type SwapchainImage = xr::sys::SwapchainImageOpenGLKHR;

    fn create(width: u32, height: u32) -> Result<Self> {
        unsafe {
            let instance =
                GetModuleHandleW(None).map_err(|e| wgl_error("GetModuleHandleW", e))?;
            let opengl32 =
                LoadLibraryW(w!("opengl32.dll")).map_err(|e| wgl_error("LoadLibraryW", e))?;

            let class_name = w!("xr-graphics-gl");
            let class = WNDCLASSW {
                style: CS_OWNDC,
                lpfnWndProc: Some(window_proc),
                hInstance: instance.into(),
                lpszClassName: class_name,
                ..Default::default()
            };
            // Zero when already registered by an earlier helper.
            RegisterClassW(&class);

            let window = CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                class_name,
                w!("xr-graphics"),
                WS_OVERLAPPEDWINDOW,
                0,
                0,
                width as i32,
                height as i32,
                None,
                None,
                Some(instance.into()),
                None,
            )
            .map_err(|e| wgl_error("CreateWindowExW", e))?;

            let hdc = GetDC(Some(window));
            let pixel_format = PIXELFORMATDESCRIPTOR {
                nSize: std::mem::size_of::<PIXELFORMATDESCRIPTOR>() as u16,
                nVersion: 1,
                dwFlags: PFD_DRAW_TO_WINDOW | PFD_SUPPORT_OPENGL | PFD_DOUBLEBUFFER,
                iPixelType: PFD_TYPE_RGBA,
                cColorBits: 32,
                cDepthBits: 24,
                cStencilBits: 8,
                ..Default::default()
            };

            let format = ChoosePixelFormat(hdc, &pixel_format);
            if format == 0 {
                ReleaseDC(Some(window), hdc);
                let _ = DestroyWindow(window);
                return Err(wgl_error("ChoosePixelFormat", "no matching pixel format"));
            }
            if let Err(e) = SetPixelFormat(hdc, format, &pixel_format) {
                ReleaseDC(Some(window), hdc);
                let _ = DestroyWindow(window);
                return Err(wgl_error("SetPixelFormat", e));
            }

            let hglrc = match wglCreateContext(hdc) {
                Ok(hglrc) => hglrc,
                Err(e) => {
                    ReleaseDC(Some(window), hdc);
                    let _ = DestroyWindow(window);
                    return Err(wgl_error("wglCreateContext", e));
                }
            };

            if let Err(e) = wglMakeCurrent(hdc, hglrc) {
                let _ = wglDeleteContext(hglrc);
                ReleaseDC(Some(window), hdc);
                let _ = DestroyWindow(window);
                return Err(wgl_error("wglMakeCurrent", e));
            }

            log::debug!("OpenGL: WGL context on a {}x{} window", width, height);
            Ok(Self {
                window,
                hdc,
                hglrc,
                opengl32,
            })
        }
    }

    fn proc_address(&self, name: &str) -> *const c_void {
        let Ok(name) = CString::new(name) else {
            return ptr::null();
        };
        let name = PCSTR(name.as_ptr() as *const u8);
        unsafe {
            let address = wglGetProcAddress(name).map_or(0, |function| function as isize);
            if is_valid_wgl_address(address) {
                return address as *const c_void;
            }
            GetProcAddress(self.opengl32, name)
                .map_or(ptr::null(), |function| function as *const c_void)
        }
    }

    fn session_create_info(&self) -> xr::opengl::SessionCreateInfo {
        wgl_session_create_info(self.hdc.0 as *mut c_void, self.hglrc.0 as *mut c_void)
    }
}

impl Drop for WglWindow {
    fn drop(&mut self) {
        unsafe {
            let _ = wglMakeCurrent(HDC::default(), HGLRC::default());
            let _ = wglDeleteContext(self.hglrc);
            ReleaseDC(Some(self.window), self.hdc);
            let _ = DestroyWindow(self.window);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_carries_device_and_render_context() {
        let hdc = 0x40 as *mut c_void;
        let hglrc = 0x50 as *mut c_void;

        match wgl_session_create_info(hdc, hglrc) {
            xr::opengl::SessionCreateInfo::Windows { h_dc, h_glrc } => {
                assert_eq!(h_dc as usize, 0x40);
                assert_eq!(h_glrc as usize, 0x50);
            }
            _ => panic!("expected the Windows binding"),
        }
    }

    #[test]
    fn wgl_failure_sentinels_are_rejected() {
        for sentinel in [-1, 0, 1, 2, 3] {
            assert!(!is_valid_wgl_address(sentinel));
        }
        assert!(is_valid_wgl_address(0x7ff0_1234));
    }
}
