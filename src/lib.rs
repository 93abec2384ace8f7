// XR graphics - native graphics API layer for OpenXR sessions
//
// Lets an XR application create its device, swapchain image storage and
// offscreen images the same way on every graphics API the runtime supports.
// The backend is picked once at startup; everything after that is statically
// dispatched through `GraphicsApi`.

pub mod backend;
pub mod error;
pub mod runtime;

pub use backend::{
    check_backend_for_platform, AppInfo, GraphicsApi, GraphicsBackend, ImageCreateInfo, Platform,
};
pub use error::{GraphicsError, Result};
pub use runtime::{ApiVersion, GraphicsRequirements, OpenXrRuntime, XrRuntime};
