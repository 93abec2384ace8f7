//! Error types shared by every backend.

use std::fmt;

use thiserror::Error;

use crate::backend::{GraphicsBackend, Platform};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, GraphicsError>;

#[derive(Debug, Error)]
pub enum GraphicsError {
    /// The backend cannot run on the host platform.
    #[error("{0} is not a valid graphics API on {1}")]
    UnsupportedPlatform(GraphicsBackend, Platform),

    /// The backend was compiled out of this build.
    #[error("{0} support was not compiled in")]
    Unavailable(GraphicsBackend),

    /// A runtime entry point could not be resolved by name.
    #[error("OpenXR entry point {0} is unavailable")]
    MissingEntryPoint(String),

    /// A call into the XR runtime failed.
    #[error("OpenXR: {context}: {result:?}")]
    Runtime {
        context: &'static str,
        result: openxr::sys::Result,
    },

    /// A native graphics API call failed.
    #[error("{backend}: {context}: {message}")]
    Native {
        backend: GraphicsBackend,
        context: &'static str,
        message: String,
    },

    /// Adapter enumeration returned nothing usable.
    #[error("{0}: no adapter available")]
    NoAdapter(GraphicsBackend),

    #[error("{0}: no memory type satisfies the image requirements")]
    NoMemoryType(GraphicsBackend),

    /// Image descriptors only know 1D, 2D and 3D images.
    #[error("unknown image dimension {0}")]
    UnsupportedDimension(u32),
}

impl GraphicsError {
    /// Wrap a failed native call, keeping its error text.
    pub fn native(backend: GraphicsBackend, context: &'static str, err: impl fmt::Display) -> Self {
        Self::Native {
            backend,
            context,
            message: err.to_string(),
        }
    }

    pub fn runtime(context: &'static str, result: openxr::sys::Result) -> Self {
        Self::Runtime { context, result }
    }
}
