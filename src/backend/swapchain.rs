// Swapchain Image Allocator
//
// The runtime owns swapchain images; we only provide the array of typed
// records it writes native handles into. Each record is pre-tagged with its
// structure type so the runtime can fill it through the common base header.

use std::ptr;

use openxr as xr;

/// One runtime-filled swapchain image record.
pub trait SwapchainImage: Clone {
    /// Native handle the runtime writes into the record.
    type Native: Copy;

    /// An empty record carrying its structure type.
    fn tagged() -> Self;

    fn native(&self) -> Self::Native;
}

impl SwapchainImage for xr::sys::SwapchainImageVulkanKHR {
    type Native = u64;

    fn tagged() -> Self {
        Self {
            ty: Self::TYPE,
            next: ptr::null_mut(),
            image: 0,
        }
    }

    fn native(&self) -> u64 {
        self.image
    }
}

impl SwapchainImage for xr::sys::SwapchainImageOpenGLKHR {
    type Native = u32;

    fn tagged() -> Self {
        Self {
            ty: Self::TYPE,
            next: ptr::null_mut(),
            image: 0,
        }
    }

    fn native(&self) -> u32 {
        self.image
    }
}

#[cfg(target_os = "android")]
impl SwapchainImage for xr::sys::SwapchainImageOpenGLESKHR {
    type Native = u32;

    fn tagged() -> Self {
        Self {
            ty: Self::TYPE,
            next: ptr::null_mut(),
            image: 0,
        }
    }

    fn native(&self) -> u32 {
        self.image
    }
}

#[cfg(windows)]
impl SwapchainImage for xr::sys::SwapchainImageD3D11KHR {
    type Native = *mut std::ffi::c_void;

    fn tagged() -> Self {
        Self {
            ty: Self::TYPE,
            next: ptr::null_mut(),
            texture: ptr::null_mut(),
        }
    }

    fn native(&self) -> Self::Native {
        self.texture as *mut _
    }
}

#[cfg(windows)]
impl SwapchainImage for xr::sys::SwapchainImageD3D12KHR {
    type Native = *mut std::ffi::c_void;

    fn tagged() -> Self {
        Self {
            ty: Self::TYPE,
            next: ptr::null_mut(),
            texture: ptr::null_mut(),
        }
    }

    fn native(&self) -> Self::Native {
        self.texture as *mut _
    }
}

/// Backend-owned array of swapchain image records.
///
/// Valid until the next `allocate` or until the owning backend is dropped.
#[derive(Debug, Clone)]
pub struct SwapchainImageSet<T> {
    images: Vec<T>,
}

impl<T> Default for SwapchainImageSet<T> {
    fn default() -> Self {
        Self { images: Vec::new() }
    }
}

impl<T: SwapchainImage> SwapchainImageSet<T> {
    pub fn new() -> Self {
        Self { images: Vec::new() }
    }

    /// Replace the set with `count` freshly tagged records.
    pub fn allocate(&mut self, count: u32) -> &mut Self {
        self.images.clear();
        self.images.resize(count as usize, T::tagged());
        self
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[T] {
        &self.images
    }

    /// The records as the runtime sees them. Every record starts with the
    /// base header layout, so the array can be handed over as-is.
    pub fn as_base_header_mut(&mut self) -> *mut xr::sys::SwapchainImageBaseHeader {
        self.images.as_mut_ptr() as *mut xr::sys::SwapchainImageBaseHeader
    }

    pub fn native_images(&self) -> Vec<T::Native> {
        self.images.iter().map(|image| image.native()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_length_matches_count() {
        let mut set = SwapchainImageSet::<xr::sys::SwapchainImageVulkanKHR>::new();
        assert_eq!(set.allocate(3).len(), 3);
        assert!(set
            .images()
            .iter()
            .all(|image| image.ty == xr::sys::SwapchainImageVulkanKHR::TYPE && image.image == 0));
    }

    #[test]
    fn reallocation_replaces_previous_set() {
        let mut set = SwapchainImageSet::<xr::sys::SwapchainImageOpenGLKHR>::new();
        set.allocate(4);
        assert_eq!(set.allocate(2).len(), 2);
        assert_eq!(set.native_images(), vec![0, 0]);

        set.allocate(0);
        assert!(set.is_empty());
    }

    #[test]
    fn base_header_points_at_first_record() {
        let mut set = SwapchainImageSet::<xr::sys::SwapchainImageVulkanKHR>::new();
        set.allocate(2);
        let header = set.as_base_header_mut();
        assert_eq!(
            unsafe { (*header).ty },
            xr::sys::SwapchainImageVulkanKHR::TYPE
        );
    }
}
