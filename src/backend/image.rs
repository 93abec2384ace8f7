// Image Resource Manager
//
// Backend-neutral image creation and destruction:
// - descriptor validation and usage derivation (shared by all backends)
// - per-backend native creation through `ImageBackend`
// - the allocation record pairing each image with its backing (heap/memory)
//
// Destroy order is fixed: record entry removed, backing released, image
// released, caller handle cleared. Teardown destroys whatever is left.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::GraphicsBackend;
use crate::error::{GraphicsError, Result};

/// Description of an image to create. `format` is the backend's native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCreateInfo {
    /// 1, 2 or 3. Anything else is rejected.
    pub dimension: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub sample_count: u32,
    pub format: i64,
    pub sampled: bool,
    pub color_attachment: bool,
    pub depth_attachment: bool,
    pub cubemap: bool,
}

impl Default for ImageCreateInfo {
    fn default() -> Self {
        Self {
            dimension: 2,
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            sample_count: 1,
            format: 0,
            sampled: false,
            color_attachment: false,
            depth_attachment: false,
            cubemap: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageDimension {
    D1,
    D2,
    D3,
}

impl TryFrom<u32> for ImageDimension {
    type Error = GraphicsError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(ImageDimension::D1),
            2 => Ok(ImageDimension::D2),
            3 => Ok(ImageDimension::D3),
            other => Err(GraphicsError::UnsupportedDimension(other)),
        }
    }
}

/// Capability flags every backend translates into its own bind/usage bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageUsage {
    pub shader_resource: bool,
    pub render_target: bool,
    pub depth_stencil: bool,
    pub generate_mips: bool,
    /// Only ever set for 2D images.
    pub cube_compatible: bool,
    pub multisample: bool,
}

impl ImageUsage {
    pub fn derive(info: &ImageCreateInfo, dimension: ImageDimension) -> Self {
        Self {
            shader_resource: info.sampled,
            render_target: info.color_attachment,
            depth_stencil: info.depth_attachment,
            generate_mips: info.mip_levels > 1,
            cube_compatible: info.cubemap && dimension == ImageDimension::D2,
            multisample: info.sample_count > 1,
        }
    }
}

/// Optimized clear value handed to backends that accept one at creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u8 },
}

impl ClearValue {
    /// Color targets clear to transparent black, depth targets to 0.0/0.
    ///
    /// When both are requested the depth clear replaces the color one.
    pub fn for_usage(usage: &ImageUsage) -> Option<Self> {
        let mut clear = None;
        if usage.render_target {
            clear = Some(ClearValue::Color([0.0; 4]));
        }
        if usage.depth_stencil {
            clear = Some(ClearValue::DepthStencil {
                depth: 0.0,
                stencil: 0,
            });
        }
        clear
    }
}

/// One live image and, when it has one, the allocation backing it.
#[derive(Debug)]
pub struct RecordEntry<I, B> {
    pub image: I,
    pub backing: Option<B>,
}

/// Live images keyed by their identity. Backends with implicit storage
/// record entries without a backing.
#[derive(Debug)]
pub struct AllocationRecord<I, B> {
    entries: HashMap<u64, RecordEntry<I, B>>,
}

impl<I, B> Default for AllocationRecord<I, B> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<I, B> AllocationRecord<I, B> {
    /// Returns the previous entry if `key` was already recorded.
    pub fn insert(&mut self, key: u64, image: I, backing: Option<B>) -> Option<RecordEntry<I, B>> {
        self.entries.insert(key, RecordEntry { image, backing })
    }

    pub fn remove(&mut self, key: u64) -> Option<RecordEntry<I, B>> {
        self.entries.remove(&key)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
    }

    /// Number of live images.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of live images holding a backing allocation.
    pub fn backing_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.backing.is_some())
            .count()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (u64, RecordEntry<I, B>)> + '_ {
        self.entries.drain()
    }
}

/// Native half of image management, implemented once per graphics API.
pub trait ImageBackend {
    /// Cloning yields another reference to the same native image.
    type Image: Clone;
    /// Separate allocation giving the image its storage. `()` where the
    /// driver manages storage implicitly.
    type Backing;

    fn backend(&self) -> GraphicsBackend;

    /// Stable identity of a native image, used as the record key.
    fn image_key(image: &Self::Image) -> u64;

    /// Create the native image. `Some(backing)` when it owns a separate
    /// allocation that must be released with it.
    fn create(
        &self,
        info: &ImageCreateInfo,
        dimension: ImageDimension,
        usage: &ImageUsage,
    ) -> Result<(Self::Image, Option<Self::Backing>)>;

    fn release_backing(&self, backing: Self::Backing);

    fn release_image(&self, image: Self::Image);
}

/// Creates and destroys images, keeping images and backing allocations paired.
pub struct ImageManager<B: ImageBackend> {
    backend: B,
    record: Mutex<AllocationRecord<B::Image, B::Backing>>,
}

impl<B: ImageBackend> ImageManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            record: Mutex::new(AllocationRecord::default()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn create_image(&self, info: &ImageCreateInfo) -> Result<B::Image> {
        let api = self.backend.backend();
        let dimension = ImageDimension::try_from(info.dimension).map_err(|e| {
            log::error!("{}: {}", api, e);
            e
        })?;
        let usage = ImageUsage::derive(info, dimension);

        let (image, backing) = self.backend.create(info, dimension, &usage)?;

        let key = B::image_key(&image);
        let stale = self.record.lock().insert(key, image.clone(), backing);
        // A reused key means the old image is already gone; only its backing is left.
        if let Some(RecordEntry {
            backing: Some(stale),
            ..
        }) = stale
        {
            log::error!("{}: image {:#x} already had a backing allocation", api, key);
            self.backend.release_backing(stale);
        }

        log::debug!(
            "{}: created {:?} image {}x{}x{} (mips {}, layers {}, samples {})",
            api,
            dimension,
            info.width,
            info.height,
            info.depth,
            info.mip_levels,
            info.array_layers,
            info.sample_count
        );
        Ok(image)
    }

    /// Release `image` and whatever backs it, leaving `None` behind.
    pub fn destroy_image(&self, image: &mut Option<B::Image>) {
        let Some(native) = image.take() else {
            log::warn!("{}: destroy_image called with a null handle", self.backend.backend());
            return;
        };

        let key = B::image_key(&native);
        let entry = self.record.lock().remove(key);
        match entry {
            Some(RecordEntry { image: recorded, backing }) => {
                if let Some(backing) = backing {
                    self.backend.release_backing(backing);
                }
                drop(recorded);
            }
            None => log::warn!(
                "{}: image {:#x} was not created by this manager",
                self.backend.backend(),
                key
            ),
        }
        self.backend.release_image(native);
    }

    /// Number of images created and not yet destroyed.
    pub fn live_images(&self) -> usize {
        self.record.lock().len()
    }

    /// Number of live images that hold a backing allocation.
    pub fn live_allocations(&self) -> usize {
        self.record.lock().backing_count()
    }

    /// Destroy every image still on record, backing first. Run before the
    /// device that owns them is destroyed.
    pub fn release_outstanding(&self) {
        let outstanding: Vec<_> = self.record.lock().drain().collect();
        if outstanding.is_empty() {
            return;
        }

        log::warn!(
            "{}: destroying {} image(s) never destroyed by their owner",
            self.backend.backend(),
            outstanding.len()
        );
        for (_, entry) in outstanding {
            if let Some(backing) = entry.backing {
                self.backend.release_backing(backing);
            }
            self.backend.release_image(entry.image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct FakeBackend {
        next: Cell<u64>,
        released_backings: RefCell<Vec<u64>>,
        released_images: RefCell<Vec<u64>>,
        calls: Cell<u32>,
    }

    impl ImageBackend for FakeBackend {
        type Image = u64;
        type Backing = u64;

        fn backend(&self) -> GraphicsBackend {
            GraphicsBackend::Vulkan
        }

        fn image_key(image: &u64) -> u64 {
            *image
        }

        fn create(
            &self,
            _info: &ImageCreateInfo,
            _dimension: ImageDimension,
            _usage: &ImageUsage,
        ) -> Result<(u64, Option<u64>)> {
            self.calls.set(self.calls.get() + 1);
            let id = self.next.get() + 1;
            self.next.set(id);
            Ok((id, Some(id + 1000)))
        }

        fn release_backing(&self, backing: u64) {
            self.released_backings.borrow_mut().push(backing);
        }

        fn release_image(&self, image: u64) {
            // The backing must already be gone by the time the image goes.
            assert!(self.released_backings.borrow().contains(&(image + 1000)));
            self.released_images.borrow_mut().push(image);
        }
    }

    #[test]
    fn usage_derivation_follows_descriptor_flags() {
        let info = ImageCreateInfo {
            mip_levels: 4,
            sample_count: 4,
            sampled: true,
            color_attachment: true,
            ..Default::default()
        };
        let usage = ImageUsage::derive(&info, ImageDimension::D2);
        assert!(usage.shader_resource && usage.render_target);
        assert!(!usage.depth_stencil);
        assert!(usage.generate_mips);
        assert!(usage.multisample);

        let single_mip = ImageUsage::derive(&ImageCreateInfo::default(), ImageDimension::D2);
        assert!(!single_mip.generate_mips);
        assert!(!single_mip.multisample);
    }

    #[test]
    fn cube_compatibility_only_for_2d() {
        let info = ImageCreateInfo {
            cubemap: true,
            array_layers: 6,
            ..Default::default()
        };
        assert!(ImageUsage::derive(&info, ImageDimension::D2).cube_compatible);
        assert!(!ImageUsage::derive(&info, ImageDimension::D1).cube_compatible);
        assert!(!ImageUsage::derive(&info, ImageDimension::D3).cube_compatible);
    }

    #[test]
    fn depth_clear_replaces_color_clear() {
        let both = ImageUsage {
            render_target: true,
            depth_stencil: true,
            ..Default::default()
        };
        assert_eq!(
            ClearValue::for_usage(&both),
            Some(ClearValue::DepthStencil {
                depth: 0.0,
                stencil: 0
            })
        );

        let color = ImageUsage {
            render_target: true,
            ..Default::default()
        };
        assert_eq!(ClearValue::for_usage(&color), Some(ClearValue::Color([0.0; 4])));
        assert_eq!(ClearValue::for_usage(&ImageUsage::default()), None);
    }

    #[test]
    fn invalid_dimension_never_reaches_the_backend() {
        let manager = ImageManager::new(FakeBackend::default());
        let info = ImageCreateInfo {
            dimension: 4,
            ..Default::default()
        };

        let err = manager.create_image(&info).unwrap_err();
        assert!(matches!(err, GraphicsError::UnsupportedDimension(4)));
        assert_eq!(manager.backend().calls.get(), 0);
        assert_eq!(manager.live_allocations(), 0);
    }

    #[test]
    fn destroy_releases_backing_before_image_and_clears_handle() {
        let manager = ImageManager::new(FakeBackend::default());
        let mut image = Some(manager.create_image(&ImageCreateInfo::default()).unwrap());
        assert_eq!(manager.live_allocations(), 1);

        manager.destroy_image(&mut image);
        assert!(image.is_none());
        assert_eq!(manager.live_allocations(), 0);
        assert_eq!(*manager.backend().released_backings.borrow(), vec![1001]);
        assert_eq!(*manager.backend().released_images.borrow(), vec![1]);

        // A second destroy on the cleared handle is a no-op.
        manager.destroy_image(&mut image);
        assert_eq!(manager.backend().released_images.borrow().len(), 1);
    }

    #[test]
    fn teardown_destroys_live_images_after_their_backing() {
        let manager = ImageManager::new(FakeBackend::default());
        let _a = manager.create_image(&ImageCreateInfo::default()).unwrap();
        let _b = manager.create_image(&ImageCreateInfo::default()).unwrap();
        assert_eq!(manager.live_images(), 2);

        manager.release_outstanding();
        assert_eq!(manager.live_images(), 0);
        assert_eq!(manager.live_allocations(), 0);

        let mut backings = manager.backend().released_backings.borrow().clone();
        backings.sort_unstable();
        assert_eq!(backings, vec![1001, 1002]);
        let mut images = manager.backend().released_images.borrow().clone();
        images.sort_unstable();
        assert_eq!(images, vec![1, 2]);
    }

    #[test]
    fn record_tracks_images_without_backing() {
        let mut record: AllocationRecord<u32, ()> = AllocationRecord::default();
        assert!(record.insert(7, 7, None).is_none());
        assert!(record.contains(7));
        assert_eq!(record.len(), 1);
        assert_eq!(record.backing_count(), 0);

        let entry = record.remove(7).unwrap();
        assert_eq!(entry.image, 7);
        assert!(entry.backing.is_none());
        assert!(record.is_empty());
    }
}
