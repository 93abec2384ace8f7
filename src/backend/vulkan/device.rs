// Vulkan Device - runtime-negotiated instance and device
//
// Responsibilities:
// - Instance creation with the extensions the runtime asks for
// - Physical device: whichever one the runtime renders on
// - Logical device with one queue per queue family
//
// Extension lists are intersected with what the driver offers; the active
// sets are kept for the lifetime of the device.

use std::ffi::{CStr, CString};

use ash::vk::{self, Handle};
use ash::Entry;

use crate::backend::adapter::select_requested;
use crate::backend::extensions::{
    negotiate_extensions, require_entry_points, EntryPoints, VULKAN_ENTRY_POINTS,
};
use crate::backend::{AppInfo, GraphicsBackend};
use crate::error::{GraphicsError, Result};
use crate::runtime::{ApiVersion, XrRuntime};

const BACKEND: GraphicsBackend = GraphicsBackend::Vulkan;

/// Vulkan instance + device bound to the runtime's physical device
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    /// Queue the session submits on
    pub queue_family_index: u32,
    pub queue_index: u32,

    pub instance_extensions: Vec<CString>,
    pub device_extensions: Vec<CString>,

    pub memory_properties: vk::PhysicalDeviceMemoryProperties,

    /// Runtime functions resolved before any native call
    pub entry_points: EntryPoints,
}

impl VulkanDevice {
    pub fn new(runtime: &dyn XrRuntime, app: &AppInfo) -> Result<Self> {
        log::info!("Creating Vulkan device for XR: {}", app.application_name);

        // Step 1: Runtime entry points and requirements
        let entry_points = require_entry_points(runtime, &VULKAN_ENTRY_POINTS)?;
        let requirements = runtime.graphics_requirements(BACKEND)?;
        log::info!(
            "Vulkan: runtime supports API {} to {}",
            requirements.min_api_version,
            requirements.max_api_version
        );

        // Step 2: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .map_err(|e| GraphicsError::native(BACKEND, "load Vulkan library", e))?;

        // Step 3: Create instance
        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(|e| GraphicsError::native(BACKEND, "vkEnumerateInstanceExtensionProperties", e))?;
        let instance_extensions =
            negotiate_extensions(&runtime.vulkan_instance_extensions()?, &extension_names(&available));
        let instance = Self::create_instance(
            &entry,
            app,
            requirements.min_api_version,
            &instance_extensions,
        )?;

        // Everything below must not leak the instance on failure.
        match Self::create_on_instance(runtime, &instance) {
            Ok((physical_device, device, device_extensions, memory_properties)) => {
                log::info!(
                    "Vulkan: enabled {} instance and {} device extension(s)",
                    instance_extensions.len(),
                    device_extensions.len()
                );
                Ok(Self {
                    device,
                    physical_device,
                    instance,
                    _entry: entry,
                    queue_family_index: 0,
                    queue_index: 0,
                    instance_extensions,
                    device_extensions,
                    memory_properties,
                    entry_points,
                })
            }
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    fn create_instance(
        entry: &Entry,
        app: &AppInfo,
        api_version: ApiVersion,
        extensions: &[CString],
    ) -> Result<ash::Instance> {
        let app_name = CString::new(app.application_name.as_str())
            .map_err(|e| GraphicsError::native(BACKEND, "application name", e))?;
        let engine_name = CString::new(app.engine_name.as_str())
            .map_err(|e| GraphicsError::native(BACKEND, "engine name", e))?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(1)
            .engine_name(&engine_name)
            .engine_version(1)
            .api_version(vk::make_api_version(
                0,
                u32::from(api_version.major),
                u32::from(api_version.minor),
                api_version.patch,
            ));

        let extension_ptrs: Vec<_> = extensions.iter().map(|name| name.as_ptr()).collect();
        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs);

        unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| GraphicsError::native(BACKEND, "vkCreateInstance", e))
    }

    #[allow(clippy::type_complexity)]
    fn create_on_instance(
        runtime: &dyn XrRuntime,
        instance: &ash::Instance,
    ) -> Result<(
        vk::PhysicalDevice,
        ash::Device,
        Vec<CString>,
        vk::PhysicalDeviceMemoryProperties,
    )> {
        let physical_device = Self::pick_physical_device(runtime, instance)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );

        let available = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .map_err(|e| GraphicsError::native(BACKEND, "vkEnumerateDeviceExtensionProperties", e))?;
        let device_extensions =
            negotiate_extensions(&runtime.vulkan_device_extensions()?, &extension_names(&available));

        let device = Self::create_logical_device(instance, physical_device, &device_extensions)?;
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        Ok((physical_device, device, device_extensions, memory_properties))
    }

    fn pick_physical_device(
        runtime: &dyn XrRuntime,
        instance: &ash::Instance,
    ) -> Result<vk::PhysicalDevice> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| GraphicsError::native(BACKEND, "vkEnumeratePhysicalDevices", e))?;

        let requested = runtime.vulkan_graphics_device(instance.handle().as_raw())?;
        let selection = select_requested(BACKEND, devices, |device| device.as_raw() == requested)
            .ok_or(GraphicsError::NoAdapter(BACKEND))?;
        if !selection.matched {
            log::error!(
                "Vulkan: runtime physical device {:#x} was not enumerated; falling back to the first device",
                requested
            );
        }

        Ok(selection.adapter)
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        extensions: &[CString],
    ) -> Result<ash::Device> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let priorities = queue_priorities(&queue_families);

        let queue_create_infos: Vec<_> = priorities
            .iter()
            .filter(|(_, priorities)| !priorities.is_empty())
            .map(|(family, priorities)| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(*family)
                    .queue_priorities(priorities)
                    .build()
            })
            .collect();

        // Enable whatever the device offers.
        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let extension_ptrs: Vec<_> = extensions.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(|e| GraphicsError::native(BACKEND, "vkCreateDevice", e))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| GraphicsError::native(BACKEND, "vkDeviceWaitIdle", e))
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::warn!("{}", e);
        }

        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Every queue of every family at priority 1.0, keyed by family index.
pub(crate) fn queue_priorities(families: &[vk::QueueFamilyProperties]) -> Vec<(u32, Vec<f32>)> {
    families
        .iter()
        .enumerate()
        .map(|(index, family)| (index as u32, vec![1.0; family.queue_count as usize]))
        .collect()
}

fn extension_names(properties: &[vk::ExtensionProperties]) -> Vec<&CStr> {
    properties
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
        .collect()
}
