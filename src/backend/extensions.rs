// Extension/function resolution
//
// Runtime side: the XR_KHR_*_enable extension per backend and the entry
// points each backend calls during initialization.
// Native side: intersect the runtime's Vulkan extension wish list with what
// the driver actually offers.

use std::ffi::{CStr, CString};

use super::GraphicsBackend;
use crate::error::{GraphicsError, Result};
use crate::runtime::{EntryPoint, XrRuntime};

/// Entry points the Vulkan backend calls during initialization.
pub const VULKAN_ENTRY_POINTS: [&'static str; 4] = [
    "xrGetVulkanGraphicsRequirementsKHR",
    "xrGetVulkanInstanceExtensionsKHR",
    "xrGetVulkanDeviceExtensionsKHR",
    "xrGetVulkanGraphicsDeviceKHR",
];

/// Look up a runtime entry point, logging when it is absent.
pub fn resolve_required_entry_point(runtime: &dyn XrRuntime, name: &str) -> Option<EntryPoint> {
    let entry_point = runtime.resolve_entry_point(name);
    if entry_point.is_none() {
        log::error!("OpenXR: failed to get function pointer for {}", name);
    }
    entry_point
}

/// Runtime functions a backend resolved at initialization, owned for its lifetime.
#[derive(Debug, Clone, Default)]
pub struct EntryPoints {
    resolved: Vec<(&'static str, EntryPoint)>,
}

impl EntryPoints {
    pub fn get(&self, name: &str) -> Option<EntryPoint> {
        self.resolved
            .iter()
            .find(|(resolved, _)| *resolved == name)
            .map(|&(_, function)| function)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resolved.iter().map(|&(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// Resolve every named entry point; the first missing one is an error.
pub fn require_entry_points(
    runtime: &dyn XrRuntime,
    names: &[&'static str],
) -> Result<EntryPoints> {
    let mut entry_points = EntryPoints::default();
    for &name in names {
        let Some(function) = resolve_required_entry_point(runtime, name) else {
            return Err(GraphicsError::MissingEntryPoint(name.to_string()));
        };
        entry_points.resolved.push((name, function));
    }
    Ok(entry_points)
}

/// The runtime extension that enables `backend`, if it was compiled in.
pub fn instance_extension_name(backend: GraphicsBackend) -> Option<&'static str> {
    let name = match backend {
        #[cfg(all(feature = "d3d11", windows))]
        GraphicsBackend::D3D11 => Some("XR_KHR_D3D11_enable"),
        #[cfg(all(feature = "d3d12", windows))]
        GraphicsBackend::D3D12 => Some("XR_KHR_D3D12_enable"),
        #[cfg(feature = "opengl")]
        GraphicsBackend::OpenGl => Some("XR_KHR_opengl_enable"),
        #[cfg(all(feature = "opengl-es", target_os = "android"))]
        GraphicsBackend::OpenGlEs => Some("XR_KHR_opengl_es_enable"),
        #[cfg(feature = "vulkan")]
        GraphicsBackend::Vulkan => Some("XR_KHR_vulkan_enable"),
        #[allow(unreachable_patterns)]
        _ => None,
    };

    if name.is_none() {
        log::error!("{} was not compiled into this build", backend);
    }
    name
}

/// Name of the graphics requirements entry point for `backend`.
pub fn requirements_entry_point(backend: GraphicsBackend) -> &'static str {
    match backend {
        GraphicsBackend::D3D11 => "xrGetD3D11GraphicsRequirementsKHR",
        GraphicsBackend::D3D12 => "xrGetD3D12GraphicsRequirementsKHR",
        GraphicsBackend::OpenGl => "xrGetOpenGLGraphicsRequirementsKHR",
        GraphicsBackend::OpenGlEs => "xrGetOpenGLESGraphicsRequirementsKHR",
        GraphicsBackend::Vulkan => "xrGetVulkanGraphicsRequirementsKHR",
    }
}

/// Split the runtime's space-delimited extension list, keeping its order.
pub fn split_extension_list(list: &str) -> Vec<&str> {
    list.split_whitespace()
        .map(|name| name.trim_end_matches('\0'))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Extensions to enable: the runtime's requests, in its order, that the
/// driver also advertises. Duplicates are dropped.
pub fn negotiate_extensions(requested: &str, available: &[&CStr]) -> Vec<CString> {
    let mut active: Vec<CString> = Vec::new();

    for name in split_extension_list(requested) {
        let supported = available
            .iter()
            .any(|ext| ext.to_bytes() == name.as_bytes());
        if !supported {
            log::warn!("Vulkan: runtime requested unsupported extension {}", name);
            continue;
        }

        let Ok(name) = CString::new(name) else {
            continue;
        };
        if !active.contains(&name) {
            active.push(name);
        }
    }

    active
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRuntime {
        known: Vec<&'static str>,
    }

    unsafe extern "system" fn noop() {}

    impl XrRuntime for FakeRuntime {
        fn resolve_entry_point(&self, name: &str) -> Option<EntryPoint> {
            self.known.contains(&name).then_some(noop as EntryPoint)
        }

        fn graphics_requirements(
            &self,
            backend: GraphicsBackend,
        ) -> Result<crate::runtime::GraphicsRequirements> {
            Err(GraphicsError::Unavailable(backend))
        }

        fn vulkan_instance_extensions(&self) -> Result<String> {
            Ok(String::new())
        }

        fn vulkan_device_extensions(&self) -> Result<String> {
            Ok(String::new())
        }

        fn vulkan_graphics_device(&self, _instance: u64) -> Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn negotiated_set_keeps_runtime_order_and_drops_duplicates() {
        let available = [
            c"VK_KHR_external_memory",
            c"VK_KHR_swapchain",
            c"VK_KHR_get_physical_device_properties2",
        ];
        let active = negotiate_extensions(
            "VK_KHR_swapchain VK_EXT_missing VK_KHR_external_memory VK_KHR_swapchain",
            &available,
        );
        assert_eq!(
            active,
            vec![
                CString::new("VK_KHR_swapchain").unwrap(),
                CString::new("VK_KHR_external_memory").unwrap(),
            ]
        );
    }

    #[test]
    fn split_handles_trailing_nul_and_extra_spaces() {
        assert_eq!(
            split_extension_list("  VK_A  VK_B\0"),
            vec!["VK_A", "VK_B"]
        );
        assert!(split_extension_list("").is_empty());
    }

    #[test]
    fn missing_entry_point_is_reported_by_name() {
        let runtime = FakeRuntime {
            known: vec!["xrGetVulkanGraphicsRequirementsKHR"],
        };
        assert!(resolve_required_entry_point(&runtime, "xrGetVulkanGraphicsRequirementsKHR").is_some());

        let err = require_entry_points(&runtime, &VULKAN_ENTRY_POINTS).unwrap_err();
        match err {
            GraphicsError::MissingEntryPoint(name) => {
                assert_eq!(name, "xrGetVulkanInstanceExtensionsKHR")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolved_entry_points_stay_with_the_caller() {
        let runtime = FakeRuntime {
            known: VULKAN_ENTRY_POINTS.to_vec(),
        };
        let entry_points = require_entry_points(&runtime, &VULKAN_ENTRY_POINTS).unwrap();
        assert_eq!(entry_points.len(), 4);
        assert!(entry_points.get("xrGetVulkanGraphicsDeviceKHR").is_some());
        assert!(entry_points.get("xrGetD3D11GraphicsRequirementsKHR").is_none());
        assert_eq!(
            entry_points.names().collect::<Vec<_>>(),
            VULKAN_ENTRY_POINTS.to_vec()
        );
    }

    #[test]
    fn requirements_entry_points_are_backend_specific() {
        assert_eq!(
            requirements_entry_point(GraphicsBackend::OpenGlEs),
            "xrGetOpenGLESGraphicsRequirementsKHR"
        );
        assert_eq!(
            requirements_entry_point(GraphicsBackend::D3D12),
            "xrGetD3D12GraphicsRequirementsKHR"
        );
    }

    #[cfg(feature = "vulkan")]
    #[test]
    fn vulkan_extension_name_when_compiled_in() {
        assert_eq!(
            instance_extension_name(GraphicsBackend::Vulkan),
            Some("XR_KHR_vulkan_enable")
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn direct3d_is_never_compiled_in_off_windows() {
        assert_eq!(instance_extension_name(GraphicsBackend::D3D11), None);
        assert_eq!(instance_extension_name(GraphicsBackend::D3D12), None);
    }
}
