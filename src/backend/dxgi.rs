// DXGI adapter lookup shared by the D3D backends

use windows::Win32::Graphics::Dxgi::{CreateDXGIFactory1, IDXGIAdapter1, IDXGIFactory1};

use super::adapter::select_requested;
use super::GraphicsBackend;
use crate::error::{GraphicsError, Result};
use crate::runtime::AdapterLuid;

/// Enumerate DXGI adapters and pick the one with the runtime's LUID.
pub(crate) fn find_adapter(
    backend: GraphicsBackend,
    requested: Option<AdapterLuid>,
) -> Result<IDXGIAdapter1> {
    let factory: IDXGIFactory1 = unsafe { CreateDXGIFactory1() }
        .map_err(|e| GraphicsError::native(backend, "CreateDXGIFactory1", e))?;

    let mut adapters = Vec::new();
    let mut index = 0;
    // Enumeration ends with DXGI_ERROR_NOT_FOUND.
    while let Ok(adapter) = unsafe { factory.EnumAdapters1(index) } {
        let desc = unsafe { adapter.GetDesc1() }
            .map_err(|e| GraphicsError::native(backend, "IDXGIAdapter1::GetDesc1", e))?;
        let luid = AdapterLuid {
            low_part: desc.AdapterLuid.LowPart,
            high_part: desc.AdapterLuid.HighPart,
        };
        adapters.push((adapter, luid));
        index += 1;
    }

    let selection = select_requested(backend, adapters, |(_, luid)| Some(*luid) == requested)
        .ok_or(GraphicsError::NoAdapter(backend))?;
    if !selection.matched {
        log::warn!("{}: no adapter matches the runtime LUID {:?}", backend, requested);
    }

    Ok(selection.adapter.0)
}
