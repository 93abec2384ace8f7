// Adapter selection
//
// The runtime names the GPU it composites on (a LUID for D3D, a physical
// device handle for Vulkan). We look for it among the enumerated adapters and
// fall back to the first one when it is missing.

use super::GraphicsBackend;

/// Result of matching enumerated adapters against the runtime's request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSelection<T> {
    pub adapter: T,
    /// False when the requested adapter was not found and we fell back.
    pub matched: bool,
}

/// Pick the adapter the runtime asked for, or the first one enumerated.
///
/// Returns `None` only when `adapters` is empty.
pub fn select_requested<T>(
    backend: GraphicsBackend,
    adapters: Vec<T>,
    mut is_requested: impl FnMut(&T) -> bool,
) -> Option<AdapterSelection<T>> {
    if adapters.is_empty() {
        log::error!("{}: no adapters enumerated", backend);
        return None;
    }

    let count = adapters.len();
    let position = adapters.iter().position(|adapter| is_requested(adapter));
    let (index, matched) = match position {
        Some(index) => (index, true),
        None => {
            log::warn!(
                "{}: requested adapter not among {} enumerated, using adapter 0",
                backend,
                count
            );
            (0, false)
        }
    };

    let adapter = adapters.into_iter().nth(index)?;
    log::debug!("{}: using adapter {} of {}", backend, index, count);
    Some(AdapterSelection { adapter, matched })
}
