// Swapchain format selection
//
// The runtime lists the formats it can composite from, most preferred first.
// Our preference order does not matter; the runtime's does.

use super::GraphicsBackend;

/// First entry of `candidates` that also appears in `supported`.
///
/// Returns `None` (and logs) when the two lists do not overlap.
pub fn select_swapchain_format(
    backend: GraphicsBackend,
    candidates: &[i64],
    supported: &[i64],
) -> Option<i64> {
    let selected = candidates
        .iter()
        .copied()
        .find(|format| supported.contains(format));

    match selected {
        Some(format) => log::debug!("{}: selected swapchain format {}", backend, format),
        None => log::error!(
            "{}: no runtime swapchain format is supported (runtime offers {:?}, backend supports {:?})",
            backend,
            candidates,
            supported
        ),
    }

    selected
}
