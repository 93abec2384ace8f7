// =============================================================================
// XR GRAPHICS DEMO - session bring-up on the configured graphics backend
// =============================================================================
//
// FLOW:
// 1. Load config.toml, install the logger
// 2. Check the backend against the host platform
// 3. Create an OpenXR instance with the backend's enable extension
// 4. Create the native device through the backend
// 5. Bind a session, pick a swapchain format, create one swapchain
// 6. Fill the backend's swapchain image array from the runtime
// 7. Create and destroy a depth image, then tear down
//
// =============================================================================

mod config;

use anyhow::{anyhow, bail, Context, Result};
use openxr as xr;

use config::Config;
use xr_graphics::backend::extensions::instance_extension_name;
use xr_graphics::backend::SwapchainImage;
use xr_graphics::{
    check_backend_for_platform, GraphicsApi, GraphicsBackend, ImageCreateInfo, OpenXrRuntime,
    Platform,
};

// 32-bit float depth in each API's format enumeration
const VK_FORMAT_D32_SFLOAT: i64 = 126;
const DXGI_FORMAT_D32_FLOAT: i64 = 40;
const GL_DEPTH_COMPONENT32F: i64 = 0x8CAC;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config);
    let backend = config.graphics.backend;
    log::info!("Starting XR graphics demo");
    log::info!("Backend: {}", backend);
    log::info!(
        "Swapchain: {}x{}",
        config.graphics.swapchain_width,
        config.graphics.swapchain_height
    );

    let platform = Platform::current();
    check_backend_for_platform(backend, platform)?;

    let runtime = create_runtime(&config, backend)?;

    match backend {
        #[cfg(feature = "vulkan")]
        GraphicsBackend::Vulkan => {
            let mut graphics =
                xr_graphics::backend::vulkan::VulkanGraphics::new(&runtime, &config.app_info())?;
            run(&runtime, &mut graphics, &config)
        }
        #[cfg(all(feature = "opengl", target_os = "linux"))]
        GraphicsBackend::OpenGl => {
            use xr_graphics::backend::opengl::{GlGraphics, XlibGlWindow};
            let mut graphics = GlGraphics::<XlibGlWindow>::new(&runtime)?;
            run(&runtime, &mut graphics, &config)
        }
        #[cfg(all(feature = "opengl", windows))]
        GraphicsBackend::OpenGl => {
            use xr_graphics::backend::opengl::{GlGraphics, WglWindow};
            let mut graphics = GlGraphics::<WglWindow>::new(&runtime)?;
            run(&runtime, &mut graphics, &config)
        }
        #[cfg(all(feature = "opengl-es", target_os = "android"))]
        GraphicsBackend::OpenGlEs => {
            use xr_graphics::backend::opengl::{EglWindow, GlGraphics};
            let mut graphics = GlGraphics::<EglWindow>::new(&runtime)?;
            run(&runtime, &mut graphics, &config)
        }
        #[cfg(all(feature = "d3d11", windows))]
        GraphicsBackend::D3D11 => {
            let mut graphics = xr_graphics::backend::d3d11::D3D11Graphics::new(&runtime)?;
            run(&runtime, &mut graphics, &config)
        }
        #[cfg(all(feature = "d3d12", windows))]
        GraphicsBackend::D3D12 => {
            let mut graphics = xr_graphics::backend::d3d12::D3D12Graphics::new(&runtime)?;
            run(&runtime, &mut graphics, &config)
        }
        #[allow(unreachable_patterns)]
        other => bail!("{} has no windowing helper on {}", other, platform),
    }
}

/// Logger filtered by `debug.log_level`; `RUST_LOG` overrides it.
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// OPENXR INSTANCE
// =============================================================================

fn create_runtime(config: &Config, backend: GraphicsBackend) -> Result<OpenXrRuntime> {
    let extension = instance_extension_name(backend)
        .with_context(|| format!("{} is not available in this build", backend))?;

    let entry = unsafe { xr::Entry::load() }
        .map_err(|e| anyhow!("Failed to load the OpenXR loader: {e:?}"))?;
    let available = entry
        .enumerate_extensions()
        .map_err(|e| anyhow!("xrEnumerateInstanceExtensionProperties: {e:?}"))?;

    let mut extensions = xr::ExtensionSet::default();
    if !enable_backend_extension(backend, &available, &mut extensions) {
        bail!("OpenXR runtime does not offer {}", extension);
    }
    log::info!("Enabling {}", extension);

    let app_info = xr::ApplicationInfo {
        application_name: &config.xr.application_name,
        application_version: 1,
        engine_name: &config.xr.engine_name,
        engine_version: 1,
        api_version: xr::Version::new(1, 0, 0),
    };
    let instance = entry
        .create_instance(&app_info, &extensions, &[])
        .map_err(|e| anyhow!("xrCreateInstance: {e:?}"))?;

    let properties = instance
        .properties()
        .map_err(|e| anyhow!("xrGetInstanceProperties: {e:?}"))?;
    log::info!(
        "OpenXR runtime: {} {}",
        properties.runtime_name,
        properties.runtime_version
    );

    let system = instance
        .system(xr::FormFactor::HEAD_MOUNTED_DISPLAY)
        .map_err(|e| anyhow!("xrGetSystem: {e:?}"))?;

    Ok(OpenXrRuntime::new(instance, system))
}

/// Request the backend's enable extension if the runtime offers it.
fn enable_backend_extension(
    backend: GraphicsBackend,
    available: &xr::ExtensionSet,
    enabled: &mut xr::ExtensionSet,
) -> bool {
    match backend {
        GraphicsBackend::Vulkan => {
            enabled.khr_vulkan_enable = available.khr_vulkan_enable;
            available.khr_vulkan_enable
        }
        GraphicsBackend::OpenGl => {
            enabled.khr_opengl_enable = available.khr_opengl_enable;
            available.khr_opengl_enable
        }
        #[cfg(target_os = "android")]
        GraphicsBackend::OpenGlEs => {
            enabled.khr_opengl_es_enable = available.khr_opengl_es_enable;
            available.khr_opengl_es_enable
        }
        #[cfg(windows)]
        GraphicsBackend::D3D11 => {
            enabled.khr_d3d11_enable = available.khr_d3d11_enable;
            available.khr_d3d11_enable
        }
        #[cfg(windows)]
        GraphicsBackend::D3D12 => {
            enabled.khr_d3d12_enable = available.khr_d3d12_enable;
            available.khr_d3d12_enable
        }
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

// =============================================================================
// SESSION BRING-UP
// =============================================================================

fn default_depth_format(backend: GraphicsBackend) -> i64 {
    match backend {
        GraphicsBackend::Vulkan => VK_FORMAT_D32_SFLOAT,
        GraphicsBackend::D3D11 | GraphicsBackend::D3D12 => DXGI_FORMAT_D32_FLOAT,
        GraphicsBackend::OpenGl | GraphicsBackend::OpenGlEs => GL_DEPTH_COMPONENT32F,
    }
}

fn run<G>(runtime: &OpenXrRuntime, graphics: &mut G, config: &Config) -> Result<()>
where
    G: GraphicsApi,
    G::Xr: xr::Graphics<Format = u32>,
    <G::SwapchainImage as SwapchainImage>::Native: std::fmt::Debug,
{
    let backend = graphics.backend();
    let width = config.graphics.swapchain_width;
    let height = config.graphics.swapchain_height;

    let binding = graphics.graphics_binding();
    let (session, _frame_waiter, _frame_stream) = unsafe {
        runtime
            .instance()
            .create_session::<G::Xr>(runtime.system(), &binding)
    }
    .map_err(|e| anyhow!("xrCreateSession: {e:?}"))?;
    log::info!("Session created on {}", backend);

    // Swapchain format: runtime order, filtered by what the backend supports
    let candidates: Vec<i64> = session
        .enumerate_swapchain_formats()
        .map_err(|e| anyhow!("xrEnumerateSwapchainFormats: {e:?}"))?
        .into_iter()
        .map(i64::from)
        .collect();
    let format = graphics
        .select_swapchain_format(&candidates)
        .context("No runtime swapchain format is supported by the backend")?;

    let swapchain = session
        .create_swapchain(&xr::SwapchainCreateInfo {
            create_flags: xr::SwapchainCreateFlags::EMPTY,
            usage_flags: xr::SwapchainUsageFlags::COLOR_ATTACHMENT
                | xr::SwapchainUsageFlags::SAMPLED,
            format: format as u32,
            sample_count: 1,
            width,
            height,
            face_count: 1,
            array_size: 1,
            mip_count: 1,
        })
        .map_err(|e| anyhow!("xrCreateSwapchain: {e:?}"))?;

    // Swapchain images land in the backend-owned array
    let count = runtime.swapchain_image_count(swapchain.as_raw())?;
    let images = graphics.allocate_swapchain_image_data(count);
    let written = runtime.enumerate_swapchain_images(swapchain.as_raw(), images)?;
    log::info!("Swapchain: {} images, format {}", written, format);
    for (index, native) in images.native_images().iter().enumerate() {
        log::debug!("  image {}: {:?}", index, native);
    }

    // One depth image for the whole swapchain
    let depth_info = ImageCreateInfo {
        dimension: 2,
        width,
        height,
        format: config
            .graphics
            .depth_format
            .unwrap_or_else(|| default_depth_format(backend)),
        depth_attachment: true,
        ..Default::default()
    };
    let mut depth_image = Some(graphics.create_image(&depth_info)?);
    log::info!("Depth image created ({}x{})", width, height);

    graphics.destroy_image(&mut depth_image);
    log::info!("Depth image destroyed");

    drop(swapchain);
    drop(session);
    log::info!("Session closed");
    Ok(())
}
