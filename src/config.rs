// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Backend choice, XR application identity and the demo's swapchain/depth
// image settings. Missing file or missing keys fall back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use xr_graphics::{AppInfo, GraphicsBackend};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub xr: XrConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Names reported to the XR runtime and the native API
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct XrConfig {
    pub application_name: String,
    pub engine_name: String,
}

impl Default for XrConfig {
    fn default() -> Self {
        Self {
            application_name: "XR Graphics Demo".to_string(),
            engine_name: "XR Graphics".to_string(),
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub backend: GraphicsBackend,
    pub swapchain_width: u32,
    pub swapchain_height: u32,
    /// Native depth format code; the backend's usual 32-bit float depth if unset.
    pub depth_format: Option<i64>,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: GraphicsBackend::Vulkan,
            swapchain_width: 1024,
            swapchain_height: 1024,
            depth_format: None,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`. `RUST_LOG` still wins.
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn app_info(&self) -> AppInfo {
        AppInfo {
            application_name: self.xr.application_name.clone(),
            engine_name: self.xr.engine_name.clone(),
        }
    }

    /// Log filter from `debug.log_level`, `Info` when unrecognized
    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            log::warn!(
                "Unknown log level '{}', defaulting to info",
                self.debug.log_level
            );
            log::LevelFilter::Info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.graphics.backend, GraphicsBackend::Vulkan);
        assert_eq!(config.graphics.swapchain_width, 1024);
        assert_eq!(config.graphics.depth_format, None);
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [xr]
            application_name = "Viewer"

            [graphics]
            backend = "opengl"
            depth_format = 36012

            [debug]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.backend, GraphicsBackend::OpenGl);
        assert_eq!(config.graphics.depth_format, Some(36012));
        assert_eq!(config.graphics.swapchain_height, 1024);
        assert_eq!(config.app_info().application_name, "Viewer");
        assert_eq!(config.app_info().engine_name, "XR Graphics");
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        let parsed: std::result::Result<Config, _> = toml::from_str(
            r#"
            [graphics]
            backend = "metal"
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.xr.application_name, "XR Graphics Demo");
    }
}
