use std::path::Path;
use std::time::Duration;

use pagecap_lib::types::Viewport;
use pagecap_lib::{Config, PagecapError};

/// Convert flags that override config values when given.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConvertOverrides {
    pub viewport: Option<Viewport>,
    pub scale: Option<f64>,
    pub element_timeout: Option<u64>,
    pub nav_timeout: Option<u64>,
}

/// Merge CLI overrides into `config`, then re-validate the result.
pub fn resolve_convert_settings(
    mut config: Config,
    overrides: &ConvertOverrides,
) -> Result<Config, PagecapError> {
    if let Some(viewport) = overrides.viewport {
        config.viewport = viewport;
    }
    if let Some(scale) = overrides.scale {
        config.device_scale_factor = scale;
    }
    if let Some(secs) = overrides.element_timeout {
        config.timeouts.element_wait = Duration::from_secs(secs);
    }
    if let Some(secs) = overrides.nav_timeout {
        config.timeouts.navigation = Duration::from_secs(secs);
    }
    config
        .validate()
        .map_err(|e| PagecapError::Config(format!("Invalid flags: {}", e)))?;
    Ok(config)
}

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/pagecap/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, PagecapError> {
    let cfg = Config::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string());
        PagecapError::Config(format!("Failed to read config {}: {}", loc, e))
    })?;

    cfg.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        PagecapError::Config(prefix)
    })?;
    Ok(cfg)
}

/// Format effective config as a single-line string.
pub fn format_effective_config(config: &Config, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    format!(
        "Effective config [{source}]: viewport={}, scale={}, timeouts: launch={}s, nav={}s, element={}s, screenshot={}s, pdf: dpi={}, encoding={:?}, node={}",
        config.viewport,
        config.device_scale_factor,
        config.timeouts.launch.as_secs(),
        config.timeouts.navigation.as_secs(),
        config.timeouts.element_wait.as_secs(),
        config.timeouts.screenshot.as_secs(),
        config.pdf.dpi,
        config.pdf.encoding,
        config.node_command,
    )
}
