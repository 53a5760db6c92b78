//! Configuration system for area-tile
//!
//! Loads configuration from TOML file at `~/.config/area-tile/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::ModMask;

use crate::wm::keyboard::{KeyBindingConfig, default_bindings, parse_modifier, resolve_bindings};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window_manager: WindowManagerConfig,
    pub colors: BorderColors,
    pub input: InputConfig,
    pub indicator: IndicatorConfig,
    /// Replaces the built-in table when present
    pub keybindings: Vec<KeyBindingConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_manager: WindowManagerConfig::default(),
            colors: BorderColors::default(),
            input: InputConfig::default(),
            indicator: IndicatorConfig::default(),
            keybindings: default_bindings(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location), writing
    /// the defaults out if the file doesn't exist
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Parse and validate an existing file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file {:?}", path))?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the window manager cannot run with
    pub fn validate(&self) -> Result<()> {
        let wm = &self.window_manager;
        if !(wm.master_factor_min > 0.0
            && wm.master_factor_min < wm.master_factor_max
            && wm.master_factor_max < 1.0)
        {
            bail!(
                "master factor bounds must satisfy 0 < min < max < 1 (got {} and {})",
                wm.master_factor_min,
                wm.master_factor_max
            );
        }
        if !(wm.master_factor_min..=wm.master_factor_max).contains(&wm.master_factor) {
            bail!(
                "master_factor {} outside [{}, {}]",
                wm.master_factor,
                wm.master_factor_min,
                wm.master_factor_max
            );
        }
        if wm.min_window_size == 0 {
            bail!("min_window_size must be at least 1");
        }
        if wm.max_windows == 0 {
            bail!("max_windows must be at least 1");
        }
        self.input.drag_modifier()?;
        resolve_bindings(&self.keybindings).context("Invalid key binding")?;
        Ok(())
    }

    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area-tile");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;
        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Tiling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowManagerConfig {
    /// Border width in pixels
    pub border_width: u32,
    /// Gap between windows and screen edges in pixels
    pub gap_width: u32,
    /// Smallest width/height a window may request
    pub min_window_size: u32,
    /// Share of the screen width given to the master column
    pub master_factor: f64,
    pub master_factor_min: f64,
    pub master_factor_max: f64,
    /// Maximum number of windows per workspace
    pub max_windows: usize,
}

impl Default for WindowManagerConfig {
    fn default() -> Self {
        Self {
            border_width: 5,
            gap_width: 5,
            min_window_size: 45,
            master_factor: 0.45,
            master_factor_min: 0.1,
            master_factor_max: 0.9,
            max_windows: 5,
        }
    }
}

/// Border colors (hex: 0xRRGGBB)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderColors {
    pub active_border: u32,
    pub inactive_border: u32,
}

impl Default for BorderColors {
    fn default() -> Self {
        Self {
            active_border: 0xbd93f9,
            inactive_border: 0x333333,
        }
    }
}

/// Pointer input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Modifier held with Button1 to drag windows: "super", "alt", ...
    pub modifier: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            modifier: "super".to_string(),
        }
    }
}

impl InputConfig {
    pub fn drag_modifier(&self) -> Result<ModMask> {
        parse_modifier(&self.modifier).context("Invalid drag modifier")
    }
}

/// Workspace indicator notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub enabled: bool,
    /// Notification expiry in milliseconds
    pub timeout_ms: u32,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 1000,
        }
    }
}
