//! Session configuration
//!
//! Settings persistence, the adapter registry, and the frozen parameter set
//! handed to the engine on every construction.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name that selects the base model with no adapter applied.
///
/// Reserved: it can never appear in the adapter registry.
pub const BASE_ADAPTER: &str = "default";

/// Errors from settings persistence
#[derive(Debug, Error)]
pub enum SettingsError {
    /// No configuration directory could be determined for this platform
    #[error("could not determine a configuration directory")]
    NoConfigDir,
    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Frozen parameter set for one engine construction
///
/// The engine never sees settings directly; every construction receives one
/// of these, so a live instance cannot observe settings edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the base model weights
    pub base_path: PathBuf,
    /// Maximum number of tokens to generate per response
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Top-k sampling parameter
    pub top_k: u32,
    /// Adapter weights to apply on top of the base model, if any
    pub adapter_path: Option<PathBuf>,
}

/// User-editable session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Path to the base model weights
    pub model_path: PathBuf,
    /// Maximum number of tokens to generate per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Top-k sampling parameter
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Named adapter weights available for hot-swap
    #[serde(default = "default_adapters")]
    pub adapters: BTreeMap<String, PathBuf>,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_k() -> u32 {
    40
}

fn default_adapters() -> BTreeMap<String, PathBuf> {
    let mut adapters = BTreeMap::new();
    adapters.insert(
        "hut-8".to_string(),
        PathBuf::from("./models/hut-8-adapter.bin"),
    );
    adapters.insert(
        "hut-6".to_string(),
        PathBuf::from("./models/hut-6-adapter.bin"),
    );
    adapters
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/gemma-3n-e2b-it-int4.litertlm"),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            adapters: default_adapters(),
        }
    }
}

impl SessionSettings {
    /// Validate settings values
    ///
    /// Clamps generation parameters into acceptable ranges and strips the
    /// reserved base name from the adapter map.
    pub fn validate(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);

        if self.top_k == 0 {
            self.top_k = default_top_k();
        }

        self.max_tokens = self.max_tokens.clamp(1, 65536);

        if self.adapters.remove(BASE_ADAPTER).is_some() {
            tracing::warn!(
                "adapter name '{}' is reserved for the base model; entry dropped",
                BASE_ADAPTER
            );
        }
    }

    /// Engine configuration for the base model with no adapter
    pub fn base_config(&self) -> EngineConfig {
        EngineConfig {
            base_path: self.model_path.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_k: self.top_k,
            adapter_path: None,
        }
    }

    /// Registry of the adapters named in these settings
    pub fn registry(&self) -> AdapterRegistry {
        AdapterRegistry::new(self.adapters.clone())
    }
}

/// Read-only map of adapter names to weight files
///
/// Fixed at startup; the session never mutates it.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, PathBuf>,
}

impl AdapterRegistry {
    /// Build a registry from a name-to-path map
    pub fn new(adapters: BTreeMap<String, PathBuf>) -> Self {
        Self { adapters }
    }

    /// Whether `name` is the reserved base-model selector
    pub fn is_base(name: &str) -> bool {
        name == BASE_ADAPTER
    }

    /// Resolve an adapter name to its weight file
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.adapters.get(name).map(PathBuf::as_path)
    }

    /// Registered adapter names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    /// Number of registered adapters
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapters are registered
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Get the settings file path
///
/// `ULTRALM_CONFIG` overrides the platform configuration directory.
fn get_settings_path() -> Result<PathBuf, SettingsError> {
    if let Ok(path) = std::env::var("ULTRALM_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    ProjectDirs::from("", "", "ultralm")
        .map(|dirs| dirs.config_dir().join("settings.json"))
        .ok_or(SettingsError::NoConfigDir)
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings() -> SessionSettings {
    match get_settings_path().and_then(|path| read_settings(&path)) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            let mut settings = SessionSettings::default();
            settings.validate();
            settings
        }
    }
}

/// Read and validate settings from an explicit path
fn read_settings(path: &Path) -> Result<SessionSettings, SettingsError> {
    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Ok(SessionSettings::default());
    }

    let json = fs::read_to_string(path)?;
    let mut settings: SessionSettings = serde_json::from_str(&json)?;
    settings.validate();

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Save settings to disk
pub fn save_settings(settings: &SessionSettings) -> Result<(), SettingsError> {
    let path = get_settings_path()?;
    write_settings(settings, &path)
}

/// Write settings to an explicit path
fn write_settings(settings: &SessionSettings, path: &Path) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to {}", path.display());
    Ok(())
}
