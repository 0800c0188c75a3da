//! config.rs — config.toml loading
//!
//! The embedded `config.toml` is the default; a file given with `--config` replaces
//! it. Every section and key is optional and falls back to the embedded values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use mains_types::{SimulationParameters, TriggerConfig, TriggerMode};

use crate::clock::{MAX_SPEED, MIN_SPEED};
use crate::control::ScriptEntry;
use crate::faults::DEFAULT_INTENSITY;
use crate::session::{SessionOptions, DEFAULT_TRAIL_LENGTH, DEFAULT_VIEWPORT_WIDTH};
use crate::statistics::DEFAULT_HISTORY_CAPACITY;

pub const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config.toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub frequency_hz: f64,
    pub amplitude_v: f64,
    pub dc_offset_v: f64,
    pub chassis_grounded: bool,
    pub split_phase: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        let p = SimulationParameters::default();
        Self {
            frequency_hz: p.frequency_hz,
            amplitude_v: p.amplitude_v,
            dc_offset_v: p.dc_offset_v,
            chassis_grounded: p.chassis_grounded,
            split_phase: p.split_phase,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaultsConfig {
    pub intensity: f64,
    pub seed: Option<u64>,
}

impl Default for FaultsConfig {
    fn default() -> Self {
        Self { intensity: DEFAULT_INTENSITY, seed: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriggerSection {
    pub mode: TriggerMode,
    pub level_v: f64,
    pub manual_voltage_v: f64,
}

impl Default for TriggerSection {
    fn default() -> Self {
        Self { mode: TriggerMode::Auto, level_v: 0.0, manual_voltage_v: 0.0 }
    }
}

impl TriggerSection {
    pub fn to_trigger_config(&self) -> TriggerConfig {
        match self.mode {
            TriggerMode::None => TriggerConfig::None,
            TriggerMode::Auto => TriggerConfig::Auto { level_v: self.level_v },
            TriggerMode::Manual => TriggerConfig::Manual { voltage_v: self.manual_voltage_v },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub viewport_width_px: usize,
    pub history_capacity: usize,
    pub transient_interval_ms: u64,
    pub trail_length: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            viewport_width_px: DEFAULT_VIEWPORT_WIDTH,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            transient_interval_ms: 16,
            trail_length: DEFAULT_TRAIL_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub tick_rate_hz: f64,
    pub speed: f64,
    pub telemetry_every_ticks: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { tick_rate_hz: 60.0, speed: 1.0, telemetry_every_ticks: 6 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub signal: SignalConfig,
    pub faults: FaultsConfig,
    pub trigger: TriggerSection,
    pub display: DisplayConfig,
    pub simulation: SimulationConfig,
    pub script: Vec<ScriptEntry>,
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl FileConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: FileConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml(DEFAULT_CONFIG)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_toml(&text)?;
        info!("📄 Loaded config from {}", path.display());
        Ok(cfg)
    }

    /// `path` if given and present, otherwise the embedded defaults.
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => {
                warn!("Config {} not found, using built-in defaults", p.display());
                Self::embedded()
            }
            None => Self::embedded(),
        }
    }

    /// Hard errors only; out-of-range values are floored when building the session.
    fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.simulation.tick_rate_hz;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::Invalid(format!("simulation.tick_rate_hz = {rate}")));
        }
        if self.simulation.telemetry_every_ticks == 0 {
            return Err(ConfigError::Invalid("simulation.telemetry_every_ticks = 0".into()));
        }
        if let Some(entry) = self.script.iter().find(|e| !e.at_s.is_finite() || e.at_s < 0.0) {
            return Err(ConfigError::Invalid(format!("script at_s = {}", entry.at_s)));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.simulation.tick_rate_hz)
    }

    pub fn params(&self) -> SimulationParameters {
        let s = &self.signal;
        let raw = SimulationParameters {
            frequency_hz: s.frequency_hz,
            amplitude_v: s.amplitude_v,
            dc_offset_v: s.dc_offset_v,
            chassis_grounded: s.chassis_grounded,
            split_phase: s.split_phase,
        };
        let params = raw.sanitized();
        if params != raw {
            warn!("Signal config floored to {params:?}");
        }
        params
    }

    pub fn session_options(&self) -> SessionOptions {
        let intensity = self.faults.intensity;
        if !(0.0..=1.0).contains(&intensity) {
            warn!("faults.intensity {intensity} outside 0..1, clamping");
        }
        let speed = self.simulation.speed;
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            warn!("simulation.speed {speed} outside {MIN_SPEED}..{MAX_SPEED}, clamping");
        }
        if self.display.viewport_width_px == 0 {
            warn!("display.viewport_width_px is 0, using 1");
        }
        SessionOptions {
            viewport_width: self.display.viewport_width_px.max(1),
            history_capacity: self.display.history_capacity.max(1),
            transient_interval: Duration::from_millis(self.display.transient_interval_ms),
            trail_length: self.display.trail_length,
            intensity,
            speed,
            trigger: self.trigger.to_trigger_config(),
            seed: self.faults.seed,
        }
    }

    pub fn session_parts(&self) -> (SimulationParameters, SessionOptions) {
        (self.params(), self.session_options())
    }
}
