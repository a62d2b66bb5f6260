//! Typed, file-backed configuration with defaults and band/threshold lookup.
//!
//! Values are loaded once at startup from `<config_dir>/pausewatchd/config.toml`
//! and re-read (for the bounded fields named in `spec.md` §8) on `SIGHUP`.

use crate::domain::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub rate_hz: u32,
    pub ring_buffer_seconds: u32,
    pub pause_threshold_ratio: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig { rate_hz: 1, ring_buffer_seconds: 30, pause_threshold_ratio: 2.0 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BandsConfig {
    pub low: u32,
    pub medium: u32,
    pub elevated: u32,
    pub high: u32,
    pub critical: u32,
    pub tracking_band: String,
    pub forensics_band: String,
}

impl Default for BandsConfig {
    fn default() -> Self {
        BandsConfig {
            low: 20,
            medium: 40,
            elevated: 60,
            high: 80,
            critical: 100,
            tracking_band: "elevated".to_string(),
            forensics_band: "high".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WeightsConfig {
    pub cpu: u32,
    pub state: u32,
    pub pageins: u32,
    pub mem: u32,
    pub cmprs: u32,
    pub csw: u32,
    pub sysbsd: u32,
    pub threads: u32,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        WeightsConfig { cpu: 25, state: 20, pageins: 15, mem: 15, cmprs: 10, csw: 10, sysbsd: 5, threads: 0 }
    }
}

impl WeightsConfig {
    fn sum(&self) -> u32 {
        self.cpu + self.state + self.pageins + self.mem + self.cmprs + self.csw + self.sysbsd + self.threads
    }
}

/// Linear clamp bounds `(low, high)` mapping a raw factor value to `[0, 1]`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Normalization {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub cpu: Normalization,
    pub mem: Normalization,
    pub cmprs: Normalization,
    pub pageins: Normalization,
    pub csw: Normalization,
    pub sysbsd: Normalization,
    pub threads: Normalization,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        NormalizationConfig {
            cpu: Normalization { low: 10.0, high: 80.0 },
            mem: Normalization { low: 100.0 * 1024.0 * 1024.0, high: 4.0 * 1024.0 * 1024.0 * 1024.0 },
            cmprs: Normalization { low: 0.0, high: 2.0 * 1024.0 * 1024.0 * 1024.0 },
            pageins: Normalization { low: 0.0, high: 500.0 },
            csw: Normalization { low: 0.0, high: 5000.0 },
            sysbsd: Normalization { low: 0.0, high: 5000.0 },
            threads: Normalization { low: 1.0, high: 64.0 },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: WeightsConfig,
    pub normalization: NormalizationConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig { weights: WeightsConfig::default(), normalization: NormalizationConfig::default() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SuspectsConfig {
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub events_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig { events_days: 90 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// The full, validated daemon configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub sampling: SamplingConfig,
    pub bands: BandsConfig,
    pub scoring: ScoringConfig,
    pub suspects: SuspectsConfig,
    pub retention: RetentionConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from `path`, writing out defaults if the file is absent.
    ///
    /// # Errors
    /// Returns `ConfigError::Unreadable` if the file exists but cannot be
    /// read, or `ConfigError::WeightsInvalid` if `scoring.weights` doesn't
    /// sum to 100. Individually malformed fields fall back to their default
    /// and are logged at `warn`, per `spec.md` §4.1 — they never fail the
    /// whole load.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|source| ConfigError::Unreadable { path: path.display().to_string(), source })?;
            toml::from_str::<Config>(&raw).unwrap_or_else(|e| {
                log::warn!("malformed config at {}: {e}; falling back to defaults", path.display());
                Config::default()
            })
        } else {
            let defaults = Config::default();
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(serialized) = toml::to_string_pretty(&defaults) {
                let _ = std::fs::write(path, serialized);
            }
            defaults
        };

        let sum = config.scoring.weights.sum();
        if sum != 100 {
            return Err(ConfigError::WeightsInvalid { sum });
        }

        Ok(config)
    }

    /// Reload the bounded fields named in `spec.md` §8 from `path` in place,
    /// leaving paths and `logging.format` untouched (those require restart).
    ///
    /// # Errors
    /// Same as [`Config::load`].
    pub fn reload(&mut self, path: &Path) -> Result<(), ConfigError> {
        let fresh = Config::load(path)?;
        self.sampling = fresh.sampling;
        self.bands = fresh.bands;
        self.scoring = fresh.scoring;
        self.suspects = fresh.suspects;
        self.retention = fresh.retention;
        self.logging.level = fresh.logging.level;
        Ok(())
    }

    /// Map a score to the name of the band it falls in.
    #[must_use]
    pub fn band_for(&self, score: u32) -> String {
        let table = self.band_table();
        let mut name = table[0].0.clone();
        for (band_name, lower) in &table {
            if score >= *lower {
                name = band_name.clone();
            }
        }
        name
    }

    /// Lower bound (the threshold) of a named band.
    ///
    /// # Errors
    /// Returns `ConfigError::UnknownBand` if `name` doesn't match one of
    /// the five configured bands.
    pub fn threshold_for(&self, name: &str) -> Result<u32, ConfigError> {
        self.band_table()
            .into_iter()
            .find(|(band_name, _)| band_name == name)
            .map(|(_, lower)| lower)
            .ok_or_else(|| ConfigError::UnknownBand(name.to_string()))
    }

    /// The tracking threshold: the lower bound of `bands.tracking_band`.
    ///
    /// # Errors
    /// Returns `ConfigError::UnknownBand` if `bands.tracking_band` does not
    /// name a configured band (a startup-validation bug, since this field
    /// itself is part of config).
    pub fn tracking_threshold(&self) -> Result<u32, ConfigError> {
        self.threshold_for(&self.bands.tracking_band)
    }

    /// The forensics threshold: the lower bound of `bands.forensics_band`.
    ///
    /// # Errors
    /// Returns `ConfigError::UnknownBand` if `bands.forensics_band` does not
    /// name a configured band.
    pub fn forensics_threshold(&self) -> Result<u32, ConfigError> {
        self.threshold_for(&self.bands.forensics_band)
    }

    fn band_table(&self) -> Vec<(String, u32)> {
        vec![
            ("low".to_string(), 0),
            ("medium".to_string(), self.bands.low),
            ("elevated".to_string(), self.bands.medium),
            ("high".to_string(), self.bands.elevated),
            ("critical".to_string(), self.bands.high),
        ]
    }

    /// Per-factor normalization bounds keyed by category name, for callers
    /// that want to iterate generically rather than matching each field.
    #[must_use]
    pub fn normalization_map(&self) -> HashMap<&'static str, Normalization> {
        let n = &self.scoring.normalization;
        HashMap::from([
            ("cpu", n.cpu),
            ("mem", n.mem),
            ("cmprs", n.cmprs),
            ("pageins", n.pageins),
            ("csw", n.csw),
            ("sysbsd", n.sysbsd),
            ("threads", n.threads),
        ])
    }
}

/// Default config file path under the user's config directory.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pausewatchd")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_100() {
        assert_eq!(WeightsConfig::default().sum(), 100);
    }

    #[test]
    fn band_for_boundaries() {
        let config = Config::default();
        assert_eq!(config.band_for(0), "low");
        assert_eq!(config.band_for(19), "low");
        assert_eq!(config.band_for(20), "medium");
        assert_eq!(config.band_for(60), "high");
        assert_eq!(config.band_for(100), "critical");
    }

    #[test]
    fn tracking_threshold_matches_elevated_lower_bound() {
        let config = Config::default();
        assert_eq!(config.tracking_threshold().unwrap(), 40);
    }

    #[test]
    fn forensics_threshold_matches_high_lower_bound() {
        let config = Config::default();
        assert_eq!(config.forensics_threshold().unwrap(), 60);
    }

    #[test]
    fn unknown_band_is_an_error() {
        let config = Config::default();
        assert!(config.threshold_for("nonexistent").is_err());
    }

    #[test]
    fn load_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.sampling.rate_hz, 1);
    }

    #[test]
    fn load_rejects_bad_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scoring.weights]\ncpu = 50\nstate = 50\npageins = 50\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::WeightsInvalid { .. })));
    }
}
