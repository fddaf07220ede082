//! Configuration management
//!
//! Engine configuration including storage location, market discriminator,
//! context assembly limits, and maintenance thresholds.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::journal::MaintenanceOptions;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Whether the trading memory feature is enabled; when disabled the
    /// read paths return empty/neutral results
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Market discriminator; engine instances with different markets share
    /// a database without cross-contaminating
    #[serde(default = "default_market")]
    pub market: String,
    /// Context assembly limits
    #[serde(default)]
    pub context: ContextConfig,
    /// Maintenance thresholds
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// Bounds for the rendered context block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Ranked universal principles shown
    #[serde(default = "default_max_principles_shown")]
    pub max_principles: usize,
    /// Same-instrument outcomes shown
    #[serde(default = "default_max_recent_trades")]
    pub max_recent_trades: usize,
    /// Highest-confidence intuitions shown
    #[serde(default = "default_max_intuitions")]
    pub max_intuitions: usize,
    /// Lesson actions shown per outcome
    #[serde(default = "default_max_lesson_actions")]
    pub max_lesson_actions: usize,
}

/// Default thresholds for scheduled maintenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_max_principles")]
    pub max_principles: usize,
    #[serde(default = "default_archive_tier3_days")]
    pub archive_tier3_days: i64,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trading-memory")
        .join("journal.db")
}

fn default_enabled() -> bool {
    true
}

fn default_market() -> String {
    "KR".to_string()
}

fn default_max_principles_shown() -> usize {
    10
}

fn default_max_recent_trades() -> usize {
    3
}

fn default_max_intuitions() -> usize {
    10
}

fn default_max_lesson_actions() -> usize {
    2
}

fn default_min_confidence() -> f64 {
    0.3
}

fn default_max_principles() -> usize {
    50
}

fn default_archive_tier3_days() -> i64 {
    365
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            enabled: default_enabled(),
            market: default_market(),
            context: ContextConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_principles: default_max_principles_shown(),
            max_recent_trades: default_max_recent_trades(),
            max_intuitions: default_max_intuitions(),
            max_lesson_actions: default_max_lesson_actions(),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_principles: default_max_principles(),
            archive_tier3_days: default_archive_tier3_days(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config {}", path.as_ref().display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.as_ref().display()))?;
        Ok(config)
    }

    /// Write configuration to a TOML file, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Maintenance options derived from the configured thresholds
    pub fn maintenance_options(&self, dry_run: bool) -> MaintenanceOptions {
        MaintenanceOptions {
            min_confidence: self.maintenance.min_confidence,
            max_principles: self.maintenance.max_principles,
            archive_tier3_days: self.maintenance.archive_tier3_days,
            dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.enabled);
        assert_eq!(config.market, "KR");
        assert_eq!(config.context.max_recent_trades, 3);
        assert_eq!(config.maintenance.max_principles, 50);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            market = "US"
            database_path = "/tmp/us.db"

            [maintenance]
            min_confidence = 0.4
            "#,
        )
        .unwrap();
        assert_eq!(config.market, "US");
        assert!(config.enabled);
        assert!((config.maintenance.min_confidence - 0.4).abs() < 1e-9);
        assert_eq!(config.maintenance.archive_tier3_days, 365);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = EngineConfig::default();
        config.market = "US".to_string();
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.market, "US");
        assert_eq!(loaded.context.max_intuitions, 10);
    }

    #[test]
    fn test_maintenance_options_echo_dry_run() {
        let config = EngineConfig::default();
        assert!(config.maintenance_options(true).dry_run);
        assert!(!config.maintenance_options(false).dry_run);
    }
}
