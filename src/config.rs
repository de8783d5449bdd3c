//! Service configuration
//!
//! Loaded from a TOML file. Every key has a default so a partial file, or no
//! file at all, still yields a usable configuration.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuestConfig {
    pub quests: LifecycleConfig,
    pub rewards: RewardConfig,
    pub progress: ProgressConfig,
    pub daily: DailyConfig,
    pub progress_updates: ThrottleConfig,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
}

impl QuestConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        let config = Self::from_toml(&content)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;
        config
            .validate()
            .map_err(|e| format!("Invalid configuration in {:?}: {}", path, e))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Reject values serde accepts but the service cannot use
    pub fn validate(&self) -> Result<(), String> {
        if self.daily.reset_hour > 23 {
            return Err(format!(
                "daily.reset_hour must be between 0 and 23, got {}",
                self.daily.reset_hour
            ));
        }
        Ok(())
    }
}

/// Gating and side-effect switches for the quest lifecycle
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub max_active_quests: usize,
    pub auto_track: bool,
    pub broadcast_completion: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_active_quests: 5,
            auto_track: true,
            broadcast_completion: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub scale_by_progress: bool,
    pub progress_multiplier: f64,
    pub bonus_xp: bool,
    pub xp_per_quest: u32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            scale_by_progress: true,
            progress_multiplier: 0.5,
            bonus_xp: true,
            xp_per_quest: 50,
        }
    }
}

/// Hooks into the external skill-progress service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub register_achievements: bool,
    pub achievement_prefix: String,
    pub recalculate_on_complete: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            register_achievements: true,
            achievement_prefix: "quest_".to_string(),
            recalculate_on_complete: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DailyConfig {
    pub quests_per_day: usize,
    /// Local hour (0-23) after which a new calendar day takes effect
    pub reset_hour: u32,
    pub poll_interval_secs: u64,
}

impl DailyConfig {
    /// The reset hour as a valid hour of the day
    pub fn reset_hour(&self) -> u32 {
        self.reset_hour.min(23)
    }
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            quests_per_day: 5,
            reset_hour: 0,
            poll_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub min_time_between_ms: i64,
    pub inactivity_threshold_ms: i64,
    pub spam_window_secs: i64,
    pub max_messages_in_window: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_time_between_ms: 2_000,
            inactivity_threshold_ms: 30_000,
            spam_window_secs: 60,
            max_messages_in_window: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
    pub auto_save_secs: u64,
    pub cooldown_sweep_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:quests.db?mode=rwc".to_string(),
            auto_save_secs: 300,
            cooldown_sweep_secs: 3_600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub quest_dir: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            quest_dir: "quests".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = QuestConfig::from_toml(
            r#"
[quests]
max_active_quests = 3

[daily]
reset_hour = 6
"#,
        )
        .unwrap();

        assert_eq!(config.quests.max_active_quests, 3);
        assert!(config.quests.auto_track);
        assert_eq!(config.daily.reset_hour, 6);
        assert_eq!(config.daily.quests_per_day, 5);
        assert_eq!(config.progress_updates.max_messages_in_window, 15);
        assert_eq!(config.progress.achievement_prefix, "quest_");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = QuestConfig::load(&temp_dir.path().join("quest.toml")).unwrap();
        assert_eq!(config.storage.auto_save_secs, 300);
        assert_eq!(config.catalog.quest_dir, "quests");
    }

    #[test]
    fn test_reset_hour_out_of_range_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("quest.toml");
        std::fs::write(&path, "[daily]\nreset_hour = 24\n").unwrap();
        let err = QuestConfig::load(&path).unwrap_err();
        assert!(err.contains("reset_hour"), "{}", err);

        let config = QuestConfig::from_toml("[daily]\nreset_hour = 30").unwrap();
        assert_eq!(config.daily.reset_hour(), 23);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("quest.toml");
        std::fs::write(&path, "[quests\nmax_active_quests = ").unwrap();
        assert!(QuestConfig::load(&path).is_err());
    }
}
