//! External collaborators
//!
//! The quest system reads player progress from a skill-progress service and
//! pays rewards through an economy and the host game. None of these may
//! block or fail the quest operation that calls them: progress reads fail
//! open, and payouts to a missing service are skipped.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

/// External skill-progress service (0-100 per player)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressSource: Send + Sync {
    /// None when the service is unavailable or still starting up
    async fn player_progress(&self, player_id: Uuid) -> Option<f64>;

    /// Returns true if the achievement was newly granted
    async fn grant_achievement(&self, player_id: Uuid, achievement: &str) -> bool;

    /// Ask the service to recompute a player's progress; returns the new value
    async fn recalculate(&self, player_id: Uuid) -> Option<f64>;
}

/// Progress for gating and scaling. Unavailable reads count as 0.
pub async fn progress_or_zero(source: &dyn ProgressSource, player_id: Uuid) -> f64 {
    match source.player_progress(player_id).await {
        Some(value) if value.is_finite() => value.clamp(0.0, 100.0),
        _ => {
            debug!("Progress unavailable for {}, using 0", player_id);
            0.0
        }
    }
}

/// Whether a player meets a progress requirement. Unavailable reads pass.
pub async fn meets_requirement(source: &dyn ProgressSource, player_id: Uuid, required: f64) -> Result<(), f64> {
    match source.player_progress(player_id).await {
        Some(value) if value < required => Err(value),
        _ => Ok(()),
    }
}

/// Currency service. Tokens are optional.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Economy: Send + Sync {
    fn is_enabled(&self) -> bool;
    fn has_token_support(&self) -> bool;
    async fn give_coins(&self, player_id: Uuid, amount: f64) -> bool;
    async fn give_tokens(&self, player_id: Uuid, amount: f64) -> bool;
    async fn coin_balance(&self, player_id: Uuid) -> f64;
    async fn token_balance(&self, player_id: Uuid) -> f64;
}

/// Host-game side of rewards: experience, inventory and console commands
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardSink: Send + Sync {
    async fn give_experience(&self, player_id: Uuid, amount: u32);

    /// Returns how many did not fit in the inventory and were dropped instead
    async fn give_item(&self, player_id: Uuid, material: &str, amount: u32) -> u32;

    async fn dispatch_command(&self, command: &str);
}

/// Stand-in when no progress service is installed
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

#[async_trait]
impl ProgressSource for NoProgress {
    async fn player_progress(&self, _player_id: Uuid) -> Option<f64> {
        None
    }

    async fn grant_achievement(&self, _player_id: Uuid, _achievement: &str) -> bool {
        false
    }

    async fn recalculate(&self, _player_id: Uuid) -> Option<f64> {
        None
    }
}

/// Stand-in when no economy is installed
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEconomy;

#[async_trait]
impl Economy for NoEconomy {
    fn is_enabled(&self) -> bool {
        false
    }

    fn has_token_support(&self) -> bool {
        false
    }

    async fn give_coins(&self, _player_id: Uuid, _amount: f64) -> bool {
        false
    }

    async fn give_tokens(&self, _player_id: Uuid, _amount: f64) -> bool {
        false
    }

    async fn coin_balance(&self, _player_id: Uuid) -> f64 {
        0.0
    }

    async fn token_balance(&self, _player_id: Uuid) -> f64 {
        0.0
    }
}

/// Logs rewards instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRewards;

#[async_trait]
impl RewardSink for LogRewards {
    async fn give_experience(&self, player_id: Uuid, amount: u32) {
        debug!("{} +{} experience", player_id, amount);
    }

    async fn give_item(&self, player_id: Uuid, material: &str, amount: u32) -> u32 {
        debug!("{} +{} {}", player_id, amount, material);
        0
    }

    async fn dispatch_command(&self, command: &str) {
        debug!("Command: {}", command);
    }
}

/// The collaborators a quest manager talks to
#[derive(Clone)]
pub struct QuestHooks {
    pub progress: Arc<dyn ProgressSource>,
    pub economy: Arc<dyn Economy>,
    pub rewards: Arc<dyn RewardSink>,
}

impl QuestHooks {
    pub fn new(progress: Arc<dyn ProgressSource>, economy: Arc<dyn Economy>, rewards: Arc<dyn RewardSink>) -> Self {
        Self {
            progress,
            economy,
            rewards,
        }
    }
}

impl Default for QuestHooks {
    fn default() -> Self {
        Self::new(Arc::new(NoProgress), Arc::new(NoEconomy), Arc::new(LogRewards))
    }
}
