//! Reward computation and payout
//!
//! [`RewardPlan::compute`] is deterministic given the quest's rewards, the
//! player's progress and the reward settings. Granting walks the plan and
//! skips whatever the installed collaborators cannot deliver.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RewardConfig;

use super::definition::{ItemReward, Reward};
use super::hooks::QuestHooks;

/// Concrete payout for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct RewardPlan {
    pub coins: f64,
    pub tokens: f64,
    pub experience: u32,
    pub items: Vec<ItemReward>,
    /// Commands with `%player%` already substituted
    pub commands: Vec<String>,
}

impl RewardPlan {
    pub fn compute(reward: &Reward, player_progress: f64, config: &RewardConfig, player_name: &str) -> Self {
        let coins = if config.scale_by_progress {
            reward.coins * (1.0 + player_progress / 100.0 * config.progress_multiplier)
        } else {
            reward.coins
        };

        let experience = if config.bonus_xp {
            reward.experience.saturating_add(config.xp_per_quest)
        } else {
            reward.experience
        };

        Self {
            coins,
            tokens: reward.tokens,
            experience,
            items: reward.items.clone(),
            commands: reward
                .commands
                .iter()
                .map(|c| c.replace("%player%", player_name))
                .collect(),
        }
    }

    /// Pay out through the collaborators. Returns display lines for what
    /// was actually granted.
    pub async fn grant(&self, player_id: Uuid, hooks: &QuestHooks) -> Vec<String> {
        let mut granted = Vec::new();

        if self.coins > 0.0 && hooks.economy.is_enabled() {
            if hooks.economy.give_coins(player_id, self.coins).await {
                granted.push(format!("{:.0} coins", self.coins));
            } else {
                warn!("Failed to give {} coins to {}", self.coins, player_id);
            }
        }

        if self.tokens > 0.0 && hooks.economy.has_token_support() {
            if hooks.economy.give_tokens(player_id, self.tokens).await {
                granted.push(format!("{:.0} tokens", self.tokens));
            } else {
                warn!("Failed to give {} tokens to {}", self.tokens, player_id);
            }
        }

        if self.experience > 0 {
            hooks.rewards.give_experience(player_id, self.experience).await;
            granted.push(format!("{} experience", self.experience));
        }

        for item in &self.items {
            let dropped = hooks.rewards.give_item(player_id, &item.material, item.amount).await;
            if dropped > 0 {
                debug!("Dropped {} {} for {} (inventory full)", dropped, item.material, player_id);
            }
            granted.push(format!("{}x {}", item.amount, super::definition::humanize(&item.material)));
        }

        for command in &self.commands {
            hooks.rewards.dispatch_command(command).await;
        }

        granted
    }
}
