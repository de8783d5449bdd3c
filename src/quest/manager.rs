//! Player Quest Manager
//!
//! Owns the per-player quest state of every loaded player and runs the
//! quest lifecycle: start, progress, complete, abandon. Each player's state
//! sits behind its own async mutex, so operations for one player never
//! interleave while different players proceed in parallel.

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::QuestConfig;
use crate::store::StoreWriter;

use super::daily::DailySelector;
use super::definition::{Objective, Quest};
use super::events::{Outbound, QuestAction, QuestEventResult, QuestNotice, QuestPlayer};
use super::hooks::{QuestHooks, meets_requirement, progress_or_zero};
use super::matcher;
use super::registry::QuestCatalog;
use super::rewards::RewardPlan;
use super::state::{PlayerQuestData, QuestProgress};
use super::throttle::{ProgressThrottle, ThrottleDecision};

/// Why a quest operation was refused. The display text is player-facing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuestRefusal {
    #[error("Quest not found: {0}")]
    UnknownQuest(String),

    #[error("You already have this quest active.")]
    AlreadyActive,

    #[error("You have already completed this quest.")]
    AlreadyCompleted,

    #[error("This quest is on cooldown for another {}.", format_cooldown(.remaining_secs))]
    OnCooldown { remaining_secs: i64 },

    #[error("You can only have {max} active quests at a time.")]
    MaxActive { max: usize },

    #[error("This quest requires {required:.0}% progress (you have {current:.0}%).")]
    Locked { required: f64, current: f64 },

    #[error("That quest is not active.")]
    NotActive,
}

fn format_cooldown(secs: &i64) -> String {
    let secs = *secs;
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

type PlayerHandle = Arc<Mutex<PlayerQuestData>>;

pub struct PlayerQuestManager {
    catalog: Arc<QuestCatalog>,
    config: QuestConfig,
    hooks: QuestHooks,
    clock: Arc<dyn Clock>,
    writer: StoreWriter,
    daily: Arc<DailySelector>,
    throttle: Arc<ProgressThrottle>,
    players: DashMap<Uuid, PlayerHandle>,
    notices: mpsc::UnboundedSender<Outbound>,
}

impl PlayerQuestManager {
    pub fn new(
        catalog: Arc<QuestCatalog>,
        config: QuestConfig,
        hooks: QuestHooks,
        clock: Arc<dyn Clock>,
        writer: StoreWriter,
        notices: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let daily = Arc::new(DailySelector::new(
            catalog.clone(),
            hooks.progress.clone(),
            clock.clone(),
            config.daily.clone(),
            notices.clone(),
        ));
        let throttle = Arc::new(ProgressThrottle::new(config.progress_updates.clone(), clock.clone()));

        Self {
            catalog,
            config,
            hooks,
            clock,
            writer,
            daily,
            throttle,
            players: DashMap::new(),
            notices,
        }
    }

    pub fn catalog(&self) -> &Arc<QuestCatalog> {
        &self.catalog
    }

    pub fn daily(&self) -> &Arc<DailySelector> {
        &self.daily
    }

    pub fn throttle(&self) -> &Arc<ProgressThrottle> {
        &self.throttle
    }

    fn notify(&self, player_id: Uuid, notice: QuestNotice) {
        let _ = self.notices.send(Outbound::to_player(player_id, notice));
    }

    fn refuse(&self, player_id: Uuid, refusal: QuestRefusal) -> QuestRefusal {
        self.notify(
            player_id,
            QuestNotice::Refused {
                reason: refusal.to_string(),
            },
        );
        refusal
    }

    fn quest(&self, quest_id: &str) -> Result<Arc<Quest>, QuestRefusal> {
        self.catalog
            .get(quest_id)
            .ok_or_else(|| QuestRefusal::UnknownQuest(quest_id.to_string()))
    }

    /// State handle for a player, loading it from the store on first use
    async fn handle(&self, player_id: Uuid) -> PlayerHandle {
        if let Some(handle) = self.loaded_handle(player_id) {
            return handle;
        }

        let data = self.read_player(player_id).await;
        // Whoever inserts first wins; a concurrent loser drops its copy
        self.players
            .entry(player_id)
            .or_insert_with(|| Arc::new(Mutex::new(data)))
            .clone()
    }

    fn loaded_handle(&self, player_id: Uuid) -> Option<PlayerHandle> {
        self.players.get(&player_id).map(|h| h.clone())
    }

    async fn read_player(&self, player_id: Uuid) -> PlayerQuestData {
        // Writes queued by an earlier unload must land before reading back
        self.writer.flush().await;

        let mut data = match self.writer.store().load_player_data(player_id).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to load quest data for {}: {}", player_id, e);
                PlayerQuestData::new(player_id)
            }
        };
        data.clear_expired_cooldowns(self.clock.now_millis());

        debug!(
            "Loaded quest data for {}: {} active, {} completed",
            player_id,
            data.active_count(),
            data.completed_count()
        );
        data
    }

    // ========================================================================
    // Player lifecycle
    // ========================================================================

    /// Load a player's state from the store. A failed read starts them empty;
    /// a player already in memory is left as is.
    pub async fn load_player(&self, player_id: Uuid) {
        self.handle(player_id).await;
    }

    /// Checkpoint and evict a player
    pub async fn unload_player(&self, player_id: Uuid) {
        if let Some((_, handle)) = self.players.remove(&player_id) {
            let data = handle.lock().await;
            self.writer.save_player(&data);
        }
        self.writer.flush().await;
        self.throttle.clear_player(player_id);
    }

    /// Checkpoint one player without evicting them
    pub async fn flush_player(&self, player_id: Uuid) {
        if let Some(handle) = self.loaded_handle(player_id) {
            let data = handle.lock().await;
            self.writer.save_player(&data);
        }
    }

    /// Checkpoint every loaded player and wait for the writes to land
    pub async fn flush_all(&self) -> usize {
        let handles: Vec<PlayerHandle> = self.players.iter().map(|e| e.value().clone()).collect();
        for handle in &handles {
            let data = handle.lock().await;
            self.writer.save_player(&data);
        }
        self.writer.flush().await;
        handles.len()
    }

    pub fn is_loaded(&self, player_id: Uuid) -> bool {
        self.players.contains_key(&player_id)
    }

    pub fn loaded_players(&self) -> Vec<Uuid> {
        self.players.iter().map(|e| *e.key()).collect()
    }

    /// Drop expired cooldowns from the store and from loaded players
    pub async fn clear_expired_cooldowns(&self) -> u64 {
        let now = self.clock.now_millis();
        let handles: Vec<PlayerHandle> = self.players.iter().map(|e| e.value().clone()).collect();
        for handle in handles {
            handle.lock().await.clear_expired_cooldowns(now);
        }

        match self.writer.store().clear_expired_cooldowns(now).await {
            Ok(cleared) => cleared,
            Err(e) => {
                warn!("Failed to clear expired cooldowns: {}", e);
                0
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start a quest for a player. Refusals are also sent to the player.
    pub async fn start_quest(&self, player: &QuestPlayer, quest_id: &str) -> Result<(), QuestRefusal> {
        let quest = self.quest(quest_id).map_err(|r| self.refuse(player.id, r))?;
        let handle = self.handle(player.id).await;
        let mut data = handle.lock().await;
        self.start_locked(&mut data, player, &quest)
            .await
            .map_err(|r| self.refuse(player.id, r))
    }

    async fn check_start(&self, data: &PlayerQuestData, player: &QuestPlayer, quest: &Quest) -> Result<(), QuestRefusal> {
        if data.is_quest_active(&quest.id) {
            return Err(QuestRefusal::AlreadyActive);
        }
        if data.is_quest_completed(&quest.id) && !quest.repeatable {
            return Err(QuestRefusal::AlreadyCompleted);
        }
        if let Some(remaining) = data.cooldown_remaining(&quest.id, self.clock.now_millis()) {
            return Err(QuestRefusal::OnCooldown {
                remaining_secs: (remaining + 999) / 1000,
            });
        }
        let max = self.config.quests.max_active_quests;
        if data.active_count() >= max {
            return Err(QuestRefusal::MaxActive { max });
        }
        if !player.bypass_progress {
            meets_requirement(self.hooks.progress.as_ref(), player.id, quest.required_progress)
                .await
                .map_err(|current| QuestRefusal::Locked {
                    required: quest.required_progress,
                    current,
                })?;
        }
        Ok(())
    }

    async fn start_locked(&self, data: &mut PlayerQuestData, player: &QuestPlayer, quest: &Quest) -> Result<(), QuestRefusal> {
        self.check_start(data, player, quest).await?;

        // A repeat run replaces the old record and its objective rows
        if data.quests.contains_key(&quest.id) {
            self.writer.delete_quest(player.id, &quest.id);
        }
        let progress = data.start_quest(&quest.id, self.clock.now());
        self.writer.save_quest(player.id, progress);

        if self.config.quests.auto_track {
            data.track(&quest.id);
        }

        info!("{} started quest {}", player.name, quest.id);
        self.notify(
            player.id,
            QuestNotice::Started {
                quest_name: quest.name.clone(),
            },
        );
        Ok(())
    }

    /// Abandon an active quest, discarding its progress
    pub async fn abandon_quest(&self, player_id: Uuid, quest_id: &str) -> Result<(), QuestRefusal> {
        let handle = self.handle(player_id).await;
        let mut data = handle.lock().await;

        let Some(progress) = data.get_quest_mut(quest_id).filter(|p| p.is_active()) else {
            return Err(self.refuse(player_id, QuestRefusal::NotActive));
        };
        progress.abandon();
        data.remove_quest(quest_id);
        self.writer.delete_quest(player_id, quest_id);

        let quest_name = self
            .catalog
            .get(quest_id)
            .map(|q| q.name.clone())
            .unwrap_or_else(|| quest_id.to_string());
        info!("Player {} abandoned quest {}", player_id, quest_id);
        self.notify(player_id, QuestNotice::Abandoned { quest_name });
        Ok(())
    }

    /// Feed one player action through the player's quests. Today's daily
    /// quests that the action fits are started first.
    pub async fn process_action(&self, action: &QuestAction) -> Vec<QuestEventResult> {
        let player = &action.player;
        let daily = self.daily.daily_quests(player.id).await;

        let handle = self.handle(player.id).await;
        let mut data = handle.lock().await;

        for quest in daily {
            if data.get_quest(&quest.id).is_some_and(|p| p.is_active() || p.is_completed()) {
                continue;
            }
            let fits = quest
                .objectives
                .iter()
                .any(|o| matcher::matches(o, action.objective_type, &action.payload));
            if !fits {
                continue;
            }
            match self.start_locked(&mut data, player, &quest).await {
                Ok(()) => info!("Auto-started daily quest {} for {}", quest.id, player.name),
                Err(reason) => debug!("Daily quest {} not started for {}: {}", quest.id, player.name, reason),
            }
        }

        let mut active: Vec<String> = data.active_quests().map(|p| p.quest_id.clone()).collect();
        active.sort();

        let mut results = Vec::new();
        for quest_id in active {
            let Some(quest) = self.catalog.get(&quest_id) else {
                continue;
            };
            for objective in &quest.objectives {
                let done = data
                    .get_quest(&quest.id)
                    .is_none_or(|p| !p.is_active() || p.is_objective_complete(&objective.id));
                if done || !matcher::matches(objective, action.objective_type, &action.payload) {
                    continue;
                }
                if let Some(result) = self
                    .increment_locked(&mut data, player, &quest, objective, action.amount)
                    .await
                {
                    results.push(result);
                }
            }
        }
        results
    }

    /// Add to one objective directly. An objective that is already complete
    /// is left alone.
    pub async fn increment_objective(
        &self,
        player: &QuestPlayer,
        quest_id: &str,
        objective_id: &str,
        amount: u32,
    ) -> Option<QuestEventResult> {
        let quest = self.catalog.get(quest_id)?;
        let objective = quest.get_objective(objective_id)?;
        let handle = self.handle(player.id).await;
        let mut data = handle.lock().await;
        self.increment_locked(&mut data, player, &quest, objective, amount).await
    }

    async fn increment_locked(
        &self,
        data: &mut PlayerQuestData,
        player: &QuestPlayer,
        quest: &Quest,
        objective: &Objective,
        amount: u32,
    ) -> Option<QuestEventResult> {
        let tracked = data.is_tracked(&quest.id);
        let progress = data
            .get_quest_mut(&quest.id)
            .filter(|p| p.is_active() && !p.is_objective_complete(&objective.id))?;

        let entry = progress.objective_mut(&objective.id);
        let objective_completed = entry.add_progress(amount, objective.amount);
        let current = entry.current;
        self.writer.save_objective(player.id, &quest.id, entry);
        let all_complete = progress.all_objectives_complete(quest);

        debug!(
            "{} progress on {}/{}: {}/{}",
            player.name, quest.id, objective.id, current, objective.amount
        );

        if tracked {
            self.notify_progress(player.id, quest, objective, current);
        }

        if all_complete {
            self.complete_locked(data, player, quest).await;
        }

        Some(QuestEventResult {
            quest_id: quest.id.clone(),
            objective_id: objective.id.clone(),
            new_progress: current,
            target: objective.amount,
            objective_completed,
            quest_completed: all_complete,
        })
    }

    fn notify_progress(&self, player_id: Uuid, quest: &Quest, objective: &Objective, current: u32) {
        let decision = self
            .throttle
            .should_notify(player_id, &quest.id, &objective.id, current, objective.amount);
        if !decision.should_notify() {
            return;
        }

        let notice = if current >= objective.amount {
            QuestNotice::ObjectiveComplete {
                quest_name: quest.name.clone(),
                objective: objective.formatted_description(),
            }
        } else {
            QuestNotice::Progress {
                quest_name: quest.name.clone(),
                objective: objective.formatted_description(),
                current,
                target: objective.amount,
            }
        };
        self.notify(player_id, notice);

        if decision == ThrottleDecision::NotifyWithSpamWarning {
            self.notify(player_id, QuestNotice::SpamWarning);
        }
    }

    /// Complete an active quest with all side effects. Returns false if the
    /// player has no active record for it.
    pub async fn complete_quest(&self, player: &QuestPlayer, quest_id: &str) -> bool {
        let Some(quest) = self.catalog.get(quest_id) else {
            return false;
        };
        let handle = self.handle(player.id).await;
        let mut data = handle.lock().await;
        self.complete_locked(&mut data, player, &quest).await
    }

    async fn complete_locked(&self, data: &mut PlayerQuestData, player: &QuestPlayer, quest: &Quest) -> bool {
        let now = self.clock.now();
        let Some(progress) = data.get_quest_mut(&quest.id).filter(|p| p.is_active()) else {
            return false;
        };
        progress.complete(now);
        self.writer.save_quest(player.id, progress);

        if data.is_tracked(&quest.id) {
            data.untrack();
        }

        if quest.repeatable && quest.cooldown_seconds > 0 {
            let until = now + Duration::seconds(quest.cooldown_seconds as i64);
            data.set_cooldown(&quest.id, until.timestamp_millis());
            self.writer.save_cooldown(player.id, &quest.id, until.timestamp_millis());
        }

        let player_progress = progress_or_zero(self.hooks.progress.as_ref(), player.id).await;
        let plan = RewardPlan::compute(&quest.rewards, player_progress, &self.config.rewards, &player.name);
        let granted = plan.grant(player.id, &self.hooks).await;

        if self.config.progress.register_achievements {
            let key = format!("{}{}", self.config.progress.achievement_prefix, quest.id);
            if self.hooks.progress.grant_achievement(player.id, &key).await {
                debug!("Granted achievement {} to {}", key, player.name);
            }
        }
        if self.config.progress.recalculate_on_complete {
            self.hooks.progress.recalculate(player.id).await;
        }

        info!("{} completed quest {}", player.name, quest.id);
        self.notify(
            player.id,
            QuestNotice::Completed {
                quest_name: quest.name.clone(),
                rewards: granted,
            },
        );
        if self.config.quests.broadcast_completion {
            let _ = self.notices.send(Outbound::to_everyone(QuestNotice::Broadcast {
                player_name: player.name.clone(),
                quest_name: quest.name.clone(),
            }));
        }
        true
    }

    // ========================================================================
    // Admin
    // ========================================================================

    /// Start the quest if needed, fill every objective and complete it.
    /// Skips the usual start requirements.
    pub async fn force_complete(&self, player: &QuestPlayer, quest_id: &str) -> Result<(), QuestRefusal> {
        let quest = self.quest(quest_id)?;
        let handle = self.handle(player.id).await;
        let mut data = handle.lock().await;

        if !data.is_quest_active(&quest.id) {
            if data.quests.contains_key(&quest.id) {
                self.writer.delete_quest(player.id, &quest.id);
            }
            let progress = data.start_quest(&quest.id, self.clock.now());
            self.writer.save_quest(player.id, progress);
        }

        if let Some(progress) = data.get_quest_mut(&quest.id) {
            for objective in &quest.objectives {
                let entry = progress.objective_mut(&objective.id);
                entry.force_complete(objective.amount);
                self.writer.save_objective(player.id, &quest.id, entry);
            }
        }

        self.complete_locked(&mut data, player, &quest).await;
        info!("Force-completed quest {} for {}", quest.id, player.name);
        Ok(())
    }

    /// Delete one quest's record, or all of them. Returns how many were removed.
    pub async fn reset_quests(&self, player_id: Uuid, quest_id: Option<&str>) -> usize {
        let handle = self.handle(player_id).await;
        let mut data = handle.lock().await;

        let ids: Vec<String> = match quest_id {
            Some(id) => data.quests.contains_key(id).then(|| id.to_string()).into_iter().collect(),
            None => data.quests.keys().cloned().collect(),
        };
        for id in &ids {
            data.remove_quest(id);
            self.writer.delete_quest(player_id, id);
        }

        info!("Reset {} quest(s) for {}", ids.len(), player_id);
        ids.len()
    }

    // ========================================================================
    // Tracking and settings
    // ========================================================================

    pub async fn track_quest(&self, player_id: Uuid, quest_id: &str) -> Result<(), QuestRefusal> {
        let handle = self.handle(player_id).await;
        let mut data = handle.lock().await;
        if data.track(quest_id) {
            Ok(())
        } else {
            Err(self.refuse(player_id, QuestRefusal::NotActive))
        }
    }

    pub async fn untrack_quest(&self, player_id: Uuid) {
        self.handle(player_id).await.lock().await.untrack();
    }

    pub async fn tracked_quest(&self, player_id: Uuid) -> Option<String> {
        let handle = self.handle(player_id).await;
        let data = handle.lock().await;
        data.tracked.clone()
    }

    /// Flip progress-update messages for a player; returns the new setting
    pub fn toggle_updates(&self, player_id: Uuid) -> bool {
        self.throttle.toggle(player_id)
    }

    pub fn set_updates_enabled(&self, player_id: Uuid, enabled: bool) {
        self.throttle.set_enabled(player_id, enabled);
    }

    pub fn updates_enabled(&self, player_id: Uuid) -> bool {
        self.throttle.is_enabled(player_id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn quest_progress(&self, player_id: Uuid, quest_id: &str) -> Option<QuestProgress> {
        let handle = self.handle(player_id).await;
        let data = handle.lock().await;
        data.get_quest(quest_id).cloned()
    }

    /// Active quests, oldest first
    pub async fn active_quests(&self, player_id: Uuid) -> Vec<QuestProgress> {
        let handle = self.handle(player_id).await;
        let data = handle.lock().await;
        let mut list: Vec<QuestProgress> = data.active_quests().cloned().collect();
        list.sort_by_key(|p| p.started_at);
        list
    }

    /// Completed quests, most recent first
    pub async fn completed_quests(&self, player_id: Uuid) -> Vec<QuestProgress> {
        let handle = self.handle(player_id).await;
        let data = handle.lock().await;
        let mut list: Vec<QuestProgress> = data.completed_quests().cloned().collect();
        list.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        list
    }

    /// (active, completed)
    pub async fn quest_counts(&self, player_id: Uuid) -> (usize, usize) {
        let handle = self.handle(player_id).await;
        let data = handle.lock().await;
        (data.active_count(), data.completed_count())
    }

    /// Completion percentage (0-100), by objective count or weighted by amount
    pub async fn completion_percent(&self, player_id: Uuid, quest_id: &str, by_amount: bool) -> Option<f64> {
        let quest = self.catalog.get(quest_id)?;
        let progress = self.quest_progress(player_id, quest_id).await?;
        Some(if by_amount {
            progress.completion_by_amount(&quest)
        } else {
            progress.completion_by_count(&quest)
        })
    }

    pub async fn cooldown_remaining(&self, player_id: Uuid, quest_id: &str) -> Option<Duration> {
        let handle = self.handle(player_id).await;
        let data = handle.lock().await;
        data.cooldown_remaining(quest_id, self.clock.now_millis())
            .map(Duration::milliseconds)
    }
}
