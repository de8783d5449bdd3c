//! Quest State Tracking
//!
//! Per-player quest progress, cooldowns and the tracked-quest pointer.
//! Nothing here talks to storage; the manager decides when to persist.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::definition::Quest;

/// Status of a quest for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestStatus {
    /// Quest is active and in progress
    Active,
    /// Quest has been completed
    Completed,
    /// Quest was abandoned; the record is dropped right after
    Abandoned,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::Active => "active",
            QuestStatus::Completed => "completed",
            QuestStatus::Abandoned => "abandoned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(QuestStatus::Active),
            "completed" => Some(QuestStatus::Completed),
            "abandoned" => Some(QuestStatus::Abandoned),
            _ => None,
        }
    }
}

/// Progress on a single objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveProgress {
    pub objective_id: String,
    pub current: u32,
    pub completed: bool,
}

impl ObjectiveProgress {
    pub fn new(objective_id: &str) -> Self {
        Self {
            objective_id: objective_id.to_string(),
            current: 0,
            completed: false,
        }
    }

    /// Saturating add towards `target`. Returns true if this call completed it.
    pub fn add_progress(&mut self, amount: u32, target: u32) -> bool {
        let was_completed = self.completed;
        self.current = self.current.saturating_add(amount).min(target);
        self.completed = self.current >= target;
        self.completed && !was_completed
    }

    /// Mark as complete regardless of count
    pub fn force_complete(&mut self, target: u32) {
        self.current = target;
        self.completed = true;
    }
}

/// Complete quest progress for a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestProgress {
    pub quest_id: String,
    pub status: QuestStatus,
    /// Progress on each objective (keyed by objective_id), created on first touch
    pub objectives: HashMap<String, ObjectiveProgress>,
    pub started_at: DateTime<Utc>,
    /// Set iff status is Completed
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuestProgress {
    pub fn new(quest_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            quest_id: quest_id.to_string(),
            status: QuestStatus::Active,
            objectives: HashMap::new(),
            started_at,
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == QuestStatus::Active
    }

    pub fn is_completed(&self) -> bool {
        self.status == QuestStatus::Completed
    }

    pub fn objective(&self, objective_id: &str) -> Option<&ObjectiveProgress> {
        self.objectives.get(objective_id)
    }

    pub fn objective_mut(&mut self, objective_id: &str) -> &mut ObjectiveProgress {
        self.objectives
            .entry(objective_id.to_string())
            .or_insert_with(|| ObjectiveProgress::new(objective_id))
    }

    /// Current amount on an objective, zero if untouched
    pub fn current(&self, objective_id: &str) -> u32 {
        self.objective(objective_id).map(|o| o.current).unwrap_or(0)
    }

    pub fn is_objective_complete(&self, objective_id: &str) -> bool {
        self.objective(objective_id).is_some_and(|o| o.completed)
    }

    /// Every objective of the quest has a completed record. A quest with no
    /// objectives never qualifies.
    pub fn all_objectives_complete(&self, quest: &Quest) -> bool {
        !quest.objectives.is_empty()
            && quest
                .objectives
                .iter()
                .all(|o| self.is_objective_complete(&o.id))
    }

    /// Mark quest as completed
    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.status = QuestStatus::Completed;
        self.completed_at = Some(at);
    }

    /// Mark quest as abandoned
    pub fn abandon(&mut self) {
        self.status = QuestStatus::Abandoned;
        self.completed_at = None;
    }

    /// Percentage of objectives completed (0-100)
    pub fn completion_by_count(&self, quest: &Quest) -> f64 {
        if quest.objectives.is_empty() {
            return 100.0;
        }
        let done = quest
            .objectives
            .iter()
            .filter(|o| self.is_objective_complete(&o.id))
            .count();
        done as f64 / quest.objectives.len() as f64 * 100.0
    }

    /// Average of per-objective amount ratios, each capped at 100% (0-100)
    pub fn completion_by_amount(&self, quest: &Quest) -> f64 {
        if quest.objectives.is_empty() {
            return 100.0;
        }
        let total: f64 = quest
            .objectives
            .iter()
            .map(|o| (self.current(&o.id) as f64 / o.amount as f64).min(1.0))
            .sum();
        total / quest.objectives.len() as f64 * 100.0
    }

    /// Get duration in seconds
    pub fn duration_secs(&self, now: DateTime<Utc>) -> i64 {
        let end = self.completed_at.unwrap_or(now);
        (end - self.started_at).num_seconds()
    }
}

/// All quest state for a single loaded player
#[derive(Debug, Clone)]
pub struct PlayerQuestData {
    pub player_id: Uuid,
    /// quest_id -> progress (active and completed)
    pub quests: HashMap<String, QuestProgress>,
    /// quest_id -> cooldown expiry in epoch millis
    pub cooldowns: HashMap<String, i64>,
    /// Must name an active quest, or be None
    pub tracked: Option<String>,
}

impl PlayerQuestData {
    pub fn new(player_id: Uuid) -> Self {
        Self {
            player_id,
            quests: HashMap::new(),
            cooldowns: HashMap::new(),
            tracked: None,
        }
    }

    pub fn get_quest(&self, quest_id: &str) -> Option<&QuestProgress> {
        self.quests.get(quest_id)
    }

    pub fn get_quest_mut(&mut self, quest_id: &str) -> Option<&mut QuestProgress> {
        self.quests.get_mut(quest_id)
    }

    pub fn is_quest_active(&self, quest_id: &str) -> bool {
        self.quests.get(quest_id).is_some_and(|p| p.is_active())
    }

    pub fn is_quest_completed(&self, quest_id: &str) -> bool {
        self.quests.get(quest_id).is_some_and(|p| p.is_completed())
    }

    pub fn active_quests(&self) -> impl Iterator<Item = &QuestProgress> {
        self.quests.values().filter(|p| p.is_active())
    }

    pub fn completed_quests(&self) -> impl Iterator<Item = &QuestProgress> {
        self.quests.values().filter(|p| p.is_completed())
    }

    pub fn active_count(&self) -> usize {
        self.active_quests().count()
    }

    pub fn completed_count(&self) -> usize {
        self.completed_quests().count()
    }

    /// Insert a fresh record, replacing any previous one for this quest
    pub fn start_quest(&mut self, quest_id: &str, at: DateTime<Utc>) -> &QuestProgress {
        self.quests.insert(quest_id.to_string(), QuestProgress::new(quest_id, at));
        &self.quests[quest_id]
    }

    /// Drop a record entirely, clearing tracking if it pointed at it
    pub fn remove_quest(&mut self, quest_id: &str) -> Option<QuestProgress> {
        if self.tracked.as_deref() == Some(quest_id) {
            self.tracked = None;
        }
        self.quests.remove(quest_id)
    }

    pub fn is_tracked(&self, quest_id: &str) -> bool {
        self.tracked.as_deref() == Some(quest_id)
    }

    /// Track an active quest. Returns false if the quest is not active.
    pub fn track(&mut self, quest_id: &str) -> bool {
        if !self.is_quest_active(quest_id) {
            return false;
        }
        self.tracked = Some(quest_id.to_string());
        true
    }

    pub fn untrack(&mut self) {
        self.tracked = None;
    }

    pub fn set_cooldown(&mut self, quest_id: &str, until_millis: i64) {
        self.cooldowns.insert(quest_id.to_string(), until_millis);
    }

    /// Milliseconds left on a quest's cooldown, if any
    pub fn cooldown_remaining(&self, quest_id: &str, now_millis: i64) -> Option<i64> {
        self.cooldowns
            .get(quest_id)
            .map(|until| until - now_millis)
            .filter(|remaining| *remaining > 0)
    }

    /// Forget cooldowns that have run out
    pub fn clear_expired_cooldowns(&mut self, now_millis: i64) -> usize {
        let before = self.cooldowns.len();
        self.cooldowns.retain(|_, until| *until > now_millis);
        before - self.cooldowns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::definition::{Objective, RawObjective};

    fn mine_objective(id: &str, amount: u32) -> Objective {
        Objective::from_raw(&RawObjective {
            id: id.to_string(),
            objective_type: "mine".to_string(),
            amount,
            description: None,
            material: Some("STONE".to_string()),
            entity: None,
            data: None,
        })
        .unwrap()
    }

    fn two_objective_quest() -> Quest {
        Quest::builder("first_dig")
            .objective(mine_objective("stone", 5))
            .objective(mine_objective("coal", 3))
            .build()
            .unwrap()
    }

    #[test]
    fn test_objective_progress() {
        let mut obj = ObjectiveProgress::new("stone");
        assert!(!obj.add_progress(3, 5));
        assert_eq!(obj.current, 3);

        assert!(obj.add_progress(4, 5));
        assert!(obj.completed);
        assert_eq!(obj.current, 5);

        // Saturates and does not re-report completion
        assert!(!obj.add_progress(1, 5));
        assert_eq!(obj.current, 5);
    }

    #[test]
    fn test_add_progress_saturates_on_overflow() {
        let mut obj = ObjectiveProgress::new("stone");
        obj.add_progress(u32::MAX, 10);
        obj.add_progress(u32::MAX, 10);
        assert_eq!(obj.current, 10);
    }

    #[test]
    fn test_all_objectives_complete() {
        let quest = two_objective_quest();
        let mut progress = QuestProgress::new("first_dig", Utc::now());
        assert!(!progress.all_objectives_complete(&quest));

        progress.objective_mut("stone").add_progress(5, 5);
        assert!(!progress.all_objectives_complete(&quest));

        progress.objective_mut("coal").add_progress(3, 3);
        assert!(progress.all_objectives_complete(&quest));

        let empty = Quest::builder("empty").build().unwrap();
        assert!(!QuestProgress::new("empty", Utc::now()).all_objectives_complete(&empty));
    }

    #[test]
    fn test_completion_percentages() {
        let quest = two_objective_quest();
        let mut progress = QuestProgress::new("first_dig", Utc::now());
        progress.objective_mut("stone").add_progress(5, 5);
        progress.objective_mut("coal").add_progress(1, 3);

        assert_eq!(progress.completion_by_count(&quest), 50.0);
        let weighted = progress.completion_by_amount(&quest);
        assert!((weighted - (1.0 + 1.0 / 3.0) / 2.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_tracking_requires_active() {
        let mut data = PlayerQuestData::new(Uuid::new_v4());
        assert!(!data.track("first_dig"));

        data.start_quest("first_dig", Utc::now());
        assert!(data.track("first_dig"));
        assert!(data.is_tracked("first_dig"));

        data.remove_quest("first_dig");
        assert_eq!(data.tracked, None);
    }

    #[test]
    fn test_cooldowns() {
        let mut data = PlayerQuestData::new(Uuid::new_v4());
        data.set_cooldown("daily_fish", 10_000);
        data.set_cooldown("daily_chop", 2_000);

        assert_eq!(data.cooldown_remaining("daily_fish", 4_000), Some(6_000));
        assert_eq!(data.cooldown_remaining("daily_chop", 4_000), None);
        assert_eq!(data.clear_expired_cooldowns(4_000), 1);
        assert_eq!(data.cooldowns.len(), 1);
    }

    #[test]
    fn test_status_round_trip_names() {
        assert_eq!(QuestStatus::from_str("COMPLETED"), Some(QuestStatus::Completed));
        assert_eq!(QuestStatus::from_str("ready_to_complete"), None);
    }
}
