//! Durable quest storage
//!
//! [`QuestStore`] is the checkpoint contract. In-memory player state is the
//! source of truth while a player is loaded; writes go through a
//! [`StoreWriter`], which applies them in order on a background task and
//! logs failures instead of surfacing them.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::quest::state::{ObjectiveProgress, PlayerQuestData, QuestProgress};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be turned back into quest state
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestStore: Send + Sync {
    /// Insert or replace the quest row (status and timestamps)
    async fn save_player_quest(&self, player_id: Uuid, progress: &QuestProgress) -> Result<(), StoreError>;

    async fn save_objective_progress(
        &self,
        player_id: Uuid,
        quest_id: &str,
        objective: &ObjectiveProgress,
    ) -> Result<(), StoreError>;

    /// Everything stored for a player; an unknown player yields empty data
    async fn load_player_data(&self, player_id: Uuid) -> Result<PlayerQuestData, StoreError>;

    /// Remove a quest row and its objective rows
    async fn delete_player_quest(&self, player_id: Uuid, quest_id: &str) -> Result<(), StoreError>;

    async fn save_cooldown(&self, player_id: Uuid, quest_id: &str, until_millis: i64) -> Result<(), StoreError>;

    /// Delete cooldowns that ended before `now_millis`; returns how many
    async fn clear_expired_cooldowns(&self, now_millis: i64) -> Result<u64, StoreError>;
}

/// Store kept in process memory. Used by tests and when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryQuestStore {
    players: DashMap<Uuid, PlayerQuestData>,
}

impl MemoryQuestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuestStore for MemoryQuestStore {
    async fn save_player_quest(&self, player_id: Uuid, progress: &QuestProgress) -> Result<(), StoreError> {
        let mut data = self
            .players
            .entry(player_id)
            .or_insert_with(|| PlayerQuestData::new(player_id));
        let objectives = data
            .quests
            .get(&progress.quest_id)
            .map(|stored| stored.objectives.clone())
            .unwrap_or_default();

        // Objective rows are written separately, as in the SQL store
        let mut row = progress.clone();
        row.objectives = objectives;
        data.quests.insert(progress.quest_id.clone(), row);
        Ok(())
    }

    async fn save_objective_progress(
        &self,
        player_id: Uuid,
        quest_id: &str,
        objective: &ObjectiveProgress,
    ) -> Result<(), StoreError> {
        if let Some(mut data) = self.players.get_mut(&player_id) {
            if let Some(quest) = data.quests.get_mut(quest_id) {
                quest
                    .objectives
                    .insert(objective.objective_id.clone(), objective.clone());
            }
        }
        Ok(())
    }

    async fn load_player_data(&self, player_id: Uuid) -> Result<PlayerQuestData, StoreError> {
        Ok(self
            .players
            .get(&player_id)
            .map(|data| data.value().clone())
            .unwrap_or_else(|| PlayerQuestData::new(player_id)))
    }

    async fn delete_player_quest(&self, player_id: Uuid, quest_id: &str) -> Result<(), StoreError> {
        if let Some(mut data) = self.players.get_mut(&player_id) {
            data.quests.remove(quest_id);
        }
        Ok(())
    }

    async fn save_cooldown(&self, player_id: Uuid, quest_id: &str, until_millis: i64) -> Result<(), StoreError> {
        self.players
            .entry(player_id)
            .or_insert_with(|| PlayerQuestData::new(player_id))
            .set_cooldown(quest_id, until_millis);
        Ok(())
    }

    async fn clear_expired_cooldowns(&self, now_millis: i64) -> Result<u64, StoreError> {
        let mut cleared = 0;
        for mut data in self.players.iter_mut() {
            cleared += data.clear_expired_cooldowns(now_millis) as u64;
        }
        Ok(cleared)
    }
}

/// One queued write
#[derive(Debug)]
enum StoreOp {
    SaveQuest { player_id: Uuid, progress: QuestProgress },
    SaveObjective {
        player_id: Uuid,
        quest_id: String,
        objective: ObjectiveProgress,
    },
    DeleteQuest { player_id: Uuid, quest_id: String },
    SaveCooldown {
        player_id: Uuid,
        quest_id: String,
        until_millis: i64,
    },
    /// Answered once every earlier op has been applied
    Barrier(oneshot::Sender<()>),
}

/// Fire-and-forget handle to the store. Writes are applied in submission
/// order by a single background task.
#[derive(Clone)]
pub struct StoreWriter {
    tx: mpsc::UnboundedSender<StoreOp>,
    store: Arc<dyn QuestStore>,
}

impl StoreWriter {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn QuestStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StoreOp>();
        let worker_store = store.clone();

        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                apply(worker_store.as_ref(), op).await;
            }
            debug!("Store writer stopped");
        });

        Self { tx, store }
    }

    /// The store behind this writer, for reads
    pub fn store(&self) -> &Arc<dyn QuestStore> {
        &self.store
    }

    fn submit(&self, op: StoreOp) {
        if self.tx.send(op).is_err() {
            warn!("Store writer is gone, dropping write");
        }
    }

    pub fn save_quest(&self, player_id: Uuid, progress: &QuestProgress) {
        self.submit(StoreOp::SaveQuest {
            player_id,
            progress: progress.clone(),
        });
    }

    pub fn save_objective(&self, player_id: Uuid, quest_id: &str, objective: &ObjectiveProgress) {
        self.submit(StoreOp::SaveObjective {
            player_id,
            quest_id: quest_id.to_string(),
            objective: objective.clone(),
        });
    }

    pub fn delete_quest(&self, player_id: Uuid, quest_id: &str) {
        self.submit(StoreOp::DeleteQuest {
            player_id,
            quest_id: quest_id.to_string(),
        });
    }

    pub fn save_cooldown(&self, player_id: Uuid, quest_id: &str, until_millis: i64) {
        self.submit(StoreOp::SaveCooldown {
            player_id,
            quest_id: quest_id.to_string(),
            until_millis,
        });
    }

    /// Queue a full checkpoint of a player's state
    pub fn save_player(&self, data: &PlayerQuestData) {
        for progress in data.quests.values() {
            self.save_quest(data.player_id, progress);
            for objective in progress.objectives.values() {
                self.save_objective(data.player_id, &progress.quest_id, objective);
            }
        }
        for (quest_id, until) in &data.cooldowns {
            self.save_cooldown(data.player_id, quest_id, *until);
        }
    }

    /// Wait until every write submitted so far has been applied
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.submit(StoreOp::Barrier(tx));
        let _ = rx.await;
    }
}

async fn apply(store: &dyn QuestStore, op: StoreOp) {
    let result = match op {
        StoreOp::SaveQuest { player_id, progress } => store
            .save_player_quest(player_id, &progress)
            .await
            .map_err(|e| format!("save quest {} for {}: {}", progress.quest_id, player_id, e)),
        StoreOp::SaveObjective {
            player_id,
            quest_id,
            objective,
        } => store
            .save_objective_progress(player_id, &quest_id, &objective)
            .await
            .map_err(|e| format!("save objective {}/{} for {}: {}", quest_id, objective.objective_id, player_id, e)),
        StoreOp::DeleteQuest { player_id, quest_id } => store
            .delete_player_quest(player_id, &quest_id)
            .await
            .map_err(|e| format!("delete quest {} for {}: {}", quest_id, player_id, e)),
        StoreOp::SaveCooldown {
            player_id,
            quest_id,
            until_millis,
        } => store
            .save_cooldown(player_id, &quest_id, until_millis)
            .await
            .map_err(|e| format!("save cooldown {} for {}: {}", quest_id, player_id, e)),
        StoreOp::Barrier(done) => {
            let _ = done.send(());
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!("Failed to {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_writer_applies_in_order() {
        let store = Arc::new(MemoryQuestStore::new());
        let writer = StoreWriter::spawn(store.clone());
        let player = Uuid::new_v4();

        let mut progress = QuestProgress::new("mining_basics", Utc::now());
        writer.save_quest(player, &progress);
        progress.objective_mut("stone").add_progress(3, 10);
        writer.save_objective(player, "mining_basics", progress.objective("stone").unwrap());
        writer.save_cooldown(player, "mining_basics", 5_000);
        writer.flush().await;

        let data = store.load_player_data(player).await.unwrap();
        assert_eq!(data.get_quest("mining_basics").unwrap().current("stone"), 3);
        assert_eq!(data.cooldowns.get("mining_basics"), Some(&5_000));

        writer.delete_quest(player, "mining_basics");
        writer.flush().await;
        let data = store.load_player_data(player).await.unwrap();
        assert!(data.get_quest("mining_basics").is_none());
    }

    #[tokio::test]
    async fn test_failed_write_is_logged_not_fatal() {
        let mut store = MockQuestStore::new();
        store
            .expect_save_player_quest()
            .times(1)
            .returning(|_, _| Err(StoreError::Corrupt("disk full".to_string())));
        store.expect_save_cooldown().times(1).returning(|_, _, _| Ok(()));

        let writer = StoreWriter::spawn(Arc::new(store));
        let player = Uuid::new_v4();
        writer.save_quest(player, &QuestProgress::new("q", Utc::now()));
        writer.save_cooldown(player, "q", 1);
        writer.flush().await;
    }

    #[tokio::test]
    async fn test_unknown_player_loads_empty() {
        let store = MemoryQuestStore::new();
        let player = Uuid::new_v4();
        let data = store.load_player_data(player).await.unwrap();
        assert_eq!(data.player_id, player);
        assert!(data.quests.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_clears_expired_cooldowns() {
        let store = MemoryQuestStore::new();
        let player = Uuid::new_v4();
        store.save_cooldown(player, "a", 100).await.unwrap();
        store.save_cooldown(player, "b", 300).await.unwrap();
        assert_eq!(store.clear_expired_cooldowns(200).await.unwrap(), 1);
        let data = store.load_player_data(player).await.unwrap();
        assert!(data.cooldowns.contains_key("b"));
    }
}
