use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::quest::state::{ObjectiveProgress, PlayerQuestData, QuestProgress, QuestStatus};
use crate::store::{QuestStore, StoreError};

/// SQLite-backed [`QuestStore`]
pub struct SqliteQuestStore {
    pool: SqlitePool,
}

impl SqliteQuestStore {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_quests (
                uuid TEXT NOT NULL,
                quest_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                started_at INTEGER NOT NULL,
                completed_at INTEGER,
                PRIMARY KEY(uuid, quest_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS objective_progress (
                uuid TEXT NOT NULL,
                quest_id TEXT NOT NULL,
                objective_id TEXT NOT NULL,
                current_amount INTEGER NOT NULL DEFAULT 0,
                completed INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY(uuid, quest_id, objective_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quest_cooldowns (
                uuid TEXT NOT NULL,
                quest_id TEXT NOT NULL,
                cooldown_until INTEGER NOT NULL,
                PRIMARY KEY(uuid, quest_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {} out of range", millis)))
}

#[async_trait]
impl QuestStore for SqliteQuestStore {
    async fn save_player_quest(&self, player_id: Uuid, progress: &QuestProgress) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO player_quests (uuid, quest_id, status, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(player_id.to_string())
        .bind(&progress.quest_id)
        .bind(progress.status.as_str())
        .bind(progress.started_at.timestamp_millis())
        .bind(progress.completed_at.map(|t| t.timestamp_millis()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_objective_progress(
        &self,
        player_id: Uuid,
        quest_id: &str,
        objective: &ObjectiveProgress,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO objective_progress (uuid, quest_id, objective_id, current_amount, completed)
            VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(player_id.to_string())
        .bind(quest_id)
        .bind(&objective.objective_id)
        .bind(objective.current as i64)
        .bind(objective.completed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_player_data(&self, player_id: Uuid) -> Result<PlayerQuestData, StoreError> {
        let uuid = player_id.to_string();
        let mut data = PlayerQuestData::new(player_id);

        let quest_rows = sqlx::query(
            "SELECT quest_id, status, started_at, completed_at FROM player_quests WHERE uuid = ?",
        )
        .bind(&uuid)
        .fetch_all(&self.pool)
        .await?;

        for row in quest_rows {
            let quest_id: String = row.get("quest_id");
            let status_str: String = row.get("status");
            let status = QuestStatus::from_str(&status_str).ok_or_else(|| {
                StoreError::Corrupt(format!("quest {} has unknown status '{}'", quest_id, status_str))
            })?;
            if status == QuestStatus::Abandoned {
                continue;
            }

            let mut progress = QuestProgress::new(&quest_id, from_millis(row.get("started_at"))?);
            progress.status = status;
            let completed_at: Option<i64> = row.get("completed_at");
            progress.completed_at = completed_at.map(from_millis).transpose()?;
            data.quests.insert(quest_id, progress);
        }

        let objective_rows = sqlx::query(
            "SELECT quest_id, objective_id, current_amount, completed FROM objective_progress WHERE uuid = ?",
        )
        .bind(&uuid)
        .fetch_all(&self.pool)
        .await?;

        let mut objectives: HashMap<String, Vec<ObjectiveProgress>> = HashMap::new();
        for row in objective_rows {
            let current: i64 = row.get("current_amount");
            objectives
                .entry(row.get("quest_id"))
                .or_default()
                .push(ObjectiveProgress {
                    objective_id: row.get("objective_id"),
                    current: u32::try_from(current.max(0)).unwrap_or(u32::MAX),
                    completed: row.get("completed"),
                });
        }
        // Objective rows without a quest row are leftovers and ignored
        for (quest_id, list) in objectives {
            if let Some(progress) = data.quests.get_mut(&quest_id) {
                for objective in list {
                    progress.objectives.insert(objective.objective_id.clone(), objective);
                }
            }
        }

        let cooldown_rows = sqlx::query("SELECT quest_id, cooldown_until FROM quest_cooldowns WHERE uuid = ?")
            .bind(&uuid)
            .fetch_all(&self.pool)
            .await?;
        for row in cooldown_rows {
            data.cooldowns.insert(row.get("quest_id"), row.get("cooldown_until"));
        }

        Ok(data)
    }

    async fn delete_player_quest(&self, player_id: Uuid, quest_id: &str) -> Result<(), StoreError> {
        let uuid = player_id.to_string();

        sqlx::query("DELETE FROM objective_progress WHERE uuid = ? AND quest_id = ?")
            .bind(&uuid)
            .bind(quest_id)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM player_quests WHERE uuid = ? AND quest_id = ?")
            .bind(&uuid)
            .bind(quest_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn save_cooldown(&self, player_id: Uuid, quest_id: &str, until_millis: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO quest_cooldowns (uuid, quest_id, cooldown_until) VALUES (?, ?, ?)")
            .bind(player_id.to_string())
            .bind(quest_id)
            .bind(until_millis)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn clear_expired_cooldowns(&self, now_millis: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM quest_cooldowns WHERE cooldown_until < ?")
            .bind(now_millis)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn memory_store() -> SqliteQuestStore {
        // One connection, so every query sees the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteQuestStore::migrate(&pool).await.unwrap();
        SqliteQuestStore { pool }
    }

    #[tokio::test]
    async fn test_round_trip_player_data() {
        let store = memory_store().await;
        let player = Uuid::new_v4();
        let started = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();

        let mut active = QuestProgress::new("mining_basics", started);
        active.objective_mut("stone").add_progress(4, 10);
        store.save_player_quest(player, &active).await.unwrap();
        store
            .save_objective_progress(player, "mining_basics", active.objective("stone").unwrap())
            .await
            .unwrap();

        let mut done = QuestProgress::new("first_catch", started);
        done.complete(started + Duration::minutes(5));
        store.save_player_quest(player, &done).await.unwrap();
        store.save_cooldown(player, "first_catch", 1_700_000_900_000).await.unwrap();

        let data = store.load_player_data(player).await.unwrap();
        assert_eq!(data.quests.len(), 2);
        assert_eq!(data.get_quest("mining_basics").unwrap(), &active);
        assert_eq!(data.get_quest("first_catch").unwrap().completed_at, done.completed_at);
        assert_eq!(data.cooldowns.get("first_catch"), Some(&1_700_000_900_000));
    }

    #[tokio::test]
    async fn test_delete_removes_objectives() {
        let store = memory_store().await;
        let player = Uuid::new_v4();

        let mut progress = QuestProgress::new("q", Utc::now());
        progress.objective_mut("a").add_progress(1, 5);
        store.save_player_quest(player, &progress).await.unwrap();
        store
            .save_objective_progress(player, "q", progress.objective("a").unwrap())
            .await
            .unwrap();
        store.delete_player_quest(player, "q").await.unwrap();

        // Restarting writes a fresh row with no objective carry-over
        store
            .save_player_quest(player, &QuestProgress::new("q", Utc::now()))
            .await
            .unwrap();
        let data = store.load_player_data(player).await.unwrap();
        assert!(data.get_quest("q").unwrap().objectives.is_empty());
    }

    #[tokio::test]
    async fn test_clear_expired_cooldowns() {
        let store = memory_store().await;
        let player = Uuid::new_v4();
        store.save_cooldown(player, "old", 1_000).await.unwrap();
        store.save_cooldown(player, "new", 9_000).await.unwrap();

        assert_eq!(store.clear_expired_cooldowns(5_000).await.unwrap(), 1);
        let data = store.load_player_data(player).await.unwrap();
        assert_eq!(data.cooldowns.len(), 1);
        assert!(data.cooldowns.contains_key("new"));
    }

    #[tokio::test]
    async fn test_unknown_player_is_empty() {
        let store = memory_store().await;
        let data = store.load_player_data(Uuid::new_v4()).await.unwrap();
        assert!(data.quests.is_empty());
        assert!(data.cooldowns.is_empty());
    }
}
