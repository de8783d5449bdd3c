//! Standalone host for the quest service.
//!
//! The binary wires config, catalog, store and background loops together but
//! has no game connection of its own. An embedding game loads players and feeds
//! actions through the library (`PlayerQuestManager::load_player`,
//! `process_action`); until one does, the save and sweep loops only cover
//! players already loaded, and notices are logged.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use quest_ledger::clock::{Clock, SystemClock};
use quest_ledger::config::QuestConfig;
use quest_ledger::db::SqliteQuestStore;
use quest_ledger::quest::{Audience, Outbound, PlayerQuestManager, QuestCatalog, QuestHooks};
use quest_ledger::store::{MemoryQuestStore, QuestStore, StoreWriter};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quest_ledger=info".parse().unwrap()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("QUEST_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("quest.toml"));

    let config = match QuestConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let catalog = match QuestCatalog::load(&PathBuf::from(&config.catalog.quest_dir)) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!("Failed to load quest catalog: {}", e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn QuestStore> = if config.storage.database_url.is_empty() {
        warn!("No database configured, quest progress will not survive a restart");
        Arc::new(MemoryQuestStore::new())
    } else {
        match SqliteQuestStore::new(&config.storage.database_url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Failed to open {}: {}", config.storage.database_url, e);
                std::process::exit(1);
            }
        }
    };
    let writer = StoreWriter::spawn(store);

    // Notices go to the host game; log them until one is attached
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<Outbound>();
    tokio::spawn(async move {
        while let Some(outbound) = notice_rx.recv().await {
            match outbound.audience {
                Audience::Player(player_id) => info!("[{}] {}", player_id, outbound.notice),
                Audience::Everyone => info!("[all] {}", outbound.notice),
            }
        }
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let manager = Arc::new(PlayerQuestManager::new(
        catalog,
        config.clone(),
        QuestHooks::default(),
        clock,
        writer,
        notice_tx,
    ));

    // Spawn auto-save loop over loaded players
    let save_manager = manager.clone();
    let auto_save = Duration::from_secs(config.storage.auto_save_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(auto_save);
        interval.tick().await;
        loop {
            interval.tick().await;
            let saved = save_manager.flush_all().await;
            if saved > 0 {
                info!("Auto-saved quest data for {} player(s)", saved);
            }
        }
    });

    // Spawn daily reset poll
    let daily = manager.daily().clone();
    let poll = Duration::from_secs(config.daily.poll_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll);
        loop {
            interval.tick().await;
            daily.poll_reset().await;
        }
    });

    // Spawn expired-cooldown sweep
    let sweep_manager = manager.clone();
    let sweep = Duration::from_secs(config.storage.cooldown_sweep_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep);
        loop {
            interval.tick().await;
            let cleared = sweep_manager.clear_expired_cooldowns().await;
            if cleared > 0 {
                info!("Cleared {} expired quest cooldown(s)", cleared);
            }
        }
    });

    info!(
        "Quest service running with {} quests, {} daily per player",
        manager.catalog().len(),
        config.daily.quests_per_day
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    let saved = manager.flush_all().await;
    info!("Shutting down, saved quest data for {} player(s)", saved);
}
