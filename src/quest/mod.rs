//! Quest System Module
//!
//! Quest definitions loaded from TOML catalogs, per-player progress, daily
//! quest rotation and throttled progress notifications.

pub mod daily;
pub mod definition;
pub mod events;
pub mod hooks;
pub mod manager;
pub mod matcher;
pub mod registry;
pub mod rewards;
pub mod state;
pub mod throttle;

pub use daily::{DailySelection, DailySelector};
pub use definition::{Objective, ObjectiveKind, ObjectiveType, Quest, QuestCategory, Reward};
pub use events::{ActionPayload, Audience, Outbound, QuestAction, QuestEventResult, QuestNotice, QuestPlayer};
pub use hooks::{Economy, ProgressSource, QuestHooks, RewardSink};
pub use manager::{PlayerQuestManager, QuestRefusal};
pub use registry::QuestCatalog;
pub use state::{ObjectiveProgress, PlayerQuestData, QuestProgress, QuestStatus};
pub use throttle::{ProgressThrottle, ThrottleDecision};
