//! Quest progress tracking with deterministic daily quests and throttled
//! progress notifications.

pub mod clock;
pub mod config;
pub mod db;
pub mod quest;
pub mod store;
