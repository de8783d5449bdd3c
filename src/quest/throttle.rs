//! Progress notification throttle
//!
//! Decides whether a progress update should be shown to the player.
//! Updates surface at milestones (at most eight per objective) or after a
//! lull, subject to a per-quest minimum interval. A rolling per-player
//! history flags players who receive too many messages.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::ThrottleConfig;

/// Milestones per objective, at most
const MILESTONE_BUCKETS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Suppress,
    Notify,
    /// Notify, and tell the player once that they are being flooded
    NotifyWithSpamWarning,
}

impl ThrottleDecision {
    pub fn should_notify(&self) -> bool {
        !matches!(self, ThrottleDecision::Suppress)
    }
}

/// Whether `current` is a milestone for an objective of size `target`
pub fn is_milestone(current: u32, target: u32) -> bool {
    if target <= MILESTONE_BUCKETS {
        return true;
    }
    let interval = (target / MILESTONE_BUCKETS).max(1);
    current % interval == 0
}

pub struct ProgressThrottle {
    config: ThrottleConfig,
    clock: Arc<dyn Clock>,
    /// Absent means enabled
    enabled: DashMap<Uuid, bool>,
    /// (player, quest, objective) -> last progress touch, millis
    last_progress: DashMap<(Uuid, String, String), i64>,
    /// (player, quest) -> last message sent, millis
    last_message: DashMap<(Uuid, String), i64>,
    /// player -> send times inside the spam window
    history: DashMap<Uuid, VecDeque<i64>>,
    /// Players already told they are over the threshold
    warned: DashMap<Uuid, ()>,
}

impl ProgressThrottle {
    pub fn new(config: ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            enabled: DashMap::new(),
            last_progress: DashMap::new(),
            last_message: DashMap::new(),
            history: DashMap::new(),
            warned: DashMap::new(),
        }
    }

    pub fn is_enabled(&self, player_id: Uuid) -> bool {
        self.enabled.get(&player_id).map(|e| *e).unwrap_or(true)
    }

    pub fn set_enabled(&self, player_id: Uuid, enabled: bool) {
        self.enabled.insert(player_id, enabled);
    }

    /// Flip the player's setting and return the new value
    pub fn toggle(&self, player_id: Uuid) -> bool {
        let mut entry = self.enabled.entry(player_id).or_insert(true);
        *entry = !*entry;
        *entry
    }

    /// Decide on one progress update
    pub fn should_notify(
        &self,
        player_id: Uuid,
        quest_id: &str,
        objective_id: &str,
        current: u32,
        target: u32,
    ) -> ThrottleDecision {
        if !self.is_enabled(player_id) {
            return ThrottleDecision::Suppress;
        }

        let now = self.clock.now_millis();

        if current >= target {
            return self.record_send(player_id, quest_id, now);
        }

        let touch_key = (player_id, quest_id.to_string(), objective_id.to_string());
        let previous_touch = self.last_progress.insert(touch_key, now);

        if !is_milestone(current, target) {
            let after_lull = previous_touch
                .is_some_and(|last| now - last > self.config.inactivity_threshold_ms);
            if !after_lull {
                return ThrottleDecision::Suppress;
            }
        }

        if !self.can_send(player_id, quest_id, now) {
            return ThrottleDecision::Suppress;
        }
        self.record_send(player_id, quest_id, now)
    }

    fn can_send(&self, player_id: Uuid, quest_id: &str, now: i64) -> bool {
        self.last_message
            .get(&(player_id, quest_id.to_string()))
            .is_none_or(|last| now - *last >= self.config.min_time_between_ms)
    }

    fn record_send(&self, player_id: Uuid, quest_id: &str, now: i64) -> ThrottleDecision {
        self.last_message.insert((player_id, quest_id.to_string()), now);

        let window_start = now - self.config.spam_window_secs * 1000;
        let over_threshold = {
            let mut history = self.history.entry(player_id).or_default();
            history.push_back(now);
            while history.front().is_some_and(|t| *t < window_start) {
                history.pop_front();
            }
            history.len() >= self.config.max_messages_in_window
        };

        if !over_threshold {
            self.warned.remove(&player_id);
            return ThrottleDecision::Notify;
        }
        if self.warned.insert(player_id, ()).is_none() {
            ThrottleDecision::NotifyWithSpamWarning
        } else {
            ThrottleDecision::Notify
        }
    }

    /// Forget everything about a player except their on/off setting
    pub fn clear_player(&self, player_id: Uuid) {
        self.last_progress.retain(|(p, _, _), _| *p != player_id);
        self.last_message.retain(|(p, _), _| *p != player_id);
        self.history.remove(&player_id);
        self.warned.remove(&player_id);
    }
}
