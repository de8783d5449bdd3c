//! Quest Event Types
//!
//! Inbound player actions that can advance objectives, and the outbound
//! notices the quest system emits for the host to deliver.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::definition::ObjectiveType;

/// The player an operation acts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestPlayer {
    pub id: Uuid,
    pub name: String,
    /// Skip the progress requirement when starting quests
    pub bypass_progress: bool,
}

impl QuestPlayer {
    pub fn new(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            bypass_progress: false,
        }
    }

    pub fn with_bypass(mut self) -> Self {
        self.bypass_progress = true;
        self
    }
}

/// What the action was performed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPayload {
    /// Block or item material (mine, craft, collect, place, smelt)
    Material(String),
    /// Entity type (kill)
    Entity(String),
    /// Free-form key (visit, custom, advancement)
    Key(String),
    None,
}

/// A player action captured by the host, e.g. "mined 1 DIAMOND_ORE"
#[derive(Debug, Clone)]
pub struct QuestAction {
    pub player: QuestPlayer,
    pub objective_type: ObjectiveType,
    pub payload: ActionPayload,
    pub amount: u32,
}

impl QuestAction {
    pub fn new(player: QuestPlayer, objective_type: ObjectiveType, payload: ActionPayload, amount: u32) -> Self {
        Self {
            player,
            objective_type,
            payload,
            amount,
        }
    }

    pub fn mined(player: QuestPlayer, material: &str) -> Self {
        Self::new(player, ObjectiveType::Mine, ActionPayload::Material(material.to_uppercase()), 1)
    }

    pub fn killed(player: QuestPlayer, entity: &str) -> Self {
        Self::new(player, ObjectiveType::Kill, ActionPayload::Entity(entity.to_uppercase()), 1)
    }

    pub fn visited(player: QuestPlayer, location: &str) -> Self {
        Self::new(player, ObjectiveType::Visit, ActionPayload::Key(location.to_string()), 1)
    }
}

/// Message for a player, or for everyone online
#[derive(Debug, Clone, PartialEq)]
pub enum QuestNotice {
    Started { quest_name: String },
    Progress {
        quest_name: String,
        objective: String,
        current: u32,
        target: u32,
    },
    ObjectiveComplete { quest_name: String, objective: String },
    Completed { quest_name: String, rewards: Vec<String> },
    /// Server-wide announcement of a completion
    Broadcast { player_name: String, quest_name: String },
    Abandoned { quest_name: String },
    /// Starting or tracking failed; carries the user-facing reason
    Refused { reason: String },
    /// Emitted once when a player crosses the spam threshold
    SpamWarning,
    DailyReset,
}

impl fmt::Display for QuestNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestNotice::Started { quest_name } => write!(f, "Quest started: {}", quest_name),
            QuestNotice::Progress {
                quest_name,
                objective,
                current,
                target,
            } => write!(f, "{}: {} ({}/{})", quest_name, objective, current, target),
            QuestNotice::ObjectiveComplete { quest_name, objective } => {
                write!(f, "{}: {} complete!", quest_name, objective)
            }
            QuestNotice::Completed { quest_name, rewards } if rewards.is_empty() => {
                write!(f, "Quest complete: {}", quest_name)
            }
            QuestNotice::Completed { quest_name, rewards } => {
                write!(f, "Quest complete: {} (+{})", quest_name, rewards.join(", +"))
            }
            QuestNotice::Broadcast {
                player_name,
                quest_name,
            } => write!(f, "{} completed the quest {}!", player_name, quest_name),
            QuestNotice::Abandoned { quest_name } => write!(f, "Quest abandoned: {}", quest_name),
            QuestNotice::Refused { reason } => write!(f, "{}", reason),
            QuestNotice::SpamWarning => write!(
                f,
                "You are receiving a lot of quest updates. Use /quest updates to turn them off."
            ),
            QuestNotice::DailyReset => write!(f, "Daily quests have been reset!"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Player(Uuid),
    Everyone,
}

/// A notice addressed to its audience
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub audience: Audience,
    pub notice: QuestNotice,
}

impl Outbound {
    pub fn to_player(player_id: Uuid, notice: QuestNotice) -> Self {
        Self {
            audience: Audience::Player(player_id),
            notice,
        }
    }

    pub fn to_everyone(notice: QuestNotice) -> Self {
        Self {
            audience: Audience::Everyone,
            notice,
        }
    }
}

/// Result of applying one action to one objective
#[derive(Debug, Clone, PartialEq)]
pub struct QuestEventResult {
    pub quest_id: String,
    pub objective_id: String,
    pub new_progress: u32,
    pub target: u32,
    /// The objective was completed by this action
    pub objective_completed: bool,
    /// The quest was completed by this action
    pub quest_completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_display() {
        let notice = QuestNotice::Progress {
            quest_name: "Mining Basics".to_string(),
            objective: "Mine 10 Stone".to_string(),
            current: 4,
            target: 10,
        };
        assert_eq!(notice.to_string(), "Mining Basics: Mine 10 Stone (4/10)");

        let notice = QuestNotice::Completed {
            quest_name: "Mining Basics".to_string(),
            rewards: vec!["100 coins".to_string(), "25 experience".to_string()],
        };
        assert_eq!(notice.to_string(), "Quest complete: Mining Basics (+100 coins, +25 experience)");
    }

    #[test]
    fn test_action_constructors_normalize() {
        let player = QuestPlayer::new(Uuid::new_v4(), "Steve");
        let action = QuestAction::mined(player, "diamond_ore");
        assert_eq!(action.payload, ActionPayload::Material("DIAMOND_ORE".to_string()));
        assert_eq!(action.amount, 1);
    }
}
