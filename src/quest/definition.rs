//! Quest Definition Structures
//!
//! Raw structures are deserialized from TOML catalog files; resolved
//! structures are built once at load time and never mutated afterwards.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Raw quest data as it appears in TOML (`[quests.<id>]`)
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuest {
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub icon: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub required_progress: f64,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub hard: bool,
    /// Defaults to 3 for hard quests, 1 otherwise
    pub days_available: Option<u32>,
    #[serde(default)]
    pub objectives: Vec<RawObjective>,
    #[serde(default)]
    pub rewards: Option<RawReward>,
}

/// Raw objective as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawObjective {
    pub id: String,
    #[serde(rename = "type")]
    pub objective_type: String,
    #[serde(default = "default_amount")]
    pub amount: u32,
    pub description: Option<String>,
    pub material: Option<String>,
    pub entity: Option<String>,
    pub data: Option<String>,
}

fn default_amount() -> u32 {
    1
}

/// Raw reward as it appears in TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReward {
    #[serde(default)]
    pub coins: f64,
    #[serde(default)]
    pub tokens: f64,
    #[serde(default)]
    pub experience: u32,
    #[serde(default)]
    pub items: Vec<RawItemReward>,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// Item reward entry
#[derive(Debug, Clone, Deserialize)]
pub struct RawItemReward {
    pub material: String,
    #[serde(default = "default_amount")]
    pub amount: u32,
}

// ============================================================================
// Resolved Quest Structures (after parsing)
// ============================================================================

/// Difficulty tier, ordered from easiest to hardest. Each tier covers a
/// 20-point band of player progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QuestCategory {
    Beginner,
    Early,
    Intermediate,
    Advanced,
    Expert,
}

impl QuestCategory {
    pub const ALL: [QuestCategory; 5] = [
        QuestCategory::Beginner,
        QuestCategory::Early,
        QuestCategory::Intermediate,
        QuestCategory::Advanced,
        QuestCategory::Expert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestCategory::Beginner => "beginner",
            QuestCategory::Early => "early",
            QuestCategory::Intermediate => "intermediate",
            QuestCategory::Advanced => "advanced",
            QuestCategory::Expert => "expert",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            QuestCategory::Beginner => "Beginner",
            QuestCategory::Early => "Early Game",
            QuestCategory::Intermediate => "Intermediate",
            QuestCategory::Advanced => "Advanced",
            QuestCategory::Expert => "Expert",
        }
    }

    /// Inclusive lower bound of the tier's progress band
    pub fn min_progress(&self) -> u32 {
        match self {
            QuestCategory::Beginner => 0,
            QuestCategory::Early => 20,
            QuestCategory::Intermediate => 40,
            QuestCategory::Advanced => 60,
            QuestCategory::Expert => 80,
        }
    }

    pub fn max_progress(&self) -> u32 {
        self.min_progress() + 20
    }

    /// e.g. "0-20%"
    pub fn progress_range(&self) -> String {
        format!("{}-{}%", self.min_progress(), self.max_progress())
    }

    pub fn contains(&self, progress: f64) -> bool {
        progress >= self.min_progress() as f64 && progress < self.max_progress() as f64
    }

    /// Tier for a progress value; anything at or above 100 is Expert.
    pub fn from_progress(progress: f64) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| c.contains(progress))
            .unwrap_or(QuestCategory::Expert)
    }

    /// Match either the key or the display name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| {
            c.as_str().eq_ignore_ascii_case(name) || c.display_name().eq_ignore_ascii_case(name)
        })
    }
}

/// Objective types supported by the quest system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectiveType {
    Mine,
    Craft,
    Collect,
    Place,
    Smelt,
    Kill,
    Fish,
    Breed,
    Enchant,
    Trade,
    LevelUp,
    Visit,
    Advancement,
    Custom,
}

impl ObjectiveType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mine" => Some(ObjectiveType::Mine),
            "craft" => Some(ObjectiveType::Craft),
            "collect" => Some(ObjectiveType::Collect),
            "place" => Some(ObjectiveType::Place),
            "smelt" => Some(ObjectiveType::Smelt),
            "kill" => Some(ObjectiveType::Kill),
            "fish" => Some(ObjectiveType::Fish),
            "breed" => Some(ObjectiveType::Breed),
            "enchant" => Some(ObjectiveType::Enchant),
            "trade" => Some(ObjectiveType::Trade),
            "level_up" | "levelup" => Some(ObjectiveType::LevelUp),
            "visit" => Some(ObjectiveType::Visit),
            "advancement" => Some(ObjectiveType::Advancement),
            "custom" => Some(ObjectiveType::Custom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveType::Mine => "mine",
            ObjectiveType::Craft => "craft",
            ObjectiveType::Collect => "collect",
            ObjectiveType::Place => "place",
            ObjectiveType::Smelt => "smelt",
            ObjectiveType::Kill => "kill",
            ObjectiveType::Fish => "fish",
            ObjectiveType::Breed => "breed",
            ObjectiveType::Enchant => "enchant",
            ObjectiveType::Trade => "trade",
            ObjectiveType::LevelUp => "level_up",
            ObjectiveType::Visit => "visit",
            ObjectiveType::Advancement => "advancement",
            ObjectiveType::Custom => "custom",
        }
    }

    /// Description template used when the catalog entry gives none
    pub fn default_description(&self) -> &'static str {
        match self {
            ObjectiveType::Kill => "Kill %amount% %entity%",
            ObjectiveType::Mine => "Mine %amount% %material%",
            ObjectiveType::Craft => "Craft %amount% %material%",
            ObjectiveType::Collect => "Collect %amount% %material%",
            ObjectiveType::Place => "Place %amount% %material%",
            ObjectiveType::Smelt => "Smelt %amount% %material%",
            ObjectiveType::Fish => "Catch %amount% fish",
            ObjectiveType::Breed => "Breed %amount% animals",
            ObjectiveType::Enchant => "Enchant %amount% items",
            ObjectiveType::Trade => "Complete %amount% villager trades",
            ObjectiveType::LevelUp => "Gain %amount% experience levels",
            ObjectiveType::Visit => "Visit %data%",
            ObjectiveType::Advancement => "Earn advancement: %data%",
            ObjectiveType::Custom => "Complete: %data%",
        }
    }

    pub fn is_material(&self) -> bool {
        matches!(
            self,
            ObjectiveType::Mine
                | ObjectiveType::Craft
                | ObjectiveType::Collect
                | ObjectiveType::Place
                | ObjectiveType::Smelt
        )
    }
}

/// What an objective is keyed on. The variant is fixed by the objective type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ObjectiveKind {
    /// KILL: an entity family, matched exactly
    Kill { entity: String },
    /// MINE/CRAFT/COLLECT/PLACE/SMELT: a material, with family generalization
    Material { material: String },
    /// VISIT/CUSTOM: a free-form key, matched exactly
    Keyed { key: String },
    /// FISH/BREED/ENCHANT/TRADE/LEVEL_UP/ADVANCEMENT: counted occurrences,
    /// optionally narrowed to one key
    Counted { key: Option<String> },
}

impl ObjectiveKind {
    fn for_type(objective_type: ObjectiveType, raw: &RawObjective) -> Result<Self, String> {
        let required = |value: &Option<String>, field: &str| {
            value
                .as_ref()
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or_else(|| {
                    format!(
                        "Objective '{}' of type {} requires '{}'",
                        raw.id,
                        objective_type.as_str(),
                        field
                    )
                })
        };

        match objective_type {
            ObjectiveType::Kill => Ok(ObjectiveKind::Kill {
                entity: required(&raw.entity, "entity")?.to_uppercase(),
            }),
            t if t.is_material() => Ok(ObjectiveKind::Material {
                material: required(&raw.material, "material")?.to_uppercase(),
            }),
            ObjectiveType::Visit | ObjectiveType::Custom => Ok(ObjectiveKind::Keyed {
                key: required(&raw.data, "data")?,
            }),
            _ => Ok(ObjectiveKind::Counted {
                key: raw.data.clone().filter(|d| !d.trim().is_empty()),
            }),
        }
    }
}

/// A resolved quest objective
#[derive(Debug, Clone, Serialize)]
pub struct Objective {
    pub id: String,
    pub objective_type: ObjectiveType,
    pub kind: ObjectiveKind,
    /// Amount required, always > 0
    pub amount: u32,
    /// Display template with %material%/%entity%/%data%/%amount% placeholders
    pub description: String,
}

impl Objective {
    pub fn from_raw(raw: &RawObjective) -> Result<Self, String> {
        let objective_type = ObjectiveType::from_str(&raw.objective_type).ok_or_else(|| {
            format!(
                "Invalid objective type '{}' for objective '{}'",
                raw.objective_type, raw.id
            )
        })?;
        if raw.id.trim().is_empty() {
            return Err("Objective with empty id".to_string());
        }
        if raw.amount == 0 {
            return Err(format!("Objective '{}' has amount 0", raw.id));
        }

        Ok(Self {
            id: raw.id.clone(),
            objective_type,
            kind: ObjectiveKind::for_type(objective_type, raw)?,
            amount: raw.amount,
            description: raw
                .description
                .clone()
                .unwrap_or_else(|| objective_type.default_description().to_string()),
        })
    }

    /// Description with placeholders filled in
    pub fn formatted_description(&self) -> String {
        let mut desc = self.description.clone();
        match &self.kind {
            ObjectiveKind::Kill { entity } => {
                desc = desc.replace("%entity%", &humanize(entity));
            }
            ObjectiveKind::Material { material } => {
                desc = desc.replace("%material%", &humanize(material));
            }
            ObjectiveKind::Keyed { key } | ObjectiveKind::Counted { key: Some(key) } => {
                desc = desc.replace("%data%", key);
            }
            ObjectiveKind::Counted { key: None } => {}
        }
        desc.replace("%amount%", &self.amount.to_string())
    }
}

/// `OAK_LOG` -> `Oak log`
pub fn humanize(key: &str) -> String {
    let lower = key.to_lowercase().replace('_', " ");
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Item reward entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReward {
    pub material: String,
    pub amount: u32,
}

/// Quest rewards
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reward {
    pub coins: f64,
    pub tokens: f64,
    pub experience: u32,
    pub items: Vec<ItemReward>,
    /// Command templates; `%player%` is replaced with the player's name
    pub commands: Vec<String>,
}

impl Reward {
    pub fn from_raw(raw: &RawReward) -> Self {
        Self {
            coins: raw.coins.max(0.0),
            tokens: raw.tokens.max(0.0),
            experience: raw.experience,
            items: raw
                .items
                .iter()
                .filter(|i| i.amount > 0)
                .map(|i| ItemReward {
                    material: i.material.to_uppercase(),
                    amount: i.amount,
                })
                .collect(),
            commands: raw.commands.clone(),
        }
    }

    pub fn has_rewards(&self) -> bool {
        self.coins > 0.0
            || self.tokens > 0.0
            || self.experience > 0
            || !self.items.is_empty()
            || !self.commands.is_empty()
    }

    /// Short display lines, e.g. "1.5k coins"
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.coins > 0.0 {
            lines.push(format!("{} coins", format_amount(self.coins)));
        }
        if self.tokens > 0.0 {
            lines.push(format!("{} tokens", format_amount(self.tokens)));
        }
        if self.experience > 0 {
            lines.push(format!("{} experience", self.experience));
        }
        if !self.items.is_empty() {
            lines.push(format!("{} item(s)", self.items.len()));
        }
        lines
    }
}

fn format_amount(amount: f64) -> String {
    if amount >= 1000.0 {
        format!("{:.1}k", amount / 1000.0)
    } else {
        format!("{:.0}", amount)
    }
}

/// A fully resolved quest definition
#[derive(Debug, Clone)]
pub struct Quest {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub category: QuestCategory,
    /// Minimum external progress (0-100) needed to start
    pub required_progress: f64,
    pub objectives: Vec<Objective>,
    pub rewards: Reward,
    pub repeatable: bool,
    pub cooldown_seconds: u64,
    pub sort_order: i32,
    pub hard: bool,
    /// Length of a hard quest's multi-day window, always >= 1
    pub days_available: u32,
}

impl Quest {
    pub fn builder(id: &str) -> QuestBuilder {
        QuestBuilder::new(id)
    }

    /// Create a Quest from a raw TOML entry
    pub fn from_raw(id: &str, raw: &RawQuest) -> Result<Self, String> {
        let objectives = raw
            .objectives
            .iter()
            .map(Objective::from_raw)
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = Quest::builder(id)
            .description(&raw.description)
            .required_progress(raw.required_progress)
            .repeatable(raw.repeatable)
            .cooldown_seconds(raw.cooldown_seconds)
            .sort_order(raw.sort_order)
            .hard(raw.hard)
            .days_available(raw.days_available.unwrap_or(if raw.hard { 3 } else { 1 }))
            .objectives(objectives);

        if let Some(name) = &raw.name {
            builder = builder.name(name);
        }
        if let Some(icon) = &raw.icon {
            builder = builder.icon(icon);
        }
        if let Some(name) = &raw.category {
            let category = QuestCategory::from_name(name).unwrap_or_else(|| {
                warn!("Quest '{}' has unknown category '{}', using beginner", id, name);
                QuestCategory::Beginner
            });
            builder = builder.category(category);
        }
        if let Some(rewards) = &raw.rewards {
            builder = builder.rewards(Reward::from_raw(rewards));
        }

        builder.build()
    }

    pub fn get_objective(&self, id: &str) -> Option<&Objective> {
        self.objectives.iter().find(|o| o.id == id)
    }

    pub fn total_objectives(&self) -> usize {
        self.objectives.len()
    }

    /// The 20-point band the requirement falls in, e.g. "40-60"
    pub fn progress_range(&self) -> String {
        let lower = ((self.required_progress / 20.0).floor() * 20.0).clamp(0.0, 80.0) as u32;
        format!("{}-{}", lower, (lower + 20).min(100))
    }

    /// Whether this quest spans more than one day of the daily rotation
    pub fn is_multi_day(&self) -> bool {
        self.hard && self.days_available > 1
    }
}

/// Validating constructor for [`Quest`]
#[derive(Debug, Clone)]
pub struct QuestBuilder {
    quest: Quest,
}

impl QuestBuilder {
    fn new(id: &str) -> Self {
        Self {
            quest: Quest {
                id: id.to_string(),
                name: id.to_string(),
                description: String::new(),
                icon: "BOOK".to_string(),
                category: QuestCategory::Beginner,
                required_progress: 0.0,
                objectives: Vec::new(),
                rewards: Reward::default(),
                repeatable: false,
                cooldown_seconds: 0,
                sort_order: 0,
                hard: false,
                days_available: 1,
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.quest.name = name.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.quest.description = description.to_string();
        self
    }

    pub fn icon(mut self, icon: &str) -> Self {
        self.quest.icon = icon.to_uppercase();
        self
    }

    pub fn category(mut self, category: QuestCategory) -> Self {
        self.quest.category = category;
        self
    }

    pub fn required_progress(mut self, required: f64) -> Self {
        self.quest.required_progress = required;
        self
    }

    pub fn objective(mut self, objective: Objective) -> Self {
        self.quest.objectives.push(objective);
        self
    }

    pub fn objectives(mut self, objectives: Vec<Objective>) -> Self {
        self.quest.objectives = objectives;
        self
    }

    pub fn rewards(mut self, rewards: Reward) -> Self {
        self.quest.rewards = rewards;
        self
    }

    pub fn repeatable(mut self, repeatable: bool) -> Self {
        self.quest.repeatable = repeatable;
        self
    }

    pub fn cooldown_seconds(mut self, seconds: u64) -> Self {
        self.quest.cooldown_seconds = seconds;
        self
    }

    pub fn sort_order(mut self, sort_order: i32) -> Self {
        self.quest.sort_order = sort_order;
        self
    }

    pub fn hard(mut self, hard: bool) -> Self {
        self.quest.hard = hard;
        self
    }

    /// Clamped to at least one day
    pub fn days_available(mut self, days: u32) -> Self {
        self.quest.days_available = days.max(1);
        self
    }

    pub fn build(self) -> Result<Quest, String> {
        let quest = self.quest;
        if quest.id.trim().is_empty() {
            return Err("Quest with empty id".to_string());
        }
        if !(0.0..=100.0).contains(&quest.required_progress) {
            return Err(format!(
                "Quest '{}' has required_progress {} outside 0-100",
                quest.id, quest.required_progress
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for objective in &quest.objectives {
            if !seen.insert(objective.id.as_str()) {
                return Err(format!(
                    "Quest '{}' has duplicate objective id '{}'",
                    quest.id, objective.id
                ));
            }
        }
        Ok(quest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_objective(objective_type: &str) -> RawObjective {
        RawObjective {
            id: "obj".to_string(),
            objective_type: objective_type.to_string(),
            amount: 4,
            description: None,
            material: None,
            entity: None,
            data: None,
        }
    }

    #[test]
    fn test_objective_type_parsing() {
        assert_eq!(ObjectiveType::from_str("mine"), Some(ObjectiveType::Mine));
        assert_eq!(ObjectiveType::from_str("LEVEL_UP"), Some(ObjectiveType::LevelUp));
        assert_eq!(ObjectiveType::from_str("Advancement"), Some(ObjectiveType::Advancement));
        assert_eq!(ObjectiveType::from_str("teleport"), None);
    }

    #[test]
    fn test_objective_requires_type_specific_key() {
        assert!(Objective::from_raw(&raw_objective("mine")).is_err());
        assert!(Objective::from_raw(&raw_objective("kill")).is_err());
        assert!(Objective::from_raw(&raw_objective("visit")).is_err());

        let fish = Objective::from_raw(&raw_objective("fish")).unwrap();
        assert_eq!(fish.kind, ObjectiveKind::Counted { key: None });

        let mut mine = raw_objective("mine");
        mine.material = Some("oak_log".to_string());
        let mine = Objective::from_raw(&mine).unwrap();
        assert_eq!(mine.kind, ObjectiveKind::Material { material: "OAK_LOG".to_string() });
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut raw = raw_objective("fish");
        raw.amount = 0;
        assert!(Objective::from_raw(&raw).is_err());
    }

    #[test]
    fn test_formatted_description() {
        let mut raw = raw_objective("mine");
        raw.material = Some("DIAMOND_ORE".to_string());
        let objective = Objective::from_raw(&raw).unwrap();
        assert_eq!(objective.formatted_description(), "Mine 4 Diamond ore");

        let mut raw = raw_objective("visit");
        raw.data = Some("the Spawn Plaza".to_string());
        raw.description = Some("Go to %data% (%amount%x)".to_string());
        let objective = Objective::from_raw(&raw).unwrap();
        assert_eq!(objective.formatted_description(), "Go to the Spawn Plaza (4x)");
    }

    #[test]
    fn test_days_available_clamped_and_defaulted() {
        let quest = Quest::builder("q").hard(true).days_available(0).build().unwrap();
        assert_eq!(quest.days_available, 1);

        let raw: RawQuest = toml::from_str("hard = true").unwrap();
        let quest = Quest::from_raw("hard_one", &raw).unwrap();
        assert_eq!(quest.days_available, 3);
        assert!(quest.is_multi_day());

        let raw: RawQuest = toml::from_str("").unwrap();
        let quest = Quest::from_raw("plain", &raw).unwrap();
        assert_eq!(quest.days_available, 1);
        assert_eq!(quest.name, "plain");
    }

    #[test]
    fn test_category_lookup() {
        assert_eq!(QuestCategory::from_name("EARLY"), Some(QuestCategory::Early));
        assert_eq!(QuestCategory::from_name("early game"), Some(QuestCategory::Early));
        assert_eq!(QuestCategory::from_name("legendary"), None);
        assert_eq!(QuestCategory::from_progress(0.0), QuestCategory::Beginner);
        assert_eq!(QuestCategory::from_progress(59.9), QuestCategory::Intermediate);
        assert_eq!(QuestCategory::from_progress(100.0), QuestCategory::Expert);
        assert!(QuestCategory::Beginner < QuestCategory::Expert);
        assert_eq!(QuestCategory::Advanced.progress_range(), "60-80%");
    }

    #[test]
    fn test_reward_summary() {
        let reward = Reward {
            coins: 1500.0,
            experience: 20,
            ..Reward::default()
        };
        assert!(reward.has_rewards());
        assert_eq!(reward.summary(), vec!["1.5k coins".to_string(), "20 experience".to_string()]);
        assert!(!Reward::default().has_rewards());
    }

    #[test]
    fn test_required_progress_validated() {
        assert!(Quest::builder("q").required_progress(120.0).build().is_err());
        let quest = Quest::builder("q").required_progress(45.0).build().unwrap();
        assert_eq!(quest.progress_range(), "40-60");
    }
}
