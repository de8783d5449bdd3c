//! Objective Matching
//!
//! Decides whether a player action advances an objective. Pure functions,
//! one per objective kind, plus the material family table.

use super::definition::{Objective, ObjectiveKind, ObjectiveType};
use super::events::ActionPayload;

/// A generic "representative" material that stands for a whole family.
/// Only materials listed here generalize; any other key matches exactly.
pub struct FamilyRule {
    pub representative: &'static str,
    pub matches: fn(&str) -> bool,
}

fn is_log_family(m: &str) -> bool {
    m.ends_with("_LOG")
        || m.ends_with("_WOOD")
        || m.ends_with("_STEM")
        || m.ends_with("_HYPHAE")
        || m.starts_with("STRIPPED_")
}

fn excludes_stone(m: &str) -> bool {
    !m.contains("STONE") && !m.contains("BRICK") && !m.contains("QUARTZ")
}

pub static FAMILY_RULES: &[FamilyRule] = &[
    FamilyRule {
        representative: "OAK_PLANKS",
        matches: |m| m.ends_with("_PLANKS"),
    },
    FamilyRule {
        representative: "OAK_LOG",
        matches: is_log_family,
    },
    FamilyRule {
        representative: "OAK_FENCE",
        matches: |m| m.ends_with("_FENCE") && !m.ends_with("_FENCE_GATE"),
    },
    FamilyRule {
        representative: "OAK_FENCE_GATE",
        matches: |m| m.ends_with("_FENCE_GATE"),
    },
    FamilyRule {
        representative: "OAK_DOOR",
        matches: |m| m.ends_with("_DOOR") && !m.ends_with("_TRAPDOOR"),
    },
    FamilyRule {
        representative: "OAK_TRAPDOOR",
        matches: |m| m.ends_with("_TRAPDOOR"),
    },
    FamilyRule {
        representative: "OAK_BOAT",
        matches: |m| m.ends_with("_BOAT") || m.ends_with("_RAFT"),
    },
    FamilyRule {
        representative: "OAK_STAIRS",
        matches: |m| m.ends_with("_STAIRS") && excludes_stone(m),
    },
    FamilyRule {
        representative: "OAK_SLAB",
        matches: |m| m.ends_with("_SLAB") && excludes_stone(m),
    },
    FamilyRule {
        representative: "OAK_BUTTON",
        matches: |m| m.ends_with("_BUTTON") && m != "STONE_BUTTON",
    },
    FamilyRule {
        representative: "OAK_PRESSURE_PLATE",
        matches: |m| m.ends_with("_PRESSURE_PLATE") && !m.contains("STONE") && !m.contains("WEIGHTED"),
    },
    FamilyRule {
        representative: "WHITE_WOOL",
        matches: |m| m.ends_with("_WOOL"),
    },
    FamilyRule {
        representative: "WHITE_CONCRETE",
        matches: |m| m.ends_with("_CONCRETE"),
    },
    FamilyRule {
        representative: "WHITE_TERRACOTTA",
        matches: |m| m.ends_with("_TERRACOTTA") || m == "TERRACOTTA",
    },
    FamilyRule {
        representative: "TERRACOTTA",
        matches: |m| m.ends_with("_TERRACOTTA") || m == "TERRACOTTA",
    },
];

/// Family rule whose representative is `material`, if any
pub fn family_rule(material: &str) -> Option<&'static FamilyRule> {
    FAMILY_RULES.iter().find(|r| r.representative == material)
}

/// Whether an action on `actual` counts for an objective keyed on `required`.
/// Both sides are compared upper-cased.
pub fn material_matches(required: &str, actual: &str) -> bool {
    let required = required.to_uppercase();
    let actual = actual.to_uppercase();
    if required == actual {
        return true;
    }
    family_rule(&required).is_some_and(|rule| (rule.matches)(&actual))
}

/// Whether an action of `action_type` with `payload` advances `objective`
pub fn matches(objective: &Objective, action_type: ObjectiveType, payload: &ActionPayload) -> bool {
    if objective.objective_type != action_type {
        return false;
    }

    match (&objective.kind, payload) {
        (ObjectiveKind::Kill { entity }, ActionPayload::Entity(actual)) => {
            entity.eq_ignore_ascii_case(actual)
        }
        (ObjectiveKind::Material { material }, ActionPayload::Material(actual)) => {
            material_matches(material, actual)
        }
        (ObjectiveKind::Keyed { key }, ActionPayload::Key(actual)) => key == actual,
        (ObjectiveKind::Counted { key: None }, _) => true,
        (ObjectiveKind::Counted { key: Some(key) }, ActionPayload::Key(actual)) => key == actual,
        _ => false,
    }
}
