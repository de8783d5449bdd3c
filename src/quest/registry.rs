//! Quest Registry
//!
//! Loads quest definitions from TOML catalog files into an immutable
//! [`QuestCatalog`]. A broken entry is logged and skipped; it never stops
//! the rest of the catalog from loading.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::definition::{Quest, QuestCategory, RawQuest};

/// Every loaded quest, indexed by id and by category
#[derive(Debug, Default)]
pub struct QuestCatalog {
    quests: HashMap<String, Arc<Quest>>,
    /// Sorted by sort_order, then id
    by_category: BTreeMap<QuestCategory, Vec<Arc<Quest>>>,
}

impl QuestCatalog {
    /// Build from already-resolved quests. Later duplicates replace earlier ones.
    pub fn from_quests(quests: impl IntoIterator<Item = Quest>) -> Self {
        let mut map: HashMap<String, Arc<Quest>> = HashMap::new();
        for quest in quests {
            if map.contains_key(&quest.id) {
                warn!("Duplicate quest id '{}', keeping the later definition", quest.id);
            }
            map.insert(quest.id.clone(), Arc::new(quest));
        }

        let mut by_category: BTreeMap<QuestCategory, Vec<Arc<Quest>>> = BTreeMap::new();
        for quest in map.values() {
            by_category.entry(quest.category).or_default().push(quest.clone());
        }
        for list in by_category.values_mut() {
            list.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));
        }

        Self {
            quests: map,
            by_category,
        }
    }

    /// Load every `*.toml` file under `dir`, recursively
    pub fn load(dir: &Path) -> Result<Self, String> {
        info!("Loading quests from {:?}", dir);

        if !dir.exists() {
            warn!("Quest directory does not exist: {:?}", dir);
            return Ok(Self::default());
        }

        let mut paths = Vec::new();
        collect_toml_files(dir, &mut paths)?;
        paths.sort();

        let mut quests = Vec::new();
        for path in paths {
            match std::fs::read_to_string(&path) {
                Ok(content) => quests.extend(parse_catalog_file(&content, &path.display().to_string())),
                Err(e) => warn!("Failed to read quest file {:?}: {}", path, e),
            }
        }

        let catalog = Self::from_quests(quests);
        info!(
            "Loaded {} quest definitions in {} categories",
            catalog.len(),
            catalog.by_category.len()
        );
        Ok(catalog)
    }

    /// Get a quest by ID
    pub fn get(&self, quest_id: &str) -> Option<Arc<Quest>> {
        self.quests.get(quest_id).cloned()
    }

    pub fn contains(&self, quest_id: &str) -> bool {
        self.quests.contains_key(quest_id)
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    /// All quests, in category then sort order
    pub fn all(&self) -> Vec<Arc<Quest>> {
        self.by_category.values().flatten().cloned().collect()
    }

    /// Quests of one category, sorted by sort_order ascending
    pub fn by_category(&self, category: QuestCategory) -> Vec<Arc<Quest>> {
        self.by_category.get(&category).cloned().unwrap_or_default()
    }

    /// Categories that have at least one quest
    pub fn categories(&self) -> Vec<QuestCategory> {
        self.by_category.keys().copied().collect()
    }

    /// Quests whose requirement is at or below `progress`
    pub fn for_progress(&self, progress: f64, include_hard: bool) -> Vec<Arc<Quest>> {
        self.all()
            .into_iter()
            .filter(|q| q.required_progress <= progress && (include_hard || !q.hard))
            .collect()
    }

    /// Hard quests whose requirement is at or below `progress`
    pub fn hard_quests(&self, progress: f64) -> Vec<Arc<Quest>> {
        self.all()
            .into_iter()
            .filter(|q| q.hard && q.required_progress <= progress)
            .collect()
    }
}

/// Recursively collect `*.toml` paths
fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory {:?}: {}", dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
        let path = entry.path();

        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }

    Ok(())
}

/// Parse one catalog file. Each `[quests.<id>]` entry is resolved on its
/// own so a bad entry only loses itself.
pub fn parse_catalog_file(content: &str, source: &str) -> Vec<Quest> {
    let table: toml::Table = match toml::from_str(content) {
        Ok(table) => table,
        Err(e) => {
            warn!("Failed to parse quest file {}: {}", source, e);
            return Vec::new();
        }
    };

    let Some(entries) = table.get("quests").and_then(|v| v.as_table()) else {
        warn!("Quest file {} has no [quests] table", source);
        return Vec::new();
    };

    let mut quests = Vec::new();
    for (id, value) in entries {
        let resolved = value
            .clone()
            .try_into::<RawQuest>()
            .map_err(|e| e.to_string())
            .and_then(|raw| Quest::from_raw(id, &raw));

        match resolved {
            Ok(quest) => quests.push(quest),
            Err(e) => warn!("Skipping quest '{}' in {}: {}", id, source, e),
        }
    }
    quests
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BEGINNER_FILE: &str = r#"
[quests.mining_basics]
name = "Mining Basics"
category = "beginner"
sort_order = 2

[[quests.mining_basics.objectives]]
id = "stone"
type = "mine"
amount = 10
material = "STONE"

[quests.mining_basics.rewards]
coins = 100.0
experience = 25

[quests.first_catch]
name = "First Catch"
category = "Beginner"
sort_order = 1

[[quests.first_catch.objectives]]
id = "fish"
type = "fish"
amount = 3

[quests.broken]
name = "Broken"

[[quests.broken.objectives]]
id = "teleport"
type = "teleport"
amount = 1
"#;

    const HARD_FILE: &str = r#"
[quests.deep_dive]
name = "Deep Dive"
category = "expert"
required_progress = 80.0
hard = true

[[quests.deep_dive.objectives]]
id = "ancient"
type = "mine"
amount = 4
material = "ANCIENT_DEBRIS"

[quests.lumberjack]
category = "mystery"
required_progress = 20.0

[[quests.lumberjack.objectives]]
id = "logs"
type = "collect"
amount = 64
material = "OAK_LOG"
"#;

    #[test]
    fn test_bad_entry_is_skipped() {
        let quests = parse_catalog_file(BEGINNER_FILE, "beginner.toml");
        let mut ids: Vec<_> = quests.iter().map(|q| q.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["first_catch", "mining_basics"]);
    }

    #[test]
    fn test_invalid_file_yields_nothing() {
        assert!(parse_catalog_file("[quests.x\nname=", "bad.toml").is_empty());
        assert!(parse_catalog_file("title = \"no quests\"", "empty.toml").is_empty());
    }

    #[test]
    fn test_load_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("hard");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp_dir.path().join("beginner.toml"), BEGINNER_FILE).unwrap();
        std::fs::write(nested.join("expert.toml"), HARD_FILE).unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = QuestCatalog::load(temp_dir.path()).unwrap();
        assert_eq!(catalog.len(), 4);

        let beginner: Vec<_> = catalog
            .by_category(QuestCategory::Beginner)
            .iter()
            .map(|q| q.id.clone())
            .collect();
        // lumberjack falls back to beginner with the default sort_order of 0
        assert_eq!(beginner, vec!["lumberjack", "first_catch", "mining_basics"]);

        let deep_dive = catalog.get("deep_dive").unwrap();
        assert_eq!(deep_dive.days_available, 3);
        assert_eq!(deep_dive.category, QuestCategory::Expert);
    }

    #[test]
    fn test_progress_queries() {
        let mut quests = parse_catalog_file(BEGINNER_FILE, "beginner.toml");
        quests.extend(parse_catalog_file(HARD_FILE, "expert.toml"));
        let catalog = QuestCatalog::from_quests(quests);

        assert_eq!(catalog.for_progress(10.0, true).len(), 2);
        assert_eq!(catalog.for_progress(90.0, false).len(), 3);
        assert_eq!(catalog.for_progress(90.0, true).len(), 4);
        assert!(catalog.hard_quests(50.0).is_empty());
        assert_eq!(catalog.hard_quests(80.0).len(), 1);
    }

    #[test]
    fn test_duplicate_ids_keep_later() {
        let first = Quest::builder("dup").name("First").build().unwrap();
        let second = Quest::builder("dup").name("Second").build().unwrap();
        let catalog = QuestCatalog::from_quests(vec![first, second]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("dup").unwrap().name, "Second");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = QuestCatalog::load(&temp_dir.path().join("nope")).unwrap();
        assert!(catalog.is_empty());
    }
}
