//! Daily quest selection
//!
//! Every player gets a deterministic set of quests per calendar day, seeded
//! from the date and the player's id. Hard quests with a multi-day window
//! are carried forward until their window closes. Selections are cached
//! per player and dropped wholesale when the day rolls over.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use dashmap::DashMap;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::DailyConfig;

use super::definition::{Quest, QuestCategory};
use super::events::{Outbound, QuestNotice};
use super::hooks::{ProgressSource, progress_or_zero};
use super::registry::QuestCatalog;

/// Days since 1970-01-01
pub fn epoch_day(date: NaiveDate) -> i64 {
    date.signed_duration_since(NaiveDate::default()).num_days()
}

pub fn day_seed(date: NaiveDate) -> i64 {
    epoch_day(date).wrapping_mul(31).wrapping_add(17)
}

/// 32-bit fold of the id's two halves
pub fn player_hash(player_id: Uuid) -> i32 {
    let (hi, lo) = player_id.as_u64_pair();
    let folded = hi ^ lo;
    ((folded >> 32) as i32) ^ (folded as i32)
}

/// Stable 31-polynomial hash of a quest id
pub fn quest_hash(quest_id: &str) -> i32 {
    quest_id
        .encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// Position of `quest` in its multi-day cycle on `date`; 0 is the first day
pub fn day_offset(quest: &Quest, date: NaiveDate) -> u32 {
    let days = quest.days_available.max(1) as i64;
    (epoch_day(date) + quest_hash(&quest.id) as i64).rem_euclid(days) as u32
}

/// Hard quests still inside a window that opened on an earlier day
pub fn carried_forward(hard: &[Arc<Quest>], date: NaiveDate) -> Vec<Arc<Quest>> {
    hard.iter()
        .filter(|q| q.days_available > 1 && day_offset(q, date) > 0)
        .cloned()
        .collect()
}

/// Pick the day's quests for one player. Pure: the same inputs always give
/// the same ordered list.
pub fn generate(
    catalog: &QuestCatalog,
    player_progress: f64,
    date: NaiveDate,
    player_id: Uuid,
    quests_per_day: usize,
) -> Vec<Arc<Quest>> {
    let seed = day_seed(date).wrapping_add(player_hash(player_id) as i64);
    let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);

    let mut normal = catalog.for_progress(player_progress, false);
    let mut hard = catalog.hard_quests(player_progress);
    normal.shuffle(&mut rng);
    hard.shuffle(&mut rng);

    let mut selected = carried_forward(&hard, date);

    if !selected.iter().any(|q| q.hard) && selected.len() < quests_per_day {
        if let Some(fresh) = hard.iter().find(|q| !selected.iter().any(|s| s.id == q.id)) {
            selected.push(fresh.clone());
        }
    }

    // Round-robin over categories in shuffled order for variety
    let mut by_category: BTreeMap<QuestCategory, Vec<Arc<Quest>>> = BTreeMap::new();
    for quest in normal {
        by_category.entry(quest.category).or_default().push(quest);
    }
    let mut categories: Vec<QuestCategory> = by_category.keys().copied().collect();
    categories.shuffle(&mut rng);
    let mut pools: Vec<std::vec::IntoIter<Arc<Quest>>> = categories
        .iter()
        .filter_map(|c| by_category.remove(c))
        .map(Vec::into_iter)
        .collect();

    let mut index = 0;
    while selected.len() < quests_per_day && !pools.is_empty() {
        index %= pools.len();
        match pools[index].next() {
            Some(quest) => {
                selected.push(quest);
                index += 1;
            }
            None => {
                pools.remove(index);
            }
        }
    }

    selected.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.sort_order.cmp(&b.sort_order))
    });
    selected
}

/// A player's cached selection
#[derive(Debug, Clone)]
pub struct DailySelection {
    pub date: NaiveDate,
    pub quests: Vec<Arc<Quest>>,
}

/// The current quest day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DayState {
    date: NaiveDate,
    seed: i64,
}

impl DayState {
    fn for_date(date: NaiveDate) -> Self {
        Self {
            date,
            seed: day_seed(date),
        }
    }
}

pub struct DailySelector {
    catalog: Arc<QuestCatalog>,
    progress: Arc<dyn ProgressSource>,
    clock: Arc<dyn Clock>,
    config: RwLock<DailyConfig>,
    /// Readers hold this while using the cache, so a reset is never seen half-applied
    day: RwLock<DayState>,
    cache: DashMap<Uuid, DailySelection>,
    notices: mpsc::UnboundedSender<Outbound>,
}

impl DailySelector {
    pub fn new(
        catalog: Arc<QuestCatalog>,
        progress: Arc<dyn ProgressSource>,
        clock: Arc<dyn Clock>,
        config: DailyConfig,
        notices: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let today = clock.local_now().date();
        Self {
            catalog,
            progress,
            clock,
            config: RwLock::new(config),
            day: RwLock::new(DayState::for_date(today)),
            cache: DashMap::new(),
            notices,
        }
    }

    /// Date the current selections belong to
    pub async fn current_date(&self) -> NaiveDate {
        self.day.read().await.date
    }

    pub async fn current_seed(&self) -> i64 {
        self.day.read().await.seed
    }

    /// Today's quests for a player, generated on first request of the day
    pub async fn daily_quests(&self, player_id: Uuid) -> Vec<Arc<Quest>> {
        let day = self.day.read().await;

        if let Some(selection) = self.cache.get(&player_id) {
            if selection.date == day.date {
                return selection.quests.clone();
            }
        }

        let quests_per_day = self.config.read().await.quests_per_day;
        let player_progress = progress_or_zero(self.progress.as_ref(), player_id).await;
        let quests = generate(&self.catalog, player_progress, day.date, player_id, quests_per_day);
        debug!(
            "Generated {} daily quests for {} on {}",
            quests.len(),
            player_id,
            day.date
        );

        self.cache.insert(
            player_id,
            DailySelection {
                date: day.date,
                quests: quests.clone(),
            },
        );
        quests
    }

    pub async fn is_daily_quest(&self, player_id: Uuid, quest_id: &str) -> bool {
        self.daily_quests(player_id)
            .await
            .iter()
            .any(|q| q.id == quest_id)
    }

    /// Days left in a hard quest's window, counting today
    pub async fn remaining_days(&self, quest: &Quest) -> u32 {
        if !quest.is_multi_day() {
            return 1;
        }
        let date = self.current_date().await;
        quest
            .days_available
            .saturating_sub(day_offset(quest, date))
            .max(1)
    }

    /// Roll the day over if the date changed and the reset hour has passed.
    /// Returns true if a reset happened.
    pub async fn poll_reset(&self) -> bool {
        let now = self.clock.local_now();
        let reset_hour = self.config.read().await.reset_hour();

        let mut day = self.day.write().await;
        if now.date() == day.date || now.hour() < reset_hour {
            return false;
        }

        *day = DayState::for_date(now.date());
        self.cache.clear();
        drop(day);

        info!("Daily quests have been reset for {}", now.date());
        let _ = self.notices.send(Outbound::to_everyone(QuestNotice::DailyReset));
        true
    }

    /// Time until the next reset, from the current clock
    pub async fn time_until_reset(&self) -> Duration {
        let reset_hour = self.config.read().await.reset_hour();
        time_until_reset(self.clock.local_now(), reset_hour)
    }

    /// Replace the settings and drop every cached selection
    pub async fn reload_config(&self, config: DailyConfig) {
        let _day = self.day.write().await;
        *self.config.write().await = config;
        self.cache.clear();
        info!("Daily quest settings reloaded");
    }

    /// Drop one player's cached selection
    pub fn evict(&self, player_id: Uuid) {
        self.cache.remove(&player_id);
    }

    pub fn cached_players(&self) -> usize {
        self.cache.len()
    }
}

/// Time from `now` until the next occurrence of `reset_hour`
pub fn time_until_reset(now: NaiveDateTime, reset_hour: u32) -> Duration {
    let today_reset = now
        .date()
        .and_hms_opt(reset_hour.min(23), 0, 0)
        .unwrap_or_else(|| now.date().and_time(chrono::NaiveTime::MIN));
    let next = if now < today_reset {
        today_reset
    } else {
        today_reset + Duration::days(1)
    };
    next - now
}

/// "3h 12m", or "12m" under an hour
pub fn format_time_until_reset(remaining: Duration) -> String {
    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes() % 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::quest::definition::{Objective, RawObjective};
    use crate::quest::hooks::{MockProgressSource, NoProgress};

    fn objective() -> Objective {
        Objective::from_raw(&RawObjective {
            id: "fish".to_string(),
            objective_type: "fish".to_string(),
            amount: 3,
            description: None,
            material: None,
            entity: None,
            data: None,
        })
        .unwrap()
    }

    fn quest(id: &str, category: QuestCategory, sort_order: i32) -> Quest {
        Quest::builder(id)
            .category(category)
            .sort_order(sort_order)
            .objective(objective())
            .build()
            .unwrap()
    }

    fn hard_quest(id: &str, days: u32) -> Quest {
        Quest::builder(id)
            .category(QuestCategory::Expert)
            .hard(true)
            .days_available(days)
            .objective(objective())
            .build()
            .unwrap()
    }

    fn catalog() -> QuestCatalog {
        let mut quests = Vec::new();
        for (i, category) in [QuestCategory::Beginner, QuestCategory::Early, QuestCategory::Intermediate]
            .into_iter()
            .enumerate()
        {
            for n in 0..4 {
                quests.push(quest(&format!("{}_{}", category.as_str(), n), category, (i * 10 + n) as i32));
            }
        }
        QuestCatalog::from_quests(quests)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ids(quests: &[Arc<Quest>]) -> Vec<String> {
        quests.iter().map(|q| q.id.clone()).collect()
    }

    #[test]
    fn test_seeds_are_stable() {
        assert_eq!(epoch_day(date(1970, 1, 2)), 1);
        assert_eq!(day_seed(date(1970, 1, 1)), 17);
        assert_eq!(quest_hash("a"), 97);
        assert_eq!(quest_hash("ab"), 97 * 31 + 98);
        assert_eq!(player_hash(Uuid::from_u64_pair(1 << 32, 0)), 1);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let catalog = catalog();
        let player = Uuid::new_v4();
        let day = date(2026, 4, 12);

        let first = generate(&catalog, 100.0, day, player, 5);
        let second = generate(&catalog, 100.0, day, player, 5);
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn test_selection_spans_categories() {
        let catalog = catalog();
        for n in 0..20u64 {
            let player = Uuid::from_u64_pair(n, n * 7 + 3);
            let selected = generate(&catalog, 100.0, date(2026, 4, 12), player, 3);
            let mut categories: Vec<_> = selected.iter().map(|q| q.category).collect();
            categories.dedup();
            assert_eq!(categories.len(), 3, "round-robin picks one per category first");
        }
    }

    #[test]
    fn test_sorted_by_category_then_sort_order() {
        let selected = generate(&catalog(), 100.0, date(2026, 4, 12), Uuid::new_v4(), 12);
        assert_eq!(selected.len(), 12);
        for pair in selected.windows(2) {
            assert!((pair[0].category, pair[0].sort_order) <= (pair[1].category, pair[1].sort_order));
        }
    }

    #[test]
    fn test_progress_limits_pool() {
        let catalog = QuestCatalog::from_quests(vec![
            quest("easy", QuestCategory::Beginner, 0),
            Quest::builder("late")
                .category(QuestCategory::Advanced)
                .required_progress(60.0)
                .objective(objective())
                .build()
                .unwrap(),
        ]);
        let selected = generate(&catalog, 10.0, date(2026, 4, 12), Uuid::new_v4(), 5);
        assert_eq!(ids(&selected), vec!["easy".to_string()]);
    }

    #[test]
    fn test_at_most_one_fresh_hard_quest() {
        let mut quests = vec![quest("a", QuestCategory::Beginner, 0), quest("b", QuestCategory::Early, 0)];
        quests.push(hard_quest("single_a", 1));
        quests.push(hard_quest("single_b", 1));
        let catalog = QuestCatalog::from_quests(quests);

        let selected = generate(&catalog, 100.0, date(2026, 4, 12), Uuid::new_v4(), 5);
        assert_eq!(selected.iter().filter(|q| q.hard).count(), 1);
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_hard_quest_carried_for_its_window() {
        let hard = Arc::new(hard_quest("dragon_hunt", 3));
        let catalog = QuestCatalog::from_quests(vec![
            quest("a", QuestCategory::Beginner, 0),
            (*hard).clone(),
        ]);
        let player = Uuid::new_v4();

        // Find a day that opens the window
        let mut day_n = date(2026, 4, 1);
        while day_offset(&hard, day_n) != 0 {
            day_n += Duration::days(1);
        }

        let on_day = |offset: i64| {
            let day = day_n + Duration::days(offset);
            (
                ids(&generate(&catalog, 100.0, day, player, 5)),
                ids(&carried_forward(std::slice::from_ref(&hard), day)),
            )
        };

        let (selected, carried) = on_day(0);
        assert!(selected.contains(&"dragon_hunt".to_string()));
        assert!(carried.is_empty());

        for offset in [1, 2] {
            let (selected, carried) = on_day(offset);
            assert!(selected.contains(&"dragon_hunt".to_string()));
            assert_eq!(carried, vec!["dragon_hunt".to_string()]);
        }

        // Window closed; only a fresh pick could bring it back
        let (_, carried) = on_day(3);
        assert!(carried.is_empty());
    }

    #[test]
    fn test_format_time_until_reset() {
        let now = date(2026, 4, 12).and_hms_opt(20, 48, 0).unwrap();
        let remaining = time_until_reset(now, 0);
        assert_eq!(format_time_until_reset(remaining), "3h 12m");

        let now = date(2026, 4, 12).and_hms_opt(5, 48, 0).unwrap();
        assert_eq!(format_time_until_reset(time_until_reset(now, 6)), "12m");
    }

    fn selector(clock: Arc<ManualClock>, reset_hour: u32) -> (DailySelector, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = DailyConfig {
            reset_hour,
            ..DailyConfig::default()
        };
        (
            DailySelector::new(Arc::new(catalog()), Arc::new(NoProgress), clock, config, tx),
            rx,
        )
    }

    #[tokio::test]
    async fn test_reset_waits_for_reset_hour() {
        let clock = Arc::new(ManualClock::at(date(2026, 4, 12).and_hms_opt(22, 0, 0).unwrap()));
        let (selector, mut rx) = selector(clock.clone(), 6);
        let player = Uuid::new_v4();

        selector.daily_quests(player).await;
        assert_eq!(selector.cached_players(), 1);

        // Past midnight but before the reset hour
        clock.advance(Duration::hours(4));
        assert!(!selector.poll_reset().await);
        assert_eq!(selector.current_date().await, date(2026, 4, 12));

        clock.advance(Duration::hours(4));
        assert!(selector.poll_reset().await);
        assert_eq!(selector.current_date().await, date(2026, 4, 13));
        assert_eq!(selector.current_seed().await, day_seed(date(2026, 4, 13)));
        assert_eq!(selector.cached_players(), 0);
        assert_eq!(rx.try_recv().unwrap().notice, QuestNotice::DailyReset);

        assert!(!selector.poll_reset().await);
    }

    #[tokio::test]
    async fn test_out_of_range_reset_hour_still_rolls_over() {
        let clock = Arc::new(ManualClock::at(date(2026, 4, 12).and_hms_opt(22, 0, 0).unwrap()));
        let (selector, _rx) = selector(clock.clone(), 30);

        clock.advance(Duration::hours(24));
        assert!(!selector.poll_reset().await);

        // Clamped to the last hour of the day
        clock.advance(Duration::hours(1));
        assert!(selector.poll_reset().await);
        assert_eq!(selector.current_date().await, date(2026, 4, 13));
    }

    #[tokio::test]
    async fn test_cached_until_reset() {
        let clock = Arc::new(ManualClock::at(date(2026, 4, 12).and_hms_opt(9, 0, 0).unwrap()));
        let mut source = MockProgressSource::new();
        source.expect_player_progress().times(2).returning(|_| Some(100.0));
        let (tx, _rx) = mpsc::unbounded_channel();
        let selector = DailySelector::new(
            Arc::new(catalog()),
            Arc::new(source),
            clock.clone(),
            DailyConfig::default(),
            tx,
        );
        let player = Uuid::new_v4();

        let first = selector.daily_quests(player).await;
        let again = selector.daily_quests(player).await;
        assert_eq!(ids(&first), ids(&again));
        assert!(selector.is_daily_quest(player, &first[0].id).await);

        clock.advance(Duration::days(1));
        assert!(selector.poll_reset().await);
        let next_day = selector.daily_quests(player).await;
        assert_eq!(next_day.len(), 5);
    }

    #[tokio::test]
    async fn test_remaining_days() {
        let clock = Arc::new(ManualClock::at(date(2026, 4, 12).and_hms_opt(9, 0, 0).unwrap()));
        let (selector, _rx) = selector(clock, 0);
        let hard = hard_quest("dragon_hunt", 3);
        let today = selector.current_date().await;

        assert_eq!(selector.remaining_days(&hard).await, 3 - day_offset(&hard, today));
        assert_eq!(selector.remaining_days(&quest("a", QuestCategory::Beginner, 0)).await, 1);
    }

    #[tokio::test]
    async fn test_reload_config_clears_cache() {
        let clock = Arc::new(ManualClock::at(date(2026, 4, 12).and_hms_opt(9, 0, 0).unwrap()));
        let (selector, _rx) = selector(clock, 0);
        let player = Uuid::new_v4();
        selector.daily_quests(player).await;

        selector
            .reload_config(DailyConfig {
                quests_per_day: 2,
                ..DailyConfig::default()
            })
            .await;
        assert_eq!(selector.cached_players(), 0);
        assert_eq!(selector.daily_quests(player).await.len(), 2);
    }
}
