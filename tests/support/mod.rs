#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use gw2_achievements::app::{ProgressEvent, ProgressSink};
use gw2_achievements::config::ApiKey;
use gw2_achievements::domain::{
    Achievement, AchievementId, BuildId, Category, CategoryId, Group, GroupId, ProgressRecord,
    Reward, Snapshot,
};
use gw2_achievements::error::TrackerError;
use gw2_achievements::gw2::{CatalogClient, ProgressClient, ProgressClientFactory, ProgressError};
use gw2_achievements::store::CacheStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Build,
    ListGroups,
    ListCategories,
    ListAchievements,
    FetchGroups(usize),
    FetchCategories(usize),
    FetchAchievements(usize),
}

impl Call {
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            Call::FetchGroups(_) | Call::FetchCategories(_) | Call::FetchAchievements(_)
        )
    }
}

#[derive(Default)]
pub struct MockCatalog {
    pub build: u64,
    pub groups: BTreeMap<GroupId, Group>,
    pub categories: BTreeMap<CategoryId, Category>,
    pub achievements: BTreeMap<AchievementId, Achievement>,
    /// Listed but never returned by a fetch.
    pub withheld: BTreeSet<AchievementId>,
    pub fail_achievement_fetch: bool,
    pub calls: Mutex<Vec<Call>>,
}

impl MockCatalog {
    pub fn new(build: u64) -> Self {
        Self {
            build,
            ..Self::default()
        }
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.insert(group.id.clone(), group);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.categories.insert(category.id, category);
        self
    }

    pub fn with_achievement(mut self, achievement: Achievement) -> Self {
        self.achievements.insert(achievement.id, achievement);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_fetch).collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl CatalogClient for MockCatalog {
    fn current_build(&self) -> Result<BuildId, TrackerError> {
        self.record(Call::Build);
        Ok(BuildId::new(self.build))
    }

    fn list_group_ids(&self) -> Result<BTreeSet<GroupId>, TrackerError> {
        self.record(Call::ListGroups);
        Ok(self.groups.keys().cloned().collect())
    }

    fn list_category_ids(&self) -> Result<BTreeSet<CategoryId>, TrackerError> {
        self.record(Call::ListCategories);
        Ok(self.categories.keys().copied().collect())
    }

    fn list_achievement_ids(&self) -> Result<BTreeSet<AchievementId>, TrackerError> {
        self.record(Call::ListAchievements);
        Ok(self.achievements.keys().copied().collect())
    }

    fn fetch_groups(&self, ids: &[GroupId]) -> Result<Vec<Group>, TrackerError> {
        self.record(Call::FetchGroups(ids.len()));
        Ok(ids
            .iter()
            .filter_map(|id| self.groups.get(id).cloned())
            .collect())
    }

    fn fetch_categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, TrackerError> {
        self.record(Call::FetchCategories(ids.len()));
        Ok(ids
            .iter()
            .filter_map(|id| self.categories.get(id).cloned())
            .collect())
    }

    fn fetch_achievements(&self, ids: &[AchievementId]) -> Result<Vec<Achievement>, TrackerError> {
        self.record(Call::FetchAchievements(ids.len()));
        if self.fail_achievement_fetch {
            return Err(TrackerError::ApiStatus {
                status: 503,
                message: "API not active".to_string(),
            });
        }
        Ok(ids
            .iter()
            .filter(|id| !self.withheld.contains(*id))
            .filter_map(|id| self.achievements.get(id).cloned())
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub stored: Mutex<Option<Snapshot>>,
    pub saves: Mutex<usize>,
    pub fail_save: bool,
    pub fail_load: bool,
}

impl MemoryStore {
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            stored: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    pub fn stored(&self) -> Option<Snapshot> {
        self.stored.lock().unwrap().clone()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<Option<Snapshot>, TrackerError> {
        if self.fail_load {
            return Err(TrackerError::Cache("corrupt gzip stream".to_string()));
        }
        Ok(self.stored())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), TrackerError> {
        if self.fail_save {
            return Err(TrackerError::Filesystem("disk full".to_string()));
        }
        *self.saves.lock().unwrap() += 1;
        *self.stored.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }

    fn clear(&self) -> Result<bool, TrackerError> {
        Ok(self.stored.lock().unwrap().take().is_some())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

#[derive(Clone)]
pub struct MockProgress {
    pub response: Result<Vec<ProgressRecord>, ProgressError>,
}

impl ProgressClient for MockProgress {
    fn list_progress(&self) -> Result<Vec<ProgressRecord>, ProgressError> {
        self.response.clone()
    }
}

/// Hands out canned progress per API key.
#[derive(Default)]
pub struct MockAccounts {
    pub by_key: BTreeMap<String, Result<Vec<ProgressRecord>, ProgressError>>,
}

impl ProgressClientFactory for MockAccounts {
    type Client = MockProgress;

    fn client_for(&self, key: &ApiKey) -> MockProgress {
        let response = self
            .by_key
            .get(key.expose())
            .cloned()
            .unwrap_or_else(|| Err(ProgressError::Rejected("Invalid access token".to_string())));
        MockProgress { response }
    }
}

pub fn group(id: &str, name: &str, order: i64, categories: &[u32]) -> Group {
    Group {
        id: GroupId::new(id),
        name: name.to_string(),
        description: String::new(),
        order,
        categories: categories.iter().copied().map(CategoryId::new).collect(),
    }
}

pub fn category(id: u32, name: &str, order: i64, achievements: &[u32]) -> Category {
    Category {
        id: CategoryId::new(id),
        name: name.to_string(),
        description: String::new(),
        order,
        icon: None,
        achievements: achievements.iter().copied().map(AchievementId::new).collect(),
    }
}

pub fn achievement(id: u32, name: &str) -> Achievement {
    Achievement {
        id: AchievementId::new(id),
        name: name.to_string(),
        description: String::new(),
        requirement: String::new(),
        kind: "Default".to_string(),
        flags: Vec::new(),
        rewards: Vec::new(),
    }
}

pub fn mastery(mut achievement: Achievement, region: &str) -> Achievement {
    achievement.rewards.push(Reward {
        kind: "Mastery".to_string(),
        id: Some(1),
        count: None,
        region: Some(region.to_string()),
    });
    achievement
}

pub fn done(id: u32) -> ProgressRecord {
    ProgressRecord {
        id: AchievementId::new(id),
        done: true,
        current: None,
        max: None,
    }
}

pub fn partial(id: u32, current: u64, max: u64) -> ProgressRecord {
    ProgressRecord {
        id: AchievementId::new(id),
        done: false,
        current: Some(current),
        max: Some(max),
    }
}

/// A small catalog: two groups, three categories, five achievements.
pub fn sample_catalog(build: u64) -> MockCatalog {
    MockCatalog::new(build)
        .with_group(group("G-STORY", "Story Journal", 2, &[10, 11]))
        .with_group(group("G-GEN", "General", 1, &[12]))
        .with_category(category(10, "Heart of Thorns", 5, &[1, 2]))
        .with_category(category(11, "Path of Fire", 3, &[3]))
        .with_category(category(12, "Slayer", 1, &[4, 5]))
        .with_achievement(mastery(achievement(1, "Prologue"), "Maguuma"))
        .with_achievement(achievement(2, "Act One"))
        .with_achievement(mastery(achievement(3, "Crystal Desert"), "Desert"))
        .with_achievement(achievement(4, "Centaur Slayer"))
        .with_achievement(achievement(5, "Bandit Slayer"))
}

/// Snapshot holding everything `catalog` publishes.
pub fn snapshot_of(catalog: &MockCatalog) -> Snapshot {
    gw2_achievements::sync::Reconciler::new(
        catalog,
        &MemoryStore::default(),
        &gw2_achievements::output::JsonOutput,
    )
    .run()
    .unwrap()
    .snapshot
}
