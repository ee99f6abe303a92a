use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound on the number of ids the GW2 API accepts in one `?ids=` request.
pub const MAX_BATCH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(u64);

impl BuildId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(u32);

impl CategoryId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AchievementId(u32);

impl AchievementId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AchievementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three kinds of reference data, in the order they are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Groups,
    Categories,
    Achievements,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::Groups,
        RecordKind::Categories,
        RecordKind::Achievements,
    ];

    pub fn endpoint(self) -> &'static str {
        match self {
            RecordKind::Groups => "achievements/groups",
            RecordKind::Categories => "achievements/categories",
            RecordKind::Achievements => "achievements",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Groups => write!(f, "groups"),
            RecordKind::Categories => write!(f, "categories"),
            RecordKind::Achievements => write!(f, "achievements"),
        }
    }
}

/// A catalog record that is cached by its own remote id.
pub trait CatalogRecord {
    type Id: Ord + Clone + fmt::Display;
    const KIND: RecordKind;

    fn id(&self) -> Self::Id;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub categories: Vec<CategoryId>,
}

impl CatalogRecord for Group {
    type Id = GroupId;
    const KIND: RecordKind = RecordKind::Groups;

    fn id(&self) -> GroupId {
        self.id.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub achievements: Vec<AchievementId>,
}

impl CatalogRecord for Category {
    type Id = CategoryId;
    const KIND: RecordKind = RecordKind::Categories;

    fn id(&self) -> CategoryId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: AchievementId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirement: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
}

impl Achievement {
    /// Region of the first mastery point this achievement rewards, if any.
    pub fn mastery_region(&self) -> Option<&str> {
        self.rewards
            .iter()
            .find(|reward| reward.kind == "Mastery")
            .and_then(|reward| reward.region.as_deref())
    }
}

impl CatalogRecord for Achievement {
    type Id = AchievementId;
    const KIND: RecordKind = RecordKind::Achievements;

    fn id(&self) -> AchievementId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// One account's progress on one achievement, as reported by `/v2/account/achievements`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: AchievementId,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub build: Option<BuildId>,
    #[serde(default)]
    pub groups: BTreeMap<GroupId, Group>,
    #[serde(default)]
    pub categories: BTreeMap<CategoryId, Category>,
    #[serde(default)]
    pub achievements: BTreeMap<AchievementId, Achievement>,
}

impl Snapshot {
    pub fn counts(&self) -> RecordCounts {
        RecordCounts {
            groups: self.groups.len(),
            categories: self.categories.len(),
            achievements: self.achievements.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub groups: usize,
    pub categories: usize,
    pub achievements: usize,
}

impl RecordCounts {
    pub fn get(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Groups => self.groups,
            RecordKind::Categories => self.categories,
            RecordKind::Achievements => self.achievements,
        }
    }

    pub fn get_mut(&mut self, kind: RecordKind) -> &mut usize {
        match kind {
            RecordKind::Groups => &mut self.groups,
            RecordKind::Categories => &mut self.categories,
            RecordKind::Achievements => &mut self.achievements,
        }
    }
}
