//! Joins the catalog snapshot with account progress and tags into per-group tables.
//!
//! Ordering is explicit everywhere:
//! - groups by `order`, ties by id;
//! - categories by `order`, ties by their position in the group;
//! - achievements by name, ties by their position in the category;
//! - user columns by username.

use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;

use serde::Serialize;

use crate::config::TagMap;
use crate::domain::{Achievement, Category, Group, ProgressRecord, Snapshot};
use crate::progress::ProgressIndex;

pub const DONE: &str = "DONE";
pub const UNKNOWN: &str = "UNKN";
pub const TITLE_COLUMN: &str = "Title";
pub const MASTERY_COLUMN: &str = "Mastery";
pub const TAG_COLUMN: &str = "Tagged";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub title: String,
    pub mastery: String,
    /// One entry per user, in [`Report::users`] order.
    pub statuses: Vec<String>,
    pub tag: String,
}

impl ReportRow {
    pub fn cells(&self) -> Vec<&str> {
        let mut cells = Vec::with_capacity(self.statuses.len() + 3);
        cells.push(self.title.as_str());
        cells.push(self.mastery.as_str());
        cells.extend(self.statuses.iter().map(String::as_str));
        cells.push(self.tag.as_str());
        cells
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryBlock {
    pub name: String,
    pub rows: Vec<ReportRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSheet {
    pub name: String,
    pub blocks: Vec<CategoryBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub users: Vec<String>,
    pub sheets: Vec<GroupSheet>,
}

impl Report {
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![TITLE_COLUMN.to_string(), MASTERY_COLUMN.to_string()];
        header.extend(self.users.iter().cloned());
        header.push(TAG_COLUMN.to_string());
        header
    }

    pub fn row_count(&self) -> usize {
        self.sheets
            .iter()
            .flat_map(|sheet| &sheet.blocks)
            .map(|block| block.rows.len())
            .sum()
    }

    pub fn sheet(&self, name: &str) -> Option<&GroupSheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }
}

/// Status cell for one user and one achievement.
pub fn progress_status(record: Option<&ProgressRecord>) -> String {
    match record {
        None => String::new(),
        Some(record) if record.done => DONE.to_string(),
        Some(ProgressRecord {
            current: Some(current),
            max: Some(max),
            ..
        }) if *current != 0 && *max != 0 => format!("{current}/{max}"),
        Some(_) => UNKNOWN.to_string(),
    }
}

pub fn assemble(
    snapshot: &Snapshot,
    progress: &ProgressIndex,
    tags: &TagMap,
    excluded_groups: &BTreeSet<String>,
) -> Report {
    let users = progress.users();

    let mut groups: Vec<&Group> = snapshot
        .groups
        .values()
        .filter(|group| !excluded_groups.contains(&group.name))
        .collect();
    groups.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));

    let sheets = groups
        .into_iter()
        .map(|group| GroupSheet {
            name: group.name.clone(),
            blocks: category_blocks(snapshot, group, &users, progress, tags),
        })
        .collect();

    Report { users, sheets }
}

fn category_blocks(
    snapshot: &Snapshot,
    group: &Group,
    users: &[String],
    progress: &ProgressIndex,
    tags: &TagMap,
) -> Vec<CategoryBlock> {
    let mut categories: Vec<&Category> = first_occurrences(&group.categories)
        .filter_map(|id| snapshot.categories.get(id))
        .filter(|category| !category.name.is_empty() && !category.achievements.is_empty())
        .collect();
    categories.sort_by_key(|category| category.order);

    categories
        .into_iter()
        .map(|category| CategoryBlock {
            name: category.name.clone(),
            rows: achievement_rows(snapshot, category, users, progress, tags),
        })
        .collect()
}

fn achievement_rows(
    snapshot: &Snapshot,
    category: &Category,
    users: &[String],
    progress: &ProgressIndex,
    tags: &TagMap,
) -> Vec<ReportRow> {
    let mut achievements: Vec<&Achievement> = first_occurrences(&category.achievements)
        .filter_map(|id| snapshot.achievements.get(id))
        .filter(|achievement| !achievement.name.is_empty())
        .collect();
    achievements.sort_by(|a, b| a.name.cmp(&b.name));

    achievements
        .into_iter()
        .map(|achievement| build_row(achievement, users, progress, tags))
        .collect()
}

fn build_row(
    achievement: &Achievement,
    users: &[String],
    progress: &ProgressIndex,
    tags: &TagMap,
) -> ReportRow {
    ReportRow {
        title: achievement.name.clone(),
        mastery: achievement.mastery_region().unwrap_or_default().to_string(),
        statuses: users
            .iter()
            .map(|user| progress_status(progress.get(user, achievement.id)))
            .collect(),
        tag: tags.get(&achievement.name).cloned().unwrap_or_default(),
    }
}

fn first_occurrences<T: Eq + Hash>(ids: &[T]) -> impl Iterator<Item = &T> {
    let mut seen = HashSet::new();
    ids.iter().filter(move |id| seen.insert(*id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AchievementId;

    fn record(done: bool, current: Option<u64>, max: Option<u64>) -> ProgressRecord {
        ProgressRecord {
            id: AchievementId::new(1),
            done,
            current,
            max,
        }
    }

    #[test]
    fn status_mapping() {
        assert_eq!(progress_status(None), "");
        assert_eq!(progress_status(Some(&record(true, None, None))), "DONE");
        assert_eq!(progress_status(Some(&record(true, Some(1), Some(5)))), "DONE");
        assert_eq!(progress_status(Some(&record(false, Some(3), Some(10)))), "3/10");
        assert_eq!(progress_status(Some(&record(false, Some(0), Some(0)))), "UNKN");
        assert_eq!(progress_status(Some(&record(false, Some(0), Some(10)))), "UNKN");
        assert_eq!(progress_status(Some(&record(false, None, Some(10)))), "UNKN");
    }

    #[test]
    fn first_occurrences_drops_repeats() {
        let ids = [3, 1, 3, 2, 1];
        let kept: Vec<_> = first_occurrences(&ids).copied().collect();
        assert_eq!(kept, vec![3, 1, 2]);
    }
}
