use std::collections::BTreeMap;

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{AchievementId, ProgressRecord};
use crate::gw2::{ProgressClient, ProgressError};

pub type UserProgress = BTreeMap<AchievementId, ProgressRecord>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFailure {
    pub user: String,
    pub message: String,
}

/// Per-user progress keyed by achievement id. Every configured user has an
/// entry, empty when their fetch failed.
#[derive(Debug, Clone, Default)]
pub struct ProgressIndex {
    pub by_user: BTreeMap<String, UserProgress>,
    pub failures: Vec<UserFailure>,
}

impl ProgressIndex {
    /// Usernames in ascending order.
    pub fn users(&self) -> Vec<String> {
        self.by_user.keys().cloned().collect()
    }

    pub fn get(&self, user: &str, id: AchievementId) -> Option<&ProgressRecord> {
        self.by_user.get(user).and_then(|progress| progress.get(&id))
    }

    pub fn insert_user(&mut self, user: impl Into<String>, records: Vec<ProgressRecord>) {
        let progress = records
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        self.by_user.insert(user.into(), progress);
    }
}

/// Fetches every user's progress; one user's failure never affects the others.
pub fn aggregate<C: ProgressClient>(
    users: &BTreeMap<String, C>,
    sink: &dyn ProgressSink,
) -> ProgressIndex {
    let mut index = ProgressIndex::default();

    for (user, client) in users {
        sink.event(ProgressEvent {
            message: format!("phase=Progress; fetching {user}"),
            elapsed: None,
        });
        match client.list_progress() {
            Ok(records) => {
                tracing::debug!(user = %user, records = records.len(), "loaded account progress");
                index.insert_user(user.as_str(), records);
            }
            Err(err) => {
                let message = match &err {
                    ProgressError::Rejected(text) => format!("API key issue: {text}"),
                    ProgressError::Transport(text) => format!("request failed: {text}"),
                };
                tracing::warn!(user = %user, "{message}");
                sink.event(ProgressEvent {
                    message: format!("phase=Progress; user {user} {message}"),
                    elapsed: None,
                });
                index.by_user.insert(user.clone(), UserProgress::new());
                index.failures.push(UserFailure {
                    user: user.clone(),
                    message,
                });
            }
        }
    }

    index
}
