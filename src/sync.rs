use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{
    AchievementId, BuildId, CatalogRecord, CategoryId, GroupId, MAX_BATCH, RecordCounts,
    RecordKind, Snapshot,
};
use crate::error::TrackerError;
use crate::gw2::CatalogClient;
use crate::store::CacheStore;

/// Ids currently published by the remote catalog, per record kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteIds {
    pub groups: BTreeSet<GroupId>,
    pub categories: BTreeSet<CategoryId>,
    pub achievements: BTreeSet<AchievementId>,
}

impl RemoteIds {
    pub fn fetch<C: CatalogClient>(client: &C) -> Result<Self, TrackerError> {
        Ok(Self {
            groups: client.list_group_ids()?,
            categories: client.list_category_ids()?,
            achievements: client.list_achievement_ids()?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub previous_build: Option<BuildId>,
    pub build: BuildId,
    pub up_to_date: bool,
    pub fetched: RecordCounts,
    pub batches: RecordCounts,
    pub counts: RecordCounts,
    /// `None` when nothing had to be saved.
    pub persisted: Option<bool>,
    pub persist_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub snapshot: Snapshot,
    pub outcome: SyncOutcome,
}

pub struct Reconciler<'a, C: CatalogClient, S: CacheStore> {
    client: &'a C,
    store: &'a S,
    sink: &'a dyn ProgressSink,
}

impl<'a, C: CatalogClient, S: CacheStore> Reconciler<'a, C, S> {
    pub fn new(client: &'a C, store: &'a S, sink: &'a dyn ProgressSink) -> Self {
        Self {
            client,
            store,
            sink,
        }
    }

    /// Loads the cached snapshot and brings it up to the remote build.
    ///
    /// Only `current_build` is queried when the cache is already current.
    pub fn run(&self) -> Result<Reconciled, TrackerError> {
        let cache = self.load_cache();

        self.sink.event(ProgressEvent {
            message: "phase=Resolve; querying current build".to_string(),
            elapsed: None,
        });
        let build = self.client.current_build()?;

        if let Some(snapshot) = cache.as_ref().filter(|snapshot| snapshot.build == Some(build)) {
            return Ok(self.up_to_date(snapshot.clone(), build));
        }

        self.sink.event(ProgressEvent {
            message: format!("phase=Resolve; new build {build}, listing catalog ids"),
            elapsed: None,
        });
        let remote = RemoteIds::fetch(self.client)?;
        self.reconcile(cache, build, &remote)
    }

    /// Fetches every remote record missing from `cache`, stamps the build and persists.
    ///
    /// Records absent remotely are kept. A failed fetch aborts without saving.
    pub fn reconcile(
        &self,
        cache: Option<Snapshot>,
        remote_build: BuildId,
        remote: &RemoteIds,
    ) -> Result<Reconciled, TrackerError> {
        let mut snapshot = cache.unwrap_or_default();
        if snapshot.build == Some(remote_build) {
            return Ok(self.up_to_date(snapshot, remote_build));
        }

        let previous_build = snapshot.build;
        tracing::info!(
            previous = ?previous_build.map(BuildId::get),
            current = remote_build.get(),
            "catalog build changed"
        );

        let mut fetched = RecordCounts::default();
        let mut batches = RecordCounts::default();

        for kind in RecordKind::ALL {
            let stats = match kind {
                RecordKind::Groups => self.fill_missing(
                    &mut snapshot.groups,
                    &remote.groups,
                    |ids: &[GroupId]| self.client.fetch_groups(ids),
                )?,
                RecordKind::Categories => self.fill_missing(
                    &mut snapshot.categories,
                    &remote.categories,
                    |ids: &[CategoryId]| self.client.fetch_categories(ids),
                )?,
                RecordKind::Achievements => self.fill_missing(
                    &mut snapshot.achievements,
                    &remote.achievements,
                    |ids: &[AchievementId]| self.client.fetch_achievements(ids),
                )?,
            };
            *fetched.get_mut(kind) = stats.fetched;
            *batches.get_mut(kind) = stats.batches;
        }

        snapshot.build = Some(remote_build);

        let (persisted, persist_error) = match self.store.save(&snapshot) {
            Ok(()) => {
                self.sink.event(ProgressEvent {
                    message: "phase=Store; snapshot saved".to_string(),
                    elapsed: None,
                });
                (Some(true), None)
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist snapshot, using in-memory copy");
                self.sink.event(ProgressEvent {
                    message: format!("phase=Store; snapshot not saved: {err}"),
                    elapsed: None,
                });
                (Some(false), Some(err.to_string()))
            }
        };

        let counts = snapshot.counts();
        Ok(Reconciled {
            snapshot,
            outcome: SyncOutcome {
                previous_build,
                build: remote_build,
                up_to_date: false,
                fetched,
                batches,
                counts,
                persisted,
                persist_error,
            },
        })
    }

    fn up_to_date(&self, snapshot: Snapshot, build: BuildId) -> Reconciled {
        tracing::debug!(build = build.get(), "catalog cache is current");
        self.sink.event(ProgressEvent {
            message: format!("phase=Resolve; cache is current for build {build}"),
            elapsed: None,
        });
        let counts = snapshot.counts();
        Reconciled {
            snapshot,
            outcome: SyncOutcome {
                previous_build: Some(build),
                build,
                up_to_date: true,
                fetched: RecordCounts::default(),
                batches: RecordCounts::default(),
                counts,
                persisted: None,
                persist_error: None,
            },
        }
    }

    fn load_cache(&self) -> Option<Snapshot> {
        match self.store.load() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "cached snapshot unreadable; starting from scratch");
                self.sink.event(ProgressEvent {
                    message: format!("phase=Resolve; ignoring unreadable cache: {err}"),
                    elapsed: None,
                });
                None
            }
        }
    }

    fn fill_missing<R, F>(
        &self,
        records: &mut BTreeMap<R::Id, R>,
        remote: &BTreeSet<R::Id>,
        mut fetch: F,
    ) -> Result<KindStats, TrackerError>
    where
        R: CatalogRecord,
        F: FnMut(&[R::Id]) -> Result<Vec<R>, TrackerError>,
    {
        let missing = missing_ids(records, remote);
        if missing.is_empty() {
            return Ok(KindStats::default());
        }

        tracing::info!(kind = %R::KIND, count = missing.len(), "fetching new records");
        let started = Instant::now();
        let mut stats = KindStats::default();

        for batch in missing.chunks(MAX_BATCH) {
            let items = fetch(batch)?;
            let mut pending: BTreeSet<R::Id> = batch.iter().cloned().collect();
            for item in &items {
                pending.remove(&item.id());
            }
            if !pending.is_empty() {
                return Err(TrackerError::IncompleteBatch {
                    kind: R::KIND,
                    missing: pending.iter().map(|id| id.to_string()).collect(),
                });
            }

            for item in items {
                tracing::debug!(kind = %R::KIND, id = %item.id(), name = item.name(), "adding");
                records.insert(item.id(), item);
                stats.fetched += 1;
            }
            stats.batches += 1;

            self.sink.event(ProgressEvent {
                message: format!(
                    "phase=Fetch; {} {}/{}",
                    R::KIND,
                    stats.fetched,
                    missing.len()
                ),
                elapsed: Some(started.elapsed()),
            });
        }

        Ok(stats)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct KindStats {
    fetched: usize,
    batches: usize,
}

/// Remote ids without a cached record, in ascending order.
pub fn missing_ids<K: Ord + Clone, V>(cached: &BTreeMap<K, V>, remote: &BTreeSet<K>) -> Vec<K> {
    remote
        .iter()
        .filter(|id| !cached.contains_key(*id))
        .cloned()
        .collect()
}
