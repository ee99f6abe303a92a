use std::collections::BTreeMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{BuildId, RecordCounts};
use crate::error::TrackerError;
use crate::gw2::{CatalogClient, ProgressClientFactory};
use crate::progress::{self, UserFailure};
use crate::report::{self, Report};
use crate::store::CacheStore;
use crate::sync::{Reconciled, Reconciler, SyncOutcome};
use crate::xlsx::ReportWriter;

#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub generated_at: DateTime<Utc>,
    pub output: String,
    pub sync: SyncOutcome,
    pub users: Vec<String>,
    pub sheets: usize,
    pub rows: usize,
    pub failures: Vec<UserFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub cached: bool,
    pub build: Option<BuildId>,
    pub counts: RecordCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C, S: CacheStore> {
    catalog: C,
    store: S,
}

impl<S: CacheStore> App<(), S> {
    /// An app for the cache-only operations, [`App::info`] and [`App::clear`].
    pub fn offline(store: S) -> Self {
        Self { catalog: (), store }
    }
}

impl<C, S: CacheStore> App<C, S> {
    pub fn new(catalog: C, store: S) -> Self {
        Self { catalog, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reports what is cached without touching the network.
    pub fn info(&self, sink: &dyn ProgressSink) -> Result<InfoResult, TrackerError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; reading cached snapshot".to_string(),
            elapsed: None,
        });
        let snapshot = self.store.load()?;
        Ok(InfoResult {
            cached: snapshot.is_some(),
            build: snapshot.as_ref().and_then(|snapshot| snapshot.build),
            counts: snapshot
                .as_ref()
                .map(|snapshot| snapshot.counts())
                .unwrap_or_default(),
        })
    }

    pub fn clear(&self, sink: &dyn ProgressSink) -> Result<ClearResult, TrackerError> {
        sink.event(ProgressEvent {
            message: "phase=Store; clearing cached snapshot".to_string(),
            elapsed: None,
        });
        let cleared = self.store.clear()?;
        Ok(ClearResult { cleared })
    }
}

impl<C: CatalogClient, S: CacheStore> App<C, S> {

    /// Brings the cached catalog up to the current build.
    pub fn sync(&self, sink: &dyn ProgressSink) -> Result<SyncOutcome, TrackerError> {
        Ok(self.reconcile(sink)?.outcome)
    }

    /// Syncs the catalog, gathers every account's progress and writes the report to `output`.
    pub fn report<F, W>(
        &self,
        config: &ResolvedConfig,
        accounts: &F,
        writer: &W,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<ReportResult, TrackerError>
    where
        F: ProgressClientFactory,
        W: ReportWriter,
    {
        let Reconciled {
            snapshot,
            outcome: sync,
        } = self.reconcile(sink)?;

        let clients: BTreeMap<String, F::Client> = config
            .users
            .iter()
            .map(|(user, key)| (user.clone(), accounts.client_for(key)))
            .collect();
        let progress = progress::aggregate(&clients, sink);

        sink.event(ProgressEvent {
            message: "phase=Assemble; building report tables".to_string(),
            elapsed: None,
        });
        let report = report::assemble(&snapshot, &progress, &config.tags, &config.skip_groups);

        self.write_report(&report, writer, output, sink)?;

        Ok(ReportResult {
            generated_at: Utc::now(),
            output: output.to_string(),
            sync,
            users: report.users.clone(),
            sheets: report.sheets.len(),
            rows: report.row_count(),
            failures: progress.failures,
        })
    }

    fn reconcile(&self, sink: &dyn ProgressSink) -> Result<Reconciled, TrackerError> {
        Reconciler::new(&self.catalog, &self.store, sink).run()
    }

    fn write_report<W: ReportWriter>(
        &self,
        report: &Report,
        writer: &W,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<(), TrackerError> {
        if let Some(parent) = output.parent().filter(|parent| !parent.as_str().is_empty()) {
            std::fs::create_dir_all(parent.as_std_path())
                .map_err(|err| TrackerError::Filesystem(err.to_string()))?;
        }
        sink.event(ProgressEvent {
            message: format!("phase=Write; {} sheet(s) to {output}", report.sheets.len()),
            elapsed: None,
        });
        writer.write(report, output)?;
        tracing::info!(path = %output, rows = report.row_count(), "report written");
        Ok(())
    }
}

pub fn default_output_path() -> Utf8PathBuf {
    Utf8PathBuf::from("achievements.xlsx")
}
