use std::collections::BTreeSet;
use std::fmt::Display;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::config::ApiKey;
use crate::domain::{
    Achievement, AchievementId, BuildId, Category, CategoryId, Group, GroupId, MAX_BATCH,
    ProgressRecord, RecordKind,
};
use crate::error::TrackerError;

pub const DEFAULT_BASE_URL: &str = "https://api.guildwars2.com/v2";

/// Read access to the public achievement catalog.
///
/// `fetch_*` callers must split their ids into batches of at most
/// [`MAX_BATCH`]; larger requests are rejected by the API.
pub trait CatalogClient: Send + Sync {
    fn current_build(&self) -> Result<BuildId, TrackerError>;
    fn list_group_ids(&self) -> Result<BTreeSet<GroupId>, TrackerError>;
    fn list_category_ids(&self) -> Result<BTreeSet<CategoryId>, TrackerError>;
    fn list_achievement_ids(&self) -> Result<BTreeSet<AchievementId>, TrackerError>;
    fn fetch_groups(&self, ids: &[GroupId]) -> Result<Vec<Group>, TrackerError>;
    fn fetch_categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, TrackerError>;
    fn fetch_achievements(&self, ids: &[AchievementId]) -> Result<Vec<Achievement>, TrackerError>;
}

/// Access to one account's achievement progress.
pub trait ProgressClient: Send + Sync {
    fn list_progress(&self) -> Result<Vec<ProgressRecord>, ProgressError>;
}

/// Builds a [`ProgressClient`] for an account API key.
pub trait ProgressClientFactory {
    type Client: ProgressClient;

    fn client_for(&self, key: &ApiKey) -> Self::Client;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    /// The API answered with an error payload instead of progress records.
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Transport(String),
}

#[derive(Debug, Deserialize)]
struct BuildResponse {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    text: String,
}

#[derive(Clone)]
pub struct Gw2HttpClient {
    client: Client,
    base_url: String,
    api_key: Option<ApiKey>,
}

impl Gw2HttpClient {
    pub fn new() -> Result<Self, TrackerError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, TrackerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gw2-achievements/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TrackerError::ApiHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| TrackerError::ApiHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// A client for one account; shares the connection pool with `self`.
    pub fn for_account(&self, api_key: ApiKey) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: Some(api_key),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn list_ids<T>(&self, kind: RecordKind) -> Result<BTreeSet<T>, TrackerError>
    where
        T: DeserializeOwned + Ord,
    {
        let url = self.url(kind.endpoint());
        let ids: Vec<T> = self.get_json(|| self.client.get(&url), kind.endpoint())?;
        Ok(ids.into_iter().collect())
    }

    fn fetch_batch<I, T>(&self, kind: RecordKind, ids: &[I]) -> Result<Vec<T>, TrackerError>
    where
        I: Display,
        T: DeserializeOwned,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_BATCH {
            return Err(TrackerError::BatchTooLarge {
                size: ids.len(),
                limit: MAX_BATCH,
            });
        }
        let url = self.url(kind.endpoint());
        let joined = join_ids(ids);
        self.get_json(
            || self.client.get(&url).query(&[("ids", joined.as_str())]),
            kind.endpoint(),
        )
    }

    fn get_json<T, F>(&self, make_req: F, what: &str) -> Result<T, TrackerError>
    where
        T: DeserializeOwned,
        F: FnMut() -> RequestBuilder,
    {
        let response = self.send_with_retries(make_req)?;
        let response = Self::handle_status(response, what)?;
        response
            .json()
            .map_err(|err| TrackerError::ApiHttp(err.to_string()))
    }

    fn handle_status(response: Response, what: &str) -> Result<Response, TrackerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TrackerError::RateLimited(what.to_string()));
        }
        let body = response
            .text()
            .unwrap_or_else(|_| "GW2 API request failed".to_string());
        Err(TrackerError::ApiStatus {
            status: status.as_u16(),
            message: error_text(&body).unwrap_or(body),
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, TrackerError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        tracing::debug!(status, attempt, "retrying GW2 API request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        tracing::debug!(error = %err, attempt, "retrying GW2 API request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(TrackerError::ApiHttp(err.to_string()));
                }
            }
        }
    }
}

impl CatalogClient for Gw2HttpClient {
    fn current_build(&self) -> Result<BuildId, TrackerError> {
        let url = self.url("build");
        let build: BuildResponse = self.get_json(|| self.client.get(&url), "build")?;
        Ok(BuildId::new(build.id))
    }

    fn list_group_ids(&self) -> Result<BTreeSet<GroupId>, TrackerError> {
        self.list_ids(RecordKind::Groups)
    }

    fn list_category_ids(&self) -> Result<BTreeSet<CategoryId>, TrackerError> {
        self.list_ids(RecordKind::Categories)
    }

    fn list_achievement_ids(&self) -> Result<BTreeSet<AchievementId>, TrackerError> {
        self.list_ids(RecordKind::Achievements)
    }

    fn fetch_groups(&self, ids: &[GroupId]) -> Result<Vec<Group>, TrackerError> {
        self.fetch_batch(RecordKind::Groups, ids)
    }

    fn fetch_categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, TrackerError> {
        self.fetch_batch(RecordKind::Categories, ids)
    }

    fn fetch_achievements(&self, ids: &[AchievementId]) -> Result<Vec<Achievement>, TrackerError> {
        self.fetch_batch(RecordKind::Achievements, ids)
    }
}

impl ProgressClient for Gw2HttpClient {
    fn list_progress(&self) -> Result<Vec<ProgressRecord>, ProgressError> {
        let url = self.url("account/achievements");
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose());
        }
        let response = request
            .send()
            .map_err(|err| ProgressError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| ProgressError::Transport(err.to_string()))?;
        parse_progress_body(status, &body)
    }
}

impl ProgressClientFactory for Gw2HttpClient {
    type Client = Gw2HttpClient;

    fn client_for(&self, key: &ApiKey) -> Gw2HttpClient {
        self.for_account(key.clone())
    }
}

/// Interprets an `/v2/account/achievements` response.
///
/// A JSON array is a progress list (entries that fail to parse are skipped);
/// an object carrying `text` is an error payload (bad key, missing
/// permission) regardless of the status code.
pub fn parse_progress_body(status: u16, body: &str) -> Result<Vec<ProgressRecord>, ProgressError> {
    let value: Value = serde_json::from_str(body).map_err(|err| {
        ProgressError::Transport(format!("status {status}: invalid JSON response: {err}"))
    })?;
    match value {
        Value::Array(items) if (200..300).contains(&status) => {
            let mut records = Vec::with_capacity(items.len());
            for item in items {
                match serde_json::from_value::<ProgressRecord>(item) {
                    Ok(record) => records.push(record),
                    Err(err) => tracing::warn!(error = %err, "skipping malformed progress entry"),
                }
            }
            Ok(records)
        }
        other => {
            let text = serde_json::from_value::<ErrorPayload>(other)
                .map(|payload| payload.text)
                .unwrap_or_else(|_| format!("unexpected response with status {status}"));
            Err(ProgressError::Rejected(text))
        }
    }
}

fn error_text(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| payload.text)
}

fn join_ids<I: Display>(ids: &[I]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_ids_is_comma_separated() {
        let ids = [AchievementId::new(1), AchievementId::new(20), AchievementId::new(300)];
        assert_eq!(join_ids(&ids), "1,20,300");
    }

    #[test]
    fn rate_limit_is_not_retried() {
        assert!(!is_retryable_status(429));
        assert!(is_retryable_status(503));
    }

    #[test]
    fn error_text_reads_payload() {
        assert_eq!(
            error_text(r#"{"text":"all ids provided are invalid"}"#).as_deref(),
            Some("all ids provided are invalid")
        );
        assert_eq!(error_text("<html>"), None);
    }
}
