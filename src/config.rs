use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::TrackerError;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Achievement name to tag name.
pub type TagMap = BTreeMap<String, String>;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(rename = "Users", alias = "users", default)]
    pub users: Option<BTreeMap<String, String>>,
    #[serde(rename = "Tags", alias = "tags", default)]
    pub tags: TagEntries,
    #[serde(rename = "SkipGroups", alias = "skip_groups", default)]
    pub skip_groups: Option<Vec<String>>,
}

/// `Tags` entries in file order, so that a later tag can override an earlier one.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagEntries(pub Vec<(String, Vec<String>)>);

impl<'de> Deserialize<'de> for TagEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = TagEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of tag names to lists of achievement names")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((tag, names)) = map.next_entry::<String, Vec<String>>()? {
                    entries.push((tag, names));
                }
                Ok(TagEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub users: BTreeMap<String, ApiKey>,
    pub tags: TagMap,
    pub skip_groups: BTreeSet<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, TrackerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(TrackerError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| TrackerError::ConfigRead(config_path.clone()))?;
        Self::resolve_str(&content)
    }

    pub fn resolve_str(content: &str) -> Result<ResolvedConfig, TrackerError> {
        let config: Config = serde_json::from_str(content)
            .map_err(|err| TrackerError::ConfigParse(err.to_string()))?;
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, TrackerError> {
        let raw_users = config.users.ok_or(TrackerError::NoUsers)?;

        let users = raw_users
            .into_iter()
            .map(|(name, key)| {
                let key = key.trim();
                if key.is_empty() {
                    return Err(TrackerError::ConfigParse(format!(
                        "empty API key for user {name}"
                    )));
                }
                Ok((name, ApiKey::new(key)))
            })
            .collect::<Result<BTreeMap<_, _>, TrackerError>>()?;

        let skip_groups = config
            .skip_groups
            .unwrap_or_else(default_skip_groups)
            .into_iter()
            .collect();

        Ok(ResolvedConfig {
            users,
            tags: invert_tags(&config.tags),
            skip_groups,
        })
    }
}

/// Turns `tag -> [names]` into `name -> tag`; the last tag listing a name wins.
pub fn invert_tags(entries: &TagEntries) -> TagMap {
    let mut tags = TagMap::new();
    for (tag, names) in &entries.0 {
        for name in names {
            tags.insert(name.clone(), tag.clone());
        }
    }
    tags
}

pub fn default_skip_groups() -> Vec<String> {
    vec!["Daily".to_string()]
}
