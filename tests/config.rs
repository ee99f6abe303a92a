use std::collections::BTreeSet;

use assert_matches::assert_matches;

use gw2_achievements::config::{
    Config, ConfigLoader, TagEntries, default_skip_groups, invert_tags,
};
use gw2_achievements::error::TrackerError;

#[test]
fn parse_users_and_tags() {
    let resolved = ConfigLoader::resolve_str(
        r#"{
            "Users": { "alice": "KEY-A", "bob": " KEY-B " },
            "Tags": { "Weekly": ["Centaur Slayer", "Prologue"] }
        }"#,
    )
    .unwrap();

    assert_eq!(
        resolved.users.keys().cloned().collect::<Vec<_>>(),
        vec!["alice".to_string(), "bob".to_string()]
    );
    assert_eq!(resolved.users["bob"].expose(), "KEY-B");
    assert_eq!(resolved.tags.get("Prologue").map(String::as_str), Some("Weekly"));
    assert_eq!(
        resolved.skip_groups,
        default_skip_groups().into_iter().collect::<BTreeSet<_>>()
    );
}

#[test]
fn last_tag_wins_on_duplicate_names() {
    let resolved = ConfigLoader::resolve_str(
        r#"{
            "Users": {},
            "Tags": { "Zeta": ["Prologue"], "Alpha": ["Prologue", "Act One"] }
        }"#,
    )
    .unwrap();

    assert_eq!(resolved.tags["Prologue"], "Alpha");
    assert_eq!(resolved.tags["Act One"], "Alpha");
}

#[test]
fn invert_tags_maps_names_to_tags() {
    let entries = TagEntries(vec![
        ("Weekly".to_string(), vec!["A".to_string(), "B".to_string()]),
        ("Legendary".to_string(), vec!["C".to_string()]),
    ]);
    let tags = invert_tags(&entries);
    assert_eq!(tags.len(), 3);
    assert_eq!(tags["B"], "Weekly");
    assert_eq!(tags["C"], "Legendary");
}

#[test]
fn lowercase_keys_and_custom_skip_groups() {
    let resolved = ConfigLoader::resolve_str(
        r#"{ "users": { "alice": "KEY" }, "tags": {}, "skip_groups": ["Daily", "Fractals"] }"#,
    )
    .unwrap();

    assert_eq!(resolved.users.len(), 1);
    assert!(resolved.tags.is_empty());
    assert!(resolved.skip_groups.contains("Fractals"));
}

#[test]
fn missing_users_is_rejected() {
    let result = ConfigLoader::resolve_str(r#"{ "Tags": {} }"#);
    assert_matches!(result, Err(TrackerError::NoUsers));
}

#[test]
fn tags_must_be_an_object() {
    let result = ConfigLoader::resolve_str(r#"{ "Users": {}, "Tags": ["Weekly"] }"#);
    assert_matches!(result, Err(TrackerError::ConfigParse(_)));
}

#[test]
fn empty_api_key_is_rejected() {
    let result = ConfigLoader::resolve_str(r#"{ "Users": { "alice": "  " } }"#);
    assert_matches!(result, Err(TrackerError::ConfigParse(message)) if message.contains("alice"));
}

#[test]
fn unreadable_explicit_path() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("nope.json");
    let result = ConfigLoader::resolve(Some(path.to_str().unwrap()));
    assert_matches!(result, Err(TrackerError::ConfigRead(_)));
}

#[test]
fn resolve_reads_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("config.json");
    std::fs::write(&path, r#"{ "Users": { "alice": "KEY" } }"#).unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.users.len(), 1);
    assert!(resolved.tags.is_empty());
}

#[test]
fn resolve_config_from_struct() {
    let config = Config {
        users: Some([("alice".to_string(), "KEY".to_string())].into_iter().collect()),
        tags: TagEntries::default(),
        skip_groups: Some(Vec::new()),
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert!(resolved.skip_groups.is_empty());
}
