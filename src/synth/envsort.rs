//! Deterministic ordering of injected container values.
//!
//! Per container: secret-backed values sort by name; plain values sort by
//! name, then any plain value whose name collides with a secret is
//! dropped (secrets win, the drop is logged). Non-name-keyed special
//! values are concatenated last. Empty lists are represented as absent to
//! match the serialization convention.

use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::warn;

/// Sorts secret-backed values by container name.
///
/// Returns `None` when the list is empty.
#[must_use]
pub fn sort_secrets(mut entries: Vec<(String, Value)>) -> Option<Vec<Value>> {
    if entries.is_empty() {
        return None;
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Some(
        entries
            .into_iter()
            .map(|(name, value_from)| json!({ "Name": name, "ValueFrom": value_from }))
            .collect(),
    )
}

/// Sorts plain environment values by name, dropping any value whose name
/// collides with a secret-backed value. Special non-name-keyed values are
/// appended last, unsorted.
///
/// Returns `None` when the resulting list is empty.
#[must_use]
pub fn sort_environment(
    entries: Vec<(String, String)>,
    secret_names: &HashSet<String>,
    extras: Vec<Value>,
    owner: &str,
) -> Option<Vec<Value>> {
    let mut sorted = entries;
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut values: Vec<Value> = Vec::with_capacity(sorted.len() + extras.len());
    for (name, value) in sorted {
        if secret_names.contains(&name) {
            warn!("services.{owner}: Environment variable {name} overlaps with Secret. Removing.");
            continue;
        }
        values.push(json!({ "Name": name, "Value": value }));
    }
    values.extend(extras);

    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_sorted_by_name() {
        let secrets = sort_secrets(vec![
            (String::from("ZULU"), json!("arn:z")),
            (String::from("ALPHA"), json!("arn:a")),
        ])
        .unwrap();
        assert_eq!(secrets[0]["Name"], "ALPHA");
        assert_eq!(secrets[1]["Name"], "ZULU");
    }

    #[test]
    fn test_empty_secrets_absent() {
        assert!(sort_secrets(vec![]).is_none());
    }

    #[test]
    fn test_environment_sorted_and_collisions_dropped() {
        let secret_names: HashSet<String> = [String::from("DB_PASSWORD")].into_iter().collect();
        let env = sort_environment(
            vec![
                (String::from("PORT"), String::from("8000")),
                (String::from("DB_PASSWORD"), String::from("plaintext")),
                (String::from("APP_ENV"), String::from("prod")),
            ],
            &secret_names,
            vec![],
            "api",
        )
        .unwrap();

        // Collision removed, rest sorted by name.
        assert_eq!(env.len(), 2);
        assert_eq!(env[0]["Name"], "APP_ENV");
        assert_eq!(env[1]["Name"], "PORT");
    }

    #[test]
    fn test_extras_appended_last() {
        let env = sort_environment(
            vec![(String::from("ZZZ"), String::from("1"))],
            &HashSet::new(),
            vec![json!({ "Name": "AWS_DEFAULT_REGION", "Value": { "Ref": "AWS::Region" } })],
            "api",
        )
        .unwrap();
        assert_eq!(env[0]["Name"], "ZZZ");
        assert_eq!(env[1]["Name"], "AWS_DEFAULT_REGION");
    }

    #[test]
    fn test_all_collisions_yield_absent() {
        let secret_names: HashSet<String> = [String::from("TOKEN")].into_iter().collect();
        let env = sort_environment(
            vec![(String::from("TOKEN"), String::from("x"))],
            &secret_names,
            vec![],
            "api",
        );
        assert!(env.is_none());
    }
}
