//! Item transformers selectable with `--process-func`.
//!
//! A transformer maps a raw item to the item that gets archived, or to
//! `None` to skip it. Transformers are resolved by name once at startup;
//! an unknown name is a configuration error.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{ArchiveError, ArchiveResult};
use crate::hubstorage::{Item, Job};

pub trait ItemTransform {
    fn apply(&self, job: &Job, item: Item) -> Option<Item>;
}

impl<F> ItemTransform for F
where
    F: Fn(&Job, Item) -> Option<Item>,
{
    fn apply(&self, job: &Job, item: Item) -> Option<Item> {
        self(job, item)
    }
}

/// Prefixes `_key` with the job key.
pub fn qualify_key(job: &Job, mut item: Item) -> Option<Item> {
    if let Some(key) = item.get("_key") {
        let raw = match key {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        item.insert("_key".to_string(), Value::String(format!("{}/{raw}", job.key)));
    }
    Some(item)
}

/// Drops underscore-prefixed fields other than `_key`.
pub fn strip_private(_job: &Job, mut item: Item) -> Option<Item> {
    item.retain(|name, _| name == "_key" || !name.starts_with('_'));
    Some(item)
}

pub fn skip_empty(_job: &Job, item: Item) -> Option<Item> {
    if item.keys().all(|name| name == "_key") {
        None
    } else {
        Some(item)
    }
}

pub struct TransformRegistry {
    entries: BTreeMap<String, Box<dyn ItemTransform>>,
}

impl Default for TransformRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("qualify_key", qualify_key);
        registry.register("strip_private", strip_private);
        registry.register("skip_empty", skip_empty);
        registry
    }
}

impl TransformRegistry {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, transform: impl ItemTransform + 'static) {
        self.entries.insert(name.into(), Box::new(transform));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn resolve(&self, reference: &str) -> ArchiveResult<&dyn ItemTransform> {
        let reference = reference.trim();
        if !is_valid_reference(reference) {
            return Err(ArchiveError::config(format!(
                "--process-func wrong argument: `{reference}` is not a valid function name"
            )));
        }
        self.entries
            .get(reference)
            .map(|t| &**t)
            .ok_or_else(|| {
                let known = self.names().collect::<Vec<_>>().join(", ");
                ArchiveError::config(format!(
                    "--process-func wrong argument: unknown function `{reference}` (available: {known})"
                ))
            })
    }
}

fn is_valid_reference(reference: &str) -> bool {
    let mut chars = reference.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !reference.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hubstorage::{JobKey, JobMetadata};
    use serde_json::json;

    fn job() -> Job {
        Job {
            key: JobKey::new(1, 2, 3),
            metadata: JobMetadata::default(),
        }
    }

    fn item(value: Value) -> Item {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn qualify_key_prefixes_job_key() {
        let out = qualify_key(&job(), item(json!({"_key": 7, "v": "x"}))).expect("kept");
        assert_eq!(out.get("_key"), Some(&json!("1/2/3/7")));
        assert_eq!(out.get("v"), Some(&json!("x")));
    }

    #[test]
    fn qualify_key_leaves_keyless_items_alone() {
        let out = qualify_key(&job(), item(json!({"v": "x"}))).expect("kept");
        assert!(!out.contains_key("_key"));
    }

    #[test]
    fn strip_private_keeps_key_field() {
        let out = strip_private(&job(), item(json!({"_key": "a", "_type": "T", "v": 1})))
            .expect("kept");
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["_key", "v"]);
    }

    #[test]
    fn skip_empty_drops_key_only_items() {
        assert!(skip_empty(&job(), item(json!({"_key": "a"}))).is_none());
        assert!(skip_empty(&job(), item(json!({"_key": "a", "v": 1}))).is_some());
    }

    #[test]
    fn registry_resolves_builtins_and_closures() {
        let mut registry = TransformRegistry::default();
        registry.register("drop_all", |_: &Job, _: Item| -> Option<Item> { None });
        assert!(registry.resolve("qualify_key").is_ok());
        let drop_all = registry.resolve("drop_all").expect("registered");
        assert!(drop_all.apply(&job(), item(json!({"_key": 1}))).is_none());
    }

    #[test]
    fn registry_rejects_unknown_and_malformed_references() {
        let registry = TransformRegistry::default();
        let err = registry.resolve("nope").err().expect("unknown");
        assert!(matches!(err, ArchiveError::Config(_)));
        assert!(err.to_string().contains("available: qualify_key, skip_empty, strip_private"));

        let err = registry.resolve("mod.").err().expect("malformed");
        assert!(err.to_string().contains("not a valid function name"));
        assert!(registry.resolve("").is_err());
        assert!(registry.resolve("9lives").is_err());
    }
}
