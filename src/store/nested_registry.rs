use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::ApiModel;

/// Inline object / array-item schemas lifted out of their parent so they can be
/// cached and resolved like named models. Entries are write-once.
#[derive(Debug, Default)]
pub struct NestedModelRegistry {
    entries: RwLock<HashMap<String, ApiModel>>,
    fallback_counter: AtomicU64,
}

impl NestedModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `schema` and return its key.
    ///
    /// The key is `<parent title>.<property key>`; untitled parents get a
    /// timestamp-based key instead. An existing entry under the same key is kept.
    pub fn register(
        &self,
        parent_title: Option<&str>,
        property_key: &str,
        schema: ApiModel,
    ) -> String {
        let key = match parent_title {
            Some(title) if !title.is_empty() => format!("{}.{}", title, property_key),
            _ => format!(
                "{}@{}-{}",
                property_key,
                chrono::Utc::now().timestamp_millis(),
                self.fallback_counter.fetch_add(1, Ordering::Relaxed)
            ),
        };

        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            log::debug!("Nested model '{}' already registered", key);
        } else {
            log::debug!("Registered nested model '{}'", key);
            entries.insert(key.clone(), schema);
        }
        key
    }

    /// A copy of the stored schema; callers may mutate it freely
    pub fn get(&self, key: &str) -> Option<ApiModel> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchemaType;

    #[test]
    fn test_register_is_write_once() {
        let registry = NestedModelRegistry::new();
        let first = ApiModel {
            title: Some("first".to_string()),
            ..ApiModel::object()
        };
        let second = ApiModel {
            title: Some("second".to_string()),
            ..ApiModel::object()
        };

        let key = registry.register(Some("Opus"), "parts", first);
        assert_eq!(key, "Opus.parts");
        let again = registry.register(Some("Opus"), "parts", second);
        assert_eq!(again, key);
        assert_eq!(registry.get(&key).unwrap().title.as_deref(), Some("first"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_returns_copy() {
        let registry = NestedModelRegistry::new();
        let key = registry.register(Some("Voice"), "range", ApiModel::object());

        let mut copy = registry.get(&key).unwrap();
        copy.schema_type = Some(SchemaType::String);
        assert_eq!(
            registry.get(&key).unwrap().schema_type,
            Some(SchemaType::Object)
        );
    }

    #[test]
    fn test_untitled_parent_gets_unique_keys() {
        let registry = NestedModelRegistry::new();
        let a = registry.register(None, "items", ApiModel::object());
        let b = registry.register(None, "items", ApiModel::object());
        assert_ne!(a, b);
        assert!(a.starts_with("items@"));
        assert_eq!(registry.len(), 2);

        registry.clear();
        assert!(registry.is_empty());
    }
}
