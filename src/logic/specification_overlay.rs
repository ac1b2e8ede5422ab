use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

use crate::model::SpecificationRecord;

/// Overlay shared by reference between the root form, every nested layer and
/// the annotation editors
pub type SharedOverlay = Arc<RwLock<SpecificationOverlay>>;

/// Annotation records keyed by structural path; at most one record per path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecificationOverlay {
    records: Vec<SpecificationRecord>,
}

impl SpecificationOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later records win when several share a path
    pub fn from_records(records: impl IntoIterator<Item = SpecificationRecord>) -> Self {
        let mut overlay = Self::new();
        for record in records {
            overlay.upsert(record);
        }
        overlay
    }

    /// Parse the `specifications` array of an entity, skipping malformed entries
    pub fn from_value(value: &Value) -> Self {
        let records = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match serde_json::from_value(item.clone()) {
                        Ok(record) => Some(record),
                        Err(err) => {
                            log::warn!("Ignoring malformed specification record: {}", err);
                            None
                        }
                    })
                    .collect::<Vec<SpecificationRecord>>()
            })
            .unwrap_or_default();
        Self::from_records(records)
    }

    pub fn shared(self) -> SharedOverlay {
        Arc::new(RwLock::new(self))
    }

    pub fn upsert(&mut self, record: SpecificationRecord) {
        match self.records.iter_mut().find(|r| r.path == record.path) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn lookup(&self, path: &str) -> Option<&SpecificationRecord> {
        self.records.iter().find(|r| r.path == path)
    }

    /// Remove the record at `path`; with `recursive` also every record below it.
    /// With `reindex`, later siblings in the same array move down one index,
    /// which vacates everything below `path` whatever `recursive` says.
    /// Returns how many records were removed.
    pub fn remove(&mut self, path: &str, recursive: bool, reindex: bool) -> usize {
        let prefix = format!("{}.", path);
        let below = recursive || reindex;
        let before = self.records.len();
        self.records
            .retain(|r| !(r.path == path || (below && r.path.starts_with(&prefix))));
        let removed = before - self.records.len();

        if reindex {
            self.shift_siblings_down(path);
        }
        removed
    }

    fn shift_siblings_down(&mut self, path: &str) {
        let (parent, last) = match path.rsplit_once('.') {
            Some((parent, last)) => (parent, last),
            None => ("", path),
        };
        let removed_index: usize = match last.parse() {
            Ok(index) => index,
            Err(_) => {
                log::warn!("Cannot reindex after '{}': last segment is not an index", path);
                return;
            }
        };
        let parent_prefix = if parent.is_empty() {
            String::new()
        } else {
            format!("{}.", parent)
        };

        for record in &mut self.records {
            let Some(rest) = record.path.strip_prefix(&parent_prefix) else {
                continue;
            };
            let (segment, tail) = match rest.split_once('.') {
                Some((segment, tail)) => (segment, Some(tail)),
                None => (rest, None),
            };
            let Ok(index) = segment.parse::<usize>() else {
                continue;
            };
            if index > removed_index {
                record.path = match tail {
                    Some(tail) => format!("{}{}.{}", parent_prefix, index - 1, tail),
                    None => format!("{}{}", parent_prefix, index - 1),
                };
            }
        }
    }

    pub fn records(&self) -> &[SpecificationRecord] {
        &self.records
    }

    pub fn paths(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.path.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.records).unwrap_or_else(|_| Value::Array(Vec::new()))
    }
}
