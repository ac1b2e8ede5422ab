use serde_json::Value;
use std::sync::Arc;

use crate::error::FormError;
use crate::logic::form_tree::{FormOptions, FormTree, LayerState};
use crate::logic::specification_overlay::SharedOverlay;
use crate::model::{SpecificationKind, SpecificationRecord};
use crate::store::ModelCache;

/// Annotation sub-form for one structural path.
///
/// Seeded from the overlay's record at `path` or a fresh sentinel record;
/// committing upserts by path, so a path never ends up with two records.
pub struct SpecificationEditor {
    path: String,
    kind: SpecificationKind,
    seed: SpecificationRecord,
    form: FormTree,
    overlay: SharedOverlay,
}

impl SpecificationEditor {
    pub async fn open(
        cache: Arc<ModelCache>,
        overlay: SharedOverlay,
        path: &str,
        kind: SpecificationKind,
    ) -> Result<Self, FormError> {
        let seed = overlay
            .read()
            .lookup(path)
            .cloned()
            .unwrap_or_else(|| SpecificationRecord::fresh(path));

        let options = FormOptions {
            start_data: Some(serde_json::to_value(&seed)?),
            specifications: false,
            ..Default::default()
        };
        let form = FormTree::load(cache, kind.model_name(), options).await;
        if let Some(LayerState::Unavailable(reason)) = form.root().map(|root| root.state()) {
            log::warn!("Cannot edit specification at '{}': {}", path, reason);
            return Err(FormError::Unavailable(path.to_string()));
        }

        Ok(Self {
            path: path.to_string(),
            kind,
            seed,
            form,
            overlay,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> SpecificationKind {
        self.kind
    }

    /// The record the editor started from
    pub fn seed(&self) -> &SpecificationRecord {
        &self.seed
    }

    pub fn is_new(&self) -> bool {
        self.overlay.read().lookup(&self.path).is_none()
    }

    pub fn form(&self) -> &FormTree {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut FormTree {
        &mut self.form
    }

    pub fn set_value(&mut self, key: &str, value: Value) -> Result<(), FormError> {
        self.form.set_value("", key, value)
    }

    /// Merge the edited values over the seed and upsert the result by path
    pub fn commit(self) -> Result<SpecificationRecord, FormError> {
        let edited = self.form.save()?;

        let mut merged = serde_json::to_value(&self.seed)?;
        if let (Value::Object(target), Value::Object(edited)) = (&mut merged, edited) {
            target.extend(edited);
        }
        let mut record: SpecificationRecord = serde_json::from_value(merged)?;
        record.path = self.path;

        log::debug!("Committing specification at '{}'", record.path);
        self.overlay.write().upsert(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::resolve::ModelResolver;
    use crate::logic::specification_overlay::SpecificationOverlay;
    use crate::model::EntityRef;
    use crate::store::StaticSchemaSource;
    use serde_json::json;

    fn cache() -> Arc<ModelCache> {
        let source = StaticSchemaSource::from_value(json!({
            "definitions": {
                "SpecificationAA": {
                    "type": "object",
                    "properties": {
                        "share": {"type": "object", "x-taxonomy": "share"},
                        "occurence": {"type": "object", "x-taxonomy": "occurence"},
                        "instrumentation": {"type": "array", "x-reference": "instrument", "x-isArray": true}
                    }
                }
            }
        }))
        .unwrap();
        Arc::new(ModelCache::new(Arc::new(ModelResolver::new(Arc::new(source)))))
    }

    #[tokio::test]
    async fn test_commit_upserts_by_path() {
        let cache = cache();
        let overlay = SpecificationOverlay::new().shared();

        let mut editor =
            SpecificationEditor::open(cache.clone(), overlay.clone(), "voices.0", SpecificationKind::Aa)
                .await
                .unwrap();
        assert!(editor.is_new());
        assert_eq!(editor.seed().id, -1);
        assert!(editor.form().save().is_err());

        editor.set_value("share", json!({"id": 3})).unwrap();
        editor.set_value("occurence", json!({"id": 5, "label": "tutti"})).unwrap();
        let record = editor.commit().unwrap();
        assert_eq!(record.path, "voices.0");
        assert_eq!(record.share, EntityRef::new(3));
        assert_eq!(overlay.read().len(), 1);

        let mut editor =
            SpecificationEditor::open(cache, overlay.clone(), "voices.0", SpecificationKind::Aa)
                .await
                .unwrap();
        assert!(!editor.is_new());
        assert_eq!(editor.form().control("", "share").unwrap().null_value, json!({"id": -1}));
        editor.set_value("share", json!({"id": 4})).unwrap();
        editor.commit().unwrap();

        let overlay = overlay.read();
        assert_eq!(overlay.len(), 1);
        assert_eq!(overlay.lookup("voices.0").unwrap().share.id, 4);
        assert_eq!(overlay.lookup("voices.0").unwrap().occurence.id, 5);
    }

    #[tokio::test]
    async fn test_missing_model_is_unavailable() {
        let overlay = SpecificationOverlay::new().shared();
        let result = SpecificationEditor::open(cache(), overlay, "title", SpecificationKind::Aai).await;
        assert!(matches!(result, Err(FormError::Unavailable(_))));
    }
}
