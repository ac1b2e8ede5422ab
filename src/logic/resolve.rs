use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::OnceCell;

use crate::error::ResolutionError;
use crate::logic::merge::SchemaMerger;
use crate::model::{ApiModel, ApiModelAllOf, ApiModelRef, ModelUri, SchemaDocument, SchemaNode};
use crate::store::{NestedModelRegistry, SchemaSource};

/// Turns model identifiers into flattened models: no `$ref`/`allOf` left at the
/// top level, properties concrete or pointing at `nested/` fragments.
pub struct ModelResolver {
    source: Arc<dyn SchemaSource>,
    document: OnceCell<Arc<SchemaDocument>>,
    registry: Arc<NestedModelRegistry>,
}

impl ModelResolver {
    pub fn new(source: Arc<dyn SchemaSource>) -> Self {
        Self::with_registry(source, Arc::new(NestedModelRegistry::new()))
    }

    pub fn with_registry(source: Arc<dyn SchemaSource>, registry: Arc<NestedModelRegistry>) -> Self {
        Self {
            source,
            document: OnceCell::new(),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<NestedModelRegistry> {
        &self.registry
    }

    /// The session's schema document, fetched on first use only
    pub async fn document(&self) -> Result<Arc<SchemaDocument>, ResolutionError> {
        self.document
            .get_or_try_init(|| async {
                let document = self.source.get_spec().await?;
                info!(
                    "Loaded schema document with {} definitions",
                    document.definitions.len()
                );
                Ok::<_, ResolutionError>(Arc::new(document))
            })
            .await
            .cloned()
    }

    pub async fn resolve(&self, uri: &ModelUri) -> Result<ApiModel, ResolutionError> {
        let document = self.document().await?;

        let raw = match uri {
            ModelUri::Remote(name) => document
                .definition(name)
                .cloned()
                .ok_or_else(|| ResolutionError::UnknownDefinition(name.clone()))?,
            ModelUri::Nested(key) => self
                .registry
                .get(key)
                .map(SchemaNode::Model)
                .ok_or_else(|| ResolutionError::UnknownNestedModel(key.clone()))?,
        };

        let mut visiting = vec![uri.clone()];
        let mut model = self.flatten(&document, raw, &mut visiting)?;
        if model.title.is_none() {
            model.title = Some(uri.name().to_string());
        }
        self.resolve_properties(&document, &mut model, Some(uri.name()));
        debug!("Resolved {} ({} properties)", uri, model.properties.len());
        Ok(model)
    }

    /// Resolve an anonymous schema that has no name of its own
    pub async fn resolve_schema(&self, node: SchemaNode) -> Result<ApiModel, ResolutionError> {
        let document = self.document().await?;
        let mut model = self.flatten(&document, node, &mut Vec::new())?;
        let scope = model.title.clone();
        self.resolve_properties(&document, &mut model, scope.as_deref());
        Ok(model)
    }

    /// Fold `$ref` and `allOf` wrappers until a bare model remains. Properties
    /// are left untouched.
    fn flatten(
        &self,
        document: &SchemaDocument,
        node: SchemaNode,
        visiting: &mut Vec<ModelUri>,
    ) -> Result<ApiModel, ResolutionError> {
        match node {
            SchemaNode::Model(model) => Ok(model),
            SchemaNode::Ref(ApiModelRef {
                reference,
                overrides,
            }) => {
                let uri = ModelUri::parse(&reference);
                if visiting.contains(&uri) {
                    return Err(ResolutionError::ReferenceCycle(uri.to_string()));
                }

                let target = match &uri {
                    ModelUri::Remote(name) => document
                        .definition(name)
                        .cloned()
                        .ok_or_else(|| ResolutionError::UnknownDefinition(name.clone()))?,
                    ModelUri::Nested(key) => self
                        .registry
                        .get(key)
                        .map(SchemaNode::Model)
                        .ok_or_else(|| ResolutionError::UnknownNestedModel(key.clone()))?,
                };

                visiting.push(uri);
                let resolved = self.flatten(document, target, visiting);
                visiting.pop();

                Ok(SchemaMerger::merge(Some(resolved?), overrides))
            }
            SchemaNode::AllOf(ApiModelAllOf { all_of, overrides }) => {
                let mut merged: Option<ApiModel> = None;
                for member in all_of {
                    if let SchemaNode::Model(model) = &member {
                        if model.properties.is_empty() {
                            warn!("allOf member without $ref or properties resolved to the empty model");
                            continue;
                        }
                    }
                    let resolved = self.flatten(document, member, visiting)?;
                    merged = Some(SchemaMerger::merge(merged, resolved));
                }
                Ok(SchemaMerger::merge(merged, overrides))
            }
        }
    }

    /// Flatten every property, project `required` onto it and lift inline
    /// objects/arrays of objects into the nested registry.
    fn resolve_properties(&self, document: &SchemaDocument, model: &mut ApiModel, scope: Option<&str>) {
        let required: HashSet<String> = model.required.iter().cloned().collect();
        let properties = std::mem::take(&mut model.properties);

        for (key, node) in properties {
            let mut property = match self.flatten(document, node, &mut Vec::new()) {
                Ok(property) => property,
                Err(err) => {
                    warn!("Skipping property '{}': {}", key, err);
                    continue;
                }
            };
            if required.contains(&key) {
                property.ext.required = Some(true);
            }
            let resolved = self.extract_nested(document, scope, &key, property);
            model.properties.insert(key, resolved);
        }
    }

    fn extract_nested(
        &self,
        document: &SchemaDocument,
        scope: Option<&str>,
        key: &str,
        mut property: ApiModel,
    ) -> SchemaNode {
        // choosers are leaves; their own sub-schema is never built
        if property.is_chooser() {
            Self::strip_leaf(&mut property);
            return property.into();
        }

        if property.is_object() && !property.properties.is_empty() {
            if property.title.is_none() {
                property.title = Some(key.to_string());
            }
            let mut pointer = property.clone();
            pointer.properties.clear();
            pointer.required.clear();
            let nested = self.registry.register(scope, key, property);
            return SchemaNode::Ref(ApiModelRef {
                reference: ModelUri::nested(nested).to_string(),
                overrides: pointer,
            });
        }

        if property.is_array() {
            if let Some(items) = property.items.take() {
                match self.flatten(document, *items, &mut Vec::new()) {
                    Ok(mut item)
                        if item.is_object() && !item.is_chooser() && !item.properties.is_empty() =>
                    {
                        if item.title.is_none() {
                            item.title = Some(key.to_string());
                        }
                        let nested = self.registry.register(scope, key, item);
                        property.items = Some(Box::new(SchemaNode::reference(
                            ModelUri::nested(nested).to_string(),
                        )));
                    }
                    Ok(mut item) => {
                        Self::strip_leaf(&mut item);
                        property.items = Some(Box::new(item.into()));
                    }
                    Err(err) => warn!("Dropping item schema of '{}': {}", key, err),
                }
            }
        }

        property.into()
    }

    fn strip_leaf(leaf: &mut ApiModel) {
        leaf.properties.clear();
        leaf.required.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchemaType;
    use crate::store::StaticSchemaSource;
    use serde_json::json;

    fn resolver(document: serde_json::Value) -> ModelResolver {
        ModelResolver::new(Arc::new(StaticSchemaSource::from_value(document).unwrap()))
    }

    fn property_keys(model: &ApiModel) -> Vec<String> {
        let mut keys: Vec<String> = model.properties.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn test_ref_overrides_win() {
        let resolver = resolver(json!({
            "definitions": {
                "Person": {
                    "type": "object",
                    "title": "Person",
                    "x-reference": "person",
                    "properties": {"name": {"type": "string"}}
                },
                "Opus": {
                    "type": "object",
                    "required": ["composer"],
                    "properties": {
                        "composer": {"$ref": "#/definitions/Person", "title": "Composer", "x-order": 2},
                        "title": {"type": "string", "x-order": 1}
                    }
                }
            }
        }));

        let opus = resolver.resolve(&ModelUri::parse("Opus")).await.unwrap();
        assert_eq!(opus.title.as_deref(), Some("Opus"));
        let composer = opus.properties["composer"].as_model().unwrap();
        assert_eq!(composer.title.as_deref(), Some("Composer"));
        assert_eq!(composer.order(), 2);
        assert!(composer.is_required());
        assert_eq!(composer.ext.reference.as_deref(), Some("person"));
        assert!(!opus.properties["title"].meta().is_required());
        assert_eq!(opus.visible_keys(), vec!["title", "composer"]);
    }

    #[tokio::test]
    async fn test_all_of_is_associative_on_properties() {
        let document = json!({
            "definitions": {
                "A": {"type": "object", "title": "A", "properties": {"a": {"type": "string"}}},
                "B": {"type": "object", "title": "B", "properties": {"b": {"type": "number"}}},
                "C": {"type": "object", "title": "C", "properties": {"c": {"type": "boolean"}}},
                "Flat": {"allOf": [
                    {"$ref": "#/definitions/A"},
                    {"$ref": "#/definitions/B"},
                    {"$ref": "#/definitions/C"}
                ]},
                "Grouped": {"allOf": [
                    {"$ref": "#/definitions/A"},
                    {"allOf": [{"$ref": "#/definitions/B"}, {"$ref": "#/definitions/C"}]}
                ]}
            }
        });
        let resolver = resolver(document);

        let flat = resolver.resolve(&ModelUri::parse("Flat")).await.unwrap();
        let grouped = resolver.resolve(&ModelUri::parse("Grouped")).await.unwrap();
        assert_eq!(property_keys(&flat), vec!["a", "b", "c"]);
        assert_eq!(property_keys(&flat), property_keys(&grouped));
        // later member's scalar attributes dominate
        assert_eq!(flat.title.as_deref(), Some("C"));
        assert_eq!(grouped.title.as_deref(), Some("C"));
    }

    #[tokio::test]
    async fn test_malformed_all_of_member_is_identity() {
        let resolver = resolver(json!({
            "definitions": {
                "A": {"type": "object", "properties": {"a": {"type": "string"}}},
                "Broken": {"allOf": [{"$ref": "#/definitions/A"}, {"description": "no properties"}]}
            }
        }));
        let broken = resolver.resolve(&ModelUri::parse("Broken")).await.unwrap();
        assert_eq!(property_keys(&broken), vec!["a"]);
        assert_eq!(broken.description, None);
    }

    #[tokio::test]
    async fn test_unknown_definition_fails() {
        let resolver = resolver(json!({"definitions": {}}));
        let err = resolver.resolve(&ModelUri::parse("Missing")).await.unwrap_err();
        assert_eq!(err, ResolutionError::UnknownDefinition("Missing".to_string()));
    }

    #[tokio::test]
    async fn test_unresolvable_property_is_skipped() {
        let resolver = resolver(json!({
            "definitions": {
                "Opus": {"type": "object", "properties": {
                    "title": {"type": "string"},
                    "ghost": {"$ref": "#/definitions/Nowhere"}
                }}
            }
        }));
        let opus = resolver.resolve(&ModelUri::parse("Opus")).await.unwrap();
        assert_eq!(property_keys(&opus), vec!["title"]);
    }

    #[tokio::test]
    async fn test_ref_chain_cycle_is_an_error() {
        let resolver = resolver(json!({
            "definitions": {
                "A": {"$ref": "#/definitions/B"},
                "B": {"$ref": "#/definitions/A"}
            }
        }));
        let err = resolver.resolve(&ModelUri::parse("A")).await.unwrap_err();
        assert!(matches!(err, ResolutionError::ReferenceCycle(_)));
    }

    #[tokio::test]
    async fn test_inline_objects_become_nested_refs() {
        let resolver = resolver(json!({
            "definitions": {
                "Opus": {
                    "type": "object",
                    "properties": {
                        "dating": {"type": "object", "properties": {"year": {"type": "integer"}}},
                        "parts": {
                            "type": "array",
                            "items": {"type": "object", "properties": {"name": {"type": "string"}}}
                        },
                        "tags": {"type": "array", "items": {"type": "string"}}
                    }
                }
            }
        }));

        let opus = resolver.resolve(&ModelUri::parse("Opus")).await.unwrap();
        assert_eq!(opus.properties["dating"].ref_target(), Some("nested/Opus.dating"));
        assert_eq!(
            opus.properties["dating"].meta().schema_type,
            Some(SchemaType::Object)
        );
        let parts = opus.properties["parts"].as_model().unwrap();
        assert_eq!(
            parts.items.as_ref().unwrap().ref_target(),
            Some("nested/Opus.parts")
        );
        let tags = opus.properties["tags"].as_model().unwrap();
        assert_eq!(tags.items.as_ref().unwrap().ref_target(), None);

        let dating = resolver
            .resolve(&ModelUri::parse("nested/Opus.dating"))
            .await
            .unwrap();
        assert_eq!(dating.title.as_deref(), Some("dating"));
        assert_eq!(property_keys(&dating), vec!["year"]);
    }

    #[tokio::test]
    async fn test_chooser_schemas_keep_no_raw_properties() {
        let resolver = resolver(json!({
            "definitions": {
                "Person": {
                    "type": "object",
                    "x-reference": "person",
                    "properties": {
                        "name": {"type": "string"},
                        "mentor": {"$ref": "#/definitions/Person"}
                    }
                },
                "Opus": {
                    "type": "object",
                    "properties": {
                        "composer": {"$ref": "#/definitions/Person"},
                        "performers": {"type": "array", "items": {"$ref": "#/definitions/Person"}},
                        "genres": {
                            "type": "array",
                            "items": {"type": "string", "properties": {"raw": {"allOf": []}}}
                        }
                    }
                }
            }
        }));

        let opus = resolver.resolve(&ModelUri::parse("Opus")).await.unwrap();
        let composer = opus.properties["composer"].as_model().unwrap();
        assert!(composer.is_chooser());
        assert!(composer.properties.is_empty());

        let performers = opus.properties["performers"].as_model().unwrap();
        let item = performers.items.as_ref().unwrap().as_model().unwrap();
        assert!(item.is_chooser());
        assert!(item.properties.is_empty());

        let genres = opus.properties["genres"].as_model().unwrap();
        let item = genres.items.as_ref().unwrap().as_model().unwrap();
        assert!(item.properties.is_empty());
        assert_eq!(resolver.registry().len(), 0);
    }

    #[tokio::test]
    async fn test_self_embedding_terminates() {
        let resolver = resolver(json!({
            "definitions": {
                "Person": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "mentor": {"$ref": "#/definitions/Person"}
                    }
                }
            }
        }));

        let person = resolver.resolve(&ModelUri::parse("Person")).await.unwrap();
        let mentor_ref = person.properties["mentor"].ref_target().unwrap().to_string();
        assert_eq!(mentor_ref, "nested/Person.mentor");

        let mentor = resolver.resolve(&ModelUri::parse(&mentor_ref)).await.unwrap();
        assert_eq!(
            mentor.properties["mentor"].ref_target(),
            Some("nested/Person.mentor.mentor")
        );
        assert_eq!(resolver.registry().len(), 2);
    }
}
