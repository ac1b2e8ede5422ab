use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::error::FormError;
use crate::logic::control::{ControlKind, FormControl, FormGroup, ValueAccessor};
use crate::logic::form_builder::FormBuilder;
use crate::logic::specification_editor::SpecificationEditor;
use crate::logic::specification_overlay::{SharedOverlay, SpecificationOverlay};
use crate::model::{ApiModel, FormStatus, PropertyFilter, SpecificationKind};
use crate::store::ModelCache;

/// Default quiet period before a bulk patch is published
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Key under which annotation records travel with the entity
pub const SPECIFICATIONS_KEY: &str = "specifications";

pub type LayerId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum LayerState {
    /// Waiting for its model; counts as invalid
    Pending,
    Ready,
    /// The model never arrived; the section is not rendered
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
enum ChildSlot {
    Object(LayerId),
    Array(Vec<LayerId>),
}

impl ChildSlot {
    fn ids(&self) -> Vec<LayerId> {
        match self {
            ChildSlot::Object(id) => vec![*id],
            ChildSlot::Array(ids) => ids.clone(),
        }
    }
}

/// One node of the form tree, bound to one resolved model
#[derive(Debug)]
pub struct FormLayer {
    path: String,
    model_url: String,
    filter: PropertyFilter,
    state: LayerState,
    model: Option<Arc<ApiModel>>,
    group: FormGroup,
    start_data: Option<Value>,
    children: IndexMap<String, ChildSlot>,
}

impl FormLayer {
    fn new(
        path: String,
        model_url: String,
        filter: PropertyFilter,
        start_data: Option<Value>,
    ) -> Self {
        Self {
            path,
            model_url,
            filter,
            state: LayerState::Pending,
            model: None,
            group: FormGroup::default(),
            start_data,
            children: IndexMap::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn model_url(&self) -> &str {
        &self.model_url
    }

    pub fn filter(&self) -> &PropertyFilter {
        &self.filter
    }

    pub fn state(&self) -> &LayerState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LayerState::Ready
    }

    pub fn model(&self) -> Option<&Arc<ApiModel>> {
        self.model.as_ref()
    }

    pub fn group(&self) -> &FormGroup {
        &self.group
    }

    /// Last data pushed into this layer from outside
    pub fn start_data(&self) -> Option<&Value> {
        self.start_data.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct FormOptions {
    pub filter: PropertyFilter,
    pub start_data: Option<Value>,
    /// Opaque value handed to reference choosers
    pub context: Option<Value>,
    /// Inject the annotation overlay into `data`
    pub specifications: bool,
    pub debounce: Duration,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            filter: PropertyFilter::default(),
            start_data: None,
            context: None,
            specifications: true,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

enum Emit {
    Now(FormStatus),
    Debounced(FormStatus),
}

/// Publishes the root status on a background task: immediate emissions go out
/// on the next turn, debounced ones once no newer status arrived for the
/// debounce period.
struct StatusPublisher {
    sender: mpsc::UnboundedSender<Emit>,
    status: watch::Receiver<FormStatus>,
}

impl StatusPublisher {
    fn spawn(debounce: Duration) -> Self {
        let (status_tx, status) = watch::channel(FormStatus::default());
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(Self::run(receiver, status_tx, debounce));
        Self { sender, status }
    }

    async fn run(
        mut receiver: mpsc::UnboundedReceiver<Emit>,
        status_tx: watch::Sender<FormStatus>,
        debounce: Duration,
    ) {
        let mut pending: Option<FormStatus> = None;
        loop {
            let next = if pending.is_some() {
                match tokio::time::timeout(debounce, receiver.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        if let Some(status) = pending.take() {
                            Self::publish(&status_tx, status);
                        }
                        continue;
                    }
                }
            } else {
                receiver.recv().await
            };

            match next {
                Some(Emit::Now(status)) => {
                    pending = None;
                    Self::publish(&status_tx, status);
                }
                Some(Emit::Debounced(status)) => pending = Some(status),
                None => {
                    if let Some(status) = pending.take() {
                        Self::publish(&status_tx, status);
                    }
                    break;
                }
            }
        }
    }

    fn publish(status_tx: &watch::Sender<FormStatus>, status: FormStatus) {
        status_tx.send_if_modified(move |current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn emit(&self, emit: Emit) {
        if self.sender.send(emit).is_err() {
            log::debug!("Status publisher stopped, dropping emission");
        }
    }
}

/// Children to create once a layer's own controls exist
enum Seed {
    Object {
        key: String,
        model_url: String,
        data: Value,
    },
    Array {
        key: String,
        model_url: String,
        items: Vec<Value>,
    },
}

/// The live form: an arena of layers addressed by dotted data paths
/// (`""` for the root, `dating`, `parts.0.voices.2`).
///
/// Layers whose model is still resolving are queued; `settle` drains the
/// queue. Validity is recomputed from the layers on every read, so a removed
/// layer can never report into the tree again.
pub struct FormTree {
    cache: Arc<ModelCache>,
    layers: Vec<Option<FormLayer>>,
    /// Slots of removed layers, reused before the arena grows
    free: Vec<LayerId>,
    root: LayerId,
    queue: VecDeque<LayerId>,
    overlay: SharedOverlay,
    context: Option<Value>,
    specifications: bool,
    publisher: StatusPublisher,
}

impl FormTree {
    /// Must be called within a tokio runtime
    pub fn new(cache: Arc<ModelCache>, model_url: &str, options: FormOptions) -> Self {
        let overlay = match (&options.start_data, options.specifications) {
            (Some(start), true) => SpecificationOverlay::from_value(&start[SPECIFICATIONS_KEY]),
            _ => SpecificationOverlay::new(),
        };
        Self::with_overlay(cache, model_url, options, overlay.shared())
    }

    pub fn with_overlay(
        cache: Arc<ModelCache>,
        model_url: &str,
        options: FormOptions,
        overlay: SharedOverlay,
    ) -> Self {
        let mut tree = Self {
            cache,
            layers: Vec::new(),
            free: Vec::new(),
            root: 0,
            queue: VecDeque::new(),
            overlay,
            context: options.context,
            specifications: options.specifications,
            publisher: StatusPublisher::spawn(options.debounce),
        };
        let filter = tree.root_filter(options.filter);
        tree.root = tree.insert_layer(String::new(), model_url.to_string(), filter, options.start_data);
        tree
    }

    pub async fn load(cache: Arc<ModelCache>, model_url: &str, options: FormOptions) -> Self {
        log::info!("Loading form for {}", model_url);
        let mut tree = Self::new(cache, model_url, options);
        tree.settle().await;
        tree.publish_now();
        tree
    }

    /// Resolve and build every queued layer, including children created on the way
    pub async fn settle(&mut self) {
        while let Some(id) = self.queue.pop_front() {
            let Some(layer) = self.get(id) else {
                continue;
            };
            if layer.state != LayerState::Pending {
                continue;
            }
            let model_url = layer.model_url.clone();

            match self.cache.get_or_resolve(&model_url).await {
                Ok(model) => self.build_layer(id, model),
                Err(err) => {
                    if let Some(layer) = self.get_mut(id) {
                        log::warn!("Form layer '{}' is unavailable: {}", layer.path, err);
                        layer.state = LayerState::Unavailable(err.to_string());
                    }
                }
            }
        }
    }

    pub fn is_settled(&self) -> bool {
        self.queue.is_empty()
    }

    /// Rebuild when the model or filter changed, patch values otherwise
    pub async fn bind(
        &mut self,
        model_url: &str,
        filter: PropertyFilter,
        start_data: Option<Value>,
    ) -> bool {
        let filter = self.root_filter(filter);
        let rebuild = match self.get(self.root) {
            Some(root) => root.model_url != model_url || root.filter != filter,
            None => true,
        };

        if !rebuild {
            return match start_data {
                Some(data) => self.patch(data).await,
                None => false,
            };
        }

        log::info!("Rebuilding form for {}", model_url);
        if self.specifications {
            if let Some(start) = &start_data {
                *self.overlay.write() = SpecificationOverlay::from_value(&start[SPECIFICATIONS_KEY]);
            }
        }
        self.remove_subtree(self.root);
        self.root = self.insert_layer(String::new(), model_url.to_string(), filter, start_data);
        self.settle().await;
        self.publish_now();
        true
    }

    /// Push external data into the existing controls. Values equal to the
    /// current ones are left alone, so echoing the form's own data back is a
    /// no-op. Returns whether anything changed.
    pub async fn patch(&mut self, data: Value) -> bool {
        let changed = self.patch_layer(self.root, &data);
        if !self.queue.is_empty() {
            self.settle().await;
        }
        if changed {
            self.publisher.emit(Emit::Debounced(self.status()));
        } else {
            log::debug!("Patch left the form unchanged");
        }
        changed
    }

    /// User edit of one control in the layer at `path`. Sub-form values may
    /// queue layers, which the next `settle` builds.
    pub fn set_value(&mut self, path: &str, key: &str, value: Value) -> Result<(), FormError> {
        let id = self.ready_layer(path)?;
        let is_sub_form = self.control_at(id, path, key)?.kind.is_sub_form();

        if is_sub_form {
            let mut data = Map::new();
            data.insert(key.to_string(), value);
            self.patch_layer(id, &Value::Object(data));
        } else if let Some(control) = self.get_mut(id).and_then(|l| l.group.get_mut(key)) {
            control.set_value(value);
        }
        self.publish_now();
        Ok(())
    }

    pub fn mark_touched(&mut self, path: &str, key: &str) -> Result<(), FormError> {
        let id = self.ready_layer(path)?;
        self.control_at(id, path, key)?;
        if let Some(control) = self.get_mut(id).and_then(|l| l.group.get_mut(key)) {
            control.mark_touched();
        }
        Ok(())
    }

    /// Append a placeholder element to the array at `path` (`voices`,
    /// `parts.0.voices`). The new layer is pending, and therefore invalid,
    /// until `settle` builds it. Returns the new layer's path.
    pub fn new_item(&mut self, path: &str) -> Result<String, FormError> {
        let (layer_path, key) = split_property_path(path);
        let id = self.ready_layer(layer_path)?;
        let item_model_url = match &self.control_at(id, layer_path, key)?.kind {
            ControlKind::Array {
                item_model_url: Some(url),
            } => url.clone(),
            _ => return Err(FormError::NotAnArray(path.to_string())),
        };

        let mut ids = self.array_children(id, key);
        let child_path = join_path(path, &ids.len().to_string());
        ids.push(self.insert_layer(
            child_path.clone(),
            item_model_url,
            PropertyFilter::default(),
            None,
        ));
        self.set_slot(id, key, ChildSlot::Array(ids));

        log::debug!("Added form item {}", child_path);
        self.publish_now();
        Ok(child_path)
    }

    /// Remove element `index` of the array at `path`, renumber later siblings
    /// and drop the annotations of the element and everything below it
    pub fn delete_item(&mut self, path: &str, index: usize) -> Result<(), FormError> {
        let (layer_path, key) = split_property_path(path);
        let id = self.ready_layer(layer_path)?;
        if !self.control_at(id, layer_path, key)?.kind.is_sub_form() {
            return Err(FormError::NotAnArray(path.to_string()));
        }

        let mut ids = match self.get(id).and_then(|l| l.children.get(key)) {
            Some(ChildSlot::Array(ids)) => ids.clone(),
            _ => return Err(FormError::NotAnArray(path.to_string())),
        };
        if index >= ids.len() {
            return Err(FormError::IndexOutOfRange {
                path: path.to_string(),
                index,
            });
        }

        let removed = ids.remove(index);
        self.remove_subtree(removed);
        for (position, child) in ids.iter().enumerate().skip(index) {
            self.repath(*child, join_path(path, &position.to_string()));
        }
        self.set_slot(id, key, ChildSlot::Array(ids));

        let removed_path = join_path(path, &index.to_string());
        let dropped = self.overlay.write().remove(&removed_path, true, true);
        log::debug!(
            "Removed form item {} and {} specification record(s)",
            removed_path,
            dropped
        );
        self.publish_now();
        Ok(())
    }

    /// Aggregate validity of the whole tree
    pub fn valid(&self) -> bool {
        self.layer_valid(self.root)
    }

    pub fn valid_at(&self, path: &str) -> bool {
        self.find(path).map(|id| self.layer_valid(id)).unwrap_or(false)
    }

    /// Validity of one property including the layers below it
    pub fn property_valid_at(&self, path: &str, key: &str) -> bool {
        self.find(path)
            .map(|id| self.property_valid(id, key))
            .unwrap_or(false)
    }

    /// Every visible root property not flagged `x-allowSave` is valid
    pub fn valid_for_save(&self) -> bool {
        self.get(self.root).map(|root| root.is_ready()).unwrap_or(false)
            && self.unsavable_properties().is_empty()
    }

    pub fn data(&self) -> Value {
        let mut data = self.layer_data(self.root);
        if self.specifications {
            if let Value::Object(map) = &mut data {
                map.insert(SPECIFICATIONS_KEY.to_string(), self.overlay.read().to_value());
            }
        }
        data
    }

    pub fn save(&self) -> Result<Value, FormError> {
        if !self.valid_for_save() {
            return Err(FormError::NotSavable {
                invalid: self.unsavable_properties(),
            });
        }
        Ok(self.data())
    }

    pub fn status(&self) -> FormStatus {
        FormStatus {
            valid: self.valid(),
            valid_for_save: self.valid_for_save(),
            data: self.data(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FormStatus> {
        self.publisher.status.clone()
    }

    /// Publish the current status, e.g. after an annotation was committed
    pub fn refresh(&self) {
        self.publish_now();
    }

    pub fn layer(&self, path: &str) -> Option<&FormLayer> {
        self.find(path).and_then(|id| self.get(id))
    }

    pub fn root(&self) -> Option<&FormLayer> {
        self.get(self.root)
    }

    /// Layer paths below the property at `path`
    pub fn children_of(&self, path: &str) -> Vec<String> {
        let (layer_path, key) = split_property_path(path);
        let Some(layer) = self.find(layer_path).and_then(|id| self.get(id)) else {
            return Vec::new();
        };
        layer
            .children
            .get(key)
            .map(|slot| {
                slot.ids()
                    .into_iter()
                    .filter_map(|id| self.get(id).map(|child| child.path.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn control(&self, path: &str, key: &str) -> Option<&FormControl> {
        self.layer(path).and_then(|layer| layer.group.get(key))
    }

    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    pub fn overlay(&self) -> &SharedOverlay {
        &self.overlay
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    pub async fn open_specification(
        &self,
        path: &str,
        kind: SpecificationKind,
    ) -> Result<SpecificationEditor, FormError> {
        SpecificationEditor::open(Arc::clone(&self.cache), Arc::clone(&self.overlay), path, kind)
            .await
    }

    fn root_filter(&self, mut filter: PropertyFilter) -> PropertyFilter {
        if self.specifications && !filter.exclude.iter().any(|k| k == SPECIFICATIONS_KEY) {
            filter.exclude.push(SPECIFICATIONS_KEY.to_string());
        }
        filter
    }

    fn publish_now(&self) {
        self.publisher.emit(Emit::Now(self.status()));
    }

    fn get(&self, id: LayerId) -> Option<&FormLayer> {
        self.layers.get(id).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: LayerId) -> Option<&mut FormLayer> {
        self.layers.get_mut(id).and_then(Option::as_mut)
    }

    fn find(&self, path: &str) -> Option<LayerId> {
        let mut current = self.root;
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        while let Some(segment) = segments.next() {
            current = match self.get(current)?.children.get(segment)? {
                ChildSlot::Object(child) => *child,
                ChildSlot::Array(items) => {
                    let index = segments.next()?.parse::<usize>().ok()?;
                    *items.get(index)?
                }
            };
        }
        self.get(current).map(|_| current)
    }

    fn ready_layer(&self, path: &str) -> Result<LayerId, FormError> {
        let id = self
            .find(path)
            .ok_or_else(|| FormError::UnknownPath(path.to_string()))?;
        match self.get(id).map(|layer| layer.is_ready()) {
            Some(true) => Ok(id),
            _ => Err(FormError::Unavailable(path.to_string())),
        }
    }

    fn control_at(&self, id: LayerId, path: &str, key: &str) -> Result<&FormControl, FormError> {
        self.get(id)
            .and_then(|layer| layer.group.get(key))
            .ok_or_else(|| FormError::UnknownControl {
                path: path.to_string(),
                key: key.to_string(),
            })
    }

    fn insert_layer(
        &mut self,
        path: String,
        model_url: String,
        filter: PropertyFilter,
        start_data: Option<Value>,
    ) -> LayerId {
        let layer = Some(FormLayer::new(path, model_url, filter, start_data));
        let id = match self.free.pop() {
            Some(id) => {
                self.layers[id] = layer;
                id
            }
            None => {
                self.layers.push(layer);
                self.layers.len() - 1
            }
        };
        self.queue.push_back(id);
        id
    }

    fn remove_subtree(&mut self, id: LayerId) {
        if let Some(layer) = self.layers.get_mut(id).and_then(Option::take) {
            // a reused slot must not inherit a stale queue entry
            self.queue.retain(|queued| *queued != id);
            self.free.push(id);
            for slot in layer.children.values() {
                for child in slot.ids() {
                    self.remove_subtree(child);
                }
            }
        }
    }

    fn drop_children(&mut self, id: LayerId) {
        let children = match self.get_mut(id) {
            Some(layer) => std::mem::take(&mut layer.children),
            None => return,
        };
        for slot in children.values() {
            for child in slot.ids() {
                self.remove_subtree(child);
            }
        }
    }

    fn repath(&mut self, id: LayerId, path: String) {
        let Some(layer) = self.get_mut(id) else {
            return;
        };
        layer.path = path.clone();
        let slots: Vec<(String, ChildSlot)> = layer
            .children
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect();

        for (key, slot) in slots {
            let base = join_path(&path, &key);
            match slot {
                ChildSlot::Object(child) => self.repath(child, base),
                ChildSlot::Array(ids) => {
                    for (index, child) in ids.into_iter().enumerate() {
                        self.repath(child, join_path(&base, &index.to_string()));
                    }
                }
            }
        }
    }

    fn array_children(&self, id: LayerId, key: &str) -> Vec<LayerId> {
        match self.get(id).and_then(|layer| layer.children.get(key)) {
            Some(ChildSlot::Array(ids)) => ids.clone(),
            _ => Vec::new(),
        }
    }

    fn set_slot(&mut self, id: LayerId, key: &str, slot: ChildSlot) {
        if let Some(layer) = self.get_mut(id) {
            layer.children.insert(key.to_string(), slot);
        }
    }

    /// Build controls from scratch, seed them and queue the child layers
    fn build_layer(&mut self, id: LayerId, model: Arc<ApiModel>) {
        self.drop_children(id);
        let Some(layer) = self.get_mut(id) else {
            return;
        };

        let mut group = FormBuilder::build(&model, &layer.filter);
        let start = layer.start_data.clone();
        let start = start.as_ref().and_then(Value::as_object);
        if let Some(data) = start {
            group.patch_value(&leaf_values(&group, data));
        }

        let seeds: Vec<Seed> = group
            .controls
            .iter()
            .filter_map(|(key, control)| {
                let slice = start.and_then(|data| data.get(key)).cloned();
                match &control.kind {
                    // no data, no layer: a model embedding itself would never bottom out
                    ControlKind::Object { model_url } => slice
                        .filter(|data| !data.is_null())
                        .or_else(|| control.schema.example.clone())
                        .map(|data| Seed::Object {
                            key: key.clone(),
                            model_url: model_url.clone(),
                            data,
                        }),
                    ControlKind::Array {
                        item_model_url: Some(model_url),
                    } => Some(Seed::Array {
                        key: key.clone(),
                        model_url: model_url.clone(),
                        items: slice
                            .unwrap_or_else(|| control.value().clone())
                            .as_array()
                            .cloned()
                            .unwrap_or_default(),
                    }),
                    _ => None,
                }
            })
            .collect();

        log::debug!(
            "Built form layer '{}' from {} with {} control(s)",
            layer.path,
            layer.model_url,
            group.len()
        );
        let path = layer.path.clone();
        layer.group = group;
        layer.model = Some(model);
        layer.state = LayerState::Ready;

        for seed in seeds {
            match seed {
                Seed::Object {
                    key,
                    model_url,
                    data,
                } => {
                    let child = self.insert_layer(
                        join_path(&path, &key),
                        model_url,
                        PropertyFilter::default(),
                        Some(data),
                    );
                    self.set_slot(id, &key, ChildSlot::Object(child));
                }
                Seed::Array {
                    key,
                    model_url,
                    items,
                } => {
                    let base = join_path(&path, &key);
                    let ids = items
                        .into_iter()
                        .enumerate()
                        .map(|(index, item)| {
                            self.insert_layer(
                                join_path(&base, &index.to_string()),
                                model_url.clone(),
                                PropertyFilter::default(),
                                Some(item),
                            )
                        })
                        .collect();
                    self.set_slot(id, &key, ChildSlot::Array(ids));
                }
            }
        }
    }

    fn patch_layer(&mut self, id: LayerId, data: &Value) -> bool {
        let Some(values) = data.as_object() else {
            return false;
        };
        let Some(layer) = self.get_mut(id) else {
            return false;
        };

        if !layer.is_ready() {
            // applied once the model arrives
            let changed = layer.start_data.as_ref() != Some(data);
            layer.start_data = Some(data.clone());
            return changed;
        }

        layer.start_data = Some(data.clone());
        let mut changed = !layer
            .group
            .patch_value(&leaf_values(&layer.group, values))
            .is_empty();

        let path = layer.path.clone();
        let sub_forms: Vec<(String, ChildSlot, String)> = layer
            .children
            .iter()
            .filter(|(key, _)| values.contains_key(*key))
            .filter_map(|(key, slot)| {
                let model_url = match &layer.group.get(key)?.kind {
                    ControlKind::Object { model_url } => model_url.clone(),
                    ControlKind::Array {
                        item_model_url: Some(model_url),
                    } => model_url.clone(),
                    ControlKind::Array { .. } | ControlKind::Field => return None,
                };
                Some((key.clone(), slot.clone(), model_url))
            })
            .collect();

        // object sub-forms that only get a layer once data arrives for them
        let arrived: Vec<(String, String, Value)> = layer
            .group
            .controls
            .iter()
            .filter(|(key, _)| !layer.children.contains_key(*key))
            .filter_map(|(key, control)| {
                let ControlKind::Object { model_url } = &control.kind else {
                    return None;
                };
                let value = values.get(key).filter(|value| !value.is_null())?;
                (value != control.value())
                    .then(|| (key.clone(), model_url.clone(), value.clone()))
            })
            .collect();

        for (key, model_url, value) in arrived {
            let child = self.insert_layer(
                join_path(&path, &key),
                model_url,
                PropertyFilter::default(),
                Some(value),
            );
            self.set_slot(id, &key, ChildSlot::Object(child));
            changed = true;
        }

        for (key, slot, model_url) in sub_forms {
            let value = &values[&key];
            changed |= match slot {
                ChildSlot::Object(child) => self.patch_layer(child, value),
                ChildSlot::Array(ids) => {
                    self.patch_array(id, &path, &key, ids, &model_url, value)
                }
            };
        }
        changed
    }

    /// Patch elements pairwise, then grow or shrink to the incoming length
    fn patch_array(
        &mut self,
        id: LayerId,
        path: &str,
        key: &str,
        mut ids: Vec<LayerId>,
        model_url: &str,
        value: &Value,
    ) -> bool {
        let Some(items) = value.as_array() else {
            return false;
        };
        let mut changed = false;
        for (child, item) in ids.iter().zip(items) {
            changed |= self.patch_layer(*child, item);
        }

        let base = join_path(path, key);
        if items.len() > ids.len() {
            for (index, item) in items.iter().enumerate().skip(ids.len()) {
                ids.push(self.insert_layer(
                    join_path(&base, &index.to_string()),
                    model_url.to_string(),
                    PropertyFilter::default(),
                    Some(item.clone()),
                ));
            }
            changed = true;
        } else if items.len() < ids.len() {
            for child in ids.split_off(items.len()) {
                self.remove_subtree(child);
            }
            changed = true;
        }

        self.set_slot(id, key, ChildSlot::Array(ids));
        changed
    }

    /// Pending and unavailable layers are invalid
    fn layer_valid(&self, id: LayerId) -> bool {
        match self.get(id) {
            Some(layer) if layer.is_ready() => layer
                .group
                .keys()
                .all(|key| self.property_valid(id, key)),
            _ => false,
        }
    }

    /// Own validators on the composed value plus every child layer
    fn property_valid(&self, id: LayerId, key: &str) -> bool {
        let Some(layer) = self.get(id) else {
            return false;
        };
        let Some(control) = layer.group.get(key) else {
            return false;
        };
        match layer.children.get(key) {
            Some(slot) => {
                let value = self.property_value(layer, key);
                control
                    .validators
                    .iter()
                    .all(|validator| validator.validate(&value).is_none())
                    && slot.ids().into_iter().all(|child| self.layer_valid(child))
            }
            None => control.is_valid(),
        }
    }

    fn unsavable_properties(&self) -> Vec<String> {
        let Some(root) = self.get(self.root) else {
            return Vec::new();
        };
        root.group
            .controls
            .iter()
            .filter(|(key, control)| !control.allows_save() && !self.property_valid(self.root, key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn property_value(&self, layer: &FormLayer, key: &str) -> Value {
        match layer.children.get(key) {
            Some(ChildSlot::Object(child)) => self.layer_data(*child),
            Some(ChildSlot::Array(ids)) => {
                Value::Array(ids.iter().map(|child| self.layer_data(*child)).collect())
            }
            None => layer
                .group
                .get(key)
                .map(|control| control.value().clone())
                .unwrap_or(Value::Null),
        }
    }

    /// Control values of a built layer; the last known data otherwise
    fn layer_data(&self, id: LayerId) -> Value {
        let Some(layer) = self.get(id) else {
            return Value::Null;
        };
        if !layer.is_ready() {
            return layer.start_data.clone().unwrap_or(Value::Null);
        }
        Value::Object(
            layer
                .group
                .keys()
                .map(|key| (key.clone(), self.property_value(layer, key)))
                .collect(),
        )
    }
}

/// Entries of `data` edited by leaf controls of `group`
fn leaf_values(group: &FormGroup, data: &Map<String, Value>) -> Map<String, Value> {
    data.iter()
        .filter(|(key, _)| {
            group
                .get(key)
                .map(|control| !control.kind.is_sub_form())
                .unwrap_or(false)
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub fn join_path(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", base, segment)
    }
}

/// `parts.0.voices` -> (`parts.0`, `voices`)
pub fn split_property_path(path: &str) -> (&str, &str) {
    path.rsplit_once('.').unwrap_or(("", path))
}
