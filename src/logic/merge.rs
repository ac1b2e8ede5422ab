use itertools::Itertools;
use std::collections::HashSet;

use crate::model::{ApiModel, Extensions, SchemaNode};

/// Overwrite each listed field of `$target` with `$source`'s when the source declares it
macro_rules! overwrite {
    ($target:expr, $source:expr; $($field:ident),+ $(,)?) => {
        $(
            if $source.$field.is_some() {
                $target.$field = $source.$field;
            }
        )+
    };
}

/// Folds schema nodes together: later sources win on scalar attributes,
/// `required` and `properties` are unioned.
pub struct SchemaMerger;

impl SchemaMerger {
    /// Merge `source` onto `target`; a missing target is the identity element.
    pub fn merge(target: Option<ApiModel>, source: ApiModel) -> ApiModel {
        match target {
            None => source,
            Some(mut target) => {
                Self::merge_into(&mut target, source);
                target
            }
        }
    }

    pub fn merge_into(target: &mut ApiModel, source: ApiModel) {
        overwrite!(target, source; schema_type, title, description, format, items, enum_values,
            example, min_length, max_length, minimum, maximum, min_items, max_items, pattern);

        Self::merge_extensions(&mut target.ext, source.ext);

        if !source.required.is_empty() {
            target.required = target
                .required
                .drain(..)
                .chain(source.required)
                .unique()
                .collect();
        }

        for (key, value) in source.other {
            target.other.insert(key, value);
        }

        Self::merge_properties(target, source.properties);
    }

    fn merge_extensions(target: &mut Extensions, source: Extensions) {
        overwrite!(target, source; key, order, null_value, nullable, reference, taxonomy,
            is_array, allow_save, hidden, enum_translation, required);
    }

    /// Union property sets by key. A newly added property whose explicit `x-order`
    /// collides with one already on the target is shifted past the target's
    /// highest order, keeping the source's relative ordering.
    pub fn merge_properties(
        target: &mut ApiModel,
        properties: indexmap::IndexMap<String, SchemaNode>,
    ) {
        if properties.is_empty() {
            return;
        }

        let max_order = target.max_property_order();
        let mut taken: HashSet<i64> = target
            .properties
            .values()
            .filter_map(|p| p.meta().ext.order)
            .collect();

        for (key, mut node) in properties {
            if let Some(existing) = target.properties.get_mut(&key) {
                match (existing, node) {
                    (SchemaNode::Model(existing), SchemaNode::Model(model)) => {
                        Self::merge_into(existing, model);
                    }
                    (existing, node) => *existing = node,
                }
                continue;
            }

            if let Some(order) = node.meta().ext.order {
                if taken.contains(&order) {
                    let shifted = if order > 0 {
                        order + max_order
                    } else {
                        max_order + 1
                    };
                    node.meta_mut().ext.order = Some(shifted);
                    taken.insert(shifted);
                } else {
                    taken.insert(order);
                }
            }
            target.properties.insert(key, node);
        }
    }
}
