//! Inline models: child rows edited inside the parent's form.
//!
//! The converter finds the child's foreign key to the parent, builds the child form
//! without it, and `plan_changes` diffs submitted entries against the stored rows.

use super::bound::InlineEntry;
use super::convert::{scaffold_form, FormOptions};
use super::field::{FieldKind, FormField, FormSpec};
use crate::backend::InlineChange;
use crate::config::{
    InlineModelConfig, PkType, Record, RelationDirection, ResolvedEntity, ResolvedModel,
};
use crate::error::ConfigError;
use crate::naming::prettify_name;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Serialize)]
pub struct InlineFormSpec {
    /// Form list name; keys are `{name}-{index}-{field}`.
    pub name: String,
    pub label: String,
    pub entity_id: String,
    /// Child column holding the parent key.
    pub fk_column: String,
    /// Parent column referenced by `fk_column`.
    pub parent_key_column: String,
    pub pk_column: String,
    #[serde(skip)]
    pub pk_type: PkType,
    pub form: FormSpec,
}

pub struct InlineModelConverter;

impl InlineModelConverter {
    /// Resolve the relationship from the child to `parent` and build the child form.
    pub fn contribute(
        model: &ResolvedModel,
        parent: &ResolvedEntity,
        cfg: &InlineModelConfig,
    ) -> Result<InlineFormSpec, ConfigError> {
        let child = model.entity(&cfg.entity_id).ok_or_else(|| ConfigError::MissingReference {
            kind: "inline model table",
            id: cfg.entity_id.clone(),
        })?;
        let candidates: Vec<_> = child
            .relations
            .iter()
            .filter(|r| r.direction == RelationDirection::ToOne && r.related_table_id == parent.table_id)
            .filter(|r| cfg.fk_column.as_ref().map_or(true, |fk| &r.our_key_column == fk))
            .collect();
        let rel = match candidates.as_slice() {
            [] => {
                return Err(ConfigError::MissingInlineRelation {
                    parent: parent.table_id.clone(),
                    child: child.table_id.clone(),
                })
            }
            [one] => *one,
            _ => {
                return Err(ConfigError::AmbiguousInlineRelation {
                    parent: parent.table_id.clone(),
                    child: child.table_id.clone(),
                })
            }
        };

        let mut opts = FormOptions::from(cfg);
        opts.excluded.push(rel.our_key_column.clone());
        opts.excluded.push(child.pk_column.clone());
        let mut form = scaffold_form(model, child, &opts)?;
        form.fields.insert(
            0,
            FormField::new(
                child.pk_column.clone(),
                prettify_name(&child.pk_column),
                FieldKind::Hidden {
                    inner: Box::new(FieldKind::for_pk(&child.pk_type)),
                },
            ),
        );

        Ok(InlineFormSpec {
            name: cfg.name.clone().unwrap_or_else(|| child.table_name.clone()),
            label: cfg.label.clone().unwrap_or_else(|| prettify_name(&child.table_name)),
            entity_id: child.table_id.clone(),
            fk_column: rel.our_key_column.clone(),
            parent_key_column: rel.their_key_column.clone(),
            pk_column: child.pk_column.clone(),
            pk_type: child.pk_type.clone(),
            form,
        })
    }
}

fn same_key(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Diff submitted entries against the parent's stored child rows.
///
/// A known key updates the row, or deletes it when flagged. Entries without a key, or with a
/// key the parent does not own, are inserted unless flagged. Stored rows that were not
/// submitted are left alone.
pub fn plan_changes(spec: &InlineFormSpec, existing: &[Record], entries: &[InlineEntry]) -> Vec<InlineChange> {
    let mut changes = Vec::new();
    for entry in entries {
        let known = entry.pk.as_ref().filter(|pk| {
            existing
                .iter()
                .any(|row| row.get(&spec.pk_column).is_some_and(|v| same_key(v, pk)))
        });
        match (known, entry.delete) {
            (Some(pk), true) => changes.push(InlineChange::Delete(pk.clone())),
            (Some(pk), false) => changes.push(InlineChange::Update {
                id: pk.clone(),
                values: entry.values(&spec.pk_column),
            }),
            (None, true) => {}
            (None, false) => changes.push(InlineChange::Insert(entry.values(&spec.pk_column))),
        }
    }
    changes
}
