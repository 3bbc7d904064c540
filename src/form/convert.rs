//! Build a form definition from a resolved table and view options.

use super::field::{FieldKind, FormField, FormSpec};
use crate::config::{FormArgs, InlineModelConfig, ModelViewConfig, ResolvedEntity, ResolvedModel};
use crate::error::ConfigError;
use crate::naming::prettify_name;
use std::collections::{HashMap, HashSet};

/// The form-related options of a model view or inline model.
#[derive(Clone, Debug, Default)]
pub struct FormOptions {
    pub columns: Option<Vec<String>>,
    pub excluded: Vec<String>,
    pub args: HashMap<String, FormArgs>,
    pub labels: HashMap<String, String>,
    pub overrides: HashMap<String, String>,
    pub choices: HashMap<String, Vec<(String, String)>>,
    pub ajax_refs: HashSet<String>,
}

impl From<&ModelViewConfig> for FormOptions {
    fn from(cfg: &ModelViewConfig) -> Self {
        FormOptions {
            columns: cfg.form_columns.clone(),
            excluded: cfg.form_excluded_columns.clone(),
            args: cfg.form_args.clone(),
            labels: cfg.column_labels.clone(),
            overrides: cfg.form_overrides.clone(),
            choices: cfg.form_choices.clone(),
            ajax_refs: cfg.form_ajax_refs.keys().cloned().collect(),
        }
    }
}

impl From<&InlineModelConfig> for FormOptions {
    fn from(cfg: &InlineModelConfig) -> Self {
        FormOptions {
            columns: cfg.form_columns.clone(),
            excluded: cfg.form_excluded_columns.clone(),
            args: cfg.form_args.clone(),
            ..FormOptions::default()
        }
    }
}

fn apply_override(view: &str, column: &str, kind: FieldKind, widget: &str) -> Result<FieldKind, ConfigError> {
    Ok(match widget {
        "text" => FieldKind::Text,
        "textarea" => FieldKind::TextArea,
        "hidden" => FieldKind::Hidden { inner: Box::new(kind) },
        "json" => FieldKind::Json,
        _ => {
            return Err(ConfigError::Validation(format!(
                "view {}: unknown form override '{}' for {}",
                view, widget, column
            )))
        }
    })
}

/// Scaffold a form for `entity`. Generated primary keys are left out unless listed in `columns`.
pub fn scaffold_form(
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    opts: &FormOptions,
) -> Result<FormSpec, ConfigError> {
    let names: Vec<String> = match &opts.columns {
        Some(cols) => {
            for c in cols {
                if !entity.has_column(c) {
                    return Err(ConfigError::UnknownColumn {
                        view: entity.table_id.clone(),
                        option: "form_columns",
                        column: c.clone(),
                    });
                }
            }
            cols.clone()
        }
        None => entity
            .columns
            .iter()
            .filter(|c| !(c.is_pk() && c.has_default))
            .map(|c| c.name.clone())
            .collect(),
    };

    let mut fields = Vec::new();
    for name in names.iter().filter(|n| !opts.excluded.contains(n)) {
        let Some(column) = entity.column(name) else {
            continue;
        };
        let mut kind = match entity.to_one_relation(name) {
            Some(rel) => {
                let target = model.entity(&rel.related_table_id).ok_or_else(|| ConfigError::MissingReference {
                    kind: "table",
                    id: rel.related_table_id.clone(),
                })?;
                FieldKind::Relation {
                    target: target.table_id.clone(),
                    pk_type: target.pk_type.clone(),
                    ajax: opts.ajax_refs.contains(name),
                }
            }
            None => FieldKind::for_column(column.kind, &column.enum_values),
        };
        if let Some(choices) = opts.choices.get(name) {
            kind = FieldKind::Select {
                choices: choices.clone(),
            };
        }
        if let Some(widget) = opts.overrides.get(name) {
            kind = apply_override(&entity.table_id, name, kind, widget)?;
        }

        let args = opts.args.get(name);
        let label = args
            .and_then(|a| a.label.clone())
            .or_else(|| opts.labels.get(name).cloned())
            .unwrap_or_else(|| prettify_name(name));
        let validation = args.and_then(|a| a.validation.clone());
        let required = validation.as_ref().and_then(|v| v.required).unwrap_or(
            !column.nullable && !column.has_default && kind != FieldKind::Boolean && !kind.is_hidden(),
        );
        fields.push(FormField {
            name: name.clone(),
            label,
            kind,
            required,
            description: args.and_then(|a| a.description.clone()),
            default: args.and_then(|a| a.default.clone()).or_else(|| column.default_value.clone()),
            validation,
        });
    }
    for key in opts.args.keys() {
        if !fields.iter().any(|f| &f.name == key) {
            tracing::warn!(table = %entity.table_id, field = %key, "form_args names a field not in the form");
        }
    }
    Ok(FormSpec {
        fields,
        inlines: Vec::new(),
    })
}
