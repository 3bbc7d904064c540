//! A form bound to submitted data or a stored record.

use super::data::FormData;
use super::field::{raw_of, FieldKind, FormField, FormSpec};
use super::inline::InlineFormSpec;
use super::validation::{is_blank, validate_value, REQUIRED_MESSAGE};
use crate::config::Record;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Debug, Serialize)]
pub struct BoundField {
    #[serde(flatten)]
    pub field: FormField,
    pub raw: String,
    pub value: Value,
    pub errors: Vec<String>,
    /// Select options loaded at render time (relation fields).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<(String, String)>>,
}

impl BoundField {
    fn unbound(field: &FormField) -> Self {
        let value = field.default.clone().unwrap_or(Value::Null);
        BoundField {
            field: field.clone(),
            raw: raw_of(&value),
            value,
            errors: Vec::new(),
            options: None,
        }
    }

    /// Bind from submitted data under `key`. Missing keys keep `current`, except checkboxes.
    fn bind(field: &FormField, key: &str, data: &FormData, current: Option<&Value>) -> Self {
        let mut bound = BoundField::unbound(field);
        if let Some(v) = current {
            bound.value = v.clone();
            bound.raw = raw_of(v);
        }
        let raw = match (data.get(key), &field.kind) {
            (Some(raw), _) => raw.to_string(),
            (None, FieldKind::Boolean) => String::new(),
            (None, _) => return bound,
        };
        match field.kind.coerce(&raw) {
            Ok(v) => bound.value = v,
            Err(e) => {
                bound.value = Value::Null;
                bound.errors.push(e);
            }
        }
        bound.raw = raw;
        bound
    }

    fn from_value(field: &FormField, value: Option<&Value>) -> Self {
        let mut bound = BoundField::unbound(field);
        if let Some(v) = value {
            bound.value = v.clone();
            bound.raw = raw_of(v);
        }
        bound
    }

    fn validate(&mut self) {
        if !self.errors.is_empty() {
            return;
        }
        if self.field.required && is_blank(&self.value) {
            self.errors.push(REQUIRED_MESSAGE.to_string());
            return;
        }
        if let Some(rule) = &self.field.validation {
            self.errors.extend(validate_value(&self.value, rule));
        }
    }
}

/// One child row of an inline list.
#[derive(Clone, Debug, Serialize)]
pub struct InlineEntry {
    pub index: usize,
    pub pk: Option<Value>,
    pub delete: bool,
    pub fields: Vec<BoundField>,
}

impl InlineEntry {
    /// Submitted values without the primary key.
    pub fn values(&self, pk_column: &str) -> Record {
        self.fields
            .iter()
            .filter(|f| f.field.name != pk_column)
            .map(|f| (f.field.name.clone(), f.value.clone()))
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.fields.iter().any(|f| !f.errors.is_empty())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BoundInline {
    pub name: String,
    pub label: String,
    pub entries: Vec<InlineEntry>,
    /// Blank entry a client clones to add a row.
    pub template: Vec<BoundField>,
}

impl BoundInline {
    fn from_rows(spec: &InlineFormSpec, rows: &[Record]) -> Self {
        let entries = rows
            .iter()
            .enumerate()
            .map(|(index, row)| InlineEntry {
                index,
                pk: row.get(&spec.pk_column).filter(|v| !v.is_null()).cloned(),
                delete: false,
                fields: spec
                    .form
                    .fields
                    .iter()
                    .map(|f| BoundField::from_value(f, row.get(&f.name)))
                    .collect(),
            })
            .collect();
        BoundInline::with_entries(spec, entries)
    }

    fn from_data(spec: &InlineFormSpec, data: &FormData, rows: &[Record]) -> Self {
        let prefix = format!("{}-", spec.name);
        let indices: BTreeSet<usize> = data
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split_once('-'))
            .filter(|(_, field)| spec.form.field(field).is_some())
            .filter_map(|(i, _)| i.parse().ok())
            .collect();
        let entries = indices
            .into_iter()
            .map(|index| {
                let key = |field: &str| format!("{}-{}-{}", spec.name, index, field);
                let pk = data
                    .get(&key(&spec.pk_column))
                    .and_then(|raw| FieldKind::for_pk(&spec.pk_type).coerce(raw).ok())
                    .filter(|v| !v.is_null());
                let stored = pk.as_ref().and_then(|pk| {
                    rows.iter()
                        .find(|r| r.get(&spec.pk_column).is_some_and(|v| v == pk))
                });
                let delete = data
                    .get(&format!("del-{}-{}", spec.name, index))
                    .is_some_and(|v| FieldKind::Boolean.coerce(v) == Ok(Value::Bool(true)));
                let fields = spec
                    .form
                    .fields
                    .iter()
                    .map(|f| BoundField::bind(f, &key(&f.name), data, stored.and_then(|r| r.get(&f.name))))
                    .collect();
                InlineEntry {
                    index,
                    pk,
                    delete,
                    fields,
                }
            })
            .collect();
        BoundInline::with_entries(spec, entries)
    }

    fn with_entries(spec: &InlineFormSpec, entries: Vec<InlineEntry>) -> Self {
        BoundInline {
            name: spec.name.clone(),
            label: spec.label.clone(),
            entries,
            template: spec.form.fields.iter().map(BoundField::unbound).collect(),
        }
    }
}

fn rows_for<'a>(children: &'a HashMap<String, Vec<Record>>, name: &str) -> &'a [Record] {
    children.get(name).map(Vec::as_slice).unwrap_or(&[])
}

/// A form definition bound to values, with per-field errors.
#[derive(Clone, Debug, Serialize)]
pub struct BoundForm {
    pub fields: Vec<BoundField>,
    pub inlines: Vec<BoundInline>,
    #[serde(skip)]
    pub submitted: bool,
}

impl BoundForm {
    /// Bind `spec` to submitted `data`, falling back to `obj` values for keys not submitted.
    /// `children` holds the stored rows of each inline list, keyed by list name.
    pub fn process(
        spec: &FormSpec,
        data: Option<&FormData>,
        obj: Option<&Record>,
        children: &HashMap<String, Vec<Record>>,
    ) -> BoundForm {
        match data {
            Some(data) => BoundForm {
                fields: spec
                    .fields
                    .iter()
                    .map(|f| BoundField::bind(f, &f.name, data, obj.and_then(|o| o.get(&f.name))))
                    .collect(),
                inlines: spec
                    .inlines
                    .iter()
                    .map(|i| BoundInline::from_data(i, data, rows_for(children, &i.name)))
                    .collect(),
                submitted: true,
            },
            None => BoundForm {
                fields: spec
                    .fields
                    .iter()
                    .map(|f| match obj {
                        Some(o) => BoundField::from_value(f, o.get(&f.name)),
                        None => BoundField::unbound(f),
                    })
                    .collect(),
                inlines: spec
                    .inlines
                    .iter()
                    .map(|i| BoundInline::from_rows(i, rows_for(children, &i.name)))
                    .collect(),
                submitted: false,
            },
        }
    }

    /// Run required checks and validation rules. Entries flagged for deletion are skipped.
    pub fn validate(&mut self) -> bool {
        for f in &mut self.fields {
            f.validate();
        }
        for inline in &mut self.inlines {
            for entry in inline.entries.iter_mut().filter(|e| !e.delete) {
                for f in &mut entry.fields {
                    f.validate();
                }
            }
        }
        !self.has_errors()
    }

    pub fn has_errors(&self) -> bool {
        self.fields.iter().any(|f| !f.errors.is_empty())
            || self
                .inlines
                .iter()
                .flat_map(|i| i.entries.iter())
                .any(|e| !e.delete && e.has_errors())
    }

    /// Errors keyed by form key (`field` or `{list}-{i}-{field}`).
    pub fn errors(&self) -> HashMap<String, Vec<String>> {
        let mut out = HashMap::new();
        for f in self.fields.iter().filter(|f| !f.errors.is_empty()) {
            out.insert(f.field.name.clone(), f.errors.clone());
        }
        for inline in &self.inlines {
            for entry in inline.entries.iter().filter(|e| !e.delete) {
                for f in entry.fields.iter().filter(|f| !f.errors.is_empty()) {
                    out.insert(format!("{}-{}-{}", inline.name, entry.index, f.field.name), f.errors.clone());
                }
            }
        }
        out
    }

    pub fn field(&self, name: &str) -> Option<&BoundField> {
        self.fields.iter().find(|f| f.field.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut BoundField> {
        self.fields.iter_mut().find(|f| f.field.name == name)
    }

    pub fn inline(&self, name: &str) -> Option<&BoundInline> {
        self.inlines.iter().find(|i| i.name == name)
    }

    /// Copy field values into `record`.
    pub fn populate(&self, record: &mut Record) {
        for f in &self.fields {
            record.insert(f.field.name.clone(), f.value.clone());
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
