//! In-memory document store. Each table is a list of records in insertion order.

use super::{parent_key, InlineChange, ListQuery, ModelBackend, PersistOp, PersistPlan, SortOrder};
use crate::config::{PkType, Record, ResolvedEntity};
use crate::error::AppError;
use crate::filters::{compare_values, matches_filters, matches_search, SearchQuery};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Clone, Debug, Default)]
struct Table {
    rows: Vec<Record>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Insert records as-is (keys generated when missing). For fixtures and demos.
    pub async fn seed(&self, entity: &ResolvedEntity, records: Vec<Record>) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(entity.table_id.clone()).or_default();
        for record in records {
            insert_row(table, entity, record)?;
        }
        Ok(())
    }

    pub async fn count(&self, entity: &ResolvedEntity) -> usize {
        self.tables
            .read()
            .await
            .get(&entity.table_id)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }
}

fn same_key(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) => {
            x == y
                || matches!(
                    (uuid::Uuid::parse_str(x), uuid::Uuid::parse_str(y)),
                    (Ok(u), Ok(v)) if u == v
                )
        }
        _ => a == b,
    }
}

fn position(table: &Table, entity: &ResolvedEntity, id: &Value) -> Option<usize> {
    table
        .rows
        .iter()
        .position(|r| r.get(&entity.pk_column).is_some_and(|v| same_key(v, id)))
}

/// Keep known columns, apply literal defaults, enforce not-null.
fn normalize(entity: &ResolvedEntity, mut values: Record) -> Result<Record, AppError> {
    let mut row = Record::new();
    for c in &entity.columns {
        let v = match values.remove(&c.name) {
            Some(v) => v,
            None => c.default_value.clone().unwrap_or(Value::Null),
        };
        if v.is_null() && !c.nullable && !c.is_pk() {
            return Err(AppError::Validation(format!(
                "null value in column \"{}\" violates not-null constraint",
                c.name
            )));
        }
        row.insert(c.name.clone(), v);
    }
    Ok(row)
}

fn insert_row(table: &mut Table, entity: &ResolvedEntity, values: Record) -> Result<Record, AppError> {
    let mut row = normalize(entity, values)?;
    let id = match entity.pk_value(&row).cloned() {
        Some(id) => {
            if position(table, entity, &id).is_some() {
                return Err(AppError::Conflict(format!(
                    "duplicate key value violates unique constraint on {}.{}",
                    entity.table_name, entity.pk_column
                )));
            }
            if let Some(n) = id.as_i64() {
                table.next_id = table.next_id.max(n);
            }
            id
        }
        None => match entity.pk_type {
            PkType::BigInt | PkType::Int => {
                table.next_id += 1;
                Value::from(table.next_id)
            }
            PkType::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
            PkType::Text => {
                return Err(AppError::Validation(format!(
                    "null value in column \"{}\" violates not-null constraint",
                    entity.pk_column
                )))
            }
        },
    };
    row.insert(entity.pk_column.clone(), id);
    table.rows.push(row.clone());
    Ok(row)
}

fn update_row(table: &mut Table, entity: &ResolvedEntity, id: &Value, values: &Record) -> Result<Record, AppError> {
    let idx = position(table, entity, id).ok_or_else(|| AppError::NotFound(format!("{} {}", entity.table_id, id)))?;
    let mut merged = table.rows[idx].clone();
    for (k, v) in values {
        if k != &entity.pk_column && entity.has_column(k) {
            merged.insert(k.clone(), v.clone());
        }
    }
    let merged = normalize(entity, merged)?;
    table.rows[idx] = merged.clone();
    Ok(merged)
}

fn sort_rows(rows: &mut [Record], entity: &ResolvedEntity, query: &ListQuery) {
    let pk = entity.pk_info().map(|c| c.kind);
    let sort = query.sort.as_ref().and_then(|s| entity.column(&s.column).map(|c| (c, s.order)));
    rows.sort_by(|a, b| {
        let by_pk = || match pk {
            Some(kind) => compare_values(
                kind,
                a.get(&entity.pk_column).unwrap_or(&Value::Null),
                b.get(&entity.pk_column).unwrap_or(&Value::Null),
            )
            .unwrap_or(Ordering::Equal),
            None => Ordering::Equal,
        };
        match sort {
            Some((col, order)) => {
                let (va, vb) = (
                    a.get(&col.name).unwrap_or(&Value::Null),
                    b.get(&col.name).unwrap_or(&Value::Null),
                );
                // nulls sort last ascending, first descending, as in PostgreSQL
                let ord = match (va.is_null(), vb.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    _ => compare_values(col.kind, va, vb).unwrap_or(Ordering::Equal),
                };
                let ord = if order == SortOrder::Desc { ord.reverse() } else { ord };
                ord.then_with(by_pk)
            }
            None => by_pk(),
        }
    });
}

fn page(rows: Vec<Record>, offset: u64, limit: Option<u64>) -> Vec<Record> {
    let iter = rows.into_iter().skip(offset as usize);
    match limit {
        Some(n) => iter.take(n as usize).collect(),
        None => iter.collect(),
    }
}

#[async_trait]
impl ModelBackend for MemoryBackend {
    async fn get_list(&self, entity: &ResolvedEntity, query: &ListQuery) -> Result<(u64, Vec<Record>), AppError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Record> = tables
            .get(&entity.table_id)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter(|r| matches_filters(r, &query.filters))
            .filter(|r| query.search.as_ref().map_or(true, |s| matches_search(r, s)))
            .cloned()
            .collect();
        let total = rows.len() as u64;
        sort_rows(&mut rows, entity, query);
        Ok((total, page(rows, query.offset, query.limit)))
    }

    async fn get_one(&self, entity: &ResolvedEntity, id: &Value) -> Result<Option<Record>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&entity.table_id)
            .and_then(|t| position(t, entity, id).map(|i| t.rows[i].clone())))
    }

    async fn get_many(&self, entity: &ResolvedEntity, ids: &[Value]) -> Result<Vec<Record>, AppError> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&entity.table_id) else {
            return Ok(Vec::new());
        };
        Ok(table
            .rows
            .iter()
            .filter(|r| {
                r.get(&entity.pk_column)
                    .is_some_and(|v| ids.iter().any(|id| same_key(v, id)))
            })
            .cloned()
            .collect())
    }

    async fn find_related(
        &self,
        entity: &ResolvedEntity,
        column: &str,
        value: &Value,
    ) -> Result<Vec<Record>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&entity.table_id)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|r| r.get(column).is_some_and(|v| same_key(v, value)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn lookup(
        &self,
        entity: &ResolvedEntity,
        fields: &[String],
        term: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>, AppError> {
        let query = ListQuery {
            search: SearchQuery::new(fields, term),
            offset,
            limit: Some(limit),
            ..ListQuery::default()
        };
        Ok(self.get_list(entity, &query).await?.1)
    }

    async fn persist(&self, plan: &PersistPlan<'_>) -> Result<Record, AppError> {
        let mut tables = self.tables.write().await;
        // Work on a copy so a failing child leaves the store untouched.
        let mut working = tables.clone();
        let parent = {
            let table = working.entry(plan.entity.table_id.clone()).or_default();
            match &plan.op {
                PersistOp::Create(values) => insert_row(table, plan.entity, values.clone())?,
                PersistOp::Update { id, values } => update_row(table, plan.entity, id, values)?,
            }
        };
        for child in &plan.children {
            let key = parent_key(&parent, child)?;
            let table = working.entry(child.entity.table_id.clone()).or_default();
            for change in &child.changes {
                match change {
                    InlineChange::Insert(values) => {
                        let mut values = values.clone();
                        values.insert(child.fk_column.clone(), key.clone());
                        insert_row(table, child.entity, values)?;
                    }
                    InlineChange::Update { id, values } => {
                        update_row(table, child.entity, id, values)?;
                    }
                    InlineChange::Delete(id) => {
                        if let Some(idx) = position(table, child.entity, id) {
                            table.rows.remove(idx);
                        }
                    }
                }
            }
        }
        *tables = working;
        tracing::info!(table = %plan.entity.table_id, children = plan.children.len(), "record persisted");
        Ok(parent)
    }

    async fn delete(&self, entity: &ResolvedEntity, id: &Value) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&entity.table_id) else {
            return Ok(false);
        };
        match position(table, entity, id) {
            Some(idx) => {
                table.rows.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChildChanges, Sort};
    use crate::config::loader::fixtures::blog_config;
    use crate::config::{resolve, ColumnKind, ResolvedModel};
    use crate::filters::{AppliedFilter, FilterOp, FilterValue};
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn model() -> ResolvedModel {
        resolve(&blog_config()).unwrap()
    }

    #[tokio::test]
    async fn generates_keys_and_applies_defaults() {
        let model = model();
        let users = model.entity("users").unwrap();
        let backend = MemoryBackend::new();
        let a = backend
            .persist(&PersistPlan::create(users, record(json!({ "name": "ann" }))))
            .await
            .unwrap();
        let b = backend
            .persist(&PersistPlan::create(users, record(json!({ "name": "bob" }))))
            .await
            .unwrap();
        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(2));
        assert_eq!(a["active"], json!(true));
        assert_eq!(a["email"], Value::Null);
    }

    #[tokio::test]
    async fn not_null_and_duplicate_keys_are_integrity_errors() {
        let model = model();
        let users = model.entity("users").unwrap();
        let backend = MemoryBackend::new();
        let err = backend
            .persist(&PersistPlan::create(users, record(json!({ "email": "x@y" }))))
            .await
            .unwrap_err();
        assert!(err.is_integrity());

        backend.seed(users, vec![record(json!({ "id": 5, "name": "e" }))]).await.unwrap();
        let err = backend
            .persist(&PersistPlan::create(users, record(json!({ "id": 5, "name": "f" }))))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_filters_sorts_and_pages() {
        let model = model();
        let posts = model.entity("posts").unwrap();
        let backend = MemoryBackend::new();
        let rows = (1..=5)
            .map(|i| record(json!({ "title": format!("post {}", i), "views": i * 10 })))
            .collect();
        backend.seed(posts, rows).await.unwrap();

        let query = ListQuery {
            filters: vec![AppliedFilter {
                index: 0,
                column: "views".into(),
                kind: ColumnKind::Integer,
                op: FilterOp::Greater,
                value: FilterValue::Scalar(json!(10)),
                raw: "10".into(),
            }],
            sort: Some(Sort {
                column: "views".into(),
                order: SortOrder::Desc,
            }),
            offset: 1,
            limit: Some(2),
            ..ListQuery::default()
        };
        let (count, rows) = backend.get_list(posts, &query).await.unwrap();
        assert_eq!(count, 4);
        let views: Vec<_> = rows.iter().map(|r| r["views"].clone()).collect();
        assert_eq!(views, vec![json!(40), json!(30)]);
    }

    #[tokio::test]
    async fn failed_child_rolls_back_parent() {
        let model = model();
        let posts = model.entity("posts").unwrap();
        let comments = model.entity("comments").unwrap();
        let backend = MemoryBackend::new();
        let plan = PersistPlan {
            entity: posts,
            op: PersistOp::Create(record(json!({ "title": "t" }))),
            children: vec![ChildChanges {
                entity: comments,
                fk_column: "post_id".into(),
                parent_key_column: "id".into(),
                changes: vec![
                    InlineChange::Insert(record(json!({ "text": "ok" }))),
                    InlineChange::Insert(record(json!({ "text": null }))),
                ],
            }],
        };
        assert!(backend.persist(&plan).await.is_err());
        assert_eq!(backend.count(posts).await, 0);
        assert_eq!(backend.count(comments).await, 0);
    }

    #[tokio::test]
    async fn children_receive_parent_key() {
        let model = model();
        let posts = model.entity("posts").unwrap();
        let comments = model.entity("comments").unwrap();
        let backend = MemoryBackend::new();
        let plan = PersistPlan {
            entity: posts,
            op: PersistOp::Create(record(json!({ "title": "t" }))),
            children: vec![ChildChanges {
                entity: comments,
                fk_column: "post_id".into(),
                parent_key_column: "id".into(),
                changes: vec![InlineChange::Insert(record(json!({ "text": "first" })))],
            }],
        };
        let post = backend.persist(&plan).await.unwrap();
        let related = backend.find_related(comments, "post_id", &post["id"]).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0]["text"], json!("first"));
    }
}
