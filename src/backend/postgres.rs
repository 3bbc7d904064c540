//! PostgreSQL backend over sqlx.

use super::{parent_key, InlineChange, ListQuery, ModelBackend, PersistOp, PersistPlan};
use crate::config::{Record, ResolvedEntity};
use crate::error::AppError;
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgConnection, PgPool, Postgres};

#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        PgBackend { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bound(q: &QueryBuf) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

async fn query_many(pool: &PgPool, q: &QueryBuf) -> Result<Vec<Record>, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let rows = bound(q).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_record).collect())
}

async fn query_one_tx(tx: &mut PgConnection, q: &QueryBuf) -> Result<Option<Record>, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
    let row = bound(q).fetch_optional(&mut *tx).await?;
    Ok(row.map(|r| row_to_record(&r)))
}

async fn execute_tx(tx: &mut PgConnection, q: &QueryBuf) -> Result<u64, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute (tx)");
    let done = bound(q).execute(&mut *tx).await?;
    Ok(done.rows_affected())
}

#[async_trait]
impl ModelBackend for PgBackend {
    async fn get_list(&self, entity: &ResolvedEntity, query: &ListQuery) -> Result<(u64, Vec<Record>), AppError> {
        let count_q = sql::count(entity, query);
        tracing::debug!(sql = %count_q.sql, params = ?count_q.params, "count");
        let mut count = sqlx::query_scalar::<_, i64>(&count_q.sql);
        for p in &count_q.params {
            count = count.bind(PgBindValue::from_json(p));
        }
        let total = count.fetch_one(&self.pool).await?;
        let rows = query_many(&self.pool, &sql::select_page(entity, query)).await?;
        Ok((total.max(0) as u64, rows))
    }

    async fn get_one(&self, entity: &ResolvedEntity, id: &Value) -> Result<Option<Record>, AppError> {
        let rows = query_many(&self.pool, &sql::select_by_id(entity, id)).await?;
        Ok(rows.into_iter().next())
    }

    async fn get_many(&self, entity: &ResolvedEntity, ids: &[Value]) -> Result<Vec<Record>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        query_many(&self.pool, &sql::select_by_ids(entity, ids)).await
    }

    async fn find_related(
        &self,
        entity: &ResolvedEntity,
        column: &str,
        value: &Value,
    ) -> Result<Vec<Record>, AppError> {
        query_many(&self.pool, &sql::select_by_column(entity, column, value)).await
    }

    async fn lookup(
        &self,
        entity: &ResolvedEntity,
        fields: &[String],
        term: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>, AppError> {
        query_many(&self.pool, &sql::lookup(entity, fields, term, offset, limit)).await
    }

    async fn persist(&self, plan: &PersistPlan<'_>) -> Result<Record, AppError> {
        let mut tx = self.pool.begin().await?;
        let parent = match &plan.op {
            PersistOp::Create(values) => query_one_tx(&mut tx, &sql::insert(plan.entity, values))
                .await?
                .ok_or(AppError::Db(sqlx::Error::RowNotFound))?,
            PersistOp::Update { id, values } => query_one_tx(&mut tx, &sql::update(plan.entity, id, values))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("{} {}", plan.entity.table_id, id)))?,
        };
        for child in &plan.children {
            let key = parent_key(&parent, child)?;
            for change in &child.changes {
                match change {
                    InlineChange::Insert(values) => {
                        let mut values = values.clone();
                        values.insert(child.fk_column.clone(), key.clone());
                        execute_tx(&mut tx, &sql::insert(child.entity, &values)).await?;
                    }
                    InlineChange::Update { id, values } => {
                        execute_tx(&mut tx, &sql::update(child.entity, id, values)).await?;
                    }
                    InlineChange::Delete(id) => {
                        execute_tx(&mut tx, &sql::delete(child.entity, id)).await?;
                    }
                }
            }
        }
        tx.commit().await?;
        tracing::info!(table = %plan.entity.table_id, children = plan.children.len(), "record persisted");
        Ok(parent)
    }

    async fn delete(&self, entity: &ResolvedEntity, id: &Value) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        let affected = execute_tx(&mut tx, &sql::delete(entity, id)).await?;
        tx.commit().await?;
        Ok(affected > 0)
    }
}

fn row_to_record(row: &PgRow) -> Record {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Record::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(t)) = row.try_get::<Option<chrono::NaiveTime>, _>(name) {
        return Value::String(t.format("%H:%M:%S").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}
