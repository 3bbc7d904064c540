//! Model persistence seam. Views talk to a `ModelBackend`; PostgreSQL and in-memory
//! implementations are provided.

mod memory;
mod postgres;

pub use memory::MemoryBackend;
pub use postgres::PgBackend;

use crate::config::{Record, ResolvedEntity};
use crate::error::AppError;
use crate::filters::{AppliedFilter, SearchQuery};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    pub column: String,
    pub order: SortOrder,
}

/// One list page request. `limit: None` fetches every matching row.
#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    pub filters: Vec<AppliedFilter>,
    pub search: Option<SearchQuery>,
    pub sort: Option<Sort>,
    pub offset: u64,
    pub limit: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PersistOp {
    Create(Record),
    Update { id: Value, values: Record },
}

/// A change to one inline child row.
#[derive(Clone, Debug, PartialEq)]
pub enum InlineChange {
    Insert(Record),
    Update { id: Value, values: Record },
    Delete(Value),
}

/// Changes to the child rows of one inline model.
#[derive(Clone, Debug)]
pub struct ChildChanges<'a> {
    pub entity: &'a ResolvedEntity,
    /// Child column holding the parent key.
    pub fk_column: String,
    /// Parent column the foreign key references (usually its primary key).
    pub parent_key_column: String,
    pub changes: Vec<InlineChange>,
}

/// Parent write plus inline child changes, applied atomically.
#[derive(Clone, Debug)]
pub struct PersistPlan<'a> {
    pub entity: &'a ResolvedEntity,
    pub op: PersistOp,
    pub children: Vec<ChildChanges<'a>>,
}

impl<'a> PersistPlan<'a> {
    pub fn create(entity: &'a ResolvedEntity, values: Record) -> Self {
        PersistPlan {
            entity,
            op: PersistOp::Create(values),
            children: Vec::new(),
        }
    }

    pub fn update(entity: &'a ResolvedEntity, id: Value, values: Record) -> Self {
        PersistPlan {
            entity,
            op: PersistOp::Update { id, values },
            children: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Total matching count (ignoring offset/limit) and the requested page.
    async fn get_list(&self, entity: &ResolvedEntity, query: &ListQuery) -> Result<(u64, Vec<Record>), AppError>;

    async fn get_one(&self, entity: &ResolvedEntity, id: &Value) -> Result<Option<Record>, AppError>;

    /// Records whose primary key is in `ids`; unknown ids are skipped.
    async fn get_many(&self, entity: &ResolvedEntity, ids: &[Value]) -> Result<Vec<Record>, AppError>;

    /// Records where `column` equals `value`, ordered by primary key.
    async fn find_related(&self, entity: &ResolvedEntity, column: &str, value: &Value)
        -> Result<Vec<Record>, AppError>;

    /// Case-insensitive search over `fields` for ajax lookups.
    async fn lookup(
        &self,
        entity: &ResolvedEntity,
        fields: &[String],
        term: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>, AppError>;

    /// Apply the parent write then every child change in one transaction; returns the saved parent.
    async fn persist(&self, plan: &PersistPlan<'_>) -> Result<Record, AppError>;

    /// `false` when no row had that key.
    async fn delete(&self, entity: &ResolvedEntity, id: &Value) -> Result<bool, AppError>;
}

/// Parent value the children's foreign key must carry.
pub(crate) fn parent_key(parent: &Record, child: &ChildChanges<'_>) -> Result<Value, AppError> {
    parent
        .get(&child.parent_key_column)
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| AppError::Validation(format!("parent record has no {}", child.parent_key_column)))
}
