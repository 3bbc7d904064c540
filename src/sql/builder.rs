//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from a resolved entity.

use crate::backend::{ListQuery, SortOrder};
use crate::config::{ColumnInfo, Record, ResolvedEntity};
use crate::filters::{AppliedFilter, FilterOp, FilterValue, LikeTerm, SearchQuery};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(entity: &ResolvedEntity) -> String {
    format!("{}.{}", quoted(&entity.schema_name), quoted(&entity.table_name))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a value and return its placeholder cast to the column type.
    fn typed_param(&mut self, column: Option<&ColumnInfo>, v: Value) -> String {
        let n = self.push_param(v);
        match column {
            Some(c) if !c.pg_type.is_empty() => format!("${}::{}", n, c.pg_type),
            _ => format!("${}", n),
        }
    }
}

/// SELECT list: each column as-is, except custom enum (schema.typename) and numeric as col::text
/// so rows decode to strings.
fn select_column_list(entity: &ResolvedEntity) -> String {
    entity
        .columns
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            if c.pg_type.contains('.') || c.pg_type == "numeric" {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn filter_predicate(entity: &ResolvedEntity, f: &AppliedFilter, q: &mut QueryBuf) -> Option<String> {
    let column = entity.column(&f.column)?;
    let col = quoted(&column.name);
    let sql = match (&f.op, &f.value) {
        (FilterOp::Empty, FilterValue::IsEmpty(true)) => format!("{} IS NULL", col),
        (FilterOp::Empty, FilterValue::IsEmpty(false)) => format!("{} IS NOT NULL", col),
        (FilterOp::Like | FilterOp::NotLike, FilterValue::Scalar(v)) => {
            let term = LikeTerm::parse(v.as_str().unwrap_or_default());
            let n = q.push_param(Value::String(term.sql_pattern()));
            let not = if f.op == FilterOp::NotLike { "NOT " } else { "" };
            format!("{}::text {}ILIKE ${}", col, not, n)
        }
        (FilterOp::Equal | FilterOp::NotEqual | FilterOp::Greater | FilterOp::Smaller, FilterValue::Scalar(v)) => {
            let cmp = match f.op {
                FilterOp::Equal => "=",
                FilterOp::NotEqual => "<>",
                FilterOp::Greater => ">",
                _ => "<",
            };
            let ph = q.typed_param(Some(column), v.clone());
            format!("{} {} {}", col, cmp, ph)
        }
        (FilterOp::Between | FilterOp::NotBetween, FilterValue::Range(lo, hi)) => {
            let lo = q.typed_param(Some(column), lo.clone());
            let hi = q.typed_param(Some(column), hi.clone());
            let between = format!("{} BETWEEN {} AND {}", col, lo, hi);
            if f.op == FilterOp::NotBetween {
                format!("NOT ({})", between)
            } else {
                between
            }
        }
        (FilterOp::InList | FilterOp::NotInList, FilterValue::List(values)) => {
            let phs: Vec<String> = values.iter().map(|v| q.typed_param(Some(column), v.clone())).collect();
            let not = if f.op == FilterOp::NotInList { "NOT " } else { "" };
            format!("{} {}IN ({})", col, not, phs.join(", "))
        }
        _ => return None,
    };
    Some(sql)
}

fn search_predicate(entity: &ResolvedEntity, search: &SearchQuery, q: &mut QueryBuf) -> Option<String> {
    let columns: Vec<String> = search
        .columns
        .iter()
        .filter(|c| entity.has_column(c))
        .map(|c| quoted(c))
        .collect();
    if columns.is_empty() {
        return None;
    }
    let mut term_parts = Vec::new();
    for term in &search.terms {
        let n = q.push_param(Value::String(term.sql_pattern()));
        let ors: Vec<String> = columns.iter().map(|c| format!("{}::text ILIKE ${}", c, n)).collect();
        term_parts.push(format!("({})", ors.join(" OR ")));
    }
    Some(term_parts.join(" AND "))
}

fn where_clause(entity: &ResolvedEntity, query: &ListQuery, q: &mut QueryBuf) -> String {
    let mut parts: Vec<String> = query
        .filters
        .iter()
        .filter_map(|f| filter_predicate(entity, f, q))
        .collect();
    if let Some(search) = &query.search {
        if let Some(p) = search_predicate(entity, search, q) {
            parts.push(p);
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT one page: filters, search, ORDER BY sort column (pk as tie-breaker), LIMIT/OFFSET.
pub fn select_page(entity: &ResolvedEntity, query: &ListQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(entity, query, &mut q);
    let pk = quoted(&entity.pk_column);
    let order = match &query.sort {
        Some(sort) if entity.has_column(&sort.column) => {
            let dir = if sort.order == SortOrder::Desc { "DESC" } else { "ASC" };
            if sort.column == entity.pk_column {
                format!(" ORDER BY {} {}", pk, dir)
            } else {
                format!(" ORDER BY {} {}, {}", quoted(&sort.column), dir, pk)
            }
        }
        _ => format!(" ORDER BY {}", pk),
    };
    let limit = query.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset = if query.offset > 0 {
        format!(" OFFSET {}", query.offset)
    } else {
        String::new()
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        select_column_list(entity),
        qualified_table(entity),
        where_sql,
        order,
        limit,
        offset
    );
    q
}

/// COUNT(*) with the same filters and search as `select_page`.
pub fn count(entity: &ResolvedEntity, query: &ListQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(entity, query, &mut q);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(entity), where_sql);
    q
}

/// SELECT by primary key.
pub fn select_by_id(entity: &ResolvedEntity, id: &Value) -> QueryBuf {
    select_by_column(entity, &entity.pk_column, id)
}

/// SELECT rows where column = value, ordered by pk.
pub fn select_by_column(entity: &ResolvedEntity, column: &str, value: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.typed_param(entity.column(column), value.clone());
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {} ORDER BY {}",
        select_column_list(entity),
        qualified_table(entity),
        quoted(column),
        ph,
        quoted(&entity.pk_column)
    );
    q
}

/// SELECT rows whose pk is in `ids`. Caller skips the query when `ids` is empty.
pub fn select_by_ids(entity: &ResolvedEntity, ids: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk_col = entity.pk_info();
    let phs: Vec<String> = ids.iter().map(|v| q.typed_param(pk_col, v.clone())).collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {}",
        select_column_list(entity),
        qualified_table(entity),
        quoted(&entity.pk_column),
        phs.join(", "),
        quoted(&entity.pk_column)
    );
    q
}

/// Case-insensitive contains search over `fields` for ajax lookups.
pub fn lookup(entity: &ResolvedEntity, fields: &[String], term: &str, offset: u64, limit: u64) -> QueryBuf {
    let query = ListQuery {
        search: SearchQuery::new(fields, term),
        offset,
        limit: Some(limit),
        ..ListQuery::default()
    };
    select_page(entity, &query)
}

/// INSERT ... RETURNING. Keys not naming a column are ignored.
pub fn insert(entity: &ResolvedEntity, values: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut phs = Vec::new();
    for c in &entity.columns {
        if let Some(v) = values.get(&c.name) {
            cols.push(quoted(&c.name));
            phs.push(q.typed_param(Some(c), v.clone()));
        }
    }
    let table = qualified_table(entity);
    let returning = select_column_list(entity);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            phs.join(", "),
            returning
        )
    };
    q
}

/// UPDATE ... WHERE pk RETURNING. The primary key itself is never updated.
pub fn update(entity: &ResolvedEntity, id: &Value, values: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in &entity.columns {
        if c.name == entity.pk_column {
            continue;
        }
        if let Some(v) = values.get(&c.name) {
            let ph = q.typed_param(Some(c), v.clone());
            sets.push(format!("{} = {}", quoted(&c.name), ph));
        }
    }
    let pk = quoted(&entity.pk_column);
    if sets.is_empty() {
        sets.push(format!("{} = {}", pk, pk));
    }
    let id_ph = q.typed_param(entity.pk_info(), id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        sets.join(", "),
        pk,
        id_ph,
        select_column_list(entity)
    );
    q
}

/// DELETE by primary key.
pub fn delete(entity: &ResolvedEntity, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.typed_param(entity.pk_info(), id.clone());
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        qualified_table(entity),
        quoted(&entity.pk_column),
        ph
    );
    q
}
