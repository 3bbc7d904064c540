//! Resolved entity model: config validated and flattened for runtime use.

use crate::error::AppError;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// A record as exchanged with backends: column name -> JSON value.
pub type Record = serde_json::Map<String, Value>;

/// Direction of a relation: to_one (we hold the FK) or to_many (they hold the FK to us).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationDirection {
    ToOne,
    ToMany,
}

#[derive(Clone, Debug)]
pub struct RelationInfo {
    /// Relationship id from config.
    pub id: String,
    pub direction: RelationDirection,
    /// Table id of the entity on the other side.
    pub related_table_id: String,
    /// Our column used in the join (our FK for to_one; our key for to_many).
    pub our_key_column: String,
    /// Their column used in the join (their key for to_one; their FK for to_many).
    pub their_key_column: String,
}

/// Primary key type for parsing ids from query strings and form data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PkType {
    Uuid,
    BigInt,
    Int,
    Text,
}

impl PkType {
    pub fn parse(&self, id_str: &str) -> Result<Value, AppError> {
        Ok(match self {
            PkType::Uuid => {
                let u = uuid::Uuid::parse_str(id_str).map_err(|_| AppError::BadRequest("invalid uuid".into()))?;
                Value::String(u.to_string())
            }
            PkType::BigInt | PkType::Int => {
                let n: i64 = id_str.trim().parse().map_err(|_| AppError::BadRequest("invalid id".into()))?;
                Value::Number(n.into())
            }
            PkType::Text => Value::String(id_str.to_string()),
        })
    }
}

/// Column classification used by form conversion, filters and formatters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Time,
    Uuid,
    Json,
    Enum,
}

impl ColumnKind {
    /// Classify a PostgreSQL type name. Names containing a dot are custom (enum) types.
    pub fn from_pg_type(pg_type: &str) -> ColumnKind {
        let t = pg_type.to_lowercase();
        if t.contains('.') {
            return ColumnKind::Enum;
        }
        match t.as_str() {
            "text" => ColumnKind::Text,
            "uuid" => ColumnKind::Uuid,
            "json" | "jsonb" => ColumnKind::Json,
            "date" => ColumnKind::Date,
            "time" | "timetz" => ColumnKind::Time,
            "bool" | "boolean" => ColumnKind::Boolean,
            _ if t.starts_with("timestamp") => ColumnKind::DateTime,
            "smallint" | "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "smallserial" | "serial"
            | "bigserial" => ColumnKind::Integer,
            _ if t == "numeric" || t == "decimal" || t == "real" || t.starts_with("double") || t.starts_with("float") => {
                ColumnKind::Float
            }
            _ => ColumnKind::String,
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnKind::String | ColumnKind::Text | ColumnKind::Enum)
    }

    pub fn is_sortable(&self) -> bool {
        !matches!(self, ColumnKind::Json)
    }
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub pk_type: Option<PkType>,
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. gen_random_uuid(), NOW()).
    pub has_default: bool,
    /// Literal default from config; expression defaults are left to the database.
    pub default_value: Option<Value>,
    /// PostgreSQL type name for SQL casts (e.g. "timestamptz") when binding string values.
    pub pg_type: String,
    /// Allowed values for enum columns.
    pub enum_values: Vec<String>,
}

impl ColumnInfo {
    pub fn is_pk(&self) -> bool {
        self.pk_type.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub table_id: String,
    pub schema_name: String,
    pub table_name: String,
    pub pk_column: String,
    pub pk_type: PkType,
    pub columns: Vec<ColumnInfo>,
    pub display_column: Option<String>,
    pub relations: Vec<RelationInfo>,
}

impl ResolvedEntity {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn pk_info(&self) -> Option<&ColumnInfo> {
        self.column(&self.pk_column)
    }

    /// Primary key value of a record, if present and not null.
    pub fn pk_value<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        record.get(&self.pk_column).filter(|v| !v.is_null())
    }

    /// Relation through which `column` points at another table.
    pub fn to_one_relation(&self, column: &str) -> Option<&RelationInfo> {
        self.relations
            .iter()
            .find(|r| r.direction == RelationDirection::ToOne && r.our_key_column == column)
    }

    /// Label of a record for selects and lookups: display column, else the primary key.
    pub fn display_value(&self, record: &Record) -> String {
        let key = self.display_column.as_deref().unwrap_or(&self.pk_column);
        match record.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub entity_by_id: HashMap<String, ResolvedEntity>,
}

impl ResolvedModel {
    pub fn entity(&self, table_id: &str) -> Option<&ResolvedEntity> {
        self.entity_by_id.get(table_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_pg_types() {
        assert_eq!(ColumnKind::from_pg_type("varchar"), ColumnKind::String);
        assert_eq!(ColumnKind::from_pg_type("text"), ColumnKind::Text);
        assert_eq!(ColumnKind::from_pg_type("bigint"), ColumnKind::Integer);
        assert_eq!(ColumnKind::from_pg_type("bigserial"), ColumnKind::Integer);
        assert_eq!(ColumnKind::from_pg_type("numeric"), ColumnKind::Float);
        assert_eq!(ColumnKind::from_pg_type("double precision"), ColumnKind::Float);
        assert_eq!(ColumnKind::from_pg_type("timestamptz"), ColumnKind::DateTime);
        assert_eq!(ColumnKind::from_pg_type("date"), ColumnKind::Date);
        assert_eq!(ColumnKind::from_pg_type("boolean"), ColumnKind::Boolean);
        assert_eq!(ColumnKind::from_pg_type("jsonb"), ColumnKind::Json);
        assert_eq!(ColumnKind::from_pg_type("blog.post_status"), ColumnKind::Enum);
    }

    #[test]
    fn parses_ids_by_pk_type() {
        assert_eq!(PkType::Int.parse("42").unwrap(), Value::from(42));
        assert!(PkType::Int.parse("x").is_err());
        assert!(PkType::Uuid.parse("nope").is_err());
        assert_eq!(PkType::Text.parse("abc").unwrap(), Value::from("abc"));
    }
}
