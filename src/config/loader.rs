//! Load config documents from a directory and resolve them into the runtime model.

use crate::config::resolved::{
    ColumnInfo, ColumnKind, PkType, RelationDirection, RelationInfo, ResolvedEntity, ResolvedModel,
};
use crate::config::types::*;
use crate::config::{default_schema_id, validate};
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

/// Build resolved model from full config (validates first).
pub fn resolve(config: &AdminConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;
    let default_sid = default_schema_id(config)?;

    let schemas_by_id: HashMap<_, _> = config.schemas.iter().map(|s| (s.id.as_str(), s)).collect();
    let columns_by_table: HashMap<_, Vec<&ColumnConfig>> = config
        .columns
        .iter()
        .fold(HashMap::new(), |mut m, c| {
            m.entry(c.table_id.as_str()).or_default().push(c);
            m
        });
    let column_id_to_name: HashMap<&str, &str> = config.columns.iter().map(|c| (c.id.as_str(), c.name.as_str())).collect();

    let mut entities = Vec::new();
    let mut entity_by_id = HashMap::new();

    for table in &config.tables {
        let table_sid = table.schema_id.as_deref().unwrap_or(default_sid);
        let schema = schemas_by_id
            .get(table_sid)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "schema",
                id: table_sid.to_string(),
            })?;
        let table_columns = columns_by_table
            .get(table.id.as_str())
            .map(|v| v.as_slice())
            .unwrap_or(&[]);

        let pk_names = match &table.primary_key {
            PrimaryKeyConfig::Single(s) => vec![s.clone()],
            PrimaryKeyConfig::Composite(v) => v.clone(),
        };
        if pk_names.len() > 1 {
            tracing::warn!(table = %table.id, "composite primary key; only {} is used for record ids", pk_names[0]);
        }
        let pk_col = table_columns
            .iter()
            .find(|c| c.name == pk_names[0])
            .ok_or_else(|| ConfigError::InvalidPrimaryKey {
                table_id: table.id.clone(),
                column: pk_names[0].clone(),
            })?;
        let pk_type = infer_pk_type(pk_col);

        let columns: Vec<ColumnInfo> = table_columns
            .iter()
            .map(|c| {
                let (pg_type, enum_values) = column_pg_type(&c.type_, config, &schemas_by_id, default_sid);
                let kind = if enum_values.is_empty() {
                    ColumnKind::from_pg_type(&pg_type)
                } else {
                    ColumnKind::Enum
                };
                ColumnInfo {
                    name: c.name.clone(),
                    kind,
                    pk_type: if c.name == pk_names[0] { Some(pk_type.clone()) } else { None },
                    nullable: c.nullable,
                    has_default: c.default.is_some() || is_serial(&pg_type),
                    default_value: c.default.clone().filter(|v| !v.is_object()),
                    pg_type: cast_type(pg_type),
                    enum_values,
                }
            })
            .collect();

        if let Some(display) = &table.display_column {
            if !columns.iter().any(|c| &c.name == display) {
                return Err(ConfigError::MissingReference {
                    kind: "display column",
                    id: format!("{}.{}", table.id, display),
                });
            }
        }
        let display_column = table.display_column.clone().or_else(|| {
            columns
                .iter()
                .find(|c| !c.is_pk() && c.kind.is_textual())
                .map(|c| c.name.clone())
        });

        let entity = ResolvedEntity {
            table_id: table.id.clone(),
            schema_name: schema.name.clone(),
            table_name: table.name.clone(),
            pk_column: pk_names[0].clone(),
            pk_type,
            columns,
            display_column,
            relations: build_relations_for_table(&table.id, &config.relationships, &column_id_to_name),
        };
        entity_by_id.insert(table.id.clone(), entity.clone());
        entities.push(entity);
    }

    Ok(ResolvedModel {
        entities,
        entity_by_id,
    })
}

fn build_relations_for_table(
    our_table_id: &str,
    relationships: &[RelationshipConfig],
    column_id_to_name: &HashMap<&str, &str>,
) -> Vec<RelationInfo> {
    let mut relations = Vec::new();
    for rel in relationships {
        let (Some(from_col), Some(to_col)) = (
            column_id_to_name.get(rel.from_column_id.as_str()),
            column_id_to_name.get(rel.to_column_id.as_str()),
        ) else {
            continue;
        };
        if rel.from_table_id == our_table_id {
            relations.push(RelationInfo {
                id: rel.id.clone(),
                direction: RelationDirection::ToOne,
                related_table_id: rel.to_table_id.clone(),
                our_key_column: from_col.to_string(),
                their_key_column: to_col.to_string(),
            });
        }
        if rel.to_table_id == our_table_id {
            relations.push(RelationInfo {
                id: rel.id.clone(),
                direction: RelationDirection::ToMany,
                related_table_id: rel.from_table_id.clone(),
                our_key_column: to_col.to_string(),
                their_key_column: from_col.to_string(),
            });
        }
    }
    relations
}

/// Type name used in SQL casts, plus enum values when the type names a configured enum
/// (either `schema.enum_name` or the bare enum name / id).
fn column_pg_type(
    ty: &ColumnTypeConfig,
    config: &AdminConfig,
    schemas_by_id: &HashMap<&str, &SchemaConfig>,
    default_sid: &str,
) -> (String, Vec<String>) {
    let name = ty.name();
    let enum_match = config.enums.iter().find(|e| {
        let sid = e.schema_id.as_deref().unwrap_or(default_sid);
        let qualified = schemas_by_id
            .get(sid)
            .map(|s| format!("{}.{}", s.name, e.name))
            .unwrap_or_default();
        name == qualified || name == e.name || name == e.id
    });
    if let Some(e) = enum_match {
        let sid = e.schema_id.as_deref().unwrap_or(default_sid);
        let schema = schemas_by_id.get(sid).map(|s| s.name.as_str()).unwrap_or("public");
        return (format!("{}.{}", schema, e.name), e.values.clone());
    }
    let lower = name.to_lowercase();
    let normalized = if lower == "timestamp with time zone" {
        "timestamptz".to_string()
    } else if lower.starts_with("timestamp ") {
        "timestamp".to_string()
    } else {
        lower
    };
    (normalized, Vec::new())
}

fn is_serial(pg_type: &str) -> bool {
    pg_type.ends_with("serial")
}

/// Serial pseudo-types are not valid in casts; use the underlying integer type.
fn cast_type(pg_type: String) -> String {
    match pg_type.as_str() {
        "smallserial" | "serial2" => "smallint".into(),
        "serial" | "serial4" => "integer".into(),
        "bigserial" | "serial8" => "bigint".into(),
        _ => pg_type,
    }
}

fn infer_pk_type(col: &ColumnConfig) -> PkType {
    let type_lower = col.type_.name().to_lowercase();
    if type_lower.contains("uuid") {
        PkType::Uuid
    } else if type_lower.contains("bigserial") || type_lower.contains("bigint") {
        PkType::BigInt
    } else if type_lower.contains("serial") || type_lower.contains("int") {
        PkType::Int
    } else {
        PkType::Text
    }
}

/// Load config documents from a directory: `schemas.json`, `enums.json`, `tables.json`,
/// `columns.json`, `relationships.json`, `model_views.json`, `file_admins.json`.
/// Missing files count as empty lists; a missing schema list falls back to `public`.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<AdminConfig, ConfigError> {
    let dir = dir.as_ref();
    let mut schemas: Vec<SchemaConfig> = load_config_file(dir, "schemas.json").await?;
    if schemas.is_empty() {
        schemas = vec![SchemaConfig {
            id: "default".into(),
            name: "public".into(),
            comment: None,
        }];
    }
    Ok(AdminConfig {
        schemas,
        enums: load_config_file(dir, "enums.json").await?,
        tables: load_config_file(dir, "tables.json").await?,
        columns: load_config_file(dir, "columns.json").await?,
        relationships: load_config_file(dir, "relationships.json").await?,
        model_views: load_config_file(dir, "model_views.json").await?,
        file_admins: load_config_file(dir, "file_admins.json").await?,
    })
}

impl AdminConfig {
    pub async fn from_dir(dir: impl AsRef<Path>) -> Result<AdminConfig, ConfigError> {
        load_from_dir(dir).await
    }
}

async fn load_config_file<T>(dir: &Path, file: &str) -> Result<Vec<T>, ConfigError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let path = dir.join(file);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "config file missing, using empty list");
            return Ok(Vec::new());
        }
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };
    serde_json::from_str(&text).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use serde_json::json;

    /// Blog schema: users, posts (FK user_id -> users.id), tags, comments (FK post_id -> posts.id).
    pub fn blog_config() -> AdminConfig {
        AdminConfig {
            schemas: serde_json::from_value(json!([{ "id": "blog", "name": "blog" }])).unwrap(),
            enums: serde_json::from_value(json!([
                { "id": "post_status", "name": "post_status", "values": ["draft", "published"] }
            ]))
            .unwrap(),
            tables: serde_json::from_value(json!([
                { "id": "users", "name": "users", "primary_key": "id", "display_column": "name" },
                { "id": "posts", "name": "posts", "primary_key": "id", "display_column": "title" },
                { "id": "comments", "name": "comments", "primary_key": "id" }
            ]))
            .unwrap(),
            columns: serde_json::from_value(json!([
                { "id": "users.id", "table_id": "users", "name": "id", "type": "bigserial", "nullable": false },
                { "id": "users.name", "table_id": "users", "name": "name", "type": "varchar", "nullable": false },
                { "id": "users.email", "table_id": "users", "name": "email", "type": "varchar" },
                { "id": "users.active", "table_id": "users", "name": "active", "type": "boolean", "nullable": false, "default": true },
                { "id": "posts.id", "table_id": "posts", "name": "id", "type": "bigserial", "nullable": false },
                { "id": "posts.title", "table_id": "posts", "name": "title", "type": "varchar", "nullable": false },
                { "id": "posts.body", "table_id": "posts", "name": "body", "type": "text" },
                { "id": "posts.status", "table_id": "posts", "name": "status", "type": "blog.post_status" },
                { "id": "posts.views", "table_id": "posts", "name": "views", "type": "integer" },
                { "id": "posts.user_id", "table_id": "posts", "name": "user_id", "type": "bigint" },
                { "id": "comments.id", "table_id": "comments", "name": "id", "type": "bigserial", "nullable": false },
                { "id": "comments.text", "table_id": "comments", "name": "text", "type": "text", "nullable": false },
                { "id": "comments.post_id", "table_id": "comments", "name": "post_id", "type": "bigint", "nullable": false }
            ]))
            .unwrap(),
            relationships: serde_json::from_value(json!([
                { "id": "posts_user", "from_table_id": "posts", "from_column_id": "posts.user_id",
                  "to_table_id": "users", "to_column_id": "users.id" },
                { "id": "comments_post", "from_table_id": "comments", "from_column_id": "comments.post_id",
                  "to_table_id": "posts", "to_column_id": "posts.id" }
            ]))
            .unwrap(),
            model_views: Vec::new(),
            file_admins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::blog_config;
    use super::*;

    #[test]
    fn resolves_entities_and_relations() {
        let model = resolve(&blog_config()).unwrap();
        let posts = model.entity("posts").unwrap();
        assert_eq!(posts.schema_name, "blog");
        assert_eq!(posts.pk_type, PkType::BigInt);
        assert!(posts.pk_info().unwrap().has_default);
        assert_eq!(posts.pk_info().unwrap().pg_type, "bigint");
        let status = posts.column("status").unwrap();
        assert_eq!(status.kind, ColumnKind::Enum);
        assert_eq!(status.enum_values, vec!["draft", "published"]);

        let to_user = posts.to_one_relation("user_id").unwrap();
        assert_eq!(to_user.related_table_id, "users");
        assert_eq!(to_user.their_key_column, "id");

        let users = model.entity("users").unwrap();
        let to_posts = users
            .relations
            .iter()
            .find(|r| r.direction == RelationDirection::ToMany)
            .unwrap();
        assert_eq!(to_posts.related_table_id, "posts");
        assert_eq!(to_posts.their_key_column, "user_id");
    }

    #[test]
    fn display_column_defaults_to_first_text_column() {
        let model = resolve(&blog_config()).unwrap();
        assert_eq!(model.entity("comments").unwrap().display_column.as_deref(), Some("text"));
        assert_eq!(model.entity("users").unwrap().display_column.as_deref(), Some("name"));
    }

    #[tokio::test]
    async fn missing_files_load_as_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::write(
            dir.path().join("tables.json"),
            r#"[{ "id": "t", "name": "t", "primary_key": "id" }]"#,
        )
        .await
        .unwrap();
        let config = load_from_dir(dir.path()).await.unwrap();
        assert_eq!(config.schemas[0].name, "public");
        assert_eq!(config.tables.len(), 1);
        assert!(config.model_views.is_empty());
    }
}
