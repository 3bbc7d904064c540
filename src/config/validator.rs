//! Config validation: referential integrity and view consistency.

use crate::config::{AdminConfig, PrimaryKeyConfig};
use crate::error::ConfigError;
use crate::naming::endpoint_for;
use std::collections::HashSet;

/// Default schema id when configs omit schema_id.
pub fn default_schema_id(config: &AdminConfig) -> Result<&str, ConfigError> {
    config
        .schemas
        .first()
        .map(|s| s.id.as_str())
        .ok_or_else(|| ConfigError::Validation("at least one schema required".into()))
}

pub fn validate(config: &AdminConfig) -> Result<(), ConfigError> {
    let default_sid = default_schema_id(config)?;
    let schema_ids: HashSet<&str> = config.schemas.iter().map(|s| s.id.as_str()).collect();
    let table_ids: HashSet<&str> = config.tables.iter().map(|t| t.id.as_str()).collect();
    let column_ids: HashSet<&str> = config.columns.iter().map(|c| c.id.as_str()).collect();

    for e in &config.enums {
        let sid = e.schema_id.as_deref().unwrap_or(default_sid);
        if !schema_ids.contains(sid) {
            return Err(ConfigError::MissingReference {
                kind: "schema",
                id: sid.to_string(),
            });
        }
    }

    for t in &config.tables {
        let sid = t.schema_id.as_deref().unwrap_or(default_sid);
        if !schema_ids.contains(sid) {
            return Err(ConfigError::MissingReference {
                kind: "schema",
                id: sid.to_string(),
            });
        }
        let pk_cols = match &t.primary_key {
            PrimaryKeyConfig::Single(s) => vec![s.as_str()],
            PrimaryKeyConfig::Composite(v) => v.iter().map(String::as_str).collect::<Vec<_>>(),
        };
        let table_columns: HashSet<&str> = config
            .columns
            .iter()
            .filter(|c| c.table_id == t.id)
            .map(|c| c.name.as_str())
            .collect();
        if pk_cols.is_empty() {
            return Err(ConfigError::InvalidPrimaryKey {
                table_id: t.id.clone(),
                column: String::new(),
            });
        }
        for pk in &pk_cols {
            if !table_columns.contains(pk) {
                return Err(ConfigError::InvalidPrimaryKey {
                    table_id: t.id.clone(),
                    column: (*pk).to_string(),
                });
            }
        }
    }

    for c in &config.columns {
        if !table_ids.contains(c.table_id.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "table",
                id: c.table_id.clone(),
            });
        }
    }

    for r in &config.relationships {
        if !table_ids.contains(r.from_table_id.as_str())
            || !table_ids.contains(r.to_table_id.as_str())
            || !column_ids.contains(r.from_column_id.as_str())
            || !column_ids.contains(r.to_column_id.as_str())
        {
            return Err(ConfigError::MissingReference {
                kind: "relationship",
                id: r.id.clone(),
            });
        }
    }

    let mut endpoints = HashSet::new();
    for view in &config.model_views {
        if !table_ids.contains(view.entity_id.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "table",
                id: view.entity_id.clone(),
            });
        }
        for inline in &view.inline_models {
            if !table_ids.contains(inline.entity_id.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "inline table",
                    id: inline.entity_id.clone(),
                });
            }
        }
        let table_name = config
            .tables
            .iter()
            .find(|t| t.id == view.entity_id)
            .map_or(view.entity_id.as_str(), |t| t.name.as_str());
        let endpoint = view.endpoint.clone().unwrap_or_else(|| table_name.to_string());
        if !endpoints.insert(endpoint.clone()) {
            return Err(ConfigError::DuplicateEndpoint(endpoint));
        }
    }
    for files in &config.file_admins {
        let endpoint = files.endpoint.clone().unwrap_or_else(|| endpoint_for(&files.name));
        if !endpoints.insert(endpoint.clone()) {
            return Err(ConfigError::DuplicateEndpoint(endpoint));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::fixtures::blog_config;
    use crate::config::ModelViewConfig;

    #[test]
    fn blog_fixture_is_valid() {
        validate(&blog_config()).unwrap();
    }

    #[test]
    fn rejects_dangling_relationship() {
        let mut config = blog_config();
        config.relationships[0].to_column_id = "users.missing".into();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingReference { kind: "relationship", .. })
        ));
    }

    #[test]
    fn rejects_duplicate_endpoints() {
        let mut config = blog_config();
        config.model_views.push(ModelViewConfig::for_entity("posts"));
        config.model_views.push(ModelViewConfig::for_entity("posts"));
        assert!(matches!(validate(&config), Err(ConfigError::DuplicateEndpoint(e)) if e == "posts"));
    }

    #[test]
    fn named_views_default_to_the_table_endpoint() {
        let mut config = blog_config();
        config.model_views.clear();
        for name in ["Drafts", "Published"] {
            let mut view = ModelViewConfig::for_entity("posts");
            view.name = Some(name.into());
            config.model_views.push(view);
        }
        assert!(matches!(validate(&config), Err(ConfigError::DuplicateEndpoint(e)) if e == "posts"));

        config.model_views[1].endpoint = Some("published".into());
        validate(&config).unwrap();
    }
}
