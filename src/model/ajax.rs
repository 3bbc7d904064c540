//! Foreign-key select options resolved through paginated lookups.

use crate::backend::ModelBackend;
use crate::config::{AjaxRefConfig, Record, ResolvedEntity};
use crate::error::{AppError, ConfigError};
use crate::form::raw_of;
use serde_json::Value;

pub const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Clone, Debug)]
pub struct AjaxModelLoader {
    /// Form field the loader serves.
    pub name: String,
    pub entity: ResolvedEntity,
    pub fields: Vec<String>,
    pub page_size: u64,
    pub placeholder: Option<String>,
}

impl AjaxModelLoader {
    pub fn new(name: &str, entity: &ResolvedEntity, cfg: &AjaxRefConfig) -> Result<Self, ConfigError> {
        if cfg.fields.is_empty() {
            return Err(ConfigError::Validation(format!("ajax loader {}: no search fields", name)));
        }
        if let Some(missing) = cfg.fields.iter().find(|f| !entity.has_column(f)) {
            return Err(ConfigError::Validation(format!(
                "ajax loader {}: {} has no column {}",
                name, entity.table_id, missing
            )));
        }
        Ok(AjaxModelLoader {
            name: name.to_string(),
            entity: entity.clone(),
            fields: cfg.fields.clone(),
            page_size: if cfg.page_size == 0 { DEFAULT_PAGE_SIZE } else { u64::from(cfg.page_size) },
            placeholder: cfg.placeholder.clone(),
        })
    }

    /// `(pk, label)` for one record.
    pub fn format(&self, record: &Record) -> (Value, String) {
        let pk = self.entity.pk_value(record).cloned().unwrap_or(Value::Null);
        (pk, self.entity.display_value(record))
    }

    /// The selected record's option, as `(raw pk, label)`.
    pub async fn get_one(&self, backend: &dyn ModelBackend, pk: &Value) -> Result<Option<(String, String)>, AppError> {
        let record = backend.get_one(&self.entity, pk).await?;
        Ok(record.map(|r| {
            let (pk, label) = self.format(&r);
            (raw_of(&pk), label)
        }))
    }

    pub async fn get_list(
        &self,
        backend: &dyn ModelBackend,
        term: &str,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<(Value, String)>, AppError> {
        // A lookup never returns more than one page.
        let limit = limit.filter(|l| *l > 0).map_or(self.page_size, |l| l.min(self.page_size));
        let rows = backend.lookup(&self.entity, &self.fields, term, offset, limit).await?;
        Ok(rows.iter().map(|r| self.format(r)).collect())
    }
}
