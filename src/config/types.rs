//! Raw config types matching the JSON documents: schema description plus admin view options.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnumConfig {
    pub id: String,
    #[serde(default)]
    pub schema_id: Option<String>,
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKeyConfig {
    Single(String),
    Composite(Vec<String>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub id: String,
    #[serde(default)]
    pub schema_id: Option<String>,
    pub name: String,
    pub primary_key: PrimaryKeyConfig,
    /// Column used as the record's display string in selects and lookups.
    #[serde(default)]
    pub display_column: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Option<Vec<u32>> },
}

impl ColumnTypeConfig {
    pub fn name(&self) -> &str {
        match self {
            ColumnTypeConfig::Simple(s) => s,
            ColumnTypeConfig::Parameterized { name, .. } => name,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub id: String,
    pub table_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Any value (literal or `{ "expression": ... }`) marks the column as database-defaulted.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub id: String,
    pub from_table_id: String,
    pub from_column_id: String,
    pub to_table_id: String,
    pub to_column_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Per-field form options (`form_args`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FormArgs {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub validation: Option<ValidationRule>,
}

/// One node of a form rule tree. Plain strings are field rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleConfig {
    Field(String),
    Node(RuleNodeConfig),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleNodeConfig {
    Field {
        name: String,
        #[serde(default)]
        render_field: Option<String>,
    },
    Header {
        text: String,
    },
    Text {
        text: String,
        #[serde(default = "default_true")]
        escape: bool,
    },
    Html {
        html: String,
    },
    FieldSet {
        rules: Vec<RuleConfig>,
        #[serde(default)]
        header: Option<String>,
    },
    Macro {
        name: String,
        #[serde(default)]
        args: serde_json::Map<String, serde_json::Value>,
    },
    Container {
        #[serde(rename = "macro")]
        macro_name: String,
        child: Box<RuleConfig>,
        #[serde(default)]
        args: serde_json::Map<String, serde_json::Value>,
    },
    Nested {
        rules: Vec<RuleConfig>,
        #[serde(default)]
        separator: String,
    },
    Row {
        rules: Vec<RuleConfig>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AjaxRefConfig {
    /// Columns of the target table searched by the lookup.
    pub fields: Vec<String>,
    #[serde(default = "default_ajax_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub placeholder: Option<String>,
}

fn default_ajax_page_size() -> u32 {
    10
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InlineModelConfig {
    /// Child table id.
    pub entity_id: String,
    /// Child column holding the parent key; required when several relationships link the two tables.
    #[serde(default)]
    pub fk_column: Option<String>,
    /// Form list name; defaults to the child table name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub form_columns: Option<Vec<String>>,
    #[serde(default)]
    pub form_excluded_columns: Vec<String>,
    #[serde(default)]
    pub form_args: HashMap<String, FormArgs>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelViewConfig {
    pub entity_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,

    #[serde(default = "default_true")]
    pub can_create: bool,
    #[serde(default = "default_true")]
    pub can_edit: bool,
    #[serde(default = "default_true")]
    pub can_delete: bool,
    #[serde(default)]
    pub can_view_details: bool,
    #[serde(default)]
    pub can_export: bool,

    #[serde(default)]
    pub column_list: Option<Vec<String>>,
    #[serde(default)]
    pub column_exclude_list: Vec<String>,
    #[serde(default)]
    pub column_display_pk: bool,
    #[serde(default)]
    pub column_labels: HashMap<String, String>,
    #[serde(default)]
    pub column_searchable_list: Vec<String>,
    #[serde(default)]
    pub column_sortable_list: Option<Vec<String>>,
    /// `(column, descending)`.
    #[serde(default)]
    pub column_default_sort: Option<(String, bool)>,
    #[serde(default)]
    pub column_filters: Vec<String>,
    #[serde(default)]
    pub column_details_list: Option<Vec<String>>,
    #[serde(default)]
    pub column_details_exclude_list: Vec<String>,
    #[serde(default)]
    pub column_export_list: Option<Vec<String>>,
    #[serde(default)]
    pub column_editable_list: Vec<String>,

    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub can_set_page_size: bool,
    #[serde(default = "default_page_size_options")]
    pub page_size_options: Vec<u32>,
    /// 0 means unlimited.
    #[serde(default)]
    pub export_max_rows: u64,
    #[serde(default = "default_export_types")]
    pub export_types: Vec<String>,
    #[serde(default)]
    pub named_filter_urls: bool,

    #[serde(default)]
    pub form_columns: Option<Vec<String>>,
    #[serde(default)]
    pub form_excluded_columns: Vec<String>,
    #[serde(default)]
    pub form_args: HashMap<String, FormArgs>,
    /// Column name -> widget kind ("text", "textarea", "hidden", ...).
    #[serde(default)]
    pub form_overrides: HashMap<String, String>,
    /// Column name -> `(value, label)` choices.
    #[serde(default)]
    pub form_choices: HashMap<String, Vec<(String, String)>>,
    #[serde(default)]
    pub form_rules: Option<Vec<RuleConfig>>,
    #[serde(default)]
    pub form_create_rules: Option<Vec<RuleConfig>>,
    #[serde(default)]
    pub form_edit_rules: Option<Vec<RuleConfig>>,
    #[serde(default)]
    pub inline_models: Vec<InlineModelConfig>,
    /// Foreign-key column name -> lookup options.
    #[serde(default)]
    pub form_ajax_refs: HashMap<String, AjaxRefConfig>,
    #[serde(default)]
    pub action_disallowed_list: Vec<String>,
}

fn default_page_size_options() -> Vec<u32> {
    vec![20, 50, 100]
}

fn default_export_types() -> Vec<String> {
    vec!["csv".into()]
}

impl ModelViewConfig {
    /// Minimal view options for a table; every other option keeps its default.
    pub fn for_entity(entity_id: impl Into<String>) -> Self {
        ModelViewConfig {
            entity_id: entity_id.into(),
            name: None,
            endpoint: None,
            url: None,
            category: None,
            can_create: true,
            can_edit: true,
            can_delete: true,
            can_view_details: false,
            can_export: false,
            column_list: None,
            column_exclude_list: Vec::new(),
            column_display_pk: false,
            column_labels: HashMap::new(),
            column_searchable_list: Vec::new(),
            column_sortable_list: None,
            column_default_sort: None,
            column_filters: Vec::new(),
            column_details_list: None,
            column_details_exclude_list: Vec::new(),
            column_export_list: None,
            column_editable_list: Vec::new(),
            page_size: None,
            can_set_page_size: false,
            page_size_options: default_page_size_options(),
            export_max_rows: 0,
            export_types: default_export_types(),
            named_filter_urls: false,
            form_columns: None,
            form_excluded_columns: Vec::new(),
            form_args: HashMap::new(),
            form_overrides: HashMap::new(),
            form_choices: HashMap::new(),
            form_rules: None,
            form_create_rules: None,
            form_edit_rules: None,
            inline_models: Vec::new(),
            form_ajax_refs: HashMap::new(),
            action_disallowed_list: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileAdminConfig {
    pub name: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub base_path: String,
    /// Lowercase extensions without dot; empty allows everything.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub editable_extensions: Vec<String>,
    #[serde(default = "default_true")]
    pub can_upload: bool,
    #[serde(default = "default_true")]
    pub can_download: bool,
    #[serde(default = "default_true")]
    pub can_delete: bool,
    #[serde(default = "default_true")]
    pub can_delete_dirs: bool,
    #[serde(default = "default_true")]
    pub can_mkdir: bool,
    #[serde(default = "default_true")]
    pub can_rename: bool,
}

/// All config documents in one struct for in-memory loading.
#[derive(Clone, Debug, Default)]
pub struct AdminConfig {
    pub schemas: Vec<SchemaConfig>,
    pub enums: Vec<EnumConfig>,
    pub tables: Vec<TableConfig>,
    pub columns: Vec<ColumnConfig>,
    pub relationships: Vec<RelationshipConfig>,
    pub model_views: Vec<ModelViewConfig>,
    pub file_admins: Vec<FileAdminConfig>,
}
