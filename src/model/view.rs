//! Scaffolded CRUD view over one entity.

use super::actions::{DeleteAction, ModelAction};
use super::ajax::AjaxModelLoader;
use super::export::{attachment, export_filename, write_csv};
use super::format::{format_value, Formatter};
use super::hooks::{ModelViewHooks, NoHooks};
use crate::admin::{AdminView, ViewMeta};
use crate::backend::{ChildChanges, ListQuery, ModelBackend, PersistOp, PersistPlan, Sort, SortOrder};
use crate::config::{ModelViewConfig, Record, ResolvedEntity, ResolvedModel, RuleConfig};
use crate::error::{AppError, ConfigError};
use crate::extractors::ReturnUrl;
use crate::filters::{filters_for_column, parse_filter_args, AppliedFilter, ColumnFilter, SearchQuery};
use crate::form::{
    plan_changes, raw_of, scaffold_form, BoundField, BoundForm, FieldKind, FormData, FormOptions, FormSpec,
    HtmlMacros, InlineFormSpec, InlineModelConverter, RenderContext, RuleSet,
};
use crate::naming::prettify_name;
use crate::response::{success_one_ok, unprocessable, FlashMessage, Redirect};
use crate::settings::AdminSettings;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Largest row offset a backend accepts (Postgres `OFFSET` is a bigint).
const MAX_OFFSET: u64 = i64::MAX as u64;

/// A displayed column: name and label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub label: String,
}

/// Parsed list arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListArgs {
    pub page: u64,
    pub page_size: u64,
    /// Index into the list columns.
    pub sort: Option<usize>,
    pub desc: bool,
    pub search: Option<String>,
    pub filters: Vec<AppliedFilter>,
}

/// Message of an error without its category prefix, for flashing.
pub fn error_text(e: &AppError) -> String {
    match e {
        AppError::Validation(msg) | AppError::Conflict(msg) | AppError::NotFound(msg) | AppError::BadRequest(msg) => {
            msg.clone()
        }
        AppError::Db(sqlx::Error::Database(db)) => db.message().to_string(),
        other => other.to_string(),
    }
}

fn arg<'a>(args: &'a [(String, String)], key: &str) -> Option<&'a str> {
    args.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

pub(crate) fn url_with(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{}?{}", path, query)
}

fn check_columns(view: &str, entity: &ResolvedEntity, option: &'static str, columns: &[String]) -> Result<(), ConfigError> {
    match columns.iter().find(|c| !entity.has_column(c)) {
        Some(column) => Err(ConfigError::UnknownColumn {
            view: view.to_string(),
            option,
            column: column.clone(),
        }),
        None => Ok(()),
    }
}

fn apply_rules(base: &FormSpec, rules: Option<&Vec<RuleConfig>>) -> Result<(FormSpec, RuleSet), ConfigError> {
    let mut form = base.clone();
    let set = match rules {
        Some(rules) => {
            let set = RuleSet::new(rules, &form).map_err(|e| ConfigError::Validation(e.to_string()))?;
            set.prune(&mut form);
            set
        }
        None => RuleSet::for_form(&form),
    };
    Ok((form, set))
}

fn rows_of<'a>(children: &'a HashMap<String, Vec<Record>>, name: &str) -> &'a [Record] {
    children.get(name).map(Vec::as_slice).unwrap_or(&[])
}

fn bound_fields(form: &BoundForm) -> impl Iterator<Item = &BoundField> + '_ {
    form.fields.iter().chain(
        form.inlines
            .iter()
            .flat_map(|i| i.entries.iter().flat_map(|e| e.fields.iter()).chain(i.template.iter())),
    )
}

fn bound_fields_mut(form: &mut BoundForm) -> impl Iterator<Item = &mut BoundField> + '_ {
    let BoundForm { fields, inlines, .. } = form;
    fields.iter_mut().chain(inlines.iter_mut().flat_map(|i| {
        let crate::form::BoundInline { entries, template, .. } = i;
        entries.iter_mut().flat_map(|e| e.fields.iter_mut()).chain(template.iter_mut())
    }))
}

type RelationLabels = HashMap<String, HashMap<String, String>>;

#[derive(Serialize)]
struct Permissions {
    can_create: bool,
    can_edit: bool,
    can_delete: bool,
    can_view_details: bool,
    can_export: bool,
}

#[derive(Serialize)]
struct ListColumn<'a> {
    name: &'a str,
    label: &'a str,
    sortable: bool,
    editable: bool,
}

#[derive(Serialize)]
struct ListRow {
    pk: Value,
    values: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    raw: Map<String, Value>,
}

#[derive(Serialize)]
struct FilterGroup<'a> {
    index: usize,
    /// Argument name suffix after `flt{pos}_`.
    key: String,
    column: &'a str,
    label: &'a str,
    operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a Vec<(String, String)>>,
}

#[derive(Serialize)]
struct ActiveFilter<'a> {
    position: usize,
    index: usize,
    arg: String,
    label: &'a str,
    operation: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct SortState<'a> {
    index: usize,
    column: &'a str,
    desc: bool,
}

#[derive(Serialize)]
struct ListUrls {
    list: String,
    create: String,
    export: Option<String>,
}

#[derive(Serialize)]
struct ListPage<'a> {
    name: &'a str,
    columns: Vec<ListColumn<'a>>,
    rows: Vec<ListRow>,
    count: u64,
    page: u64,
    page_size: u64,
    num_pages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_size_options: Option<&'a Vec<u32>>,
    sort: Option<SortState<'a>>,
    search: Option<&'a str>,
    search_supported: bool,
    filters: Vec<FilterGroup<'a>>,
    active_filters: Vec<ActiveFilter<'a>>,
    actions: Vec<&'a super::actions::ActionSpec>,
    permissions: Permissions,
    urls: ListUrls,
}

#[derive(Serialize)]
struct FormPage<'a> {
    name: &'a str,
    action: String,
    return_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pk: Option<Value>,
    form: Value,
    layout: Value,
    html: String,
}

#[derive(Serialize)]
struct DetailsPage<'a> {
    name: &'a str,
    pk: Value,
    return_url: String,
    columns: Vec<DetailsValue<'a>>,
}

#[derive(Serialize)]
struct DetailsValue<'a> {
    name: &'a str,
    label: &'a str,
    value: String,
}

pub struct ModelView {
    meta: ViewMeta,
    settings: Arc<AdminSettings>,
    config: ModelViewConfig,
    model: Arc<ResolvedModel>,
    entity: ResolvedEntity,
    backend: Arc<dyn ModelBackend>,
    list_columns: Vec<ColumnSpec>,
    sortable_columns: Vec<String>,
    searchable_columns: Vec<String>,
    filters: Vec<ColumnFilter>,
    details_columns: Vec<ColumnSpec>,
    export_columns: Vec<ColumnSpec>,
    create_form: FormSpec,
    edit_form: FormSpec,
    list_form: FormSpec,
    create_rules: RuleSet,
    edit_rules: RuleSet,
    ajax_loaders: Vec<AjaxModelLoader>,
    actions: Vec<Arc<dyn ModelAction>>,
    hooks: Arc<dyn ModelViewHooks>,
    formatters: HashMap<String, Formatter>,
    export_formatters: HashMap<String, Formatter>,
    render_context: Arc<dyn RenderContext + Send + Sync>,
}

impl ModelView {
    /// Scaffold columns, filters, forms, rules and loaders from the view options.
    pub fn build(
        settings: Arc<AdminSettings>,
        model: Arc<ResolvedModel>,
        backend: Arc<dyn ModelBackend>,
        config: ModelViewConfig,
    ) -> Result<ModelView, ConfigError> {
        let entity = model
            .entity(&config.entity_id)
            .cloned()
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "model view table",
                id: config.entity_id.clone(),
            })?;
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| prettify_name(&entity.table_name));
        let meta = ViewMeta::new(
            &settings,
            &name,
            Some(config.endpoint.as_deref().unwrap_or(&entity.table_name)),
            config.url.as_deref(),
            config.category.as_deref(),
        );
        let label = |c: &str| {
            config
                .column_labels
                .get(c)
                .cloned()
                .unwrap_or_else(|| prettify_name(c))
        };
        let specs = |names: &[String]| -> Vec<ColumnSpec> {
            names
                .iter()
                .map(|n| ColumnSpec {
                    name: n.clone(),
                    label: label(n),
                })
                .collect()
        };

        let list_names: Vec<String> = match &config.column_list {
            Some(cols) => {
                check_columns(&name, &entity, "column_list", cols)?;
                cols.clone()
            }
            None => entity
                .columns
                .iter()
                .filter(|c| config.column_display_pk || !c.is_pk())
                .map(|c| c.name.clone())
                .collect(),
        };
        let list_names: Vec<String> = list_names
            .into_iter()
            .filter(|c| !config.column_exclude_list.contains(c))
            .collect();

        let sortable_columns = match &config.column_sortable_list {
            Some(cols) => {
                check_columns(&name, &entity, "column_sortable_list", cols)?;
                cols.clone()
            }
            None => list_names
                .iter()
                .filter(|n| entity.column(n).is_some_and(|c| c.kind.is_sortable()))
                .cloned()
                .collect(),
        };
        check_columns(&name, &entity, "column_searchable_list", &config.column_searchable_list)?;
        check_columns(&name, &entity, "column_filters", &config.column_filters)?;
        check_columns(&name, &entity, "column_editable_list", &config.column_editable_list)?;
        if let Some((column, _)) = &config.column_default_sort {
            check_columns(&name, &entity, "column_default_sort", std::slice::from_ref(column))?;
        }

        let filters: Vec<ColumnFilter> = config
            .column_filters
            .iter()
            .filter_map(|c| entity.column(c))
            .flat_map(|c| filters_for_column(&c.name, &label(&c.name), c.kind, &c.enum_values))
            .collect();

        let details_names: Vec<String> = match &config.column_details_list {
            Some(cols) => {
                check_columns(&name, &entity, "column_details_list", cols)?;
                cols.clone()
            }
            None => entity.columns.iter().map(|c| c.name.clone()).collect(),
        };
        let details_names: Vec<String> = details_names
            .into_iter()
            .filter(|c| !config.column_details_exclude_list.contains(c))
            .collect();
        let export_names = match &config.column_export_list {
            Some(cols) => {
                check_columns(&name, &entity, "column_export_list", cols)?;
                cols.clone()
            }
            None => list_names.clone(),
        };
        if let Some(t) = config.export_types.iter().find(|t| t.as_str() != "csv") {
            return Err(ConfigError::Validation(format!("view {}: unsupported export type {}", name, t)));
        }

        let mut base = scaffold_form(&model, &entity, &FormOptions::from(&config))?;
        for inline in &config.inline_models {
            base.inlines.push(InlineModelConverter::contribute(&model, &entity, inline)?);
        }
        let (create_form, create_rules) =
            apply_rules(&base, config.form_create_rules.as_ref().or(config.form_rules.as_ref()))?;
        let (edit_form, edit_rules) =
            apply_rules(&base, config.form_edit_rules.as_ref().or(config.form_rules.as_ref()))?;

        let mut list_opts = FormOptions::from(&config);
        list_opts.columns = Some(config.column_editable_list.clone());
        list_opts.excluded.clear();
        let list_form = scaffold_form(&model, &entity, &list_opts)?;

        let mut ajax_loaders = Vec::new();
        for (column, cfg) in &config.form_ajax_refs {
            let rel = entity.to_one_relation(column).ok_or_else(|| {
                ConfigError::Validation(format!("view {}: form_ajax_refs key {} is not a foreign key", name, column))
            })?;
            let target = model
                .entity(&rel.related_table_id)
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "ajax lookup table",
                    id: rel.related_table_id.clone(),
                })?;
            ajax_loaders.push(AjaxModelLoader::new(column, target, cfg)?);
        }
        ajax_loaders.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(
            view = %meta.endpoint,
            columns = list_names.len(),
            filters = filters.len(),
            inlines = base.inlines.len(),
            "model view scaffolded"
        );

        Ok(ModelView {
            list_columns: specs(&list_names),
            details_columns: specs(&details_names),
            export_columns: specs(&export_names),
            searchable_columns: config.column_searchable_list.clone(),
            sortable_columns,
            filters,
            create_form,
            edit_form,
            list_form,
            create_rules,
            edit_rules,
            ajax_loaders,
            actions: vec![Arc::new(DeleteAction::default())],
            hooks: Arc::new(NoHooks),
            formatters: HashMap::new(),
            export_formatters: HashMap::new(),
            render_context: Arc::new(HtmlMacros::default()),
            meta,
            settings,
            config,
            model,
            entity,
            backend,
        })
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ModelViewHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_action(mut self, action: Arc<dyn ModelAction>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_formatter(mut self, column: &str, f: Formatter) -> Self {
        self.formatters.insert(column.to_string(), f);
        self
    }

    pub fn with_export_formatter(mut self, column: &str, f: Formatter) -> Self {
        self.export_formatters.insert(column.to_string(), f);
        self
    }

    pub fn with_render_context(mut self, ctx: Arc<dyn RenderContext + Send + Sync>) -> Self {
        self.render_context = ctx;
        self
    }

    pub fn config(&self) -> &ModelViewConfig {
        &self.config
    }

    pub fn entity(&self) -> &ResolvedEntity {
        &self.entity
    }

    pub fn backend(&self) -> &dyn ModelBackend {
        self.backend.as_ref()
    }

    pub fn list_columns(&self) -> &[ColumnSpec] {
        &self.list_columns
    }

    pub fn filters(&self) -> &[ColumnFilter] {
        &self.filters
    }

    pub fn create_form(&self) -> &FormSpec {
        &self.create_form
    }

    pub fn edit_form(&self) -> &FormSpec {
        &self.edit_form
    }

    pub fn ajax_loader(&self, name: &str) -> Option<&AjaxModelLoader> {
        self.ajax_loaders.iter().find(|l| l.name == name)
    }

    /// Actions offered by this view, minus disallowed ones.
    pub fn available_actions(&self) -> Vec<&Arc<dyn ModelAction>> {
        self.actions
            .iter()
            .filter(|a| !self.config.action_disallowed_list.contains(&a.spec().name))
            .filter(|a| a.is_allowed(self))
            .collect()
    }

    /// In debug mode everything but validation failures propagates as a 500.
    pub(crate) fn reraises(&self, e: &AppError) -> bool {
        self.settings.debug && !matches!(e, AppError::Validation(_))
    }

    fn list_url(&self) -> String {
        self.meta.index_url()
    }

    fn page_url(&self, page: &str, params: &[(&str, &str)]) -> String {
        url_with(&format!("{}/{}/", self.meta.url, page), params)
    }

    fn denied(&self, return_url: String) -> Response {
        Redirect::to(return_url)
            .with(FlashMessage::error("Permission denied."))
            .into_response()
    }

    fn missing(&self, return_url: String) -> Response {
        Redirect::to(return_url)
            .with(FlashMessage::error("Record does not exist."))
            .into_response()
    }

    fn parse_id(&self, raw: Option<&str>) -> Option<Value> {
        raw.and_then(|r| self.entity.pk_type.parse(r).ok())
    }

    pub fn parse_list_args(&self, args: &[(String, String)]) -> ListArgs {
        let default_size = u64::from(self.config.page_size.unwrap_or(self.settings.default_page_size));
        let page_size = arg(args, "page_size")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| self.config.can_set_page_size && self.config.page_size_options.contains(n))
            .map(u64::from)
            .unwrap_or(default_size);
        let sort = arg(args, "sort")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|i| {
                self.list_columns
                    .get(*i)
                    .is_some_and(|c| self.sortable_columns.contains(&c.name))
            });
        ListArgs {
            page: arg(args, "page").and_then(|v| v.parse().ok()).unwrap_or(0),
            page_size,
            sort,
            desc: arg(args, "desc").is_some_and(|v| v == "1"),
            search: arg(args, "search").map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
            filters: parse_filter_args(&self.filters, args, self.config.named_filter_urls),
        }
    }

    fn list_query(&self, args: &ListArgs, limit: Option<u64>, offset: u64) -> ListQuery {
        let order = |desc: bool| if desc { SortOrder::Desc } else { SortOrder::Asc };
        let sort = match args.sort.and_then(|i| self.list_columns.get(i)) {
            Some(col) => Some(Sort {
                column: col.name.clone(),
                order: order(args.desc),
            }),
            None => self.config.column_default_sort.as_ref().map(|(column, desc)| Sort {
                column: column.clone(),
                order: order(*desc),
            }),
        };
        ListQuery {
            filters: args.filters.clone(),
            search: args
                .search
                .as_deref()
                .and_then(|s| SearchQuery::new(&self.searchable_columns, s)),
            sort,
            offset,
            limit,
        }
    }

    /// Display labels of the records referenced by foreign-key columns.
    async fn relation_labels(&self, rows: &[Record], columns: &[ColumnSpec]) -> Result<RelationLabels, AppError> {
        let mut out = RelationLabels::new();
        for col in columns {
            let Some(rel) = self.entity.to_one_relation(&col.name) else {
                continue;
            };
            let Some(target) = self.model.entity(&rel.related_table_id) else {
                continue;
            };
            if rel.their_key_column != target.pk_column {
                continue;
            }
            let mut ids: Vec<Value> = Vec::new();
            for v in rows.iter().filter_map(|r| r.get(&col.name)).filter(|v| !v.is_null()) {
                if !ids.contains(v) {
                    ids.push(v.clone());
                }
            }
            if ids.is_empty() {
                continue;
            }
            let labels = self
                .backend
                .get_many(target, &ids)
                .await?
                .iter()
                .map(|r| (raw_of(r.get(&target.pk_column).unwrap_or(&Value::Null)), target.display_value(r)))
                .collect();
            out.insert(col.name.clone(), labels);
        }
        Ok(out)
    }

    fn format_cell(&self, formatters: &[&HashMap<String, Formatter>], labels: &RelationLabels, record: &Record, column: &str) -> String {
        if let Some(f) = formatters.iter().find_map(|m| m.get(column)) {
            return f(record, column);
        }
        let value = record.get(column).unwrap_or(&Value::Null);
        let raw = raw_of(value);
        if let Some(label) = labels.get(column).and_then(|m| m.get(&raw)) {
            return label.clone();
        }
        if let Some((_, label)) = self
            .config
            .form_choices
            .get(column)
            .and_then(|choices| choices.iter().find(|(v, _)| *v == raw))
        {
            return label.clone();
        }
        format_value(value)
    }

    fn permissions(&self) -> Permissions {
        Permissions {
            can_create: self.config.can_create,
            can_edit: self.config.can_edit,
            can_delete: self.config.can_delete,
            can_view_details: self.config.can_view_details,
            can_export: self.config.can_export,
        }
    }

    pub async fn list(&self, args: &[(String, String)]) -> Result<Response, AppError> {
        let list_args = self.parse_list_args(args);
        let offset = list_args
            .page
            .saturating_mul(list_args.page_size)
            .min(MAX_OFFSET);
        let query = self.list_query(&list_args, Some(list_args.page_size), offset);
        let (count, rows) = self.backend.get_list(&self.entity, &query).await?;
        let labels = self.relation_labels(&rows, &self.list_columns).await?;

        let rows: Vec<ListRow> = rows
            .iter()
            .map(|r| ListRow {
                pk: self.entity.pk_value(r).cloned().unwrap_or(Value::Null),
                values: self
                    .list_columns
                    .iter()
                    .map(|c| {
                        let text = self.format_cell(&[&self.formatters], &labels, r, &c.name);
                        (c.name.clone(), Value::String(text))
                    })
                    .collect(),
                raw: self
                    .config
                    .column_editable_list
                    .iter()
                    .map(|c| (c.clone(), r.get(c).cloned().unwrap_or(Value::Null)))
                    .collect(),
            })
            .collect();
        let num_pages = if list_args.page_size == 0 {
            0
        } else {
            count.div_ceil(list_args.page_size)
        };

        let named = self.config.named_filter_urls;
        let active_filters = list_args
            .filters
            .iter()
            .enumerate()
            .map(|(position, f)| {
                let filter = &self.filters[f.index];
                ActiveFilter {
                    position,
                    index: f.index,
                    arg: format!("flt{}_{}", position, filter.url_key(f.index, named)),
                    label: &filter.label,
                    operation: filter.operation(),
                    value: &f.raw,
                }
            })
            .collect();

        let page = ListPage {
            name: &self.meta.name,
            columns: self
                .list_columns
                .iter()
                .map(|c| ListColumn {
                    name: &c.name,
                    label: &c.label,
                    sortable: self.sortable_columns.contains(&c.name),
                    editable: self.config.can_edit && self.config.column_editable_list.contains(&c.name),
                })
                .collect(),
            rows,
            count,
            page: list_args.page,
            page_size: list_args.page_size,
            num_pages,
            page_size_options: self.config.can_set_page_size.then_some(&self.config.page_size_options),
            sort: list_args.sort.map(|index| SortState {
                index,
                column: &self.list_columns[index].name,
                desc: list_args.desc,
            }),
            search: list_args.search.as_deref(),
            search_supported: !self.searchable_columns.is_empty(),
            filters: self
                .filters
                .iter()
                .enumerate()
                .map(|(index, f)| FilterGroup {
                    index,
                    key: f.url_key(index, named),
                    column: &f.column,
                    label: &f.label,
                    operation: f.operation(),
                    options: f.options.as_ref(),
                })
                .collect(),
            active_filters,
            actions: self.available_actions().into_iter().map(|a| a.spec()).collect(),
            permissions: self.permissions(),
            urls: ListUrls {
                list: self.list_url(),
                create: self.page_url("new", &[]),
                export: self.config.can_export.then(|| self.page_url("export/csv", &[])),
            },
        };
        let body = serde_json::to_value(&page).map_err(|e| AppError::BadRequest(e.to_string()))?;
        Ok(success_one_ok(body).into_response())
    }

    /// Fill select options of relation fields: every target row for plain selects, the
    /// selected row for ajax lookups.
    async fn load_options(&self, form: &mut BoundForm) -> Result<(), AppError> {
        let mut targets: Vec<String> = Vec::new();
        for f in bound_fields(form) {
            if let FieldKind::Relation { target, ajax: false, .. } = &f.field.kind {
                if !targets.contains(target) {
                    targets.push(target.clone());
                }
            }
        }
        let mut choices: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for target in targets {
            let Some(entity) = self.model.entity(&target) else {
                continue;
            };
            let (_, rows) = self.backend.get_list(entity, &ListQuery::default()).await?;
            let options = rows
                .iter()
                .map(|r| (raw_of(entity.pk_value(r).unwrap_or(&Value::Null)), entity.display_value(r)))
                .collect();
            choices.insert(target, options);
        }
        for f in bound_fields_mut(form) {
            if let FieldKind::Relation { target, ajax: false, .. } = &f.field.kind {
                f.options = choices.get(target).cloned();
            }
        }

        let selected: Vec<(String, Value)> = form
            .fields
            .iter()
            .filter(|f| matches!(f.field.kind, FieldKind::Relation { ajax: true, .. }))
            .map(|f| (f.field.name.clone(), f.value.clone()))
            .collect();
        for (name, value) in selected {
            let Some(loader) = self.ajax_loader(&name) else {
                continue;
            };
            let option = if value.is_null() {
                None
            } else {
                loader.get_one(self.backend.as_ref(), &value).await?
            };
            if let Some(field) = form.field_mut(&name) {
                field.options = Some(option.into_iter().collect());
            }
        }
        Ok(())
    }

    async fn form_page(
        &self,
        form: &mut BoundForm,
        rules: &RuleSet,
        action: String,
        return_url: String,
        pk: Option<Value>,
    ) -> Result<Value, AppError> {
        self.load_options(form).await?;
        let html = rules.render(self.render_context.as_ref(), form)?;
        let page = FormPage {
            name: &self.meta.name,
            action,
            return_url,
            pk,
            form: form.to_json(),
            layout: rules.layout(),
            html,
        };
        serde_json::to_value(&page).map_err(|e| AppError::BadRequest(e.to_string()))
    }

    fn child_entity(&self, inline: &InlineFormSpec) -> Result<&ResolvedEntity, AppError> {
        self.model.entity(&inline.entity_id).ok_or_else(|| {
            AppError::Config(ConfigError::MissingReference {
                kind: "inline model table",
                id: inline.entity_id.clone(),
            })
        })
    }

    /// Stored child rows of every inline list, keyed by list name.
    async fn load_children(&self, spec: &FormSpec, record: &Record) -> Result<HashMap<String, Vec<Record>>, AppError> {
        let mut out = HashMap::new();
        for inline in &spec.inlines {
            let child = self.child_entity(inline)?;
            let rows = match record.get(&inline.parent_key_column).filter(|v| !v.is_null()) {
                Some(key) => self.backend.find_related(child, &inline.fk_column, key).await?,
                None => Vec::new(),
            };
            out.insert(inline.name.clone(), rows);
        }
        Ok(out)
    }

    fn child_changes(
        &self,
        spec: &FormSpec,
        form: &BoundForm,
        children: &HashMap<String, Vec<Record>>,
    ) -> Result<Vec<ChildChanges<'_>>, AppError> {
        let mut out = Vec::new();
        for inline in &spec.inlines {
            let Some(bound) = form.inline(&inline.name) else {
                continue;
            };
            let changes = plan_changes(inline, rows_of(children, &inline.name), &bound.entries);
            if changes.is_empty() {
                continue;
            }
            out.push(ChildChanges {
                entity: self.child_entity(inline)?,
                fk_column: inline.fk_column.clone(),
                parent_key_column: inline.parent_key_column.clone(),
                changes,
            });
        }
        Ok(out)
    }

    /// Save a new record and its inline rows.
    pub(crate) async fn create_model(&self, form: &BoundForm) -> Result<Record, AppError> {
        let mut values = Record::new();
        form.populate(&mut values);
        // blank values give way to database defaults
        values.retain(|k, v| !(v.is_null() && self.entity.column(k).is_some_and(|c| c.has_default)));
        self.hooks.on_model_change(form, &mut values, true).await?;
        let plan = PersistPlan {
            entity: &self.entity,
            op: PersistOp::Create(values),
            children: self.child_changes(&self.create_form, form, &HashMap::new())?,
        };
        let saved = self.backend.persist(&plan).await?;
        tracing::info!(view = %self.meta.endpoint, pk = ?self.entity.pk_value(&saved), "record created");
        Ok(saved)
    }

    /// Save form values over `record`. Only form fields and values changed by hooks are written.
    pub(crate) async fn update_model(
        &self,
        form: &BoundForm,
        spec: &FormSpec,
        id: &Value,
        record: &Record,
        children: &HashMap<String, Vec<Record>>,
    ) -> Result<Record, AppError> {
        let mut values = record.clone();
        form.populate(&mut values);
        self.hooks.on_model_change(form, &mut values, false).await?;
        let values: Record = values
            .into_iter()
            .filter(|(k, v)| form.field(k).is_some() || record.get(k) != Some(v))
            .collect();
        let plan = PersistPlan {
            entity: &self.entity,
            op: PersistOp::Update { id: id.clone(), values },
            children: self.child_changes(spec, form, children)?,
        };
        let saved = self.backend.persist(&plan).await?;
        tracing::info!(view = %self.meta.endpoint, pk = %id, "record updated");
        Ok(saved)
    }

    /// `false` when the record was already gone.
    pub(crate) async fn delete_model(&self, record: &Record) -> Result<bool, AppError> {
        let id = self
            .entity
            .pk_value(record)
            .cloned()
            .ok_or_else(|| AppError::NotFound("record has no primary key".into()))?;
        self.hooks.on_model_delete(record).await?;
        let deleted = self.backend.delete(&self.entity, &id).await?;
        if deleted {
            self.hooks.after_model_delete(record).await?;
            tracing::info!(view = %self.meta.endpoint, pk = %id, "record deleted");
        }
        Ok(deleted)
    }

    pub async fn create_view(&self, ret: &ReturnUrl) -> Result<Response, AppError> {
        let return_url = ret.or(&self.list_url());
        if !self.config.can_create {
            return Ok(self.denied(return_url));
        }
        let mut form = BoundForm::process(&self.create_form, None, None, &HashMap::new());
        let action = self.page_url("new", &[("url", &return_url)]);
        let page = self.form_page(&mut form, &self.create_rules, action, return_url, None).await?;
        Ok(success_one_ok(page).into_response())
    }

    pub async fn create(&self, ret: &ReturnUrl, data: FormData) -> Result<Response, AppError> {
        let return_url = ret.or(&self.list_url());
        if !self.config.can_create {
            return Ok(self.denied(return_url));
        }
        let mut form = BoundForm::process(&self.create_form, Some(&data), None, &HashMap::new());
        let action = self.page_url("new", &[("url", &return_url)]);
        if !form.validate() {
            let page = self.form_page(&mut form, &self.create_rules, action, return_url, None).await?;
            return Ok(unprocessable(page, Vec::new()).into_response());
        }
        let saved = match self.create_model(&form).await {
            Ok(saved) => saved,
            Err(e) if self.reraises(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(view = %self.meta.endpoint, error = %e, "create failed");
                let flash = FlashMessage::error(format!("Failed to create record. {}", error_text(&e)));
                let page = self.form_page(&mut form, &self.create_rules, action, return_url, None).await?;
                return Ok(unprocessable(page, vec![flash]).into_response());
            }
        };
        self.hooks.after_model_change(&form, &saved, true).await?;

        let pk = raw_of(self.entity.pk_value(&saved).unwrap_or(&Value::Null));
        let location = if data.contains("_add_another") {
            self.page_url("new", &[("url", &return_url)])
        } else if data.contains("_continue_editing") {
            self.page_url("edit", &[("id", &pk), ("url", &return_url)])
        } else {
            return_url
        };
        Ok(Redirect::to(location)
            .with(FlashMessage::success("Record was successfully created."))
            .into_response())
    }

    pub async fn edit_view(&self, args: &[(String, String)], ret: &ReturnUrl) -> Result<Response, AppError> {
        let return_url = ret.or(&self.list_url());
        if !self.config.can_edit {
            return Ok(self.denied(return_url));
        }
        let Some(raw_id) = arg(args, "id") else {
            return Ok(Redirect::to(return_url).into_response());
        };
        let record = match self.parse_id(Some(raw_id)) {
            Some(id) => self.backend.get_one(&self.entity, &id).await?,
            None => None,
        };
        let Some(record) = record else {
            return Ok(self.missing(return_url));
        };
        let children = self.load_children(&self.edit_form, &record).await?;
        let mut form = BoundForm::process(&self.edit_form, None, Some(&record), &children);
        let action = self.page_url("edit", &[("id", raw_id), ("url", &return_url)]);
        let pk = self.entity.pk_value(&record).cloned();
        let page = self.form_page(&mut form, &self.edit_rules, action, return_url, pk).await?;
        Ok(success_one_ok(page).into_response())
    }

    pub async fn edit(&self, args: &[(String, String)], ret: &ReturnUrl, data: FormData) -> Result<Response, AppError> {
        let return_url = ret.or(&self.list_url());
        if !self.config.can_edit {
            return Ok(self.denied(return_url));
        }
        let Some(raw_id) = arg(args, "id") else {
            return Ok(Redirect::to(return_url).into_response());
        };
        let Some(id) = self.parse_id(Some(raw_id)) else {
            return Ok(self.missing(return_url));
        };
        let Some(record) = self.backend.get_one(&self.entity, &id).await? else {
            return Ok(self.missing(return_url));
        };
        let children = self.load_children(&self.edit_form, &record).await?;
        let mut form = BoundForm::process(&self.edit_form, Some(&data), Some(&record), &children);
        let action = self.page_url("edit", &[("id", raw_id), ("url", &return_url)]);
        let pk = Some(id.clone());
        if !form.validate() {
            let page = self.form_page(&mut form, &self.edit_rules, action, return_url, pk).await?;
            return Ok(unprocessable(page, Vec::new()).into_response());
        }
        let saved = match self.update_model(&form, &self.edit_form, &id, &record, &children).await {
            Ok(saved) => saved,
            Err(e) if self.reraises(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(view = %self.meta.endpoint, error = %e, "update failed");
                let flash = FlashMessage::error(format!("Failed to update record. {}", error_text(&e)));
                let page = self.form_page(&mut form, &self.edit_rules, action, return_url, pk).await?;
                return Ok(unprocessable(page, vec![flash]).into_response());
            }
        };
        self.hooks.after_model_change(&form, &saved, false).await?;

        let location = if data.contains("_add_another") {
            self.page_url("new", &[("url", &return_url)])
        } else if data.contains("_continue_editing") {
            action
        } else {
            return_url
        };
        Ok(Redirect::to(location)
            .with(FlashMessage::success("Record was successfully saved."))
            .into_response())
    }

    pub async fn details(&self, args: &[(String, String)], ret: &ReturnUrl) -> Result<Response, AppError> {
        let return_url = ret.or(&self.list_url());
        if !self.config.can_view_details {
            return Ok(self.denied(return_url));
        }
        let Some(raw_id) = arg(args, "id") else {
            return Ok(Redirect::to(return_url).into_response());
        };
        let record = match self.parse_id(Some(raw_id)) {
            Some(id) => self.backend.get_one(&self.entity, &id).await?,
            None => None,
        };
        let Some(record) = record else {
            return Ok(self.missing(return_url));
        };
        let labels = self
            .relation_labels(std::slice::from_ref(&record), &self.details_columns)
            .await?;
        let page = DetailsPage {
            name: &self.meta.name,
            pk: self.entity.pk_value(&record).cloned().unwrap_or(Value::Null),
            return_url,
            columns: self
                .details_columns
                .iter()
                .map(|c| DetailsValue {
                    name: &c.name,
                    label: &c.label,
                    value: self.format_cell(&[&self.formatters], &labels, &record, &c.name),
                })
                .collect(),
        };
        let body = serde_json::to_value(&page).map_err(|e| AppError::BadRequest(e.to_string()))?;
        Ok(success_one_ok(body).into_response())
    }

    pub async fn delete(&self, ret: &ReturnUrl, data: FormData) -> Result<Response, AppError> {
        let return_url = ret.or(&self.list_url());
        if !self.config.can_delete {
            return Ok(self.denied(return_url));
        }
        let record = match self.parse_id(data.get("id")) {
            Some(id) => self.backend.get_one(&self.entity, &id).await?,
            None => None,
        };
        let Some(record) = record else {
            return Ok(self.missing(return_url));
        };
        match self.delete_model(&record).await {
            Ok(true) => Ok(Redirect::to(return_url)
                .with(FlashMessage::success("Record was successfully deleted."))
                .into_response()),
            Ok(false) => Ok(self.missing(return_url)),
            Err(e) if self.reraises(&e) => Err(e),
            Err(e) => {
                tracing::warn!(view = %self.meta.endpoint, error = %e, "delete failed");
                Ok(Redirect::to(return_url)
                    .with(FlashMessage::error(format!("Failed to delete record. {}", error_text(&e))))
                    .into_response())
            }
        }
    }

    /// Run the named action over `rowid` values. Unknown or disallowed actions just redirect.
    pub async fn action(&self, ret: &ReturnUrl, data: FormData) -> Result<Response, AppError> {
        let return_url = ret.or(&self.list_url());
        let name = data.get("action").unwrap_or_default();
        let available = self.available_actions();
        let Some(action) = available.iter().find(|a| a.spec().name == name) else {
            tracing::debug!(view = %self.meta.endpoint, action = %name, "unknown action");
            return Ok(Redirect::to(return_url).into_response());
        };
        let ids: Vec<Value> = data
            .get_all("rowid")
            .into_iter()
            .filter_map(|raw| self.entity.pk_type.parse(raw).ok())
            .collect();
        let messages = action.run(self, &ids).await?;
        let mut redirect = Redirect::to(return_url);
        redirect.messages = messages;
        Ok(redirect.into_response())
    }

    /// `[[pk, label], ...]` for the loader serving field `name`.
    pub async fn ajax_lookup(&self, args: &[(String, String)]) -> Result<Response, AppError> {
        let name = arg(args, "name").unwrap_or_default();
        let loader = self
            .ajax_loader(name)
            .ok_or_else(|| AppError::NotFound(format!("ajax loader {}", name)))?;
        let offset = match arg(args, "offset") {
            Some(v) => v.parse().map_err(|_| AppError::BadRequest("invalid offset".into()))?,
            None => 0,
        };
        let limit = match arg(args, "limit") {
            Some(v) => Some(v.parse().map_err(|_| AppError::BadRequest("invalid limit".into()))?),
            None => None,
        };
        let term = arg(args, "query").unwrap_or_default();
        let found = loader.get_list(self.backend.as_ref(), term, offset, limit).await?;
        let body: Vec<Value> = found
            .into_iter()
            .map(|(pk, label)| Value::Array(vec![pk, Value::String(label)]))
            .collect();
        Ok(Json(body).into_response())
    }

    /// Inline list edit of one column. Answers plain text; failures are 500.
    pub async fn ajax_update(&self, data: FormData) -> Result<Response, AppError> {
        let fail = |msg: String| (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response();
        if !self.config.can_edit || self.list_form.fields.is_empty() {
            return Err(AppError::Forbidden);
        }
        let record = match self.parse_id(data.get("list_form_pk")) {
            Some(id) => self.backend.get_one(&self.entity, &id).await?.map(|r| (id, r)),
            None => None,
        };
        let Some((id, record)) = record else {
            return Ok(fail("Record does not exist.".into()));
        };
        let submitted: Vec<String> = self
            .list_form
            .names()
            .into_iter()
            .filter(|n| data.contains(n))
            .collect();
        if submitted.is_empty() {
            return Ok(fail("Failed to update record. No editable field was submitted.".into()));
        }
        let spec = self.list_form.subset(&submitted);
        let mut form = BoundForm::process(&spec, Some(&data), Some(&record), &HashMap::new());
        if !form.validate() {
            let first = form
                .fields
                .iter()
                .find_map(|f| f.errors.first().cloned())
                .unwrap_or_default();
            return Ok(fail(format!("Failed to update record. {}", first)));
        }
        match self.update_model(&form, &spec, &id, &record, &HashMap::new()).await {
            Ok(saved) => {
                self.hooks.after_model_change(&form, &saved, false).await?;
                Ok((StatusCode::OK, "Record was successfully saved.").into_response())
            }
            Err(e) if self.reraises(&e) => Err(e),
            Err(e) => Ok(fail(format!("Failed to update record. {}", error_text(&e)))),
        }
    }

    pub async fn export(&self, export_type: &str, args: &[(String, String)], ret: &ReturnUrl) -> Result<Response, AppError> {
        let return_url = ret.or(&self.list_url());
        if !self.config.can_export || !self.config.export_types.iter().any(|t| t == export_type) {
            return Ok(self.denied(return_url));
        }
        let list_args = self.parse_list_args(args);
        let limit = (self.config.export_max_rows > 0).then_some(self.config.export_max_rows);
        let (_, rows) = self
            .backend
            .get_list(&self.entity, &self.list_query(&list_args, limit, 0))
            .await?;
        let labels = self.relation_labels(&rows, &self.export_columns).await?;
        let formatters = [&self.export_formatters, &self.formatters];
        let body = write_csv(
            &self.export_columns.iter().map(|c| c.label.clone()).collect::<Vec<_>>(),
            rows.iter().map(|r| {
                self.export_columns
                    .iter()
                    .map(|c| self.format_cell(&formatters, &labels, r, &c.name))
                    .collect()
            }),
        )?;
        let filename = export_filename(&self.meta.name, chrono::Local::now().naive_local(), "csv");
        tracing::info!(view = %self.meta.endpoint, rows = rows.len(), "exported csv");
        Ok(attachment(&filename, "text/csv; charset=utf-8", body))
    }
}

impl AdminView for ModelView {
    fn meta(&self) -> &ViewMeta {
        &self.meta
    }

    fn router(self: Arc<Self>) -> Router {
        crate::routes::model_routes(self)
    }
}
