//! Form layout rules.
//!
//! A rule set is a tree of renderable nodes. It decides which form fields are shown and in
//! what order; anything a rule does not name is pruned from the form. Rendering resolves
//! each node's macro by name on a [`RenderContext`], so hosts can swap the markup without
//! touching the tree.

use super::bound::{BoundField, BoundForm, BoundInline};
use super::field::{FieldKind, FormSpec};
use crate::config::{RuleConfig, RuleNodeConfig};
use crate::error::RenderError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const FIELD_MACRO: &str = "lib.render_field";
pub const HEADER_MACRO: &str = "lib.render_header";
pub const ROW_MACRO: &str = "lib.render_form_row";
pub const INLINE_MACRO: &str = "lib.render_inline_list";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    Field {
        name: String,
        #[serde(rename = "macro")]
        macro_name: String,
    },
    Header {
        text: String,
        #[serde(rename = "macro")]
        macro_name: String,
    },
    Text {
        text: String,
        escape: bool,
    },
    Html {
        html: String,
    },
    FieldSet {
        rules: Vec<Rule>,
        header: Option<String>,
    },
    Macro {
        name: String,
        args: Map<String, Value>,
    },
    Container {
        #[serde(rename = "macro")]
        macro_name: String,
        child: Box<Rule>,
        args: Map<String, Value>,
    },
    Nested {
        rules: Vec<Rule>,
        separator: String,
    },
    Row {
        rules: Vec<Rule>,
    },
}

impl Rule {
    pub fn field(name: impl Into<String>) -> Rule {
        Rule::Field {
            name: name.into(),
            macro_name: FIELD_MACRO.to_string(),
        }
    }

    pub fn header(text: impl Into<String>) -> Rule {
        Rule::Header {
            text: text.into(),
            macro_name: HEADER_MACRO.to_string(),
        }
    }

    fn from_config(cfg: &RuleConfig) -> Rule {
        let all = |rules: &[RuleConfig]| rules.iter().map(Rule::from_config).collect::<Vec<_>>();
        match cfg {
            RuleConfig::Field(name) => Rule::field(name.clone()),
            RuleConfig::Node(node) => match node {
                RuleNodeConfig::Field { name, render_field } => Rule::Field {
                    name: name.clone(),
                    macro_name: render_field.clone().unwrap_or_else(|| FIELD_MACRO.to_string()),
                },
                RuleNodeConfig::Header { text } => Rule::header(text.clone()),
                RuleNodeConfig::Text { text, escape } => Rule::Text {
                    text: text.clone(),
                    escape: *escape,
                },
                RuleNodeConfig::Html { html } => Rule::Html { html: html.clone() },
                RuleNodeConfig::FieldSet { rules, header } => Rule::FieldSet {
                    rules: all(rules),
                    header: header.clone(),
                },
                RuleNodeConfig::Macro { name, args } => Rule::Macro {
                    name: name.clone(),
                    args: args.clone(),
                },
                RuleNodeConfig::Container { macro_name, child, args } => Rule::Container {
                    macro_name: macro_name.clone(),
                    child: Box::new(Rule::from_config(child)),
                    args: args.clone(),
                },
                RuleNodeConfig::Nested { rules, separator } => Rule::Nested {
                    rules: all(rules),
                    separator: separator.clone(),
                },
                RuleNodeConfig::Row { rules } => Rule::Row { rules: all(rules) },
            },
        }
    }

    /// Field names this rule renders, in order.
    pub fn visible_fields(&self) -> Vec<String> {
        match self {
            Rule::Field { name, .. } => vec![name.clone()],
            Rule::FieldSet { rules, .. } | Rule::Nested { rules, .. } | Rule::Row { rules } => {
                rules.iter().flat_map(Rule::visible_fields).collect()
            }
            Rule::Container { child, .. } => child.visible_fields(),
            Rule::Header { .. } | Rule::Text { .. } | Rule::Html { .. } | Rule::Macro { .. } => Vec::new(),
        }
    }

    fn check_fields(&self, form: &FormSpec) -> Result<(), RenderError> {
        for name in self.visible_fields() {
            if !form.has(&name) {
                return Err(RenderError::UnknownField(name));
            }
        }
        Ok(())
    }

    fn render(&self, ctx: &dyn RenderContext, form: &BoundForm) -> Result<String, RenderError> {
        let render_all = |rules: &[Rule]| -> Result<Vec<String>, RenderError> {
            rules.iter().map(|r| r.render(ctx, form)).collect()
        };
        match self {
            Rule::Field { name, macro_name } => {
                if let Some(field) = form.field(name) {
                    return call(ctx, macro_name, MacroCall::for_field(form, field));
                }
                let inline = form
                    .inline(name)
                    .ok_or_else(|| RenderError::UnknownField(name.clone()))?;
                let macro_name = if macro_name == FIELD_MACRO { INLINE_MACRO } else { macro_name };
                call(ctx, macro_name, MacroCall::for_inline(form, inline))
            }
            Rule::Header { text, macro_name } => {
                let mut args = Map::new();
                args.insert("text".into(), Value::String(text.clone()));
                call(ctx, macro_name, MacroCall::with_args(form, &args))
            }
            Rule::Text { text, escape } => Ok(if *escape { escape_html(text) } else { text.clone() }),
            Rule::Html { html } => Ok(html.clone()),
            Rule::FieldSet { rules, header } => {
                let mut out = String::new();
                if let Some(text) = header {
                    out.push_str(&Rule::header(text.clone()).render(ctx, form)?);
                }
                out.push_str(&render_all(rules)?.concat());
                Ok(out)
            }
            Rule::Macro { name, args } => call(ctx, name, MacroCall::with_args(form, args)),
            Rule::Container { macro_name, child, args } => {
                let caller = child.render(ctx, form)?;
                let mut call_args = MacroCall::with_args(form, args);
                call_args.caller = Some(caller);
                call(ctx, macro_name, call_args)
            }
            Rule::Nested { rules, separator } => Ok(render_all(rules)?.join(separator)),
            Rule::Row { rules } => {
                let empty = Map::new();
                let mut call_args = MacroCall::with_args(form, &empty);
                call_args.caller = Some(render_all(rules)?.concat());
                call(ctx, ROW_MACRO, call_args)
            }
        }
    }
}

/// Arguments handed to a macro.
pub struct MacroCall<'a> {
    pub form: &'a BoundForm,
    pub field: Option<&'a BoundField>,
    pub inline: Option<&'a BoundInline>,
    pub args: &'a Map<String, Value>,
    /// Rendered content of the wrapped rules (containers and rows).
    pub caller: Option<String>,
}

static NO_ARGS: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();

impl<'a> MacroCall<'a> {
    fn with_args(form: &'a BoundForm, args: &'a Map<String, Value>) -> Self {
        MacroCall {
            form,
            field: None,
            inline: None,
            args,
            caller: None,
        }
    }

    fn for_field(form: &'a BoundForm, field: &'a BoundField) -> Self {
        MacroCall {
            field: Some(field),
            ..MacroCall::with_args(form, NO_ARGS.get_or_init(Map::new))
        }
    }

    fn for_inline(form: &'a BoundForm, inline: &'a BoundInline) -> Self {
        MacroCall {
            inline: Some(inline),
            ..MacroCall::with_args(form, NO_ARGS.get_or_init(Map::new))
        }
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

pub type MacroFn = Arc<dyn Fn(&MacroCall<'_>) -> String + Send + Sync>;

/// Where rules look up macros by name.
pub trait RenderContext {
    fn resolve(&self, name: &str) -> Option<&MacroFn>;
}

fn call(ctx: &dyn RenderContext, name: &str, args: MacroCall<'_>) -> Result<String, RenderError> {
    let f = ctx
        .resolve(name)
        .ok_or_else(|| RenderError::MissingMacro(name.to_string()))?;
    Ok(f(&args))
}

/// The tree of rules for one form.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Convert configured rules. Every field a rule names must exist in `form`.
    pub fn new(rules: &[RuleConfig], form: &FormSpec) -> Result<RuleSet, RenderError> {
        let rules: Vec<Rule> = rules.iter().map(Rule::from_config).collect();
        for rule in &rules {
            rule.check_fields(form)?;
        }
        Ok(RuleSet { rules })
    }

    /// One field rule per form field and inline list, in definition order.
    pub fn for_form(form: &FormSpec) -> RuleSet {
        RuleSet {
            rules: form.names().into_iter().map(Rule::field).collect(),
        }
    }

    pub fn visible_fields(&self) -> Vec<String> {
        self.rules.iter().flat_map(Rule::visible_fields).collect()
    }

    /// Remove form fields and inline lists the rules never render.
    pub fn prune(&self, form: &mut FormSpec) {
        let visible = self.visible_fields();
        let missing: Vec<String> = form.names().into_iter().filter(|n| !visible.contains(n)).collect();
        if !missing.is_empty() {
            tracing::warn!(fields = %missing.join(","), "fields missing from ruleset");
            form.remove(&missing);
        }
    }

    pub fn render(&self, ctx: &dyn RenderContext, form: &BoundForm) -> Result<String, RenderError> {
        let parts: Result<Vec<String>, RenderError> = self.rules.iter().map(|r| r.render(ctx, form)).collect();
        Ok(parts?.concat())
    }

    pub fn layout(&self) -> Value {
        serde_json::to_value(&self.rules).unwrap_or_default()
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Default render context producing plain HTML with the `lib.*` macros.
#[derive(Clone)]
pub struct HtmlMacros {
    macros: HashMap<String, MacroFn>,
}

impl Default for HtmlMacros {
    fn default() -> Self {
        let mut m = HtmlMacros {
            macros: HashMap::new(),
        };
        m.register(FIELD_MACRO, |c| c.field.map(render_field).unwrap_or_default());
        m.register(HEADER_MACRO, |c| format!("<h3>{}</h3>", escape_html(c.arg_str("text").unwrap_or(""))));
        m.register(ROW_MACRO, |c| {
            format!("<div class=\"form-row\">{}</div>", c.caller.as_deref().unwrap_or(""))
        });
        m.register(INLINE_MACRO, |c| c.inline.map(render_inline).unwrap_or_default());
        m
    }
}

impl HtmlMacros {
    pub fn new() -> Self {
        HtmlMacros::default()
    }

    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&MacroCall<'_>) -> String + Send + Sync + 'static,
    {
        self.macros.insert(name.to_string(), Arc::new(f));
        self
    }
}

impl RenderContext for HtmlMacros {
    fn resolve(&self, name: &str) -> Option<&MacroFn> {
        self.macros.get(name)
    }
}

fn render_input(id: &str, field: &BoundField) -> String {
    let value = escape_html(&field.raw);
    let required = if field.field.required { " required" } else { "" };
    match &field.field.kind {
        FieldKind::Hidden { .. } => format!("<input type=\"hidden\" id=\"{id}\" name=\"{id}\" value=\"{value}\">"),
        FieldKind::TextArea | FieldKind::Json => {
            format!("<textarea id=\"{id}\" name=\"{id}\"{required}>{value}</textarea>")
        }
        FieldKind::Boolean => {
            let checked = if field.value == Value::Bool(true) { " checked" } else { "" };
            format!("<input type=\"checkbox\" id=\"{id}\" name=\"{id}\" value=\"y\"{checked}>")
        }
        FieldKind::Select { choices } => render_select(id, field, choices, required),
        FieldKind::Relation { ajax: true, target, .. } => format!(
            "<input type=\"hidden\" id=\"{id}\" name=\"{id}\" value=\"{value}\" data-role=\"select2-ajax\" data-target=\"{}\">",
            escape_html(target)
        ),
        FieldKind::Relation { .. } => {
            render_select(id, field, field.options.as_deref().unwrap_or(&[]), required)
        }
        kind => {
            let input_type = match kind {
                FieldKind::Integer | FieldKind::Decimal => "number",
                FieldKind::Date => "date",
                FieldKind::DateTime => "datetime-local",
                FieldKind::Time => "time",
                _ => "text",
            };
            format!("<input type=\"{input_type}\" id=\"{id}\" name=\"{id}\" value=\"{value}\"{required}>")
        }
    }
}

fn render_select(id: &str, field: &BoundField, choices: &[(String, String)], required: &str) -> String {
    let mut out = format!("<select id=\"{id}\" name=\"{id}\"{required}>");
    if !field.field.required {
        out.push_str("<option value=\"\"></option>");
    }
    for (value, label) in choices {
        let selected = if *value == field.raw { " selected" } else { "" };
        out.push_str(&format!(
            "<option value=\"{}\"{selected}>{}</option>",
            escape_html(value),
            escape_html(label)
        ));
    }
    out.push_str("</select>");
    out
}

fn render_field_as(id: &str, field: &BoundField) -> String {
    if field.field.kind.is_hidden() {
        return render_input(id, field);
    }
    let class = if field.errors.is_empty() { "form-group" } else { "form-group has-error" };
    let mut out = format!(
        "<div class=\"{class}\"><label for=\"{id}\">{}{}</label>",
        escape_html(&field.field.label),
        if field.field.required { " *" } else { "" }
    );
    out.push_str(&render_input(id, field));
    if let Some(d) = &field.field.description {
        out.push_str(&format!("<p class=\"help-block\">{}</p>", escape_html(d)));
    }
    for e in &field.errors {
        out.push_str(&format!("<p class=\"error\">{}</p>", escape_html(e)));
    }
    out.push_str("</div>");
    out
}

fn render_field(field: &BoundField) -> String {
    render_field_as(&field.field.name, field)
}

fn render_inline(inline: &BoundInline) -> String {
    let mut out = format!(
        "<div class=\"inline-field\" id=\"{}\"><h4>{}</h4>",
        escape_html(&inline.name),
        escape_html(&inline.label)
    );
    for entry in &inline.entries {
        out.push_str("<div class=\"inline-field-entry\">");
        for f in &entry.fields {
            out.push_str(&render_field_as(&format!("{}-{}-{}", inline.name, entry.index, f.field.name), f));
        }
        if entry.pk.is_some() {
            out.push_str(&format!(
                "<input type=\"checkbox\" name=\"del-{}-{}\" value=\"y\"> Delete?",
                inline.name, entry.index
            ));
        }
        out.push_str("</div>");
    }
    out.push_str("</div>");
    out
}
