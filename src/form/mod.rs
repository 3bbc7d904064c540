//! Scaffolded forms: field definitions, binding, validation, layout rules and inline models.

mod bound;
mod convert;
mod data;
mod field;
pub mod inline;
pub mod rules;
mod validation;

pub use bound::{BoundField, BoundForm, BoundInline, InlineEntry};
pub use convert::{scaffold_form, FormOptions};
pub use data::FormData;
pub use field::{raw_of, FieldKind, FormField, FormSpec};
pub use inline::{plan_changes, InlineFormSpec, InlineModelConverter};
pub use rules::{HtmlMacros, MacroCall, RenderContext, Rule, RuleSet};
pub use validation::validate_value;
