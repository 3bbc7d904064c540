//! List filters: operators per column kind, URL argument parsing, and in-memory evaluation.
//! SQL translation lives in `sql::builder`.

mod eval;
mod parse;

pub use eval::{compare_values, matches_filters, matches_search};
pub use parse::{parse_filter_args, parse_temporal};

use crate::config::ColumnKind;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equal,
    NotEqual,
    Like,
    NotLike,
    Greater,
    Smaller,
    Between,
    NotBetween,
    InList,
    NotInList,
    Empty,
}

impl FilterOp {
    /// Operation label shown next to the filter's column name.
    pub fn label(&self) -> &'static str {
        match self {
            FilterOp::Equal => "equals",
            FilterOp::NotEqual => "not equal",
            FilterOp::Like => "contains",
            FilterOp::NotLike => "not contains",
            FilterOp::Greater => "greater than",
            FilterOp::Smaller => "smaller than",
            FilterOp::Between => "between",
            FilterOp::NotBetween => "not between",
            FilterOp::InList => "in list",
            FilterOp::NotInList => "not in list",
            FilterOp::Empty => "empty",
        }
    }

    /// Slug used by named filter URLs (`flt0_title_contains`).
    pub fn slug(&self) -> &'static str {
        match self {
            FilterOp::Equal => "equals",
            FilterOp::NotEqual => "not_equal",
            FilterOp::Like => "contains",
            FilterOp::NotLike => "not_contains",
            FilterOp::Greater => "greater_than",
            FilterOp::Smaller => "smaller_than",
            FilterOp::Between => "between",
            FilterOp::NotBetween => "not_between",
            FilterOp::InList => "in_list",
            FilterOp::NotInList => "not_in_list",
            FilterOp::Empty => "empty",
        }
    }
}

/// One selectable filter: a column paired with an operator.
#[derive(Clone, Debug, Serialize)]
pub struct ColumnFilter {
    pub column: String,
    pub label: String,
    pub op: FilterOp,
    pub kind: ColumnKind,
    /// Fixed `(value, label)` choices (booleans, enums, empty flag).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<(String, String)>>,
}

impl ColumnFilter {
    pub fn operation(&self) -> &'static str {
        self.op.label()
    }

    /// Key suffix after `flt{pos}_`: the filter's index, or `{column}_{op}` for named URLs.
    pub fn url_key(&self, index: usize, named: bool) -> String {
        if named {
            format!("{}_{}", self.column, self.op.slug())
        } else {
            index.to_string()
        }
    }
}

/// A cleaned filter argument.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Scalar(Value),
    Range(Value, Value),
    List(Vec<Value>),
    /// `true`: column is null; `false`: column is not null.
    IsEmpty(bool),
}

/// A filter chosen in the request, in URL position order.
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedFilter {
    pub index: usize,
    pub column: String,
    pub kind: ColumnKind,
    pub op: FilterOp,
    pub value: FilterValue,
    pub raw: String,
}

/// Case-insensitive match term: `^x` starts with, `=x` exact, otherwise contains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LikeTerm {
    Contains(String),
    StartsWith(String),
    Exact(String),
}

impl LikeTerm {
    pub fn parse(term: &str) -> LikeTerm {
        if let Some(rest) = term.strip_prefix('^') {
            LikeTerm::StartsWith(rest.to_string())
        } else if let Some(rest) = term.strip_prefix('=') {
            LikeTerm::Exact(rest.to_string())
        } else {
            LikeTerm::Contains(term.to_string())
        }
    }

    /// ILIKE pattern with `%`, `_` and `\` escaped in the user part.
    pub fn sql_pattern(&self) -> String {
        let escape = |s: &str| s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        match self {
            LikeTerm::Contains(s) => format!("%{}%", escape(s)),
            LikeTerm::StartsWith(s) => format!("{}%", escape(s)),
            LikeTerm::Exact(s) => escape(s),
        }
    }

    pub fn matches(&self, haystack: &str) -> bool {
        let haystack = haystack.to_lowercase();
        match self {
            LikeTerm::Contains(s) => haystack.contains(&s.to_lowercase()),
            LikeTerm::StartsWith(s) => haystack.starts_with(&s.to_lowercase()),
            LikeTerm::Exact(s) => haystack == s.to_lowercase(),
        }
    }
}

/// Search across columns: every term must match at least one column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchQuery {
    pub columns: Vec<String>,
    pub terms: Vec<LikeTerm>,
}

impl SearchQuery {
    /// `None` when there is nothing to search for.
    pub fn new(columns: &[String], search: &str) -> Option<SearchQuery> {
        let terms: Vec<LikeTerm> = search.split_whitespace().map(LikeTerm::parse).collect();
        if columns.is_empty() || terms.is_empty() {
            return None;
        }
        Some(SearchQuery {
            columns: columns.to_vec(),
            terms,
        })
    }
}

fn yes_no() -> Vec<(String, String)> {
    vec![("1".into(), "Yes".into()), ("0".into(), "No".into())]
}

/// Filters offered for a column, by kind. Json columns get none.
pub fn filters_for_column(column: &str, label: &str, kind: ColumnKind, enum_values: &[String]) -> Vec<ColumnFilter> {
    use FilterOp::*;
    let ops: &[FilterOp] = match kind {
        ColumnKind::String | ColumnKind::Text => &[Like, NotLike, Equal, NotEqual, Empty, InList, NotInList],
        ColumnKind::Integer | ColumnKind::Float => &[Equal, NotEqual, Greater, Smaller, Empty, InList, NotInList],
        ColumnKind::Uuid => &[Equal, NotEqual, Empty, InList, NotInList],
        ColumnKind::Date | ColumnKind::DateTime | ColumnKind::Time => {
            &[Equal, NotEqual, Greater, Smaller, Between, NotBetween, Empty]
        }
        ColumnKind::Boolean => &[Equal, NotEqual],
        ColumnKind::Enum => &[Equal, NotEqual, Empty, InList, NotInList],
        ColumnKind::Json => &[],
    };
    ops.iter()
        .map(|op| {
            let options = match (kind, op) {
                (_, Empty) | (ColumnKind::Boolean, _) => Some(yes_no()),
                (ColumnKind::Enum, Equal | NotEqual) => {
                    Some(enum_values.iter().map(|v| (v.clone(), v.clone())).collect())
                }
                _ => None,
            };
            ColumnFilter {
                column: column.to_string(),
                label: label.to_string(),
                op: *op,
                kind,
                options,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_terms() {
        assert_eq!(LikeTerm::parse("^ab"), LikeTerm::StartsWith("ab".into()));
        assert_eq!(LikeTerm::parse("=ab"), LikeTerm::Exact("ab".into()));
        assert_eq!(LikeTerm::parse("a%b").sql_pattern(), "%a\\%b%");
        assert!(LikeTerm::parse("ELL").matches("hello"));
        assert!(!LikeTerm::parse("^ell").matches("hello"));
        assert!(LikeTerm::parse("=Hello").matches("hello"));
    }

    #[test]
    fn converter_by_kind() {
        let text = filters_for_column("title", "Title", ColumnKind::String, &[]);
        assert_eq!(text[0].op, FilterOp::Like);
        assert_eq!(text.len(), 7);

        let flag = filters_for_column("active", "Active", ColumnKind::Boolean, &[]);
        assert_eq!(flag.len(), 2);
        assert_eq!(flag[0].options.as_ref().unwrap()[0], ("1".to_string(), "Yes".to_string()));

        let dates = filters_for_column("born", "Born", ColumnKind::Date, &[]);
        assert!(dates.iter().any(|f| f.op == FilterOp::Between));

        assert!(filters_for_column("meta", "Meta", ColumnKind::Json, &[]).is_empty());
    }

    #[test]
    fn search_needs_terms_and_columns() {
        assert!(SearchQuery::new(&["title".into()], "   ").is_none());
        assert!(SearchQuery::new(&[], "x").is_none());
        let q = SearchQuery::new(&["title".into()], "foo ^bar").unwrap();
        assert_eq!(q.terms.len(), 2);
    }
}
