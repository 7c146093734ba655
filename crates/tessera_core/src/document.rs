//! Documents, filters and pagination.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A stored entity: a JSON object with an `id` field.
pub type Document = Map<String, Value>;

/// Field holding the document identifier.
pub const ID_FIELD: &str = "id";

/// Field holding the creation timestamp.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Field holding the last-update timestamp.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Returns the document identifier, if present and a string.
#[must_use]
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Resolves a dotted field path (`version.title`) inside a document.
#[must_use]
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Shallow-merges `patch` into `target`; `id` is never overwritten.
pub fn merge(target: &mut Document, patch: &Document) {
    for (key, value) in patch {
        if key == ID_FIELD {
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

/// Returns the current UTC time as an RFC 3339 string.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Filter over documents.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Where {
    /// Matches every document.
    #[default]
    All,
    /// Field equals value.
    Equals(String, Value),
    /// Field is missing or differs from value.
    NotEquals(String, Value),
    /// Field equals one of the values.
    In(String, Vec<Value>),
    /// Field presence (`true`) or absence (`false`).
    Exists(String, bool),
    /// Every clause matches.
    And(Vec<Where>),
    /// At least one clause matches.
    Or(Vec<Where>),
}

impl Where {
    /// Shorthand for [`Where::Equals`].
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals(field.into(), value.into())
    }

    /// Shorthand for matching a document id.
    pub fn id(id: impl Into<String>) -> Self {
        Self::Equals(ID_FIELD.to_string(), Value::String(id.into()))
    }

    /// Combines two filters with `And`, flattening nested `And`s and dropping `All`.
    #[must_use]
    pub fn and(self, other: Where) -> Self {
        match (self, other) {
            (Self::All, w) | (w, Self::All) => w,
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), w) | (w, Self::And(mut a)) => {
                a.push(w);
                Self::And(a)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    /// Returns true if the document satisfies the filter.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Equals(field, value) => lookup(doc, field) == Some(value),
            Self::NotEquals(field, value) => lookup(doc, field) != Some(value),
            Self::In(field, values) => {
                lookup(doc, field).is_some_and(|found| values.contains(found))
            }
            Self::Exists(field, expected) => {
                let present = lookup(doc, field).is_some_and(|v| !v.is_null());
                present == *expected
            }
            Self::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
            Self::Or(clauses) => clauses.iter().any(|c| c.matches(doc)),
        }
    }
}

/// Sort order for `find`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Dotted field path.
    pub field: String,
    /// Descending when true.
    pub descending: bool,
}

impl Sort {
    /// Ascending sort on a field.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending sort on a field.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ordering = compare_values(lookup(a, &self.field), lookup(b, &self.field));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Orders missing/null first, then booleans, numbers, strings; other kinds compare equal.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Filter, sort and page selection for `find`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    /// Documents must match this filter.
    pub filter: Where,
    /// Optional sort.
    pub sort: Option<Sort>,
    /// Page size; `None` returns every match on one page.
    pub limit: Option<usize>,
    /// One-based page number.
    pub page: Option<usize>,
}

impl Query {
    /// Matches every document.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches documents satisfying `filter`.
    #[must_use]
    pub fn filter(filter: Where) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Sets the sort.
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the one-based page number.
    #[must_use]
    pub fn page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }
}

/// One page of `find` results.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedDocs {
    /// Documents on this page.
    pub docs: Vec<Document>,
    /// Number of matches across all pages.
    pub total_docs: usize,
    /// Page size used.
    pub limit: usize,
    /// One-based page number.
    pub page: usize,
    /// Number of pages.
    pub total_pages: usize,
    /// Whether a later page exists.
    pub has_next_page: bool,
    /// Whether an earlier page exists.
    pub has_prev_page: bool,
}

impl PaginatedDocs {
    /// Sorts and pages already-filtered matches.
    #[must_use]
    pub fn paginate(mut matches: Vec<Document>, query: &Query) -> Self {
        if let Some(sort) = &query.sort {
            matches.sort_by(|a, b| sort.compare(a, b));
        }

        let total_docs = matches.len();
        let limit = query.limit.filter(|l| *l > 0).unwrap_or(total_docs.max(1));
        let page = query.page.unwrap_or(1).max(1);
        let total_pages = total_docs.div_ceil(limit).max(1);

        let docs = matches
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        Self {
            docs,
            total_docs,
            limit,
            page,
            total_pages,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn lookup_dotted_paths() {
        let d = doc(json!({"version": {"title": "Hello"}, "id": "1"}));
        assert_eq!(lookup(&d, "version.title"), Some(&json!("Hello")));
        assert_eq!(lookup(&d, "version.missing"), None);
        assert_eq!(document_id(&d), Some("1"));
    }

    #[test]
    fn where_clauses() {
        let d = doc(json!({"status": "draft", "views": 3, "tags": null}));

        assert!(Where::All.matches(&d));
        assert!(Where::eq("status", "draft").matches(&d));
        assert!(Where::NotEquals("status".into(), json!("published")).matches(&d));
        assert!(Where::In("views".into(), vec![json!(1), json!(3)]).matches(&d));
        assert!(Where::Exists("tags".into(), false).matches(&d));
        assert!(Where::Exists("views".into(), true).matches(&d));
        assert!(Where::eq("status", "draft")
            .and(Where::eq("views", 3))
            .matches(&d));
        assert!(Where::Or(vec![Where::eq("status", "x"), Where::eq("views", 3)]).matches(&d));
        assert!(!Where::eq("status", "published").matches(&d));
    }

    #[test]
    fn and_flattens() {
        let w = Where::All.and(Where::eq("a", 1)).and(Where::eq("b", 2));
        assert_eq!(w, Where::And(vec![Where::eq("a", 1), Where::eq("b", 2)]));
    }

    #[test]
    fn merge_keeps_id() {
        let mut target = doc(json!({"id": "1", "title": "old"}));
        merge(&mut target, &doc(json!({"id": "2", "title": "new"})));
        assert_eq!(target, doc(json!({"id": "1", "title": "new"})));
    }

    #[test]
    fn paginate_sorted_pages() {
        let docs: Vec<Document> = (1..=5).map(|i| doc(json!({ "n": i }))).collect();
        let query = Query::all().sort(Sort::desc("n")).limit(2).page(2);

        let page = PaginatedDocs::paginate(docs, &query);
        assert_eq!(page.total_docs, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.docs, vec![doc(json!({"n": 3})), doc(json!({"n": 2}))]);
        assert!(page.has_next_page);
        assert!(page.has_prev_page);
    }

    #[test]
    fn paginate_without_limit_returns_everything() {
        let docs: Vec<Document> = (1..=3).map(|i| doc(json!({ "n": i }))).collect();
        let page = PaginatedDocs::paginate(docs, &Query::all());
        assert_eq!(page.docs.len(), 3);
        assert_eq!(page.total_pages, 1);
        assert!(!page.has_next_page);
    }

    #[test]
    fn paginate_empty() {
        let page = PaginatedDocs::paginate(Vec::new(), &Query::all());
        assert_eq!(page.total_docs, 0);
        assert_eq!(page.limit, 1);
        assert_eq!(page.total_pages, 1);
    }
}
