//! Document model, query model and the backend client contract.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use twinchat_common::{AppError, AppResult, Region};

/// A stored record: a JSON object with a string `id` field.
pub type Document = serde_json::Map<String, Value>;

/// Comparison operator of a field filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    /// SQL operator for `jsonb` comparisons.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "IS DISTINCT FROM",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Wire name used by the document API.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }

    /// Evaluate the operator against a field value. Missing fields compare
    /// as `null`; values of different JSON types never order.
    #[must_use]
    pub fn matches(self, field: Option<&Value>, operand: &Value) -> bool {
        let field = field.unwrap_or(&Value::Null);
        let ordering = compare_values(field, operand);
        match self {
            Self::Eq => ordering == Some(Ordering::Equal),
            Self::Ne => ordering != Some(Ordering::Equal),
            Self::Gt => ordering == Some(Ordering::Greater),
            Self::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            Self::Lt => ordering == Some(Ordering::Less),
            Self::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

/// Order two JSON scalars of the same type.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// A single `field <op> value` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Single-field ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

/// Conjunction of filters with optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<u64>,
}

impl Query {
    /// Empty query matching every document of a collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn filter(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    #[must_use]
    pub fn ne(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Ne, value)
    }

    #[must_use]
    pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Gt, value)
    }

    #[must_use]
    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Gte, value)
    }

    #[must_use]
    pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Lt, value)
    }

    #[must_use]
    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Lte, value)
    }

    /// Sort ascending by a field.
    #[must_use]
    pub fn order_asc(mut self, field: &str) -> Self {
        self.order = Some(Order {
            field: field.to_string(),
            direction: Direction::Asc,
        });
        self
    }

    /// Sort descending by a field.
    #[must_use]
    pub fn order_desc(mut self, field: &str) -> Self {
        self.order = Some(Order {
            field: field.to_string(),
            direction: Direction::Desc,
        });
        self
    }

    /// Cap the number of returned documents.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document satisfies every filter.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|f| f.op.matches(doc.get(&f.field), &f.value))
    }
}

/// Uniform CRUD handle over one region's store.
///
/// Every driver surfaces failures as [`AppError::Storage`] carrying the
/// driver's message, and duplicate ids on insert as [`AppError::Conflict`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Region this store serves.
    fn region(&self) -> Region;

    /// Fetch a document by id.
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>>;

    /// Fetch documents matching a query.
    async fn query(&self, collection: &str, query: &Query) -> AppResult<Vec<Document>>;

    /// Insert a new document. The document must carry a string `id`.
    async fn insert(&self, collection: &str, doc: Document) -> AppResult<Document>;

    /// Shallow-merge `patch` into an existing document.
    /// Returns `None` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, patch: Document)
    -> AppResult<Option<Document>>;

    /// Atomically add `delta` to an integer field (missing counts as 0).
    /// Returns the updated document, or `None` when it does not exist.
    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> AppResult<Option<Document>>;

    /// Delete a document. Returns whether a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool>;
}

/// Extract the mandatory `id` of a document.
pub fn document_id(doc: &Document) -> AppResult<&str> {
    doc.get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest("document is missing a string id".to_string()))
}

/// Serialize a record into a document.
pub fn to_document<T: Serialize>(record: &T) -> AppResult<Document> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Internal(format!(
            "record serialized to a non-object: {other}"
        ))),
    }
}

/// Deserialize a document into a record.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> AppResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Build a patch document from a `json!` object literal.
#[must_use]
pub fn patch(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_op_numbers() {
        assert!(FilterOp::Gt.matches(Some(&json!(10)), &json!(5)));
        assert!(!FilterOp::Gt.matches(Some(&json!(5)), &json!(5)));
        assert!(FilterOp::Gte.matches(Some(&json!(5)), &json!(5)));
        assert!(FilterOp::Lt.matches(Some(&json!(1.5)), &json!(2)));
    }

    #[test]
    fn test_missing_field_is_null() {
        assert!(FilterOp::Eq.matches(None, &Value::Null));
        assert!(!FilterOp::Eq.matches(None, &json!(false)));
        assert!(FilterOp::Ne.matches(None, &json!("x")));
        assert!(!FilterOp::Gt.matches(None, &json!(0)));
    }

    #[test]
    fn test_mixed_types_never_order() {
        assert!(!FilterOp::Lt.matches(Some(&json!("1")), &json!(2)));
        assert!(FilterOp::Ne.matches(Some(&json!("1")), &json!(1)));
    }

    #[test]
    fn test_query_matches_conjunction() {
        let doc = patch(json!({"id": "a", "email": "x@y.z", "verified": false, "attempts": 2}));
        let query = Query::new()
            .eq("email", "x@y.z")
            .eq("verified", false)
            .lt("attempts", 5);
        assert!(query.matches(&doc));
        assert!(!query.eq("attempts", 3).matches(&doc));
    }

    #[test]
    fn test_document_id() {
        assert_eq!(document_id(&patch(json!({"id": "d1"}))).ok(), Some("d1"));
        assert!(document_id(&patch(json!({"id": 1}))).is_err());
    }
}
