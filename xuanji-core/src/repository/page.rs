use serde::Serialize;

use crate::cache::fingerprint;
use crate::store::Value;

/// Ordering and slicing for `find_all`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Option<String>,
}

impl PageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub(crate) fn fingerprint(&self) -> String {
        fingerprint([
            opt_to_string(&self.limit),
            opt_to_string(&self.offset),
            self.order_by.clone().unwrap_or_default(),
        ])
    }
}

/// A SQL predicate with positional arguments, plus optional ordering and
/// slicing.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Boolean expression with `?` placeholders.
    pub clause: String,
    pub args: Vec<Value>,
    pub order_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Filter {
    pub fn new(clause: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            clause: clause.into(),
            args,
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Identifies the predicate and its arguments. Ordering and slicing are
    /// not part of it; callers that cache sliced results add those.
    pub(crate) fn fingerprint(&self) -> String {
        let mut parts = vec![self.clause.clone()];
        parts.extend(self.args.iter().map(|v| format!("{}:{}", v.kind(), v)));
        fingerprint(parts)
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: u32,
    pub has_next: bool,
}

impl<T> PagedResult<T> {
    pub(crate) fn new(items: Vec<T>, page: u32, page_size: u32, total: i64) -> Self {
        let size = i64::from(page_size.max(1));
        let total_pages = ((total.max(0) + size - 1) / size) as u32;
        Self {
            items,
            page,
            page_size,
            total,
            total_pages,
            has_next: page < total_pages,
        }
    }
}

fn opt_to_string(v: &Option<i64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paged_result_totals() {
        let page = PagedResult::new(vec![1, 2], 1, 2, 5);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);

        let last = PagedResult::new(vec![5], 3, 2, 5);
        assert!(!last.has_next);

        let empty: PagedResult<i32> = PagedResult::new(vec![], 1, 10, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }

    #[test]
    fn test_filter_fingerprint_tracks_argument_types() {
        let a = Filter::new("hexagram_id = ?", vec![Value::Integer(1)]);
        let b = Filter::new("hexagram_id = ?", vec![Value::Text("1".into())]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().order_by("id").fingerprint());
    }

    #[test]
    fn test_page_request_fingerprint() {
        let a = PageRequest::new().limit(10);
        let b = PageRequest::new().limit(10).offset(10);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
