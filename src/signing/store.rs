//! Row store collaborator.
//!
//! The signing service reads and writes rows through [`RowStore`]. Filters
//! are structured values; nothing is ever interpolated into a query string.

use dashmap::DashMap;
use serde_json::{Map, Value};

/// One row, column name to value.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    All,
    Eq { column: String, value: Value },
    /// Column is missing, null or an empty string.
    Empty(String),
    And(Vec<RowFilter>),
}

impl RowFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        RowFilter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::Eq { column, value } => row.get(column) == Some(value),
            RowFilter::Empty(column) => match row.get(column) {
                None | Some(Value::Null) => true,
                Some(Value::String(text)) => text.is_empty(),
                Some(_) => false,
            },
            RowFilter::And(filters) => filters.iter().all(|f| f.matches(row)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("row store unavailable: {0}")]
    Unavailable(String),
}

pub trait RowStore: Send + Sync {
    /// Rows matching `filter`, projected to `columns` (all columns when
    /// empty), at most `limit` of them.
    fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: &RowFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError>;

    /// Set `values` on every matching row. Returns the number of rows hit.
    fn update(&self, table: &str, values: &Row, filter: &RowFilter) -> Result<u64, StoreError>;
}

/// In-process row store.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: DashMap<String, Vec<Row>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: &str, row: Row) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    /// Snapshot of a table.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .get(table)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }
}

impl RowStore for MemoryRowStore {
    fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: &RowFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        let rows = self
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(rows
            .iter()
            .filter(|row| filter.matches(row))
            .take(limit.unwrap_or(usize::MAX))
            .map(|row| project(row, columns))
            .collect())
    }

    fn update(&self, table: &str, values: &Row, filter: &RowFilter) -> Result<u64, StoreError> {
        let mut rows = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let mut updated = 0;
        for row in rows.iter_mut().filter(|row| filter.matches(row)) {
            for (column, value) in values {
                row.insert(column.clone(), value.clone());
            }
            updated += 1;
        }
        Ok(updated)
    }
}

fn project(row: &Row, columns: &[&str]) -> Row {
    if columns.is_empty() {
        return row.clone();
    }
    columns
        .iter()
        .filter_map(|column| row.get(*column).map(|value| (column.to_string(), value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn store() -> MemoryRowStore {
        let store = MemoryRowStore::new();
        store.insert("users", row(json!({"id": 1, "name": "a", "signature": null})));
        store.insert("users", row(json!({"id": 2, "name": "b", "signature": "xyz"})));
        store.insert("users", row(json!({"id": 3, "name": "c", "signature": ""})));
        store
    }

    #[test]
    fn test_select_filters_projects_and_limits() {
        let store = store();
        let empty = store
            .select("users", &["id"], &RowFilter::Empty("signature".to_string()), None)
            .unwrap();
        assert_eq!(empty, vec![row(json!({"id": 1})), row(json!({"id": 3}))]);

        let limited = store.select("users", &[], &RowFilter::All, Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].get("name"), Some(&json!("a")));
    }

    #[test]
    fn test_update_matching_rows() {
        let store = store();
        let values = row(json!({"signature": "new"}));
        assert_eq!(store.update("users", &values, &RowFilter::eq("id", 2)).unwrap(), 1);
        assert_eq!(store.rows("users")[1].get("signature"), Some(&json!("new")));
    }

    #[test]
    fn test_unknown_table() {
        assert!(matches!(
            MemoryRowStore::new().select("nope", &[], &RowFilter::All, None),
            Err(StoreError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_and_filter() {
        let filter = RowFilter::And(vec![RowFilter::eq("name", "c"), RowFilter::Empty("signature".into())]);
        assert_eq!(store().select("users", &["id"], &filter, None).unwrap(), vec![row(json!({"id": 3}))]);
    }
}
