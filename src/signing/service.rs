//! Batch signing over a row store.
//!
//! # Responsibilities
//! - Verify every row of a table and report which ones fail
//! - (Re)sign rows, optionally only those without a signature
//! - Single-row variants selected by a structured filter
//!
//! Rows are processed one after another; RSA signing is CPU bound and the
//! batch size is bounded by `UpdateOptions::limit`.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::observability::metrics::record_signature_check;
use crate::signing::signer::{RecordSigner, SignatureError};
use crate::signing::store::{Row, RowFilter, RowStore};

/// Result of verifying a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub total: usize,
    pub verified: usize,
    pub unverified: usize,
    /// Primary keys of the rows that failed verification.
    pub list: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Only sign rows whose signature column is empty.
    pub just_empty: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateReport {
    pub selected: usize,
    pub updated: u64,
}

pub struct SignatureService {
    signer: Arc<RecordSigner>,
    store: Arc<dyn RowStore>,
}

impl SignatureService {
    pub fn new(signer: Arc<RecordSigner>, store: Arc<dyn RowStore>) -> Self {
        Self { signer, store }
    }

    pub fn signer(&self) -> &RecordSigner {
        &self.signer
    }

    pub fn check_all(&self, table: &str) -> Result<CheckReport, SignatureError> {
        self.ensure_allowed(table)?;
        let rows = self
            .store
            .select(table, &self.columns(table), &RowFilter::All, None)?;

        let mut report = CheckReport {
            total: rows.len(),
            ..CheckReport::default()
        };
        for row in rows {
            let key = self.primary_key_of(&row);
            if self.verify_row(table, row)? {
                report.verified += 1;
            } else {
                report.unverified += 1;
                report.list.push(key);
            }
        }
        Ok(report)
    }

    pub fn update_all(&self, table: &str, options: UpdateOptions) -> Result<UpdateReport, SignatureError> {
        self.ensure_allowed(table)?;
        let filter = if options.just_empty {
            RowFilter::Empty(self.signer.signature_column().to_string())
        } else {
            RowFilter::All
        };
        let rows = self
            .store
            .select(table, &self.columns(table), &filter, options.limit)?;

        let mut report = UpdateReport {
            selected: rows.len(),
            updated: 0,
        };
        for row in rows {
            report.updated += self.sign_row(table, row)?;
        }
        tracing::info!(
            table,
            selected = report.selected,
            updated = report.updated,
            "Signatures updated"
        );
        Ok(report)
    }

    /// Verify the first row matching `filter`; `None` when nothing matches.
    pub fn check_one(&self, table: &str, filter: &RowFilter) -> Result<Option<bool>, SignatureError> {
        self.ensure_allowed(table)?;
        let row = self
            .store
            .select(table, &self.columns(table), filter, Some(1))?
            .into_iter()
            .next();
        row.map(|row| self.verify_row(table, row)).transpose()
    }

    /// Sign the first row matching `filter`. Returns whether a row was signed.
    pub fn update_one(&self, table: &str, filter: &RowFilter) -> Result<bool, SignatureError> {
        self.ensure_allowed(table)?;
        let row = self
            .store
            .select(table, &self.columns(table), filter, Some(1))?
            .into_iter()
            .next();
        match row {
            Some(row) => Ok(self.sign_row(table, row)? > 0),
            None => Ok(false),
        }
    }

    fn ensure_allowed(&self, table: &str) -> Result<(), SignatureError> {
        if self.signer.is_allowed(table) {
            Ok(())
        } else {
            Err(SignatureError::TableNotAllowed(table.to_string()))
        }
    }

    fn columns<'a>(&'a self, table: &str) -> Vec<&'a str> {
        let mut columns = self.signer.signable_fields(table);
        columns.push(self.signer.signature_column());
        columns
    }

    fn primary_key_of(&self, row: &Row) -> Value {
        row.get(self.signer.primary_key()).cloned().unwrap_or(Value::Null)
    }

    fn verify_row(&self, table: &str, row: Row) -> Result<bool, SignatureError> {
        let verified = self.signer.verify_record(table, &Value::Object(row))?;
        record_signature_check(verified);
        Ok(verified)
    }

    fn sign_row(&self, table: &str, row: Row) -> Result<u64, SignatureError> {
        let key = self.primary_key_of(&row);
        let signature = self.signer.sign(table, &Value::Object(row))?;

        let mut values = Map::new();
        values.insert(self.signer.signature_column().to_string(), Value::String(signature));
        let filter = RowFilter::Eq {
            column: self.signer.primary_key().to_string(),
            value: key,
        };
        Ok(self.store.update(table, &values, &filter)?)
    }
}
