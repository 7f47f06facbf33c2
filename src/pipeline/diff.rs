//! Content equivalence between a downloaded dataset and the persisted copy.
//!
//! Two datasets are equal when they have the same shape and every cell,
//! after normalization, matches position by position. Column names are not
//! compared, so a renamed header alone does not count as a change.
//!
//! Normalization per column kind:
//! - numeric: fixed 5-decimal string, missing as ""
//! - date/time: ISO-8601, missing as ""
//! - text: trimmed string, missing tokens as ""

use crate::error::{AppError, Result};
use crate::models::{Cell, ColumnKind, DATETIME_FORMAT, TabularDataset, is_missing_token};

/// Mismatching rows written to the debug log per comparison.
pub const DEFAULT_MISMATCH_LOG_LIMIT: usize = 3;

/// Outcome of comparing a candidate against a reference dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// No persisted copy exists
    NoReference,
    RowCountMismatch { reference: usize, candidate: usize },
    ColumnCountMismatch { reference: usize, candidate: usize },
    /// Same shape, at least one row differs
    Different { first_row: usize },
    /// Normalization failed; treated as changed
    Failed { reason: String },
    Equal,
}

impl Comparison {
    pub fn is_equal(&self) -> bool {
        matches!(self, Comparison::Equal)
    }
}

/// Compares tabular datasets after type-aware normalization.
#[derive(Debug, Clone)]
pub struct DatasetDiffer {
    mismatch_log_limit: usize,
}

impl Default for DatasetDiffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetDiffer {
    pub fn new() -> Self {
        Self {
            mismatch_log_limit: DEFAULT_MISMATCH_LOG_LIMIT,
        }
    }

    /// Set how many mismatching rows are logged. Does not affect the result.
    pub fn with_mismatch_log_limit(limit: usize) -> Self {
        Self {
            mismatch_log_limit: limit,
        }
    }

    /// `true` only if `reference` exists and matches `candidate`.
    pub fn is_equal(&self, candidate: &TabularDataset, reference: Option<&TabularDataset>) -> bool {
        self.compare(candidate, reference).is_equal()
    }

    /// Compare and report why the datasets differ.
    pub fn compare(
        &self,
        candidate: &TabularDataset,
        reference: Option<&TabularDataset>,
    ) -> Comparison {
        let Some(reference) = reference else {
            log::info!("No existing data, treating as changed");
            return Comparison::NoReference;
        };

        log::debug!(
            "Existing shape: {}x{}, new shape: {}x{}",
            reference.row_count(),
            reference.column_count(),
            candidate.row_count(),
            candidate.column_count()
        );

        if reference.row_count() != candidate.row_count() {
            log::info!(
                "Row count mismatch: existing {}, new {}",
                reference.row_count(),
                candidate.row_count()
            );
            return Comparison::RowCountMismatch {
                reference: reference.row_count(),
                candidate: candidate.row_count(),
            };
        }

        if reference.column_count() != candidate.column_count() {
            log::info!(
                "Column count mismatch: existing {}, new {}",
                reference.column_count(),
                candidate.column_count()
            );
            return Comparison::ColumnCountMismatch {
                reference: reference.column_count(),
                candidate: candidate.column_count(),
            };
        }

        let (existing, new) = match (normalize(reference), normalize(candidate)) {
            (Ok(existing), Ok(new)) => (existing, new),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Error comparing data: {}", e);
                return Comparison::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let mut first_row = None;
        let mut logged = 0;
        for (index, (existing_row, new_row)) in existing.iter().zip(new.iter()).enumerate() {
            if existing_row == new_row {
                continue;
            }
            if first_row.is_none() {
                first_row = Some(index);
            }
            if logged == self.mismatch_log_limit {
                log::debug!("More differences exist but not showing all...");
                break;
            }
            log::debug!("Difference in row {}:", index);
            log::debug!("  Existing: {:?}", existing_row);
            log::debug!("  New:      {:?}", new_row);
            logged += 1;
        }

        let result = match first_row {
            Some(first_row) => Comparison::Different { first_row },
            None => Comparison::Equal,
        };
        log::info!(
            "Final comparison result: {}",
            if result.is_equal() { "EQUAL" } else { "DIFFERENT" }
        );
        result
    }
}

/// Convenience function using the default differ.
pub fn is_equal(candidate: &TabularDataset, reference: Option<&TabularDataset>) -> bool {
    DatasetDiffer::new().is_equal(candidate, reference)
}

/// Render every cell in canonical string form, row-major.
pub fn normalize(dataset: &TabularDataset) -> Result<Vec<Vec<String>>> {
    let kinds: Vec<ColumnKind> = (0..dataset.column_count())
        .map(|c| dataset.column_kind(c))
        .collect();

    dataset
        .rows
        .iter()
        .enumerate()
        .map(|(row_index, row)| {
            if row.len() != kinds.len() {
                return Err(AppError::comparison(format!(
                    "row {} has {} cells, expected {}",
                    row_index,
                    row.len(),
                    kinds.len()
                )));
            }
            row.iter()
                .zip(&kinds)
                .map(|(cell, kind)| normalize_cell(cell, *kind))
                .collect()
        })
        .collect()
}

/// Canonical string for one cell within a column of `kind`.
pub fn normalize_cell(cell: &Cell, kind: ColumnKind) -> Result<String> {
    match (kind, cell) {
        (_, Cell::Empty) => Ok(String::new()),
        (_, Cell::Number(n)) if n.is_nan() => Ok(String::new()),
        (_, Cell::Number(n)) if n.is_infinite() => {
            Err(AppError::comparison(format!("non-finite number {n}")))
        }
        (ColumnKind::Numeric, Cell::Number(n)) => Ok(format!("{:.5}", n)),
        (_, Cell::DateTime(dt)) => Ok(dt.format(DATETIME_FORMAT).to_string()),
        (_, Cell::Number(n)) => Ok(n.to_string()),
        (_, Cell::Text(s)) => {
            let trimmed = s.trim();
            if is_missing_token(trimmed) {
                Ok(String::new())
            } else {
                Ok(trimmed.to_string())
            }
        }
    }
}
