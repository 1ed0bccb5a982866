// Copyright 2024 The BigQuery Ingester Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-batch outcome types delivered to the inserter callback

use crate::client::{ErrorDetail, StreamingInsertResponse};
use crate::error::Error;
use crate::row::Row;

/// A single row the server refused, with its error details.
#[derive(Debug, Clone)]
pub struct RowError {
    index: usize,
    row: Row,
    errors: Vec<ErrorDetail>,
}

impl RowError {
    /// Index of the row within its batch
    pub fn index(&self) -> usize {
        self.index
    }

    /// The original row as supplied by the caller
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// Wire-level error details for this row
    pub fn errors(&self) -> &[ErrorDetail] {
        &self.errors
    }
}

/// The response of one completed batch submission, paired with the original
/// rows so per-row failures can be looked up by row identity.
#[derive(Debug)]
pub struct InsertResponse {
    rows: Vec<Row>,
    insert_errors: Vec<RowError>,
}

impl InsertResponse {
    pub(crate) fn new(rows: Vec<Row>, response: StreamingInsertResponse) -> Self {
        let insert_errors = response
            .insert_errors
            .into_iter()
            .filter_map(|entry| {
                rows.get(entry.index).cloned().map(|row| RowError {
                    index: entry.index,
                    row,
                    errors: entry.errors,
                })
            })
            .collect();
        Self { rows, insert_errors }
    }

    /// All rows submitted in this batch, in insertion order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// True iff no row-level errors occurred
    pub fn success(&self) -> bool {
        self.insert_errors.is_empty()
    }

    /// Number of rows the server accepted
    pub fn insert_count(&self) -> usize {
        self.rows.len() - self.insert_errors.len()
    }

    /// Number of rows the server refused
    pub fn error_count(&self) -> usize {
        self.insert_errors.len()
    }

    /// All row-level errors, in response order
    pub fn insert_errors(&self) -> &[RowError] {
        &self.insert_errors
    }

    /// The rows that were not inserted
    pub fn error_rows(&self) -> Vec<&Row> {
        self.insert_errors.iter().map(RowError::row).collect()
    }

    /// The row-level error for `row`, if it was refused
    pub fn insert_error_for(&self, row: &Row) -> Option<&RowError> {
        self.insert_errors.iter().find(|e| e.row() == row)
    }

    /// Wire-level error details for `row`; empty when the row was accepted
    pub fn errors_for(&self, row: &Row) -> &[ErrorDetail] {
        self.insert_error_for(row)
            .map(RowError::errors)
            .unwrap_or(&[])
    }

    /// Batch index of `row`, if it was refused
    pub fn index_for(&self, row: &Row) -> Option<usize> {
        self.insert_error_for(row).map(RowError::index)
    }
}

/// Outcome of one sealed batch, delivered to the callback exactly once.
///
/// Row-level errors live inside the [`Inserted`](InsertResult::Inserted)
/// variant and never flip [`is_error`](InsertResult::is_error); the
/// [`Failed`](InsertResult::Failed) variant means the call itself failed
/// before a response was obtained, so row-level detail is meaningless and
/// every row accessor returns `None`.
#[derive(Debug)]
pub enum InsertResult {
    /// The RPC completed; individual rows may still have been refused.
    Inserted(InsertResponse),
    /// The RPC failed outright.
    Failed(Error),
}

impl InsertResult {
    /// True iff the submission failed as a whole
    pub fn is_error(&self) -> bool {
        matches!(self, InsertResult::Failed(_))
    }

    /// The top-level error, if the submission failed
    pub fn error(&self) -> Option<&Error> {
        match self {
            InsertResult::Failed(error) => Some(error),
            InsertResult::Inserted(_) => None,
        }
    }

    /// The response, if the submission completed
    pub fn response(&self) -> Option<&InsertResponse> {
        match self {
            InsertResult::Inserted(response) => Some(response),
            InsertResult::Failed(_) => None,
        }
    }

    /// Whether every row was accepted; `None` if the submission failed
    pub fn success(&self) -> Option<bool> {
        self.response().map(InsertResponse::success)
    }

    pub fn insert_count(&self) -> Option<usize> {
        self.response().map(InsertResponse::insert_count)
    }

    pub fn error_count(&self) -> Option<usize> {
        self.response().map(InsertResponse::error_count)
    }

    pub fn insert_errors(&self) -> Option<&[RowError]> {
        self.response().map(InsertResponse::insert_errors)
    }

    pub fn error_rows(&self) -> Option<Vec<&Row>> {
        self.response().map(InsertResponse::error_rows)
    }

    pub fn insert_error_for(&self, row: &Row) -> Option<&RowError> {
        self.response().and_then(|r| r.insert_error_for(row))
    }

    pub fn errors_for(&self, row: &Row) -> Option<&[ErrorDetail]> {
        self.response().map(|r| r.errors_for(row))
    }

    pub fn index_for(&self, row: &Row) -> Option<usize> {
        self.response().and_then(|r| r.index_for(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RowErrorEntry;
    use crate::error;

    fn sample_rows() -> Vec<Row> {
        vec![
            Row::new().set("name", "Heidi").set("age", 36i64),
            Row::new().set("name", "Aaron").set("age", 42i64),
            Row::new().set("name", "Sally"),
        ]
    }

    fn detail(reason: &str) -> ErrorDetail {
        ErrorDetail {
            reason: reason.to_string(),
            location: "age".to_string(),
            debug_info: String::new(),
            message: format!("{reason}: bad value"),
        }
    }

    #[test]
    fn test_clean_response() {
        let result = InsertResult::Inserted(InsertResponse::new(
            sample_rows(),
            StreamingInsertResponse::default(),
        ));

        assert!(!result.is_error());
        assert!(result.error().is_none());
        assert_eq!(result.success(), Some(true));
        assert_eq!(result.insert_count(), Some(3));
        assert_eq!(result.error_count(), Some(0));
        assert_eq!(result.error_rows().unwrap().len(), 0);
    }

    #[test]
    fn test_row_level_errors_do_not_make_the_result_an_error() {
        let rows = sample_rows();
        let refused = rows[1].clone();
        let accepted = rows[0].clone();
        let response = StreamingInsertResponse {
            insert_errors: vec![RowErrorEntry {
                index: 1,
                errors: vec![detail("invalid")],
            }],
        };
        let result = InsertResult::Inserted(InsertResponse::new(rows, response));

        assert!(!result.is_error());
        assert_eq!(result.success(), Some(false));
        assert_eq!(result.insert_count(), Some(2));
        assert_eq!(result.error_count(), Some(1));
        assert_eq!(result.error_rows().unwrap(), vec![&refused]);
        assert_eq!(result.index_for(&refused), Some(1));
        assert_eq!(result.errors_for(&refused).unwrap()[0].reason, "invalid");
        assert!(result.insert_error_for(&accepted).is_none());
        assert_eq!(result.errors_for(&accepted), Some(&[][..]));
    }

    #[test]
    fn test_failed_submission_hides_row_accessors() {
        let result = InsertResult::Failed(
            error::RequestSnafu {
                msg: "connection reset",
            }
            .build(),
        );

        assert!(result.is_error());
        assert!(result.error().is_some());
        assert!(result.response().is_none());
        assert_eq!(result.success(), None);
        assert_eq!(result.insert_count(), None);
        assert_eq!(result.error_count(), None);
        assert!(result.insert_errors().is_none());
        assert!(result.error_rows().is_none());
        assert_eq!(result.index_for(&Row::new()), None);
    }

    #[test]
    fn test_out_of_range_error_index_is_dropped() {
        let response = StreamingInsertResponse {
            insert_errors: vec![RowErrorEntry {
                index: 9,
                errors: vec![detail("invalid")],
            }],
        };
        let inner = InsertResponse::new(sample_rows(), response);
        assert!(inner.success());
        assert_eq!(inner.insert_count(), 3);
    }
}
