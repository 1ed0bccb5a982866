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

//! The streaming-insert client boundary
//!
//! The inserter batches calls to a [`StreamingInsertClient`], which owns
//! transport, authentication, and retry policy. Implementations may sit on
//! gRPC, REST, or be test doubles; the inserter only hands them sealed
//! batches and wraps their outcome.

use std::fmt;

use derive_builder::Builder;
use futures::future::BoxFuture;

use crate::error::Result;

/// Fully-qualified identifier of the destination table.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(setter(into))]
pub struct TableId {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableId {
    /// Create a new table id builder
    pub fn builder() -> TableIdBuilder {
        TableIdBuilder::default()
    }

    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// One sealed batch, serialized for the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertRequest {
    /// JSON-encoded rows, in insertion order.
    pub json_rows: Vec<String>,
    /// De-duplication tokens. May be shorter than `json_rows` when rows
    /// were inserted with the skip sentinel.
    pub insert_ids: Vec<String>,
    pub skip_invalid_rows: Option<bool>,
    pub ignore_unknown_values: Option<bool>,
}

/// Structured error detail attached to a single failed row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetail {
    pub reason: String,
    pub location: String,
    pub debug_info: String,
    pub message: String,
}

/// A per-row failure reported inside an otherwise successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowErrorEntry {
    /// Index of the failed row within the submitted batch.
    pub index: usize,
    pub errors: Vec<ErrorDetail>,
}

/// The response of one streaming-insert call. Rows not listed in
/// `insert_errors` were accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingInsertResponse {
    pub insert_errors: Vec<RowErrorEntry>,
}

/// The streaming-insert RPC collaborator.
///
/// Any `Err` returned here is captured by the inserter and delivered to the
/// callback as a failed [`InsertResult`](crate::InsertResult); the inserter
/// itself never retries.
pub trait StreamingInsertClient: Send + Sync {
    /// Execute one streaming-insert call for a sealed batch.
    fn insert_all(
        &self,
        table: &TableId,
        request: InsertRequest,
    ) -> BoxFuture<'static, Result<StreamingInsertResponse>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_id_display() {
        let table = TableId::new("my-project", "my_dataset", "my_table");
        assert_eq!(table.to_string(), "my-project.my_dataset.my_table");
    }

    #[test]
    fn test_table_id_builder() {
        let table = TableId::builder()
            .project_id("p")
            .dataset_id("d")
            .table_id("t")
            .build()
            .unwrap();
        assert_eq!(table, TableId::new("p", "d", "t"));
    }
}
