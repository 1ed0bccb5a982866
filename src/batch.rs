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

//! Batch accumulator
//!
//! Holds pending rows under byte and count limits until the coordinator
//! seals the batch for submission. Byte accounting mirrors the JSON wire
//! format of the streaming insert request: a fixed envelope cost plus a
//! per-row marginal cost that depends on whether an insert id is sent.

use rand::distr::Alphanumeric;
use rand::Rng;

use crate::error::Result;
use crate::row::{Row, RowEncoder};

/// Size of the request envelope with an empty rows array.
const EMPTY_ENVELOPE_BYTES: usize = 63;
/// Per-row punctuation overhead when no insert id is sent.
const ROW_OVERHEAD_BYTES: usize = 10;
/// Per-row punctuation overhead when an insert id is sent.
const ROW_WITH_ID_OVERHEAD_BYTES: usize = 24;

/// A row's de-duplication token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertId {
    /// Send no insert id for this row, accepting best-effort de-duplication
    /// on retries.
    Skip,
    /// A caller-supplied de-duplication token.
    Value(String),
}

impl From<&str> for InsertId {
    fn from(v: &str) -> Self {
        InsertId::Value(v.to_string())
    }
}

impl From<String> for InsertId {
    fn from(v: String) -> Self {
        InsertId::Value(v)
    }
}

/// A bounded accumulation of rows awaiting one network submission.
///
/// Keeps three parallel sequences: the original rows (needed to report
/// per-row errors back), their serialized forms, and the insert ids.
/// Skip-sentinel rows are omitted from `insert_ids`, so that sequence may
/// be shorter than the rows.
pub(crate) struct Batch {
    max_bytes: usize,
    max_rows: usize,
    rows: Vec<Row>,
    json_rows: Vec<String>,
    insert_ids: Vec<String>,
    current_bytes: usize,
}

impl Batch {
    pub(crate) fn new(max_bytes: usize, max_rows: usize) -> Self {
        Self {
            max_bytes,
            max_rows,
            rows: Vec::new(),
            json_rows: Vec::new(),
            insert_ids: Vec::new(),
            current_bytes: EMPTY_ENVELOPE_BYTES,
        }
    }

    /// Unconditional append. Used for the first row of a fresh batch, which
    /// by definition always fits.
    pub(crate) fn insert(
        &mut self,
        row: Row,
        insert_id: Option<InsertId>,
        encoder: &dyn RowEncoder,
    ) -> Result<()> {
        let json = encoder.encode(&row)?;
        self.push(row, json, resolve_insert_id(insert_id));
        Ok(())
    }

    /// Append only when the row fits under both limits. Gives the row back
    /// untouched when it does not; the batch is not mutated in that case.
    ///
    /// The byte check is strict: a row that would make the batch reach
    /// `max_bytes` is rejected, sealing one row early. The count check
    /// allows filling to exactly `max_rows`; [`Batch::ready`] then reports
    /// the batch as due for sealing.
    pub(crate) fn try_insert(
        &mut self,
        row: Row,
        insert_id: Option<InsertId>,
        encoder: &dyn RowEncoder,
    ) -> Result<Option<Row>> {
        let json = encoder.encode(&row)?;
        let insert_id = resolve_insert_id(insert_id);
        let addl_bytes = addl_bytes_for(&json, insert_id.as_deref());
        if self.current_bytes + addl_bytes >= self.max_bytes {
            return Ok(Some(row));
        }
        if self.rows.len() + 1 > self.max_rows {
            return Ok(Some(row));
        }

        self.push(row, json, insert_id);
        Ok(None)
    }

    /// Whether the batch has hit a limit and must be sealed.
    pub(crate) fn ready(&self) -> bool {
        self.current_bytes >= self.max_bytes || self.rows.len() >= self.max_rows
    }

    pub(crate) fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn byte_size(&self) -> usize {
        self.current_bytes
    }

    /// Detach the accumulated sequences for submission.
    pub(crate) fn into_parts(self) -> (Vec<Row>, Vec<String>, Vec<String>) {
        (self.rows, self.json_rows, self.insert_ids)
    }

    fn push(&mut self, row: Row, json: String, insert_id: Option<String>) {
        self.current_bytes += addl_bytes_for(&json, insert_id.as_deref());
        self.rows.push(row);
        self.json_rows.push(json);
        if let Some(id) = insert_id {
            self.insert_ids.push(id);
        }
    }
}

fn addl_bytes_for(json: &str, insert_id: Option<&str>) -> usize {
    match insert_id {
        None => ROW_OVERHEAD_BYTES + json.len(),
        Some(id) => ROW_WITH_ID_OVERHEAD_BYTES + json.len() + id.len(),
    }
}

// None means "generate": an untagged row still gets a de-duplication token.
fn resolve_insert_id(insert_id: Option<InsertId>) -> Option<String> {
    match insert_id {
        Some(InsertId::Skip) => None,
        Some(InsertId::Value(id)) => Some(id),
        None => Some(generate_insert_id()),
    }
}

fn generate_insert_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
