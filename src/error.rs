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

use std::time::Duration;

use snafu::{Location, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Cannot insert empty rows"))]
    EmptyRows {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Insert id count {actual} does not match row count {expected}"))]
    InsertIdCountMismatch {
        expected: usize,
        actual: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Insert ids must be all skip or all values within one call"))]
    MixedInsertIds {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Cannot submit an empty batch"))]
    EmptyBatch {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Inserter has been stopped"))]
    InserterStopped {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to serialize row to JSON"))]
    SerializeRow {
        #[snafu(source)]
        error: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Non-finite float in row field {field:?}"))]
    NonFiniteFloat {
        field: String,
        #[snafu(implicit)]
        location: Location,
    },

    // Transport/server failure reported by the streaming-insert client.
    #[snafu(display("Streaming insert request failed: {msg}"))]
    Request {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Timed out after {timeout:?} waiting for in-flight inserts"))]
    WaitTimeout {
        timeout: Duration,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
