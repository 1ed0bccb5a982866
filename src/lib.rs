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

//! Batching asynchronous client for BigQuery streaming inserts
//!
//! Rows handed to an [`AsyncInserter`] are buffered into batches bounded by
//! byte size and row count, then submitted in the background over a
//! pluggable [`StreamingInsertClient`]. A batch is sealed and submitted
//! when it reaches `max_bytes` or `max_rows`, when the flush interval
//! elapses, or on an explicit [`AsyncInserter::flush`] or
//! [`AsyncInserter::stop`]. Each batch outcome — including per-row errors
//! reported by the server — is delivered to an optional callback as an
//! [`InsertResult`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bigquery_ingester::{
//!     AsyncInserter, InsertOptions, InsertRequest, Result, Row, StreamingInsertClient,
//!     StreamingInsertResponse, TableId,
//! };
//! use futures::future::BoxFuture;
//!
//! struct MyClient;
//!
//! impl StreamingInsertClient for MyClient {
//!     fn insert_all(
//!         &self,
//!         _table: &TableId,
//!         _request: InsertRequest,
//!     ) -> BoxFuture<'static, Result<StreamingInsertResponse>> {
//!         Box::pin(async { Ok(StreamingInsertResponse::default()) })
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let table = TableId::new("my-project", "my_dataset", "my_table");
//! let inserter = AsyncInserter::with_callback(
//!     table,
//!     Arc::new(MyClient),
//!     InsertOptions::default(),
//!     |result| match result.error() {
//!         Some(error) => eprintln!("batch failed: {error}"),
//!         None => println!("inserted {} rows", result.insert_count().unwrap_or(0)),
//!     },
//! );
//!
//! inserter.insert([
//!     Row::new().set("first_name", "Alice").set("age", 21i64),
//!     Row::new().set("first_name", "Bob").set("age", 22i64),
//! ])?;
//!
//! inserter.stop().wait().await;
//! # Ok(())
//! # }
//! ```

mod batch;
pub mod client;
pub mod error;
pub mod inserter;
pub mod result;
pub mod row;

pub use batch::InsertId;
pub use client::{
    ErrorDetail, InsertRequest, RowErrorEntry, StreamingInsertClient, StreamingInsertResponse,
    TableId, TableIdBuilder,
};
pub use error::{Error, Result};
pub use inserter::{AsyncInserter, InsertOptions, ResultCallback};
pub use result::{InsertResponse, InsertResult, RowError};
pub use row::{JsonRowEncoder, Row, RowEncoder, Value};
