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

//! Asynchronous batching inserter
//!
//! [`AsyncInserter`] buffers rows into a single current [`Batch`] and seals
//! it for submission on any of three triggers: a size/count limit hit
//! synchronously during insert, the flush interval elapsing (watched by a
//! background task), or an explicit [`flush`](AsyncInserter::flush) /
//! [`stop`](AsyncInserter::stop). Sealed batches are detached from the
//! coordinator before submission, so the network never blocks callers;
//! a semaphore bounds how many submissions run concurrently.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use snafu::ensure;
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;

use crate::batch::{Batch, InsertId};
use crate::client::{InsertRequest, StreamingInsertClient, TableId};
use crate::error::{self, Result};
use crate::result::{InsertResponse, InsertResult};
use crate::row::{JsonRowEncoder, Row, RowEncoder};

/// Callback invoked exactly once per sealed batch with its outcome.
pub type ResultCallback = Box<dyn Fn(InsertResult) + Send + Sync>;

/// Configuration for an [`AsyncInserter`].
#[derive(Clone)]
pub struct InsertOptions {
    /// Seal the current batch once its accounted size reaches this many
    /// bytes. Default 10,000,000 (10 MB).
    pub max_bytes: usize,
    /// Seal the current batch once it holds this many rows. Default 500.
    pub max_rows: usize,
    /// Seal the current batch once its first row is this old. Default 10s.
    pub interval: Duration,
    /// Maximum number of concurrently running submissions. Default 4.
    pub parallelism: usize,
    /// Ask the server to insert valid rows even when some are invalid.
    pub skip_invalid: Option<bool>,
    /// Ask the server to ignore row fields not present in the table schema.
    pub ignore_unknown: Option<bool>,
    /// Row serializer; the default produces one JSON object per row.
    pub encoder: Arc<dyn RowEncoder>,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            max_bytes: 10_000_000,
            max_rows: 500,
            interval: Duration::from_secs(10),
            parallelism: 4,
            skip_invalid: None,
            ignore_unknown: None,
            encoder: Arc::new(JsonRowEncoder),
        }
    }
}

impl fmt::Debug for InsertOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertOptions")
            .field("max_bytes", &self.max_bytes)
            .field("max_rows", &self.max_rows)
            .field("interval", &self.interval)
            .field("parallelism", &self.parallelism)
            .field("skip_invalid", &self.skip_invalid)
            .field("ignore_unknown", &self.ignore_unknown)
            .finish_non_exhaustive()
    }
}

impl InsertOptions {
    /// Set the batch byte-size limit
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set the batch row-count limit
    #[must_use]
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Set the time-based flush interval
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the concurrent-submission bound
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Set the server-side skip-invalid-rows flag
    #[must_use]
    pub fn with_skip_invalid(mut self, skip_invalid: bool) -> Self {
        self.skip_invalid = Some(skip_invalid);
        self
    }

    /// Set the server-side ignore-unknown-values flag
    #[must_use]
    pub fn with_ignore_unknown(mut self, ignore_unknown: bool) -> Self {
        self.ignore_unknown = Some(ignore_unknown);
        self
    }

    /// Replace the row serializer
    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn RowEncoder>) -> Self {
        self.encoder = encoder;
        self
    }
}

/// Buffers rows and submits them in size-, count-, and time-bounded batches
/// over a [`StreamingInsertClient`].
///
/// All methods must be called from within a Tokio runtime: submissions and
/// the interval watcher run as spawned tasks. `insert` itself never waits
/// on the network; call [`stop`](Self::stop) followed by
/// [`wait`](Self::wait) to drain before shutdown.
pub struct AsyncInserter {
    inner: Arc<Inner>,
}

struct Inner {
    table: TableId,
    client: Arc<dyn StreamingInsertClient>,
    options: InsertOptions,
    callback: Option<ResultCallback>,
    state: Mutex<State>,
    // Wakes the interval watcher; Notify stores a permit, so a signal sent
    // while the watcher is busy is not lost.
    wakeup: Notify,
    // Wakes wait() when in_flight drops to zero.
    drained: Notify,
    in_flight: AtomicUsize,
    permits: Arc<Semaphore>,
}

#[derive(Default)]
struct State {
    batch: Option<Batch>,
    batch_created_at: Option<Instant>,
    stopped: bool,
    watcher_started: bool,
}

impl AsyncInserter {
    /// Create an inserter without a result callback.
    pub fn new(
        table: TableId,
        client: Arc<dyn StreamingInsertClient>,
        options: InsertOptions,
    ) -> Self {
        Self::build(table, client, options, None)
    }

    /// Create an inserter that delivers each batch outcome to `callback`.
    pub fn with_callback<F>(
        table: TableId,
        client: Arc<dyn StreamingInsertClient>,
        options: InsertOptions,
        callback: F,
    ) -> Self
    where
        F: Fn(InsertResult) + Send + Sync + 'static,
    {
        Self::build(table, client, options, Some(Box::new(callback)))
    }

    fn build(
        table: TableId,
        client: Arc<dyn StreamingInsertClient>,
        options: InsertOptions,
        callback: Option<ResultCallback>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(options.parallelism));
        Self {
            inner: Arc::new(Inner {
                table,
                client,
                options,
                callback,
                state: Mutex::new(State::default()),
                wakeup: Notify::new(),
                drained: Notify::new(),
                in_flight: AtomicUsize::new(0),
                permits,
            }),
        }
    }

    /// The destination table
    pub fn table(&self) -> &TableId {
        &self.inner.table
    }

    /// The configuration this inserter was built with
    pub fn options(&self) -> &InsertOptions {
        &self.inner.options
    }

    /// Queue rows for insertion, generating an insert id per row.
    ///
    /// Returns once the rows are batched; never waits on the network.
    /// Batches sealed along the way (limit reached) are submitted in the
    /// background.
    pub fn insert<I>(&self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = Row>,
    {
        self.insert_rows(rows.into_iter().collect(), None)
    }

    /// Queue rows with explicit insert ids, one per row.
    ///
    /// Ids must be uniform within one call: all [`InsertId::Value`] or all
    /// [`InsertId::Skip`] — a batch either carries an id for every row it
    /// sends ids for, or none.
    pub fn insert_with_ids(&self, rows: Vec<Row>, insert_ids: Vec<InsertId>) -> Result<()> {
        self.insert_rows(rows, Some(insert_ids))
    }

    fn insert_rows(&self, rows: Vec<Row>, insert_ids: Option<Vec<InsertId>>) -> Result<()> {
        ensure!(!rows.is_empty(), error::EmptyRowsSnafu);
        if let Some(ids) = &insert_ids {
            ensure!(
                ids.len() == rows.len(),
                error::InsertIdCountMismatchSnafu {
                    expected: rows.len(),
                    actual: ids.len(),
                }
            );
            let skips = ids.iter().filter(|id| **id == InsertId::Skip).count();
            ensure!(
                skips == 0 || skips == ids.len(),
                error::MixedInsertIdsSnafu
            );
        }

        let inner = &self.inner;
        let mut state = inner.state.lock();
        ensure!(!state.stopped, error::InserterStoppedSnafu);

        let ids = match insert_ids {
            Some(ids) => ids.into_iter().map(Some).collect::<Vec<_>>(),
            None => vec![None; rows.len()],
        };
        for (row, insert_id) in rows.into_iter().zip(ids) {
            self.append(&mut state, row, insert_id)?;
            if state.batch.as_ref().is_some_and(Batch::ready) {
                inner.seal(&mut state);
            }
        }

        if !state.watcher_started {
            state.watcher_started = true;
            tokio::spawn(run_interval_watcher(Arc::clone(inner)));
        }
        drop(state);
        inner.wakeup.notify_one();

        Ok(())
    }

    fn append(&self, state: &mut State, row: Row, insert_id: Option<InsertId>) -> Result<()> {
        let options = &self.inner.options;
        let encoder = options.encoder.as_ref();
        match state.batch.as_mut() {
            None => {
                let mut batch = Batch::new(options.max_bytes, options.max_rows);
                batch.insert(row, insert_id, encoder)?;
                state.batch = Some(batch);
                state.batch_created_at = Some(Instant::now());
            }
            Some(batch) => {
                // A full batch gives the row back; seal and start over with it.
                if let Some(row) = batch.try_insert(row, insert_id.clone(), encoder)? {
                    self.inner.seal(state);
                    let mut batch = Batch::new(options.max_bytes, options.max_rows);
                    batch.insert(row, insert_id, encoder)?;
                    state.batch = Some(batch);
                    state.batch_created_at = Some(Instant::now());
                }
            }
        }
        Ok(())
    }

    /// Seal and submit whatever is currently buffered, regardless of
    /// readiness. Does not stop the inserter.
    pub fn flush(&self) -> &Self {
        let mut state = self.inner.state.lock();
        self.inner.seal(&mut state);
        drop(state);
        self.inner.wakeup.notify_one();
        self
    }

    /// Stop accepting rows and submit the pending batch. Idempotent.
    ///
    /// Does not wait for in-flight submissions; chain with
    /// [`wait`](Self::wait):
    /// `inserter.stop().wait().await`.
    pub fn stop(&self) -> &Self {
        let mut state = self.inner.state.lock();
        if !state.stopped {
            state.stopped = true;
            self.inner.seal(&mut state);
        }
        drop(state);
        self.inner.wakeup.notify_one();
        self
    }

    /// Whether the inserter still accepts rows
    pub fn is_started(&self) -> bool {
        !self.is_stopped()
    }

    /// Whether [`stop`](Self::stop) has been called
    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }

    /// Number of rows waiting in the current batch
    pub fn pending_rows(&self) -> usize {
        self.inner
            .state
            .lock()
            .batch
            .as_ref()
            .map_or(0, Batch::row_count)
    }

    /// Accounted byte size of the current batch, envelope included
    pub fn pending_bytes(&self) -> usize {
        self.inner
            .state
            .lock()
            .batch
            .as_ref()
            .map_or(0, Batch::byte_size)
    }

    /// Wait until every dispatched batch has completed and its callback has
    /// run. Intended to be called after [`stop`](Self::stop); it does not
    /// itself prevent new batches from being dispatched.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register before checking, so a completion between the check
            // and the await still wakes us.
            notified.as_mut().enable();
            if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`. In-flight
    /// submissions are not cancelled on timeout; they will still complete
    /// and invoke the callback.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| error::WaitTimeoutSnafu { timeout }.build())
    }
}

impl Inner {
    /// Detach the current batch and hand it to a submission task. No-op when
    /// nothing is buffered.
    fn seal(self: &Arc<Self>, state: &mut State) {
        let Some(batch) = state.batch.take() else {
            return;
        };
        state.batch_created_at = None;

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            // Decrements in_flight on drop, so wait() cannot hang even if
            // the callback panics.
            let _guard = InFlightGuard(Arc::clone(&inner));
            let result = match inner.submit(batch).await {
                Ok(response) => InsertResult::Inserted(response),
                Err(error) => InsertResult::Failed(error),
            };
            if let Some(callback) = &inner.callback {
                callback(result);
            }
        });
    }

    async fn submit(&self, batch: Batch) -> Result<InsertResponse> {
        // The semaphore is never closed, so acquire cannot fail; the permit
        // is held for the duration of the call.
        let _permit = self.permits.acquire().await.ok();

        let (rows, json_rows, insert_ids) = batch.into_parts();
        ensure!(!json_rows.is_empty(), error::EmptyBatchSnafu);

        let request = InsertRequest {
            json_rows,
            insert_ids,
            skip_invalid_rows: self.options.skip_invalid,
            ignore_unknown_values: self.options.ignore_unknown,
        };
        let response = self.client.insert_all(&self.table, request).await?;
        Ok(InsertResponse::new(rows, response))
    }
}

struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

/// Background task enforcing the time-based flush trigger: a batch is never
/// held longer than `interval` past its first row's arrival.
async fn run_interval_watcher(inner: Arc<Inner>) {
    loop {
        let wait_for = {
            let mut state = inner.state.lock();
            if state.stopped {
                return;
            }
            match state.batch_created_at {
                // Nothing buffered; sleep until an insert wakes us.
                None => None,
                Some(created_at) => {
                    let elapsed = created_at.elapsed();
                    if elapsed < inner.options.interval {
                        Some(inner.options.interval - elapsed)
                    } else {
                        // Interval met; submit and wait for the next batch.
                        inner.seal(&mut state);
                        None
                    }
                }
            }
        };

        match wait_for {
            Some(remaining) => {
                let _ = tokio::time::timeout(remaining, inner.wakeup.notified()).await;
            }
            None => inner.wakeup.notified().await,
        }
    }
}
