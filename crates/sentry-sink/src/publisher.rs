// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered publishing of entries with batching, load shedding, and a
//! bounded shutdown drain.
//!
//! Entries accumulate in an open batch that is sealed when it reaches the
//! configured count or when the flush timer fires, whichever comes first.
//! Sealed batches travel over an unbounded channel to a single worker task,
//! so flushes are serialized and a batch is flushed exactly once. Memory is
//! bounded by `max_buffered_entries`: past the cap, new entries are dropped
//! rather than stalling the caller.

use crate::client::ShippingError;
use crate::entry::EventEntry;
use crate::errors::ConfigError;
use crate::flusher::EntryFlusher;
use reqwest::StatusCode;
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_FLUSH_COUNT: usize = 50;
const DEFAULT_MAX_BUFFERED_ENTRIES: usize = 2000;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Maximum age of an open batch before the timer seals it.
    pub flush_interval: Duration,
    /// Entry count at which an open batch is sealed immediately.
    pub flush_count: usize,
    /// Total buffered entries (open batch plus sealed-but-unflushed) above
    /// which new entries are shed.
    pub max_buffered_entries: usize,
    /// Bound on the shutdown drain; `None` waits for the drain to finish.
    pub shutdown_timeout: Option<Duration>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_count: DEFAULT_FLUSH_COUNT,
            max_buffered_entries: DEFAULT_MAX_BUFFERED_ENTRIES,
            shutdown_timeout: None,
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "flush interval must be non-zero".to_string(),
            ));
        }
        if self.flush_count == 0 {
            return Err(ConfigError::InvalidConfig(
                "flush count must be non-zero".to_string(),
            ));
        }
        if self.max_buffered_entries < self.flush_count {
            return Err(ConfigError::InvalidConfig(format!(
                "max buffered entries ({}) must be at least the flush count ({})",
                self.max_buffered_entries, self.flush_count
            )));
        }
        if let Some(timeout) = self.shutdown_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidConfig(
                    "shutdown timeout must be non-zero".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Running,
    Draining,
    Stopped,
}

enum WorkerMessage {
    Batch(Vec<EventEntry>),
    Flush(oneshot::Sender<()>),
}

struct Inner {
    open: Vec<EventEntry>,
    /// Open batch plus sealed batches not yet flushed.
    buffered: usize,
    state: PublisherState,
    /// Set while shedding so the warning fires once per episode.
    shedding: bool,
}

/// Accepts entries and hands sealed batches to a single background worker.
///
/// All methods take `&self`; the publisher is shared behind an `Arc` by
/// callers that post from several tasks.
pub struct BufferedPublisher {
    inner: Arc<Mutex<Inner>>,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    shutdown: CancellationToken,
    abort: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    flush_count: usize,
    max_buffered_entries: usize,
    shutdown_timeout: Option<Duration>,
}

impl BufferedPublisher {
    /// Validates the configuration and spawns the worker task.
    pub fn start(
        config: PublisherConfig,
        flusher: Arc<dyn EntryFlusher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Mutex::new(Inner {
            open: Vec::new(),
            buffered: 0,
            state: PublisherState::Running,
            shedding: false,
        }));
        let shutdown = CancellationToken::new();
        let abort = CancellationToken::new();

        let worker = PublisherWorker {
            inner: Arc::clone(&inner),
            rx,
            flusher,
            abort: abort.clone(),
            flush_interval: config.flush_interval,
        };
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        Ok(Self {
            inner,
            tx,
            shutdown,
            abort,
            worker: Mutex::new(Some(handle)),
            flush_count: config.flush_count,
            max_buffered_entries: config.max_buffered_entries,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Offers one entry. Returns `false` when the entry was dropped, either
    /// because the publisher is no longer running or because the buffer is
    /// at capacity. Never blocks.
    #[allow(clippy::expect_used)]
    pub fn try_post(&self, entry: EventEntry) -> bool {
        let sealed = {
            let mut inner = self.inner.lock().expect("lock poisoned");
            if inner.state != PublisherState::Running {
                return false;
            }
            if inner.buffered >= self.max_buffered_entries {
                if !inner.shedding {
                    inner.shedding = true;
                    warn!(
                        "buffer full at {} entries, dropping new entries",
                        self.max_buffered_entries
                    );
                }
                return false;
            }
            inner.shedding = false;
            inner.open.push(entry);
            inner.buffered += 1;
            if inner.open.len() >= self.flush_count {
                Some(mem::take(&mut inner.open))
            } else {
                None
            }
        };

        if let Some(batch) = sealed {
            // Worker gone means we are past shutdown; the state check above
            // already rejects new entries then.
            let _ = self.tx.send(WorkerMessage::Batch(batch));
        }
        true
    }

    /// Seals the open batch and waits for the worker to finish everything
    /// queued so far. A failed batch still counts as finished; flushing
    /// never retries.
    #[allow(clippy::expect_used)]
    pub async fn flush(&self) {
        let sealed = {
            let mut inner = self.inner.lock().expect("lock poisoned");
            if inner.state != PublisherState::Running {
                return;
            }
            if inner.open.is_empty() {
                None
            } else {
                Some(mem::take(&mut inner.open))
            }
        };
        if let Some(batch) = sealed {
            let _ = self.tx.send(WorkerMessage::Batch(batch));
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WorkerMessage::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Stops accepting entries, drains what is buffered, and waits for the
    /// worker to exit. With a shutdown timeout configured, a drain still
    /// running when it elapses is aborted and the remaining entries are
    /// discarded. Safe to call more than once; later calls return
    /// immediately.
    #[allow(clippy::expect_used)]
    pub async fn shutdown(&self) {
        let handle = self.worker.lock().expect("lock poisoned").take();
        let Some(handle) = handle else {
            return;
        };

        {
            let mut inner = self.inner.lock().expect("lock poisoned");
            inner.state = PublisherState::Draining;
        }
        self.shutdown.cancel();

        let abort_handle = handle.abort_handle();
        let finished = match self.shutdown_timeout {
            Some(timeout) => tokio::time::timeout(timeout, handle).await.is_ok(),
            None => {
                let _ = handle.await;
                true
            }
        };
        if !finished {
            self.abort.cancel();
            abort_handle.abort();
        }

        let discarded = {
            let mut inner = self.inner.lock().expect("lock poisoned");
            inner.state = PublisherState::Stopped;
            inner.open.clear();
            mem::take(&mut inner.buffered)
        };
        if !finished {
            warn!("shutdown timed out, discarded {discarded} buffered entries");
        }
    }

    #[allow(clippy::expect_used)]
    pub fn state(&self) -> PublisherState {
        self.inner.lock().expect("lock poisoned").state
    }

    /// Entries currently held: the open batch plus sealed batches the
    /// worker has not flushed yet.
    #[allow(clippy::expect_used)]
    pub fn buffered(&self) -> usize {
        self.inner.lock().expect("lock poisoned").buffered
    }
}

impl Drop for BufferedPublisher {
    /// Last resort when `shutdown` was never awaited: stop the worker
    /// without draining. Unflushed entries may be lost.
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.abort.cancel();
        if let Ok(mut inner) = self.inner.lock() {
            inner.state = PublisherState::Stopped;
        }
    }
}

struct PublisherWorker {
    inner: Arc<Mutex<Inner>>,
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
    flusher: Arc<dyn EntryFlusher>,
    abort: CancellationToken,
    flush_interval: Duration,
}

impl PublisherWorker {
    async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        // The first tick fires immediately; skip it so the first real flush
        // happens one interval in.
        ticker.tick().await;

        loop {
            tokio::select! {
                message = self.rx.recv() => match message {
                    Some(WorkerMessage::Batch(batch)) => self.flush_batch(batch).await,
                    Some(WorkerMessage::Flush(ack)) => {
                        let batch = self.seal_open();
                        if !batch.is_empty() {
                            self.flush_batch(batch).await;
                        }
                        let _ = ack.send(());
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    let batch = self.seal_open();
                    if !batch.is_empty() {
                        self.flush_batch(batch).await;
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        self.drain().await;
    }

    /// Flushes everything still queued or open, then acknowledges any
    /// pending flush requests. Stops early if the abort token fires.
    #[allow(clippy::expect_used)]
    async fn drain(&mut self) {
        {
            let mut inner = self.inner.lock().expect("lock poisoned");
            if inner.state == PublisherState::Running {
                inner.state = PublisherState::Draining;
            }
        }

        self.rx.close();
        let mut batches = Vec::new();
        let mut acks = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            match message {
                WorkerMessage::Batch(batch) => batches.push(batch),
                WorkerMessage::Flush(ack) => acks.push(ack),
            }
        }
        batches.push(self.seal_open());

        for batch in batches {
            if self.abort.is_cancelled() {
                break;
            }
            if !batch.is_empty() {
                self.flush_batch(batch).await;
            }
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }

    #[allow(clippy::expect_used)]
    fn seal_open(&self) -> Vec<EventEntry> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        mem::take(&mut inner.open)
    }

    /// Hands one sealed batch to the flusher and releases its capacity.
    /// Whatever the outcome, the batch is gone afterwards.
    #[allow(clippy::expect_used)]
    async fn flush_batch(&self, batch: Vec<EventEntry>) {
        let count = batch.len();
        debug!("flushing batch of {count} entries");

        let outcome = self.flusher.flush_batch(batch, &self.abort).await;
        match &outcome.error {
            Some(ShippingError::Destination(Some(status), _))
                if *status == StatusCode::TOO_MANY_REQUESTS =>
            {
                warn!(
                    "rate limited by destination after {} of {count} entries",
                    outcome.published
                );
            }
            Some(e) => {
                error!(
                    "failed to flush batch after {} of {count} entries: {e}",
                    outcome.published
                );
            }
            None if outcome.published < count => {
                debug!(
                    "batch cancelled after {} of {count} entries",
                    outcome.published
                );
            }
            None => debug!("flushed {count} entries"),
        }

        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.buffered = inner.buffered.saturating_sub(count);
    }
}
