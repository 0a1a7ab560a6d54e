use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{ListenError, MessageSource, WorkerError};
use crate::config::Config;
use crate::conntrack::{Event, EventKind, classify};
use crate::export::TrackerMetrics;
use crate::state::ConnectionTracker;

/// Queue capacity contributed by each worker.
pub const QUEUE_PER_WORKER: usize = 1024;

/// Most events the consumer applies per wake before yielding.
const DRAIN_BATCH: usize = 64;

/// Decode workers feeding one consumer that owns every tracker write.
pub struct Pipeline {
    tracker: Arc<ConnectionTracker>,
    metrics: TrackerMetrics,
    workers: usize,
    interval: Duration,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        tracker: Arc<ConnectionTracker>,
        metrics: TrackerMetrics,
        config: &Config,
        cancel: CancellationToken,
    ) -> Self {
        let config = config.clone().with_defaults();
        Self {
            tracker,
            metrics,
            workers: config.workers,
            interval: config.interval,
            cancel,
        }
    }

    /// Run until every worker has stopped or the pipeline is cancelled.
    ///
    /// Workers stop on a receive or decode error, or when `source` closes.
    /// Errors are pooled: none is `Ok` (or `BufferFull` if a worker saw the
    /// kernel drop events), one is returned as is, several are combined.
    pub async fn run<S: MessageSource>(self, source: Arc<S>) -> Result<(), ListenError> {
        let (event_tx, mut event_rx) = mpsc::channel(QUEUE_PER_WORKER * self.workers);
        let (done_tx, mut done_rx) = mpsc::channel(self.workers);
        let stop = self.cancel.child_token();

        let handles: Vec<_> = (0..self.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    source: source.clone(),
                    events: event_tx.clone(),
                    metrics: self.metrics.clone(),
                    cancel: stop.clone(),
                };
                let done = done_tx.clone();
                tokio::spawn(async move {
                    let result = worker.run().await;
                    let _ = done.send(result).await;
                })
            })
            .collect();
        drop(event_tx);
        drop(done_tx);

        let mut live = self.workers;
        let mut errors = Vec::new();
        let mut buffer_full = false;

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while live > 0 {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    errors.push(ListenError::Cancelled);
                    break;
                }
                done = done_rx.recv() => {
                    let Some(result) = done else {
                        break;
                    };
                    live -= 1;
                    match result {
                        Ok(()) => tracing::debug!(live, "worker finished"),
                        Err(e) if e.is_buffer_overrun() => {
                            tracing::warn!(error = %e, live, "worker stopped, events lost");
                            buffer_full = true;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, live, "worker failed");
                            errors.push(ListenError::Worker(e));
                        }
                    }
                }
                Some(event) = event_rx.recv() => {
                    self.apply(event);
                    for _ in 1..DRAIN_BATCH {
                        match event_rx.try_recv() {
                            Ok(event) => self.apply(event),
                            Err(_) => break,
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.tracker.flush();
                }
            }
        }

        if live == 0 {
            while let Ok(event) = event_rx.try_recv() {
                self.apply(event);
            }
        }

        stop.cancel();
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task failed");
            }
        }

        self.outcome(errors, buffer_full)
    }

    fn apply(&self, event: Event) {
        let Some((address, protocol, port)) = event.destination() else {
            self.metrics.filtered.inc();
            return;
        };

        match event.kind {
            EventKind::Destroy => {
                let counts = self.tracker.record_failure(address, protocol, port);
                self.metrics.events.inc();
                tracing::debug!(
                    ip = %address,
                    proto = protocol,
                    port,
                    down = counts.failure,
                    up = counts.success,
                    "down"
                );
            }
            EventKind::Update => {
                let outcome = self.tracker.record_success(address, protocol, port);
                if !outcome.recorded {
                    self.metrics.filtered.inc();
                    return;
                }
                self.metrics.events.inc();
                let counts = outcome.counts.unwrap_or_default();
                tracing::debug!(
                    ip = %address,
                    proto = protocol,
                    port,
                    down = counts.failure,
                    up = counts.success,
                    tracked = outcome.counts.is_some(),
                    "up"
                );
            }
            EventKind::New | EventKind::Other => self.metrics.filtered.inc(),
        }
    }

    fn outcome(&self, mut errors: Vec<ListenError>, buffer_full: bool) -> Result<(), ListenError> {
        if errors.len() > 1 {
            return Err(ListenError::Multiple(
                errors.iter().map(ToString::to_string).collect(),
            ));
        }
        match errors.pop() {
            Some(err) => Err(err),
            None if buffer_full => {
                self.metrics.buffer_full.inc();
                Err(ListenError::BufferFull)
            }
            None => Ok(()),
        }
    }
}

struct Worker<S> {
    id: usize,
    source: Arc<S>,
    events: mpsc::Sender<Event>,
    metrics: TrackerMetrics,
    cancel: CancellationToken,
}

impl<S: MessageSource> Worker<S> {
    async fn run(self) -> Result<(), WorkerError> {
        loop {
            let batch = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                batch = self.source.receive() => batch?,
            };
            let Some(batch) = batch else {
                tracing::debug!(worker = self.id, "message source closed");
                return Ok(());
            };

            // Multicast notifications carry one message per datagram.
            let [message] = batch.as_slice() else {
                return Err(WorkerError::Batch(batch.len()));
            };

            let Some(event) = classify(message)? else {
                self.metrics.filtered.inc();
                continue;
            };

            match self.events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => self.metrics.dropped.inc(),
                Err(TrySendError::Closed(_)) => return Ok(()),
            }
        }
    }
}
