//! Background writer for telemetry history.
//!
//! Enqueueing never waits: when the queue is full the record is dropped
//! with a warning. On shutdown the writer drains the records already
//! queued, then exits.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use greenhub_domain::telemetry::TelemetryRecord;

use crate::ports::TelemetryHistoryRepository;

/// Sending half of the history queue.
#[derive(Debug, Clone)]
pub struct HistoryWriter {
    sender: mpsc::Sender<TelemetryRecord>,
}

impl HistoryWriter {
    /// Spawn the writer task with a queue of `capacity` records.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn spawn<R>(
        repo: Arc<R>,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>)
    where
        R: TelemetryHistoryRepository + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity);
        let task = tokio::spawn(run(repo, receiver, shutdown));
        (Self { sender }, task)
    }

    /// Queue a record for persistence, returning whether it was accepted.
    pub fn enqueue(&self, record: TelemetryRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                tracing::warn!(device = %record.device, "history queue full, dropping record");
                false
            }
            Err(TrySendError::Closed(record)) => {
                tracing::warn!(device = %record.device, "history writer stopped, dropping record");
                false
            }
        }
    }
}

async fn run<R>(repo: Arc<R>, mut receiver: mpsc::Receiver<TelemetryRecord>, shutdown: CancellationToken)
where
    R: TelemetryHistoryRepository + Send + Sync,
{
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            next = receiver.recv() => match next {
                Some(record) => write(repo.as_ref(), record).await,
                None => return,
            },
        }
    }
    receiver.close();
    let mut drained = 0_usize;
    while let Some(record) = receiver.recv().await {
        write(repo.as_ref(), record).await;
        drained += 1;
    }
    tracing::debug!(drained, "history writer stopped");
}

async fn write<R: TelemetryHistoryRepository>(repo: &R, record: TelemetryRecord) {
    let device = record.device.clone();
    if let Err(err) = repo.record(record).await {
        tracing::warn!(%device, error = %err, "failed to persist telemetry history");
    }
}
