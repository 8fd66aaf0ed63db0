//! Per-table worker tasks
//!
//! In `per_table_worker` mode each resolved table gets its own tokio task.
//! The dispatcher decodes batches and pushes them through a bounded queue;
//! the worker owns the handler and makes every callback for that table, so
//! per-table order is the queue order.

use crate::config::RecordErrorPolicy;
use crate::error::TableError;
use crate::execution::CancelSignal;
use crate::handler::TableRecordHandler;
use crate::protocol::{DecodedBatch, TableId};
use crate::types::TableMetadata;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

pub(crate) enum WorkerMessage {
    Batch(DecodedBatch),
    /// Table closed cleanly: call `handle_done`
    Close,
    /// Table aborted by the dispatcher: stop without `handle_done`
    Abort,
}

/// How a worker task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    Completed,
    /// Init, record or done failure ended the table
    Failed,
    /// Cancellation or session halt observed before a callback
    Stopped,
    /// Queue closed without a close or abort message
    Disconnected,
}

#[derive(Debug)]
pub(crate) struct WorkerReport {
    pub records_delivered: u64,
    pub errors: Vec<TableError>,
    pub exit: WorkerExit,
}

/// Everything a worker needs besides its handler and queue
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub cancel: CancelSignal,
    pub halted: Arc<AtomicBool>,
    pub record_error_policy: RecordErrorPolicy,
    pub queue_depth: usize,
}

impl WorkerContext {
    fn should_stop(&self) -> bool {
        self.halted.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }
}

/// Dispatcher-side handle of a running worker
pub(crate) struct TableWorker {
    metadata: Arc<TableMetadata>,
    sender: mpsc::Sender<WorkerMessage>,
    join: JoinHandle<WorkerReport>,
}

impl TableWorker {
    pub(crate) fn spawn(
        table_id: &TableId,
        metadata: Arc<TableMetadata>,
        handler: Box<dyn TableRecordHandler>,
        ctx: WorkerContext,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(ctx.queue_depth.max(1));
        let span = tracing::debug_span!("table_worker", table_id = %table_id);
        let join = tokio::spawn(
            run_worker(handler, Arc::clone(&metadata), receiver, ctx).instrument(span),
        );
        TableWorker {
            metadata,
            sender,
            join,
        }
    }

    pub(crate) fn metadata(&self) -> &Arc<TableMetadata> {
        &self.metadata
    }

    /// The worker has already ended the table on its own
    pub(crate) fn has_exited(&self) -> bool {
        self.sender.is_closed()
    }

    /// Queue a batch, waiting while the queue is full.
    ///
    /// A worker that already exited has recorded its own failure, so a
    /// closed queue is not an error here.
    pub(crate) async fn send(&self, batch: DecodedBatch) {
        let _ = self.sender.send(WorkerMessage::Batch(batch)).await;
    }

    /// Ask the worker to finish the table and hand back its task
    pub(crate) async fn close(self) -> JoinHandle<WorkerReport> {
        let _ = self.sender.send(WorkerMessage::Close).await;
        self.join
    }

    /// Ask the worker to stop without `handle_done`
    pub(crate) async fn abort(self) -> JoinHandle<WorkerReport> {
        let _ = self.sender.send(WorkerMessage::Abort).await;
        self.join
    }

    /// Drop the queue; the worker drains what is queued and exits
    pub(crate) fn disconnect(self) -> JoinHandle<WorkerReport> {
        drop(self.sender);
        self.join
    }
}

/// Wait for a worker and turn a panic into a table error
pub(crate) async fn join_worker(join: JoinHandle<WorkerReport>) -> Result<WorkerReport, TableError> {
    match join.await {
        Ok(report) => Ok(report),
        Err(e) if e.is_panic() => Err(TableError::WorkerFailed(panic_message(e.into_panic()))),
        Err(e) => Err(TableError::WorkerFailed(e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

async fn run_worker(
    mut handler: Box<dyn TableRecordHandler>,
    metadata: Arc<TableMetadata>,
    mut receiver: mpsc::Receiver<WorkerMessage>,
    ctx: WorkerContext,
) -> WorkerReport {
    let mut report = WorkerReport {
        records_delivered: 0,
        errors: Vec::new(),
        exit: WorkerExit::Stopped,
    };

    if ctx.should_stop() {
        return report;
    }
    if let Err(e) = handler.handle_init(&metadata).await {
        warn!(error = %e, "handler_init_failed");
        report.errors.push(TableError::Init(e));
        report.exit = WorkerExit::Failed;
        return report;
    }

    let mut row: u64 = 0;
    while let Some(message) = receiver.recv().await {
        match message {
            WorkerMessage::Batch(batch) => {
                for record in batch.records() {
                    if ctx.should_stop() {
                        debug!(rows = row, "worker_stopped");
                        return report;
                    }
                    let current = row;
                    row += 1;
                    report.records_delivered += 1;
                    if let Err(source) = handler.handle_record(&record).await {
                        let abort = source.is_fatal()
                            || ctx.record_error_policy == RecordErrorPolicy::AbortTable;
                        warn!(row = current, error = %source, abort, "record_failed");
                        report.errors.push(TableError::Record {
                            row: current,
                            source,
                        });
                        if abort {
                            report.exit = WorkerExit::Failed;
                            return report;
                        }
                    }
                }
            }
            WorkerMessage::Close => {
                if ctx.should_stop() {
                    return report;
                }
                report.exit = match handler.handle_done().await {
                    Ok(()) => {
                        debug!(rows = row, "table_completed");
                        WorkerExit::Completed
                    }
                    Err(e) => {
                        warn!(error = %e, "handler_done_failed");
                        report.errors.push(TableError::Done(e));
                        WorkerExit::Failed
                    }
                };
                return report;
            }
            WorkerMessage::Abort => {
                report.exit = WorkerExit::Failed;
                return report;
            }
        }
    }

    report.exit = WorkerExit::Disconnected;
    report
}
