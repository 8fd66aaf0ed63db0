//! Table Dispatcher
//!
//! Routes table-scoped stream events to per-table handlers.
//!
//! ## Per-table lifecycle
//!
//! ```text
//! TableOpened ──► decode schema ──► accept_table ──► handle_init
//! RowBatch    ──► decode batch  ──► handle_record (per row, in order)
//! TableClosed ──► handle_done   ──► tombstone
//! ```
//!
//! Failures scoped to one table (bad schema, rejected table, handler
//! errors, malformed batches) are collected into the [`SessionReport`] and
//! the table's remaining events are consumed without callbacks. Protocol
//! violations and cancellation end the session.
//!
//! ## Module Structure
//!
//! - `worker` - Per-table tasks for `per_table_worker` mode

mod worker;

use crate::config::{DispatchConfig, DispatchMode, RecordErrorPolicy, RejectPolicy};
use crate::error::{MuxError, MuxResult, TableError, Violation};
use crate::execution::CancelSignal;
use crate::handler::{TableMuxer, TableRecordHandler};
use crate::protocol::{RawSchema, RowBatch, StreamEvent, TableId};
use crate::types::TableMetadata;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use worker::{join_worker, TableWorker, WorkerContext, WorkerExit, WorkerReport};

/// Outcome of a session that ran to the end of its stream
#[derive(Debug, Default)]
pub struct SessionReport {
    /// Distinct tables announced by the stream
    pub tables_opened: usize,
    /// Tables whose `handle_done` returned successfully
    pub tables_completed: usize,
    /// Records handed to `handle_record`, successful or not
    pub records_delivered: u64,
    /// Per-table failures, attributed to the table that raised them
    pub table_errors: Vec<(TableId, TableError)>,
    pub elapsed: Duration,
}

impl SessionReport {
    /// No table reported an error
    pub fn is_clean(&self) -> bool {
        self.table_errors.is_empty()
    }

    /// Errors raised by one table
    pub fn errors_for<'a>(&'a self, table_id: &'a str) -> impl Iterator<Item = &'a TableError> + 'a {
        self.table_errors
            .iter()
            .filter(move |(id, _)| id.as_str() == table_id)
            .map(|(_, e)| e)
    }
}

struct InlineTable {
    metadata: Arc<TableMetadata>,
    handler: Box<dyn TableRecordHandler>,
    rows: u64,
}

enum TableSlot {
    Inline(InlineTable),
    Worker(TableWorker),
    /// Failed or rejected; later events are consumed without callbacks
    Aborted,
    /// Cleanly closed; any later event is a protocol violation
    Closed,
}

/// Push-based demultiplexer from one event stream to many table handlers
pub struct TableDispatcher<M> {
    muxer: M,
    config: DispatchConfig,
    cancel: CancelSignal,
    halted: Arc<AtomicBool>,
    tables: HashMap<TableId, TableSlot>,
    /// Workers whose table has closed or aborted, awaiting their report
    pending: Vec<(TableId, JoinHandle<WorkerReport>)>,
    table_errors: Vec<(TableId, TableError)>,
    tables_opened: usize,
    tables_completed: usize,
    records_delivered: u64,
    started: Instant,
}

fn push_table_error(errors: &mut Vec<(TableId, TableError)>, table_id: &TableId, error: TableError) {
    warn!(table_id = %table_id, kind = error.kind(), error = %error, "table_error");
    errors.push((table_id.clone(), error));
}

impl<M: TableMuxer> TableDispatcher<M> {
    pub fn new(muxer: M, config: DispatchConfig, cancel: CancelSignal) -> Self {
        TableDispatcher {
            muxer,
            config,
            cancel,
            halted: Arc::new(AtomicBool::new(false)),
            tables: HashMap::new(),
            pending: Vec::new(),
            table_errors: Vec::new(),
            tables_opened: 0,
            tables_completed: 0,
            records_delivered: 0,
            started: Instant::now(),
        }
    }

    /// Inline dispatch with default policies and no deadline
    pub fn with_defaults(muxer: M) -> Self {
        Self::new(muxer, DispatchConfig::default(), CancelSignal::never())
    }

    pub fn muxer(&self) -> &M {
        &self.muxer
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Tables opened and not yet closed or aborted
    pub fn open_tables(&self) -> usize {
        self.tables
            .values()
            .filter(|slot| matches!(slot, TableSlot::Inline(_) | TableSlot::Worker(_)))
            .count()
    }

    /// Apply one event.
    ///
    /// Returns an error only for session-fatal conditions; per-table
    /// failures are recorded and dispatch continues.
    pub async fn dispatch(&mut self, event: StreamEvent) -> MuxResult<()> {
        self.cancel.check()?;
        trace!(table_id = %event.table_id(), event = event.kind(), "dispatch_event");
        match event {
            StreamEvent::TableOpened { table_id, schema } => self.open_table(table_id, schema).await,
            StreamEvent::RowBatch { table_id, batch } => self.route_batch(table_id, batch).await,
            StreamEvent::TableClosed { table_id } => self.close_table(table_id).await,
        }
    }

    async fn open_table(&mut self, table_id: TableId, schema: RawSchema) -> MuxResult<()> {
        match self.tables.get(&table_id) {
            Some(TableSlot::Closed) => {
                return Err(MuxError::violation(&table_id, Violation::EventAfterClose))
            }
            Some(_) => return Err(MuxError::violation(&table_id, Violation::DuplicateOpen)),
            None => {}
        }
        self.tables_opened += 1;

        let metadata = match schema.decode() {
            Ok(metadata) => Arc::new(metadata),
            Err(e) => {
                self.fail_table(table_id, TableError::Schema(e));
                return Ok(());
            }
        };

        self.cancel.check()?;
        let handler = match self.muxer.accept_table(&metadata).await {
            Ok(Some(handler)) => handler,
            Ok(None) => {
                match self.config.reject_policy {
                    RejectPolicy::Error => self.fail_table(
                        table_id,
                        TableError::Rejected {
                            table: metadata.name().to_string(),
                        },
                    ),
                    RejectPolicy::Drop => {
                        debug!(table_id = %table_id, table = metadata.name(), "table_dropped");
                        self.tables.insert(table_id, TableSlot::Aborted);
                    }
                }
                return Ok(());
            }
            Err(source) => {
                let table = metadata.name().to_string();
                self.fail_table(table_id, TableError::Resolve { table, source });
                return Ok(());
            }
        };

        debug!(
            table_id = %table_id,
            table = metadata.name(),
            columns = metadata.num_columns(),
            "table_opened"
        );

        let slot = match self.config.mode {
            DispatchMode::Inline => {
                let mut handler = handler;
                self.cancel.check()?;
                if let Err(e) = handler.handle_init(&metadata).await {
                    self.fail_table(table_id, TableError::Init(e));
                    return Ok(());
                }
                TableSlot::Inline(InlineTable {
                    metadata,
                    handler,
                    rows: 0,
                })
            }
            DispatchMode::PerTableWorker => {
                let ctx = WorkerContext {
                    cancel: self.cancel.clone(),
                    halted: Arc::clone(&self.halted),
                    record_error_policy: self.config.record_error_policy,
                    queue_depth: self.config.worker_queue_depth,
                };
                TableSlot::Worker(TableWorker::spawn(&table_id, metadata, handler, ctx))
            }
        };
        self.tables.insert(table_id, slot);
        Ok(())
    }

    async fn route_batch(&mut self, table_id: TableId, batch: RowBatch) -> MuxResult<()> {
        let failure = match self.tables.get_mut(&table_id) {
            None => return Err(MuxError::violation(&table_id, Violation::BatchBeforeOpen)),
            Some(TableSlot::Closed) => {
                return Err(MuxError::violation(&table_id, Violation::EventAfterClose))
            }
            Some(TableSlot::Aborted) => {
                trace!(table_id = %table_id, rows = batch.num_rows, "batch_skipped");
                return Ok(());
            }
            Some(TableSlot::Inline(table)) => match batch.decode(&table.metadata) {
                Err(e) => Some(TableError::Decode(e)),
                Ok(decoded) => {
                    let mut failure = None;
                    for record in decoded.records() {
                        self.cancel.check()?;
                        let row = table.rows;
                        table.rows += 1;
                        self.records_delivered += 1;
                        if let Err(source) = table.handler.handle_record(&record).await {
                            let abort = source.is_fatal()
                                || self.config.record_error_policy == RecordErrorPolicy::AbortTable;
                            let error = TableError::Record { row, source };
                            if abort {
                                failure = Some(error);
                                break;
                            }
                            push_table_error(&mut self.table_errors, &table_id, error);
                        }
                    }
                    failure
                }
            },
            Some(TableSlot::Worker(worker)) => {
                if worker.has_exited() {
                    return Ok(());
                }
                match batch.decode(worker.metadata()) {
                    Err(e) => Some(TableError::Decode(e)),
                    Ok(decoded) => {
                        worker.send(decoded).await;
                        None
                    }
                }
            }
        };

        if let Some(error) = failure {
            if let Some(TableSlot::Worker(worker)) =
                self.tables.insert(table_id.clone(), TableSlot::Aborted)
            {
                let join = worker.abort().await;
                self.pending.push((table_id.clone(), join));
            }
            push_table_error(&mut self.table_errors, &table_id, error);
        }
        Ok(())
    }

    async fn close_table(&mut self, table_id: TableId) -> MuxResult<()> {
        let slot = match self.tables.get_mut(&table_id) {
            None => return Err(MuxError::violation(&table_id, Violation::CloseBeforeOpen)),
            Some(TableSlot::Closed) => {
                return Err(MuxError::violation(&table_id, Violation::EventAfterClose))
            }
            Some(slot) => std::mem::replace(slot, TableSlot::Closed),
        };

        match slot {
            TableSlot::Inline(mut table) => {
                self.cancel.check()?;
                match table.handler.handle_done().await {
                    Ok(()) => {
                        self.tables_completed += 1;
                        debug!(table_id = %table_id, rows = table.rows, "table_completed");
                    }
                    Err(e) => push_table_error(&mut self.table_errors, &table_id, TableError::Done(e)),
                }
            }
            TableSlot::Worker(worker) => {
                let join = worker.close().await;
                self.pending.push((table_id, join));
            }
            TableSlot::Aborted | TableSlot::Closed => {
                debug!(table_id = %table_id, "aborted_table_closed");
            }
        }
        Ok(())
    }

    fn fail_table(&mut self, table_id: TableId, error: TableError) {
        push_table_error(&mut self.table_errors, &table_id, error);
        self.tables.insert(table_id, TableSlot::Aborted);
    }

    /// Fold a finished worker into the session totals; `true` if it stopped
    /// on cancellation.
    fn absorb(&mut self, table_id: &TableId, result: Result<WorkerReport, TableError>) -> bool {
        let mut stopped = false;
        match result {
            Ok(report) => {
                self.records_delivered += report.records_delivered;
                for error in report.errors {
                    self.table_errors.push((table_id.clone(), error));
                }
                match report.exit {
                    WorkerExit::Completed => self.tables_completed += 1,
                    WorkerExit::Disconnected => {
                        push_table_error(&mut self.table_errors, table_id, TableError::Incomplete)
                    }
                    WorkerExit::Stopped => stopped = true,
                    WorkerExit::Failed => {}
                }
            }
            Err(e) => push_table_error(&mut self.table_errors, table_id, e),
        }
        stopped
    }

    /// End of stream: report tables left open as incomplete and wait for
    /// every worker.
    ///
    /// Fails with `Cancelled` if a worker stopped on cancellation before
    /// its table was finished.
    pub async fn finish(mut self) -> MuxResult<SessionReport> {
        let mut open: Vec<(TableId, TableSlot)> = self
            .tables
            .drain()
            .filter(|(_, slot)| matches!(slot, TableSlot::Inline(_) | TableSlot::Worker(_)))
            .collect();
        open.sort_by(|a, b| a.0.cmp(&b.0));

        for (table_id, slot) in open {
            match slot {
                TableSlot::Inline(table) => {
                    debug!(table_id = %table_id, rows = table.rows, "table_incomplete");
                    push_table_error(&mut self.table_errors, &table_id, TableError::Incomplete);
                }
                TableSlot::Worker(worker) => self.pending.push((table_id, worker.disconnect())),
                TableSlot::Aborted | TableSlot::Closed => {}
            }
        }

        let mut stopped = false;
        for (table_id, join) in std::mem::take(&mut self.pending) {
            let result = join_worker(join).await;
            stopped |= self.absorb(&table_id, result);
        }
        if stopped {
            self.cancel.check()?;
        }

        Ok(SessionReport {
            tables_opened: self.tables_opened,
            tables_completed: self.tables_completed,
            records_delivered: self.records_delivered,
            table_errors: self.table_errors,
            elapsed: self.started.elapsed(),
        })
    }

    /// Session-fatal stop: workers make no further callbacks and are joined.
    pub async fn shutdown(mut self) {
        self.halted.store(true, Ordering::Release);
        for (table_id, slot) in self.tables.drain() {
            if let TableSlot::Worker(worker) = slot {
                self.pending.push((table_id, worker.disconnect()));
            }
        }
        for (table_id, join) in self.pending.drain(..) {
            if let Err(e) = join_worker(join).await {
                warn!(table_id = %table_id, error = %e, "worker_join_failed");
            }
        }
        debug!(
            tables_opened = self.tables_opened,
            records_delivered = self.records_delivered,
            "dispatcher_shutdown"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{FnMuxer, HandlerError};
    use crate::protocol::RawColumnSchema;
    use crate::types::{DataType, Datum, Record};
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        log: Log,
        fail_on: Option<i64>,
    }

    #[async_trait::async_trait]
    impl TableRecordHandler for Recorder {
        async fn handle_init(&mut self, m: &TableMetadata) -> Result<(), HandlerError> {
            self.log.lock().push(format!("init {}", m.name()));
            Ok(())
        }
        async fn handle_record(&mut self, r: &Record) -> Result<(), HandlerError> {
            if let (Some(bad), Some(Datum::Int64(v))) = (self.fail_on, r.get_datum("n")) {
                if *v == bad {
                    return Err(HandlerError::new("bad value"));
                }
            }
            self.log.lock().push(format!("rec {r}"));
            Ok(())
        }
        async fn handle_done(&mut self) -> Result<(), HandlerError> {
            self.log.lock().push("done".to_string());
            Ok(())
        }
    }

    fn recorder_muxer(
        log: Log,
        fail_on: Option<i64>,
    ) -> FnMuxer<impl FnMut(&TableMetadata) -> Option<Box<dyn TableRecordHandler>> + Send> {
        FnMuxer(move |_m: &TableMetadata| -> Option<Box<dyn TableRecordHandler>> {
            Some(Box::new(Recorder {
                log: Arc::clone(&log),
                fail_on,
            }))
        })
    }

    fn schema() -> RawSchema {
        RawSchema::new("nums", vec![RawColumnSchema::plain("n", DataType::Int64)])
    }

    fn rows(values: &[i64]) -> RowBatch {
        let rows: Vec<Vec<Datum>> = values.iter().map(|v| vec![Datum::Int64(*v)]).collect();
        RowBatch::from_rows(&[DataType::Int64], &rows).unwrap()
    }

    #[tokio::test]
    async fn test_record_error_continue_policy() {
        let log = Log::default();
        let mut dispatcher = TableDispatcher::with_defaults(recorder_muxer(Arc::clone(&log), Some(2)));
        dispatcher.dispatch(StreamEvent::opened("t", schema())).await.unwrap();
        dispatcher.dispatch(StreamEvent::batch("t", rows(&[1, 2, 3]))).await.unwrap();
        dispatcher.dispatch(StreamEvent::closed("t")).await.unwrap();
        let report = dispatcher.finish().await.unwrap();

        assert_eq!(*log.lock(), vec!["init nums", "rec 1", "rec 3", "done"]);
        assert_eq!(report.tables_completed, 1);
        assert_eq!(report.records_delivered, 3);
        assert!(matches!(
            report.table_errors.as_slice(),
            [(_, TableError::Record { row: 1, .. })]
        ));
    }

    #[tokio::test]
    async fn test_record_error_abort_policy() {
        let log = Log::default();
        let config = DispatchConfig {
            record_error_policy: RecordErrorPolicy::AbortTable,
            ..DispatchConfig::default()
        };
        let mut dispatcher = TableDispatcher::new(
            recorder_muxer(Arc::clone(&log), Some(2)),
            config,
            CancelSignal::never(),
        );
        dispatcher.dispatch(StreamEvent::opened("t", schema())).await.unwrap();
        dispatcher.dispatch(StreamEvent::batch("t", rows(&[1, 2, 3]))).await.unwrap();
        dispatcher.dispatch(StreamEvent::batch("t", rows(&[4]))).await.unwrap();
        dispatcher.dispatch(StreamEvent::closed("t")).await.unwrap();
        let report = dispatcher.finish().await.unwrap();

        assert_eq!(*log.lock(), vec!["init nums", "rec 1"]);
        assert_eq!(report.tables_completed, 0);
        assert_eq!(report.errors_for("t").count(), 1);
    }

    #[tokio::test]
    async fn test_decode_error_aborts_table() {
        let log = Log::default();
        let mut dispatcher = TableDispatcher::with_defaults(recorder_muxer(Arc::clone(&log), None));
        dispatcher.dispatch(StreamEvent::opened("t", schema())).await.unwrap();
        let bad = RowBatch::from_rows(&[DataType::String], &[vec![Datum::from("x")]]).unwrap();
        dispatcher.dispatch(StreamEvent::batch("t", bad)).await.unwrap();
        dispatcher.dispatch(StreamEvent::batch("t", rows(&[1]))).await.unwrap();
        dispatcher.dispatch(StreamEvent::closed("t")).await.unwrap();
        let report = dispatcher.finish().await.unwrap();

        assert_eq!(*log.lock(), vec!["init nums"]);
        assert!(matches!(report.table_errors[0].1, TableError::Decode(_)));
    }

    #[tokio::test]
    async fn test_event_after_close_is_violation() {
        let log = Log::default();
        let mut dispatcher = TableDispatcher::with_defaults(recorder_muxer(log, None));
        dispatcher.dispatch(StreamEvent::opened("t", schema())).await.unwrap();
        dispatcher.dispatch(StreamEvent::closed("t")).await.unwrap();
        let err = dispatcher
            .dispatch(StreamEvent::batch("t", rows(&[1])))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MuxError::ProtocolViolation {
                violation: Violation::EventAfterClose,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_open_tables_count() {
        let mut dispatcher = TableDispatcher::with_defaults(recorder_muxer(Log::default(), None));
        dispatcher.dispatch(StreamEvent::opened("a", schema())).await.unwrap();
        dispatcher.dispatch(StreamEvent::opened("b", schema())).await.unwrap();
        assert_eq!(dispatcher.open_tables(), 2);
        dispatcher.dispatch(StreamEvent::closed("a")).await.unwrap();
        assert_eq!(dispatcher.open_tables(), 1);

        let report = dispatcher.finish().await.unwrap();
        assert_eq!(report.tables_opened, 2);
        assert_eq!(report.tables_completed, 1);
        assert!(matches!(
            report.errors_for("b").next(),
            Some(TableError::Incomplete)
        ));
    }
}
