//! Streaming Session
//!
//! Drives a [`TableDispatcher`] from a transport's event stream until the
//! stream ends, a session-fatal error occurs, or the session is cancelled.
//!
//! ## Session Lifecycle
//!
//! 1. `StreamSession::new()` binds muxer, event stream and cancel signal
//! 2. `cancel_handle()` (optional) hands out an abort handle
//! 3. `stream()` consumes events and returns the [`SessionReport`]
//!
//! A dispatch call in progress is never raced against cancellation, so a
//! handler callback always runs to completion once started.

use crate::config::{Config, DispatchConfig};
use crate::dispatch::{SessionReport, TableDispatcher};
use crate::error::{MuxError, MuxResult, TransportError};
use crate::execution::{CancelHandle, CancelSignal};
use crate::handler::TableMuxer;
use crate::protocol::StreamEvent;
use futures_util::{Stream, StreamExt};
use tracing::{info, warn};

/// One streaming result session
pub struct StreamSession<M, S> {
    dispatcher: TableDispatcher<M>,
    events: S,
    cancel: CancelSignal,
}

impl<M, S> StreamSession<M, S>
where
    M: TableMuxer,
    S: Stream<Item = Result<StreamEvent, TransportError>> + Unpin + Send,
{
    /// Session configured from `config`; the deadline starts now.
    pub fn new(muxer: M, events: S, config: &Config) -> Self {
        let cancel = CancelSignal::from_timeout_ms(config.session.timeout_ms);
        Self::with_cancel(muxer, events, config.dispatch.clone(), cancel)
    }

    /// Session bound to a caller-supplied cancel signal
    pub fn with_cancel(
        muxer: M,
        events: S,
        dispatch: DispatchConfig,
        cancel: CancelSignal,
    ) -> Self {
        StreamSession {
            dispatcher: TableDispatcher::new(muxer, dispatch, cancel.clone()),
            events,
            cancel,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.cancel_handle()
    }

    /// Consume the stream to its end.
    pub async fn stream(self) -> MuxResult<SessionReport> {
        let StreamSession {
            mut dispatcher,
            mut events,
            cancel,
        } = self;

        let outcome = loop {
            let next = tokio::select! {
                biased;
                cancelled = cancel.cancelled() => break Err(MuxError::Cancelled(cancelled)),
                next = events.next() => next,
            };
            match next {
                None => break Ok(()),
                Some(Err(e)) => break Err(MuxError::Transport(e)),
                Some(Ok(event)) => {
                    if let Err(e) = dispatcher.dispatch(event).await {
                        break Err(e);
                    }
                }
            }
        };

        match outcome {
            Ok(()) => {
                let report = dispatcher.finish().await.inspect_err(|e| {
                    warn!(error = %e, "session_failed");
                })?;
                info!(
                    tables_opened = report.tables_opened,
                    tables_completed = report.tables_completed,
                    records_delivered = report.records_delivered,
                    table_errors = report.table_errors.len(),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "session_completed"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "session_failed");
                dispatcher.shutdown().await;
                Err(e)
            }
        }
    }
}
