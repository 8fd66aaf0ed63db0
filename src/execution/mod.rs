//! Session Execution Controls
//!
//! Provides cooperative cancellation for streaming sessions:
//! - Explicit abort from any task or thread
//! - Optional deadline measured from session start

mod cancel;

pub use cancel::{CancelHandle, CancelReason, CancelSignal, Cancelled};
