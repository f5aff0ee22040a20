//! Error handling and recovery.
//!
//! [`ErrorHandler`] classifies every error that bubbles out of an adapter
//! into one of four severities and owns the process-level hooks;
//! [`RecoveryManager`] runs the per-tag strategies for the recoverable ones.
//! Critical tags never trigger recovery; warnings never abort a phase.

mod handler;
mod strategies;

pub use handler::{
    classify_gateway, classify_git, classify_message, Classification, ErrorHandler, ErrorTag,
    Severity, ShutdownFlag,
};
pub use strategies::{RecoveryAttempt, RecoveryContext, RecoveryManager, RecoveryOutcome};
