//! Run events, reporters and final reports.
//!
//! Reporting is observability only. The driver's decisions never depend on
//! a reporter.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::export::{ExportOutcome, ExportSummary};
use crate::identifiers::RunId;

// ============================================================================
// StopReason
// ============================================================================

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No growth for `stall_threshold` consecutive samples.
    Stalled,

    /// `max_attempts` advancement attempts were made.
    AttemptCap,

    /// [`Driver::stop`](super::Driver::stop) was called.
    Stopped,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Stalled => "stall detected",
            Self::AttemptCap => "attempt cap reached",
            Self::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

// ============================================================================
// RunReport
// ============================================================================

/// Summary returned when a run's loop exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,

    /// Why the run ended.
    pub reason: StopReason,

    /// Advancement attempts made.
    pub attempts: u32,

    /// Distinct records collected when the loop exited.
    pub records: usize,

    /// Matching responses observed when the loop exited.
    pub requests_observed: u64,

    /// Automatic export performed by the loop, if any.
    ///
    /// `None` when the run was stopped externally (the stop call exported)
    /// or nothing was collected.
    pub export: Option<ExportOutcome>,

    /// Why the automatic export failed, if it did.
    ///
    /// The run's counters stay valid; call [`Driver::export`] to retry.
    ///
    /// [`Driver::export`]: super::Driver::export
    pub export_error: Option<String>,
}

// ============================================================================
// StopOutcome
// ============================================================================

/// Result of [`Driver::stop`](super::Driver::stop).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The run was stopped and exported once.
    Stopped(ExportOutcome),

    /// The run had already stopped; nothing was exported.
    AlreadyStopped,

    /// The run never started; nothing was exported.
    NotStarted,
}

// ============================================================================
// RunEvent
// ============================================================================

/// Human-readable status updates emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// The loop started.
    Started {
        /// Poll interval in milliseconds.
        poll_interval_ms: u64,
        /// Attempt cap.
        max_attempts: u32,
        /// Stall threshold.
        stall_threshold: u32,
    },

    /// The record count changed since the previous sample.
    Progress {
        /// Distinct records.
        records: usize,
        /// Matching responses observed.
        requests: u64,
        /// Attempts made so far.
        attempts: u32,
    },

    /// An advancement action failed; the loop carries on.
    AdvanceFailed {
        /// Attempt number that failed.
        attempt: u32,
        /// Failure description.
        message: String,
    },

    /// The stall threshold was reached.
    Stalled {
        /// Consecutive no-growth samples.
        threshold: u32,
    },

    /// The attempt cap was reached.
    AttemptCapReached {
        /// The cap.
        max_attempts: u32,
    },

    /// A stop was requested while running.
    StopRequested,

    /// A stop was requested after the run ended.
    AlreadyStopped,

    /// A stop was requested before the run began.
    NotStarted,

    /// The loop finished.
    Finished {
        /// Distinct records collected.
        records: usize,
    },

    /// An artifact was exported.
    Exported(ExportSummary),

    /// An export was requested with nothing collected.
    NothingToExport,

    /// Writing an artifact failed.
    ExportFailed {
        /// Failure description.
        message: String,
    },
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started {
                poll_interval_ms,
                max_attempts,
                stall_threshold,
            } => write!(
                f,
                "auto-advance started (every {poll_interval_ms}ms, at most {max_attempts} attempts, \
                 stop after {stall_threshold} idle polls)"
            ),
            Self::Progress {
                records,
                requests,
                attempts,
            } => write!(
                f,
                "collected {records} records ({requests} requests, {attempts} attempts)"
            ),
            Self::AdvanceFailed { attempt, message } => {
                write!(f, "advance attempt {attempt} failed: {message}")
            }
            Self::Stalled { threshold } => write!(
                f,
                "no new records for {threshold} consecutive polls, collection complete"
            ),
            Self::AttemptCapReached { max_attempts } => {
                write!(f, "reached the attempt cap ({max_attempts}), stopping")
            }
            Self::StopRequested => f.write_str("stopped, exporting"),
            Self::AlreadyStopped => f.write_str("already stopped"),
            Self::NotStarted => f.write_str("not started"),
            Self::Finished { records } => write!(f, "collection finished: {records} records"),
            Self::Exported(summary) => write!(
                f,
                "exported {} ({} records, {} requests observed)",
                summary.artifact.name, summary.records, summary.requests_observed
            ),
            Self::NothingToExport => f.write_str("nothing to export"),
            Self::ExportFailed { message } => write!(f, "export failed: {message}"),
        }
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Progress/report channel.
pub trait Reporter: Send + Sync {
    /// Emits one event.
    fn report(&self, run_id: RunId, event: &RunEvent);
}

/// Writes events to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, run_id: RunId, event: &RunEvent) {
        match event {
            RunEvent::AdvanceFailed { .. } | RunEvent::AlreadyStopped | RunEvent::NotStarted => {
                warn!(run_id = %run_id, "{event}");
            }
            RunEvent::ExportFailed { .. } => error!(run_id = %run_id, "{event}"),
            _ => info!(run_id = %run_id, "{event}"),
        }
    }
}

/// Forwards events over an unbounded channel.
///
/// Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<(RunId, RunEvent)>,
}

impl ChannelReporter {
    /// Creates a reporter and the receiving end.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(RunId, RunEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Reporter for ChannelReporter {
    fn report(&self, run_id: RunId, event: &RunEvent) {
        let _ = self.tx.send((run_id, event.clone()));
    }
}

// ============================================================================
// Tests
// ============================================================================
