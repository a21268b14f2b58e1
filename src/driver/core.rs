//! Driver state machine and advancement loop.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::collector::Collector;
use crate::error::{Error, Result};
use crate::export::{ExportOutcome, Exporter};
use crate::identifiers::RunId;
use crate::network::Interceptor;

use super::advance::Advance;
use super::builder::DriverBuilder;
use super::config::RunConfig;
use super::report::{Reporter, RunEvent, RunReport, StopOutcome, StopReason};

// ============================================================================
// RunState
// ============================================================================

/// Lifecycle of a run: `Idle → Running → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started.
    Idle,
    /// Advancement loop active.
    Running,
    /// Finished or stopped. Terminal.
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Owns one collection run.
///
/// Cheap to clone; clones control the same run, so one clone can
/// [`stop`](Self::stop) a run another clone is awaiting.
///
/// # Example
///
/// ```ignore
/// let driver = Driver::builder()
///     .interceptor(interceptor)
///     .advancer(page)
///     .exporter(Exporter::new(Arc::new(DirectorySink::new("./out"))))
///     .build()?;
///
/// let task = driver.start()?;
/// // ... later, from anywhere:
/// driver.stop()?;
/// let report = task.wait().await?;
/// ```
#[derive(Clone)]
pub struct Driver {
    pub(crate) inner: Arc<DriverInner>,
}

/// Shared state behind a [`Driver`].
pub(crate) struct DriverInner {
    pub run_id: RunId,
    pub config: RunConfig,
    pub interceptor: Interceptor,
    pub advancer: Arc<dyn Advance>,
    pub exporter: Exporter,
    pub reporter: Arc<dyn Reporter>,
    pub state: Mutex<RunState>,
    /// Wakes the loop out of its poll wait when a stop is requested.
    pub wake: Notify,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("run_id", &self.inner.run_id)
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Driver - Constructor
// ============================================================================

impl Driver {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> DriverBuilder {
        DriverBuilder::new()
    }

    pub(crate) fn from_parts(
        config: RunConfig,
        interceptor: Interceptor,
        advancer: Arc<dyn Advance>,
        exporter: Exporter,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                run_id: RunId::next(),
                config,
                interceptor,
                advancer,
                exporter,
                reporter,
                state: Mutex::new(RunState::Idle),
                wake: Notify::new(),
            }),
        }
    }
}

// ============================================================================
// Driver - Accessors
// ============================================================================

impl Driver {
    /// Returns the run ID.
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.inner.run_id
    }

    /// Returns the run configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.inner.config
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> RunState {
        *self.inner.state.lock()
    }

    /// Returns `true` while the loop is active.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Returns the collector fed by this run's interceptor.
    #[inline]
    #[must_use]
    pub fn collector(&self) -> &Arc<Collector> {
        self.inner.interceptor.collector()
    }

    /// Returns the interceptor armed by this run.
    #[inline]
    #[must_use]
    pub fn interceptor(&self) -> &Interceptor {
        &self.inner.interceptor
    }
}

// ============================================================================
// Driver - Lifecycle
// ============================================================================

impl Driver {
    /// Starts the run and drives it on the current task until it ends.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the driver is not idle. A failed
    /// automatic export is carried in [`RunReport::export_error`].
    pub async fn run(&self) -> Result<RunReport> {
        self.begin()?;
        self.run_loop().await
    }

    /// Starts the run on a spawned task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the driver is not idle.
    pub fn start(&self) -> Result<RunTask> {
        self.begin()?;

        let driver = self.clone();
        let handle = tokio::spawn(async move { driver.run_loop().await });

        Ok(RunTask { handle })
    }

    /// Stops a running run and exports exactly once.
    ///
    /// Stopping an idle or already stopped driver is a reported no-op.
    ///
    /// # Errors
    ///
    /// Returns the export error if the artifact could not be written. The
    /// run is stopped regardless.
    pub fn stop(&self) -> Result<StopOutcome> {
        let previous = {
            let mut state = self.inner.state.lock();
            let previous = *state;
            if previous == RunState::Running {
                *state = RunState::Stopped;
            }
            previous
        };

        match previous {
            RunState::Idle => {
                self.report(&RunEvent::NotStarted);
                Ok(StopOutcome::NotStarted)
            }
            RunState::Stopped => {
                self.report(&RunEvent::AlreadyStopped);
                Ok(StopOutcome::AlreadyStopped)
            }
            RunState::Running => {
                self.inner.wake.notify_one();
                info!(run_id = %self.inner.run_id, "Stop requested");
                self.report(&RunEvent::StopRequested);
                self.export().map(StopOutcome::Stopped)
            }
        }
    }

    /// Exports the collector's current contents.
    ///
    /// Allowed in every state; each call produces a new artifact.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the artifact could not be written.
    pub fn export(&self) -> Result<ExportOutcome> {
        let snapshot = self.collector().snapshot();
        let outcome = self.inner.exporter.export(&snapshot)?;

        match &outcome {
            ExportOutcome::Empty => self.report(&RunEvent::NothingToExport),
            ExportOutcome::Written(summary) => {
                self.report(&RunEvent::Exported(summary.clone()));
            }
        }

        Ok(outcome)
    }
}

// ============================================================================
// Driver - Internal
// ============================================================================

impl Driver {
    /// Moves `Idle → Running` and arms the interceptor.
    fn begin(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != RunState::Idle {
                return Err(Error::invalid_state("start", *state));
            }
            *state = RunState::Running;
        }

        self.inner.interceptor.arm();

        let config = &self.inner.config;
        info!(
            run_id = %self.inner.run_id,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            max_attempts = config.max_attempts,
            stall_threshold = config.stall_threshold,
            "Run started"
        );
        self.report(&RunEvent::Started {
            poll_interval_ms: config.poll_interval.as_millis() as u64,
            max_attempts: config.max_attempts,
            stall_threshold: config.stall_threshold,
        });

        Ok(())
    }

    /// Moves `Running → Stopped`.
    ///
    /// Returns `false` if a stop call got there first.
    fn finish(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state == RunState::Running {
            *state = RunState::Stopped;
            true
        } else {
            false
        }
    }

    /// Advancement loop with stall detection.
    async fn run_loop(&self) -> Result<RunReport> {
        let run_id = self.inner.run_id;
        let config = self.inner.config;
        let collector = Arc::clone(self.collector());

        let mut last_count = 0usize;
        let mut no_change_streak = 0u32;
        let mut attempts = 0u32;

        let reason = loop {
            if !self.is_running() {
                break StopReason::Stopped;
            }
            if attempts >= config.max_attempts {
                break StopReason::AttemptCap;
            }

            let current_count = collector.size();
            if current_count != last_count {
                no_change_streak = 0;
                self.report(&RunEvent::Progress {
                    records: current_count,
                    requests: collector.requests_observed(),
                    attempts,
                });
            } else {
                no_change_streak += 1;
            }

            if no_change_streak >= config.stall_threshold {
                break StopReason::Stalled;
            }

            last_count = current_count;
            attempts += 1;

            // A slow page must not hold a stop past one poll interval.
            tokio::select! {
                result = self.inner.advancer.advance() => {
                    if let Err(e) = result {
                        warn!(run_id = %run_id, attempt = attempts, error = %e, "Advance failed");
                        self.report(&RunEvent::AdvanceFailed {
                            attempt: attempts,
                            message: e.to_string(),
                        });
                    }
                }
                () = self.inner.wake.notified() => {
                    debug!(run_id = %run_id, attempt = attempts, "Advance abandoned on stop");
                    continue;
                }
            }

            if !self.is_running() {
                continue;
            }

            tokio::select! {
                () = sleep(config.poll_interval) => {}
                () = self.inner.wake.notified() => {
                    debug!(run_id = %run_id, "Poll wait interrupted");
                }
            }
        };

        // A stop call may land between the loop's decision and this point;
        // whoever flips the state owns the export.
        let self_stopped = reason != StopReason::Stopped && self.finish();
        let reason = if self_stopped {
            reason
        } else {
            StopReason::Stopped
        };

        match reason {
            StopReason::Stalled => self.report(&RunEvent::Stalled {
                threshold: config.stall_threshold,
            }),
            StopReason::AttemptCap => self.report(&RunEvent::AttemptCapReached {
                max_attempts: config.max_attempts,
            }),
            StopReason::Stopped => {}
        }

        let records = collector.size();
        info!(run_id = %run_id, %reason, attempts, records, "Run finished");
        self.report(&RunEvent::Finished { records });

        let mut export = None;
        let mut export_error = None;
        if self_stopped && records > 0 {
            match self.export() {
                Ok(outcome) => export = Some(outcome),
                Err(e) => {
                    error!(run_id = %run_id, error = %e, "Automatic export failed");
                    self.report(&RunEvent::ExportFailed {
                        message: e.to_string(),
                    });
                    export_error = Some(e.to_string());
                }
            }
        }

        Ok(RunReport {
            run_id,
            reason,
            attempts,
            records,
            requests_observed: collector.requests_observed(),
            export,
            export_error,
        })
    }

    fn report(&self, event: &RunEvent) {
        self.inner.reporter.report(self.inner.run_id, event);
    }
}

// ============================================================================
// RunTask
// ============================================================================

/// Handle to a run started with [`Driver::start`].
#[derive(Debug)]
pub struct RunTask {
    handle: JoinHandle<Result<RunReport>>,
}

impl RunTask {
    /// Waits for the loop to exit.
    ///
    /// # Errors
    ///
    /// - [`Error::Task`] if the task panicked
    /// - the run's own error otherwise
    pub async fn wait(self) -> Result<RunReport> {
        self.handle.await?
    }

    /// Returns `true` once the loop has exited.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::Instant;

    use crate::driver::report::ChannelReporter;
    use crate::export::MemorySink;
    use crate::extract::ExtractionPolicy;

    /// Inserts one new record per call for the first `grow_for` calls.
    struct ScriptedAdvance {
        collector: Arc<Collector>,
        grow_for: u32,
        calls: AtomicU32,
        fail: bool,
        delay: Duration,
    }

    impl ScriptedAdvance {
        fn new(collector: &Arc<Collector>, grow_for: u32) -> Arc<Self> {
            Arc::new(Self {
                collector: Arc::clone(collector),
                grow_for,
                calls: AtomicU32::new(0),
                fail: false,
                delay: Duration::ZERO,
            })
        }

        fn slow(collector: &Arc<Collector>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                collector: Arc::clone(collector),
                grow_for: 0,
                calls: AtomicU32::new(0),
                fail: false,
                delay,
            })
        }

        fn failing(collector: &Arc<Collector>) -> Arc<Self> {
            Arc::new(Self {
                collector: Arc::clone(collector),
                grow_for: 0,
                calls: AtomicU32::new(0),
                fail: true,
                delay: Duration::ZERO,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Advance for ScriptedAdvance {
        async fn advance(&self) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(Error::connection("page went away"));
            }
            if call <= self.grow_for {
                self.collector
                    .observe_response([crate::collector::Record::new(format!("k{call}"), "v")]);
            }
            Ok(())
        }
    }

    struct Harness {
        driver: Driver,
        sink: Arc<MemorySink>,
        events: UnboundedReceiver<(RunId, RunEvent)>,
    }

    fn harness(
        config: RunConfig,
        collector: Arc<Collector>,
        advance: Arc<ScriptedAdvance>,
    ) -> Harness {
        let sink = Arc::new(MemorySink::new());
        let (reporter, events) = ChannelReporter::new();
        let interceptor = Interceptor::new(ExtractionPolicy::default(), collector);

        let driver = Driver::builder()
            .config(config)
            .interceptor(interceptor)
            .advancer(advance)
            .exporter(Exporter::new(sink.clone()))
            .reporter(reporter)
            .build()
            .expect("build");

        Harness {
            driver,
            sink,
            events,
        }
    }

    fn drain(events: &mut UnboundedReceiver<(RunId, RunEvent)>) -> Vec<RunEvent> {
        let mut out = Vec::new();
        while let Ok((_, event)) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn fast(max_attempts: u32, stall_threshold: u32) -> RunConfig {
        RunConfig::new()
            .with_poll_interval(Duration::from_millis(2500))
            .with_max_attempts(max_attempts)
            .with_stall_threshold(stall_threshold)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_after_growth_stops() {
        let collector = Arc::new(Collector::new());
        let advance = ScriptedAdvance::new(&collector, 4);
        let mut h = harness(fast(1000, 3), Arc::clone(&collector), advance.clone());

        let report = h.driver.run().await.expect("run");

        assert_eq!(report.reason, StopReason::Stalled);
        assert_eq!(report.attempts, 4 + 3);
        assert_eq!(advance.calls(), 7);
        assert_eq!(report.records, 4);
        assert_eq!(h.driver.state(), RunState::Stopped);

        assert_eq!(h.sink.len(), 1);
        assert_eq!(h.sink.artifacts()[0].0, "collected_complete_4.json");
        assert!(matches!(report.export, Some(ExportOutcome::Written(_))));

        let events = drain(&mut h.events);
        assert!(events.contains(&RunEvent::Stalled { threshold: 3 }));
        assert!(!events.iter().any(|e| matches!(e, RunEvent::AttemptCapReached { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flat_sequence_stops_after_third_sample() {
        let collector = Arc::new(Collector::new());
        collector.put("A", "1");
        let advance = ScriptedAdvance::new(&collector, 0);
        let h = harness(fast(1000, 2), Arc::clone(&collector), advance.clone());

        let report = h.driver.run().await.expect("run");

        assert_eq!(report.reason, StopReason::Stalled);
        assert_eq!(report.attempts, 2);
        assert_eq!(advance.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_cap_with_steady_growth() {
        let collector = Arc::new(Collector::new());
        let advance = ScriptedAdvance::new(&collector, u32::MAX);
        let mut h = harness(fast(5, 3), Arc::clone(&collector), advance.clone());

        let report = h.driver.run().await.expect("run");

        assert_eq!(report.reason, StopReason::AttemptCap);
        assert_eq!(report.attempts, 5);
        assert_eq!(advance.calls(), 5);
        assert_eq!(h.sink.len(), 1);

        let events = drain(&mut h.events);
        assert!(events.contains(&RunEvent::AttemptCapReached { max_attempts: 5 }));
        assert!(!events.iter().any(|e| matches!(e, RunEvent::Stalled { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reported_on_change_only() {
        let collector = Arc::new(Collector::new());
        let advance = ScriptedAdvance::new(&collector, 2);
        let mut h = harness(fast(1000, 2), Arc::clone(&collector), advance);

        h.driver.run().await.expect("run");

        let progress: Vec<RunEvent> = drain(&mut h.events)
            .into_iter()
            .filter(|e| matches!(e, RunEvent::Progress { .. }))
            .collect();

        assert_eq!(
            progress,
            vec![
                RunEvent::Progress {
                    records: 1,
                    requests: 1,
                    attempts: 1
                },
                RunEvent::Progress {
                    records: 2,
                    requests: 2,
                    attempts: 2
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_stop_exports_once() {
        let collector = Arc::new(Collector::new());
        collector.put("A", "1");
        let advance = ScriptedAdvance::new(&collector, 0);
        let h = harness(fast(1000, 30), Arc::clone(&collector), advance);

        let started = Instant::now();
        let task = h.driver.start().expect("start");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let outcome = h.driver.stop().expect("stop");
        assert!(matches!(outcome, StopOutcome::Stopped(ExportOutcome::Written(_))));

        let report = task.wait().await.expect("wait");
        assert_eq!(report.reason, StopReason::Stopped);
        assert!(report.export.is_none());
        assert_eq!(h.sink.len(), 1);
        assert!(started.elapsed() < Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_stop_is_noop() {
        let collector = Arc::new(Collector::new());
        collector.put("A", "1");
        let advance = ScriptedAdvance::new(&collector, 0);
        let mut h = harness(fast(1000, 30), Arc::clone(&collector), advance);

        let task = h.driver.start().expect("start");
        h.driver.stop().expect("stop");
        task.wait().await.expect("wait");

        assert_eq!(h.driver.stop().expect("stop"), StopOutcome::AlreadyStopped);
        assert_eq!(h.sink.len(), 1);
        assert!(drain(&mut h.events).contains(&RunEvent::AlreadyStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_start() {
        let collector = Arc::new(Collector::new());
        let advance = ScriptedAdvance::new(&collector, 0);
        let h = harness(fast(1000, 30), collector, advance);

        assert_eq!(h.driver.stop().expect("stop"), StopOutcome::NotStarted);
        assert_eq!(h.driver.state(), RunState::Idle);
        assert!(h.sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cannot_start_twice() {
        let collector = Arc::new(Collector::new());
        let advance = ScriptedAdvance::new(&collector, 0);
        let h = harness(fast(3, 30), collector, advance);

        h.driver.run().await.expect("run");
        let err = h.driver.run().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert!(h.driver.start().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_run_skips_auto_export() {
        let collector = Arc::new(Collector::new());
        let advance = ScriptedAdvance::new(&collector, 0);
        let h = harness(fast(1000, 3), collector, advance);

        let report = h.driver.run().await.expect("run");

        assert_eq!(report.reason, StopReason::Stalled);
        assert_eq!(report.records, 0);
        assert!(report.export.is_none());
        assert!(h.sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_failure_is_not_fatal() {
        let collector = Arc::new(Collector::new());
        let advance = ScriptedAdvance::failing(&collector);
        let mut h = harness(fast(1000, 2), collector, advance.clone());

        let report = h.driver.run().await.expect("run");

        assert_eq!(report.reason, StopReason::Stalled);
        assert_eq!(advance.calls(), 1);
        assert!(drain(&mut h.events).iter().any(|e| matches!(
            e,
            RunEvent::AdvanceFailed { attempt: 1, .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_arms_interceptor_and_stop_keeps_it_armed() {
        let collector = Arc::new(Collector::new());
        let advance = ScriptedAdvance::new(&collector, 0);
        let h = harness(fast(1000, 30), Arc::clone(&collector), advance);

        assert!(!h.driver.interceptor().is_armed());
        let task = h.driver.start().expect("start");
        assert!(h.driver.interceptor().is_armed());

        h.driver.stop().expect("stop");
        task.wait().await.expect("wait");
        assert!(h.driver.interceptor().is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_interval_paces_attempts() {
        let collector = Arc::new(Collector::new());
        let advance = ScriptedAdvance::new(&collector, 0);
        let h = harness(fast(4, 30), collector, advance);

        let started = Instant::now();
        h.driver.run().await.expect("run");

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(4 * 2500));
        assert!(elapsed < Duration::from_millis(5 * 2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_slow_advance() {
        let collector = Arc::new(Collector::new());
        collector.put("A", "1");
        let advance = ScriptedAdvance::slow(&collector, Duration::from_secs(30));
        let h = harness(fast(1000, 30), Arc::clone(&collector), advance.clone());

        let started = Instant::now();
        let task = h.driver.start().expect("start");
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.driver.stop().expect("stop");

        let report = task.wait().await.expect("wait");

        assert!(started.elapsed() < Duration::from_millis(2500));
        assert_eq!(report.reason, StopReason::Stopped);
        assert_eq!(advance.calls(), 1);
        assert_eq!(h.sink.len(), 1);
    }

    struct BrokenSink;

    impl crate::export::ExportSink for BrokenSink {
        fn persist(&self, name: &str, _contents: &str) -> Result<crate::export::Artifact> {
            Err(Error::export(name, "disk full"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_auto_export_keeps_report() {
        let collector = Arc::new(Collector::new());
        let advance = ScriptedAdvance::new(&collector, 2);
        let (reporter, mut events) = ChannelReporter::new();

        let driver = Driver::builder()
            .config(fast(1000, 2))
            .interceptor(Interceptor::new(ExtractionPolicy::default(), collector))
            .advancer(advance)
            .exporter(Exporter::new(Arc::new(BrokenSink)))
            .reporter(reporter)
            .build()
            .expect("build");

        let report = driver.run().await.expect("run");

        assert_eq!(report.reason, StopReason::Stalled);
        assert_eq!(report.records, 2);
        assert_eq!(report.attempts, 2 + 2);
        assert!(report.export.is_none());
        assert!(report.export_error.as_deref().is_some_and(|m| m.contains("disk full")));
        assert!(
            drain(&mut events)
                .iter()
                .any(|e| matches!(e, RunEvent::ExportFailed { .. }))
        );
    }
}
