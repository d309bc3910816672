//! Pass scheduler.
//!
//! Runs the [`AnalysisGraph`] on a dedicated thread. Update requests come in
//! as [`SchedulerCommand`]s or as change notifications from the graph's pure
//! input buffers and are coalesced through a small state machine:
//!
//! ```text
//! Idle ──mark──► Scheduled ──deadline──► Running ──► Idle
//!                   │  ▲                    │
//!                 mark │                  mark
//!                   ▼  │                    ▼
//!             (rerun pending) ◄─────── (rerun pending)
//! ```
//!
//! - `mark` while idle arms a deadline of `max(min_interval, sleep)` where a
//!   finite last value of the dynamic-sleep buffer replaces `sleep`.
//! - `mark` while scheduled or running only sets `rerun_pending`, so any
//!   number of requests during that window yields exactly one extra pass.
//! - At the deadline a stopped experiment returns to idle without running.
//! - After a pass a pending rerun re-arms the deadline; with
//!   `on_user_input == false` the graph re-arms on its own while running.

use crate::buffer::{BufferEvent, BufferHandle, BufferTable};
use crate::config::EngineConfig;
use crate::error::{Result, SampleFlowError};
use crate::pipeline::bridge::{AnalysisEvent, SkipReason};
use crate::pipeline::clock::ExperimentClock;
use crate::pipeline::graph::{AnalysisGraph, PassReport};
use crate::pipeline::id::{PassId, SubscriberId};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

/// Clock shared by the experiment and the scheduler thread.
pub type SharedClock = Arc<Mutex<ExperimentClock>>;

/// Commands sent to the scheduler thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Request a pass.
    NeedsUpdate,
    /// Restart pass numbering at 1.
    ResetPasses,
    /// Stop the thread.
    Shutdown,
}

/// Channel capacity for commands (experiment → scheduler).
const CMD_CHANNEL_CAPACITY: usize = 256;

/// Owner-side handle of the scheduler thread. Dropping it shuts the thread
/// down.
pub struct SchedulerHandle {
    cmd_tx: Sender<SchedulerCommand>,
    running: Arc<AtomicBool>,
    passes: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Request a pass. Returns false if the scheduler thread is gone.
    pub fn mark_needs_update(&self) -> bool {
        self.send(SchedulerCommand::NeedsUpdate)
    }

    pub fn reset_passes(&self) -> bool {
        self.send(SchedulerCommand::ResetPasses)
    }

    /// Whether deadlines may turn into passes.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of the last executed pass since the last reset.
    pub fn passes_executed(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Stop the thread and wait for it. A pass in progress finishes first.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.cmd_tx.send(SchedulerCommand::Shutdown);
        if thread.join().is_err() {
            tracing::error!("Analysis scheduler thread panicked");
        }
    }

    fn send(&self, cmd: SchedulerCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker state. Lives on the scheduler thread.
pub struct Scheduler {
    graph: AnalysisGraph,
    config: EngineConfig,
    dynamic_sleep: Option<BufferHandle>,
    require_fill: Option<BufferHandle>,
    clock: SharedClock,
    running: Arc<AtomicBool>,
    passes: Arc<AtomicU64>,
    events: Sender<AnalysisEvent>,
    cmd_rx: Receiver<SchedulerCommand>,
    buffer_rx: Receiver<BufferEvent>,
    // Kept so `buffer_rx` never disconnects.
    _buffer_tx: Sender<BufferEvent>,
    subscriptions: Vec<(BufferHandle, SubscriberId)>,
    deadline: Option<Instant>,
    rerun_pending: bool,
    pass_index: u64,
    shutdown: bool,
}

impl Scheduler {
    /// Subscribe to the graph's pure inputs and start the scheduler thread.
    ///
    /// `config.dynamic_sleep` and `config.require_fill` must name buffers in
    /// `buffers`.
    pub fn spawn(
        graph: AnalysisGraph,
        config: EngineConfig,
        buffers: &BufferTable,
        clock: SharedClock,
        events: Sender<AnalysisEvent>,
    ) -> Result<SchedulerHandle> {
        let resolve = |name: &Option<String>, what: &str| -> Result<Option<BufferHandle>> {
            name.as_deref()
                .map(|n| {
                    buffers.get_buffer(n).ok_or_else(|| {
                        SampleFlowError::Config(format!("{} buffer '{}' is not declared", what, n))
                    })
                })
                .transpose()
        };
        let dynamic_sleep = resolve(&config.dynamic_sleep, "Dynamic sleep")?;
        let require_fill = resolve(&config.require_fill, "Require-fill")?;

        let (cmd_tx, cmd_rx) = bounded(CMD_CHANNEL_CAPACITY);
        let (buffer_tx, buffer_rx) = unbounded();
        let subscriptions = graph
            .pure_inputs()
            .iter()
            .map(|b| (b.clone(), b.subscribe(buffer_tx.clone(), false)))
            .collect();

        let running = Arc::new(AtomicBool::new(false));
        let passes = Arc::new(AtomicU64::new(0));
        let scheduler = Scheduler {
            graph,
            config,
            dynamic_sleep,
            require_fill,
            clock,
            running: running.clone(),
            passes: passes.clone(),
            events,
            cmd_rx,
            buffer_rx,
            _buffer_tx: buffer_tx,
            subscriptions,
            deadline: None,
            rerun_pending: false,
            pass_index: 0,
            shutdown: false,
        };

        let thread = std::thread::Builder::new()
            .name("analysis-scheduler".into())
            .spawn(move || scheduler.run())?;

        Ok(SchedulerHandle {
            cmd_tx,
            running,
            passes,
            thread: Some(thread),
        })
    }

    fn run(mut self) {
        tracing::debug!(
            "Analysis scheduler started ({} modules)",
            self.graph.len()
        );
        let cmd_rx = self.cmd_rx.clone();
        let buffer_rx = self.buffer_rx.clone();
        while !self.shutdown {
            let timer = match self.deadline {
                Some(deadline) => crossbeam_channel::at(deadline),
                None => crossbeam_channel::never(),
            };
            select! {
                recv(cmd_rx) -> cmd => match cmd {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => self.shutdown = true,
                },
                recv(buffer_rx) -> event => {
                    if let Ok(event) = event {
                        tracing::trace!("Input buffer '{}' changed", event.buffer_name());
                        self.mark();
                    }
                },
                recv(timer) -> _ => self.on_deadline(),
            }
        }
        for (buffer, id) in self.subscriptions.drain(..) {
            buffer.unsubscribe(id);
        }
        tracing::debug!("Analysis scheduler exiting");
    }

    fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::NeedsUpdate => self.mark(),
            SchedulerCommand::ResetPasses => {
                self.pass_index = 0;
                self.passes.store(0, Ordering::SeqCst);
            }
            SchedulerCommand::Shutdown => self.shutdown = true,
        }
    }

    /// Arm the deadline, or note a rerun if one is already armed.
    fn mark(&mut self) {
        if self.deadline.is_some() {
            self.rerun_pending = true;
            return;
        }
        let dynamic = self.dynamic_sleep.as_ref().and_then(|b| b.last());
        self.deadline = Some(Instant::now() + self.config.delay(dynamic));
    }

    fn on_deadline(&mut self) {
        self.deadline = None;
        if !self.running.load(Ordering::SeqCst) {
            tracing::debug!("Scheduled pass cancelled: experiment is not running");
            self.rerun_pending = false;
            return;
        }

        if let Some(buffer) = &self.require_fill {
            let needed = self.config.require_fill_threshold;
            let len = buffer.len();
            if len < needed {
                tracing::debug!(
                    "Pass skipped: '{}' holds {} of {} values",
                    buffer.name(),
                    len,
                    needed
                );
                self.rerun_pending = false;
                self.emit(AnalysisEvent::Skipped(SkipReason::NotFilled {
                    buffer: buffer.name().to_string(),
                    len,
                    needed,
                }));
                return;
            }
        }

        self.pass_index += 1;
        let pass = PassId(self.pass_index);
        self.emit(AnalysisEvent::WillUpdate(pass));

        let time = self
            .clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .context();
        let started = Instant::now();
        let report = self.graph.run_pass(pass, &time);
        tracing::debug!(
            "{:?} finished in {:?}: {} executed, {} failed",
            pass,
            started.elapsed(),
            report.executed,
            report.failed.len()
        );
        self.passes.store(self.pass_index, Ordering::SeqCst);

        self.absorb_requests(&report);
        self.emit(AnalysisEvent::DidUpdate(report));
        if self.shutdown {
            return;
        }

        if self.rerun_pending {
            self.rerun_pending = false;
            self.mark();
        } else if !self.config.on_user_input && self.running.load(Ordering::SeqCst) {
            self.mark();
        }
    }

    /// Fold requests that arrived during a pass into `rerun_pending`.
    ///
    /// Notifications caused by the pass's own input clears are ignored.
    fn absorb_requests(&mut self, report: &PassReport) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                SchedulerCommand::NeedsUpdate => self.rerun_pending = true,
                other => self.handle_command(other),
            }
        }
        while let Ok(BufferEvent::Updated { token, .. }) = self.buffer_rx.try_recv() {
            if !report.cleared.contains(&token) {
                self.rerun_pending = true;
            }
        }
    }

    fn emit(&self, event: AnalysisEvent) {
        match self.events.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Analysis event channel full, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bridge::AnalysisBridge;
    use std::time::Duration;

    fn spawn(config: EngineConfig) -> (SchedulerHandle, AnalysisBridge) {
        let (bridge, events) = AnalysisBridge::new();
        let handle = Scheduler::spawn(
            AnalysisGraph::new(Vec::new()),
            config,
            &BufferTable::new(),
            SharedClock::default(),
            events,
        )
        .unwrap();
        (handle, bridge)
    }

    fn wait_for_passes(handle: &SchedulerHandle, n: u64) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while handle.passes_executed() < n && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_not_running_cancels_pass() {
        let (handle, bridge) = spawn(EngineConfig::default());
        handle.mark_needs_update();
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(handle.passes_executed(), 0);
        assert!(bridge.drain().is_empty());
    }

    #[test]
    fn test_single_pass_events() {
        let (handle, bridge) = spawn(EngineConfig::default());
        handle.set_running(true);
        handle.mark_needs_update();
        wait_for_passes(&handle, 1);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(handle.passes_executed(), 1);

        let events = bridge.drain();
        assert_eq!(events[0], AnalysisEvent::WillUpdate(PassId(1)));
        assert!(matches!(&events[1], AnalysisEvent::DidUpdate(r) if r.pass == PassId(1)));
    }

    #[test]
    fn test_missing_fill_buffer_is_config_error() {
        let (_bridge, events) = AnalysisBridge::new();
        let config = EngineConfig {
            require_fill: Some("ghost".into()),
            ..Default::default()
        };
        let result = Scheduler::spawn(
            AnalysisGraph::new(Vec::new()),
            config,
            &BufferTable::new(),
            SharedClock::default(),
            events,
        );
        assert!(matches!(result, Err(SampleFlowError::Config(_))));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (mut handle, _bridge) = spawn(EngineConfig::default());
        handle.shutdown();
        handle.shutdown();
        assert!(!handle.mark_needs_update());
    }
}
