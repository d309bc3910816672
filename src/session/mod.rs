//! Experiment sessions
//!
//! An [`Experiment`] owns the buffers and the scheduler built from one
//! [`ExperimentDescriptor`] and drives them through start, stop and clear.
//! Collaborators (acquisition, UI, export) reach buffers through
//! [`Experiment::get_buffer`] and receive pass notifications through
//! [`Experiment::bridge`].
//!
//! # Lifecycle
//!
//! - `start` opens every buffer, starts the clock and requests a pass.
//! - `stop` pauses the clock; a pass scheduled but not yet started is
//!   cancelled, one already running finishes.
//! - `clear` stops, resets every buffer to its base contents, closes the
//!   buffers and restarts pass numbering and the clock.
//!
//! Dropping the experiment stops the scheduler thread and closes buffers.

pub mod state;
pub mod types;

pub use state::{load_state, save_state, BUFFER_EXTENSION, DESCRIPTOR_FILE, STATE_EXTENSION};
pub use types::ExperimentState;

use crate::buffer::{BufferHandle, BufferTable};
use crate::config::{EngineConfig, ExperimentDescriptor};
use crate::error::{Result, SampleFlowError};
use crate::pipeline::{
    build_buffers, AnalysisBridge, GraphBuilder, Scheduler, SchedulerHandle, SharedClock,
    TimeContext,
};
use std::sync::PoisonError;

pub struct Experiment {
    descriptor: ExperimentDescriptor,
    config: EngineConfig,
    buffers: BufferTable,
    clock: SharedClock,
    state: ExperimentState,
    scheduler: SchedulerHandle,
    bridge: AnalysisBridge,
}

impl Experiment {
    /// Build with the descriptor's own engine config (or the default).
    pub fn new(descriptor: ExperimentDescriptor) -> Result<Self> {
        let config = descriptor.config.clone().unwrap_or_default();
        Self::build(descriptor, config, &GraphBuilder::new())
    }

    /// Build with an explicit engine config and a builder carrying any
    /// registered module kinds.
    pub fn build(
        descriptor: ExperimentDescriptor,
        config: EngineConfig,
        builder: &GraphBuilder,
    ) -> Result<Self> {
        let buffers = build_buffers(&descriptor)?;
        let graph = builder.build(&descriptor, &buffers)?;
        let clock = SharedClock::default();
        let (bridge, events) = AnalysisBridge::new();
        let scheduler = Scheduler::spawn(graph, config.clone(), &buffers, clock.clone(), events)?;

        tracing::info!(
            "Loaded experiment '{}' ({} buffers, {} modules)",
            descriptor.title,
            buffers.len(),
            descriptor.modules.len()
        );
        Ok(Self {
            descriptor,
            config,
            buffers,
            clock,
            state: ExperimentState::Idle,
            scheduler,
            bridge,
        })
    }

    pub fn title(&self) -> &str {
        &self.descriptor.title
    }

    pub fn descriptor(&self) -> &ExperimentDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> ExperimentState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn buffers(&self) -> &BufferTable {
        &self.buffers
    }

    pub fn get_buffer(&self, name: &str) -> Option<BufferHandle> {
        self.buffers.get_buffer(name)
    }

    /// UI-side end of the scheduler's event channel.
    pub fn bridge(&self) -> &AnalysisBridge {
        &self.bridge
    }

    /// Number of the last executed pass since the last clear.
    pub fn passes_executed(&self) -> u64 {
        self.scheduler.passes_executed()
    }

    pub fn time_context(&self) -> TimeContext {
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .context()
    }

    /// Ask for an analysis pass.
    pub fn mark_needs_update(&self) -> Result<()> {
        if self.scheduler.mark_needs_update() {
            Ok(())
        } else {
            Err(SampleFlowError::Channel(
                "analysis scheduler is not running".into(),
            ))
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state.is_running() {
            return Ok(());
        }
        if !self.state.has_started() {
            self.buffers.open_all()?;
        }
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start();
        self.scheduler.set_running(true);
        self.state = ExperimentState::Running;
        tracing::info!("Experiment '{}' started", self.title());
        self.mark_needs_update()
    }

    pub fn stop(&mut self) {
        if !self.state.is_running() {
            return;
        }
        self.scheduler.set_running(false);
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pause();
        self.state = ExperimentState::Stopped;
        tracing::info!("Experiment '{}' stopped", self.title());
    }

    /// Stop and drop all recorded data. Buffers attached to a text field
    /// keep their value.
    pub fn clear(&mut self) -> Result<()> {
        self.stop();
        for buffer in self.buffers.iter() {
            if buffer.attached_to_text_field() {
                continue;
            }
            buffer.reset_static();
            buffer.clear();
        }
        self.buffers.close_all()?;
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        self.scheduler.reset_passes();
        self.state = ExperimentState::Idle;
        tracing::info!("Experiment '{}' cleared", self.title());
        Ok(())
    }
}

impl Drop for Experiment {
    fn drop(&mut self) {
        self.scheduler.shutdown();
        if let Err(e) = self.buffers.close_all() {
            tracing::warn!("Failed to close buffers of '{}': {}", self.title(), e);
        }
    }
}
