//! Thread boundary between the analysis scheduler and the UI-affine thread.
//!
//! The scheduler thread never calls back into the UI directly. It pushes
//! [`AnalysisEvent`]s onto a bounded channel; the owning thread drains them
//! with [`AnalysisBridge::dispatch`], which is where "will/did update"
//! callbacks run.

use crate::pipeline::graph::PassReport;
use crate::pipeline::id::PassId;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Why a scheduled pass did not run.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The fill buffer holds fewer values than required.
    NotFilled {
        buffer: String,
        len: usize,
        needed: usize,
    },
}

/// Messages sent from the scheduler thread.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    /// A pass is about to run.
    WillUpdate(PassId),
    /// A pass finished.
    DidUpdate(PassReport),
    /// A scheduled pass was not run.
    Skipped(SkipReason),
}

/// Receiver of pass notifications on the UI-affine thread.
#[cfg_attr(test, mockall::automock)]
pub trait AnalysisDelegate {
    fn will_update(&mut self, pass: PassId);

    fn did_update(&mut self, report: &PassReport);

    fn skipped(&mut self, _reason: &SkipReason) {}
}

/// Channel capacity for events (scheduler → UI).
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

/// UI-side handle for scheduler events.
pub struct AnalysisBridge {
    event_rx: Receiver<AnalysisEvent>,
}

impl AnalysisBridge {
    /// Create a bridge and the sender the scheduler thread owns.
    pub fn new() -> (Self, Sender<AnalysisEvent>) {
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        (Self { event_rx }, event_tx)
    }

    /// Drain all pending events.
    pub fn drain(&self) -> Vec<AnalysisEvent> {
        self.event_rx.try_iter().collect()
    }

    pub fn try_recv(&self) -> Option<AnalysisEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Block up to `timeout` for the next event. `None` on timeout or when
    /// the scheduler is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<AnalysisEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Deliver every pending event to `delegate`; returns how many were
    /// delivered.
    pub fn dispatch(&self, delegate: &mut dyn AnalysisDelegate) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            match &event {
                AnalysisEvent::WillUpdate(pass) => delegate.will_update(*pass),
                AnalysisEvent::DidUpdate(report) => delegate.did_update(report),
                AnalysisEvent::Skipped(reason) => delegate.skipped(reason),
            }
            delivered += 1;
        }
        delivered
    }
}
