//! Analysis pipeline: graph construction, pass execution and scheduling.
//!
//! # Architecture
//!
//! ```text
//! ExperimentDescriptor ──► GraphBuilder ──► AnalysisGraph ──► Scheduler thread
//!                                                                │
//!  input buffers ── BufferEvent ─────────────────────────────────┤
//!  Experiment ───── SchedulerCommand ────────────────────────────┘
//!                                                                │
//!  UI thread ◄──── AnalysisEvent (AnalysisBridge) ◄──────────────┘
//! ```
//!
//! # Design
//!
//! - **Load-time validation**: every descriptor problem is a [`LoadError`].
//! - **Snapshot, compute, write**: a module's outputs change only when it
//!   succeeds, so per-pass errors never leave half-written buffers.
//! - **Single worker thread**: modules run in declared order on the
//!   scheduler thread; passes never overlap.

pub mod bridge;
pub mod builder;
pub mod clock;
pub mod error;
pub mod graph;
pub mod id;
pub mod scheduler;

pub use bridge::{AnalysisBridge, AnalysisDelegate, AnalysisEvent, SkipReason};
pub use builder::{build_buffers, GraphBuilder, ModuleFactory};
pub use clock::{ExperimentClock, TimeContext};
pub use error::{LoadError, LoadResult};
pub use graph::{AnalysisGraph, CycleRange, ModuleSlot, PassReport};
pub use id::{ModuleId, PassId, SubscriberId};
pub use scheduler::{Scheduler, SchedulerCommand, SchedulerHandle, SharedClock};
