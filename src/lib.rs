//! # SampleFlow-RS: buffer-driven analysis engine
//!
//! Continuous numeric samples (sensor readings, user input, derived results)
//! land in named buffers. A declared graph of analysis modules is
//! re-computed whenever new input arrives, no more often than a minimum
//! interval allows.
//!
//! ## Architecture
//!
//! - **Buffers**: thread-safe sample stores, optionally size-bounded or
//!   backed by a file, with change notifications over crossbeam channels
//! - **Analysis**: arithmetic with scalar/vector broadcasting, a formula
//!   language, FFT and correlation kernels and the built-in modules
//! - **Pipeline**: descriptor validation, pass execution and a scheduler
//!   thread that coalesces update requests
//! - **Session**: experiment lifecycle and saved state folders
//!
//! ## Configuration
//!
//! Engine settings and saved states live in the platform data directory
//! under `dev.sampleflow.sampleflow-rs`:
//!
//! - **Linux**: `~/.local/share/dev.sampleflow.sampleflow-rs/`
//! - **macOS**: `~/Library/Application Support/dev.sampleflow.sampleflow-rs/`
//! - **Windows**: `%APPDATA%\dev.sampleflow.sampleflow-rs\`
//!
//! ## Example
//!
//! ```no_run
//! use sampleflow_rs::config::{
//!     BufferDescriptor, ExperimentDescriptor, InputDescriptor, ModuleDescriptor,
//!     OutputDescriptor,
//! };
//! use sampleflow_rs::session::Experiment;
//!
//! fn main() -> sampleflow_rs::Result<()> {
//!     let mut descriptor = ExperimentDescriptor::new("magnitude");
//!     descriptor.buffers = vec![
//!         BufferDescriptor::new("x", 100),
//!         BufferDescriptor::new("y", 100),
//!         BufferDescriptor::new("r", 100),
//!     ];
//!     descriptor.modules.push(
//!         ModuleDescriptor::new("formula")
//!             .param("formula", "sqrt([1]^2 + [2]^2)")
//!             .input(InputDescriptor::buffer("x"))
//!             .input(InputDescriptor::buffer("y"))
//!             .output(OutputDescriptor::buffer("r")),
//!     );
//!
//!     let mut experiment = Experiment::new(descriptor)?;
//!     experiment.start()?;
//!     experiment.get_buffer("x").unwrap().append_from_slice(&[3.0, 6.0]);
//!     experiment.get_buffer("y").unwrap().append_from_slice(&[4.0, 8.0]);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod buffer;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;

// Re-export commonly used types
pub use buffer::{BufferHandle, BufferTable, SampleBuffer, StoragePolicy};
pub use config::{EngineConfig, ExperimentDescriptor};
pub use error::{Result, SampleFlowError};
pub use pipeline::{AnalysisBridge, AnalysisDelegate, AnalysisEvent, LoadError};
pub use session::Experiment;
