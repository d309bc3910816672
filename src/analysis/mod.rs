//! Analysis layer: value arithmetic, the formula language, spectral helpers
//! and the built-in modules that run inside an analysis pass.
//!
//! - [`value_source`]: scalar/vector broadcasting shared by arithmetic
//! - [`formula`]: parser and evaluator for `formula` modules
//! - [`fft`]: FFT and correlation helpers
//! - [`io`]: module inputs/outputs and per-pass snapshots
//! - [`module`]: the [`AnalysisModule`] contract and built-in dispatch
//! - [`modules`]: the built-in module implementations

pub mod fft;
pub mod formula;
pub mod io;
pub mod module;
pub mod modules;
pub mod value_source;

pub use fft::{cross_correlate, next_fft_size, FftAnalyzer};
pub use formula::{Formula, FormulaError};
pub use io::{InputData, InputSource, ModuleInput, ModuleOutput, PortMap};
pub use module::{
    default_output_clear, AnalysisModule, AnyModule, BuiltinModule, ModuleContext, ModuleError,
    ModuleSpec, BUILTIN_KINDS,
};
pub use value_source::{BinaryOp, ValueSource};
