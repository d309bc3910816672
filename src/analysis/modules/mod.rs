//! Built-in analysis modules, grouped by what they do.

mod arithmetic;
mod elementwise;
mod formula;
mod generators;
mod selection;
mod signal;
mod statistics;

pub use arithmetic::Arithmetic;
pub use elementwise::Elementwise;
pub use formula::FormulaModule;
pub use generators::{ramp, ConstGenerator, RampGenerator, Timer};
pub use selection::{
    first_crossing, Append, IfSelect, Match, RangeFilter, Sort, Subrange, Threshold,
};
pub use signal::{
    gauss_kernel, interpolate, moving_average, smooth, Autocorrelation, Crosscorrelation,
    Differentiate, Fft, GaussSmooth, Integrate, Interpolate, InterpolationMethod, MovingAverage,
};
pub use statistics::{histogram, mean_std, Average, Binning, Count, Extremum, First};
