//! Analysis module abstraction.
//!
//! Two-layer design:
//! - **`AnalysisModule` trait**: the contract every transform implements, and
//!   the entry point for modules registered from outside the crate.
//! - **`BuiltinModule` enum**: every built-in kind, dispatched with a `match`
//!   so a pass over built-in modules has no dynamic dispatch.
//!
//! `AnyModule` wraps either variant so the graph handles both uniformly.
//!
//! A module never touches buffers itself. The graph snapshots the inputs
//! into a [`ModuleContext`], the module fills in results per output, and the
//! graph writes them back only when [`AnalysisModule::compute`] succeeded.

use super::formula::FormulaError;
use super::io::{InputData, PortMap};
use super::modules::{
    Append, Arithmetic, Autocorrelation, Average, Binning, ConstGenerator, Count,
    Crosscorrelation, Differentiate, Elementwise, Extremum, Fft, First, FormulaModule,
    GaussSmooth, IfSelect, Integrate, Interpolate, Match, MovingAverage, RampGenerator,
    RangeFilter, Sort, Subrange, Threshold, Timer,
};
use crate::pipeline::clock::TimeContext;
use crate::pipeline::error::{LoadError, LoadResult};
use std::collections::BTreeMap;
use thiserror::Error;

/// Most values a module may create from a parameter or a data range rather
/// than from its inputs' lengths.
pub const MAX_GENERATED_LEN: usize = 1 << 24;

/// Why a module produced nothing for the current pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModuleError {
    #[error("input '{role}' is empty")]
    EmptyInput { role: &'static str },

    #[error("input '{role}' holds {got} values, {needed} needed")]
    InsufficientInput {
        role: &'static str,
        needed: usize,
        got: usize,
    },

    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error("{what} would hold {len} values, the limit is {limit}")]
    TooLarge {
        what: &'static str,
        len: usize,
        limit: usize,
    },

    #[error("{0}")]
    Computation(String),
}

impl ModuleError {
    /// Fail with [`ModuleError::TooLarge`] when `len` exceeds [`MAX_GENERATED_LEN`].
    pub fn check_len(what: &'static str, len: usize) -> Result<usize, ModuleError> {
        if len > MAX_GENERATED_LEN {
            return Err(ModuleError::TooLarge {
                what,
                len,
                limit: MAX_GENERATED_LEN,
            });
        }
        Ok(len)
    }
}

/// Per-pass view handed to [`AnalysisModule::compute`].
pub struct ModuleContext<'a> {
    inputs: &'a [InputData],
    output_sizes: &'a [usize],
    /// Timestamps of the current pass.
    pub time: &'a TimeContext,
    results: Vec<Option<Vec<f64>>>,
}

impl<'a> ModuleContext<'a> {
    pub fn new(inputs: &'a [InputData], output_sizes: &'a [usize], time: &'a TimeContext) -> Self {
        Self {
            inputs,
            output_sizes,
            time,
            results: vec![None; output_sizes.len()],
        }
    }

    /// Input bound at load time. Indices come from the module's own port map.
    pub fn input(&self, idx: usize) -> &'a InputData {
        &self.inputs[idx]
    }

    pub fn optional(&self, idx: Option<usize>) -> Option<&'a InputData> {
        idx.and_then(|i| self.inputs.get(i))
    }

    /// Newest value of an optional scalar input.
    pub fn single(&self, idx: Option<usize>) -> Option<f64> {
        self.optional(idx).and_then(InputData::single)
    }

    pub fn inputs(&self) -> &'a [InputData] {
        self.inputs
    }

    /// Declared capacity of an output buffer (`0` = unbounded).
    pub fn output_size(&self, idx: usize) -> usize {
        self.output_sizes.get(idx).copied().unwrap_or(0)
    }

    /// Stage `values` for output `idx`. Unbound outputs are ignored.
    pub fn set_output(&mut self, idx: Option<usize>, values: Vec<f64>) {
        if let Some(slot) = idx.and_then(|i| self.results.get_mut(i)) {
            *slot = Some(values);
        }
    }

    pub fn into_results(self) -> Vec<Option<Vec<f64>>> {
        self.results
    }
}

/// Contract shared by every analysis transform.
pub trait AnalysisModule: Send {
    /// Descriptor kind this module was built from.
    fn kind(&self) -> &str;

    /// Compute outputs from the snapshot in `cx`.
    ///
    /// An `Err` means the module contributes nothing this pass.
    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError>;
}

/// Load-time view of one module descriptor.
pub struct ModuleSpec<'a> {
    pub index: usize,
    pub kind: &'a str,
    params: &'a BTreeMap<String, String>,
    pub inputs: PortMap,
    pub outputs: PortMap,
}

impl<'a> ModuleSpec<'a> {
    pub fn new(
        index: usize,
        kind: &'a str,
        params: &'a BTreeMap<String, String>,
        inputs: PortMap,
        outputs: PortMap,
    ) -> Self {
        Self {
            index,
            kind,
            params,
            inputs,
            outputs,
        }
    }

    pub fn invalid(&self, message: impl Into<String>) -> LoadError {
        LoadError::InvalidDescriptor {
            index: self.index,
            kind: self.kind.to_string(),
            message: message.into(),
        }
    }

    pub fn text(&self, key: &str) -> Option<&'a str> {
        self.params.get(key).map(String::as_str)
    }

    /// Boolean parameter, `default` when absent.
    pub fn flag_or(&self, key: &str, default: bool) -> LoadResult<bool> {
        match self.text(key).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(self.invalid(format!("parameter '{}' is not a boolean: '{}'", key, v))),
            },
        }
    }

    pub fn flag(&self, key: &str) -> LoadResult<bool> {
        self.flag_or(key, false)
    }

    pub fn number(&self, key: &str) -> LoadResult<Option<f64>> {
        self.text(key)
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|_| self.invalid(format!("parameter '{}' is not a number: '{}'", key, v)))
            })
            .transpose()
    }

    pub fn input(&mut self, role: &str) -> Option<usize> {
        self.inputs.take(role)
    }

    pub fn require_input(&mut self, role: &str) -> LoadResult<usize> {
        self.inputs
            .take(role)
            .ok_or_else(|| self.invalid(format!("missing input '{}'", role)))
    }

    pub fn output(&mut self, role: &str) -> Option<usize> {
        self.outputs.take(role)
    }
}

/// Output write policy before descriptor overrides: `timer` accumulates,
/// everything else replaces its outputs each pass.
pub fn default_output_clear(kind: &str) -> bool {
    kind != "timer"
}

/// Kinds understood by [`BuiltinModule::build`].
pub const BUILTIN_KINDS: &[&str] = &[
    "add",
    "subtract",
    "multiply",
    "divide",
    "power",
    "gcd",
    "lcm",
    "atan2",
    "abs",
    "round",
    "log",
    "sin",
    "cos",
    "tan",
    "sinh",
    "cosh",
    "tanh",
    "asin",
    "acos",
    "atan",
    "const",
    "ramp",
    "timer",
    "first",
    "count",
    "average",
    "max",
    "min",
    "threshold",
    "binning",
    "append",
    "differentiate",
    "integrate",
    "fft",
    "autocorrelation",
    "crosscorrelation",
    "gausssmooth",
    "movingaverage",
    "interpolate",
    "rangefilter",
    "subrange",
    "sort",
    "match",
    "if",
    "formula",
];

/// Enum dispatch for built-in modules.
pub enum BuiltinModule {
    Arithmetic(Arithmetic),
    Elementwise(Elementwise),
    Const(ConstGenerator),
    Ramp(RampGenerator),
    Timer(Timer),
    First(First),
    Count(Count),
    Average(Average),
    Extremum(Extremum),
    Threshold(Threshold),
    Binning(Binning),
    Append(Append),
    Differentiate(Differentiate),
    Integrate(Integrate),
    Fft(Fft),
    Autocorrelation(Autocorrelation),
    Crosscorrelation(Crosscorrelation),
    GaussSmooth(GaussSmooth),
    MovingAverage(MovingAverage),
    Interpolate(Interpolate),
    RangeFilter(RangeFilter),
    Subrange(Subrange),
    Sort(Sort),
    Match(Match),
    If(IfSelect),
    Formula(FormulaModule),
}

impl BuiltinModule {
    /// Build the module for `spec.kind`, or `None` if the kind is not built in.
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Option<Self>> {
        let module = match spec.kind {
            "add" | "subtract" | "multiply" | "divide" | "power" | "gcd" | "lcm" | "atan2" => {
                BuiltinModule::Arithmetic(Arithmetic::build(spec)?)
            }
            "abs" | "round" | "log" | "sin" | "cos" | "tan" | "sinh" | "cosh" | "tanh" | "asin"
            | "acos" | "atan" => BuiltinModule::Elementwise(Elementwise::build(spec)?),
            "const" => BuiltinModule::Const(ConstGenerator::build(spec)?),
            "ramp" => BuiltinModule::Ramp(RampGenerator::build(spec)?),
            "timer" => BuiltinModule::Timer(Timer::build(spec)?),
            "first" => BuiltinModule::First(First::build(spec)),
            "count" => BuiltinModule::Count(Count::build(spec)),
            "average" => BuiltinModule::Average(Average::build(spec)?),
            "max" | "min" => BuiltinModule::Extremum(Extremum::build(spec)?),
            "threshold" => BuiltinModule::Threshold(Threshold::build(spec)?),
            "binning" => BuiltinModule::Binning(Binning::build(spec)?),
            "append" => BuiltinModule::Append(Append::build(spec)),
            "differentiate" => BuiltinModule::Differentiate(Differentiate::build(spec)?),
            "integrate" => BuiltinModule::Integrate(Integrate::build(spec)?),
            "fft" => BuiltinModule::Fft(Fft::build(spec)?),
            "autocorrelation" => BuiltinModule::Autocorrelation(Autocorrelation::build(spec)?),
            "crosscorrelation" => BuiltinModule::Crosscorrelation(Crosscorrelation::build(spec)?),
            "gausssmooth" => BuiltinModule::GaussSmooth(GaussSmooth::build(spec)?),
            "movingaverage" => BuiltinModule::MovingAverage(MovingAverage::build(spec)?),
            "interpolate" => BuiltinModule::Interpolate(Interpolate::build(spec)?),
            "rangefilter" => BuiltinModule::RangeFilter(RangeFilter::build(spec)?),
            "subrange" => BuiltinModule::Subrange(Subrange::build(spec)),
            "sort" => BuiltinModule::Sort(Sort::build(spec)?),
            "match" => BuiltinModule::Match(Match::build(spec)),
            "if" => BuiltinModule::If(IfSelect::build(spec)?),
            "formula" => BuiltinModule::Formula(FormulaModule::build(spec)?),
            _ => return Ok(None),
        };
        Ok(Some(module))
    }

    pub fn kind(&self) -> &str {
        match self {
            BuiltinModule::Arithmetic(m) => m.kind(),
            BuiltinModule::Elementwise(m) => m.kind(),
            BuiltinModule::Const(m) => m.kind(),
            BuiltinModule::Ramp(m) => m.kind(),
            BuiltinModule::Timer(m) => m.kind(),
            BuiltinModule::First(m) => m.kind(),
            BuiltinModule::Count(m) => m.kind(),
            BuiltinModule::Average(m) => m.kind(),
            BuiltinModule::Extremum(m) => m.kind(),
            BuiltinModule::Threshold(m) => m.kind(),
            BuiltinModule::Binning(m) => m.kind(),
            BuiltinModule::Append(m) => m.kind(),
            BuiltinModule::Differentiate(m) => m.kind(),
            BuiltinModule::Integrate(m) => m.kind(),
            BuiltinModule::Fft(m) => m.kind(),
            BuiltinModule::Autocorrelation(m) => m.kind(),
            BuiltinModule::Crosscorrelation(m) => m.kind(),
            BuiltinModule::GaussSmooth(m) => m.kind(),
            BuiltinModule::MovingAverage(m) => m.kind(),
            BuiltinModule::Interpolate(m) => m.kind(),
            BuiltinModule::RangeFilter(m) => m.kind(),
            BuiltinModule::Subrange(m) => m.kind(),
            BuiltinModule::Sort(m) => m.kind(),
            BuiltinModule::Match(m) => m.kind(),
            BuiltinModule::If(m) => m.kind(),
            BuiltinModule::Formula(m) => m.kind(),
        }
    }

    pub fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        match self {
            BuiltinModule::Arithmetic(m) => m.compute(cx),
            BuiltinModule::Elementwise(m) => m.compute(cx),
            BuiltinModule::Const(m) => m.compute(cx),
            BuiltinModule::Ramp(m) => m.compute(cx),
            BuiltinModule::Timer(m) => m.compute(cx),
            BuiltinModule::First(m) => m.compute(cx),
            BuiltinModule::Count(m) => m.compute(cx),
            BuiltinModule::Average(m) => m.compute(cx),
            BuiltinModule::Extremum(m) => m.compute(cx),
            BuiltinModule::Threshold(m) => m.compute(cx),
            BuiltinModule::Binning(m) => m.compute(cx),
            BuiltinModule::Append(m) => m.compute(cx),
            BuiltinModule::Differentiate(m) => m.compute(cx),
            BuiltinModule::Integrate(m) => m.compute(cx),
            BuiltinModule::Fft(m) => m.compute(cx),
            BuiltinModule::Autocorrelation(m) => m.compute(cx),
            BuiltinModule::Crosscorrelation(m) => m.compute(cx),
            BuiltinModule::GaussSmooth(m) => m.compute(cx),
            BuiltinModule::MovingAverage(m) => m.compute(cx),
            BuiltinModule::Interpolate(m) => m.compute(cx),
            BuiltinModule::RangeFilter(m) => m.compute(cx),
            BuiltinModule::Subrange(m) => m.compute(cx),
            BuiltinModule::Sort(m) => m.compute(cx),
            BuiltinModule::Match(m) => m.compute(cx),
            BuiltinModule::If(m) => m.compute(cx),
            BuiltinModule::Formula(m) => m.compute(cx),
        }
    }
}

/// Holds either a built-in module (enum dispatch) or a registered one
/// (trait object).
pub enum AnyModule {
    Builtin(BuiltinModule),
    Plugin(Box<dyn AnalysisModule>),
}

impl AnyModule {
    pub fn kind(&self) -> &str {
        match self {
            AnyModule::Builtin(m) => m.kind(),
            AnyModule::Plugin(m) => m.kind(),
        }
    }

    pub fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        match self {
            AnyModule::Builtin(m) => m.compute(cx),
            AnyModule::Plugin(m) => m.compute(cx),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Harness;
    use super::*;

    #[test]
    fn test_every_builtin_kind_builds() {
        for kind in BUILTIN_KINDS {
            let mut harness = Harness::new(kind)
                .input(None, &[1.0, 2.0])
                .input(None, &[3.0, 4.0])
                .input(None, &[5.0, 6.0])
                .output(None)
                .output(None);
            if *kind == "formula" {
                harness = harness.param("formula", "[1]+[2]");
            }
            let module = harness.build().unwrap_or_else(|e| panic!("{}: {}", kind, e));
            assert_eq!(module.kind(), *kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_not_built() {
        let params = BTreeMap::new();
        let mut spec = ModuleSpec::new(
            0,
            "loess",
            &params,
            PortMap::new(vec![]),
            PortMap::new(vec![]),
        );
        assert!(BuiltinModule::build(&mut spec).unwrap().is_none());
    }

    #[test]
    fn test_param_parsing() {
        let mut params = BTreeMap::new();
        params.insert("deg".to_string(), "True".to_string());
        params.insert("sigma".to_string(), "2.5".to_string());
        params.insert("bad".to_string(), "maybe".to_string());
        let spec = ModuleSpec::new(3, "sin", &params, PortMap::new(vec![]), PortMap::new(vec![]));
        assert!(spec.flag("deg").unwrap());
        assert!(!spec.flag("missing").unwrap());
        assert_eq!(spec.number("sigma").unwrap(), Some(2.5));
        assert!(matches!(
            spec.flag("bad"),
            Err(LoadError::InvalidDescriptor { index: 3, .. })
        ));
        assert!(spec.number("deg").is_err());
    }

    #[test]
    fn test_unbound_output_is_ignored() {
        let time = TimeContext::default();
        let mut cx = ModuleContext::new(&[], &[0], &time);
        cx.set_output(None, vec![1.0]);
        cx.set_output(Some(5), vec![1.0]);
        cx.set_output(Some(0), vec![2.0]);
        assert_eq!(cx.into_results(), vec![Some(vec![2.0])]);
    }

    #[test]
    fn test_default_output_clear() {
        assert!(default_output_clear("add"));
        assert!(!default_output_clear("timer"));
    }
}
