//! One-input math applied to every value.
//!
//! With `deg` set, `sin cos tan` read their input in degrees and
//! `asin acos atan` report degrees. `log` is the natural logarithm.

use crate::analysis::formula::UnaryFn;
use crate::analysis::module::{AnalysisModule, ModuleContext, ModuleError, ModuleSpec};
use crate::pipeline::error::LoadResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AngleUnit {
    /// Angle comes in.
    Input,
    /// Angle goes out.
    Output,
    None,
}

pub struct Elementwise {
    kind: &'static str,
    func: UnaryFn,
    angle: AngleUnit,
    deg: bool,
    input: Option<usize>,
    outputs: Vec<usize>,
}

impl Elementwise {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        let (kind, func, angle) = match spec.kind {
            "abs" => ("abs", UnaryFn::Abs, AngleUnit::None),
            "round" => ("round", UnaryFn::Round, AngleUnit::None),
            "log" => ("log", UnaryFn::Log, AngleUnit::None),
            "sin" => ("sin", UnaryFn::Sin, AngleUnit::Input),
            "cos" => ("cos", UnaryFn::Cos, AngleUnit::Input),
            "tan" => ("tan", UnaryFn::Tan, AngleUnit::Input),
            "sinh" => ("sinh", UnaryFn::Sinh, AngleUnit::None),
            "cosh" => ("cosh", UnaryFn::Cosh, AngleUnit::None),
            "tanh" => ("tanh", UnaryFn::Tanh, AngleUnit::None),
            "asin" => ("asin", UnaryFn::Asin, AngleUnit::Output),
            "acos" => ("acos", UnaryFn::Acos, AngleUnit::Output),
            "atan" => ("atan", UnaryFn::Atan, AngleUnit::Output),
            other => return Err(spec.invalid(format!("'{}' is not an elementwise kind", other))),
        };
        let deg = angle != AngleUnit::None && spec.flag("deg")?;
        Ok(Self {
            kind,
            func,
            angle,
            deg,
            input: spec.input("value"),
            outputs: spec.outputs.take_rest(),
        })
    }

    fn apply(&self, x: f64) -> f64 {
        match (self.deg, self.angle) {
            (true, AngleUnit::Input) => self.func.eval(x.to_radians()),
            (true, AngleUnit::Output) => self.func.eval(x).to_degrees(),
            _ => self.func.eval(x),
        }
    }
}

impl AnalysisModule for Elementwise {
    fn kind(&self) -> &str {
        self.kind
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let result: Vec<f64> = cx
            .optional(self.input)
            .map(|data| data.values().iter().map(|&x| self.apply(x)).collect())
            .unwrap_or_default();
        for &out in &self.outputs {
            cx.set_output(Some(out), result.clone());
        }
        Ok(())
    }
}
