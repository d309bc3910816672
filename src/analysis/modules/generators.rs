//! Modules that produce data instead of transforming it: `const`, `ramp`,
//! `timer`.
//!
//! `const` and `ramp` take their numbers from inputs of the same name when
//! present and from parameters otherwise. A length of 0 fills the first
//! output buffer to its declared size. Lengths above
//! [`MAX_GENERATED_LEN`](crate::analysis::module::MAX_GENERATED_LEN) fail the
//! pass.

use crate::analysis::module::{AnalysisModule, ModuleContext, ModuleError, ModuleSpec};
use crate::pipeline::error::LoadResult;

/// A number given either as an input or as a parameter.
#[derive(Debug, Clone, Copy)]
struct Setting {
    input: Option<usize>,
    param: Option<f64>,
}

impl Setting {
    fn bind(spec: &mut ModuleSpec<'_>, name: &str) -> LoadResult<Self> {
        Ok(Self {
            input: spec.inputs.take_exact(name),
            param: spec.number(name)?,
        })
    }

    fn get(&self, cx: &ModuleContext<'_>) -> Option<f64> {
        match self.input {
            Some(_) => cx.single(self.input),
            None => self.param,
        }
    }

    /// Length-style value: truncated, negative and non-finite treated as 0.
    fn count(&self, cx: &ModuleContext<'_>) -> usize {
        self.get(cx)
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v.trunc() as usize)
            .unwrap_or(0)
    }
}

fn fill_length(requested: usize, cx: &ModuleContext<'_>, first_output: Option<usize>) -> usize {
    if requested > 0 {
        return requested;
    }
    first_output.map(|o| cx.output_size(o)).unwrap_or(0)
}

pub struct ConstGenerator {
    value: Setting,
    length: Setting,
    outputs: Vec<usize>,
}

impl ConstGenerator {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        Ok(Self {
            value: Setting::bind(spec, "value")?,
            length: Setting::bind(spec, "length")?,
            outputs: spec.outputs.take_rest(),
        })
    }
}

impl AnalysisModule for ConstGenerator {
    fn kind(&self) -> &str {
        "const"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let value = self.value.get(cx).unwrap_or(0.0);
        let length = match fill_length(self.length.count(cx), cx, self.outputs.first().copied()) {
            0 => 1,
            n => ModuleError::check_len("const output", n)?,
        };
        let result = vec![value; length];
        for &out in &self.outputs {
            cx.set_output(Some(out), result.clone());
        }
        Ok(())
    }
}

pub struct RampGenerator {
    start: Setting,
    stop: Setting,
    length: Setting,
    outputs: Vec<usize>,
}

impl RampGenerator {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        Ok(Self {
            start: Setting::bind(spec, "start")?,
            stop: Setting::bind(spec, "stop")?,
            length: Setting::bind(spec, "length")?,
            outputs: spec.outputs.take_rest(),
        })
    }
}

/// `length` evenly spaced values from `start` to `stop` inclusive.
pub fn ramp(start: f64, stop: f64, length: usize) -> Vec<f64> {
    match length {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

impl AnalysisModule for RampGenerator {
    fn kind(&self) -> &str {
        "ramp"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let length = fill_length(self.length.count(cx), cx, self.outputs.first().copied());
        if length == 0 {
            return Err(ModuleError::Computation(
                "ramp length is 0 and the output buffer is unbounded".into(),
            ));
        }
        ModuleError::check_len("ramp output", length)?;
        let start = self.start.get(cx).unwrap_or(0.0);
        let stop = self.stop.get(cx).unwrap_or(0.0);
        let result = ramp(start, stop, length);
        for &out in &self.outputs {
            cx.set_output(Some(out), result.clone());
        }
        Ok(())
    }
}

/// Emits the pass timestamp and its epoch reference.
pub struct Timer {
    linear: bool,
    out: Option<usize>,
    offset1970: Option<usize>,
}

impl Timer {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        let linear = spec.flag("linearTime")?;
        let offset1970 = spec.outputs.take_exact("offset1970");
        let out = spec.output("out");
        let offset1970 = offset1970.or_else(|| spec.output("offset1970"));
        Ok(Self {
            linear,
            out,
            offset1970,
        })
    }
}

impl AnalysisModule for Timer {
    fn kind(&self) -> &str {
        "timer"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let time = *cx.time;
        let (t, offset) = if self.linear {
            (time.linear_time, time.linear_reference_1970)
        } else {
            (time.experiment_time, time.experiment_reference_1970)
        };
        cx.set_output(self.out, vec![t]);
        cx.set_output(self.offset1970, vec![offset]);
        Ok(())
    }
}
