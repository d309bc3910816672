//! Pairwise arithmetic: `add subtract multiply divide power gcd lcm atan2`.
//!
//! Operands are folded left to right with the broadcasting rules of
//! [`ValueSource`](crate::analysis::value_source::ValueSource). `subtract`, `divide`, `power` and `atan2` move the input
//! labelled `minuend`, `dividend`, `base` or `y` to the front. Any empty
//! operand yields an empty result.

use crate::analysis::module::{AnalysisModule, ModuleContext, ModuleError, ModuleSpec};
use crate::analysis::value_source::BinaryOp;
use crate::pipeline::error::LoadResult;

pub struct Arithmetic {
    kind: &'static str,
    op: BinaryOp,
    /// Degrees instead of radians (`atan2` only).
    deg: bool,
    operands: Vec<usize>,
    outputs: Vec<usize>,
}

impl Arithmetic {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        let (kind, op, priority) = match spec.kind {
            "add" => ("add", BinaryOp::Add, None),
            "subtract" => ("subtract", BinaryOp::Sub, Some("minuend")),
            "multiply" => ("multiply", BinaryOp::Mul, None),
            "divide" => ("divide", BinaryOp::Div, Some("dividend")),
            "power" => ("power", BinaryOp::Pow, Some("base")),
            "gcd" => ("gcd", BinaryOp::Gcd, None),
            "lcm" => ("lcm", BinaryOp::Lcm, None),
            "atan2" => ("atan2", BinaryOp::Atan2, Some("y")),
            other => return Err(spec.invalid(format!("'{}' is not an arithmetic kind", other))),
        };
        let deg = op == BinaryOp::Atan2 && spec.flag("deg")?;
        let mut operands: Vec<usize> = priority
            .and_then(|role| spec.inputs.take_exact(role))
            .into_iter()
            .collect();
        operands.extend(spec.inputs.take_rest());
        Ok(Self {
            kind,
            op,
            deg,
            operands,
            outputs: spec.outputs.take_rest(),
        })
    }

    fn fold(&self, cx: &ModuleContext<'_>) -> Vec<f64> {
        let mut sources = self.operands.iter().map(|&i| cx.input(i));
        let Some(first) = sources.next() else {
            return Vec::new();
        };
        if first.is_empty() {
            return Vec::new();
        }
        let mut acc = first.as_value_source();
        for operand in sources {
            if operand.is_empty() {
                return Vec::new();
            }
            acc = acc.apply(self.op, &operand.as_value_source());
        }
        if self.deg {
            acc = acc.map(f64::to_degrees);
        }
        acc.into_vec()
    }
}

impl AnalysisModule for Arithmetic {
    fn kind(&self) -> &str {
        self.kind
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let result = self.fold(cx);
        for &out in &self.outputs {
            cx.set_output(Some(out), result.clone());
        }
        Ok(())
    }
}
