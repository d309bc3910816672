//! The `formula` module.
//!
//! Each declared input becomes one column, `[1]` being the first. A
//! reference past the last bound input is not a load error: rows that read
//! it fail at evaluation, which leaves the output empty for that pass.

use crate::analysis::formula::Formula;
use crate::analysis::module::{AnalysisModule, ModuleContext, ModuleError, ModuleSpec};
use crate::pipeline::error::{LoadError, LoadResult};

/// Evaluates a [`Formula`] over its inputs. Rows after the first failing one
/// are dropped.
pub struct FormulaModule {
    formula: Formula,
    inputs: Vec<usize>,
    output: Option<usize>,
}

impl FormulaModule {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        let source = spec.text("formula").unwrap_or_default();
        let formula = Formula::parse(source).map_err(|source| LoadError::Formula {
            index: spec.index,
            source,
        })?;
        let inputs = spec.inputs.take_rest();
        if formula.max_input() > inputs.len() {
            tracing::debug!(
                "Formula module {} reads input [{}] but only {} inputs are bound",
                spec.index,
                formula.max_input(),
                inputs.len()
            );
        }
        Ok(Self {
            formula,
            inputs,
            output: spec.output("out"),
        })
    }
}

impl AnalysisModule for FormulaModule {
    fn kind(&self) -> &str {
        "formula"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let columns: Vec<Vec<f64>> = self
            .inputs
            .iter()
            .map(|&i| cx.input(i).values().to_vec())
            .collect();
        let result = self.formula.evaluate(&columns);
        cx.set_output(self.output, result);
        Ok(())
    }
}
