//! Reductions: `first`, `count`, `average`, `max`/`min`, `binning`.

use crate::analysis::module::{AnalysisModule, ModuleContext, ModuleError, ModuleSpec};
use crate::pipeline::error::LoadResult;

/// First value of every input, written to the output at the same position.
pub struct First {
    pairs: Vec<(usize, Option<usize>)>,
}

impl First {
    pub fn build(spec: &mut ModuleSpec<'_>) -> Self {
        let inputs = spec.inputs.take_rest();
        let mut outputs = spec.outputs.take_rest().into_iter();
        Self {
            pairs: inputs.into_iter().map(|i| (i, outputs.next())).collect(),
        }
    }
}

impl AnalysisModule for First {
    fn kind(&self) -> &str {
        "first"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        for &(input, output) in &self.pairs {
            let first: Vec<f64> = cx.input(input).values().first().copied().into_iter().collect();
            cx.set_output(output, first);
        }
        Ok(())
    }
}

/// Total number of values across all inputs.
pub struct Count {
    inputs: Vec<usize>,
    output: Option<usize>,
}

impl Count {
    pub fn build(spec: &mut ModuleSpec<'_>) -> Self {
        Self {
            inputs: spec.inputs.take_rest(),
            output: spec.output("count"),
        }
    }
}

impl AnalysisModule for Count {
    fn kind(&self) -> &str {
        "count"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let total: usize = self.inputs.iter().map(|&i| cx.input(i).len()).sum();
        cx.set_output(self.output, vec![total as f64]);
        Ok(())
    }
}

/// Mean and sample standard deviation of the finite values.
pub struct Average {
    input: usize,
    avg: Option<usize>,
    std: Option<usize>,
}

impl Average {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        Ok(Self {
            input: spec.require_input("value")?,
            avg: spec.output("average"),
            std: spec.output("stddev"),
        })
    }
}

/// `(mean, std)` over finite values; std uses `n - 1` and is NaN below two
/// values. `None` without finite values.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let std = if finite.len() < 2 {
        f64::NAN
    } else {
        (finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    };
    Some((mean, std))
}

impl AnalysisModule for Average {
    fn kind(&self) -> &str {
        "average"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let (mean, std) =
            mean_std(cx.input(self.input).values()).ok_or(ModuleError::EmptyInput { role: "value" })?;
        cx.set_output(self.avg, vec![mean]);
        cx.set_output(self.std, vec![std]);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    Max,
    Min,
}

impl Extreme {
    /// True if `a` beats `b`.
    fn beats(self, a: f64, b: f64) -> bool {
        match self {
            Extreme::Max => a > b,
            Extreme::Min => a < b,
        }
    }

    /// True if `v` lies on the far side of `threshold`, closing a segment.
    fn outside(self, v: f64, threshold: f64) -> bool {
        match self {
            Extreme::Max => v < threshold,
            Extreme::Min => v > threshold,
        }
    }

    fn worst(self) -> f64 {
        match self {
            Extreme::Max => f64::NEG_INFINITY,
            Extreme::Min => f64::INFINITY,
        }
    }
}

/// `max` and `min`: the extreme value of `y`, optionally with its position.
///
/// With `multiple`, `y` is split into segments by `threshold` (default 0)
/// and every completed segment reports its own extreme and position.
pub struct Extremum {
    extreme: Extreme,
    multiple: bool,
    x: Option<usize>,
    y: usize,
    threshold: Option<usize>,
    value_out: Option<usize>,
    position_out: Option<usize>,
}

impl Extremum {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        let extreme = match spec.kind {
            "max" => Extreme::Max,
            "min" => Extreme::Min,
            other => return Err(spec.invalid(format!("'{}' is not max or min", other))),
        };
        let multiple = spec.flag("multiple")?;
        let y = spec.require_input("y")?;
        let x = spec.input("x");
        let threshold = spec.input("threshold");
        let value_role = if extreme == Extreme::Max { "max" } else { "min" };
        let value_out = spec.output(value_role);
        let position_out = spec.output("position");
        Ok(Self {
            extreme,
            multiple,
            x,
            y,
            threshold,
            value_out,
            position_out,
        })
    }

    fn position(&self, x: Option<&[f64]>, i: usize) -> f64 {
        x.and_then(|x| x.get(i).copied()).unwrap_or(i as f64)
    }
}

impl AnalysisModule for Extremum {
    fn kind(&self) -> &str {
        match self.extreme {
            Extreme::Max => "max",
            Extreme::Min => "min",
        }
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let y = cx.input(self.y).values();
        let x = cx.optional(self.x).map(|d| d.values());

        if self.multiple {
            let threshold = cx.single(self.threshold).unwrap_or(0.0);
            let mut values = Vec::new();
            let mut positions = Vec::new();
            let mut best: Option<(f64, f64)> = None;
            for (i, &v) in y.iter().enumerate() {
                if self.extreme.outside(v, threshold) {
                    if let Some((value, pos)) = best.take() {
                        values.push(value);
                        positions.push(pos);
                    }
                } else if self.extreme.beats(v, best.map_or(self.extreme.worst(), |b| b.0)) {
                    best = Some((v, self.position(x, i)));
                }
            }
            cx.set_output(self.value_out, values);
            cx.set_output(self.position_out, positions);
            return Ok(());
        }

        let (idx, value) = y
            .iter()
            .copied()
            .enumerate()
            .fold(None, |acc: Option<(usize, f64)>, (i, v)| match acc {
                Some((_, b)) if !self.extreme.beats(v, b) => acc,
                _ if v.is_nan() => acc,
                _ => Some((i, v)),
            })
            .ok_or(ModuleError::EmptyInput { role: "y" })?;
        cx.set_output(self.value_out, vec![value]);
        if self.position_out.is_some() {
            let position = self.position(x, idx);
            cx.set_output(self.position_out, vec![position]);
        }
        Ok(())
    }
}

/// Histogram with bins `[x0 + k·dx, x0 + (k+1)·dx)`.
///
/// `binStarts` lists the lower edge of every bin from the lowest to the
/// highest occupied one, `binCounts` the matching counts. Non-finite values
/// are skipped.
pub struct Binning {
    input: usize,
    x0: Option<usize>,
    dx: Option<usize>,
    starts: Option<usize>,
    counts: Option<usize>,
}

impl Binning {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        Ok(Self {
            input: spec.require_input("in")?,
            x0: spec.input("x0"),
            dx: spec.input("dx"),
            starts: spec.output("binStarts"),
            counts: spec.output("binCounts"),
        })
    }
}

/// `(bin starts, counts)` as computed by the `binning` module.
///
/// Fails when the occupied bins span more than
/// [`MAX_GENERATED_LEN`](crate::analysis::module::MAX_GENERATED_LEN) bins.
pub fn histogram(values: &[f64], x0: f64, dx: f64) -> Result<(Vec<f64>, Vec<f64>), ModuleError> {
    let bins: Vec<i64> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| ((v - x0) / dx).floor())
        .filter(|k| k.abs() < 1e15)
        .map(|k| k as i64)
        .collect();
    let (Some(&lo), Some(&hi)) = (bins.iter().min(), bins.iter().max()) else {
        return Ok((Vec::new(), Vec::new()));
    };
    let span = usize::try_from(hi - lo + 1).unwrap_or(usize::MAX);
    let mut counts = vec![0.0; ModuleError::check_len("histogram", span)?];
    for k in bins {
        counts[(k - lo) as usize] += 1.0;
    }
    let starts = (lo..=hi).map(|k| x0 + k as f64 * dx).collect();
    Ok((starts, counts))
}

impl AnalysisModule for Binning {
    fn kind(&self) -> &str {
        "binning"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let x0 = cx.single(self.x0).filter(|v| v.is_finite()).unwrap_or(0.0);
        let dx = match cx.single(self.dx).filter(|v| v.is_finite()) {
            Some(d) if d != 0.0 => d.abs(),
            _ => 1.0,
        };
        let (starts, counts) = histogram(cx.input(self.input).values(), x0, dx)?;
        cx.set_output(self.starts, starts);
        cx.set_output(self.counts, counts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::module::testing::{assert_close, Harness};

    #[test]
    fn test_first_per_input() {
        let results = Harness::new("first")
            .input(None, &[3.0, 4.0])
            .input(None, &[])
            .output(None)
            .output(None)
            .run();
        assert_eq!(results, vec![Some(vec![3.0]), Some(vec![])]);
    }

    #[test]
    fn test_count_sums_lengths() {
        let out = Harness::new("count")
            .input(None, &[1.0, 2.0])
            .input(None, &[3.0])
            .output(None)
            .run_first();
        assert_eq!(out, vec![3.0]);
    }

    #[test]
    fn test_average_and_std() {
        let results = Harness::new("average")
            .input(None, &[2.0, 4.0, f64::NAN, 6.0])
            .output(Some("average"))
            .output(Some("stddev"))
            .run();
        assert_eq!(results[0], Some(vec![4.0]));
        assert_close(results[1].as_deref().unwrap(), &[2.0]);
    }

    #[test]
    fn test_average_without_finite_values_writes_nothing() {
        let err = Harness::new("average")
            .input(None, &[f64::NAN])
            .output(None)
            .try_run();
        assert_eq!(err, Err(ModuleError::EmptyInput { role: "value" }));
        assert!(mean_std(&[1.0]).unwrap().1.is_nan());
    }

    #[test]
    fn test_max_with_position() {
        let results = Harness::new("max")
            .input(Some("x"), &[10.0, 20.0, 30.0])
            .input(Some("y"), &[1.0, 5.0, 2.0])
            .output(Some("max"))
            .output(Some("position"))
            .run();
        assert_eq!(results, vec![Some(vec![5.0]), Some(vec![20.0])]);
    }

    #[test]
    fn test_min_position_defaults_to_index() {
        let results = Harness::new("min")
            .input(None, &[4.0, -1.0, 3.0])
            .output(None)
            .output(Some("position"))
            .run();
        assert_eq!(results, vec![Some(vec![-1.0]), Some(vec![1.0])]);
    }

    #[test]
    fn test_max_of_empty_fails() {
        let err = Harness::new("max").input(None, &[]).output(None).try_run();
        assert_eq!(err, Err(ModuleError::EmptyInput { role: "y" }));
    }

    #[test]
    fn test_max_multiple_segments() {
        let results = Harness::new("max")
            .param("multiple", true)
            .input(Some("y"), &[-1.0, 2.0, 5.0, 1.0, -1.0, 3.0, -2.0, 4.0])
            .value(Some("threshold"), 0.0)
            .output(Some("max"))
            .output(Some("position"))
            .run();
        assert_eq!(
            results,
            vec![Some(vec![5.0, 3.0]), Some(vec![2.0, 5.0])]
        );
    }

    #[test]
    fn test_binning() {
        let results = Harness::new("binning")
            .input(Some("in"), &[0.1, 0.2, 1.5, 3.9, f64::NAN, -0.5])
            .value(Some("x0"), 0.0)
            .value(Some("dx"), 1.0)
            .output(Some("binStarts"))
            .output(Some("binCounts"))
            .run();
        assert_eq!(results[0], Some(vec![-1.0, 0.0, 1.0, 2.0, 3.0]));
        assert_eq!(results[1], Some(vec![1.0, 2.0, 1.0, 0.0, 1.0]));
    }

    #[test]
    fn test_binning_zero_width_falls_back() {
        let (starts, counts) = histogram(&[0.5, 1.5], 0.0, 1.0).unwrap();
        assert_eq!(starts, vec![0.0, 1.0]);
        assert_eq!(counts, vec![1.0, 1.0]);

        let results = Harness::new("binning")
            .input(None, &[0.5, 1.5])
            .value(Some("dx"), 0.0)
            .output(None)
            .output(None)
            .run();
        assert_eq!(results[1], Some(vec![1.0, 1.0]));
        assert!(histogram(&[], 0.0, 1.0).unwrap().0.is_empty());
    }

    #[test]
    fn test_binning_wide_span_fails() {
        assert!(matches!(
            histogram(&[0.0, 1e13], 0.0, 1.0),
            Err(ModuleError::TooLarge { what: "histogram", .. })
        ));

        let err = Harness::new("binning")
            .input(None, &[0.0, 1e13])
            .output(None)
            .output(None)
            .try_run();
        assert!(matches!(err, Err(ModuleError::TooLarge { .. })));
    }
}
