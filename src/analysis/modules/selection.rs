//! Modules that pick, reorder or combine values without computing new ones:
//! `threshold`, `rangefilter`, `subrange`, `sort`, `append`, `match`, `if`.

use crate::analysis::io::InputData;
use crate::analysis::module::{AnalysisModule, ModuleContext, ModuleError, ModuleSpec};
use crate::analysis::value_source::ValueSource;
use crate::pipeline::error::LoadResult;
use std::collections::BTreeSet;

/// Pair every input with the output at the same position.
fn zip_ports(spec: &mut ModuleSpec<'_>, inputs: Vec<usize>) -> Vec<(usize, Option<usize>)> {
    let mut outputs = spec.outputs.take_rest().into_iter();
    inputs.into_iter().map(|i| (i, outputs.next())).collect()
}

// ── threshold ──

/// Position of the first crossing of `threshold` by `y`.
///
/// A crossing needs a value on the far side first, so data that starts
/// above the threshold does not count as a rising crossing at index 0. The
/// position is `x[i]`, or `i` without `x`. No crossing writes an empty
/// result.
pub struct Threshold {
    falling: bool,
    y: usize,
    threshold: Option<usize>,
    x: Option<usize>,
    output: Option<usize>,
}

impl Threshold {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        Ok(Self {
            falling: spec.flag("falling")?,
            y: spec.require_input("y")?,
            threshold: spec.input("threshold"),
            x: spec.input("x"),
            output: spec.output("position"),
        })
    }
}

pub fn first_crossing(y: &[f64], threshold: f64, falling: bool) -> Option<usize> {
    let mut armed = false;
    for (i, &v) in y.iter().enumerate() {
        let past = if falling { v < threshold } else { v > threshold };
        if past {
            if armed {
                return Some(i);
            }
        } else {
            armed = true;
        }
    }
    None
}

impl AnalysisModule for Threshold {
    fn kind(&self) -> &str {
        "threshold"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let threshold = cx.single(self.threshold).unwrap_or(0.0);
        let result = first_crossing(cx.input(self.y).values(), threshold, self.falling)
            .map(|i| {
                cx.optional(self.x)
                    .and_then(|x| x.values().get(i).copied())
                    .unwrap_or(i as f64)
            })
            .into_iter()
            .collect();
        cx.set_output(self.output, result);
        Ok(())
    }
}

// ── rangefilter ──

struct RangeGroup {
    data: usize,
    min: Option<usize>,
    max: Option<usize>,
    output: Option<usize>,
}

/// Drops every row in which any data input has a finite value outside its
/// `[min, max]` range.
///
/// Inputs are read in order: each input not labelled `min` or `max` starts
/// a group, and `min`/`max` inputs bound the group before them. Outputs are
/// padded with NaN to equal length.
pub struct RangeFilter {
    groups: Vec<RangeGroup>,
}

impl RangeFilter {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        let mut groups: Vec<RangeGroup> = Vec::new();
        for idx in spec.inputs.take_rest() {
            match (spec.inputs.role(idx), groups.last_mut()) {
                (Some("min"), Some(group)) => group.min = Some(idx),
                (Some("max"), Some(group)) => group.max = Some(idx),
                (Some("min" | "max"), None) => {
                    return Err(spec.invalid("min/max given before any data input"));
                }
                _ => groups.push(RangeGroup {
                    data: idx,
                    min: None,
                    max: None,
                    output: None,
                }),
            }
        }
        let mut outputs = spec.outputs.take_rest().into_iter();
        for group in &mut groups {
            group.output = outputs.next();
        }
        Ok(Self { groups })
    }
}

impl AnalysisModule for RangeFilter {
    fn kind(&self) -> &str {
        "rangefilter"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let mut rejected = BTreeSet::new();
        for group in &self.groups {
            let lo = cx.single(group.min).unwrap_or(f64::NEG_INFINITY);
            let hi = cx.single(group.max).unwrap_or(f64::INFINITY);
            for (i, &v) in cx.input(group.data).values().iter().enumerate() {
                if v.is_finite() && !(lo <= v && v <= hi) {
                    rejected.insert(i);
                }
            }
        }

        let mut kept: Vec<Vec<f64>> = self
            .groups
            .iter()
            .map(|group| {
                cx.input(group.data)
                    .values()
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !rejected.contains(i))
                    .map(|(_, &v)| v)
                    .collect()
            })
            .collect();
        let longest = kept.iter().map(Vec::len).max().unwrap_or(0);
        for column in &mut kept {
            column.resize(longest, f64::NAN);
        }
        for (group, column) in self.groups.iter().zip(kept) {
            cx.set_output(group.output, column);
        }
        Ok(())
    }
}

// ── subrange ──

/// Slice `[from, to)` out of every data input; `length` overrides `to` as
/// `from + length`. Without an end, slices run to the end of the data.
pub struct Subrange {
    from: Option<usize>,
    to: Option<usize>,
    length: Option<usize>,
    pairs: Vec<(usize, Option<usize>)>,
}

impl Subrange {
    pub fn build(spec: &mut ModuleSpec<'_>) -> Self {
        let from = spec.inputs.take_exact("from");
        let to = spec.inputs.take_exact("to");
        let length = spec.inputs.take_exact("length");
        let data = spec.inputs.take_rest();
        Self {
            from,
            to,
            length,
            pairs: zip_ports(spec, data),
        }
    }
}

impl AnalysisModule for Subrange {
    fn kind(&self) -> &str {
        "subrange"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let int = |idx: Option<usize>| cx.optional(idx).and_then(|d| d.single_as_int());
        let start = int(self.from).unwrap_or(0).max(0);
        let end = match (int(self.length), int(self.to)) {
            (Some(len), _) => Some(start.saturating_add(len)),
            (None, Some(to)) => Some(to),
            (None, None) => None,
        };

        for &(input, output) in &self.pairs {
            let data = cx.input(input).values();
            let stop = end.map_or(data.len(), |e| e.clamp(0, data.len() as i64) as usize);
            let start = start.min(data.len() as i64) as usize;
            let slice = if stop < start {
                Vec::new()
            } else {
                data[start..stop].to_vec()
            };
            cx.set_output(output, slice);
        }
        Ok(())
    }
}

// ── sort ──

/// Sort the first input and reorder every other input the same way.
/// Inputs shorter than the key are padded with NaN.
pub struct Sort {
    descending: bool,
    pairs: Vec<(usize, Option<usize>)>,
}

impl Sort {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        let descending = spec.flag("descending")?;
        let inputs = spec.inputs.take_rest();
        if inputs.is_empty() {
            return Err(spec.invalid("sort needs at least one input"));
        }
        Ok(Self {
            descending,
            pairs: zip_ports(spec, inputs),
        })
    }
}

impl AnalysisModule for Sort {
    fn kind(&self) -> &str {
        "sort"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let Some(&(key_input, _)) = self.pairs.first() else {
            return Ok(());
        };
        let key = cx.input(key_input).values();
        let mut order: Vec<usize> = (0..key.len()).collect();
        if self.descending {
            order.sort_by(|&a, &b| key[b].total_cmp(&key[a]));
        } else {
            order.sort_by(|&a, &b| key[a].total_cmp(&key[b]));
        }

        for &(input, output) in &self.pairs {
            let data = cx.input(input).values();
            let sorted = order
                .iter()
                .map(|&i| data.get(i).copied().unwrap_or(f64::NAN))
                .collect();
            cx.set_output(output, sorted);
        }
        Ok(())
    }
}

// ── append ──

/// Concatenation of every input.
pub struct Append {
    inputs: Vec<usize>,
    output: Option<usize>,
}

impl Append {
    pub fn build(spec: &mut ModuleSpec<'_>) -> Self {
        Self {
            inputs: spec.inputs.take_rest(),
            output: spec.output("out"),
        }
    }
}

impl AnalysisModule for Append {
    fn kind(&self) -> &str {
        "append"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let joined = self
            .inputs
            .iter()
            .flat_map(|&i| cx.input(i).values().iter().copied())
            .collect();
        cx.set_output(self.output, joined);
        Ok(())
    }
}

// ── match ──

/// Keep only rows where every input has a finite value. Rows past the end
/// of the shortest input are dropped.
pub struct Match {
    pairs: Vec<(usize, Option<usize>)>,
}

impl Match {
    pub fn build(spec: &mut ModuleSpec<'_>) -> Self {
        let inputs = spec.inputs.take_rest();
        Self {
            pairs: zip_ports(spec, inputs),
        }
    }
}

impl AnalysisModule for Match {
    fn kind(&self) -> &str {
        "match"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let columns: Vec<&[f64]> = self.pairs.iter().map(|&(i, _)| cx.input(i).values()).collect();
        let rows = columns.iter().map(|c| c.len()).min().unwrap_or(0);
        let keep: Vec<usize> = (0..rows)
            .filter(|&r| columns.iter().all(|c| c[r].is_finite()))
            .collect();
        let results: Vec<Vec<f64>> = columns
            .iter()
            .map(|c| keep.iter().map(|&r| c[r]).collect())
            .collect();
        for (&(_, output), column) in self.pairs.iter().zip(results) {
            cx.set_output(output, column);
        }
        Ok(())
    }
}

// ── if ──

/// Compare `a` with `b` and pass on `true` or `false`.
///
/// When `a` and `b` hold at most one value each, the whole selected source
/// is copied. Otherwise the comparison runs row by row using the
/// broadcasting of [`ValueSource`], and each row takes the matching row of
/// the selected source; rows the selected source cannot supply are dropped.
pub struct IfSelect {
    less: bool,
    equal: bool,
    greater: bool,
    a: usize,
    b: usize,
    on_true: Option<usize>,
    on_false: Option<usize>,
    output: Option<usize>,
}

impl IfSelect {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        Ok(Self {
            less: spec.flag("less")?,
            equal: spec.flag("equal")?,
            greater: spec.flag("greater")?,
            a: spec.require_input("a")?,
            b: spec.require_input("b")?,
            on_true: spec.input("true"),
            on_false: spec.input("false"),
            output: spec.output("out"),
        })
    }

    fn test(&self, a: f64, b: f64) -> bool {
        (a < b && self.less) || (a == b && self.equal) || (a > b && self.greater)
    }
}

impl AnalysisModule for IfSelect {
    fn kind(&self) -> &str {
        "if"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let a = cx.input(self.a);
        let b = cx.input(self.b);
        if a.is_empty() {
            return Err(ModuleError::EmptyInput { role: "a" });
        }
        if b.is_empty() {
            return Err(ModuleError::EmptyInput { role: "b" });
        }

        if a.len() <= 1 && b.len() <= 1 {
            let (Some(va), Some(vb)) = (a.single(), b.single()) else {
                return Ok(());
            };
            let branch = if self.test(va, vb) {
                self.on_true
            } else {
                self.on_false
            };
            if let Some(source) = cx.optional(branch) {
                let values = source.values().to_vec();
                cx.set_output(self.output, values);
            }
            return Ok(());
        }

        let mask = a
            .as_value_source()
            .zip_with(&b.as_value_source(), |x, y| if self.test(x, y) { 1.0 } else { 0.0 })
            .into_vec();
        let on_true = cx.optional(self.on_true).map(InputData::as_value_source);
        let on_false = cx.optional(self.on_false).map(InputData::as_value_source);
        let result: Vec<f64> = mask
            .iter()
            .enumerate()
            .filter_map(|(row, &m)| {
                let branch = if m == 1.0 { &on_true } else { &on_false };
                match branch.as_ref()? {
                    ValueSource::Scalar(v) => Some(*v),
                    ValueSource::Vector(v) => v.get(row).copied(),
                }
            })
            .collect();
        cx.set_output(self.output, result);
        Ok(())
    }
}
