//! Signal processing modules: calculus, spectra, correlation, smoothing and
//! interpolation.

use crate::analysis::fft::{cross_correlate, FftAnalyzer};
use crate::analysis::module::{
    AnalysisModule, ModuleContext, ModuleError, ModuleSpec, MAX_GENERATED_LEN,
};
use crate::pipeline::error::LoadResult;

// ── Calculus ──

/// Differences of consecutive values, one fewer than the input.
pub struct Differentiate {
    input: usize,
    outputs: Vec<usize>,
}

impl Differentiate {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        Ok(Self {
            input: spec.require_input("value")?,
            outputs: spec.outputs.take_rest(),
        })
    }
}

impl AnalysisModule for Differentiate {
    fn kind(&self) -> &str {
        "differentiate"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let result: Vec<f64> = cx
            .input(self.input)
            .values()
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect();
        for &out in &self.outputs {
            cx.set_output(Some(out), result.clone());
        }
        Ok(())
    }
}

/// Running sum.
pub struct Integrate {
    input: usize,
    outputs: Vec<usize>,
}

impl Integrate {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        Ok(Self {
            input: spec.require_input("value")?,
            outputs: spec.outputs.take_rest(),
        })
    }
}

impl AnalysisModule for Integrate {
    fn kind(&self) -> &str {
        "integrate"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let result: Vec<f64> = cx
            .input(self.input)
            .values()
            .iter()
            .scan(0.0, |sum, v| {
                *sum += v;
                Some(*sum)
            })
            .collect();
        for &out in &self.outputs {
            cx.set_output(Some(out), result.clone());
        }
        Ok(())
    }
}

// ── Spectra and correlation ──

pub struct Fft {
    analyzer: FftAnalyzer,
    re_in: usize,
    im_in: Option<usize>,
    re_out: Option<usize>,
    im_out: Option<usize>,
}

impl Fft {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        Ok(Self {
            analyzer: FftAnalyzer::new(),
            re_in: spec.require_input("re")?,
            im_in: spec.input("im"),
            re_out: spec.output("re"),
            im_out: spec.output("im"),
        })
    }
}

impl AnalysisModule for Fft {
    fn kind(&self) -> &str {
        "fft"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let re = cx.input(self.re_in).values();
        let im = cx.optional(self.im_in).map(|d| d.values());
        let (out_re, out_im) = self.analyzer.forward(re, im);
        cx.set_output(self.re_out, out_re);
        cx.set_output(self.im_out, out_im);
        Ok(())
    }
}

/// Autocorrelation of `y` against lags measured on `x`.
///
/// Lag positions are `x - x[0]` (or sample indices without `x`); `minX` and
/// `maxX` keep only lags inside `[minX, maxX]`.
pub struct Autocorrelation {
    analyzer: FftAnalyzer,
    y: usize,
    x: Option<usize>,
    min_x: Option<usize>,
    max_x: Option<usize>,
    y_out: Option<usize>,
    x_out: Option<usize>,
}

impl Autocorrelation {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        let y = spec.require_input("y")?;
        let x = spec.input("x");
        let min_x = spec.inputs.take_exact("minX");
        let max_x = spec.inputs.take_exact("maxX");
        Ok(Self {
            analyzer: FftAnalyzer::new(),
            y,
            x,
            min_x,
            max_x,
            y_out: spec.output("y"),
            x_out: spec.output("x"),
        })
    }
}

impl AnalysisModule for Autocorrelation {
    fn kind(&self) -> &str {
        "autocorrelation"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let y = cx.input(self.y).values();
        let x_in = cx.optional(self.x).map(|d| d.values());
        let count = x_in.map_or(y.len(), |x| x.len().min(y.len()));

        let lags: Vec<f64> = match x_in {
            Some(x) if count > 0 => x[..count].iter().map(|v| v - x[0]).collect(),
            _ => (0..count).map(|i| i as f64).collect(),
        };
        let corr = self.analyzer.autocorrelate(&y[..count]);

        let min_x = cx.single(self.min_x).unwrap_or(f64::NEG_INFINITY);
        let max_x = cx.single(self.max_x).unwrap_or(f64::INFINITY);
        let (xs, ys): (Vec<f64>, Vec<f64>) = lags
            .into_iter()
            .zip(corr)
            .filter(|(lag, _)| *lag >= min_x && *lag <= max_x)
            .unzip();

        cx.set_output(self.y_out, ys);
        cx.set_output(self.x_out, xs);
        Ok(())
    }
}

pub struct Crosscorrelation {
    first: usize,
    second: usize,
    outputs: Vec<usize>,
}

impl Crosscorrelation {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        Ok(Self {
            first: spec.require_input("a")?,
            second: spec.require_input("b")?,
            outputs: spec.outputs.take_rest(),
        })
    }
}

impl AnalysisModule for Crosscorrelation {
    fn kind(&self) -> &str {
        "crosscorrelation"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let result = cross_correlate(cx.input(self.first).values(), cx.input(self.second).values());
        for &out in &self.outputs {
            cx.set_output(Some(out), result.clone());
        }
        Ok(())
    }
}

// ── Smoothing ──

/// Normalised Gaussian kernel of half-width `round(3σ)`.
pub fn gauss_kernel(sigma: f64) -> Vec<f64> {
    let half = (sigma * 3.0).round().max(0.0) as i64;
    let c = sigma * sigma;
    let raw: Vec<f64> = (-half..=half)
        .map(|i| (-((i * i) as f64) / (2.0 * c)).exp())
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}

/// Convolve with `kernel`, renormalising where it hangs over an edge.
pub fn smooth(values: &[f64], kernel: &[f64]) -> Vec<f64> {
    let half = kernel.len() as isize / 2;
    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            let (mut acc, mut weight) = (0.0, 0.0);
            for (k, w) in kernel.iter().enumerate() {
                let j = i + k as isize - half;
                if (0..n).contains(&j) {
                    acc += values[j as usize] * w;
                    weight += w;
                }
            }
            acc / weight
        })
        .collect()
}

pub struct GaussSmooth {
    kernel: Vec<f64>,
    input: usize,
    outputs: Vec<usize>,
}

impl GaussSmooth {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        let sigma = spec.number("sigma")?.unwrap_or(3.0);
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(spec.invalid(format!("sigma must be positive, got {}", sigma)));
        }
        if (sigma * 3.0).round() * 2.0 + 1.0 > MAX_GENERATED_LEN as f64 {
            return Err(spec.invalid(format!("sigma {} gives an oversized kernel", sigma)));
        }
        Ok(Self {
            kernel: gauss_kernel(sigma),
            input: spec.require_input("value")?,
            outputs: spec.outputs.take_rest(),
        })
    }
}

impl AnalysisModule for GaussSmooth {
    fn kind(&self) -> &str {
        "gausssmooth"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let result = smooth(cx.input(self.input).values(), &self.kernel);
        for &out in &self.outputs {
            cx.set_output(Some(out), result.clone());
        }
        Ok(())
    }
}

/// Trailing mean over the last `width` samples.
///
/// The first `width - 1` outputs average whatever is available; with
/// `dropIncomplete` they are left out.
pub struct MovingAverage {
    data: usize,
    width: Option<usize>,
    drop_incomplete: bool,
    output: Option<usize>,
}

impl MovingAverage {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        Ok(Self {
            data: spec.require_input("data")?,
            width: spec.input("width"),
            drop_incomplete: spec.flag("dropIncomplete")?,
            output: spec.output("data"),
        })
    }
}

pub fn moving_average(values: &[f64], width: usize, drop_incomplete: bool) -> Vec<f64> {
    let width = width.max(1);
    let start = if drop_incomplete { width - 1 } else { 0 };
    let mut sum = 0.0;
    let mut result = Vec::with_capacity(values.len().saturating_sub(start));
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= width {
            sum -= values[i - width];
        }
        if i >= start {
            result.push(sum / (i + 1).min(width) as f64);
        }
    }
    result
}

impl AnalysisModule for MovingAverage {
    fn kind(&self) -> &str {
        "movingaverage"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let width = match cx.optional(self.width) {
            Some(w) => w
                .single_as_int()
                .filter(|w| *w > 0)
                .ok_or_else(|| ModuleError::Computation("width must be a positive integer".into()))?
                as usize,
            None => 10,
        };
        let result = moving_average(cx.input(self.data).values(), width, self.drop_incomplete);
        cx.set_output(self.output, result);
        Ok(())
    }
}

// ── Interpolation ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMethod {
    Previous,
    Next,
    Nearest,
    Linear,
}

impl InterpolationMethod {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "previous" => Some(Self::Previous),
            "next" => Some(Self::Next),
            "nearest" => Some(Self::Nearest),
            "linear" => Some(Self::Linear),
            _ => None,
        }
    }
}

/// Sample the curve `(x, y)` at every `xi`. `x` must be ascending; queries
/// outside its range take the nearest end value.
pub fn interpolate(x: &[f64], y: &[f64], xi: &[f64], method: InterpolationMethod) -> Vec<f64> {
    let n = x.len().min(y.len());
    xi.iter()
        .map(|&q| {
            match n {
                0 => return f64::NAN,
                1 => return y[0],
                _ => {}
            }
            let j = x[..n].partition_point(|&v| v < q);
            if j == 0 {
                return y[0];
            }
            if j == n {
                return y[n - 1];
            }
            if x[j] == q {
                return y[j];
            }
            match method {
                InterpolationMethod::Previous => y[j - 1],
                InterpolationMethod::Next => y[j],
                InterpolationMethod::Nearest => {
                    if q - x[j - 1] < x[j] - q {
                        y[j - 1]
                    } else {
                        y[j]
                    }
                }
                InterpolationMethod::Linear => {
                    y[j - 1] + (y[j] - y[j - 1]) * (q - x[j - 1]) / (x[j] - x[j - 1])
                }
            }
        })
        .collect()
}

pub struct Interpolate {
    method: InterpolationMethod,
    x: usize,
    y: usize,
    xi: usize,
    output: Option<usize>,
}

impl Interpolate {
    pub fn build(spec: &mut ModuleSpec<'_>) -> LoadResult<Self> {
        let method = match spec.text("method") {
            None => InterpolationMethod::Linear,
            Some(name) => InterpolationMethod::parse(name)
                .ok_or_else(|| spec.invalid(format!("unknown interpolation method '{}'", name)))?,
        };
        Ok(Self {
            method,
            x: spec.require_input("x")?,
            y: spec.require_input("y")?,
            xi: spec.require_input("xi")?,
            output: spec.output("value"),
        })
    }
}

impl AnalysisModule for Interpolate {
    fn kind(&self) -> &str {
        "interpolate"
    }

    fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        let result = interpolate(
            cx.input(self.x).values(),
            cx.input(self.y).values(),
            cx.input(self.xi).values(),
            self.method,
        );
        cx.set_output(self.output, result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::module::testing::{assert_close, Harness};

    #[test]
    fn test_differentiate_and_integrate() {
        let out = Harness::new("differentiate")
            .input(None, &[1.0, 4.0, 9.0, 16.0])
            .output(None)
            .run_first();
        assert_eq!(out, vec![3.0, 5.0, 7.0]);

        let out = Harness::new("integrate")
            .input(None, &[1.0, 2.0, 3.0])
            .output(None)
            .run_first();
        assert_eq!(out, vec![1.0, 3.0, 6.0]);

        let out = Harness::new("differentiate")
            .input(None, &[1.0])
            .output(None)
            .run_first();
        assert!(out.is_empty());
    }

    #[test]
    fn test_fft_module_real_input() {
        let signal: Vec<f64> = (0..8).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let results = Harness::new("fft")
            .input(Some("re"), &signal)
            .output(Some("re"))
            .output(Some("im"))
            .run();
        let re = results[0].as_deref().unwrap();
        assert_eq!(re.len(), 4);
        assert_close(re, &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_autocorrelation_filters_lags() {
        let results = Harness::new("autocorrelation")
            .input(Some("x"), &[10.0, 11.0, 12.0, 13.0])
            .input(Some("y"), &[1.0, 1.0, 1.0, 1.0])
            .value(Some("minX"), 1.0)
            .value(Some("maxX"), 2.0)
            .output(Some("y"))
            .output(Some("x"))
            .run();
        assert_close(results[0].as_deref().unwrap(), &[1.0, 1.0]);
        assert_close(results[1].as_deref().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_autocorrelation_without_x_uses_indices() {
        let results = Harness::new("autocorrelation")
            .input(Some("y"), &[2.0, 0.0, 2.0])
            .output(Some("y"))
            .output(Some("x"))
            .run();
        assert_close(results[0].as_deref().unwrap(), &[8.0 / 3.0, 0.0, 4.0]);
        assert_eq!(results[1], Some(vec![0.0, 1.0, 2.0]));
    }

    #[test]
    fn test_crosscorrelation_module() {
        let out = Harness::new("crosscorrelation")
            .input(None, &[1.0, 1.0])
            .input(None, &[1.0, 2.0, 3.0, 4.0])
            .output(None)
            .run_first();
        assert_close(&out, &[1.5, 2.5]);
    }

    #[test]
    fn test_gauss_kernel_normalised() {
        let kernel = gauss_kernel(2.0);
        assert_eq!(kernel.len(), 13);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(kernel[6] > kernel[5]);
    }

    #[test]
    fn test_gausssmooth_keeps_constant_signal() {
        let out = Harness::new("gausssmooth")
            .param("sigma", 1.5)
            .input(None, &[2.0; 10])
            .output(None)
            .run_first();
        assert_close(&out, &[2.0; 10]);
    }

    #[test]
    fn test_gausssmooth_rejects_bad_sigma() {
        assert!(Harness::new("gausssmooth")
            .param("sigma", 0)
            .input(None, &[1.0])
            .build()
            .is_err());
        assert!(Harness::new("gausssmooth")
            .param("sigma", 1e12)
            .input(None, &[1.0])
            .build()
            .is_err());
    }

    #[test]
    fn test_moving_average() {
        assert_close(
            &moving_average(&[1.0, 2.0, 3.0, 4.0], 2, false),
            &[1.0, 1.5, 2.5, 3.5],
        );
        assert_close(&moving_average(&[1.0, 2.0, 3.0, 4.0], 3, true), &[2.0, 3.0]);
        assert!(moving_average(&[1.0], 3, true).is_empty());

        let out = Harness::new("movingaverage")
            .input(Some("data"), &[2.0, 4.0, 6.0])
            .value(Some("width"), 2.0)
            .output(None)
            .run_first();
        assert_close(&out, &[2.0, 3.0, 5.0]);
    }

    #[test]
    fn test_moving_average_bad_width() {
        let err = Harness::new("movingaverage")
            .input(Some("data"), &[1.0])
            .value(Some("width"), -1.0)
            .output(None)
            .try_run();
        assert!(matches!(err, Err(ModuleError::Computation(_))));
    }

    #[test]
    fn test_interpolate_methods() {
        let x = [0.0, 1.0, 2.0];
        let y = [0.0, 10.0, 20.0];
        let xi = [-1.0, 0.25, 0.75, 1.0, 5.0];
        assert_close(
            &interpolate(&x, &y, &xi, InterpolationMethod::Linear),
            &[0.0, 2.5, 7.5, 10.0, 20.0],
        );
        assert_close(
            &interpolate(&x, &y, &xi, InterpolationMethod::Previous),
            &[0.0, 0.0, 0.0, 10.0, 20.0],
        );
        assert_close(
            &interpolate(&x, &y, &xi, InterpolationMethod::Next),
            &[0.0, 10.0, 10.0, 10.0, 20.0],
        );
        assert_close(
            &interpolate(&x, &y, &xi, InterpolationMethod::Nearest),
            &[0.0, 0.0, 10.0, 10.0, 20.0],
        );
        assert!(interpolate(&[], &[], &[1.0], InterpolationMethod::Linear)[0].is_nan());
        assert_eq!(interpolate(&[3.0], &[7.0], &[0.0, 9.0], InterpolationMethod::Linear), vec![7.0, 7.0]);
    }

    #[test]
    fn test_interpolate_module_method_param() {
        let out = Harness::new("interpolate")
            .param("method", "previous")
            .input(Some("x"), &[0.0, 1.0])
            .input(Some("y"), &[5.0, 6.0])
            .input(Some("xi"), &[0.5])
            .output(None)
            .run_first();
        assert_eq!(out, vec![5.0]);

        assert!(Harness::new("interpolate")
            .param("method", "cubic")
            .input(Some("x"), &[0.0])
            .input(Some("y"), &[0.0])
            .input(Some("xi"), &[0.0])
            .build()
            .is_err());
    }
}
