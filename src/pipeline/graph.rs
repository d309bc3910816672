//! The analysis graph: every module in declared order with its bound inputs
//! and outputs.
//!
//! # Pass execution
//!
//! [`AnalysisGraph::run_pass`] walks the modules in order. For each module
//! that is active in the current pass it
//!
//! 1. snapshots every input into an [`InputData`](crate::analysis::io::InputData),
//! 2. runs [`AnyModule::compute`] on the snapshot,
//! 3. on success writes each staged result (replace or append per output),
//!    then clears inputs flagged `clear`.
//!
//! A failing module writes nothing and leaves its inputs untouched. Because
//! modules run one after another, module `n` sees what module `n - 1` wrote
//! in the same pass.

use crate::analysis::io::{ModuleInput, ModuleOutput};
use crate::analysis::module::{AnyModule, ModuleContext, ModuleError};
use crate::buffer::{BufferHandle, StateToken};
use crate::pipeline::clock::TimeContext;
use crate::pipeline::id::{ModuleId, PassId};
use std::fmt;

/// Inclusive range of pass numbers. `end == None` is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl CycleRange {
    /// Parse `"n"`, `"a-b"` or `"a-"`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text.split_once('-') {
            None => {
                let n = text.parse().ok()?;
                Some(Self {
                    start: n,
                    end: Some(n),
                })
            }
            Some((a, b)) => {
                let start = a.trim().parse().ok()?;
                let b = b.trim();
                let end = if b.is_empty() {
                    None
                } else {
                    Some(b.parse().ok()?)
                };
                if end.is_some_and(|e| e < start) {
                    return None;
                }
                Some(Self { start, end })
            }
        }
    }

    pub fn contains(&self, pass: PassId) -> bool {
        pass.0 >= self.start && self.end.map_or(true, |e| pass.0 <= e)
    }
}

impl fmt::Display for CycleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(e) if e == self.start => write!(f, "{}", e),
            Some(e) => write!(f, "{}-{}", self.start, e),
            None => write!(f, "{}-", self.start),
        }
    }
}

/// One module with its bindings.
pub struct ModuleSlot {
    pub id: ModuleId,
    pub module: AnyModule,
    pub inputs: Vec<ModuleInput>,
    pub outputs: Vec<ModuleOutput>,
    /// Empty means every pass.
    pub cycles: Vec<CycleRange>,
}

impl ModuleSlot {
    pub fn kind(&self) -> &str {
        self.module.kind()
    }

    pub fn runs_in(&self, pass: PassId) -> bool {
        self.cycles.is_empty() || self.cycles.iter().any(|c| c.contains(pass))
    }

    /// Compute and, on success, write outputs and clear inputs. Returns the
    /// state tokens left behind by input clears.
    pub fn run(&mut self, time: &TimeContext) -> Result<Vec<StateToken>, ModuleError> {
        let snapshot: Vec<_> = self.inputs.iter().map(ModuleInput::read).collect();
        let sizes: Vec<usize> = self.outputs.iter().map(ModuleOutput::size).collect();

        let mut cx = ModuleContext::new(&snapshot, &sizes, time);
        self.module.compute(&mut cx)?;

        for (output, result) in self.outputs.iter().zip(cx.into_results()) {
            if let Some(values) = result {
                output.write(&values);
            }
        }
        Ok(self
            .inputs
            .iter()
            .filter_map(ModuleInput::clear_after_read)
            .collect())
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub pass: PassId,
    pub executed: usize,
    /// Modules outside their cycles.
    pub inactive: usize,
    pub failed: Vec<(ModuleId, ModuleError)>,
    /// Buffer states produced by input clears during the pass.
    pub cleared: Vec<StateToken>,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered module list plus the buffers whose changes drive it.
pub struct AnalysisGraph {
    modules: Vec<ModuleSlot>,
    pure_inputs: Vec<BufferHandle>,
}

impl AnalysisGraph {
    /// Assemble a graph; pure inputs are the buffers read by some module and
    /// written by none.
    pub fn new(modules: Vec<ModuleSlot>) -> Self {
        let written: Vec<&str> = modules
            .iter()
            .flat_map(|m| m.outputs.iter().map(|o| o.buffer.name()))
            .collect();
        let mut pure_inputs: Vec<BufferHandle> = Vec::new();
        for buffer in modules.iter().flat_map(|m| m.inputs.iter().filter_map(ModuleInput::buffer)) {
            let name = buffer.name();
            if !written.contains(&name) && !pure_inputs.iter().any(|b| b.name() == name) {
                pure_inputs.push(buffer.clone());
            }
        }
        Self {
            modules,
            pure_inputs,
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn modules(&self) -> &[ModuleSlot] {
        &self.modules
    }

    /// Buffers whose external mutation should schedule a pass.
    pub fn pure_inputs(&self) -> &[BufferHandle] {
        &self.pure_inputs
    }

    /// Run every module active in `pass`, in declared order.
    pub fn run_pass(&mut self, pass: PassId, time: &TimeContext) -> PassReport {
        let mut report = PassReport {
            pass,
            ..Default::default()
        };
        for slot in &mut self.modules {
            if !slot.runs_in(pass) {
                report.inactive += 1;
                continue;
            }
            match slot.run(time) {
                Ok(cleared) => {
                    report.executed += 1;
                    report.cleared.extend(cleared);
                }
                Err(e) => {
                    tracing::warn!("{:?} ({}) produced no output: {}", slot.id, slot.kind(), e);
                    report.failed.push((slot.id, e));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::io::InputSource;
    use crate::analysis::module::{AnalysisModule, BuiltinModule, ModuleSpec};
    use crate::analysis::io::PortMap;
    use crate::buffer::{SampleBuffer, StoragePolicy};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn buffer(name: &str) -> BufferHandle {
        Arc::new(SampleBuffer::new(name, StoragePolicy::Unbounded))
    }

    fn input(buffer: &BufferHandle, clear: bool) -> ModuleInput {
        ModuleInput {
            source: InputSource::Buffer(buffer.clone()),
            role: None,
            clear,
            single: false,
        }
    }

    fn output(buffer: &BufferHandle, clear: bool) -> ModuleOutput {
        ModuleOutput {
            buffer: buffer.clone(),
            role: None,
            clear,
        }
    }

    fn builtin(kind: &str, params: &[(&str, &str)], inputs: usize, outputs: usize) -> AnyModule {
        let params: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut spec = ModuleSpec::new(
            0,
            kind,
            &params,
            PortMap::new(vec![None; inputs]),
            PortMap::new(vec![None; outputs]),
        );
        AnyModule::Builtin(BuiltinModule::build(&mut spec).unwrap().unwrap())
    }

    struct Failing;

    impl AnalysisModule for Failing {
        fn kind(&self) -> &str {
            "failing"
        }

        fn compute(&mut self, _cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
            Err(ModuleError::Computation("always".into()))
        }
    }

    #[test]
    fn test_cycle_range_parse() {
        assert_eq!(
            CycleRange::parse("3"),
            Some(CycleRange {
                start: 3,
                end: Some(3)
            })
        );
        assert_eq!(
            CycleRange::parse("2-5"),
            Some(CycleRange {
                start: 2,
                end: Some(5)
            })
        );
        let open = CycleRange::parse("4-").unwrap();
        assert!(open.contains(PassId(100)));
        assert!(!open.contains(PassId(3)));
        assert_eq!(open.to_string(), "4-");
        assert_eq!(CycleRange::parse("5-2"), None);
        assert_eq!(CycleRange::parse("x"), None);
    }

    #[test]
    fn test_chained_modules_see_same_pass_writes() {
        let a = buffer("a");
        let b = buffer("b");
        let c = buffer("c");
        a.append_from_slice(&[1.0, 2.0]);

        let mut graph = AnalysisGraph::new(vec![
            ModuleSlot {
                id: ModuleId(0),
                module: builtin("multiply", &[], 2, 1),
                inputs: vec![
                    input(&a, false),
                    ModuleInput {
                        source: InputSource::Value(10.0),
                        role: None,
                        clear: false,
                        single: false,
                    },
                ],
                outputs: vec![output(&b, true)],
                cycles: vec![],
            },
            ModuleSlot {
                id: ModuleId(1),
                module: builtin("count", &[], 1, 1),
                inputs: vec![input(&b, false)],
                outputs: vec![output(&c, false)],
                cycles: vec![],
            },
        ]);

        assert_eq!(graph.pure_inputs().len(), 1);
        assert_eq!(graph.pure_inputs()[0].name(), "a");

        let report = graph.run_pass(PassId(1), &TimeContext::default());
        assert!(report.is_clean());
        assert_eq!(report.executed, 2);
        assert_eq!(b.to_vec(), vec![10.0, 20.0]);
        graph.run_pass(PassId(2), &TimeContext::default());
        assert_eq!(b.to_vec(), vec![10.0, 20.0]);
        assert_eq!(c.to_vec(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_failure_writes_nothing_and_keeps_inputs() {
        let a = buffer("a");
        let out = buffer("out");
        a.append_from_slice(&[1.0]);
        out.append_from_slice(&[42.0]);

        let mut graph = AnalysisGraph::new(vec![ModuleSlot {
            id: ModuleId(0),
            module: AnyModule::Plugin(Box::new(Failing)),
            inputs: vec![input(&a, true)],
            outputs: vec![output(&out, true)],
            cycles: vec![],
        }]);
        let report = graph.run_pass(PassId(1), &TimeContext::default());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(out.to_vec(), vec![42.0]);
        assert_eq!(a.to_vec(), vec![1.0]);
    }

    #[test]
    fn test_input_clear_after_success() {
        let a = buffer("a");
        let out = buffer("out");
        a.append_from_slice(&[1.0, 2.0, 3.0]);

        let mut graph = AnalysisGraph::new(vec![ModuleSlot {
            id: ModuleId(0),
            module: builtin("append", &[], 1, 1),
            inputs: vec![input(&a, true)],
            outputs: vec![output(&out, false)],
            cycles: vec![],
        }]);
        graph.run_pass(PassId(1), &TimeContext::default());
        a.append(4.0);
        graph.run_pass(PassId(2), &TimeContext::default());
        let report = graph.run_pass(PassId(3), &TimeContext::default());
        assert!(a.is_empty());
        assert_eq!(report.cleared, vec![a.state_token()]);
        assert_eq!(out.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_cycles_restrict_execution() {
        let out = buffer("out");
        let mut graph = AnalysisGraph::new(vec![ModuleSlot {
            id: ModuleId(0),
            module: builtin("const", &[("value", "1")], 0, 1),
            inputs: vec![],
            outputs: vec![output(&out, false)],
            cycles: vec![CycleRange::parse("2-3").unwrap()],
        }]);
        for pass in 1..=5 {
            graph.run_pass(PassId(pass), &TimeContext::default());
        }
        assert_eq!(out.to_vec(), vec![1.0, 1.0]);
        let report = graph.run_pass(PassId(9), &TimeContext::default());
        assert_eq!(report.inactive, 1);
    }
}
