//! Turns an [`ExperimentDescriptor`] into buffers and an [`AnalysisGraph`].
//!
//! Everything that can be wrong with a descriptor is caught here, so a graph
//! that builds can always run: unknown kinds, undeclared buffers, malformed
//! formulas and parameters, bad cycle ranges.

use crate::analysis::io::{InputSource, ModuleInput, ModuleOutput, PortMap};
use crate::analysis::module::{
    default_output_clear, AnalysisModule, AnyModule, BuiltinModule, ModuleSpec,
};
use crate::buffer::{BufferTable, SampleBuffer};
use crate::config::{ExperimentDescriptor, ModuleDescriptor};
use crate::pipeline::error::{LoadError, LoadResult};
use crate::pipeline::graph::{AnalysisGraph, CycleRange, ModuleSlot};
use crate::pipeline::id::ModuleId;
use std::collections::HashMap;

/// Constructor for a module kind registered from outside the crate.
pub type ModuleFactory =
    Box<dyn Fn(&mut ModuleSpec<'_>) -> LoadResult<Box<dyn AnalysisModule>> + Send + Sync>;

/// Create every declared buffer.
pub fn build_buffers(descriptor: &ExperimentDescriptor) -> LoadResult<BufferTable> {
    let mut table = BufferTable::new();
    for buffer in &descriptor.buffers {
        if table.contains(&buffer.name) {
            return Err(LoadError::DuplicateBuffer {
                name: buffer.name.clone(),
            });
        }
        let created = SampleBuffer::with_options(&buffer.name, buffer.policy(), buffer.options())?;
        table.insert(created);
    }
    Ok(table)
}

/// Builds graphs from descriptors, consulting registered factories for
/// kinds that are not built in.
#[derive(Default)]
pub struct GraphBuilder {
    factories: HashMap<String, ModuleFactory>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `kind`. Built-in kinds take precedence.
    pub fn register<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&mut ModuleSpec<'_>) -> LoadResult<Box<dyn AnalysisModule>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
        self
    }

    pub fn build(
        &self,
        descriptor: &ExperimentDescriptor,
        buffers: &BufferTable,
    ) -> LoadResult<AnalysisGraph> {
        let modules = descriptor
            .modules
            .iter()
            .enumerate()
            .map(|(index, module)| self.build_slot(index, module, buffers))
            .collect::<LoadResult<Vec<_>>>()?;
        let graph = AnalysisGraph::new(modules);
        tracing::debug!(
            "Built analysis graph '{}': {} modules, {} pure inputs",
            descriptor.title,
            graph.len(),
            graph.pure_inputs().len()
        );
        Ok(graph)
    }

    fn build_slot(
        &self,
        index: usize,
        module: &ModuleDescriptor,
        buffers: &BufferTable,
    ) -> LoadResult<ModuleSlot> {
        let kind = module.kind.as_str();
        let invalid = |message: String| LoadError::InvalidDescriptor {
            index,
            kind: kind.to_string(),
            message,
        };
        let lookup = |name: &str| {
            buffers
                .get_buffer(name)
                .ok_or_else(|| LoadError::DanglingBuffer {
                    index,
                    kind: kind.to_string(),
                    buffer: name.to_string(),
                })
        };

        let mut inputs = Vec::with_capacity(module.inputs.len());
        for (i, input) in module.inputs.iter().enumerate() {
            let source = match (&input.buffer, input.value) {
                (Some(name), None) => InputSource::Buffer(lookup(name.as_str())?),
                (None, Some(value)) => InputSource::Value(value),
                (Some(_), Some(_)) => {
                    return Err(invalid(format!("input #{} has both a buffer and a value", i)))
                }
                (None, None) => {
                    return Err(invalid(format!("input #{} has neither a buffer nor a value", i)))
                }
            };
            inputs.push(ModuleInput {
                source,
                role: input.role.clone(),
                clear: input.clear,
                single: input.single,
            });
        }

        let mut outputs = Vec::with_capacity(module.outputs.len());
        for output in &module.outputs {
            outputs.push(ModuleOutput {
                buffer: lookup(output.buffer.as_str())?,
                role: output.role.clone(),
                clear: output.clear.unwrap_or_else(|| default_output_clear(kind)),
            });
        }

        let cycles = module
            .cycles
            .iter()
            .map(|c| CycleRange::parse(c).ok_or_else(|| invalid(format!("bad cycle range '{}'", c))))
            .collect::<LoadResult<Vec<_>>>()?;

        let mut spec = ModuleSpec::new(
            index,
            kind,
            &module.params,
            PortMap::new(inputs.iter().map(|i| i.role.clone())),
            PortMap::new(outputs.iter().map(|o| o.role.clone())),
        );
        let built = match BuiltinModule::build(&mut spec)? {
            Some(builtin) => AnyModule::Builtin(builtin),
            None => match self.factories.get(kind) {
                Some(factory) => AnyModule::Plugin(factory(&mut spec)?),
                None => {
                    return Err(LoadError::UnknownModuleKind {
                        index,
                        kind: kind.to_string(),
                    })
                }
            },
        };

        Ok(ModuleSlot {
            id: ModuleId(index as u32),
            module: built,
            inputs,
            outputs,
            cycles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::module::{ModuleContext, ModuleError};
    use crate::config::{BufferDescriptor, InputDescriptor, OutputDescriptor};
    use crate::pipeline::clock::TimeContext;
    use crate::pipeline::id::PassId;

    fn descriptor() -> ExperimentDescriptor {
        let mut d = ExperimentDescriptor::new("test");
        d.buffers = vec![
            BufferDescriptor::new("x", 0),
            BufferDescriptor::new("y", 0),
            BufferDescriptor::new("t", 0),
        ];
        d
    }

    #[test]
    fn test_builds_and_runs() {
        let mut d = descriptor();
        d.modules.push(
            ModuleDescriptor::new("add")
                .input(InputDescriptor::buffer("x"))
                .input(InputDescriptor::value(1.0))
                .output(OutputDescriptor::buffer("y")),
        );
        d.modules
            .push(ModuleDescriptor::new("timer").output(OutputDescriptor::buffer("t")));

        let buffers = build_buffers(&d).unwrap();
        let mut graph = GraphBuilder::new().build(&d, &buffers).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.modules()[0].outputs[0].clear);
        assert!(!graph.modules()[1].outputs[0].clear);

        let x = buffers.get_buffer("x").unwrap();
        x.append_from_slice(&[1.0, 2.0]);
        graph.run_pass(PassId(1), &TimeContext::default());
        graph.run_pass(PassId(2), &TimeContext::default());
        assert_eq!(buffers.get_buffer("y").unwrap().to_vec(), vec![2.0, 3.0]);
        assert_eq!(buffers.get_buffer("t").unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_buffer() {
        let mut d = descriptor();
        d.buffers.push(BufferDescriptor::new("x", 4));
        assert!(matches!(
            build_buffers(&d),
            Err(LoadError::DuplicateBuffer { name }) if name == "x"
        ));
    }

    #[test]
    fn test_base_contents_too_large() {
        let mut d = descriptor();
        let mut small = BufferDescriptor::new("small", 1);
        small.base_contents = vec![1.0, 2.0];
        d.buffers.push(small);
        assert!(matches!(build_buffers(&d), Err(LoadError::Buffer(_))));
    }

    #[test]
    fn test_load_errors_carry_descriptor() {
        let mut d = descriptor();
        d.modules.push(ModuleDescriptor::new("abs"));
        d.modules.push(
            ModuleDescriptor::new("add")
                .input(InputDescriptor::buffer("ghost"))
                .output(OutputDescriptor::buffer("y")),
        );
        let buffers = build_buffers(&d).unwrap();
        let err = GraphBuilder::new().build(&d, &buffers).err().unwrap();
        assert!(matches!(
            err,
            LoadError::DanglingBuffer { index: 1, ref buffer, .. } if buffer == "ghost"
        ));

        d.modules[1] = ModuleDescriptor::new("loess");
        let err = GraphBuilder::new().build(&d, &buffers).err().unwrap();
        assert!(matches!(err, LoadError::UnknownModuleKind { index: 1, .. }));

        d.modules[1] = ModuleDescriptor::new("formula").param("formula", "sqrt(");
        let err = GraphBuilder::new().build(&d, &buffers).err().unwrap();
        assert!(matches!(err, LoadError::Formula { index: 1, .. }));

        d.modules[1] = ModuleDescriptor::new("abs").cycles("3-1");
        let err = GraphBuilder::new().build(&d, &buffers).err().unwrap();
        assert!(matches!(err, LoadError::InvalidDescriptor { index: 1, .. }));

        let mut both = InputDescriptor::buffer("x");
        both.value = Some(1.0);
        d.modules[1] = ModuleDescriptor::new("abs").input(both);
        let err = GraphBuilder::new().build(&d, &buffers).err().unwrap();
        assert!(matches!(err, LoadError::InvalidDescriptor { index: 1, .. }));
    }

    struct Doubler {
        input: Option<usize>,
        output: Option<usize>,
    }

    impl AnalysisModule for Doubler {
        fn kind(&self) -> &str {
            "double"
        }

        fn compute(&mut self, cx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
            let values = cx
                .optional(self.input)
                .map(|d| d.values().iter().map(|v| v * 2.0).collect())
                .unwrap_or_default();
            cx.set_output(self.output, values);
            Ok(())
        }
    }

    #[test]
    fn test_registered_factory() {
        let mut d = descriptor();
        d.modules.push(
            ModuleDescriptor::new("double")
                .input(InputDescriptor::buffer("x"))
                .output(OutputDescriptor::buffer("y")),
        );
        let buffers = build_buffers(&d).unwrap();
        let builder = GraphBuilder::new().register("double", |spec| {
            Ok(Box::new(Doubler {
                input: spec.input("value"),
                output: spec.output("out"),
            }) as Box<dyn AnalysisModule>)
        });
        let mut graph = builder.build(&d, &buffers).unwrap();
        buffers.get_buffer("x").unwrap().append_from_slice(&[1.5]);
        graph.run_pass(PassId(1), &TimeContext::default());
        assert_eq!(buffers.get_buffer("y").unwrap().to_vec(), vec![3.0]);
        assert_eq!(graph.modules()[0].kind(), "double");
    }
}
