//! Descriptor builders for integration tests

use sampleflow_rs::config::{
    BufferDescriptor, EngineConfig, ExperimentDescriptor, InputDescriptor, ModuleDescriptor,
    OutputDescriptor,
};

/// Builder for experiment descriptors
pub struct ExperimentBuilder {
    descriptor: ExperimentDescriptor,
}

impl ExperimentBuilder {
    pub fn new(title: &str) -> Self {
        Self {
            descriptor: ExperimentDescriptor::new(title),
        }
    }

    /// Declare an unbounded buffer
    pub fn buffer(self, name: &str) -> Self {
        self.sized_buffer(name, 0)
    }

    pub fn sized_buffer(mut self, name: &str, size: usize) -> Self {
        self.descriptor
            .buffers
            .push(BufferDescriptor::new(name, size));
        self
    }

    pub fn module(mut self, module: ModuleDescriptor) -> Self {
        self.descriptor.modules.push(module);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.descriptor.config = Some(config);
        self
    }

    pub fn build(self) -> ExperimentDescriptor {
        self.descriptor
    }
}

/// Module reading `inputs` (buffer names) and writing `outputs`
pub fn module(kind: &str, inputs: &[&str], outputs: &[&str]) -> ModuleDescriptor {
    let module = inputs
        .iter()
        .fold(ModuleDescriptor::new(kind), |m, name| {
            m.input(InputDescriptor::buffer(*name))
        });
    outputs
        .iter()
        .fold(module, |m, name| m.output(OutputDescriptor::buffer(*name)))
}

/// Engine config with the shortest allowed delay
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        min_interval_secs: 0.005,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_builder() {
        let descriptor = ExperimentBuilder::new("test")
            .buffer("a")
            .sized_buffer("b", 4)
            .module(module("abs", &["a"], &["b"]))
            .build();

        assert_eq!(descriptor.title, "test");
        assert_eq!(descriptor.buffers.len(), 2);
        assert_eq!(descriptor.modules[0].inputs.len(), 1);
        assert_eq!(descriptor.modules[0].outputs[0].buffer, "b");
    }
}
