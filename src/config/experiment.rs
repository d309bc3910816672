//! Experiment descriptors
//!
//! The serialized form of an experiment as handed over by a loader: buffer
//! declarations followed by the module list in execution order.
//!
//! ```json
//! {
//!   "title": "Pendulum",
//!   "buffers": [
//!     { "name": "acc", "size": 0 },
//!     { "name": "smooth", "size": 0 }
//!   ],
//!   "modules": [
//!     {
//!       "kind": "gausssmooth",
//!       "inputs": [{ "buffer": "acc" }],
//!       "outputs": [{ "buffer": "smooth" }],
//!       "params": { "sigma": 2 }
//!     }
//!   ]
//! }
//! ```

use super::{load_file, save_file, EngineConfig};
use crate::buffer::{BufferOptions, StoragePolicy};
use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Complete experiment definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDescriptor {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default)]
    pub buffers: Vec<BufferDescriptor>,

    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,

    /// Engine settings shipped with the experiment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<EngineConfig>,
}

fn default_title() -> String {
    "experiment".to_string()
}

impl ExperimentDescriptor {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Load a descriptor from JSON or TOML (by extension)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_file(path.as_ref(), "experiment")
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_file(self, path.as_ref(), "experiment")
    }

    pub fn buffer(&self, name: &str) -> Option<&BufferDescriptor> {
        self.buffers.iter().find(|b| b.name == name)
    }
}

// ==================== Buffers ====================

/// Where a buffer keeps its samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[default]
    Memory,
    Hybrid,
}

/// Declaration of one named buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferDescriptor {
    pub name: String,

    /// In-memory capacity, 0 = unbounded
    #[serde(default)]
    pub size: usize,

    #[serde(default)]
    pub storage: StorageKind,

    /// Backing file for hybrid storage; defaults to the temp directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_contents: Vec<f64>,

    #[serde(default, rename = "static")]
    pub static_once: bool,
}

impl BufferDescriptor {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            storage: StorageKind::Memory,
            path: None,
            base_contents: Vec::new(),
            static_once: false,
        }
    }

    pub fn policy(&self) -> StoragePolicy {
        match self.storage {
            StorageKind::Memory if self.size == 0 => StoragePolicy::Unbounded,
            StorageKind::Memory => StoragePolicy::FixedMemory(self.size),
            StorageKind::Hybrid => StoragePolicy::Hybrid {
                memory: self.size,
                path: self.path.clone().unwrap_or_else(|| {
                    std::env::temp_dir().join(format!(
                        "sampleflow-{}-{}.buffer",
                        std::process::id(),
                        self.name
                    ))
                }),
            },
        }
    }

    pub fn options(&self) -> BufferOptions {
        BufferOptions {
            base_contents: self.base_contents.clone(),
            static_once: self.static_once,
            attached_to_text_field: false,
        }
    }
}

// ==================== Modules ====================

/// One analysis step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub kind: String,

    #[serde(default)]
    pub inputs: Vec<InputDescriptor>,

    #[serde(default)]
    pub outputs: Vec<OutputDescriptor>,

    /// Module parameters; numbers and booleans are kept in their text form
    #[serde(
        default,
        deserialize_with = "params_as_strings",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub params: BTreeMap<String, String>,

    /// Pass numbers this module runs on (`"3"`, `"2-5"`, `"4-"`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<String>,
}

impl ModuleDescriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn input(mut self, input: InputDescriptor) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, output: OutputDescriptor) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn cycles(mut self, cycles: impl Into<String>) -> Self {
        self.cycles.push(cycles.into());
        self
    }
}

/// Where a module reads one input from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<String>,

    /// Literal constant instead of a buffer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Clear the buffer after the module consumed it
    #[serde(default)]
    pub clear: bool,

    /// Read only the latest value
    #[serde(default)]
    pub single: bool,
}

impl InputDescriptor {
    pub fn buffer(name: impl Into<String>) -> Self {
        Self {
            buffer: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn clear(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }

    pub fn single(mut self, single: bool) -> Self {
        self.single = single;
        self
    }
}

/// Where a module writes one output to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub buffer: String,

    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Replace (true) or append (false); unset means the module's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear: Option<bool>,
}

impl OutputDescriptor {
    pub fn buffer(name: impl Into<String>) -> Self {
        Self {
            buffer: name.into(),
            ..Default::default()
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn clear(mut self, clear: bool) -> Self {
        self.clear = Some(clear);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

fn params_as_strings<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, ParamValue>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            let text = match v {
                ParamValue::Bool(b) => b.to_string(),
                ParamValue::Int(i) => i.to_string(),
                ParamValue::Float(f) => f.to_string(),
                ParamValue::Text(s) => s,
            };
            (k, text)
        })
        .collect())
}
