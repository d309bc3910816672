//! Module input and output bindings.
//!
//! Inputs are read into [`InputData`] snapshots before a module computes,
//! so a module never holds a buffer lock while it works. Outputs are written
//! only after the computation succeeded.

use super::value_source::ValueSource;
use crate::buffer::{BufferHandle, StateToken};

/// Where an input reads from.
#[derive(Debug, Clone)]
pub enum InputSource {
    Buffer(BufferHandle),
    Value(f64),
}

/// A bound module input.
#[derive(Debug, Clone)]
pub struct ModuleInput {
    pub source: InputSource,
    pub role: Option<String>,
    /// Clear the buffer after a successful pass.
    pub clear: bool,
    /// Read only the newest value.
    pub single: bool,
}

impl ModuleInput {
    pub fn buffer(&self) -> Option<&BufferHandle> {
        match &self.source {
            InputSource::Buffer(b) => Some(b),
            InputSource::Value(_) => None,
        }
    }

    /// Snapshot the current contents.
    pub fn read(&self) -> InputData {
        match &self.source {
            InputSource::Buffer(buffer) if self.single => InputData {
                values: buffer.last().into_iter().collect(),
                scalar: true,
            },
            InputSource::Buffer(buffer) => InputData {
                values: buffer.to_vec(),
                scalar: false,
            },
            InputSource::Value(v) => InputData {
                values: vec![*v],
                scalar: true,
            },
        }
    }

    /// Apply the `clear` flag. Static buffers and buffers bound to an
    /// editable field keep their contents.
    ///
    /// Returns the token of the cleared state so the caller can tell its
    /// own notification apart from external writes.
    pub fn clear_after_read(&self) -> Option<StateToken> {
        if !self.clear {
            return None;
        }
        match &self.source {
            InputSource::Buffer(buffer)
                if !buffer.is_static() && !buffer.attached_to_text_field() =>
            {
                buffer.clear();
                Some(buffer.state_token())
            }
            _ => None,
        }
    }
}

/// A bound module output.
#[derive(Debug, Clone)]
pub struct ModuleOutput {
    pub buffer: BufferHandle,
    pub role: Option<String>,
    /// Replace the contents (true) or append (false).
    pub clear: bool,
}

impl ModuleOutput {
    pub fn write(&self, values: &[f64]) {
        if self.clear {
            self.buffer.replace_values(values);
        } else {
            self.buffer.append_from_slice(values);
        }
    }

    /// Declared capacity of the target buffer, `0` when unbounded.
    pub fn size(&self) -> usize {
        self.buffer.size()
    }
}

/// Values of one input as seen by a module during a pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputData {
    values: Vec<f64>,
    scalar: bool,
}

impl InputData {
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            values,
            scalar: false,
        }
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            values: vec![value],
            scalar: true,
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Literal values and `single` inputs.
    pub fn is_scalar(&self) -> bool {
        self.scalar
    }

    /// Newest value, the way a scalar parameter is read from a buffer.
    pub fn single(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Newest value truncated to an integer, `None` if it has no integer
    /// counterpart.
    pub fn single_as_int(&self) -> Option<i64> {
        const LIMIT: f64 = 9_007_199_254_740_992.0; // 2^53
        self.single()
            .filter(|v| v.is_finite() && v.abs() < LIMIT)
            .map(|v| v.trunc() as i64)
    }

    /// Operand form for arithmetic: literals, `single` inputs and
    /// one-element buffers are scalars.
    pub fn as_value_source(&self) -> ValueSource {
        match (self.scalar, self.values.as_slice()) {
            (_, [v]) => ValueSource::Scalar(*v),
            (true, [.., last]) => ValueSource::Scalar(*last),
            _ => ValueSource::Vector(self.values.clone()),
        }
    }
}

/// Resolves declared ports against the roles a module understands.
///
/// A port is claimed by an exact role match first; failing that, the first
/// unclaimed port without a role is taken, so unlabeled ports bind in the
/// order each module asks for them.
#[derive(Debug, Clone)]
pub struct PortMap {
    roles: Vec<Option<String>>,
    taken: Vec<bool>,
}

impl PortMap {
    pub fn new(roles: impl IntoIterator<Item = Option<String>>) -> Self {
        let roles: Vec<_> = roles.into_iter().collect();
        let taken = vec![false; roles.len()];
        Self { roles, taken }
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Claim the port for `role`, falling back to the next unlabeled port.
    pub fn take(&mut self, role: &str) -> Option<usize> {
        self.take_exact(role).or_else(|| self.take_unlabeled())
    }

    /// Claim the port for `role` without positional fallback.
    pub fn take_exact(&mut self, role: &str) -> Option<usize> {
        let idx = (0..self.roles.len())
            .find(|&i| !self.taken[i] && self.roles[i].as_deref() == Some(role))?;
        self.taken[idx] = true;
        Some(idx)
    }

    fn take_unlabeled(&mut self) -> Option<usize> {
        let idx = (0..self.roles.len()).find(|&i| !self.taken[i] && self.roles[i].is_none())?;
        self.taken[idx] = true;
        Some(idx)
    }

    /// Claim every remaining port, in declared order.
    pub fn take_rest(&mut self) -> Vec<usize> {
        let rest: Vec<usize> = (0..self.roles.len()).filter(|&i| !self.taken[i]).collect();
        for &i in &rest {
            self.taken[i] = true;
        }
        rest
    }

    pub fn role(&self, idx: usize) -> Option<&str> {
        self.roles.get(idx).and_then(|r| r.as_deref())
    }
}
