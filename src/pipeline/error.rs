//! Load-time errors for the analysis graph.
//!
//! These abort graph construction. Errors raised while a pass runs are
//! [`ModuleError`](crate::analysis::module::ModuleError)s and never reach
//! this type.

use crate::analysis::formula::FormulaError;
use crate::buffer::BufferError;
use thiserror::Error;

/// Errors that can occur while building an analysis graph.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Module #{index}: unknown kind '{kind}'")]
    UnknownModuleKind { index: usize, kind: String },

    #[error("Module #{index} ({kind}): buffer '{buffer}' is not declared")]
    DanglingBuffer {
        index: usize,
        kind: String,
        buffer: String,
    },

    #[error("Buffer '{name}' is declared more than once")]
    DuplicateBuffer { name: String },

    #[error("Module #{index} (formula): {source}")]
    Formula {
        index: usize,
        #[source]
        source: FormulaError,
    },

    #[error("Module #{index} ({kind}): {message}")]
    InvalidDescriptor {
        index: usize,
        kind: String,
        message: String,
    },

    #[error("Buffer declaration: {0}")]
    Buffer(#[from] BufferError),
}

impl LoadError {
    /// Index of the offending module descriptor, if any.
    pub fn module_index(&self) -> Option<usize> {
        match self {
            LoadError::UnknownModuleKind { index, .. }
            | LoadError::DanglingBuffer { index, .. }
            | LoadError::Formula { index, .. }
            | LoadError::InvalidDescriptor { index, .. } => Some(*index),
            LoadError::DuplicateBuffer { .. } | LoadError::Buffer(_) => None,
        }
    }
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_descriptor() {
        let err = LoadError::DanglingBuffer {
            index: 2,
            kind: "add".into(),
            buffer: "ghost".into(),
        };
        assert_eq!(
            err.to_string(),
            "Module #2 (add): buffer 'ghost' is not declared"
        );
        assert_eq!(err.module_index(), Some(2));
        assert_eq!(
            LoadError::DuplicateBuffer { name: "a".into() }.module_index(),
            None
        );
    }
}
