//! Name-keyed table of the buffers owned by one experiment.

use super::{BufferError, SampleBuffer};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to a buffer. Collaborators keep these to read and append
/// without going through the table again.
pub type BufferHandle = Arc<SampleBuffer>;

/// Declaration-ordered buffer table with O(1) lookup by name.
#[derive(Debug, Default, Clone)]
pub struct BufferTable {
    buffers: Vec<BufferHandle>,
    by_name: HashMap<String, usize>,
}

impl BufferTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a buffer. A buffer with the same name is replaced in place and
    /// returned.
    pub fn insert(&mut self, buffer: SampleBuffer) -> Option<BufferHandle> {
        let handle = Arc::new(buffer);
        match self.by_name.get(handle.name()) {
            Some(&index) => Some(std::mem::replace(&mut self.buffers[index], handle)),
            None => {
                self.by_name
                    .insert(handle.name().to_string(), self.buffers.len());
                self.buffers.push(handle);
                None
            }
        }
    }

    pub fn get_buffer(&self, name: &str) -> Option<BufferHandle> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.buffers[index]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Buffers in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &BufferHandle> {
        self.buffers.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.buffers.iter().map(|b| b.name())
    }

    pub fn open_all(&self) -> Result<(), BufferError> {
        self.buffers.iter().try_for_each(|b| b.open())
    }

    pub fn close_all(&self) -> Result<(), BufferError> {
        self.buffers.iter().try_for_each(|b| b.close())
    }

    pub fn clear_all(&self) {
        for buffer in &self.buffers {
            buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::StoragePolicy;

    #[test]
    fn test_lookup_by_name() {
        let mut table = BufferTable::new();
        table.insert(SampleBuffer::new("acc_x", StoragePolicy::FixedMemory(10)));
        table.insert(SampleBuffer::new("acc_y", StoragePolicy::Unbounded));

        let handle = table.get_buffer("acc_x").unwrap();
        handle.append(1.5);
        assert_eq!(table.get_buffer("acc_x").unwrap().last(), Some(1.5));
        assert!(table.get_buffer("missing").is_none());
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["acc_x", "acc_y"]);
    }

    #[test]
    fn test_insert_replaces_same_name() {
        let mut table = BufferTable::new();
        assert!(table
            .insert(SampleBuffer::new("t", StoragePolicy::Unbounded))
            .is_none());
        let old = table.insert(SampleBuffer::new("t", StoragePolicy::FixedMemory(2)));
        assert!(old.is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get_buffer("t").unwrap().size(), 2);
    }

    #[test]
    fn test_bulk_lifecycle() {
        let mut table = BufferTable::new();
        table.insert(SampleBuffer::new("a", StoragePolicy::Unbounded));
        table.insert(SampleBuffer::new("b", StoragePolicy::Unbounded));
        table.open_all().unwrap();
        assert!(table.iter().all(|b| b.is_open()));
        table.get_buffer("a").unwrap().append(3.0);
        table.clear_all();
        assert!(table.iter().all(|b| b.is_empty()));
        table.close_all().unwrap();
        assert!(table.iter().all(|b| !b.is_open()));
    }
}
