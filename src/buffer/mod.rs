//! Named sample buffers
//!
//! A [`SampleBuffer`] is the unit of data exchange between acquisition
//! front-ends, analysis modules and the UI. It holds `f64` samples under
//! one of three [`StoragePolicy`] variants:
//!
//! - **Unbounded**: plain growing vector.
//! - **FixedMemory(n)**: ring of the newest `n` samples, oldest evicted first.
//! - **Hybrid**: the newest `memory` samples in RAM, full history appended to
//!   a backing file while the buffer is open.
//!
//! # Locking
//!
//! Every buffer carries its own `RwLock`. Readers (`to_vec`, `last`, `get`)
//! take the shared side; mutators hold the exclusive side for their whole
//! duration, disk write included, so memory and disk never disagree from a
//! reader's point of view.
//!
//! # Disk failures
//!
//! A failed write to the backing file does not stop the buffer: memory and
//! `len` carry on. The on-disk history is flagged incomplete, and `history`
//! and `write_state` refuse with [`BufferError::HistoryLost`] until a
//! `clear`, `replace_values` or `open` rewrites the file.
//!
//! # Static buffers
//!
//! A buffer declared `static_once` accepts exactly one write
//! (`append`, `append_from_slice` or `replace_values`). Later mutations,
//! `clear` included, are ignored until [`SampleBuffer::reset_static`].
//!
//! # Example
//!
//! ```
//! use sampleflow_rs::buffer::{SampleBuffer, StoragePolicy};
//!
//! let buffer = SampleBuffer::new("x", StoragePolicy::FixedMemory(3));
//! buffer.append_from_slice(&[1.0, 2.0, 3.0, 4.0]);
//! assert_eq!(buffer.to_vec(), vec![2.0, 3.0, 4.0]);
//! ```

pub mod observer;
pub mod storage;
pub mod table;

pub use observer::{BufferEvent, ObserverRegistry, StateToken};
pub use storage::{BackingFile, StoragePolicy};
pub use table::{BufferHandle, BufferTable};

use crate::pipeline::id::SubscriberId;
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors raised by buffer storage and snapshots.
#[derive(Error, Debug)]
pub enum BufferError {
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot {} is {len} bytes, not a whole number of samples", path.display())]
    Corrupt { path: PathBuf, len: u64 },

    #[error("Backing file of '{name}' missed writes; its history is incomplete")]
    HistoryLost { name: String },

    #[error("Base contents of '{name}' hold {len} values but capacity is {capacity}")]
    BaseContentsTooLarge {
        name: String,
        len: usize,
        capacity: usize,
    },
}

/// Construction options beyond name and storage.
#[derive(Debug, Clone, Default)]
pub struct BufferOptions {
    /// Seed values restored by `clear`.
    pub base_contents: Vec<f64>,
    /// Accept one write only.
    pub static_once: bool,
    /// Bound to an editable UI field; external clears should leave it alone.
    pub attached_to_text_field: bool,
}

#[derive(Debug)]
struct BufferState {
    memory: VecDeque<f64>,
    /// History length while open, counting writes the backing file missed.
    persisted: usize,
    backing: Option<BackingFile>,
    history_lost: bool,
    written: bool,
    open: bool,
    token: StateToken,
}

/// Named, thread-safe sequence of `f64` samples.
#[derive(Debug)]
pub struct SampleBuffer {
    name: Arc<str>,
    policy: StoragePolicy,
    base_contents: Vec<f64>,
    static_once: bool,
    attached_to_text_field: AtomicBool,
    state: RwLock<BufferState>,
    observers: ObserverRegistry,
}

impl SampleBuffer {
    /// Create an empty, non-static buffer.
    pub fn new(name: impl Into<String>, policy: StoragePolicy) -> Self {
        Self::build(name.into(), policy, BufferOptions::default())
    }

    /// Create a buffer with base contents and flags.
    ///
    /// Fails if the base contents do not fit the capacity.
    pub fn with_options(
        name: impl Into<String>,
        policy: StoragePolicy,
        options: BufferOptions,
    ) -> Result<Self, BufferError> {
        let name = name.into();
        let capacity = policy.effective_capacity();
        if options.base_contents.len() > capacity {
            return Err(BufferError::BaseContentsTooLarge {
                name,
                len: options.base_contents.len(),
                capacity,
            });
        }
        Ok(Self::build(name, policy, options))
    }

    fn build(name: String, policy: StoragePolicy, options: BufferOptions) -> Self {
        let memory: VecDeque<f64> = options.base_contents.iter().copied().collect();
        Self {
            name: Arc::from(name),
            policy,
            base_contents: options.base_contents,
            static_once: options.static_once,
            attached_to_text_field: AtomicBool::new(options.attached_to_text_field),
            state: RwLock::new(BufferState {
                memory,
                persisted: 0,
                backing: None,
                history_lost: false,
                written: false,
                open: false,
                token: StateToken::fresh(),
            }),
            observers: ObserverRegistry::new(),
        }
    }

    // ── Metadata ──

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &StoragePolicy {
        &self.policy
    }

    /// Declared capacity, `0` meaning unbounded.
    pub fn size(&self) -> usize {
        self.policy.size()
    }

    pub fn effective_capacity(&self) -> usize {
        self.policy.effective_capacity()
    }

    pub fn base_contents(&self) -> &[f64] {
        &self.base_contents
    }

    pub fn is_static(&self) -> bool {
        self.static_once
    }

    pub fn attached_to_text_field(&self) -> bool {
        self.attached_to_text_field.load(Ordering::Relaxed)
    }

    pub fn set_attached_to_text_field(&self, attached: bool) {
        self.attached_to_text_field.store(attached, Ordering::Relaxed);
    }

    pub fn is_open(&self) -> bool {
        self.read().open
    }

    pub fn state_token(&self) -> StateToken {
        self.read().token
    }

    // ── Reads ──

    pub fn to_vec(&self) -> Vec<f64> {
        self.read().memory.iter().copied().collect()
    }

    pub fn last(&self) -> Option<f64> {
        self.read().memory.back().copied()
    }

    pub fn first(&self) -> Option<f64> {
        self.read().memory.front().copied()
    }

    /// Sample at `index` within the in-memory window.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.read().memory.get(index).copied()
    }

    /// Total sample count, including history that only lives on disk.
    pub fn len(&self) -> usize {
        let state = self.read();
        state.persisted.max(state.memory.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_len(&self) -> usize {
        self.read().memory.len()
    }

    /// False once a backing-file write failed and nothing has rewritten it.
    pub fn history_complete(&self) -> bool {
        !self.read().history_lost
    }

    /// Full history for hybrid buffers that are open, memory window otherwise.
    pub fn history(&self) -> Result<Vec<f64>, BufferError> {
        let mut guard = self.write();
        let state = &mut *guard;
        self.check_history(state)?;
        match state.backing.as_mut() {
            Some(backing) => backing.read_all(),
            None => Ok(state.memory.iter().copied().collect()),
        }
    }

    // ── Mutation ──

    /// Append one sample.
    pub fn append(&self, value: f64) {
        self.append_from_slice(std::slice::from_ref(&value));
    }

    /// Append many samples with the same end result as one `append` per value.
    pub fn append_from_slice(&self, values: &[f64]) {
        if values.is_empty() {
            return;
        }
        let (open, token) = {
            let mut state = self.write();
            if !self.claim_write(&mut state) {
                return;
            }
            self.persist_append(&mut state, values);
            state.memory.extend(values.iter().copied());
            self.evict_overflow(&mut state);
            state.token = StateToken::fresh();
            (state.open, state.token)
        };
        self.notify(open, token);
    }

    /// Replace the contents, keeping the newest samples that fit.
    pub fn replace_values(&self, values: &[f64]) {
        let (open, token) = {
            let mut state = self.write();
            if !self.claim_write(&mut state) {
                return;
            }
            self.persist_rewrite(&mut state, values);
            let keep = values.len().min(self.effective_capacity());
            state.memory = values[values.len() - keep..].iter().copied().collect();
            state.token = StateToken::fresh();
            (state.open, state.token)
        };
        self.notify(open, token);
    }

    /// Reset to the base contents. Does not count as the static write.
    pub fn clear(&self) {
        let (open, token) = {
            let mut state = self.write();
            if self.static_once && state.written {
                return;
            }
            let base = self.base_contents.clone();
            self.persist_rewrite(&mut state, &base);
            state.memory = base.into_iter().collect();
            state.token = StateToken::fresh();
            (state.open, state.token)
        };
        self.notify(open, token);
    }

    /// Drop the `n` oldest in-memory samples. Ignored on hybrid buffers.
    pub fn remove_first(&self, n: usize) {
        if self.policy.is_hybrid() {
            tracing::warn!(
                "remove_first({}) on hybrid buffer '{}' ignored: disk and memory counts would diverge",
                n,
                self.name
            );
            return;
        }
        let (open, token) = {
            let mut state = self.write();
            if n == 0 || state.memory.is_empty() || (self.static_once && state.written) {
                return;
            }
            let n = n.min(state.memory.len());
            state.memory.drain(..n);
            state.token = StateToken::fresh();
            (state.open, state.token)
        };
        self.notify(open, token);
    }

    /// Allow a static buffer to accept its single write again.
    pub fn reset_static(&self) {
        self.write().written = false;
    }

    // ── Lifecycle ──

    /// Start recording. Hybrid buffers (re)create their backing file seeded
    /// with the current memory contents.
    pub fn open(&self) -> Result<(), BufferError> {
        let mut state = self.write();
        if let Some(path) = self.policy.backing_path() {
            let initial: Vec<f64> = state.memory.iter().copied().collect();
            state.backing = None;
            state.backing = Some(BackingFile::create(path, &initial)?);
            state.persisted = initial.len();
            state.history_lost = false;
        }
        state.open = true;
        Ok(())
    }

    /// Stop recording and delete the backing file.
    pub fn close(&self) -> Result<(), BufferError> {
        let mut state = self.write();
        state.open = false;
        state.persisted = 0;
        state.history_lost = false;
        match state.backing.take() {
            Some(backing) => backing.remove(),
            None => Ok(()),
        }
    }

    // ── Snapshots ──

    /// Write the buffer as a flat little-endian `f64` file.
    pub fn write_state(&self, path: &Path) -> Result<(), BufferError> {
        let mut guard = self.write();
        let state = &mut *guard;
        self.check_history(state)?;
        match state.backing.as_mut() {
            Some(backing) => backing.copy_to(path),
            None => {
                let values: Vec<f64> = state.memory.iter().copied().collect();
                storage::write_atomically(path, &storage::encode_samples(&values))
            }
        }
    }

    /// Load a snapshot, keeping the newest values that fit this buffer.
    pub fn read_state(&self, path: &Path) -> Result<(), BufferError> {
        let bytes = std::fs::read(path).map_err(|source| BufferError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let values = storage::decode_samples(&bytes, path)?;
        let (open, token) = {
            let mut state = self.write();
            if let Some(backing) = state.backing.as_mut() {
                backing.rewrite(&values)?;
                state.persisted = values.len();
                state.history_lost = false;
            }
            let keep = values.len().min(self.effective_capacity());
            state.memory = values[values.len() - keep..].iter().copied().collect();
            if self.static_once && !values.is_empty() {
                state.written = true;
            }
            state.token = StateToken::fresh();
            (state.open, state.token)
        };
        self.notify(open, token);
        Ok(())
    }

    // ── Observers ──

    /// Register for change notifications.
    pub fn subscribe(&self, sender: Sender<BufferEvent>, always_notify: bool) -> SubscriberId {
        self.observers.subscribe(sender, always_notify)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ── Internals ──

    fn read(&self) -> RwLockReadGuard<'_, BufferState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BufferState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Static gate: returns false if the single write was already used.
    fn claim_write(&self, state: &mut BufferState) -> bool {
        if !self.static_once {
            return true;
        }
        if state.written {
            return false;
        }
        state.written = true;
        true
    }

    fn evict_overflow(&self, state: &mut BufferState) {
        let capacity = self.effective_capacity();
        if state.memory.len() > capacity {
            let excess = state.memory.len() - capacity;
            state.memory.drain(..excess);
        }
    }

    fn check_history(&self, state: &BufferState) -> Result<(), BufferError> {
        if state.history_lost {
            return Err(BufferError::HistoryLost {
                name: self.name.to_string(),
            });
        }
        Ok(())
    }

    fn persist_append(&self, state: &mut BufferState, values: &[f64]) {
        let Some(backing) = state.backing.as_mut() else {
            return;
        };
        let result = backing.append(values);
        state.persisted += values.len();
        if let Err(e) = result {
            self.mark_history_lost(state, e);
        }
    }

    fn persist_rewrite(&self, state: &mut BufferState, values: &[f64]) {
        let Some(backing) = state.backing.as_mut() else {
            return;
        };
        let result = backing.rewrite(values);
        state.persisted = values.len();
        match result {
            Ok(()) => {
                if state.history_lost {
                    tracing::info!(
                        "Buffer '{}': backing file rewritten, history complete again",
                        self.name
                    );
                }
                state.history_lost = false;
            }
            Err(e) => self.mark_history_lost(state, e),
        }
    }

    fn mark_history_lost(&self, state: &mut BufferState, e: BufferError) {
        if state.history_lost {
            tracing::debug!("Buffer '{}': {}", self.name, e);
        } else {
            tracing::error!("Buffer '{}': {}; on-disk history is now incomplete", self.name, e);
        }
        state.history_lost = true;
    }

    fn notify(&self, open: bool, token: StateToken) {
        let event = BufferEvent::Updated {
            buffer: Arc::clone(&self.name),
            token,
        };
        self.observers.notify(&event, open);
    }
}
