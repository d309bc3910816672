//! Capacity policies and the on-disk sample format.
//!
//! Snapshots and hybrid backing files share one format: a flat run of
//! little-endian IEEE-754 `f64` values with no header.

use super::BufferError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Width of one encoded sample.
pub const SAMPLE_BYTES: usize = std::mem::size_of::<f64>();

/// How many samples a buffer keeps and where it keeps them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoragePolicy {
    /// Grows without limit in memory.
    Unbounded,
    /// Keeps the newest `n` samples in memory. `0` behaves like `Unbounded`.
    FixedMemory(usize),
    /// Keeps the newest `memory` samples in memory and the full history in
    /// the backing file while the buffer is open.
    Hybrid { memory: usize, path: PathBuf },
}

impl StoragePolicy {
    /// Nominal capacity as declared (`0` for unbounded).
    pub fn size(&self) -> usize {
        match self {
            StoragePolicy::Unbounded => 0,
            StoragePolicy::FixedMemory(n) => *n,
            StoragePolicy::Hybrid { memory, .. } => *memory,
        }
    }

    /// Capacity with the "0 means unbounded" rule applied.
    pub fn effective_capacity(&self) -> usize {
        match self.size() {
            0 => usize::MAX,
            n => n,
        }
    }

    pub fn is_hybrid(&self) -> bool {
        matches!(self, StoragePolicy::Hybrid { .. })
    }

    pub fn backing_path(&self) -> Option<&Path> {
        match self {
            StoragePolicy::Hybrid { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Encode samples into the flat little-endian format.
pub fn encode_samples(values: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * SAMPLE_BYTES);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a flat little-endian sample run. `path` is only used for errors.
pub fn decode_samples(bytes: &[u8], path: &Path) -> Result<Vec<f64>, BufferError> {
    if bytes.len() % SAMPLE_BYTES != 0 {
        return Err(BufferError::Corrupt {
            path: path.to_path_buf(),
            len: bytes.len() as u64,
        });
    }
    Ok(bytes
        .chunks_exact(SAMPLE_BYTES)
        .map(|chunk| {
            let mut raw = [0u8; SAMPLE_BYTES];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// Write `bytes` to a sibling temp file, then move it over `path`.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), BufferError> {
    let tmp = temp_sibling(path);
    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(|source| BufferError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "buffer".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Open append-only file backing a hybrid buffer.
#[derive(Debug)]
pub struct BackingFile {
    path: PathBuf,
    file: File,
}

impl BackingFile {
    /// Create (or truncate) the file and seed it with `initial`.
    pub fn create(path: &Path, initial: &[f64]) -> Result<Self, BufferError> {
        let io_err = |source| BufferError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(io_err)?;
        let mut backing = Self {
            path: path.to_path_buf(),
            file,
        };
        backing.append(initial)?;
        Ok(backing)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append samples at the end of the file.
    pub fn append(&mut self, values: &[f64]) -> Result<(), BufferError> {
        if values.is_empty() {
            return Ok(());
        }
        let bytes = encode_samples(values);
        self.file
            .seek(SeekFrom::End(0))
            .and_then(|_| self.file.write_all(&bytes))
            .map_err(|source| self.io_error(source))
    }

    /// Truncate to zero length and write `values`.
    pub fn rewrite(&mut self, values: &[f64]) -> Result<(), BufferError> {
        self.file
            .set_len(0)
            .and_then(|_| self.file.seek(SeekFrom::Start(0)).map(|_| ()))
            .map_err(|source| self.io_error(source))?;
        self.append(values)
    }

    /// Read back every sample stored in the file.
    pub fn read_all(&mut self) -> Result<Vec<f64>, BufferError> {
        let mut bytes = Vec::new();
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.read_to_end(&mut bytes))
            .map_err(|source| self.io_error(source))?;
        decode_samples(&bytes, &self.path)
    }

    /// Copy the full history to `dest` via a temp file.
    pub fn copy_to(&mut self, dest: &Path) -> Result<(), BufferError> {
        self.file.flush().map_err(|source| self.io_error(source))?;
        let values = self.read_all()?;
        write_atomically(dest, &encode_samples(&values))
    }

    /// Delete the file from disk.
    pub fn remove(self) -> Result<(), BufferError> {
        let Self { path, file } = self;
        drop(file);
        fs::remove_file(&path).map_err(|source| BufferError::Io { path, source })
    }

    fn io_error(&self, source: std::io::Error) -> BufferError {
        BufferError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
