//! Saved experiment state.
//!
//! A state folder `<dir>/<title>.state/` holds the descriptor as
//! `experiment.json` and one flat little-endian `f64` snapshot
//! `<buffer>.buffer` per buffer. Titles and buffer names are
//! percent-encoded on disk. Loading rebuilds the experiment from the
//! descriptor and restores every buffer that has a snapshot.

use super::Experiment;
use crate::buffer::BufferTable;
use crate::config::ExperimentDescriptor;
use crate::error::{Result, ResultExt, SampleFlowError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const STATE_EXTENSION: &str = "state";
pub const DESCRIPTOR_FILE: &str = "experiment.json";
pub const BUFFER_EXTENSION: &str = "buffer";

/// File-system safe form of a title or buffer name.
///
/// Percent-encoding keeps distinct names distinct. A lone `%` never comes
/// out of the encoder, so it stands in for the empty name.
fn file_stem(name: &str) -> String {
    if name.is_empty() {
        return "%".to_string();
    }
    urlencoding::encode(name).into_owned()
}

fn buffer_path(folder: &Path, name: &str) -> PathBuf {
    folder.join(format!("{}.{}", file_stem(name), BUFFER_EXTENSION))
}

/// Write a state folder under `dir` and return its path.
pub fn save_state(
    dir: &Path,
    descriptor: &ExperimentDescriptor,
    buffers: &BufferTable,
) -> Result<PathBuf> {
    let mut stems = HashMap::new();
    for buffer in buffers.iter() {
        // Case-insensitive file systems would merge these into one file
        let stem = file_stem(buffer.name()).to_lowercase();
        if let Some(other) = stems.insert(stem, buffer.name()) {
            return Err(SampleFlowError::Config(format!(
                "Buffers '{}' and '{}' differ only in case and cannot be saved side by side",
                other,
                buffer.name()
            )));
        }
    }

    let folder = dir.join(format!("{}.{}", file_stem(&descriptor.title), STATE_EXTENSION));
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("Failed to create state folder {}", folder.display()))?;

    descriptor.save(folder.join(DESCRIPTOR_FILE))?;
    for buffer in buffers.iter() {
        let path = buffer_path(&folder, buffer.name());
        buffer
            .write_state(&path)
            .with_context(|| format!("Failed to save buffer '{}'", buffer.name()))?;
    }
    tracing::info!(
        "Saved state of '{}' ({} buffers) to {}",
        descriptor.title,
        buffers.len(),
        folder.display()
    );
    Ok(folder)
}

/// Rebuild an experiment from a state folder.
pub fn load_state(folder: &Path) -> Result<Experiment> {
    let descriptor = ExperimentDescriptor::load(folder.join(DESCRIPTOR_FILE))?;
    let experiment = Experiment::new(descriptor)?;
    let mut restored = 0;
    for buffer in experiment.buffers().iter() {
        let path = buffer_path(folder, buffer.name());
        if !path.exists() {
            continue;
        }
        buffer
            .read_state(&path)
            .with_context(|| format!("Failed to restore buffer '{}'", buffer.name()))?;
        restored += 1;
    }
    tracing::info!(
        "Loaded state of '{}' from {} ({} buffers restored)",
        experiment.title(),
        folder.display(),
        restored
    );
    Ok(experiment)
}

impl Experiment {
    /// Save into `dir`, or the configured state directory when `None`.
    ///
    /// The saved descriptor carries this experiment's engine config.
    pub fn save_state(&self, dir: Option<&Path>) -> Result<PathBuf> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => self.config().state_dir()?,
        };
        let mut descriptor = self.descriptor().clone();
        descriptor.config = Some(self.config().clone());
        save_state(&dir, &descriptor, self.buffers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferDescriptor;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Pendulum (x/y)"), "Pendulum%20%28x%2Fy%29");
        assert_eq!(file_stem("../.."), "..%2F..");
        assert_eq!(file_stem("acc_x"), "acc_x");
        assert_eq!(file_stem(""), "%");
        assert_ne!(file_stem("a/b"), file_stem("a_b"));
        assert_ne!(file_stem("a?"), file_stem("a*"));
    }

    #[test]
    fn test_similar_names_keep_separate_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = ExperimentDescriptor::new("x/y");
        descriptor.buffers = vec![
            BufferDescriptor::new("a/b", 0),
            BufferDescriptor::new("a_b", 0),
            BufferDescriptor::new("a b", 0),
        ];

        let saved = Experiment::new(descriptor).unwrap();
        saved.get_buffer("a/b").unwrap().append_from_slice(&[1.0, 2.0]);
        saved.get_buffer("a_b").unwrap().append(9.0);
        saved.get_buffer("a b").unwrap().append(-4.0);
        let folder = saved.save_state(Some(dir.path())).unwrap();
        assert_eq!(folder, dir.path().join("x%2Fy.state"));

        let loaded = load_state(&folder).unwrap();
        assert_eq!(loaded.get_buffer("a/b").unwrap().to_vec(), vec![1.0, 2.0]);
        assert_eq!(loaded.get_buffer("a_b").unwrap().to_vec(), vec![9.0]);
        assert_eq!(loaded.get_buffer("a b").unwrap().to_vec(), vec![-4.0]);
    }

    #[test]
    fn test_case_only_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = ExperimentDescriptor::new("case");
        descriptor.buffers = vec![BufferDescriptor::new("X", 0), BufferDescriptor::new("x", 0)];
        let experiment = Experiment::new(descriptor).unwrap();

        let err = experiment.save_state(Some(dir.path())).err().unwrap();
        assert!(matches!(err, SampleFlowError::Config(_)));
        assert!(!dir.path().join("case.state").exists());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = ExperimentDescriptor::new("Free fall");
        descriptor.buffers = vec![BufferDescriptor::new("t", 0), BufferDescriptor::new("h", 2)];

        let saved = Experiment::new(descriptor).unwrap();
        saved.get_buffer("t").unwrap().append_from_slice(&[0.0, 0.1, 0.2]);
        saved.get_buffer("h").unwrap().append_from_slice(&[5.0, 4.9]);
        let folder = saved.save_state(Some(dir.path())).unwrap();
        assert_eq!(folder, dir.path().join("Free%20fall.state"));
        assert!(folder.join("experiment.json").exists());
        assert!(folder.join("h.buffer").exists());

        std::fs::remove_file(folder.join("h.buffer")).unwrap();
        let loaded = load_state(&folder).unwrap();
        assert_eq!(loaded.title(), "Free fall");
        assert_eq!(loaded.get_buffer("t").unwrap().to_vec(), vec![0.0, 0.1, 0.2]);
        assert!(loaded.get_buffer("h").unwrap().is_empty());
        assert!(loaded.descriptor().config.is_some());
    }

    #[test]
    fn test_corrupt_snapshot_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = ExperimentDescriptor::new("broken");
        descriptor.buffers = vec![BufferDescriptor::new("x", 0)];
        let folder = save_state(dir.path(), &descriptor, &BufferTable::new()).unwrap();
        std::fs::write(folder.join("x.buffer"), [1u8, 2, 3]).unwrap();

        let err = load_state(&folder).err().unwrap();
        assert!(matches!(err, SampleFlowError::WithContext { .. }));
    }

    #[test]
    fn test_missing_folder_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_state(&dir.path().join("nothing.state")).is_err());
    }
}
