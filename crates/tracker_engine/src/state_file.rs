//! Durable "last seen" state: a JSON object keyed by handle.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine_logging::{engine_debug, engine_info, engine_warn};
use thiserror::Error;
use tracker_core::{PersistedExcerpt, StateSnapshot, TrackerState};

use crate::persist::{ensure_output_dir, AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum StateFileError {
    #[error("could not open state file {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("could not serialize state: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("could not write state file {path}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
}

type PersistedState = BTreeMap<String, PersistedExcerpt>;

/// Handle to the persisted state file, owned by the poll loop.
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    writer: AtomicFileWriter,
    filename: String,
}

impl StateFile {
    /// Opens the state file at `path` and loads its contents.
    ///
    /// A missing or empty file yields an empty snapshot. Unparsable contents
    /// also yield an empty snapshot, with a warning. Failing to create or read
    /// the containing directory or file is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, StateSnapshot), StateFileError> {
        let path = path.into();
        let open_err = |reason: String| StateFileError::Open {
            path: path.clone(),
            reason,
        };

        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| open_err("path has no usable file name".into()))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        ensure_output_dir(&dir).map_err(|e| open_err(e.to_string()))?;

        let snapshot = match fs::read(&path) {
            Ok(bytes) => decode_state(&path, &bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                engine_info!("No state file at {:?}. Assuming this is a fresh run", path);
                StateSnapshot::new()
            }
            Err(err) => return Err(open_err(err.to_string())),
        };

        let state_file = Self {
            writer: AtomicFileWriter::new(dir),
            path,
            filename,
        };
        Ok((state_file, snapshot))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes the whole map and atomically replaces the file on disk.
    pub fn flush(&self, state: &TrackerState) -> Result<PathBuf, StateFileError> {
        let persisted: PersistedState = state
            .iter()
            .map(|excerpt| (excerpt.handle().to_string(), PersistedExcerpt::from(excerpt)))
            .collect();
        let mut content = serde_json::to_vec_pretty(&persisted)?;
        content.push(b'\n');

        let written = self
            .writer
            .write(&self.filename, &content)
            .map_err(|source| StateFileError::Flush {
                path: self.path.clone(),
                source,
            })?;
        engine_debug!("Wrote {} entries to {:?}", persisted.len(), written);
        Ok(written)
    }

    pub fn close(self) {
        engine_info!("Closed state file {:?}", self.path);
    }
}

fn decode_state(path: &Path, bytes: &[u8]) -> StateSnapshot {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        engine_info!("State file {:?} is empty. Assuming this is a fresh run", path);
        return StateSnapshot::new();
    }
    match serde_json::from_slice::<PersistedState>(bytes) {
        Ok(persisted) => {
            let snapshot: StateSnapshot = persisted
                .into_iter()
                .map(|(handle, entry)| (handle.clone(), entry.into_excerpt(handle)))
                .collect();
            engine_info!("Loaded {} tracked entries from {:?}", snapshot.len(), path);
            snapshot
        }
        Err(err) => {
            engine_warn!(
                "Could not decode the state in {:?}. Assuming this is a fresh run: {}",
                path,
                err
            );
            StateSnapshot::new()
        }
    }
}
