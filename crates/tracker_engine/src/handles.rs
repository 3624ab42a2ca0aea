use std::fs;
use std::path::{Path, PathBuf};

use engine_logging::{engine_info, engine_warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlesError {
    #[error("could not read the handles file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("handles file {path:?} is not a JSON array of strings: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads the ordered list of tracked handles from a JSON array of strings.
pub fn load_handles(path: &Path) -> Result<Vec<String>, HandlesError> {
    let text = fs::read_to_string(path).map_err(|source| HandlesError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let handles: Vec<String> =
        serde_json::from_str(&text).map_err(|source| HandlesError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    if handles.is_empty() {
        engine_warn!("Handles file {:?} lists no handles; nothing will be tracked", path);
    } else {
        engine_info!("Tracking {} handles from {:?}", handles.len(), path);
    }
    Ok(handles)
}
