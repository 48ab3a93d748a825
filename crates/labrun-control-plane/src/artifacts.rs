//! Safe access to files inside a run's output directory.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Standard output log of the external process.
pub const STDOUT_LOG: &str = "stdout.log";

/// Standard error log of the external process.
pub const STDERR_LOG: &str = "stderr.log";

/// Errors when resolving run artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The requested name is not a plain file name.
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    /// The requested path resolves outside the output directory.
    #[error("Path escapes the run directory: {0}")]
    Escapes(String),

    /// No such file (or the run has no output directory yet).
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Which log stream to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    #[default]
    Stdout,
    Stderr,
}

impl LogStream {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Stdout => STDOUT_LOG,
            Self::Stderr => STDERR_LOG,
        }
    }
}

/// Reject anything that is not a single, ordinary path segment.
pub fn validate_file_name(name: &str) -> Result<(), ArtifactError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(ArtifactError::InvalidName(name.to_string()));
    }

    if name.contains(['/', '\\', '\0']) {
        return Err(ArtifactError::InvalidName(name.to_string()));
    }

    if Path::new(name).is_absolute() {
        return Err(ArtifactError::InvalidName(name.to_string()));
    }

    Ok(())
}

/// Resolve `name` to a regular file inside `output_dir`.
///
/// Symlinks are followed and the result must still live under the
/// canonical output directory.
pub async fn resolve_artifact(output_dir: &Path, name: &str) -> Result<PathBuf, ArtifactError> {
    validate_file_name(name)?;

    let root = canonicalize(output_dir, name).await?;
    let candidate = canonicalize(&root.join(name), name).await?;

    if !candidate.starts_with(&root) {
        return Err(ArtifactError::Escapes(name.to_string()));
    }

    let metadata = tokio::fs::metadata(&candidate).await?;
    if !metadata.is_file() {
        return Err(ArtifactError::NotFound(name.to_string()));
    }

    Ok(candidate)
}

/// Names of the regular files in `output_dir`, sorted. Empty if it does not exist.
pub async fn list_artifacts(output_dir: &Path) -> Result<Vec<String>, ArtifactError> {
    let mut entries = match tokio::fs::read_dir(output_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

async fn canonicalize(path: &Path, requested: &str) -> Result<PathBuf, ArtifactError> {
    tokio::fs::canonicalize(path).await.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ArtifactError::NotFound(requested.to_string()),
        _ => ArtifactError::Io(e),
    })
}
