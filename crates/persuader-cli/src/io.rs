//! File I/O the core deliberately excludes from its scope (spec §1): reading a
//! schema/input off disk, expanding `--input` as a path-or-glob, and writing results.

use std::path::{Path, PathBuf};

use persuader_core::schema::Schema;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?} as JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("`--input` pattern `{0}` matched no files")]
    NoMatches(String),
    #[error("invalid glob pattern `{pattern}`: {source}")]
    BadGlob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

pub fn load_schema(path: &Path) -> Result<Schema, IoError> {
    let raw = read(path)?;
    serde_json::from_str(&raw).map_err(|source| IoError::Parse { path: path.to_path_buf(), source })
}

pub fn load_input(path: &Path) -> Result<Value, IoError> {
    let raw = read(path)?;
    serde_json::from_str(&raw).map_err(|source| IoError::Parse { path: path.to_path_buf(), source })
}

fn read(path: &Path) -> Result<String, IoError> {
    std::fs::read_to_string(path).map_err(|source| IoError::Read { path: path.to_path_buf(), source })
}

/// `--input` accepts a single path or a glob; each match becomes one independent
/// `persuade` call. A literal existing path is used as-is even if it contains glob
/// metacharacters.
pub fn resolve_inputs(pattern: &str) -> Result<Vec<PathBuf>, IoError> {
    let direct = PathBuf::from(pattern);
    if direct.exists() {
        return Ok(vec![direct]);
    }
    let matches: Vec<PathBuf> = glob::glob(pattern)
        .map_err(|source| IoError::BadGlob { pattern: pattern.to_string(), source })?
        .filter_map(Result::ok)
        .collect();
    if matches.is_empty() {
        return Err(IoError::NoMatches(pattern.to_string()));
    }
    Ok(matches)
}

pub fn write_output(path: &Path, value: &Value) -> Result<(), IoError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|source| IoError::Write { path: path.to_path_buf(), source })?;
        }
    }
    let serialized = serde_json::to_string_pretty(value).unwrap_or_default();
    std::fs::write(path, serialized).map_err(|source| IoError::Write { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_literal_path_with_no_glob_match_errors() {
        let err = resolve_inputs("/definitely/not/a/real/path-*.json").unwrap_err();
        assert!(matches!(err, IoError::NoMatches(_)));
    }
}
