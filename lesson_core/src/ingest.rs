//! Turning local audio files into lesson candidates.
//!
//! Each file is probed independently: a file that cannot be read or probed
//! is dropped from the batch with a warning while the rest go through.

use crate::{Error, Lesson, Result};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of duration metadata for an audio file
pub trait MetadataProbe {
    /// Duration in seconds; `0.0` means unknown but usable
    fn probe(&self, path: &Path, bytes: &[u8]) -> Result<f64>;
}

/// Probe that trusts a declared duration and only rejects empty files
#[derive(Clone, Copy, Debug, Default)]
pub struct DeclaredDuration(pub Option<f64>);

impl MetadataProbe for DeclaredDuration {
    fn probe(&self, path: &Path, bytes: &[u8]) -> Result<f64> {
        if bytes.is_empty() {
            return Err(Error::MetadataProbe(format!("{:?} is empty", path)));
        }
        match self.0 {
            Some(d) if !d.is_finite() || d < 0.0 => Err(Error::MetadataProbe(format!(
                "invalid duration {} for {:?}",
                d, path
            ))),
            Some(d) => Ok(d),
            None => Ok(0.0),
        }
    }
}

/// A probed file, ready to be stored and added to the library
#[derive(Debug)]
pub struct Candidate {
    pub lesson: Lesson,
    pub bytes: Vec<u8>,
}

/// Outcome of probing a batch of files
#[derive(Debug, Default)]
pub struct IngestReport {
    pub candidates: Vec<Candidate>,
    pub dropped: Vec<(PathBuf, Error)>,
}

/// Stable id for an uploaded file: its name plus modification time
pub fn lesson_id_for(file_name: &str, modified: SystemTime) -> String {
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}-{}", file_name, millis)
}

/// Display name: the file name without its extension
pub fn display_name(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".into())
}

/// Probe every path, keeping the ones that succeed
pub fn probe_files(paths: &[PathBuf], probe: &dyn MetadataProbe) -> IngestReport {
    let mut report = IngestReport::default();
    for path in paths {
        match probe_file(path, probe) {
            Ok(candidate) => report.candidates.push(candidate),
            Err(e) => {
                tracing::warn!("Dropping {:?}: {}", path, e);
                report.dropped.push((path.clone(), e));
            }
        }
    }
    tracing::debug!(
        "Probed {} files: {} usable, {} dropped",
        paths.len(),
        report.candidates.len(),
        report.dropped.len()
    );
    report
}

fn probe_file(path: &Path, probe: &dyn MetadataProbe) -> Result<Candidate> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| Error::MetadataProbe(format!("cannot stat {:?}: {}", path, e)))?;
    if !metadata.is_file() {
        return Err(Error::MetadataProbe(format!("{:?} is not a file", path)));
    }
    let bytes = std::fs::read(path)
        .map_err(|e| Error::MetadataProbe(format!("cannot read {:?}: {}", path, e)))?;
    let duration = probe.probe(path, &bytes)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::MetadataProbe(format!("{:?} has no file name", path)))?;
    let modified = metadata.modified().unwrap_or(UNIX_EPOCH);

    Ok(Candidate {
        lesson: Lesson::uploaded(lesson_id_for(&file_name, modified), display_name(path), duration),
        bytes,
    })
}
