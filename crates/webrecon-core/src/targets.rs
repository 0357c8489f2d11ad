//! Line-oriented target files shared with external tools.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::TargetFileError;

/// `<dir>/<prefix>-<uuid>`, unique per call.
pub fn unique_path(dir: impl AsRef<Path>, prefix: &str) -> PathBuf {
    dir.as_ref().join(format!("{prefix}-{}", Uuid::new_v4()))
}

/// Write one entry per line. Parent directories are created; an existing
/// file is never overwritten.
pub fn write_targets<I, S>(path: impl AsRef<Path>, lines: I) -> Result<(), TargetFileError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(TargetFileError::AlreadyExists(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut writer = BufWriter::new(file);
    let mut count = 0usize;
    for line in lines {
        writeln!(writer, "{}", line.as_ref())?;
        count += 1;
    }
    writer.flush()?;

    tracing::debug!(path = %path.display(), lines = count, "Wrote target file");
    Ok(())
}

pub fn read_targets(path: impl AsRef<Path>) -> Result<Vec<String>, TargetFileError> {
    let file = fs::File::open(path.as_ref())?;
    let lines = BufReader::new(file).lines().collect::<io::Result<Vec<_>>>()?;
    Ok(lines)
}

/// Drop duplicates (keeping the first occurrence), blank lines, and the
/// literal `null` that some tools emit.
pub fn clean_unique<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    lines
        .into_iter()
        .map(|l| l.into().trim().to_string())
        .filter(|l| !l.is_empty() && l != "null")
        .filter(|l| seen.insert(l.clone()))
        .collect()
}
