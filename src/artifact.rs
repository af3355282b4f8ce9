use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// The Markdown digest written by a run.
#[derive(Debug, Clone)]
pub struct Artifact {
    path: PathBuf,
}

pub fn header(days_back: u32) -> String {
    format!("# Important Comments from PRs from the last {days_back} Days\n\n")
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the header when the file is missing or empty. An existing
    /// non-empty file is left alone so reruns append after prior content.
    pub fn ensure_header(&self, days_back: u32) -> Result<()> {
        let empty = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        if empty {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            fs::write(&self.path, header(days_back))?;
            debug!(path = %self.path.display(), "wrote digest header");
        }
        Ok(())
    }

    /// Append sections in the given order as a single write.
    pub fn append<'a>(&self, sections: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let block: String = sections.into_iter().collect();
        if block.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(block.as_bytes())?;
        Ok(())
    }

    /// Delete the file; a missing file is not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Current contents, or `None` when the file does not exist.
    pub fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// True when the digest holds anything beyond its header line.
pub fn has_findings(content: &str) -> bool {
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .any(|l| !l.starts_with("# Important Comments from PRs"))
}
