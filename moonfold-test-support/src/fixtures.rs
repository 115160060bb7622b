//! Temporary artifact directories.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

/// A scratch directory laid out like an artifact root. Removed on drop.
///
/// # Examples
/// ```
/// use moonfold_test_support::fixtures::ArtifactDir;
///
/// let dir = ArtifactDir::new()?;
/// let path = dir.write_samples_csv("v1", "id,x1,x2,label\n0,0.5,0.5,0\n")?;
/// assert!(path.ends_with("doublemoon_data_v1.csv"));
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct ArtifactDir {
    dir: TempDir,
}

impl ArtifactDir {
    /// Creates an empty directory.
    ///
    /// # Errors
    /// Propagates failures creating the temporary directory.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Root path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes raw CSV text as the sample table of `version`.
    ///
    /// # Errors
    /// Propagates file-system failures.
    pub fn write_samples_csv(&self, version: &str, contents: &str) -> io::Result<PathBuf> {
        self.write(&format!("doublemoon_data_{version}.csv"), contents)
    }

    /// Writes raw JSON text as the index plan of `version`.
    ///
    /// # Errors
    /// Propagates file-system failures.
    pub fn write_plan_json(&self, version: &str, contents: &str) -> io::Result<PathBuf> {
        self.write(&format!("doublemoon_indices_splits_{version}.json"), contents)
    }

    fn write(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }
}
