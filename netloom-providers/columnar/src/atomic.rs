//! File replacement through sibling temporary files.
use std::{
    fs,
    fs::File,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::errors::StorageError;

/// Output files written next to their targets and renamed into place together.
///
/// Every file is fully written and synced before the first rename, so a
/// failure while filling any of them leaves all targets untouched. Dropping
/// the set without [`StagedWrites::persist`] removes the temporary files.
#[derive(Debug, Default)]
pub(crate) struct StagedWrites {
    staged: Vec<(PathBuf, NamedTempFile)>,
}

impl StagedWrites {
    /// Fills a temporary file that will replace `path`.
    pub(crate) fn stage<F>(&mut self, path: &Path, fill: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut File) -> Result<(), StorageError>,
    {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(StorageError::io(parent))?;
        let mut staged = NamedTempFile::new_in(parent).map_err(StorageError::io(parent))?;
        fill(staged.as_file_mut())?;
        staged.as_file().sync_all().map_err(StorageError::io(staged.path()))?;
        self.staged.push((path.to_path_buf(), staged));
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.staged.len()
    }

    /// Renames every staged file onto its target, in staging order.
    pub(crate) fn persist(self) -> Result<(), StorageError> {
        for (path, staged) in self.staged {
            staged
                .persist(&path)
                .map_err(|error| StorageError::io(&path)(error.error))?;
        }
        Ok(())
    }
}

/// Writes `path` by filling a temporary file in the same directory and
/// renaming it into place once `fill` succeeds.
pub(crate) fn write_atomically<F>(path: &Path, fill: F) -> Result<(), StorageError>
where
    F: FnOnce(&mut File) -> Result<(), StorageError>,
{
    let mut staged = StagedWrites::default();
    staged.stage(path, fill)?;
    staged.persist()
}
