//! In-memory tar archives used to move task directories between hosts.

use std::path::Path;

use crate::error::{BatchflowError, Result};

/// Name of the archive while it sits in the remote directory.
pub const ARCHIVE_NAME: &str = "batchflow.tar";

/// Archive the contents of `dir` with paths relative to it.
pub(crate) fn pack_directory(dir: &Path) -> Result<Vec<u8>> {
    let wrap = |e: std::io::Error| {
        BatchflowError::transport_io(format!("failed to archive {}", dir.display()), e)
    };

    let mut builder = tar::Builder::new(Vec::new());
    let mut entries = std::fs::read_dir(dir)
        .map_err(wrap)?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(wrap)?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        if entry.file_type().map_err(wrap)?.is_dir() {
            builder.append_dir_all(&name, &path).map_err(wrap)?;
        } else {
            builder.append_path_with_name(&path, &name).map_err(wrap)?;
        }
    }
    builder.into_inner().map_err(wrap)
}

/// Unpack an archive produced by [`pack_directory`] (or by `tar cf`) into `dir`.
pub(crate) fn unpack_into(bytes: &[u8], dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| BatchflowError::io(dir, e))?;
    tar::Archive::new(bytes).unpack(dir).map_err(|e| {
        BatchflowError::transport_io(format!("failed to unpack into {}", dir.display()), e)
    })
}
