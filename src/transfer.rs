//! Remote-transfer collaborator contract.
//!
//! Stage-in copies a remote location into a job's working directory;
//! stage-out pushes a staging directory to a remote location. The engine only
//! sees [`TransferClient`]; [`LocalTransferClient`] is the reference
//! implementation that treats URLs as local filesystem paths.

use std::fs;
use std::path::Path;

use crate::error::TransferError;

pub trait TransferClient: Send + Sync {
    fn stage_in(&self, remote_url: &str, local_dir: &Path) -> Result<(), TransferError>;
    fn stage_out(&self, local_dir: &Path, remote_url: &str) -> Result<(), TransferError>;
}

/// Treats transfer URLs as local directory paths and copies contents.
#[derive(Debug, Default, Clone)]
pub struct LocalTransferClient;

impl LocalTransferClient {
    pub fn new() -> Self {
        Self
    }

    fn copy_dir_contents(src: &Path, dest: &Path) -> Result<(), TransferError> {
        if !src.is_dir() {
            return Err(TransferError::BadUrl(src.display().to_string()));
        }
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            let target = dest.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                Self::copy_dir_contents(&entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), target)?;
            }
        }
        Ok(())
    }
}

impl TransferClient for LocalTransferClient {
    fn stage_in(&self, remote_url: &str, local_dir: &Path) -> Result<(), TransferError> {
        tracing::debug!(remote_url, local_dir = %local_dir.display(), "stage_in transfer");
        Self::copy_dir_contents(Path::new(remote_url), local_dir)
    }

    fn stage_out(&self, local_dir: &Path, remote_url: &str) -> Result<(), TransferError> {
        tracing::debug!(local_dir = %local_dir.display(), remote_url, "stage_out transfer");
        Self::copy_dir_contents(local_dir, Path::new(remote_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_files_both_ways() {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        fs::write(remote.path().join("input.dat"), b"payload").unwrap();

        let client = LocalTransferClient::new();
        client
            .stage_in(remote.path().to_str().unwrap(), local.path())
            .unwrap();
        assert!(local.path().join("input.dat").exists());

        fs::write(local.path().join("out.result"), b"done").unwrap();
        let dest = remote.path().join("results");
        client
            .stage_out(local.path(), dest.to_str().unwrap())
            .unwrap();
        assert!(dest.join("out.result").exists());
        assert!(dest.join("input.dat").exists());
    }

    #[test]
    fn missing_source_is_bad_url() {
        let local = tempfile::tempdir().unwrap();
        let client = LocalTransferClient::new();
        let err = client
            .stage_in("/nonexistent/remote/path", local.path())
            .unwrap_err();
        assert!(matches!(err, TransferError::BadUrl(_)));
    }
}
