//! Local POSIX collaborator used around fileset creation.
//!
//! This module defines the [`PosixOps`] trait for the three filesystem
//! calls the client needs (existence check, directory creation and ownership
//! change) and the [`LocalPosix`] implementation backed by the host.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which POSIX call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PosixOp {
    /// Existence check.
    Exists,
    /// Directory creation.
    MakeDirectory,
    /// Ownership change.
    ChangeOwnership,
}

impl std::fmt::Display for PosixOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PosixOp::Exists => "exists",
            PosixOp::MakeDirectory => "make directory",
            PosixOp::ChangeOwnership => "change ownership",
        };
        f.write_str(name)
    }
}

/// Classified cause of a POSIX failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PosixErrorKind {
    /// EACCES / EPERM.
    PermissionDenied,
    /// ENOENT, including a missing parent directory.
    NotFound,
    /// EEXIST.
    AlreadyExists,
    /// Anything else.
    Other,
}

impl From<io::ErrorKind> for PosixErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::PermissionDenied => PosixErrorKind::PermissionDenied,
            io::ErrorKind::NotFound => PosixErrorKind::NotFound,
            io::ErrorKind::AlreadyExists => PosixErrorKind::AlreadyExists,
            _ => PosixErrorKind::Other,
        }
    }
}

/// A failed POSIX call with its path and classified cause.
#[derive(Debug, Error)]
#[error("POSIX {op} failed on {}: {kind:?} ({source})", path.display())]
pub struct PosixError {
    /// The call that failed.
    pub op: PosixOp,
    /// Path the call was made on.
    pub path: PathBuf,
    /// Classified cause.
    pub kind: PosixErrorKind,
    /// Underlying I/O error.
    #[source]
    pub source: io::Error,
}

impl PosixError {
    /// Wraps an I/O error from `op` on `path`.
    pub fn from_io(op: PosixOp, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            kind: source.kind().into(),
            source,
        }
    }
}

/// POSIX operations the client performs on the local host.
#[async_trait]
pub trait PosixOps: Send + Sync {
    /// Whether `path` exists. Permission problems are errors, not `false`.
    async fn exists(&self, path: &Path) -> Result<bool, PosixError>;

    /// Creates a single directory; the parent must already exist.
    async fn make_directory(&self, path: &Path) -> Result<(), PosixError>;

    /// Changes owner and/or group of `path`. `None` leaves that id unchanged.
    async fn change_ownership(
        &self,
        path: &Path,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> Result<(), PosixError>;
}

/// [`PosixOps`] against the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalPosix;

impl LocalPosix {
    /// Create a new local POSIX collaborator.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PosixOps for LocalPosix {
    async fn exists(&self, path: &Path) -> Result<bool, PosixError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| PosixError::from_io(PosixOp::Exists, path, e))
    }

    async fn make_directory(&self, path: &Path) -> Result<(), PosixError> {
        tokio::fs::create_dir(path)
            .await
            .map_err(|e| PosixError::from_io(PosixOp::MakeDirectory, path, e))?;
        tracing::info!(path = %path.display(), "created directory");
        Ok(())
    }

    async fn change_ownership(
        &self,
        path: &Path,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> Result<(), PosixError> {
        if uid.is_none() && gid.is_none() {
            return Ok(());
        }
        let owned = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || std::os::unix::fs::chown(&owned, uid, gid))
            .await
            .unwrap_or_else(|join| Err(io::Error::new(io::ErrorKind::Other, join)));
        result.map_err(|e| PosixError::from_io(PosixOp::ChangeOwnership, path, e))?;
        tracing::info!(path = %path.display(), ?uid, ?gid, "changed ownership");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_exists() {
        let dir = TempDir::new().unwrap();
        let posix = LocalPosix::new();
        assert!(posix.exists(dir.path()).await.unwrap());
        assert!(!posix.exists(&dir.path().join("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_make_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("projects");
        let posix = LocalPosix::new();
        posix.make_directory(&target).await.unwrap();
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn test_make_directory_already_exists() {
        let dir = TempDir::new().unwrap();
        let err = LocalPosix::new()
            .make_directory(dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind, PosixErrorKind::AlreadyExists);
        assert_eq!(err.op, PosixOp::MakeDirectory);
        assert_eq!(err.path, dir.path());
    }

    #[tokio::test]
    async fn test_make_directory_missing_parent() {
        let dir = TempDir::new().unwrap();
        let err = LocalPosix::new()
            .make_directory(&dir.path().join("a/b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, PosixErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_change_ownership_to_current_owner() {
        let dir = TempDir::new().unwrap();
        let meta = std::fs::metadata(dir.path()).unwrap();
        LocalPosix::new()
            .change_ownership(dir.path(), Some(meta.uid()), Some(meta.gid()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_change_ownership_missing_path() {
        let dir = TempDir::new().unwrap();
        let err = LocalPosix::new()
            .change_ownership(&dir.path().join("missing"), Some(0), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, PosixErrorKind::NotFound);
        assert_eq!(err.op, PosixOp::ChangeOwnership);
    }

    #[test]
    fn test_error_display() {
        let err = PosixError::from_io(
            PosixOp::Exists,
            "/gpfs/fs1",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.kind, PosixErrorKind::PermissionDenied);
        assert!(err.to_string().contains("/gpfs/fs1"));
    }
}
