//! In-process cache of filesystems and filesets.
//!
//! The catalog is refreshed only on request. A refresh builds a complete
//! [`CatalogSnapshot`] off to the side and swaps it in under a write lock, so
//! readers see either the old or the new snapshot, never a mix. Refreshes are
//! serialized; a failed refresh leaves the previous snapshot in place and
//! returns the triggering error as is.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{Mutex, RwLock};

use crate::command::{CommandBuilder, ListFilesets, Operation};
use crate::entities::{Fileset, Filesystem};
use crate::error::{GpfsError, Result};
use crate::exec::CommandRunner;
use crate::mapper::{map_records, FromRecord};
use crate::record::OutputParser;
use crate::schema::SchemaVersion;

/// Runs `op`, parses its output and maps every record to `T`.
pub async fn query<T: FromRecord>(
    runner: &dyn CommandRunner,
    builder: &CommandBuilder,
    op: &Operation,
) -> Result<Vec<T>> {
    let invocation = builder.build(op)?;
    let output = runner.run(&invocation).await?;
    let versions = SchemaVersion::versions_of(T::KIND);
    let mut parser = OutputParser::new(&versions);
    // headerless output is read with the oldest layout; newer fields count as extras
    if let Some(oldest) = versions.first() {
        parser = parser.with_fallback(*oldest);
    }
    let parsed = parser.parse(&output.stdout)?;
    map_records(&parsed.records)
}

/// Strips trailing slashes, keeping the root as `/`.
fn normalize_mountpoint(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// One consistent view of the cluster.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub filesystems: Vec<Filesystem>,
    pub filesets: Vec<Fileset>,
    pub refreshed_at: SystemTime,
    /// Increments with every successful refresh, starting at 1.
    pub generation: u64,
}

impl CatalogSnapshot {
    /// Finds a filesystem by name, device or mount point.
    pub fn filesystem(&self, key: &str) -> Option<&Filesystem> {
        let path = normalize_mountpoint(key);
        self.filesystems.iter().find(|fs| {
            fs.name == key || fs.device == key || normalize_mountpoint(&fs.mountpoint) == path
        })
    }

    /// Filesets belonging to `fs`.
    pub fn filesets_of<'a>(&'a self, fs: &'a Filesystem) -> impl Iterator<Item = &'a Fileset> + 'a {
        self.filesets
            .iter()
            .filter(move |f| f.filesystem == fs.name || f.filesystem == fs.device)
    }

    pub fn fileset(&self, filesystem: &str, name: &str) -> Option<&Fileset> {
        let fs = self.filesystem(filesystem)?;
        self.filesets_of(fs).find(|f| f.name == name)
    }

    /// Filesystem whose mount point is the longest component-wise prefix of `path`.
    pub fn resolve_path(&self, path: &Path) -> Option<&Filesystem> {
        self.filesystems
            .iter()
            .filter(|fs| path.starts_with(&fs.mountpoint))
            .max_by_key(|fs| Path::new(&fs.mountpoint).components().count())
    }
}

/// Observable catalog state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogState {
    Empty,
    Populated { generation: u64 },
}

/// Shared, explicitly refreshed catalog.
#[derive(Debug, Default)]
pub struct Catalog {
    snapshot: RwLock<Option<Arc<CatalogSnapshot>>>,
    refresh_lock: Mutex<()>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self) -> CatalogState {
        match self.snapshot.read().await.as_ref() {
            None => CatalogState::Empty,
            Some(s) => CatalogState::Populated {
                generation: s.generation,
            },
        }
    }

    /// Current snapshot, `None` before the first successful refresh.
    pub async fn snapshot(&self) -> Option<Arc<CatalogSnapshot>> {
        self.snapshot.read().await.clone()
    }

    async fn require_snapshot(&self, kind: &'static str, name: &str) -> Result<Arc<CatalogSnapshot>> {
        self.snapshot().await.ok_or_else(|| GpfsError::NotFound {
            kind,
            name: name.to_string(),
        })
    }

    /// Re-lists filesystems and their filesets and replaces the cache.
    pub async fn refresh(
        &self,
        runner: &dyn CommandRunner,
        builder: &CommandBuilder,
    ) -> Result<Arc<CatalogSnapshot>> {
        let _guard = self.refresh_lock.lock().await;

        let filesystems: Vec<Filesystem> =
            query(runner, builder, &Operation::ListFilesystems).await?;
        let mut filesets = Vec::new();
        for fs in &filesystems {
            let op = Operation::ListFilesets(ListFilesets {
                device: fs.device.clone(),
                filesets: Vec::new(),
            });
            let mut listed: Vec<Fileset> = query(runner, builder, &op).await?;
            filesets.append(&mut listed);
        }

        let mut current = self.snapshot.write().await;
        let generation = current.as_ref().map_or(0, |s| s.generation) + 1;
        let snapshot = Arc::new(CatalogSnapshot {
            filesystems,
            filesets,
            refreshed_at: SystemTime::now(),
            generation,
        });
        *current = Some(snapshot.clone());

        tracing::info!(
            generation,
            filesystems = snapshot.filesystems.len(),
            filesets = snapshot.filesets.len(),
            "catalog refreshed"
        );
        Ok(snapshot)
    }

    /// Looks up a filesystem by name, device or mount point.
    pub async fn lookup(&self, key: &str) -> Result<Filesystem> {
        let snapshot = self.require_snapshot("filesystem", key).await?;
        snapshot
            .filesystem(key)
            .cloned()
            .ok_or_else(|| GpfsError::NotFound {
                kind: "filesystem",
                name: key.to_string(),
            })
    }

    pub async fn lookup_fileset(&self, filesystem: &str, name: &str) -> Result<Fileset> {
        let label = format!("{}:{}", filesystem, name);
        let snapshot = self.require_snapshot("fileset", &label).await?;
        snapshot
            .fileset(filesystem, name)
            .cloned()
            .ok_or(GpfsError::NotFound {
                kind: "fileset",
                name: label,
            })
    }

    pub async fn resolve_path(&self, path: &Path) -> Result<Filesystem> {
        let shown = path.display().to_string();
        let snapshot = self.require_snapshot("filesystem for path", &shown).await?;
        snapshot
            .resolve_path(path)
            .cloned()
            .ok_or(GpfsError::NotFound {
                kind: "filesystem for path",
                name: shown,
            })
    }

    /// Filesystems with the automount option set.
    pub async fn automount_filesystems(&self) -> Vec<Filesystem> {
        match self.snapshot().await {
            Some(s) => s
                .filesystems
                .iter()
                .filter(|fs| fs.automount == Some(true))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}
