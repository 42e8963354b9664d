//! High-level client tying the builder, runner, catalog and POSIX layer together.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{query, Catalog, CatalogSnapshot};
use crate::command::{
    validate_junction, validate_name, CommandBuilder, CreateFileset, InodeSpace, Invocation,
    LinkFileset, ListFilesets, Operation, SetGrace, SetQuota, SnapshotTarget,
};
use crate::config::GpfsConfig;
use crate::entities::{Fileset, Filesystem, GracePeriod, InodeCritical, Quota, Snapshot};
use crate::error::{GpfsError, Result};
use crate::exec::{CommandRunner, ProcessRunner};
use crate::posix::{LocalPosix, PosixOps};

/// Failure text of the snapshot listing on a filesystem without snapshots.
const NO_SNAPSHOTS: &str = "No snapshots in file system";

/// Request to create and link a fileset at `junction`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFilesetRequest {
    pub junction: PathBuf,
    /// Derived from the junction path when absent.
    pub name: Option<String>,
    pub inode_space: InodeSpace,
    pub owner: Option<u32>,
    pub group: Option<u32>,
    /// Create the junction's parent directory when it is missing.
    pub create_parent: bool,
}

/// Result of a write operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub invocations: Vec<Invocation>,
    /// False when dry-run suppressed execution.
    pub executed: bool,
}

/// Derives a fileset name from a junction below `mountpoint`: the relative
/// path components joined by `_`.
pub fn derive_fileset_name(mountpoint: &Path, junction: &Path) -> Result<String> {
    let op = "create-fileset";
    let relative = junction.strip_prefix(mountpoint).map_err(|_| {
        GpfsError::invalid(
            op,
            "junction",
            format!(
                "{} is not below mount point {}",
                junction.display(),
                mountpoint.display()
            ),
        )
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => {
                return Err(GpfsError::invalid(
                    op,
                    "junction",
                    format!("{} is not a normalized path", junction.display()),
                ))
            }
        }
    }
    if parts.is_empty() {
        return Err(GpfsError::invalid(
            op,
            "junction",
            "the mount point itself cannot be a fileset junction",
        ));
    }
    Ok(parts.join("_"))
}

pub struct GpfsClient {
    runner: Arc<dyn CommandRunner>,
    posix: Arc<dyn PosixOps>,
    builder: CommandBuilder,
    catalog: Arc<Catalog>,
    dry_run: bool,
}

impl GpfsClient {
    /// Client that runs the real tools and touches the local filesystem.
    pub fn new(config: &GpfsConfig) -> Self {
        Self::with_parts(
            Arc::new(ProcessRunner::new(config.exec_config())),
            Arc::new(LocalPosix::new()),
            config.command_builder(),
            config.dry_run,
        )
    }

    pub fn with_parts(
        runner: Arc<dyn CommandRunner>,
        posix: Arc<dyn PosixOps>,
        builder: CommandBuilder,
        dry_run: bool,
    ) -> Self {
        Self {
            runner,
            posix,
            builder,
            catalog: Arc::new(Catalog::new()),
            dry_run,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn refresh(&self) -> Result<Arc<CatalogSnapshot>> {
        self.catalog.refresh(self.runner.as_ref(), &self.builder).await
    }

    async fn device(&self, filesystem: &str) -> Result<String> {
        Ok(self.catalog.lookup(filesystem).await?.device)
    }

    async fn read<T: crate::mapper::FromRecord>(&self, op: Operation) -> Result<Vec<T>> {
        query(self.runner.as_ref(), &self.builder, &op).await
    }

    /// Lists every filesystem directly, bypassing the catalog.
    pub async fn list_filesystems(&self) -> Result<Vec<Filesystem>> {
        self.read(Operation::ListFilesystems).await
    }

    /// Lists filesets of a cataloged filesystem, optionally restricted to `names`.
    pub async fn list_filesets(&self, filesystem: &str, names: &[String]) -> Result<Vec<Fileset>> {
        let device = self.device(filesystem).await?;
        self.read(Operation::ListFilesets(ListFilesets {
            device,
            filesets: names.to_vec(),
        }))
        .await
    }

    pub async fn list_quota(&self, filesystem: &str) -> Result<Vec<Quota>> {
        let device = self.device(filesystem).await?;
        self.read(Operation::ListQuota { device }).await
    }

    /// Quotas whose block or file usage is above the soft limit.
    pub async fn over_quota(&self, filesystem: &str) -> Result<Vec<Quota>> {
        let quotas = self.list_quota(filesystem).await?;
        let over: Vec<Quota> = quotas
            .into_iter()
            .filter(Quota::is_over_soft_limit)
            .collect();
        tracing::debug!(filesystem, count = over.len(), "over-quota report");
        Ok(over)
    }

    pub async fn list_grace(&self, filesystem: &str) -> Result<Vec<GracePeriod>> {
        let device = self.device(filesystem).await?;
        self.read(Operation::ListGrace { device }).await
    }

    /// Filesets whose allocated inodes exceed `threshold` (a fraction of the
    /// inode limit), from a fresh listing.
    pub async fn inode_critical(&self, filesystem: &str, threshold: f64) -> Result<Vec<InodeCritical>> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(GpfsError::invalid(
                "inode-critical",
                "threshold",
                format!("{} is not in (0, 1]", threshold),
            ));
        }
        let filesets = self.list_filesets(filesystem, &[]).await?;
        let critical: Vec<InodeCritical> = filesets
            .iter()
            .filter_map(|f| f.inode_critical(threshold))
            .collect();
        for c in &critical {
            tracing::warn!(
                filesystem = %c.filesystem,
                fileset = %c.fileset,
                allocated = c.allocated,
                max_inodes = c.max_inodes,
                "fileset close to its inode limit"
            );
        }
        Ok(critical)
    }

    async fn snapshots_on(&self, device: String) -> Result<Vec<Snapshot>> {
        match self.read(Operation::ListSnapshots { device: device.clone() }).await {
            Err(GpfsError::CommandExecution { ref stderr, .. }) if stderr.contains(NO_SNAPSHOTS) => {
                tracing::debug!(device = %device, "filesystem has no snapshots");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    pub async fn list_snapshots(&self, filesystem: &str) -> Result<Vec<Snapshot>> {
        let device = self.device(filesystem).await?;
        self.snapshots_on(device).await
    }

    /// Creates a filesystem snapshot; fails if one with that name exists.
    pub async fn create_snapshot(&self, filesystem: &str, name: &str) -> Result<WriteOutcome> {
        let device = self.device(filesystem).await?;
        let existing = self.snapshots_on(device.clone()).await?;
        if existing.iter().any(|s| s.name == name) {
            return Err(GpfsError::invalid(
                "create-snapshot",
                "snapshot",
                format!("snapshot {} already exists on {}", name, device),
            ));
        }
        self.write(vec![Operation::CreateSnapshot(SnapshotTarget {
            device,
            name: name.to_string(),
        })])
        .await
    }

    /// Deletes a filesystem snapshot; fails if no snapshot has that name.
    pub async fn delete_snapshot(&self, filesystem: &str, name: &str) -> Result<WriteOutcome> {
        let device = self.device(filesystem).await?;
        let existing = self.snapshots_on(device.clone()).await?;
        if !existing.iter().any(|s| s.name == name) {
            return Err(GpfsError::NotFound {
                kind: "snapshot",
                name: format!("{}:{}", device, name),
            });
        }
        self.write(vec![Operation::DeleteSnapshot(SnapshotTarget {
            device,
            name: name.to_string(),
        })])
        .await
    }

    async fn write(&self, ops: Vec<Operation>) -> Result<WriteOutcome> {
        let invocations = ops
            .iter()
            .map(|op| self.builder.build(op))
            .collect::<Result<Vec<_>>>()?;

        if self.dry_run {
            for inv in &invocations {
                tracing::warn!(command = %inv, "dry run, not executing");
            }
            return Ok(WriteOutcome {
                invocations,
                executed: false,
            });
        }

        for (op, inv) in ops.iter().zip(&invocations) {
            tracing::info!(operation = op.name(), command = %inv, "executing");
            if let Err(e) = self.runner.run(inv).await {
                tracing::error!(operation = op.name(), error = %e, "write operation failed");
                return Err(e);
            }
        }
        Ok(WriteOutcome {
            invocations,
            executed: true,
        })
    }

    /// Sets a quota; `request.device` names a cataloged filesystem.
    pub async fn set_quota(&self, mut request: SetQuota) -> Result<WriteOutcome> {
        request.device = self.device(&request.device).await?;
        self.write(vec![Operation::SetQuota(request)]).await
    }

    pub async fn set_grace(&self, mut request: SetGrace) -> Result<WriteOutcome> {
        request.device = self.device(&request.device).await?;
        self.write(vec![Operation::SetGrace(request)]).await
    }

    /// Creates a fileset, links it at the junction and optionally chowns it.
    ///
    /// The owning filesystem is resolved from the junction through the
    /// catalog, which must be populated. The catalog is refreshed after a
    /// successful creation.
    pub async fn create_fileset(&self, request: CreateFilesetRequest) -> Result<WriteOutcome> {
        let op = "create-fileset";
        let junction = &request.junction;
        let junction_str = junction.to_str().ok_or_else(|| {
            GpfsError::invalid(op, "junction", "path is not valid UTF-8")
        })?;
        validate_junction(op, junction_str)?;

        let snapshot = self.catalog.snapshot().await.ok_or_else(|| GpfsError::NotFound {
            kind: "filesystem for path",
            name: junction_str.to_string(),
        })?;
        let fs = snapshot
            .resolve_path(junction)
            .ok_or_else(|| GpfsError::NotFound {
                kind: "filesystem for path",
                name: junction_str.to_string(),
            })?;

        let name = match &request.name {
            Some(name) => name.clone(),
            None => derive_fileset_name(Path::new(&fs.mountpoint), junction)?,
        };
        validate_name(op, "name", &name)?;

        for existing in snapshot.filesets_of(fs) {
            if existing.name == name {
                return Err(GpfsError::invalid(
                    op,
                    "name",
                    format!("fileset {} already exists in {}", name, fs.name),
                ));
            }
            if existing.junction.as_deref() == Some(junction_str) {
                return Err(GpfsError::invalid(
                    op,
                    "junction",
                    format!("{} is already the junction of {}", junction_str, existing.name),
                ));
            }
        }
        if let InodeSpace::Shared { parent } = &request.inode_space {
            if snapshot.fileset(&fs.name, parent).is_none() {
                return Err(GpfsError::NotFound {
                    kind: "fileset",
                    name: format!("{}:{}", fs.name, parent),
                });
            }
        }

        if self.posix.exists(junction).await? {
            return Err(GpfsError::invalid(
                op,
                "junction",
                format!("{} already exists", junction_str),
            ));
        }
        let parent_dir = junction.parent().unwrap_or(Path::new("/"));
        if !self.posix.exists(parent_dir).await? {
            if !request.create_parent {
                return Err(GpfsError::invalid(
                    op,
                    "junction",
                    format!("parent directory {} does not exist", parent_dir.display()),
                ));
            }
            if self.dry_run {
                tracing::warn!(path = %parent_dir.display(), "dry run, not creating parent directory");
            } else {
                self.posix.make_directory(parent_dir).await?;
            }
        }

        let outcome = self
            .write(vec![
                Operation::CreateFileset(CreateFileset {
                    device: fs.device.clone(),
                    name: name.clone(),
                    inode_space: request.inode_space.clone(),
                }),
                Operation::LinkFileset(LinkFileset {
                    device: fs.device.clone(),
                    name: name.clone(),
                    junction: junction_str.to_string(),
                }),
            ])
            .await?;

        if outcome.executed && (request.owner.is_some() || request.group.is_some()) {
            self.posix
                .change_ownership(junction, request.owner, request.group)
                .await?;
        }
        if outcome.executed {
            tracing::info!(filesystem = %fs.name, fileset = %name, junction = junction_str, "fileset created");
            // the fileset exists either way; a stale catalog is only logged
            if let Err(e) = self.refresh().await {
                tracing::warn!(error = %e, "catalog refresh after fileset creation failed");
            }
        }
        Ok(outcome)
    }
}
