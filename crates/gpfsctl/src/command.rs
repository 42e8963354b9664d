//! Argument-vector construction for GPFS administrative commands.
//!
//! Parameters are validated and placed into discrete arguments; nothing is
//! ever joined into a shell string. Program names are bare and resolved
//! against the configured tool directory by the execution layer.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::entities::{GraceDuration, QuotaKind};
use crate::error::{GpfsError, Result};

pub const MMLSFS: &str = "mmlsfs";
pub const MMLSFILESET: &str = "mmlsfileset";
pub const MMCRFILESET: &str = "mmcrfileset";
pub const MMLINKFILESET: &str = "mmlinkfileset";
pub const MMREPQUOTA: &str = "mmrepquota";
pub const MMSETQUOTA: &str = "mmsetquota";
pub const MMLSSNAPSHOT: &str = "mmlssnapshot";
pub const MMCRSNAPSHOT: &str = "mmcrsnapshot";
pub const MMDELSNAPSHOT: &str = "mmdelsnapshot";

/// Longest name the tool suite accepts for devices, filesets and principals.
const MAX_NAME_LEN: usize = 255;

/// A fully built command: program name plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }

    /// Command line for logs and error messages only.
    pub fn render(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in &self.args {
            if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
                parts.push(format!("{:?}", arg));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InodeSpace {
    /// Independent inode space; limits default to the configured inode limit.
    New {
        max_inodes: Option<u64>,
        prealloc: Option<u64>,
    },
    /// Share the inode space of an existing fileset.
    Shared { parent: String },
}

impl Default for InodeSpace {
    fn default() -> Self {
        InodeSpace::New {
            max_inodes: None,
            prealloc: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilesets {
    pub device: String,
    /// Restrict the listing to these filesets; empty lists all.
    pub filesets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFileset {
    pub device: String,
    pub name: String,
    pub inode_space: InodeSpace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFileset {
    pub device: String,
    pub name: String,
    pub junction: String,
}

/// Quota-set request. Exactly one of `user`, `group` or `fileset` selects
/// the scope; `in_fileset` narrows a user or group quota to one fileset.
///
/// Limits are signed so out-of-range requests are reported, not wrapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetQuota {
    pub device: String,
    pub user: Option<String>,
    pub group: Option<String>,
    pub fileset: Option<String>,
    pub in_fileset: Option<String>,
    /// Block limits in bytes.
    pub block_soft: Option<i64>,
    pub block_hard: Option<i64>,
    /// File (inode) limits.
    pub files_soft: Option<i64>,
    pub files_hard: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetGrace {
    pub device: String,
    pub kind: QuotaKind,
    pub block: Option<GraceDuration>,
    pub files: Option<GraceDuration>,
}

/// A filesystem-level snapshot to create or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotTarget {
    pub device: String,
    pub name: String,
}

/// An administrative intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    ListFilesystems,
    ListFilesets(ListFilesets),
    CreateFileset(CreateFileset),
    LinkFileset(LinkFileset),
    ListQuota { device: String },
    SetQuota(SetQuota),
    ListGrace { device: String },
    SetGrace(SetGrace),
    ListSnapshots { device: String },
    CreateSnapshot(SnapshotTarget),
    DeleteSnapshot(SnapshotTarget),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ListFilesystems => "list-filesystems",
            Operation::ListFilesets(_) => "list-filesets",
            Operation::CreateFileset(_) => "create-fileset",
            Operation::LinkFileset(_) => "link-fileset",
            Operation::ListQuota { .. } => "list-quota",
            Operation::SetQuota(_) => "set-quota",
            Operation::ListGrace { .. } => "list-grace",
            Operation::SetGrace(_) => "set-grace",
            Operation::ListSnapshots { .. } => "list-snapshots",
            Operation::CreateSnapshot(_) => "create-snapshot",
            Operation::DeleteSnapshot(_) => "delete-snapshot",
        }
    }

    /// True for operations that change cluster state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::CreateFileset(_)
                | Operation::LinkFileset(_)
                | Operation::SetQuota(_)
                | Operation::SetGrace(_)
                | Operation::CreateSnapshot(_)
                | Operation::DeleteSnapshot(_)
        )
    }
}

/// Validates a device, fileset, user or group name.
pub fn validate_name(operation: &str, parameter: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(GpfsError::invalid(operation, parameter, "must not be empty"));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(GpfsError::invalid(
            operation,
            parameter,
            format!("longer than {} characters", MAX_NAME_LEN),
        ));
    }
    if value.starts_with('-') {
        return Err(GpfsError::invalid(
            operation,
            parameter,
            format!("{:?} would be read as an option", value),
        ));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | '@')))
    {
        return Err(GpfsError::invalid(
            operation,
            parameter,
            format!("unsupported character {:?} in {:?}", bad, value),
        ));
    }
    Ok(())
}

/// Validates a junction path: absolute, normalized, no colons or controls.
pub fn validate_junction(operation: &str, value: &str) -> Result<()> {
    let reject = |reason: String| Err(GpfsError::invalid(operation, "junction", reason));

    if !value.starts_with('/') {
        return reject(format!("{:?} is not an absolute path", value));
    }
    if let Some(bad) = value.chars().find(|c| c.is_control() || *c == ':') {
        return reject(format!("unsupported character {:?} in {:?}", bad, value));
    }
    if Path::new(value)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
    {
        return reject(format!("{:?} contains relative components", value));
    }
    Ok(())
}

fn non_negative(operation: &str, parameter: &str, value: Option<i64>) -> Result<Option<u64>> {
    match value {
        None => Ok(None),
        Some(v) if v < 0 => Err(GpfsError::invalid(
            operation,
            parameter,
            format!("{} must not be negative", v),
        )),
        Some(v) => Ok(Some(v as u64)),
    }
}

/// Builds invocations, applying configured defaults.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    default_inode_limit: u64,
    soft_to_hard_factor: f64,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new(1_048_576, 1.05)
    }
}

impl CommandBuilder {
    /// `soft_to_hard_factor` below 1.0 is raised to 1.0 so a defaulted hard
    /// limit never falls under the soft one.
    pub fn new(default_inode_limit: u64, soft_to_hard_factor: f64) -> Self {
        Self {
            default_inode_limit,
            soft_to_hard_factor: soft_to_hard_factor.max(1.0),
        }
    }

    pub fn build(&self, op: &Operation) -> Result<Invocation> {
        let invocation = match op {
            Operation::ListFilesystems => {
                Invocation::new(MMLSFS, vec!["all".to_string(), "-Y".to_string()])
            }
            Operation::ListFilesets(p) => self.list_filesets(p)?,
            Operation::CreateFileset(p) => self.create_fileset(p)?,
            Operation::LinkFileset(p) => self.link_fileset(p)?,
            Operation::ListQuota { device } => {
                validate_name(op.name(), "device", device)?;
                Invocation::new(
                    MMREPQUOTA,
                    vec!["-Y".to_string(), "-n".to_string(), device.clone()],
                )
            }
            Operation::SetQuota(p) => self.set_quota(p)?,
            Operation::ListGrace { device } => {
                validate_name(op.name(), "device", device)?;
                Invocation::new(
                    MMREPQUOTA,
                    vec!["-Y".to_string(), "-t".to_string(), device.clone()],
                )
            }
            Operation::SetGrace(p) => self.set_grace(p)?,
            Operation::ListSnapshots { device } => {
                validate_name(op.name(), "device", device)?;
                Invocation::new(MMLSSNAPSHOT, vec![device.clone(), "-Y".to_string()])
            }
            Operation::CreateSnapshot(p) => self.snapshot(op.name(), MMCRSNAPSHOT, p)?,
            Operation::DeleteSnapshot(p) => self.snapshot(op.name(), MMDELSNAPSHOT, p)?,
        };

        tracing::debug!(
            operation = op.name(),
            command = %invocation,
            "built invocation"
        );
        Ok(invocation)
    }

    fn list_filesets(&self, p: &ListFilesets) -> Result<Invocation> {
        let op = "list-filesets";
        validate_name(op, "device", &p.device)?;
        let mut args = vec![p.device.clone()];
        if !p.filesets.is_empty() {
            for name in &p.filesets {
                validate_name(op, "filesets", name)?;
            }
            args.push(p.filesets.join(","));
        }
        args.push("-Y".to_string());
        Ok(Invocation::new(MMLSFILESET, args))
    }

    fn create_fileset(&self, p: &CreateFileset) -> Result<Invocation> {
        let op = "create-fileset";
        validate_name(op, "device", &p.device)?;
        validate_name(op, "name", &p.name)?;

        let mut args = vec![p.device.clone(), p.name.clone(), "--inode-space".to_string()];
        match &p.inode_space {
            InodeSpace::New {
                max_inodes,
                prealloc,
            } => {
                let max = max_inodes.unwrap_or(self.default_inode_limit);
                if max == 0 {
                    return Err(GpfsError::invalid(op, "max_inodes", "must be greater than zero"));
                }
                let limit = match prealloc {
                    Some(pre) if *pre > max => {
                        return Err(GpfsError::invalid(
                            op,
                            "prealloc",
                            format!("{} exceeds the inode limit {}", pre, max),
                        ));
                    }
                    Some(pre) => format!("{}:{}", max, pre),
                    None => max.to_string(),
                };
                args.push("new".to_string());
                args.push("--inode-limit".to_string());
                args.push(limit);
            }
            InodeSpace::Shared { parent } => {
                validate_name(op, "parent", parent)?;
                if parent == &p.name {
                    return Err(GpfsError::invalid(
                        op,
                        "parent",
                        "a fileset cannot share its own inode space",
                    ));
                }
                args.push(parent.clone());
            }
        }
        Ok(Invocation::new(MMCRFILESET, args))
    }

    fn link_fileset(&self, p: &LinkFileset) -> Result<Invocation> {
        let op = "link-fileset";
        validate_name(op, "device", &p.device)?;
        validate_name(op, "name", &p.name)?;
        validate_junction(op, &p.junction)?;
        Ok(Invocation::new(
            MMLINKFILESET,
            vec![
                p.device.clone(),
                p.name.clone(),
                "-J".to_string(),
                p.junction.clone(),
            ],
        ))
    }

    fn snapshot(&self, op: &str, program: &str, p: &SnapshotTarget) -> Result<Invocation> {
        validate_name(op, "device", &p.device)?;
        validate_name(op, "snapshot", &p.name)?;
        Ok(Invocation::new(program, vec![p.device.clone(), p.name.clone()]))
    }

    fn hard_default(&self, soft: u64) -> u64 {
        ((soft as f64 * self.soft_to_hard_factor).round() as u64).max(soft)
    }

    /// Resolves a soft/hard pair: hard defaults from soft, and may not be lower.
    fn limit_pair(
        &self,
        op: &str,
        name: &str,
        soft: Option<i64>,
        hard: Option<i64>,
    ) -> Result<Option<(u64, u64)>> {
        let soft = non_negative(op, &format!("{}_soft", name), soft)?;
        let hard = non_negative(op, &format!("{}_hard", name), hard)?;
        match (soft, hard) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(GpfsError::invalid(
                op,
                &format!("{}_soft", name),
                "a hard limit requires a soft limit",
            )),
            (Some(soft), None) => Ok(Some((soft, self.hard_default(soft)))),
            (Some(soft), Some(hard)) if hard > 0 && hard < soft => Err(GpfsError::invalid(
                op,
                &format!("{}_hard", name),
                format!("hard limit {} is lower than soft limit {}", hard, soft),
            )),
            (Some(soft), Some(hard)) => Ok(Some((soft, hard))),
        }
    }

    fn set_quota(&self, p: &SetQuota) -> Result<Invocation> {
        let op = "set-quota";
        validate_name(op, "device", &p.device)?;

        let scopes = [&p.user, &p.group, &p.fileset]
            .iter()
            .filter(|s| s.is_some())
            .count();
        if scopes != 1 {
            return Err(GpfsError::invalid(
                op,
                "scope",
                format!("exactly one of user, group or fileset is required, got {}", scopes),
            ));
        }

        let mut target = p.device.clone();
        let mut args = Vec::new();
        if let Some(user) = &p.user {
            validate_name(op, "user", user)?;
            args.push("--user".to_string());
            args.push(user.clone());
        }
        if let Some(group) = &p.group {
            validate_name(op, "group", group)?;
            args.push("--group".to_string());
            args.push(group.clone());
        }
        if let Some(fileset) = &p.fileset {
            validate_name(op, "fileset", fileset)?;
            if p.in_fileset.is_some() {
                return Err(GpfsError::invalid(
                    op,
                    "in_fileset",
                    "only user and group quotas can be scoped to a fileset",
                ));
            }
            target = format!("{}:{}", p.device, fileset);
        }
        if let Some(in_fileset) = &p.in_fileset {
            validate_name(op, "in_fileset", in_fileset)?;
            target = format!("{}:{}", p.device, in_fileset);
        }

        let block = self.limit_pair(op, "block", p.block_soft, p.block_hard)?;
        let files = self.limit_pair(op, "files", p.files_soft, p.files_hard)?;
        if block.is_none() && files.is_none() {
            return Err(GpfsError::invalid(
                op,
                "limits",
                "at least one block or file limit is required",
            ));
        }

        if let Some((soft, hard)) = block {
            // the tool works in KiB; round up so a limit never shrinks
            args.push("--block".to_string());
            args.push(format!("{}K:{}K", soft.div_ceil(1024), hard.div_ceil(1024)));
        }
        if let Some((soft, hard)) = files {
            args.push("--files".to_string());
            args.push(format!("{}:{}", soft, hard));
        }

        args.insert(0, target);
        Ok(Invocation::new(MMSETQUOTA, args))
    }

    fn set_grace(&self, p: &SetGrace) -> Result<Invocation> {
        let op = "set-grace";
        validate_name(op, "device", &p.device)?;
        if p.block.is_none() && p.files.is_none() {
            return Err(GpfsError::invalid(
                op,
                "grace",
                "at least one of block or files grace is required",
            ));
        }

        let mut args = vec![
            p.device.clone(),
            "--grace".to_string(),
            p.kind.as_arg().to_string(),
        ];
        for (flag, grace) in [("--block", p.block), ("--files", p.files)] {
            match grace {
                None => {}
                Some(GraceDuration::Infinite) => {
                    return Err(GpfsError::invalid(
                        op,
                        flag.trim_start_matches('-'),
                        "an infinite grace period cannot be set",
                    ));
                }
                Some(duration) => {
                    args.push(flag.to_string());
                    args.push(duration.to_string());
                }
            }
        }
        Ok(Invocation::new(MMSETQUOTA, args))
    }
}
