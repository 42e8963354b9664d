//! Typed GPFS entities decoded from tool output.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A GPFS filesystem as reported by the filesystem listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filesystem {
    pub name: String,
    pub device: String,
    pub mountpoint: String,
    pub block_size: u64,
    pub total_bytes: u64,
    pub free_bytes: u64,
    /// Cluster-wide mount state, `None` on layouts that do not report it.
    pub mounted: Option<bool>,
    /// Automatic mount option, `None` on layouts that do not report it.
    pub automount: Option<bool>,
}

impl Filesystem {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    pub fn usage_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes() as f64 / self.total_bytes as f64) * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilesetState {
    Enabled,
    Disabled,
    Deleted,
}

/// A fileset within a filesystem, keyed by `(filesystem, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fileset {
    pub filesystem: String,
    pub name: String,
    pub id: u64,
    pub state: FilesetState,
    /// Junction path, `None` when the fileset is not linked.
    pub junction: Option<String>,
    pub inodes: Option<u64>,
    pub data_bytes: Option<u64>,
    pub max_inodes: Option<u64>,
    pub alloc_inodes: Option<u64>,
    pub comment: Option<String>,
}

/// Fraction of the inode limit above which a fileset counts as critical.
pub const INODE_CRITICAL_THRESHOLD: f64 = 0.9;

impl Fileset {
    /// Inode usage if allocated inodes exceed `threshold` of the inode limit.
    ///
    /// `None` when the layout did not report the inode fields or the limit is 0.
    pub fn inode_critical(&self, threshold: f64) -> Option<InodeCritical> {
        let allocated = self.alloc_inodes?;
        let max_inodes = self.max_inodes.filter(|m| *m > 0)?;
        if allocated as f64 > threshold * max_inodes as f64 {
            Some(InodeCritical {
                filesystem: self.filesystem.clone(),
                fileset: self.name.clone(),
                allocated,
                max_inodes,
            })
        } else {
            None
        }
    }
}

/// A fileset running out of inodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeCritical {
    pub filesystem: String,
    pub fileset: String,
    pub allocated: u64,
    pub max_inodes: u64,
}

impl InodeCritical {
    /// Allocated inodes as a whole percentage of the limit, rounded down.
    pub fn percent(&self) -> u64 {
        self.allocated.saturating_mul(100) / self.max_inodes.max(1)
    }
}

/// A filesystem snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub filesystem: String,
    pub name: String,
    pub id: u64,
    /// Status as reported (`Valid`, `DeleteRequired`, ...).
    pub status: String,
    /// Creation time as reported by the tool.
    pub created: Option<String>,
    /// Fileset of a fileset-level snapshot, `None` for a global one.
    pub fileset: Option<String>,
}

/// Which kind of entity a quota or grace period applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuotaKind {
    User,
    Group,
    Fileset,
}

impl QuotaKind {
    /// Name used on the tool command line (`--grace user`, ...).
    pub fn as_arg(&self) -> &'static str {
        match self {
            QuotaKind::User => "user",
            QuotaKind::Group => "group",
            QuotaKind::Fileset => "fileset",
        }
    }
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// The owner of a quota: exactly one user, group or fileset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuotaScope {
    User { id: u64, name: Option<String> },
    Group { id: u64, name: Option<String> },
    Fileset { id: u64, name: String },
}

impl QuotaScope {
    pub fn kind(&self) -> QuotaKind {
        match self {
            QuotaScope::User { .. } => QuotaKind::User,
            QuotaScope::Group { .. } => QuotaKind::Group,
            QuotaScope::Fileset { .. } => QuotaKind::Fileset,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            QuotaScope::User { id, .. } | QuotaScope::Group { id, .. } | QuotaScope::Fileset { id, .. } => *id,
        }
    }

    /// Name if reported, numeric id otherwise.
    pub fn label(&self) -> String {
        match self {
            QuotaScope::User { id, name } | QuotaScope::Group { id, name } => {
                name.clone().unwrap_or_else(|| id.to_string())
            }
            QuotaScope::Fileset { name, .. } => name.clone(),
        }
    }
}

/// Remaining grace of a quota in soft-limit violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraceState {
    /// Not over the soft limit.
    NotStarted,
    /// Grace ran out; the soft limit is now enforced.
    Expired,
    Remaining(Duration),
}

/// Soft/hard limits and usage for one resource (blocks or files).
///
/// `None` means unset; a limit of `Some(0)` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub usage: Option<u64>,
    pub soft: Option<u64>,
    pub hard: Option<u64>,
    pub in_doubt: Option<u64>,
    pub grace: GraceState,
}

impl Limits {
    fn effective(limit: Option<u64>) -> Option<u64> {
        limit.filter(|l| *l > 0)
    }

    pub fn is_unlimited(&self) -> bool {
        Self::effective(self.soft).is_none() && Self::effective(self.hard).is_none()
    }

    pub fn soft_exceeded(&self) -> bool {
        match (Self::effective(self.soft), self.usage) {
            (Some(soft), Some(usage)) => usage > soft,
            _ => false,
        }
    }

    pub fn hard_exceeded(&self) -> bool {
        match (Self::effective(self.hard), self.usage) {
            (Some(hard), Some(usage)) => usage > hard,
            _ => false,
        }
    }

    /// Usage as a percentage of the soft limit, falling back to the hard one.
    pub fn usage_percent(&self) -> Option<f64> {
        let limit = Self::effective(self.soft).or(Self::effective(self.hard))?;
        Some((self.usage.unwrap_or(0) as f64 / limit as f64) * 100.0)
    }
}

/// A quota entry from the quota report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub filesystem: String,
    pub scope: QuotaScope,
    /// Fileset a user or group quota is scoped to, if any.
    pub fileset: Option<String>,
    /// Block limits, in bytes.
    pub blocks: Limits,
    /// File (inode) limits, in counts.
    pub files: Limits,
}

impl Quota {
    pub fn is_over_soft_limit(&self) -> bool {
        self.blocks.soft_exceeded() || self.files.soft_exceeded()
    }
}

/// Length of a grace period as configured on a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraceDuration {
    Days(u64),
    Hours(u64),
    Infinite,
}

impl GraceDuration {
    /// `None` for an infinite grace.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            GraceDuration::Days(d) => Some(Duration::from_secs(d * 86_400)),
            GraceDuration::Hours(h) => Some(Duration::from_secs(h * 3_600)),
            GraceDuration::Infinite => None,
        }
    }
}

impl std::fmt::Display for GraceDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraceDuration::Days(d) => write!(f, "{}days", d),
            GraceDuration::Hours(h) => write!(f, "{}hours", h),
            GraceDuration::Infinite => f.write_str("none"),
        }
    }
}

/// Grace periods of one quota kind on one filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GracePeriod {
    pub filesystem: String,
    pub kind: QuotaKind,
    pub block: GraceDuration,
    pub files: GraceDuration,
}
