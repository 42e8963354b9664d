//! Known field layouts of the tool's machine-readable output.
//!
//! Each output stream announces its layout with a header line carrying a
//! schema token. The token is resolved through a static table to a
//! [`RecordLayout`]; nothing about the layout is inferred at runtime.

use serde::{Deserialize, Serialize};

/// Number of unknown trailing fields accepted after the declared ones, so
/// output from newer tool releases still parses.
pub const FORWARD_COMPAT_FIELDS: usize = 16;

/// The output layouts this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    FilesystemV1,
    FilesystemV2,
    FilesetV1,
    FilesetV2,
    QuotaV1,
    QuotaV2,
    GraceV1,
    SnapshotV1,
}

/// The entity family a layout decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaKind {
    Filesystem,
    Fileset,
    Quota,
    Grace,
    Snapshot,
}

const FILESYSTEM_V1: &[&str] = &[
    "name",
    "device",
    "mountpoint",
    "blocksize",
    "totalbytes",
    "freebytes",
];

const FILESYSTEM_V2: &[&str] = &[
    "name",
    "device",
    "mountpoint",
    "blocksize",
    "totalbytes",
    "freebytes",
    "mountstate",
    "automount",
];

const FILESET_V1: &[&str] = &[
    "filesystem",
    "name",
    "id",
    "status",
    "path",
    "inodes",
    "datakb",
];

const FILESET_V2: &[&str] = &[
    "filesystem",
    "name",
    "id",
    "status",
    "path",
    "inodes",
    "datakb",
    "maxinodes",
    "allocinodes",
    "comment",
];

const QUOTA_V1: &[&str] = &[
    "filesystem",
    "quotatype",
    "id",
    "name",
    "blockusage",
    "blockquota",
    "blocklimit",
    "blockindoubt",
    "blockgrace",
    "filesusage",
    "filesquota",
    "fileslimit",
    "filesindoubt",
    "filesgrace",
    "remarks",
];

const QUOTA_V2: &[&str] = &[
    "filesystem",
    "quotatype",
    "id",
    "name",
    "blockusage",
    "blockquota",
    "blocklimit",
    "blockindoubt",
    "blockgrace",
    "filesusage",
    "filesquota",
    "fileslimit",
    "filesindoubt",
    "filesgrace",
    "remarks",
    "fileset",
];

const GRACE_V1: &[&str] = &["filesystem", "quotatype", "blockgrace", "filesgrace"];

const SNAPSHOT_V1: &[&str] = &["filesystem", "name", "id", "status", "created", "fileset"];

/// Token → layout table. Order is irrelevant; tokens are unique.
const SCHEMA_TABLE: &[(&str, SchemaVersion)] = &[
    ("filesystem_v1", SchemaVersion::FilesystemV1),
    ("filesystem_v2", SchemaVersion::FilesystemV2),
    ("fileset_v1", SchemaVersion::FilesetV1),
    ("fileset_v2", SchemaVersion::FilesetV2),
    ("quota_v1", SchemaVersion::QuotaV1),
    ("quota_v2", SchemaVersion::QuotaV2),
    ("grace_v1", SchemaVersion::GraceV1),
    ("snapshot_v1", SchemaVersion::SnapshotV1),
];

impl SchemaVersion {
    /// Resolves a header token, `None` if the token is unknown.
    pub fn from_token(token: &str) -> Option<Self> {
        SCHEMA_TABLE
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, v)| *v)
    }

    pub fn token(&self) -> &'static str {
        match self {
            SchemaVersion::FilesystemV1 => "filesystem_v1",
            SchemaVersion::FilesystemV2 => "filesystem_v2",
            SchemaVersion::FilesetV1 => "fileset_v1",
            SchemaVersion::FilesetV2 => "fileset_v2",
            SchemaVersion::QuotaV1 => "quota_v1",
            SchemaVersion::QuotaV2 => "quota_v2",
            SchemaVersion::GraceV1 => "grace_v1",
            SchemaVersion::SnapshotV1 => "snapshot_v1",
        }
    }

    pub fn kind(&self) -> SchemaKind {
        match self {
            SchemaVersion::FilesystemV1 | SchemaVersion::FilesystemV2 => SchemaKind::Filesystem,
            SchemaVersion::FilesetV1 | SchemaVersion::FilesetV2 => SchemaKind::Fileset,
            SchemaVersion::QuotaV1 | SchemaVersion::QuotaV2 => SchemaKind::Quota,
            SchemaVersion::GraceV1 => SchemaKind::Grace,
            SchemaVersion::SnapshotV1 => SchemaKind::Snapshot,
        }
    }

    /// The field layout declared for this version.
    pub fn layout(&self) -> RecordLayout {
        let fields = match self {
            SchemaVersion::FilesystemV1 => FILESYSTEM_V1,
            SchemaVersion::FilesystemV2 => FILESYSTEM_V2,
            SchemaVersion::FilesetV1 => FILESET_V1,
            SchemaVersion::FilesetV2 => FILESET_V2,
            SchemaVersion::QuotaV1 => QUOTA_V1,
            SchemaVersion::QuotaV2 => QUOTA_V2,
            SchemaVersion::GraceV1 => GRACE_V1,
            SchemaVersion::SnapshotV1 => SNAPSHOT_V1,
        };
        RecordLayout::new(self.token(), fields)
    }

    /// All versions decoding to `kind`, oldest first.
    pub fn versions_of(kind: SchemaKind) -> Vec<SchemaVersion> {
        SCHEMA_TABLE
            .iter()
            .map(|(_, v)| *v)
            .filter(|v| v.kind() == kind)
            .collect()
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Field-list descriptor for one layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    /// Token used in the header line and in error messages.
    pub token: &'static str,
    /// Declared field names, in output order.
    pub fields: &'static [&'static str],
    /// Minimum number of fields a data line must carry.
    pub min_fields: usize,
    /// Maximum number of fields a data line may carry.
    pub max_fields: usize,
}

impl RecordLayout {
    /// A layout requiring every declared field and tolerating
    /// [`FORWARD_COMPAT_FIELDS`] unknown trailing ones.
    pub const fn new(token: &'static str, fields: &'static [&'static str]) -> Self {
        Self {
            token,
            fields,
            min_fields: fields.len(),
            max_fields: fields.len() + FORWARD_COMPAT_FIELDS,
        }
    }

    /// A layout that accepts exactly the declared fields.
    pub const fn strict(token: &'static str, fields: &'static [&'static str]) -> Self {
        Self {
            token,
            fields,
            min_fields: fields.len(),
            max_fields: fields.len(),
        }
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| *f == field)
    }
}
