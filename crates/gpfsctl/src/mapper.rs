//! Record → entity mapping.
//!
//! Mappers read declared fields by name, so trailing fields added by newer
//! tool releases are ignored. Required fields that are empty fail with
//! [`GpfsError::FieldCoercion`]; optional ones decode to `None`.

use std::time::Duration;

use crate::coerce::{
    parse_bool, parse_count, parse_duration, parse_size, parse_text, require_text, GraceUnit,
    SizeUnit,
};
use crate::entities::{
    Fileset, FilesetState, Filesystem, GraceDuration, GracePeriod, GraceState, Limits, Quota,
    QuotaKind, QuotaScope, Snapshot,
};
use crate::error::{GpfsError, Result};
use crate::record::Record;
use crate::schema::SchemaKind;

/// Entities that can be decoded from a single record.
pub trait FromRecord: Sized {
    /// Layout family this entity is decoded from.
    const KIND: SchemaKind;

    fn from_record(record: &Record) -> Result<Self>;
}

/// Maps every record, preserving input order. Stops at the first failure.
pub fn map_records<T: FromRecord>(records: &[Record]) -> Result<Vec<T>> {
    records.iter().map(T::from_record).collect()
}

fn field<'a>(record: &'a Record, name: &str) -> &'a str {
    record.get(name).unwrap_or("")
}

fn required<T>(name: &str, raw: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| GpfsError::coercion(name, raw, "required value"))
}

fn required_size(record: &Record, name: &str, unit: SizeUnit) -> Result<u64> {
    let raw = field(record, name);
    required(name, raw, parse_size(name, raw, unit)?)
}

fn required_count(record: &Record, name: &str) -> Result<u64> {
    let raw = field(record, name);
    required(name, raw, parse_count(name, raw)?)
}

fn text(record: &Record, name: &str) -> Result<String> {
    require_text(name, record.get(name))
}

impl FromRecord for Filesystem {
    const KIND: SchemaKind = SchemaKind::Filesystem;

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Filesystem {
            name: text(record, "name")?,
            device: text(record, "device")?,
            mountpoint: text(record, "mountpoint")?,
            block_size: required_size(record, "blocksize", SizeUnit::Bytes)?,
            total_bytes: required_size(record, "totalbytes", SizeUnit::Bytes)?,
            free_bytes: required_size(record, "freebytes", SizeUnit::Bytes)?,
            mounted: parse_bool("mountstate", field(record, "mountstate"))?,
            automount: parse_bool("automount", field(record, "automount"))?,
        })
    }
}

pub fn parse_fileset_state(name: &str, raw: &str) -> Result<FilesetState> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "enabled" | "linked" => Ok(FilesetState::Enabled),
        "disabled" | "unlinked" => Ok(FilesetState::Disabled),
        "deleted" => Ok(FilesetState::Deleted),
        _ => Err(GpfsError::coercion(
            name,
            raw,
            "fileset state (enabled/linked, disabled/unlinked, deleted)",
        )),
    }
}

impl FromRecord for Fileset {
    const KIND: SchemaKind = SchemaKind::Fileset;

    fn from_record(record: &Record) -> Result<Self> {
        // unlinked filesets report "--" as their path
        let junction = parse_text(field(record, "path")).filter(|p| p != "--");

        Ok(Fileset {
            filesystem: text(record, "filesystem")?,
            name: text(record, "name")?,
            id: required_count(record, "id")?,
            state: parse_fileset_state("status", field(record, "status"))?,
            junction,
            inodes: parse_count("inodes", field(record, "inodes"))?,
            data_bytes: parse_size("datakb", field(record, "datakb"), SizeUnit::KiB)?,
            max_inodes: parse_count("maxinodes", field(record, "maxinodes"))?,
            alloc_inodes: parse_count("allocinodes", field(record, "allocinodes"))?,
            comment: parse_text(field(record, "comment")),
        })
    }
}

pub fn parse_quota_kind(name: &str, raw: &str) -> Result<QuotaKind> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "usr" | "user" => Ok(QuotaKind::User),
        "grp" | "group" => Ok(QuotaKind::Group),
        "fileset" | "fset" => Ok(QuotaKind::Fileset),
        _ => Err(GpfsError::coercion(name, raw, "quota type (USR, GRP, FILESET)")),
    }
}

/// Remaining grace of a quota. `none` means not in grace; an empty field is
/// an error so an unreported grace is never taken for "not started".
pub fn parse_grace_state(name: &str, raw: &str) -> Result<GraceState> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Err(GpfsError::coercion(name, raw, "grace state (none, expired or a duration)")),
        "none" => Ok(GraceState::NotStarted),
        "expired" => Ok(GraceState::Expired),
        _ => {
            let (n, unit) = parse_duration(name, raw)?;
            let secs = n
                .checked_mul(unit.seconds())
                .ok_or_else(|| GpfsError::coercion(name, raw, "duration within range"))?;
            Ok(GraceState::Remaining(Duration::from_secs(secs)))
        }
    }
}

/// Configured grace period. Only whole days or hours can be configured.
pub fn parse_grace_duration(name: &str, raw: &str) -> Result<GraceDuration> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "infinite" => Ok(GraceDuration::Infinite),
        "" => Err(GpfsError::coercion(name, raw, "grace period")),
        _ => match parse_duration(name, raw)? {
            (n, GraceUnit::Days) => Ok(GraceDuration::Days(n)),
            (n, GraceUnit::Hours) => Ok(GraceDuration::Hours(n)),
            _ => Err(GpfsError::coercion(name, raw, "grace period (N days or N hours)")),
        },
    }
}

/// Enforces soft <= hard when both limits are set and nonzero.
fn check_limit_order(soft_field: &str, limits: &Limits, raw_soft: &str, raw_hard: &str) -> Result<()> {
    if let (Some(soft), Some(hard)) = (limits.soft, limits.hard) {
        if soft > 0 && hard > 0 && soft > hard {
            return Err(GpfsError::FieldCoercion {
                field: soft_field.to_string(),
                raw: raw_soft.to_string(),
                expected: format!("soft limit not above hard limit {}", raw_hard),
            });
        }
    }
    Ok(())
}

fn block_limits(record: &Record) -> Result<Limits> {
    let limits = Limits {
        usage: parse_size("blockusage", field(record, "blockusage"), SizeUnit::KiB)?,
        soft: parse_size("blockquota", field(record, "blockquota"), SizeUnit::KiB)?,
        hard: parse_size("blocklimit", field(record, "blocklimit"), SizeUnit::KiB)?,
        in_doubt: parse_size("blockindoubt", field(record, "blockindoubt"), SizeUnit::KiB)?,
        grace: parse_grace_state("blockgrace", field(record, "blockgrace"))?,
    };
    check_limit_order(
        "blockquota",
        &limits,
        field(record, "blockquota"),
        field(record, "blocklimit"),
    )?;
    Ok(limits)
}

fn file_limits(record: &Record) -> Result<Limits> {
    let limits = Limits {
        usage: parse_count("filesusage", field(record, "filesusage"))?,
        soft: parse_count("filesquota", field(record, "filesquota"))?,
        hard: parse_count("fileslimit", field(record, "fileslimit"))?,
        in_doubt: parse_count("filesindoubt", field(record, "filesindoubt"))?,
        grace: parse_grace_state("filesgrace", field(record, "filesgrace"))?,
    };
    check_limit_order(
        "filesquota",
        &limits,
        field(record, "filesquota"),
        field(record, "fileslimit"),
    )?;
    Ok(limits)
}

impl FromRecord for Quota {
    const KIND: SchemaKind = SchemaKind::Quota;

    fn from_record(record: &Record) -> Result<Self> {
        let kind = parse_quota_kind("quotatype", field(record, "quotatype"))?;
        let id = required_count(record, "id")?;
        let name = parse_text(field(record, "name"));

        let (scope, fileset) = match kind {
            QuotaKind::User => (QuotaScope::User { id, name }, parse_text(field(record, "fileset"))),
            QuotaKind::Group => (QuotaScope::Group { id, name }, parse_text(field(record, "fileset"))),
            QuotaKind::Fileset => {
                // the report leaves the fileset column empty for fileset quotas
                let name = required("name", field(record, "name"), name)?;
                (QuotaScope::Fileset { id, name: name.clone() }, Some(name))
            }
        };

        Ok(Quota {
            filesystem: text(record, "filesystem")?,
            scope,
            fileset,
            blocks: block_limits(record)?,
            files: file_limits(record)?,
        })
    }
}

impl FromRecord for GracePeriod {
    const KIND: SchemaKind = SchemaKind::Grace;

    fn from_record(record: &Record) -> Result<Self> {
        Ok(GracePeriod {
            filesystem: text(record, "filesystem")?,
            kind: parse_quota_kind("quotatype", field(record, "quotatype"))?,
            block: parse_grace_duration("blockgrace", field(record, "blockgrace"))?,
            files: parse_grace_duration("filesgrace", field(record, "filesgrace"))?,
        })
    }
}

impl FromRecord for Snapshot {
    const KIND: SchemaKind = SchemaKind::Snapshot;

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Snapshot {
            filesystem: text(record, "filesystem")?,
            name: text(record, "name")?,
            id: required_count(record, "id")?,
            status: text(record, "status")?,
            created: parse_text(field(record, "created")),
            fileset: parse_text(field(record, "fileset")),
        })
    }
}
