//! Per-field value coercion.
//!
//! Empty fields decode to `None` (unset), never to zero. Anything that does
//! not match the expected shape is a [`GpfsError::FieldCoercion`] carrying
//! the raw text.

use serde::{Deserialize, Serialize};

use crate::error::{GpfsError, Result};

/// Unit applied to size fields that carry no suffix, and accepted suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeUnit {
    Bytes,
    KiB,
    MiB,
    GiB,
    TiB,
    PiB,
}

impl SizeUnit {
    pub fn multiplier(&self) -> u64 {
        match self {
            SizeUnit::Bytes => 1,
            SizeUnit::KiB => 1 << 10,
            SizeUnit::MiB => 1 << 20,
            SizeUnit::GiB => 1 << 30,
            SizeUnit::TiB => 1 << 40,
            SizeUnit::PiB => 1 << 50,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "" | "b" => Some(SizeUnit::Bytes),
            "k" | "kb" | "kib" => Some(SizeUnit::KiB),
            "m" | "mb" | "mib" => Some(SizeUnit::MiB),
            "g" | "gb" | "gib" => Some(SizeUnit::GiB),
            "t" | "tb" | "tib" => Some(SizeUnit::TiB),
            "p" | "pb" | "pib" => Some(SizeUnit::PiB),
            _ => None,
        }
    }
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Parses a size with optional unit suffix into bytes.
///
/// A bare number is taken in `default_unit`. Suffixes are powers of 1024 and
/// case-insensitive (`4M`, `4MB`, `4MiB` are all 4194304 bytes).
pub fn parse_size(field: &str, raw: &str, default_unit: SizeUnit) -> Result<Option<u64>> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };
    let err = || GpfsError::coercion(field, raw, "size (integer with optional K/M/G/T/P suffix)");

    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, suffix) = value.split_at(split);
    if digits.is_empty() {
        return Err(err());
    }

    let unit = if suffix.is_empty() {
        default_unit
    } else {
        SizeUnit::from_suffix(suffix).ok_or_else(err)?
    };

    let magnitude: u64 = digits.parse().map_err(|_| err())?;
    magnitude
        .checked_mul(unit.multiplier())
        .map(Some)
        .ok_or_else(err)
}

/// Parses a plain unsigned count.
pub fn parse_count(field: &str, raw: &str) -> Result<Option<u64>> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|_| GpfsError::coercion(field, raw, "unsigned integer"))
}

/// Parses a boolean-like token from the fixed accepted set.
pub fn parse_bool(field: &str, raw: &str) -> Result<Option<bool>> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "yes" | "enabled" | "true" | "automount" | "mounted" => Ok(Some(true)),
        "no" | "disabled" | "false" | "unmounted" => Ok(Some(false)),
        _ => Err(GpfsError::coercion(
            field,
            raw,
            "boolean (yes/no, enabled/disabled, true/false, mounted/unmounted)",
        )),
    }
}

/// Returns the field as an owned string, `None` when empty.
pub fn parse_text(raw: &str) -> Option<String> {
    non_empty(raw).map(str::to_string)
}

/// Returns the field as a string, failing when it is empty.
pub fn require_text(field: &str, raw: Option<&str>) -> Result<String> {
    raw.and_then(parse_text)
        .ok_or_else(|| GpfsError::coercion(field, raw.unwrap_or(""), "non-empty string"))
}

/// Time unit of a grace duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraceUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl GraceUnit {
    pub fn seconds(&self) -> u64 {
        match self {
            GraceUnit::Days => 86_400,
            GraceUnit::Hours => 3_600,
            GraceUnit::Minutes => 60,
            GraceUnit::Seconds => 1,
        }
    }
}

/// Splits `"7 days"`, `"7days"`, `"1 hour"` or `"45 minutes"` into
/// magnitude and unit.
pub fn parse_duration(field: &str, raw: &str) -> Result<(u64, GraceUnit)> {
    let err = || GpfsError::coercion(field, raw, "duration (N days, hours, minutes or seconds)");
    let value = raw.trim();

    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(err)?;
    let (digits, unit) = value.split_at(split);
    let magnitude: u64 = digits.parse().map_err(|_| err())?;

    let unit = match unit.trim().to_ascii_lowercase().as_str() {
        "day" | "days" => GraceUnit::Days,
        "hour" | "hours" => GraceUnit::Hours,
        "minute" | "minutes" | "min" | "mins" => GraceUnit::Minutes,
        "second" | "seconds" | "sec" | "secs" => GraceUnit::Seconds,
        _ => return Err(err()),
    };
    Ok((magnitude, unit))
}
