//! Colon-separated record parsing.
//!
//! Tool output is line oriented. A header line `HEADER:<token>` selects the
//! [`RecordLayout`] for the data lines that follow it; data lines are split
//! on unescaped colons, with `\:` standing for a literal colon and `\\` for
//! a literal backslash. Records are returned in input order.

use crate::error::{GpfsError, Result};
use crate::schema::{RecordLayout, SchemaVersion};

/// First field of a header line.
pub const HEADER_MARKER: &str = "HEADER";

/// Prefix of comment lines.
pub const COMMENT_PREFIX: char = '#';

/// One parsed data line: ordered raw values under a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    layout: RecordLayout,
    values: Vec<String>,
}

impl Record {
    /// Schema token the record was parsed under.
    pub fn token(&self) -> &'static str {
        self.layout.token
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Raw (unescaped) value of a declared field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.layout
            .position(field)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
    }

    /// Declared fields paired with their values, in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.layout
            .fields
            .iter()
            .copied()
            .zip(self.values.iter().map(String::as_str))
    }

    /// Values beyond the declared fields (newer tool versions).
    pub fn extra(&self) -> &[String] {
        let declared = self.layout.fields.len().min(self.values.len());
        &self.values[declared..]
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Re-escapes the values into a colon-separated line.
    pub fn render(&self) -> String {
        render_fields(&self.values)
    }
}

/// Splits a line on unescaped colons and unescapes each field.
///
/// Returns the reason as a plain string so the caller can attach the line
/// number and raw text.
pub fn split_fields(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(':') => current.push(':'),
                Some('\\') => current.push('\\'),
                Some(other) => return Err(format!("invalid escape sequence \\{}", other)),
                None => return Err("dangling escape at end of line".to_string()),
            },
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    Ok(fields)
}

/// Escapes one value for output.
pub fn escape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ':' => out.push_str("\\:"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`split_fields`].
pub fn render_fields<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| escape_field(v.as_ref()))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parses a single data line against `layout`.
pub fn parse_line(line: &str, layout: &RecordLayout, line_no: usize) -> Result<Record> {
    let malformed = |reason: String| GpfsError::MalformedRecord {
        line_no,
        line: line.to_string(),
        reason,
    };

    let values = split_fields(line).map_err(malformed)?;

    if values.len() < layout.min_fields {
        return Err(malformed(format!(
            "layout {} expects at least {} fields, found {}",
            layout.token,
            layout.min_fields,
            values.len()
        )));
    }
    if values.len() > layout.max_fields {
        return Err(malformed(format!(
            "layout {} allows at most {} fields, found {}",
            layout.token,
            layout.max_fields,
            values.len()
        )));
    }

    Ok(Record {
        layout: layout.clone(),
        values,
    })
}

/// Result of parsing a whole command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    /// Layout announced by the header (or the fallback), `None` when the
    /// output held no header and no data.
    pub schema: Option<SchemaVersion>,
    /// Data records in input order.
    pub records: Vec<Record>,
}

/// Parses complete command output.
#[derive(Debug, Clone)]
pub struct OutputParser {
    accepted: Vec<SchemaVersion>,
    fallback: Option<SchemaVersion>,
}

impl OutputParser {
    /// A parser that accepts any of `accepted` in the header; an empty list
    /// accepts every known schema.
    pub fn new(accepted: &[SchemaVersion]) -> Self {
        Self {
            accepted: accepted.to_vec(),
            fallback: None,
        }
    }

    /// Layout used for data lines appearing before any header.
    pub fn with_fallback(mut self, schema: SchemaVersion) -> Self {
        self.fallback = Some(schema);
        self
    }

    fn is_accepted(&self, schema: SchemaVersion) -> bool {
        self.accepted.is_empty() || self.accepted.contains(&schema)
    }

    pub fn parse(&self, output: &str) -> Result<ParsedOutput> {
        let mut active: Option<(SchemaVersion, RecordLayout)> = None;
        let mut records = Vec::new();

        for (idx, raw) in output.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.strip_suffix('\r').unwrap_or(raw);

            if line.trim().is_empty() || line.starts_with(COMMENT_PREFIX) {
                continue;
            }

            let malformed = |reason: String| GpfsError::MalformedRecord {
                line_no,
                line: line.to_string(),
                reason,
            };

            if is_header(line) {
                let fields = split_fields(line).map_err(malformed)?;
                let token = fields
                    .get(1)
                    .map(String::as_str)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| malformed("header without schema token".to_string()))?;
                let schema = SchemaVersion::from_token(token)
                    .ok_or_else(|| malformed(format!("unknown schema version marker {:?}", token)))?;
                if !self.is_accepted(schema) {
                    return Err(malformed(format!(
                        "schema {} is not valid for this command",
                        schema
                    )));
                }

                match &active {
                    Some((current, _)) if *current != schema => {
                        return Err(malformed(format!(
                            "schema {} mixed with {} in one output",
                            schema, current
                        )));
                    }
                    Some(_) => {}
                    None => active = Some((schema, schema.layout())),
                }
                continue;
            }

            if active.is_none() {
                match self.fallback {
                    Some(schema) => active = Some((schema, schema.layout())),
                    None => return Err(malformed("data line before header".to_string())),
                }
            }
            if let Some((_, layout)) = &active {
                records.push(parse_line(line, layout, line_no)?);
            }
        }

        let schema = active.map(|(schema, _)| schema);
        if let Some(extra) = records.iter().map(|r| r.extra().len()).max().filter(|n| *n > 0) {
            tracing::warn!(
                schema = ?schema,
                extra_fields = extra,
                "ignoring fields beyond the declared layout"
            );
        }
        tracing::debug!(
            schema = ?schema,
            records = records.len(),
            "parsed tool output"
        );

        Ok(ParsedOutput { schema, records })
    }
}

fn is_header(line: &str) -> bool {
    line == HEADER_MARKER
        || line
            .strip_prefix(HEADER_MARKER)
            .map(|rest| rest.starts_with(':'))
            .unwrap_or(false)
}
