//! Error types for the GPFS control-plane client.

use std::time::Duration;

use thiserror::Error;

use crate::posix::PosixError;

/// Result type alias for gpfsctl operations.
pub type Result<T> = std::result::Result<T, GpfsError>;

/// Error variants for parsing, command construction and execution.
///
/// Every variant carries the raw context an operator needs to diagnose the
/// failure without re-running the tool.
#[derive(Debug, Error)]
pub enum GpfsError {
    /// A line of tool output does not fit the expected layout.
    #[error("Malformed record at line {line_no}: {reason} (line: {line:?})")]
    MalformedRecord {
        /// 1-based line number within the command output.
        line_no: usize,
        /// The offending raw line.
        line: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A field value could not be converted to its typed representation.
    #[error("Cannot coerce field {field} value {raw:?} to {expected}")]
    FieldCoercion {
        /// Name of the field in the record layout.
        field: String,
        /// The raw value as found in the output.
        raw: String,
        /// Description of the expected type.
        expected: String,
    },

    /// A command parameter is missing, out of range or unsafe.
    #[error("Invalid parameter {parameter} for {operation}: {reason}")]
    InvalidParameter {
        /// The operation being built.
        operation: String,
        /// The parameter at fault.
        parameter: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The tool ran and exited with a non-zero status.
    #[error("Command `{command}` failed with exit code {exit_code}: {stderr}")]
    CommandExecution {
        /// Rendered command line.
        command: String,
        /// Exit code reported by the tool (-1 when killed by a signal).
        exit_code: i32,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The tool could not be started at all.
    #[error("Tool {tool} unavailable: {reason}")]
    ToolUnavailable {
        /// Resolved path of the tool.
        tool: String,
        /// Not found, permission denied, ...
        reason: String,
    },

    /// The tool did not finish within the configured timeout and was killed.
    #[error("Command `{command}` timed out after {timeout:?}")]
    CommandTimeout {
        /// Rendered command line.
        command: String,
        /// The timeout that expired.
        timeout: Duration,
    },

    /// The tool wrote output that is not valid UTF-8.
    #[error("Command `{command}` wrote invalid UTF-8 on {stream}: {output:?}")]
    InvalidOutput {
        /// Rendered command line.
        command: String,
        /// `stdout` or `stderr`.
        stream: &'static str,
        /// The output with invalid sequences replaced, for diagnosis only.
        output: String,
    },

    /// A lookup in the catalog or in a listing found nothing.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Entity kind (filesystem, fileset, ...).
        kind: &'static str,
        /// The name or path looked up.
        name: String,
    },

    /// The POSIX collaborator failed.
    #[error(transparent)]
    Posix(#[from] PosixError),
}

impl GpfsError {
    pub(crate) fn invalid(operation: &str, parameter: &str, reason: impl Into<String>) -> Self {
        GpfsError::InvalidParameter {
            operation: operation.to_string(),
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn coercion(field: &str, raw: &str, expected: &str) -> Self {
        GpfsError::FieldCoercion {
            field: field.to_string(),
            raw: raw.to_string(),
            expected: expected.to_string(),
        }
    }

    /// True for problems with the local setup (tool path, permissions)
    /// rather than with the cluster operation itself.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, GpfsError::ToolUnavailable { .. })
    }

    /// Exit code of the failed tool invocation, if this is an execution error.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            GpfsError::CommandExecution { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
