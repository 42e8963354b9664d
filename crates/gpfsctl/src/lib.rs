#![warn(missing_docs)]

//! gpfsctl: GPFS control-plane client. Parses versioned `-Y` tool output into
//! typed entities, builds and runs administrative commands with timeouts, and
//! caches filesystems and filesets in an explicitly refreshed catalog.

pub mod catalog;
pub mod cli;
pub mod client;
pub mod coerce;
pub mod command;
pub mod config;
pub mod entities;
pub mod error;
pub mod exec;
pub mod mapper;
pub mod posix;
pub mod record;
pub mod schema;

pub use catalog::{Catalog, CatalogSnapshot, CatalogState};
pub use client::{CreateFilesetRequest, GpfsClient, WriteOutcome};
pub use command::{CommandBuilder, InodeSpace, Invocation, Operation};
pub use config::GpfsConfig;
pub use entities::{
    Fileset, FilesetState, Filesystem, GraceDuration, GracePeriod, GraceState, InodeCritical,
    Limits, Quota, QuotaKind, QuotaScope, Snapshot, INODE_CRITICAL_THRESHOLD,
};
pub use error::{GpfsError, Result};
pub use exec::{CommandOutput, CommandRunner, ExecConfig, ProcessRunner};
pub use posix::{LocalPosix, PosixError, PosixErrorKind, PosixOp, PosixOps};
pub use record::{OutputParser, ParsedOutput, Record};
pub use schema::{SchemaKind, SchemaVersion};
