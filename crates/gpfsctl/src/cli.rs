use crate::client::{CreateFilesetRequest, GpfsClient, WriteOutcome};
use crate::coerce::{parse_size, SizeUnit};
use crate::command::{InodeSpace, SetGrace, SetQuota};
use crate::config::GpfsConfig;
use crate::entities::{
    Fileset, FilesetState, Filesystem, GraceDuration, GracePeriod, GraceState, InodeCritical, Quota,
    QuotaKind, Snapshot, INODE_CRITICAL_THRESHOLD,
};
use crate::mapper::{parse_grace_duration, parse_quota_kind};
use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gpfsctl")]
#[command(about = "GPFS filesystem, fileset and quota administration", long_about = None)]
pub struct Cli {
    #[arg(short, long, env = "GPFSCTL_CONFIG", default_value = "/etc/gpfsctl/gpfsctl.toml")]
    pub config: PathBuf,

    /// Directory holding the mm* administration tools.
    #[arg(long)]
    pub tool_dir: Option<PathBuf>,

    /// Per-command timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Log write commands instead of running them.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(short, long)]
    pub verbose: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    Filesystems {
        /// Only filesystems mounted automatically.
        #[arg(long)]
        automount: bool,
    },
    Filesets {
        filesystem: String,
        names: Vec<String>,
    },
    Quota {
        filesystem: String,
    },
    OverQuota {
        filesystem: String,
    },
    Grace {
        filesystem: String,
    },
    CreateFileset {
        junction: PathBuf,
        #[arg(long)]
        name: Option<String>,
        /// Share the inode space of this fileset instead of creating one.
        #[arg(long, conflicts_with_all = ["max_inodes", "prealloc"])]
        parent: Option<String>,
        #[arg(long)]
        max_inodes: Option<u64>,
        #[arg(long)]
        prealloc: Option<u64>,
        #[arg(long)]
        owner: Option<u32>,
        #[arg(long)]
        group: Option<u32>,
        /// Create the junction's parent directory if missing.
        #[arg(long)]
        create_parent: bool,
    },
    SetQuota {
        filesystem: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        fileset: Option<String>,
        /// Scope a user or group quota to this fileset.
        #[arg(long)]
        in_fileset: Option<String>,
        #[arg(long, value_parser = parse_size_arg, allow_hyphen_values = true)]
        block_soft: Option<i64>,
        #[arg(long, value_parser = parse_size_arg, allow_hyphen_values = true)]
        block_hard: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        files_soft: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        files_hard: Option<i64>,
    },
    SetGrace {
        filesystem: String,
        #[arg(long, value_parser = parse_kind_arg)]
        kind: QuotaKind,
        #[arg(long, value_parser = parse_grace_arg)]
        block: Option<GraceDuration>,
        #[arg(long, value_parser = parse_grace_arg)]
        files: Option<GraceDuration>,
    },
    /// Filesets whose allocated inodes are close to the inode limit.
    InodeCritical {
        filesystem: String,
        /// Fraction of the inode limit, in (0, 1].
        #[arg(long, default_value_t = INODE_CRITICAL_THRESHOLD)]
        threshold: f64,
    },
    Snapshots {
        filesystem: String,
    },
    CreateSnapshot {
        filesystem: String,
        name: String,
    },
    DeleteSnapshot {
        filesystem: String,
        name: String,
    },
}

/// Size in bytes with an optional K/M/G/T/P suffix; a leading `-` is kept
/// so negative limits reach request validation.
fn parse_size_arg(raw: &str) -> std::result::Result<i64, String> {
    let (negative, magnitude) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let bytes = parse_size("size", magnitude, SizeUnit::Bytes)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "empty size".to_string())?;
    let bytes = i64::try_from(bytes).map_err(|_| format!("{} is too large", raw))?;
    Ok(if negative { -bytes } else { bytes })
}

fn parse_kind_arg(raw: &str) -> std::result::Result<QuotaKind, String> {
    parse_quota_kind("kind", raw).map_err(|e| e.to_string())
}

fn parse_grace_arg(raw: &str) -> std::result::Result<GraceDuration, String> {
    parse_grace_duration("grace", raw).map_err(|e| e.to_string())
}

impl Cli {
    /// Configuration file (defaults when absent) with command-line overrides applied.
    pub fn load_config(&self) -> Result<GpfsConfig> {
        let mut config = if self.config.exists() {
            GpfsConfig::from_file(&self.config)?
        } else {
            tracing::warn!("Config file not found, using defaults: {}", self.config.display());
            GpfsConfig::default()
        };
        if let Some(dir) = &self.tool_dir {
            config.tool_dir = dir.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        config.dry_run |= self.dry_run;
        config.validate()?;
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let client = GpfsClient::new(&config);
        self.execute(&client).await
    }

    /// Runs the subcommand against `client`.
    pub async fn execute(&self, client: &GpfsClient) -> Result<()> {
        match &self.command {
            Command::Filesystems { automount } => {
                let filesystems = if *automount {
                    client.refresh().await?;
                    client.catalog().automount_filesystems().await
                } else {
                    client.list_filesystems().await?
                };
                self.emit(&filesystems, print_filesystems)
            }
            Command::Filesets { filesystem, names } => {
                client.refresh().await?;
                let filesets = client.list_filesets(filesystem, names).await?;
                self.emit(&filesets, print_filesets)
            }
            Command::Quota { filesystem } => {
                client.refresh().await?;
                let quotas = client.list_quota(filesystem).await?;
                self.emit(&quotas, print_quotas)
            }
            Command::OverQuota { filesystem } => {
                client.refresh().await?;
                let quotas = client.over_quota(filesystem).await?;
                self.emit(&quotas, print_quotas)
            }
            Command::Grace { filesystem } => {
                client.refresh().await?;
                let grace = client.list_grace(filesystem).await?;
                self.emit(&grace, print_grace)
            }
            Command::CreateFileset {
                junction,
                name,
                parent,
                max_inodes,
                prealloc,
                owner,
                group,
                create_parent,
            } => {
                client.refresh().await?;
                let inode_space = match parent {
                    Some(parent) => InodeSpace::Shared {
                        parent: parent.clone(),
                    },
                    None => InodeSpace::New {
                        max_inodes: *max_inodes,
                        prealloc: *prealloc,
                    },
                };
                let outcome = client
                    .create_fileset(CreateFilesetRequest {
                        junction: junction.clone(),
                        name: name.clone(),
                        inode_space,
                        owner: *owner,
                        group: *group,
                        create_parent: *create_parent,
                    })
                    .await?;
                self.emit(&outcome, print_outcome)
            }
            Command::SetQuota {
                filesystem,
                user,
                group,
                fileset,
                in_fileset,
                block_soft,
                block_hard,
                files_soft,
                files_hard,
            } => {
                client.refresh().await?;
                let outcome = client
                    .set_quota(SetQuota {
                        device: filesystem.clone(),
                        user: user.clone(),
                        group: group.clone(),
                        fileset: fileset.clone(),
                        in_fileset: in_fileset.clone(),
                        block_soft: *block_soft,
                        block_hard: *block_hard,
                        files_soft: *files_soft,
                        files_hard: *files_hard,
                    })
                    .await?;
                self.emit(&outcome, print_outcome)
            }
            Command::SetGrace {
                filesystem,
                kind,
                block,
                files,
            } => {
                client.refresh().await?;
                let outcome = client
                    .set_grace(SetGrace {
                        device: filesystem.clone(),
                        kind: *kind,
                        block: *block,
                        files: *files,
                    })
                    .await?;
                self.emit(&outcome, print_outcome)
            }
            Command::InodeCritical {
                filesystem,
                threshold,
            } => {
                client.refresh().await?;
                let critical = client.inode_critical(filesystem, *threshold).await?;
                self.emit(&critical, print_inode_critical)
            }
            Command::Snapshots { filesystem } => {
                client.refresh().await?;
                let snapshots = client.list_snapshots(filesystem).await?;
                self.emit(&snapshots, print_snapshots)
            }
            Command::CreateSnapshot { filesystem, name } => {
                client.refresh().await?;
                let outcome = client.create_snapshot(filesystem, name).await?;
                self.emit(&outcome, print_outcome)
            }
            Command::DeleteSnapshot { filesystem, name } => {
                client.refresh().await?;
                let outcome = client.delete_snapshot(filesystem, name).await?;
                self.emit(&outcome, print_outcome)
            }
        }
    }

    fn emit<T: Serialize + ?Sized>(&self, value: &T, text: fn(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

fn print_filesystems(filesystems: &Vec<Filesystem>) {
    println!(
        "{:<16} {:<24} {:>12} {:>12} {:>6}",
        "NAME", "MOUNTPOINT", "SIZE", "FREE", "USED%"
    );
    for fs in filesystems {
        println!(
            "{:<16} {:<24} {:>12} {:>12} {:>5.1}%",
            fs.name,
            fs.mountpoint,
            format_bytes(fs.total_bytes),
            format_bytes(fs.free_bytes),
            fs.usage_percent()
        );
    }
}

fn print_filesets(filesets: &Vec<Fileset>) {
    println!(
        "{:<24} {:>6} {:<9} {:>12} {:<}",
        "NAME", "ID", "STATE", "DATA", "JUNCTION"
    );
    for fset in filesets {
        let state = match fset.state {
            FilesetState::Enabled => "linked",
            FilesetState::Disabled => "unlinked",
            FilesetState::Deleted => "deleted",
        };
        println!(
            "{:<24} {:>6} {:<9} {:>12} {}",
            fset.name,
            fset.id,
            state,
            fset.data_bytes.map(format_bytes).unwrap_or_else(|| "-".to_string()),
            fset.junction.as_deref().unwrap_or("-")
        );
    }
}

fn format_grace(grace: &GraceState) -> String {
    match grace {
        GraceState::NotStarted => "none".to_string(),
        GraceState::Expired => "expired".to_string(),
        GraceState::Remaining(d) if d.as_secs() >= 86_400 => format!("{} days", d.as_secs() / 86_400),
        GraceState::Remaining(d) if d.as_secs() >= 3_600 => format!("{} hours", d.as_secs() / 3_600),
        GraceState::Remaining(d) if d.as_secs() >= 60 => format!("{} minutes", d.as_secs() / 60),
        GraceState::Remaining(d) => format!("{} seconds", d.as_secs()),
    }
}

fn limit(value: Option<u64>, bytes: bool) -> String {
    match value {
        None | Some(0) => "-".to_string(),
        Some(v) if bytes => format_bytes(v),
        Some(v) => v.to_string(),
    }
}

fn print_quotas(quotas: &Vec<Quota>) {
    println!(
        "{:<8} {:<20} {:>12} {:>12} {:>12} {:>10} {:>10} {:>10} {:>10}",
        "TYPE", "NAME", "USED", "SOFT", "HARD", "GRACE", "FILES", "FSOFT", "FGRACE"
    );
    for q in quotas {
        println!(
            "{:<8} {:<20} {:>12} {:>12} {:>12} {:>10} {:>10} {:>10} {:>10}",
            q.scope.kind().to_string(),
            q.scope.label(),
            limit(q.blocks.usage, true),
            limit(q.blocks.soft, true),
            limit(q.blocks.hard, true),
            format_grace(&q.blocks.grace),
            q.files.usage.unwrap_or(0),
            limit(q.files.soft, false),
            format_grace(&q.files.grace),
        );
    }
}

fn print_grace(periods: &Vec<GracePeriod>) {
    println!("{:<16} {:<8} {:>10} {:>10}", "FILESYSTEM", "TYPE", "BLOCK", "FILES");
    for g in periods {
        println!(
            "{:<16} {:<8} {:>10} {:>10}",
            g.filesystem,
            g.kind.to_string(),
            g.block.to_string(),
            g.files.to_string()
        );
    }
}

fn print_inode_critical(critical: &Vec<InodeCritical>) {
    println!(
        "{:<16} {:<24} {:>12} {:>12} {:>6}",
        "FILESYSTEM", "FILESET", "ALLOCATED", "MAX", "USED%"
    );
    for c in critical {
        println!(
            "{:<16} {:<24} {:>12} {:>12} {:>5}%",
            c.filesystem,
            c.fileset,
            c.allocated,
            c.max_inodes,
            c.percent()
        );
    }
}

fn print_snapshots(snapshots: &Vec<Snapshot>) {
    println!("{:<24} {:>6} {:<12} {:<16} CREATED", "NAME", "ID", "STATUS", "FILESET");
    for snap in snapshots {
        println!(
            "{:<24} {:>6} {:<12} {:<16} {}",
            snap.name,
            snap.id,
            snap.status,
            snap.fileset.as_deref().unwrap_or("-"),
            snap.created.as_deref().unwrap_or("-")
        );
    }
}

fn print_outcome(outcome: &WriteOutcome) {
    let prefix = if outcome.executed { "ran" } else { "dry run" };
    for inv in &outcome.invocations {
        println!("{}: {}", prefix, inv);
    }
}

/// Human-readable size in powers of 1024.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;
    const PB: u64 = TB * 1024;

    if bytes >= PB {
        format!("{:.2} PB", bytes as f64 / PB as f64)
    } else if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
