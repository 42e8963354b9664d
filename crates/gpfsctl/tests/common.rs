//! Common test utilities and fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gpfsctl::{
    CommandBuilder, CommandOutput, CommandRunner, GpfsClient, GpfsError, Invocation, PosixError,
    PosixOp, PosixOps, Result,
};

pub const FILESYSTEMS: &str = "\
# mmlsfs all -Y
HEADER:filesystem_v2
fs1:fs1:/gpfs/fs1:4194304:10T:4T:yes:yes
scratch:scratch:/gpfs/scratch:1048576:2T:1T:yes:no
";

pub const FILESETS_FS1: &str = "\
HEADER:fileset_v2
fs1:root:0:Linked:/gpfs/fs1:4000:1024:1048576:500000:
fs1:projects:3:Linked:/gpfs/fs1/projects:1200:2048:1048576:100000:research data
fs1:old:7:Unlinked:--:10:0:100000:95000:archived
";

pub const FILESETS_SCRATCH: &str = "\
HEADER:fileset_v1
scratch:root:0:Linked:/gpfs/scratch:10:0
";

pub const QUOTA_FS1: &str = "\
HEADER:quota_v2
fs1:USR:2540:alice:1048576:10485760:11010048:0:none:120:0:0:0:none::projects
fs1:USR:2541:bob:20971520:10485760:11010048:0:5 days:10:0:0:0:none::
fs1:GRP:100:staff:0:0:0:0:none:600:500:1000:0:expired::
fs1:FILESET:3:projects:2048:0:0:0:none:1200:0:0:0:none::
";

pub const GRACE_FS1: &str = "\
HEADER:grace_v1
fs1:USR:7 days:7 days
fs1:GRP:7 days:1 day
fs1:FILESET:none:12 hours
";

pub const SNAPSHOTS_FS1: &str = "\
HEADER:snapshot_v1
fs1:autumn_20151012:1517:Valid:Mon Oct 12 14\\:24\\:41 2015:
fs1:okt_20151028:1518:Valid:Wed Oct 28 11\\:34\\:06 2015:
";

type Handler = dyn Fn(&Invocation) -> Result<CommandOutput> + Send + Sync;

/// Runner answering from a closure and recording every invocation.
pub struct ScriptedRunner {
    handler: Box<Handler>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Invocation) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Canned cluster: listings succeed, writes succeed with empty output.
    pub fn cluster() -> Self {
        Self::new(cluster_response)
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations of `program` only.
    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| inv.program == program)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        tokio::task::yield_now().await;
        (self.handler)(invocation)
    }
}

/// Responses of a small healthy cluster.
pub fn cluster_response(inv: &Invocation) -> Result<CommandOutput> {
    let args: Vec<&str> = inv.args.iter().map(String::as_str).collect();
    match (inv.program.as_str(), args.as_slice()) {
        ("mmlsfs", _) => Ok(CommandOutput::success(FILESYSTEMS)),
        ("mmlsfileset", ["fs1", ..]) => Ok(CommandOutput::success(FILESETS_FS1)),
        ("mmlsfileset", ["scratch", ..]) => Ok(CommandOutput::success(FILESETS_SCRATCH)),
        ("mmrepquota", ["-Y", "-n", "fs1"]) => Ok(CommandOutput::success(QUOTA_FS1)),
        ("mmrepquota", ["-Y", "-t", "fs1"]) => Ok(CommandOutput::success(GRACE_FS1)),
        ("mmlssnapshot", ["fs1", "-Y"]) => Ok(CommandOutput::success(SNAPSHOTS_FS1)),
        ("mmlssnapshot", ["scratch", "-Y"]) => Err(GpfsError::CommandExecution {
            command: inv.render(),
            exit_code: 1,
            stderr: "No snapshots in file system scratch".to_string(),
        }),
        ("mmcrfileset", _)
        | ("mmlinkfileset", _)
        | ("mmsetquota", _)
        | ("mmcrsnapshot", _)
        | ("mmdelsnapshot", _) => Ok(CommandOutput::success("")),
        _ => Err(GpfsError::CommandExecution {
            command: inv.render(),
            exit_code: 1,
            stderr: "unexpected invocation".to_string(),
        }),
    }
}

/// In-memory POSIX collaborator.
#[derive(Default)]
pub struct FakePosix {
    existing: Mutex<HashSet<PathBuf>>,
    chowned: Mutex<Vec<(PathBuf, Option<u32>, Option<u32>)>>,
}

impl FakePosix {
    pub fn with_paths(paths: &[&str]) -> Self {
        let posix = Self::default();
        posix
            .existing
            .lock()
            .unwrap()
            .extend(paths.iter().map(PathBuf::from));
        posix
    }

    pub fn chowned(&self) -> Vec<(PathBuf, Option<u32>, Option<u32>)> {
        self.chowned.lock().unwrap().clone()
    }
}

#[async_trait]
impl PosixOps for FakePosix {
    async fn exists(&self, path: &Path) -> std::result::Result<bool, PosixError> {
        Ok(self.existing.lock().unwrap().contains(path))
    }

    async fn make_directory(&self, path: &Path) -> std::result::Result<(), PosixError> {
        let mut existing = self.existing.lock().unwrap();
        if !existing.insert(path.to_path_buf()) {
            return Err(PosixError::from_io(
                PosixOp::MakeDirectory,
                path,
                std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            ));
        }
        Ok(())
    }

    async fn change_ownership(
        &self,
        path: &Path,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> std::result::Result<(), PosixError> {
        self.chowned
            .lock()
            .unwrap()
            .push((path.to_path_buf(), uid, gid));
        Ok(())
    }
}

/// Client over the given runner and POSIX fake.
pub fn client(runner: Arc<ScriptedRunner>, posix: Arc<FakePosix>, dry_run: bool) -> GpfsClient {
    GpfsClient::with_parts(runner, posix, CommandBuilder::default(), dry_run)
}
