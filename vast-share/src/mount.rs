//! Local command execution for soft-deleting share data.
//!
//! Shell commands are used for mount, mkdir and mv, the same way the rest of
//! the stack shells out for storage operations.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, ShareError};

/// Runs OS commands on behalf of the reconciler.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, failing on a non-zero exit status.
    async fn run(&self, program: &str, args: &[String], as_root: bool) -> Result<()>;
}

/// Runs commands through `tokio::process`, prefixing privileged ones with a
/// root helper such as `sudo`.
pub struct ShellRunner {
    root_helper: Vec<String>,
}

impl ShellRunner {
    pub fn new(root_helper: &str) -> Self {
        Self {
            root_helper: root_helper.split_whitespace().map(str::to_string).collect(),
        }
    }

    fn command_line(&self, program: &str, args: &[String], as_root: bool) -> Vec<String> {
        let mut line = Vec::with_capacity(args.len() + 2);
        if as_root {
            line.extend(self.root_helper.iter().cloned());
        }
        line.push(program.to_string());
        line.extend(args.iter().cloned());
        line
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, program: &str, args: &[String], as_root: bool) -> Result<()> {
        let line = self.command_line(program, args, as_root);
        let command = line.join(" ");
        debug!(command = %command, "Running command");

        let output = Command::new(&line[0])
            .args(&line[1..])
            .output()
            .await
            .map_err(|source| ShareError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ShareError::Command { command, stderr });
        }

        Ok(())
    }
}

/// Move a share's directory aside on a mounted root export.
///
/// `mount_point` must be empty or absent; it is created, used and removed
/// again on every path. A failure while moving takes precedence over a
/// failure while unmounting.
pub async fn soft_delete(
    runner: &dyn CommandRunner,
    source: &str,
    mount_point: &str,
    share_dir: &str,
    share_id: &str,
) -> Result<()> {
    runner
        .run("mkdir", &["-p".to_string(), mount_point.to_string()], false)
        .await?;
    let mounted = runner
        .run(
            "mount",
            &[
                "-t".to_string(),
                "nfs".to_string(),
                source.to_string(),
                mount_point.to_string(),
            ],
            true,
        )
        .await;
    if let Err(e) = mounted {
        if let Err(cleanup) = runner.run("rmdir", &[mount_point.to_string()], false).await {
            warn!(mount_point = %mount_point, error = %cleanup, "Failed to remove mount point");
        }
        return Err(e);
    }
    info!(source = %source, mount_point = %mount_point, "Mounted root export");

    let moved = move_to_trash(runner, mount_point, share_dir, share_id).await;
    let released = release(runner, mount_point).await;

    moved?;
    released
}

async fn move_to_trash(
    runner: &dyn CommandRunner,
    mount_point: &str,
    share_dir: &str,
    share_id: &str,
) -> Result<()> {
    let trash = format!("{mount_point}/deleted");
    let src = format!("{mount_point}/{share_dir}");
    let dst = format!("{trash}/{share_id}");

    runner.run("mkdir", &["-p".to_string(), trash], true).await?;
    runner.run("mv", &[src.clone(), dst.clone()], true).await?;
    info!(src = %src, dst = %dst, "Moved share data to trash");
    Ok(())
}

async fn release(runner: &dyn CommandRunner, mount_point: &str) -> Result<()> {
    runner
        .run("umount", &[mount_point.to_string()], true)
        .await?;
    runner
        .run("rmdir", &[mount_point.to_string()], true)
        .await
}
