use anyhow::{anyhow, Context};
use nix::mount::{mount, umount, MsFlags};
use nix::unistd::getuid;
use slog::{info, warn, Logger};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::env::TestEnv;
use crate::error::Failure;

/// Size of the sparse file backing an acquired loop device. Small enough
/// that an exhaustion loop finishes in well under a second.
pub const DEFAULT_DEVICE_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("`{0}` is not installed")]
    NotInstalled(String),
    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        source: io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Runs an external administration tool, capturing its output. Stdout is
/// returned trimmed; a nonzero exit becomes an error carrying stderr.
fn run_tool(program: &str, args: &[&str]) -> Result<String, ToolError> {
    let command = format!("{} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ToolError::NotInstalled(program.to_string())
            } else {
                ToolError::Io {
                    command: command.clone(),
                    source,
                }
            }
        })?;
    if !output.status.success() {
        return Err(ToolError::Failed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Fails with a `Config` error unless running as root. Filesystem scenarios
/// attach devices and mount, which needs CAP_SYS_ADMIN.
pub fn require_root() -> Result<(), Failure> {
    if !getuid().is_root() {
        return Err(Failure::config("this test must run as root"));
    }
    Ok(())
}

/// A block device held for one run: either a loop device attached to a
/// sparse backing file (detached on drop), or a caller-provided device that
/// is left attached on drop.
pub struct BlockDevice {
    path: PathBuf,
    detach_on_drop: bool,
    logger: Logger,
}

impl BlockDevice {
    /// Uses the configured override device when present; otherwise creates
    /// a sparse backing file in the scratch directory and attaches it to a
    /// free loop device. A missing `losetup` is a configuration skip.
    pub fn acquire(env: &TestEnv, size: u64) -> Result<Self, Failure> {
        if let Some(dev) = env.device_override() {
            info!(
                env.logger(),
                "using configured test device {}",
                dev.display()
            );
            return Ok(Self {
                path: dev.to_path_buf(),
                detach_on_drop: false,
                logger: env.logger().clone(),
            });
        }

        let backing = env.scratch_dir().join("backing.img");
        let f = File::create(&backing)
            .with_context(|| format!("failed to create {}", backing.display()))?;
        f.set_len(size)
            .with_context(|| format!("failed to size {}", backing.display()))?;

        let backing_str = backing.to_string_lossy();
        let path = match run_tool("losetup", &["--find", "--show", &backing_str]) {
            Ok(out) => PathBuf::from(out),
            Err(e @ ToolError::NotInstalled(_)) => return Err(Failure::config(e.to_string())),
            Err(e) => return Err(Failure::Internal(e.into())),
        };
        info!(
            env.logger(),
            "attached {} ({} bytes) to {}",
            backing.display(),
            size,
            path.display()
        );
        Ok(Self {
            path,
            detach_on_drop: true,
            logger: env.logger().clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BlockDevice {
    fn drop(&mut self) {
        if !self.detach_on_drop {
            return;
        }
        let path = self.path.to_string_lossy();
        if let Err(e) = run_tool("losetup", &["-d", &path]) {
            warn!(self.logger, "failed to detach {}: {}", path, e);
        }
    }
}

/// Formats the device with `mkfs.<fs_type>`. The block size matters to the
/// delayed-allocation scenario: it must be smaller than a page so a page
/// can span unallocated blocks.
pub fn mkfs(device: &Path, fs_type: &str, block_size: usize) -> Result<(), Failure> {
    let tool = format!("mkfs.{}", fs_type);
    let block_size = block_size.to_string();
    let device_str = device.to_string_lossy();
    match run_tool(&tool, &["-F", "-q", "-b", &block_size, &device_str]) {
        Ok(_) => Ok(()),
        Err(e @ ToolError::NotInstalled(_)) => Err(Failure::config(e.to_string())),
        Err(e) => Err(Failure::Internal(
            anyhow!(e).context(format!("formatting {}", device.display())),
        )),
    }
}

/// A mounted filesystem, unmounted on drop. In structs owning both, declare
/// the `Mount` before its `BlockDevice` so the unmount precedes the detach.
pub struct Mount {
    target: PathBuf,
    logger: Logger,
}

impl Mount {
    /// Mounts `device` at `target` (created if missing) with the given
    /// filesystem type and mount data, e.g. `nodelalloc` to force block
    /// allocation at write time.
    pub fn new(
        device: &Path,
        target: &Path,
        fs_type: &str,
        data: Option<&str>,
        logger: &Logger,
    ) -> Result<Self, Failure> {
        std::fs::create_dir_all(target)
            .with_context(|| format!("failed to create mountpoint {}", target.display()))?;
        mount(Some(device), target, Some(fs_type), MsFlags::empty(), data).map_err(|e| {
            Failure::Internal(anyhow!(
                "failed to mount {} at {}: {}",
                device.display(),
                target.display(),
                e
            ))
        })?;
        info!(
            logger,
            "mounted {} at {} with data {:?}",
            device.display(),
            target.display(),
            data.unwrap_or("")
        );
        Ok(Self {
            target: target.to_path_buf(),
            logger: logger.clone(),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        if let Err(e) = umount(&self.target) {
            warn!(
                self.logger,
                "failed to unmount {}: {}",
                self.target.display(),
                e
            );
        }
    }
}
