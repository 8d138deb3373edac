use anyhow::{Context, Result};
use slog::Logger;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use crate::cli::CliArgs;

/// Environment variable naming a block device to use instead of an
/// automatically acquired loop device.
pub const DEVICE_ENV: &str = "KTS_TEST_DEVICE";

/// Per-run context handed to setup and test functions: the logger, a scratch
/// directory that disappears with the run, and the effective options.
pub struct TestEnv {
    logger: Logger,
    scratch: TempDir,
    iterations: u32,
    stall_timeout: Duration,
    device_override: Option<PathBuf>,
}

impl TestEnv {
    pub fn new(
        logger: Logger,
        iterations: u32,
        stall_timeout: Duration,
        device_override: Option<PathBuf>,
    ) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("kts")
            .tempdir()
            .context("failed to create scratch directory")?;
        Ok(Self {
            logger,
            scratch,
            iterations,
            stall_timeout,
            device_override,
        })
    }

    /// Builds the environment from parsed CLI args. The device override
    /// falls back to [`DEVICE_ENV`] when the flag is absent.
    pub fn from_args(logger: Logger, args: &CliArgs) -> Result<Self> {
        let device_override = args
            .device
            .clone()
            .or_else(|| std::env::var_os(DEVICE_ENV).map(PathBuf::from));
        Self::new(
            logger,
            args.iterations,
            Duration::from_secs(args.stall_timeout_secs),
            device_override,
        )
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn stall_timeout(&self) -> Duration {
        self.stall_timeout
    }

    pub fn device_override(&self) -> Option<&Path> {
        self.device_override.as_deref()
    }
}
