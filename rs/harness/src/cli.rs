use clap::Parser;
use std::path::PathBuf;

/// Command line shared by every test binary in the suite.
#[derive(Debug, Parser)]
pub struct CliArgs {
    /// Number of times the whole scenario is repeated.
    #[clap(short = 'i', long = "iterations", default_value_t = 1)]
    pub iterations: u32,

    /// Upper bound in seconds on any checkpoint wait before the run is
    /// declared stalled.
    #[clap(long = "stall-timeout-secs", default_value_t = 10)]
    pub stall_timeout_secs: u64,

    /// Block device to run filesystem scenarios on instead of an
    /// automatically acquired loop device. The device is reformatted.
    /// Defaults to the KTS_TEST_DEVICE environment variable.
    #[clap(long = "device")]
    pub device: Option<PathBuf>,

    /// Log at debug level.
    #[clap(short = 'v', long = "verbose")]
    pub verbose: bool,
}
