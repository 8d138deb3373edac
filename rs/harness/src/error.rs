use thiserror::Error;

/// The business verdict of a scenario. `Failed` means the kernel misbehaved
/// in exactly the way the test is designed to detect; it is a result, not an
/// error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
}

/// Conditions that are not verdicts. `Config` means the environment cannot
/// host the scenario (missing privileges, tools or memory) and the test is
/// skipped. `Internal` means the harness or the scenario itself broke;
/// whatever the kernel did remains unknown.
#[derive(Debug, Error)]
pub enum Failure {
    #[error("unsupported configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Failure {
    pub fn config<S: Into<String>>(reason: S) -> Self {
        Self::Config(reason.into())
    }
}

/// What every scenario function returns: a verdict, or a reason it could not
/// produce one.
pub type TestResult = std::result::Result<Outcome, Failure>;
