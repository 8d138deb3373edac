use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

/// Process exit codes of the suite binaries, kept compatible with the
/// classic kernel test suites so existing runners interpret them unchanged.
pub const EXIT_PASSED: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_BROKEN: i32 = 2;
pub const EXIT_SKIPPED: i32 = 32;

/// The outcome of one test function, as recorded by the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestRecord {
    Passed {
        name: String,
        runtime: Duration,
    },
    Failed {
        name: String,
        message: String,
        runtime: Duration,
    },
    Skipped {
        name: String,
        reason: String,
    },
    Broken {
        name: String,
        message: String,
    },
}

impl TestRecord {
    pub fn name(&self) -> &str {
        match self {
            TestRecord::Passed { name, .. } => name,
            TestRecord::Failed { name, .. } => name,
            TestRecord::Skipped { name, .. } => name,
            TestRecord::Broken { name, .. } => name,
        }
    }
}

/// Aggregate of all test outcomes of one binary invocation.
#[derive(Clone, Debug, Default)]
pub struct SuiteReport {
    records: Vec<TestRecord>,
}

impl SuiteReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: TestRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn is_failure_free(&self) -> bool {
        !self.records.iter().any(|r| {
            matches!(
                r,
                TestRecord::Failed { .. } | TestRecord::Broken { .. }
            )
        })
    }

    /// Maps the records to the process exit code. Broken trumps failed,
    /// failed trumps everything else; a run where nothing got to execute is
    /// a configuration skip.
    pub fn exit_code(&self) -> i32 {
        if self
            .records
            .iter()
            .any(|r| matches!(r, TestRecord::Broken { .. }))
        {
            EXIT_BROKEN
        } else if self
            .records
            .iter()
            .any(|r| matches!(r, TestRecord::Failed { .. }))
        {
            EXIT_FAILED
        } else if !self.records.is_empty()
            && self
                .records
                .iter()
                .all(|r| matches!(r, TestRecord::Skipped { .. }))
        {
            EXIT_SKIPPED
        } else {
            EXIT_PASSED
        }
    }
}

impl Display for SuiteReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        // Compute number of symbols in the longest test name.
        let w = self
            .records
            .iter()
            .map(|r| r.name().chars().count())
            .max()
            .unwrap_or(10);
        let table_width = "Test ".len() + w + "  PASSED in xxx.xxs".len();

        writeln!(f, "{:=^table_width$}", " Summary ")?;
        if self.records.is_empty() {
            writeln!(f, "No test outcomes were reported.")?;
        }
        let mut passed = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut broken = 0;
        for record in &self.records {
            match record {
                TestRecord::Passed { name, runtime } => {
                    passed += 1;
                    writeln!(
                        f,
                        "Test {:<w$}  PASSED in {:>6.2}s",
                        name,
                        runtime.as_secs_f64()
                    )?;
                }
                TestRecord::Failed {
                    name,
                    message,
                    runtime,
                } => {
                    failed += 1;
                    writeln!(
                        f,
                        "Test {:<w$}  FAILED in {:>6.2}s -- {}",
                        name,
                        runtime.as_secs_f64(),
                        message
                    )?;
                }
                TestRecord::Skipped { name, reason } => {
                    skipped += 1;
                    writeln!(f, "Test {:<w$} SKIPPED -- {}", name, reason)?;
                }
                TestRecord::Broken { name, message } => {
                    broken += 1;
                    writeln!(f, "Test {:<w$}  BROKEN -- {}", name, message)?;
                }
            }
        }
        if !self.records.is_empty() {
            writeln!(
                f,
                "{:.^table_width$}",
                format!(
                    " {} passed, {} failed, {} skipped, {} broken ",
                    passed, failed, skipped, broken
                )
            )?;
        }
        write!(f, "{:=^table_width$}", "")
    }
}
