use clap::Parser;
use slog::{error, info, warn, Logger};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use crate::cli::CliArgs;
use crate::env::TestEnv;
use crate::error::{Failure, Outcome, TestResult};
use crate::logger::mk_logger;
use crate::report::{SuiteReport, TestRecord, EXIT_BROKEN, EXIT_PASSED};

pub trait SetupFn: FnOnce(&TestEnv) -> Result<(), Failure> + 'static {}
impl<T: FnOnce(&TestEnv) -> Result<(), Failure> + 'static> SetupFn for T {}

pub trait ScenarioFn: FnOnce(&TestEnv) -> TestResult + 'static {}
impl<T: FnOnce(&TestEnv) -> TestResult + 'static> ScenarioFn for T {}

/// A named test function, as registered with a [`TestGroup`].
pub struct TestFunction {
    name: String,
    f: Box<dyn FnOnce(&TestEnv) -> TestResult>,
}

impl TestFunction {
    pub fn new<F: ScenarioFn>(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            f: Box::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Wraps a test function into a [`TestFunction`] named after its path.
#[macro_export]
macro_rules! regtest {
    ($func:path) => {
        $crate::group::TestFunction::new(std::stringify!($func), $func)
    };
}

/// The per-binary driver: an optional setup function plus the registered
/// test functions, executed sequentially with one aggregate report.
#[derive(Default)]
pub struct TestGroup {
    setup: Option<Box<dyn FnOnce(&TestEnv) -> Result<(), Failure>>>,
    tests: Vec<TestFunction>,
}

impl TestGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setup<F: SetupFn>(mut self, setup: F) -> Self {
        self.setup = Some(Box::new(setup));
        self
    }

    pub fn add_test(mut self, test: TestFunction) -> Self {
        self.tests.push(test);
        self
    }

    /// Parses the command line, runs the group and terminates the process
    /// with the aggregate result code. Returns only when every test passed.
    pub fn execute_from_args(self) -> anyhow::Result<()> {
        let args = CliArgs::parse();
        let logger = mk_logger(args.verbose);
        let code = self.run_to_exit_code(TestEnv::from_args(logger.clone(), &args), &logger);
        if code != EXIT_PASSED {
            std::process::exit(code);
        }
        Ok(())
    }

    /// Reduces a whole invocation to its process exit code. An environment
    /// that could not be prepared is a broken run, not a failed one. The
    /// environment is consumed and torn down here; the caller exits through
    /// `process::exit`, which runs no destructors.
    fn run_to_exit_code(self, env: anyhow::Result<TestEnv>, logger: &Logger) -> i32 {
        match env {
            Ok(env) => {
                let report = self.execute(&env);
                info!(logger, "\n{}", report);
                report.exit_code()
            }
            Err(e) => {
                error!(logger, "cannot prepare the test environment: {:?}", e);
                EXIT_BROKEN
            }
        }
    }

    /// Runs setup and every test against `env`, trapping panics. A setup
    /// `Config` failure skips all tests, a setup breakage voids them all.
    fn execute(self, env: &TestEnv) -> SuiteReport {
        let TestGroup { setup, tests } = self;
        let logger = env.logger().clone();
        let mut report = SuiteReport::new();

        if let Some(setup) = setup {
            match catch_unwind(AssertUnwindSafe(|| setup(env))) {
                Ok(Ok(())) => {}
                Ok(Err(Failure::Config(reason))) => {
                    warn!(logger, "setup: unsupported configuration: {}", reason);
                    for test in tests {
                        report.add(TestRecord::Skipped {
                            name: test.name,
                            reason: reason.clone(),
                        });
                    }
                    return report;
                }
                Ok(Err(Failure::Internal(e))) => {
                    error!(logger, "setup failed: {:?}", e);
                    let message = format!("setup failed: {:?}", e);
                    for test in tests {
                        report.add(TestRecord::Broken {
                            name: test.name,
                            message: message.clone(),
                        });
                    }
                    return report;
                }
                Err(panic) => {
                    let message = format!("setup panicked: {}", panic_message(&panic));
                    error!(logger, "{}", message);
                    for test in tests {
                        report.add(TestRecord::Broken {
                            name: test.name,
                            message: message.clone(),
                        });
                    }
                    return report;
                }
            }
        }

        for test in tests {
            let TestFunction { name, f } = test;
            info!(logger, "Starting test {}", name);
            let started = Instant::now();
            let result = catch_unwind(AssertUnwindSafe(|| f(env)));
            let runtime = started.elapsed();
            let record = match result {
                Ok(Ok(Outcome::Passed)) => TestRecord::Passed { name, runtime },
                Ok(Ok(Outcome::Failed(message))) => TestRecord::Failed {
                    name,
                    message,
                    runtime,
                },
                Ok(Err(Failure::Config(reason))) => TestRecord::Skipped { name, reason },
                Ok(Err(Failure::Internal(e))) => TestRecord::Broken {
                    name,
                    message: format!("{:?}", e),
                },
                Err(panic) => TestRecord::Broken {
                    name,
                    message: format!("panicked: {}", panic_message(&panic)),
                },
            };
            match &record {
                TestRecord::Passed { name, .. } => info!(logger, "Test {} PASSED", name),
                TestRecord::Failed { name, message, .. } => {
                    warn!(logger, "Test {} FAILED: {}", name, message)
                }
                TestRecord::Skipped { name, reason } => {
                    warn!(logger, "Test {} SKIPPED: {}", name, reason)
                }
                TestRecord::Broken { name, message } => {
                    error!(logger, "Test {} BROKEN: {}", name, message)
                }
            }
            report.add(record);
        }
        report
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}
