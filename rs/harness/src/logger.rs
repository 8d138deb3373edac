use slog::{o, Drain, Logger};

/// Builds the root logger for a test binary.
///
/// The drain is synchronous on purpose: the scenarios fork, and a forking
/// process must not carry logger threads into the child.
pub fn mk_logger(verbose: bool) -> Logger {
    let level = if verbose {
        slog::Level::Debug
    } else {
        slog::Level::Info
    };
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    Logger::root(
        slog_term::FullFormat::new(plain)
            .build()
            .filter_level(level)
            .fuse(),
        o!(),
    )
}

/// A logger that discards everything. Used in unit tests.
pub fn no_op_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}
