use anyhow::anyhow;
use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::convert::Infallible;
use std::fmt;

use crate::error::Failure;

/// How a scenario child terminated. Scenarios classify this into a verdict;
/// any shape they do not expect is a harness failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildStatus {
    Exited(i32),
    Signaled(Signal),
}

impl fmt::Display for ChildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildStatus::Exited(code) => write!(f, "exited with status {}", code),
            ChildStatus::Signaled(sig) => write!(f, "killed by {}", sig),
        }
    }
}

/// Terminates the calling process immediately, without running libc atexit
/// handlers or Rust destructors. The only correct way for a forked scenario
/// child to stop.
pub fn exit_child(code: i32) -> ! {
    unsafe { libc::_exit(code) }
}

/// Restores the default disposition of `sig` in the calling process.
///
/// A scenario child that expects the kernel to kill it with a fault signal
/// must undo any handler it inherited, or the death would be masked.
pub fn reset_signal_default(sig: Signal) -> nix::Result<()> {
    unsafe { signal(sig, SigHandler::SigDfl) }.map(|_| ())
}

/// Forks and runs `child_fn` in the child; the parent returns the child's
/// pid. `child_fn` never returns, it must terminate the process through
/// [`exit_child`]; diverging closures coerce to the `Infallible` bound.
///
/// The caller must be effectively single-threaded. The harness keeps every
/// test process that way: synchronous logging, no worker threads.
pub fn fork_scenario_child<F: FnOnce() -> Infallible>(child_fn: F) -> Result<Pid, Failure> {
    match unsafe { fork() }.map_err(|e| Failure::Internal(anyhow!("fork failed: {}", e)))? {
        ForkResult::Child => match child_fn() {},
        ForkResult::Parent { child } => Ok(child),
    }
}

/// Blocks until the child terminates and reports how. Stopped or continued
/// children are not expected here and surface as internal failures.
pub fn await_child(pid: Pid) -> Result<ChildStatus, Failure> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ChildStatus::Exited(code)),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(ChildStatus::Signaled(sig)),
            Ok(other) => {
                return Err(Failure::Internal(anyhow!(
                    "unexpected wait status for child {}: {:?}",
                    pid,
                    other
                )))
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                return Err(Failure::Internal(anyhow!("waitpid({}) failed: {}", pid, e)))
            }
        }
    }
}
