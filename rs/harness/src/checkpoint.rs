use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use nix::unistd::{close, pipe, read, write};
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::error::Failure;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint wait timed out after {0:?}")]
    TimedOut(Duration),
    #[error("checkpoint peer closed its end")]
    PeerClosed,
    #[error("checkpoint syscall failed: {0}")]
    Sys(#[from] Errno),
}

impl From<CheckpointError> for Failure {
    fn from(e: CheckpointError) -> Self {
        Failure::Internal(e.into())
    }
}

/// A one-shot, one-direction synchronization point built on a pipe.
///
/// Created before a fork and then held by both processes: the signaling side
/// writes one byte, the waiting side consumes it. The byte is buffered by
/// the kernel, so signal-then-wait ordering races are benign. All operations
/// used on the child side (write, poll, read) are async-signal-safe.
#[derive(Debug)]
pub struct Checkpoint {
    rd: RawFd,
    wr: RawFd,
}

impl Checkpoint {
    pub fn new() -> Result<Self, CheckpointError> {
        let (rd, wr) = pipe()?;
        Ok(Self { rd, wr })
    }

    /// Marks the checkpoint as reached.
    pub fn signal(&self) -> Result<(), CheckpointError> {
        loop {
            match write(self.wr, &[1u8]) {
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(CheckpointError::Sys(e)),
            }
        }
    }

    /// Blocks until the peer signals, for at most `timeout`. A timeout means
    /// the peer is stuck or dead; the caller must treat it as fatal.
    pub fn wait(&self, timeout: Duration) -> Result<(), CheckpointError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut fds = [PollFd::new(self.rd, PollFlags::POLLIN)];
            match poll(&mut fds, poll_millis(remaining)) {
                Ok(0) => return Err(CheckpointError::TimedOut(timeout)),
                Ok(_) => {
                    let revents = fds[0].revents().unwrap_or_else(PollFlags::empty);
                    if revents.contains(PollFlags::POLLIN) {
                        // A byte is ready; consume it below.
                    } else if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR) {
                        return Err(CheckpointError::PeerClosed);
                    } else {
                        continue;
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(CheckpointError::Sys(e)),
            }
            let mut byte = [0u8; 1];
            return match read(self.rd, &mut byte) {
                Ok(0) => Err(CheckpointError::PeerClosed),
                Ok(_) => Ok(()),
                Err(Errno::EINTR) => continue,
                Err(e) => Err(CheckpointError::Sys(e)),
            };
        }
    }
}

impl Drop for Checkpoint {
    fn drop(&mut self) {
        // Both processes close their copies independently after the fork.
        let _ = close(self.rd);
        let _ = close(self.wr);
    }
}

fn poll_millis(remaining: Duration) -> i32 {
    if remaining.is_zero() {
        return 0;
    }
    remaining.as_millis().clamp(1, i32::MAX as u128) as i32
}

/// The two-phase handshake of the delayed-allocation scenario: the child
/// announces that its mapping is in place (phase 1), the parent releases it
/// to touch memory once the filesystem is full (phase 2).
///
/// Created fresh for every iteration, so no stale signal can leak from a
/// previous run.
#[derive(Debug)]
pub struct Rendezvous {
    ready: Checkpoint,
    proceed: Checkpoint,
}

impl Rendezvous {
    pub fn create() -> Result<Self, CheckpointError> {
        Ok(Self {
            ready: Checkpoint::new()?,
            proceed: Checkpoint::new()?,
        })
    }

    /// Child side, phase 1.
    pub fn signal_ready(&self) -> Result<(), CheckpointError> {
        self.ready.signal()
    }

    /// Parent side, phase 1.
    pub fn wait_ready(&self, timeout: Duration) -> Result<(), CheckpointError> {
        self.ready.wait(timeout)
    }

    /// Parent side, phase 2.
    pub fn signal_proceed(&self) -> Result<(), CheckpointError> {
        self.proceed.signal()
    }

    /// Child side, phase 2.
    pub fn wait_proceed(&self, timeout: Duration) -> Result<(), CheckpointError> {
        self.proceed.wait(timeout)
    }
}
