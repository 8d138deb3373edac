//! Low-level Linux helpers shared by the kernel test suite: page-size
//! discovery, scoped memory mappings, procfs access and scope guards.

pub mod fs;
pub mod mmap;
pub mod proc;

use lazy_static::lazy_static;
use nix::unistd::{sysconf, SysconfVar};

lazy_static! {
    /// The page size of the host kernel, queried once per process.
    pub static ref PAGE_SIZE: usize = sysconf(SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .map(|sz| sz as usize)
        .unwrap_or(4096);
}
