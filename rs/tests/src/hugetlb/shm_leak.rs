//! Regression test for huge page accounting around SysV shared memory.
//!
//! Each round creates a hugetlb-backed segment, faults in every page,
//! shares the attachment with a forked child, then detaches and removes the
//! segment. `HugePages_Free` must return to its pre-round value; pages that
//! stay gone were leaked by the kernel.

use anyhow::anyhow;
use slog::{debug, info, warn};
use std::ptr;

use kts_harness::child::{await_child, exit_child, fork_scenario_child, ChildStatus};
use kts_harness::env::TestEnv;
use kts_harness::error::{Failure, Outcome, TestResult};
use kts_sys::fs::OnScopeExit;
use kts_sys::proc::{read_meminfo, read_vm_tune, write_vm_tune};

/// Size of the shared memory segment created per round.
const SEGMENT_SIZE: usize = 1 << 30;

/// Create/destroy cycles; accounting bugs often need repetition to show.
const ROUNDS: u32 = 3;

const NR_HUGEPAGES: &str = "nr_hugepages";

/// Needs root to grow the huge page pool, and a host with enough memory to
/// back the segment.
pub fn setup(_env: &TestEnv) -> Result<(), Failure> {
    kts_harness::device::require_root()?;
    let mem_total_kb = read_meminfo("MemTotal")?;
    if mem_total_kb < 2 * (SEGMENT_SIZE as u64) / 1024 {
        return Err(Failure::config(format!(
            "MemTotal {} kB is too small to back a {} byte segment",
            mem_total_kb, SEGMENT_SIZE
        )));
    }
    Ok(())
}

pub fn test(env: &TestEnv) -> TestResult {
    let hugepage_kb = match read_meminfo("Hugepagesize") {
        Ok(kb) if kb > 0 => kb,
        _ => return Err(Failure::config("kernel reports no huge page support")),
    };
    let needed = pages_for_segment(hugepage_kb);

    // Grow the pool by what one segment needs and restore it on the way
    // out, whatever the verdict.
    let original = read_vm_tune(NR_HUGEPAGES)?;
    write_vm_tune(NR_HUGEPAGES, original + needed)?;
    let restore_logger = env.logger().clone();
    let _restore = OnScopeExit::new(move || {
        if let Err(e) = write_vm_tune(NR_HUGEPAGES, original) {
            warn!(restore_logger, "failed to restore {}: {:#}", NR_HUGEPAGES, e);
        }
    });

    // The kernel grows the pool best-effort; fragmentation can leave it
    // short.
    let free = read_meminfo("HugePages_Free")?;
    if free < needed {
        return Err(Failure::config(format!(
            "only {} of the {} huge pages needed could be reserved",
            free, needed
        )));
    }
    info!(
        env.logger(),
        "using {} huge pages of {} kB per round", needed, hugepage_kb
    );

    let mut leak = None;
    for iteration in 0..env.iterations() {
        for round in 0..ROUNDS {
            if let Some(found) = run_round(env, hugepage_kb)? {
                info!(env.logger(), "iteration {}.{}: {}", iteration, round, found);
                leak.get_or_insert(found);
            }
        }
    }
    match leak {
        None => Ok(Outcome::Passed),
        Some(found) => Ok(Outcome::Failed(found)),
    }
}

/// Huge pages needed to back one segment.
fn pages_for_segment(hugepage_kb: u64) -> u64 {
    let segment_kb = (SEGMENT_SIZE as u64) / 1024;
    (segment_kb + hugepage_kb - 1) / hugepage_kb
}

fn run_round(env: &TestEnv, hugepage_kb: u64) -> Result<Option<String>, Failure> {
    let free_before = read_meminfo("HugePages_Free")?;

    let shmid = unsafe {
        libc::shmget(
            libc::IPC_PRIVATE,
            SEGMENT_SIZE,
            libc::SHM_HUGETLB | libc::IPC_CREAT | 0o600,
        )
    };
    if shmid == -1 {
        return Err(Failure::Internal(anyhow!(
            "shmget of a {} byte hugetlb segment failed: {}",
            SEGMENT_SIZE,
            nix::errno::Errno::last()
        )));
    }
    // The segment must not outlive a failed round.
    let mut remove = OnScopeExit::new(move || {
        unsafe { libc::shmctl(shmid, libc::IPC_RMID, ptr::null_mut()) };
    });

    let addr = unsafe { libc::shmat(shmid, ptr::null(), 0) };
    if addr as isize == -1 {
        return Err(Failure::Internal(anyhow!(
            "shmat failed: {}",
            nix::errno::Errno::last()
        )));
    }

    // Fault in every huge page of the segment.
    let base = addr.cast::<u8>();
    let page_bytes = (hugepage_kb as usize) * 1024;
    unsafe {
        for offset in (0..SEGMENT_SIZE).step_by(page_bytes) {
            ptr::write_volatile(base.add(offset), b'a');
        }
    }

    // A child shares the attachment: its store must be visible here, and
    // its exit must give nothing back to the pool.
    let pid = fork_scenario_child(|| {
        unsafe { ptr::write_volatile(base, b'c') };
        exit_child(0)
    })?;
    match await_child(pid)? {
        ChildStatus::Exited(0) => {}
        other => {
            return Err(Failure::Internal(anyhow!(
                "segment-sharing child {} instead of exiting cleanly",
                other
            )))
        }
    }
    let seen = unsafe { ptr::read_volatile(base) };
    if seen != b'c' {
        return Err(Failure::Internal(anyhow!(
            "store through the child's attachment is not visible in the parent"
        )));
    }

    if unsafe { libc::shmdt(addr) } != 0 {
        return Err(Failure::Internal(anyhow!(
            "shmdt failed: {}",
            nix::errno::Errno::last()
        )));
    }
    remove.deactivate();
    if unsafe { libc::shmctl(shmid, libc::IPC_RMID, ptr::null_mut()) } != 0 {
        return Err(Failure::Internal(anyhow!(
            "shmctl(IPC_RMID) failed: {}",
            nix::errno::Errno::last()
        )));
    }

    let free_after = read_meminfo("HugePages_Free")?;
    debug!(
        env.logger(),
        "HugePages_Free {} before the round, {} after", free_before, free_after
    );
    if free_after != free_before {
        Ok(Some(format!(
            "HugePages_Free went from {} to {} over one create/destroy cycle",
            free_before, free_after
        )))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_needs_512_pages_of_2_mib() {
        assert_eq!(pages_for_segment(2048), 512);
    }

    #[test]
    fn segment_fits_one_1_gib_page() {
        assert_eq!(pages_for_segment(1024 * 1024), 1);
    }

    #[test]
    fn page_counts_round_up() {
        assert_eq!(pages_for_segment(3000), 350);
    }
}

#[cfg(all(test, feature = "integration_tests"))]
mod integration_tests {
    use super::*;
    use kts_harness::logger::no_op_logger;
    use std::time::Duration;

    // Requires root and hugetlb support. Hosts that cannot reserve the
    // pool report an unsupported configuration, which is fine.
    #[test]
    fn leak_scenario_passes_or_skips() {
        let env = TestEnv::new(no_op_logger(), 1, Duration::from_secs(10), None).unwrap();
        match setup(&env) {
            Ok(()) => {}
            Err(Failure::Config(_)) => return,
            Err(e) => panic!("setup broke: {:?}", e),
        }
        match test(&env) {
            Ok(Outcome::Passed) => {}
            Err(Failure::Config(_)) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
