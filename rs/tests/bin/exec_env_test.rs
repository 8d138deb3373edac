use anyhow::Result;
use kts_harness::group::TestGroup;
use kts_harness::regtest;
use kts_tests::exec::env_propagation;

fn main() -> Result<()> {
    // When this binary is the re-executed image it reports and exits here.
    env_propagation::maybe_run_exec_child();

    TestGroup::new()
        .add_test(regtest!(env_propagation::test))
        .execute_from_args()?;
    Ok(())
}
