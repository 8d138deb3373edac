use anyhow::Result;
use kts_harness::group::TestGroup;
use kts_harness::regtest;
use kts_tests::hugetlb::shm_leak;

fn main() -> Result<()> {
    TestGroup::new()
        .with_setup(shm_leak::setup)
        .add_test(regtest!(shm_leak::test))
        .execute_from_args()?;
    Ok(())
}
