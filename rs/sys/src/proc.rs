use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const MEMINFO: &str = "/proc/meminfo";
const SYS_VM: &str = "/proc/sys/vm";

/// Reads one numeric field from `/proc/meminfo`. Values reported by the
/// kernel in kB are returned in kB; bare counters (e.g. `HugePages_Free`)
/// are returned as is.
pub fn read_meminfo(field: &str) -> Result<u64> {
    let contents = fs::read_to_string(MEMINFO)
        .with_context(|| format!("failed to read {}", MEMINFO))?;
    parse_meminfo_field(&contents, field)
        .with_context(|| format!("field {} not found in {}", field, MEMINFO))
}

fn parse_meminfo_field(contents: &str, field: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let rest = line.strip_prefix(field)?.strip_prefix(':')?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

fn vm_tune_path(name: &str) -> PathBuf {
    Path::new(SYS_VM).join(name)
}

/// Reads a numeric VM tunable, e.g. `nr_hugepages`.
pub fn read_vm_tune(name: &str) -> Result<u64> {
    let path = vm_tune_path(name);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    contents
        .trim()
        .parse()
        .with_context(|| format!("malformed value in {}", path.display()))
}

/// Writes a numeric VM tunable. The caller is responsible for restoring the
/// previous value; the kernel applies the write immediately.
pub fn write_vm_tune(name: &str, value: u64) -> Result<()> {
    let path = vm_tune_path(name);
    fs::write(&path, format!("{}\n", value))
        .with_context(|| format!("failed to write {}", path.display()))
}
