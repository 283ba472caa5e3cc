//! Host resource statistics read from `free`, `df` and `top`

use std::sync::LazyLock;

use anyhow::{Context, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::session::SshSession;

pub const MEMORY_COMMAND: &str = "free -k";
pub const DISK_COMMAND: &str = "df -k";
pub const CPU_COMMAND: &str = "top -b -n1 | grep 'Cpu(s)'";

/// Idle share in both `95.3 id` and `95.3%id` layouts
static CPU_IDLE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"([\d.]+)\s*%?\s*id").ok());

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    pub cpu_usage_percentage: f64,
    pub total_memory_in_kb: u64,
    pub used_memory_in_kb: u64,
    pub total_disk_in_kb: u64,
    pub used_disk_in_kb: u64,
}

/// `(total, used)` from the `Mem:` row of `free -k`
pub fn parse_memory(output: &str) -> anyhow::Result<(u64, u64)> {
    let row = output
        .lines()
        .find(|line| line.trim_start().starts_with("Mem:"))
        .ok_or_else(|| anyhow!("no `Mem:` row in free output"))?;

    let mut columns = row.split_whitespace().skip(1);
    let total = columns
        .next()
        .context("missing total memory column")?
        .parse()
        .context("invalid total memory")?;
    let used = columns
        .next()
        .context("missing used memory column")?
        .parse()
        .context("invalid used memory")?;

    Ok((total, used))
}

/// `(total, used)` summed over the block devices listed by `df -k`
pub fn parse_disk(output: &str) -> anyhow::Result<(u64, u64)> {
    let mut total = 0u64;
    let mut used = 0u64;
    let mut devices = 0usize;

    for line in output.lines() {
        let mut columns = line.split_whitespace();
        let Some(filesystem) = columns.next() else {
            continue;
        };
        if !filesystem.starts_with("/dev/") || filesystem.starts_with("/dev/loop") {
            continue;
        }

        let size: u64 = columns
            .next()
            .with_context(|| format!("missing size column for {filesystem}"))?
            .parse()
            .with_context(|| format!("invalid size for {filesystem}"))?;
        let taken: u64 = columns
            .next()
            .with_context(|| format!("missing used column for {filesystem}"))?
            .parse()
            .with_context(|| format!("invalid used size for {filesystem}"))?;

        total += size;
        used += taken;
        devices += 1;
    }

    if devices == 0 {
        return Err(anyhow!("no block devices in df output"));
    }

    Ok((total, used))
}

/// CPU usage in percent (`100 - idle`, two decimals) from top's `Cpu(s)` line
pub fn parse_cpu(output: &str) -> anyhow::Result<f64> {
    let pattern = CPU_IDLE
        .as_ref()
        .ok_or_else(|| anyhow!("idle pattern failed to compile"))?;
    let idle: f64 = pattern
        .captures(output)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| anyhow!("no idle figure in top output"))?
        .as_str()
        .parse()
        .context("invalid idle figure")?;

    Ok(((100.0 - idle) * 100.0).round() / 100.0)
}

/// Run the three diagnostic commands on `session` and parse their output
pub async fn collect(session: &SshSession) -> anyhow::Result<ServerStats> {
    let memory = session.exec(MEMORY_COMMAND).await?;
    let disk = session.exec(DISK_COMMAND).await?;
    let cpu = session.exec(CPU_COMMAND).await?;

    let (total_memory_in_kb, used_memory_in_kb) = parse_memory(&memory)?;
    let (total_disk_in_kb, used_disk_in_kb) = parse_disk(&disk)?;
    let cpu_usage_percentage = parse_cpu(&cpu)?;

    Ok(ServerStats {
        cpu_usage_percentage,
        total_memory_in_kb,
        used_memory_in_kb,
        total_disk_in_kb,
        used_disk_in_kb,
    })
}
