//! `mpu plan <size> <count>` – preview the part layout without uploading.

use anyhow::{bail, Context, Result};
use mpu_core::planner::plan_parts;

/// Parses "123", "64K", "5M", "2G" (binary units, case-insensitive).
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let (digits, multiplier) = match s.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&s[..s.len() - 1], 1u64 << 10),
        Some('M') => (&s[..s.len() - 1], 1u64 << 20),
        Some('G') => (&s[..s.len() - 1], 1u64 << 30),
        _ => (s, 1),
    };
    let n: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("invalid size {:?}", s))?;
    match n.checked_mul(multiplier) {
        Some(bytes) => Ok(bytes),
        None => bail!("size {:?} is too large", s),
    }
}

pub fn run_plan(size: &str, count: usize) -> Result<()> {
    let total = parse_size(size)?;
    let parts = plan_parts(total, count)?;
    println!("{:<6} {:>14} {:>14}", "PART", "OFFSET", "SIZE");
    for p in &parts {
        println!("{:<6} {:>14} {:>14}", p.part_number, p.offset, p.size);
    }
    Ok(())
}
