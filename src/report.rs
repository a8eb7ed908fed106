//! Console presentation of session results and platform information.
//!
//! One row per instruction-set tier, columns for Write/Read/Copy in GiB/s
//! formatted to one decimal place, "N/A" for anything the host cannot run.
//! The RAM module listing is purely informational and rendered separately.

use std::fmt;

use crate::kernels::Tier;
use crate::meminfo::RamModule;

/// Best-of-N throughput for one tier, in MiB/s per operation.
///
/// `None` means the tier was unavailable on the host and no kernel ran.
#[derive(Clone, Debug)]
pub struct TierRow {
    pub tier: Tier,
    pub write: Option<u64>,
    pub read: Option<u64>,
    pub copy: Option<u64>,
}

impl TierRow {
    /// A row for a tier the host cannot execute.
    pub fn unavailable(tier: Tier) -> Self {
        Self {
            tier,
            write: None,
            read: None,
            copy: None,
        }
    }

    /// True if no kernel ran for this tier.
    pub fn is_unavailable(&self) -> bool {
        self.write.is_none() && self.read.is_none() && self.copy.is_none()
    }
}

/// Results of one whole benchmark session.
#[derive(Clone, Debug)]
pub struct SessionReport {
    /// Size of each buffer in MiB.
    pub task_size_mib: usize,
    /// One row per tier, in reporting order.
    pub rows: Vec<TierRow>,
}

const RULE: &str = "---------------------------------------------------";

fn format_cell(mib_s: Option<u64>) -> String {
    match mib_s {
        Some(v) => format!("{:.1} GiB/s", v as f64 / 1024.0),
        None => "N/A".to_string(),
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "{:<8}{:<14}{:<14}{:<14}", "", "Write", "Read", "Copy")?;
        writeln!(f, "{RULE}")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<8}{:<14}{:<14}{:<14}",
                row.tier.label(),
                format_cell(row.write),
                format_cell(row.read),
                format_cell(row.copy),
            )?;
        }
        write!(f, "{RULE}")
    }
}

/// Renders the RAM module listing, one line per populated slot.
///
/// Values are platform-reported and passed through unsanitized.
pub fn format_ram_modules(modules: &[RamModule]) -> String {
    let mut out = String::from("Installed memory modules:\n");
    for module in modules {
        let generation = if module.ddr_generation > 0 {
            format!("DDR{}", module.ddr_generation)
        } else {
            "<unknown type>".to_string()
        };
        out.push_str(&format!(
            "  {}  {}  {}  {} MiB  {}-{} (configured {} MT/s)\n",
            module.slot,
            module.manufacturer,
            module.model,
            module.capacity_bytes / (1024 * 1024),
            generation,
            module.rated_speed_mts,
            module.configured_clock_mts,
        ));
    }
    out.pop();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_formats_one_decimal_gib() {
        let report = SessionReport {
            task_size_mib: 1000,
            rows: vec![
                TierRow {
                    tier: Tier::Wide256Int,
                    write: Some(20480), // 20.0 GiB/s
                    read: Some(15360),  // 15.0
                    copy: Some(10752),  // 10.5
                },
                TierRow::unavailable(Tier::Wide256),
                TierRow {
                    tier: Tier::Baseline128,
                    write: Some(512), // 0.5
                    read: Some(0),
                    copy: Some(1024), // 1.0
                },
            ],
        };

        let text = report.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[1].contains("Write"));
        assert!(lines[3].starts_with("AVX2"));
        assert!(lines[3].contains("20.0 GiB/s"));
        assert!(lines[3].contains("10.5 GiB/s"));
        assert!(lines[4].starts_with("AVX"));
        assert_eq!(lines[4].matches("N/A").count(), 3);
        assert!(lines[5].starts_with("SSE2"));
        assert!(lines[5].contains("0.5 GiB/s"));
        assert!(lines[5].contains("0.0 GiB/s"));
    }

    #[test]
    fn ram_listing_passes_values_through() {
        let modules = vec![RamModule {
            slot: "DIMM_A1".into(),
            manufacturer: "Kingston".into(),
            model: "KHX3200C16D4".into(),
            capacity_bytes: 16 * 1024 * 1024 * 1024,
            ddr_generation: 4,
            rated_speed_mts: 3200,
            configured_clock_mts: 3000,
        }];

        let text = format_ram_modules(&modules);
        assert!(text.starts_with("Installed memory modules:"));
        assert!(text.contains("DIMM_A1"));
        assert!(text.contains("16384 MiB"));
        assert!(text.contains("DDR4-3200"));
        assert!(text.contains("configured 3000 MT/s"));
    }

    #[test]
    fn ram_listing_handles_unknown_generation() {
        let modules = vec![RamModule::default()];
        let text = format_ram_modules(&modules);
        assert!(text.contains("<unknown slot>"));
        assert!(text.contains("<unknown type>"));
    }
}
