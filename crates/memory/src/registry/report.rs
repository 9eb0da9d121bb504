//! Memory usage reports

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use super::timing::OperationStats;
use super::usage::MemoryUsageSnapshot;
use crate::pool::PoolStats;
use crate::utils::{format_bytes, short_type_name};

/// CSV header shared by every report row
pub const CSV_HEADER: &str =
    "section,name,current_bytes,peak_bytes,allocations,deallocations,count,total_ns,max_ns";

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable text
    #[default]
    Text,
    /// CSV for data analysis
    Csv,
}

/// Everything a registry knows at one point in time
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryReport {
    /// Byte and allocation counters
    pub usage: MemoryUsageSnapshot,
    /// Timings per operation name
    pub operations: BTreeMap<String, OperationStats>,
    /// Block statistics per registered pool, sorted by type name
    pub pools: Vec<(String, PoolStats)>,
}

impl MemoryReport {
    /// Writes the report in `format`
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W, format: ReportFormat) -> io::Result<()> {
        match format {
            ReportFormat::Text => self.write_text(writer),
            ReportFormat::Csv => self.write_csv(writer),
        }
    }

    /// Renders the report as a string
    pub fn render(&self, format: ReportFormat) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out, format);
        String::from_utf8_lossy(&out).into_owned()
    }

    fn write_text<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        let usage = &self.usage;

        writeln!(w, "=== Memory Usage Report ===")?;
        writeln!(w, "Current: {}", format_bytes(usage.current_bytes))?;
        writeln!(w, "Peak: {}", format_bytes(usage.peak_bytes))?;
        writeln!(
            w,
            "Allocations: {} (deallocations: {}, live: {})",
            usage.allocation_count,
            usage.deallocation_count,
            usage.live_count()
        )?;

        if !usage.by_type.is_empty() {
            writeln!(w, "\nBy type:")?;
            for (name, t) in &usage.by_type {
                writeln!(
                    w,
                    "  {}: {} current, {} peak, {} allocs, {} frees",
                    short_type_name(name),
                    format_bytes(t.current_bytes),
                    format_bytes(t.peak_bytes),
                    t.allocations,
                    t.deallocations
                )?;
            }
        }

        if !self.operations.is_empty() {
            writeln!(w, "\nOperations:")?;
            for (name, op) in &self.operations {
                writeln!(
                    w,
                    "  {}: {} run(s), total {:?}, avg {:?}, max {:?}",
                    name,
                    op.count,
                    op.total,
                    op.average(),
                    op.max
                )?;
            }
        }

        if !self.pools.is_empty() {
            writeln!(w, "\nPools:")?;
            for (name, stats) in &self.pools {
                writeln!(w, "  {}: {}", short_type_name(name), stats)?;
            }
        }

        Ok(())
    }

    fn write_csv<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        let usage = &self.usage;

        writeln!(w, "{CSV_HEADER}")?;
        writeln!(
            w,
            "global,total,{},{},{},{},,,",
            usage.current_bytes, usage.peak_bytes, usage.allocation_count, usage.deallocation_count
        )?;

        for (name, t) in &usage.by_type {
            writeln!(
                w,
                "type,{},{},{},{},{},,,",
                csv_field(name),
                t.current_bytes,
                t.peak_bytes,
                t.allocations,
                t.deallocations
            )?;
        }

        for (name, op) in &self.operations {
            writeln!(
                w,
                "operation,{},,,,,{},{},{}",
                csv_field(name),
                op.count,
                op.total.as_nanos(),
                op.max.as_nanos()
            )?;
        }

        for (name, stats) in &self.pools {
            writeln!(
                w,
                "pool,{},{},{},{},{},{},,",
                csv_field(name),
                stats.used_bytes,
                stats.peak_allocated_blocks * stats.block_size,
                stats.total_allocations,
                stats.total_deallocations,
                stats.allocated_blocks
            )?;
        }

        Ok(())
    }
}

/// Quotes a CSV field when it contains a separator or quote
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::UsageTracker;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn sample() -> MemoryReport {
        let tracker = UsageTracker::new();
        tracker.record_allocation(16, "game::Coin");
        tracker.record_allocation(16, "game::Coin");
        tracker.record_deallocation(16, "game::Coin");

        let mut operations = BTreeMap::new();
        operations.insert(
            "load_level".to_string(),
            OperationStats {
                count: 2,
                total: Duration::from_nanos(300),
                max: Duration::from_nanos(200),
            },
        );

        MemoryReport {
            usage: tracker.snapshot(),
            operations,
            pools: vec![(
                "game::Coin".to_string(),
                PoolStats {
                    block_size: 16,
                    total_blocks: 4,
                    allocated_blocks: 1,
                    free_blocks: 3,
                    capacity_bytes: 64,
                    used_bytes: 16,
                    peak_allocated_blocks: 2,
                    total_allocations: 2,
                    total_deallocations: 1,
                    ..PoolStats::default()
                },
            )],
        }
    }

    #[test]
    fn test_csv_rows() {
        let csv = sample().render(ReportFormat::Csv);
        let expected = format!(
            "{CSV_HEADER}\n\
             global,total,16,32,2,1,,,\n\
             type,game::Coin,16,32,2,1,,,\n\
             operation,load_level,,,,,2,300,200\n\
             pool,game::Coin,16,32,2,1,1,,\n"
        );
        assert_eq!(csv, expected);
    }

    #[test]
    fn test_text_report_sections() {
        let text = sample().render(ReportFormat::Text);
        assert!(text.starts_with("=== Memory Usage Report ==="));
        assert!(text.contains("Current: 16 B"));
        assert!(text.contains("  Coin: 16 B current, 32 B peak, 2 allocs, 1 frees"));
        assert!(text.contains("load_level: 2 run(s)"));
        assert!(text.contains("Pools:"));
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("(u8, u16)"), "\"(u8, u16)\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
