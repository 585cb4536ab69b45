//! Markdown rendering of a [`ComparisonReport`].

use super::engine::{ComparisonReport, DurationStats, Measurement, VariantReport};
use std::fmt::Write;

const NO_SAMPLES: &str = "no samples";

/// Render the report as a markdown document. Deterministic for a given report.
pub fn render(report: &ComparisonReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, report: &ComparisonReport) -> std::fmt::Result {
    writeln!(out, "# Multi-Runtime Benchmark Comparison")?;
    writeln!(out)?;
    match (report.data_window.first, report.data_window.last) {
        (Some(first), Some(last)) => writeln!(
            out,
            "Data window: {} to {}",
            first.to_rfc3339(),
            last.to_rfc3339()
        )?,
        _ => writeln!(out, "Data window: no data")?,
    }
    writeln!(
        out,
        "Malformed rows skipped: {} cold-start, {} load",
        report.malformed.invocations, report.malformed.load_samples
    )?;
    writeln!(out)?;

    write_cold_starts(out, report)?;
    write_ranking(out, report)?;
    write_load(out, report)?;
    write_findings(out, report)?;
    Ok(())
}

fn write_cold_starts(out: &mut String, report: &ComparisonReport) -> std::fmt::Result {
    writeln!(out, "## Cold starts")?;
    writeln!(out)?;
    writeln!(
        out,
        "| Runtime | Phase | Count | Mean (ms) | Median (ms) | Min (ms) | Max (ms) | P95 (ms) | P99 (ms) | Avg memory (MB) | Failed |"
    )?;
    writeln!(
        out,
        "|---------|-------|-------|-----------|-------------|----------|----------|----------|----------|-----------------|--------|"
    )?;
    for variant in &report.variants {
        let failed = variant.invocations.failed;
        duration_row(out, variant, "cold", &variant.cold, failed)?;
        duration_row(out, variant, "warm", &variant.warm, failed)?;
    }
    writeln!(out)
}

fn duration_row(
    out: &mut String,
    variant: &VariantReport,
    phase: &str,
    stats: &Measurement<DurationStats>,
    failed: usize,
) -> std::fmt::Result {
    match stats {
        Measurement::Measured(s) => writeln!(
            out,
            "| {} | {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.1} | {} |",
            variant.runtime_id,
            phase,
            s.count,
            s.mean,
            s.median,
            s.min,
            s.max,
            s.p95,
            s.p99,
            s.avg_memory_mb,
            failed
        ),
        Measurement::NoSamples => writeln!(
            out,
            "| {} | {} | 0 | {NO_SAMPLES} | {NO_SAMPLES} | {NO_SAMPLES} | {NO_SAMPLES} | {NO_SAMPLES} | {NO_SAMPLES} | {NO_SAMPLES} | {} |",
            variant.runtime_id, phase, failed
        ),
    }
}

fn write_ranking(out: &mut String, report: &ComparisonReport) -> std::fmt::Result {
    writeln!(out, "## Cold-start ranking")?;
    writeln!(out)?;
    if report.ranking.is_empty() {
        writeln!(out, "{NO_SAMPLES}")?;
        return writeln!(out);
    }
    writeln!(out, "| Rank | Runtime | Mean cold start (ms) |")?;
    writeln!(out, "|------|---------|----------------------|")?;
    for entry in &report.ranking {
        writeln!(
            out,
            "| {} | {} | {:.2} |",
            entry.rank, entry.runtime_id, entry.mean_cold_start_ms
        )?;
    }
    writeln!(out)
}

fn write_load(out: &mut String, report: &ComparisonReport) -> std::fmt::Result {
    writeln!(out, "## Load")?;
    writeln!(out)?;
    writeln!(
        out,
        "| Runtime | Operation | Requests | Success (%) | Mean (ms) | Min (ms) | Max (ms) | P50 (ms) | P90 (ms) | P95 (ms) | P99 (ms) |"
    )?;
    writeln!(
        out,
        "|---------|-----------|----------|-------------|-----------|----------|----------|----------|----------|----------|----------|"
    )?;
    for variant in &report.variants {
        let Measurement::Measured(load) = &variant.load else {
            writeln!(
                out,
                "| {} | all | 0 | {NO_SAMPLES} | {NO_SAMPLES} | {NO_SAMPLES} | {NO_SAMPLES} | {NO_SAMPLES} | {NO_SAMPLES} | {NO_SAMPLES} | {NO_SAMPLES} |",
                variant.runtime_id
            )?;
            continue;
        };
        let rows = load
            .operations
            .iter()
            .map(|(op, stats)| (op.as_str(), stats))
            .chain(std::iter::once(("all", &load.overall)));
        for (operation, stats) in rows {
            let l = &stats.latency;
            writeln!(
                out,
                "| {} | {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |",
                variant.runtime_id,
                operation,
                stats.count,
                stats.success_rate * 100.0,
                l.mean,
                l.min,
                l.max,
                l.p50,
                l.p90,
                l.p95,
                l.p99
            )?;
        }
    }
    writeln!(out)?;

    writeln!(out, "| Runtime | Throughput (req/s) | Error rate (%) |")?;
    writeln!(out, "|---------|--------------------|----------------|")?;
    for variant in &report.variants {
        match &variant.load {
            Measurement::Measured(load) => writeln!(
                out,
                "| {} | {:.2} | {:.2} |",
                variant.runtime_id,
                load.throughput_rps,
                load.overall.error_rate * 100.0
            )?,
            Measurement::NoSamples => writeln!(
                out,
                "| {} | {NO_SAMPLES} | {NO_SAMPLES} |",
                variant.runtime_id
            )?,
        }
    }
    writeln!(out)
}

fn write_findings(out: &mut String, report: &ComparisonReport) -> std::fmt::Result {
    let findings = &report.key_findings;
    writeln!(out, "## Key findings")?;
    writeln!(out)?;

    match (&findings.fastest_cold_start, &findings.slowest_cold_start) {
        (Some(fastest), Some(slowest)) => {
            writeln!(out, "- Fastest cold start: {fastest}")?;
            writeln!(out, "- Slowest cold start: {slowest}")?;
            if let Some(ms) = findings.cold_start_difference_ms {
                write!(out, "- Cold-start difference: {ms:.2} ms")?;
                if let Some(pct) = findings.cold_start_difference_pct {
                    write!(out, " ({pct:.1}%)")?;
                }
                writeln!(out)?;
            }
        }
        _ => writeln!(out, "- Cold starts: {NO_SAMPLES}")?,
    }
    match &findings.lowest_load_latency {
        Some(id) => writeln!(out, "- Lowest mean load latency: {id}")?,
        None => writeln!(out, "- Load latency: {NO_SAMPLES}")?,
    }
    if let Some(id) = &findings.lowest_error_rate {
        writeln!(out, "- Lowest error rate: {id}")?;
    }
    Ok(())
}
