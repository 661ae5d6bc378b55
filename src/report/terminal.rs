use std::path::Path;

use anyhow::Result;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::models::{Finding, PolicyVerdict, Severity};

/// Render a colored terminal report.
pub fn render(findings: &[Finding], path: &Path, verbose: bool, quiet: bool) -> Result<()> {
    let total = findings.len();
    let pass_count = findings
        .iter()
        .filter(|f| f.verdict == PolicyVerdict::Pass)
        .count();
    let warn_count = findings
        .iter()
        .filter(|f| f.verdict == PolicyVerdict::Warn)
        .count();
    let error_count = findings
        .iter()
        .filter(|f| f.verdict == PolicyVerdict::Error)
        .count();

    if !quiet {
        println!(
            "\n {} v{}",
            "vuln-checkr".bold(),
            env!("CARGO_PKG_VERSION")
        );
        println!(" Scanning: {}\n", path.display());
    }

    let pass_severities = summarize_severities(findings, &PolicyVerdict::Pass);
    let warn_severities = summarize_severities(findings, &PolicyVerdict::Warn);
    let error_severities = summarize_severities(findings, &PolicyVerdict::Error);

    if quiet {
        println!(
            "Total: {}  Pass: {}  Warn: {}  Error: {}",
            total,
            pass_count.to_string().green(),
            warn_count.to_string().yellow(),
            error_count.to_string().red(),
        );
        return Ok(());
    }

    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", "SUMMARY".bold());
    println!(" │  {:<48} │", format!("Total advisories   : {}", total));
    println!(
        " │  {:<48} │",
        format!(
            "{}  Pass            : {:>4}  {}",
            "✓".green(),
            pass_count,
            pass_severities
        )
    );
    println!(
        " │  {:<48} │",
        format!(
            "{}  Warn            : {:>4}  {}",
            "⚠".yellow(),
            warn_count,
            warn_severities
        )
    );
    println!(
        " │  {:<48} │",
        format!(
            "{}  Error           : {:>4}  {}",
            "✗".red(),
            error_count,
            error_severities
        )
    );
    println!(" └────────────────────────────────────────────────────┘\n");

    if error_count > 0 {
        println!(
            " {} Advisories requiring attention:\n",
            "[ERROR]".red().bold()
        );
        render_table(findings, &PolicyVerdict::Error);
        println!();
    }

    if warn_count > 0 {
        println!(" {} Advisories with warnings:\n", "[WARN]".yellow().bold());
        render_table(findings, &PolicyVerdict::Warn);
        println!();
    }

    if verbose && pass_count > 0 {
        println!(" {} Tolerated advisories:\n", "[PASS]".green().bold());
        render_table(findings, &PolicyVerdict::Pass);
        println!();
    }

    Ok(())
}

fn render_table(findings: &[Finding], verdict_filter: &PolicyVerdict) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Module").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Severity").add_attribute(Attribute::Bold),
            Cell::new("Advisory").add_attribute(Attribute::Bold),
            Cell::new("Vulnerable").add_attribute(Attribute::Bold),
            Cell::new("Verdict").add_attribute(Attribute::Bold),
        ]);

    for finding in findings.iter().filter(|f| &f.verdict == verdict_filter) {
        let advisory = &finding.advisory;

        let (verdict_str, verdict_color) = match finding.verdict {
            PolicyVerdict::Pass => ("✓ pass", Color::Green),
            PolicyVerdict::Warn => ("⚠ warn", Color::Yellow),
            PolicyVerdict::Error => ("✗ error", Color::Red),
        };

        let severity_color = match finding.severity {
            Severity::Critical => Color::Red,
            Severity::High => Color::Red,
            Severity::Moderate => Color::Yellow,
            Severity::Low => Color::Green,
            Severity::Info => Color::Blue,
            Severity::Unknown => Color::DarkGrey,
        };

        table.add_row(vec![
            Cell::new(advisory.module_name.as_deref().unwrap_or("unknown")),
            Cell::new(advisory.version.as_deref().unwrap_or("*")),
            Cell::new(finding.severity.to_string()).fg(severity_color),
            Cell::new(advisory.ghsa_id.as_deref().unwrap_or("-")),
            Cell::new(advisory.vulnerable_versions.as_deref().unwrap_or("-")),
            Cell::new(verdict_str)
                .fg(verdict_color)
                .set_alignment(CellAlignment::Center),
        ]);
    }

    println!("{}", table);
}

fn summarize_severities(findings: &[Finding], verdict: &PolicyVerdict) -> String {
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for finding in findings.iter().filter(|f| &f.verdict == verdict) {
        *counts.entry(finding.severity.to_string()).or_insert(0) += 1;
    }

    let mut pairs: Vec<(String, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1));

    let summary: Vec<String> = pairs
        .iter()
        .take(3)
        .map(|(severity, count)| format!("{} ({})", severity, count))
        .collect();

    if summary.is_empty() {
        String::new()
    } else {
        format!("[{}]", summary.join(", "))
    }
}
