// Report generation from scan outcomes

use crate::scan::{ScanOutcome, extract_url_path};
use pagehound_scanner::{DefectCategory, DefectRecord, Report};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const HEAVY_RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const LIGHT_RULE: &str = "────────────────────────────────────────────────────────────────────────────────";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }

    pub fn render(&self, outcomes: &[ScanOutcome]) -> Result<String, serde_json::Error> {
        match self {
            ReportFormat::Text => Ok(generate_text_report(outcomes)),
            ReportFormat::Json => generate_json_report(outcomes),
            ReportFormat::Markdown => Ok(generate_markdown_report(outcomes)),
        }
    }
}

/// Defect counts per category across every completed scan. Categories with
/// no defects are omitted.
pub fn category_counts(outcomes: &[ScanOutcome]) -> BTreeMap<DefectCategory, usize> {
    let mut counts = BTreeMap::new();
    for report in outcomes.iter().filter_map(ScanOutcome::report) {
        for (category, records) in &report.defects {
            if !records.is_empty() {
                *counts.entry(*category).or_insert(0) += records.len();
            }
        }
    }
    counts
}

pub fn total_defects(outcomes: &[ScanOutcome]) -> usize {
    outcomes
        .iter()
        .filter_map(ScanOutcome::report)
        .map(Report::total_defects)
        .sum()
}

pub fn total_pages(outcomes: &[ScanOutcome]) -> usize {
    outcomes
        .iter()
        .filter_map(ScanOutcome::report)
        .map(|r| r.pages_visited.len())
        .sum()
}

fn push_banner(report: &mut String, title: &str) {
    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str(title);
    report.push('\n');
    report.push_str(HEAVY_RULE);
    report.push_str("\n\n");
}

pub fn generate_text_report(outcomes: &[ScanOutcome]) -> String {
    let mut report = String::new();

    // Header
    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str("                        PAGEHOUND FRONT-END DEFECT REPORT\n");
    report.push_str(HEAVY_RULE);
    report.push_str("\n\n");

    report.push_str(&format!("Targets:      {}\n", format_targets(outcomes)));
    report.push_str(&format!("Pages Found:  {}\n", total_pages(outcomes)));
    report.push_str(&format!("Defects:      {}\n\n", total_defects(outcomes)));

    // Summary
    push_banner(&mut report, "SUMMARY");
    let counts = category_counts(outcomes);
    if counts.is_empty() {
        report.push_str("  No defects found.\n");
    }
    for (category, count) in &counts {
        report.push_str(&format!("  {:<24} {}\n", category.label(), count));
    }
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    if failed > 0 {
        report.push_str(&format!("\n  {} target(s) could not be scanned\n", failed));
    }
    report.push('\n');

    for outcome in outcomes {
        match outcome {
            ScanOutcome::Completed(scan) => push_text_scan(&mut report, scan),
            ScanOutcome::Failed { seed, error } => {
                push_banner(&mut report, &format!("TARGET {}", seed));
                report.push_str("Status:       Failed\n");
                report.push_str("Error:\n");
                report.push_str(&wrap_text(error, 80, "  "));
                report.push('\n');
            }
        }
    }

    // Footer
    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str("                                  End of Report\n");
    report.push_str(HEAVY_RULE);
    report.push_str("\n\nGenerated by Pagehound - a front-end defect crawler\n\n");

    report
}

fn push_text_scan(report: &mut String, scan: &Report) {
    push_banner(report, &format!("TARGET {}", scan.seed));
    report.push_str(&format!("Scan ID:      {}\n", scan.scan_id));
    report.push_str("Status:       Completed\n");
    report.push_str(&format!(
        "Scan Date:    {}\n",
        scan.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!("Duration:     {} seconds\n", scan.duration_seconds()));
    report.push_str(&format!("Scope:        {} and subdomains\n", scan.origin_host));
    report.push_str(&format!("Pages:        {}\n", scan.pages_visited.len()));
    if scan.truncated {
        report.push_str("              (page budget reached; some pages were not visited)\n");
    }
    report.push('\n');

    if scan.is_clean() {
        report.push_str("  No defects found.\n\n");
        return;
    }

    let mut idx = 0;
    for (category, records) in &scan.defects {
        if records.is_empty() {
            continue;
        }
        report.push_str(&format!("{} ({})\n\n", category.label().to_uppercase(), records.len()));
        for record in records {
            idx += 1;
            push_text_record(report, idx, record);
        }
    }
}

fn push_text_record(report: &mut String, idx: usize, record: &DefectRecord) {
    report.push_str(&format!("[{}] {}\n", idx, extract_url_path(&record.page_url)));
    report.push_str(&format!("Page:         {}\n", record.page_url));
    report.push_str("\nDetail:\n");
    report.push_str(&wrap_text(&record.detail, 80, "  "));
    report.push_str("\nSteps to reproduce:\n");
    for (step_no, step) in record.replication_steps.iter().enumerate() {
        report.push_str(&wrap_text(&format!("{}. {}", step_no + 1, step), 80, "  "));
    }
    report.push('\n');
    report.push_str(LIGHT_RULE);
    report.push_str("\n\n");
}

pub fn generate_json_report(outcomes: &[ScanOutcome]) -> Result<String, serde_json::Error> {
    let scans: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|outcome| match outcome {
            ScanOutcome::Completed(scan) => serde_json::json!({
                "status": "completed",
                "id": scan.scan_id,
                "seed": scan.seed,
                "origin_host": scan.origin_host,
                "start_time": scan.started_at.to_rfc3339(),
                "end_time": scan.finished_at.to_rfc3339(),
                "duration_seconds": scan.duration_seconds(),
                "truncated": scan.truncated,
                "pages_visited": scan.pages_visited,
                "total_defects": scan.total_defects(),
                "defects": scan.defects,
            }),
            ScanOutcome::Failed { seed, error } => serde_json::json!({
                "status": "failed",
                "seed": seed,
                "error": error,
            }),
        })
        .collect();

    let breakdown: BTreeMap<&str, usize> = category_counts(outcomes)
        .into_iter()
        .map(|(category, count)| (category.as_str(), count))
        .collect();

    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Pagehound",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "summary": {
                "total_targets": outcomes.len(),
                "failed_targets": outcomes.iter().filter(|o| o.is_failed()).count(),
                "total_pages": total_pages(outcomes),
                "total_defects": total_defects(outcomes),
                "category_breakdown": breakdown
            },
            "scans": scans
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_markdown_report(outcomes: &[ScanOutcome]) -> String {
    let mut report = String::new();
    report.push_str("# Pagehound Defect Report\n\n");
    report.push_str(&format!(
        "Generated {} by Pagehound v{}.\n\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        env!("CARGO_PKG_VERSION")
    ));

    report.push_str("## Summary\n\n");
    report.push_str("| Category | Defects |\n|---|---|\n");
    for (category, count) in category_counts(outcomes) {
        report.push_str(&format!("| {} | {} |\n", category.label(), count));
    }
    report.push_str(&format!("| **Total** | **{}** |\n\n", total_defects(outcomes)));

    for outcome in outcomes {
        match outcome {
            ScanOutcome::Completed(scan) => {
                report.push_str(&format!("## {}\n\n", scan.seed));
                report.push_str(&format!("- Scan ID: `{}`\n", scan.scan_id));
                report.push_str(&format!("- Pages visited: {}\n", scan.pages_visited.len()));
                report.push_str(&format!("- Duration: {} seconds\n", scan.duration_seconds()));
                if scan.truncated {
                    report.push_str("- Page budget reached; the crawl was cut short\n");
                }
                report.push('\n');

                if scan.is_clean() {
                    report.push_str("No defects found.\n\n");
                    continue;
                }
                for (category, records) in &scan.defects {
                    if records.is_empty() {
                        continue;
                    }
                    report.push_str(&format!("### {}\n\n", category.label()));
                    for record in records {
                        report.push_str(&format!(
                            "- **{}** on `{}`\n",
                            escape_markdown(&record.detail),
                            record.page_url
                        ));
                        for (step_no, step) in record.replication_steps.iter().enumerate() {
                            report.push_str(&format!(
                                "  {}. {}\n",
                                step_no + 1,
                                escape_markdown(step)
                            ));
                        }
                    }
                    report.push('\n');
                }
            }
            ScanOutcome::Failed { seed, error } => {
                report.push_str(&format!("## {}\n\n", seed));
                report.push_str(&format!("Scan failed: {}\n\n", escape_markdown(error)));
            }
        }
    }

    report
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn format_targets(outcomes: &[ScanOutcome]) -> String {
    match outcomes {
        [] => "None".to_string(),
        [single] => single.seed().to_string(),
        many => format!("{} URLs", many.len()),
    }
}

fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '_' | '`' | '|' | '[' | ']' | '<' | '>') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();
    let limit = width.saturating_sub(indent.len());

    for word in text.split_whitespace() {
        if !current_line.is_empty() && current_line.len() + word.len() + 1 > limit {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
        }

        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
        result.push('\n');
    }

    result
}
