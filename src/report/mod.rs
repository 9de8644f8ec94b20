//! Run result reporting: console summary and JSON output

use crate::controller::run::{RunRecord, CASE_COUNT};
use crate::store::{keys, KvStore};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

/// Print the per-case outcome table for a finished run
pub fn print_summary(record: &RunRecord) {
    println!();
    println!(
        "{} {} ({}, field {})",
        "Results for".bold(),
        record.run_id.cyan(),
        record.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        record.field_to_test.cyan()
    );
    for case_number in 1..=CASE_COUNT as u32 {
        let value = record
            .test_cases
            .get(case_number as usize - 1)
            .map(String::as_str)
            .unwrap_or("");
        let shown_value = if value.trim().is_empty() {
            "(generated)".dimmed().to_string()
        } else {
            value.to_string()
        };
        match record.result_for(case_number) {
            Some(entry) if entry.has_token() => println!(
                "  #{case_number} {shown_value:<24} {}",
                entry.transaction_id.green()
            ),
            Some(entry) => println!(
                "  #{case_number} {shown_value:<24} {}",
                entry.transaction_id.red()
            ),
            None => println!("  #{case_number} {shown_value:<24} {}", "(no result)".yellow()),
        }
    }
}

/// Write a run record as pretty JSON
pub fn write_json(record: &RunRecord, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    println!("JSON report saved to: {}", path.display());
    Ok(())
}

/// Report on the cached current run, to a file or stdout
pub async fn generate_report(store: &KvStore, output: Option<&Path>) -> Result<()> {
    let record: RunRecord = store
        .try_get(keys::RUN_CURRENT)
        .await?
        .context("no cached run; start one with `txprobe run`")?;
    match output {
        Some(path) => write_json(&record, path)?,
        None => println!("{}", serde_json::to_string_pretty(&record)?),
    }
    Ok(())
}

/// List the cached run history, newest last
pub async fn print_history(store: &KvStore, limit: usize) -> Result<()> {
    let history: Vec<RunRecord> = store.try_get(keys::RUN_HISTORY).await?.unwrap_or_default();
    if history.is_empty() {
        println!("{} No cached runs.", "ℹ".blue());
        return Ok(());
    }
    let start = history.len().saturating_sub(limit);
    for record in &history[start..] {
        println!(
            "{} {} — {} token(s) / {} case(s), field {}",
            record.started_at.format("%Y-%m-%d %H:%M"),
            record.run_id.cyan(),
            record.tokens_found().to_string().green(),
            CASE_COUNT,
            record.field_to_test
        );
    }
    Ok(())
}
