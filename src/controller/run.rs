//! Run configuration and cached run records

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// Number of test-case slots in a run
pub const CASE_COUNT: usize = 5;

/// Maximum number of cached runs kept in history
pub const MAX_HISTORY: usize = 10;

pub use crate::agent::token::NOT_FOUND;

/// Correlation map: test-case number -> tab id
pub type TabMap = BTreeMap<u32, crate::driver::web::TabId>;

/// Configuration for one run. Immutable once the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub interface_url: String,
    pub debug_url: String,
    pub country: String,
    /// Field key under test, e.g. "PostalCode" (see testable fields)
    pub field_to_test: String,
    /// Override values for the five cases; blank slots submit generated data
    #[serde(default)]
    pub test_cases: Vec<String>,
    /// Data-field key forced to a fixed value on every submission
    #[serde(default)]
    pub sandbox_field_key: String,
    #[serde(default)]
    pub sandbox_value: String,
    /// Tick the "run a test transaction" checkbox before submitting
    #[serde(default)]
    pub run_test_transaction: bool,
}

impl RunConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: RunConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        if config.interface_url.is_empty() {
            anyhow::bail!("config is missing interfaceUrl");
        }
        if config.debug_url.is_empty() {
            anyhow::bail!("config is missing debugUrl");
        }
        config.normalize();
        Ok(config)
    }

    /// Pad or truncate the case list to exactly [`CASE_COUNT`] slots
    pub fn normalize(&mut self) {
        self.test_cases.resize(CASE_COUNT, String::new());
    }

    /// The override value for a 1-based case number ("" for blank slots)
    pub fn case_value(&self, case_number: u32) -> &str {
        self.test_cases
            .get(case_number as usize - 1)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// One recorded outcome: produced exactly once per test case, carrying either
/// the scraped transaction id or the [`NOT_FOUND`] sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub test_case: String,
    pub test_case_number: u32,
    pub transaction_id: String,
    pub field_tested: String,
}

impl ResultEntry {
    pub fn has_token(&self) -> bool {
        !self.transaction_id.is_empty() && self.transaction_id != NOT_FOUND
    }
}

/// A cached run: config snapshot plus the results appended so far
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub field_to_test: String,
    pub country: String,
    pub sandbox_field_key: String,
    pub sandbox_value: String,
    pub test_cases: Vec<String>,
    pub results: Vec<ResultEntry>,
}

impl RunRecord {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            run_id: format!("run_{}", Uuid::new_v4()),
            started_at: Utc::now(),
            field_to_test: config.field_to_test.clone(),
            country: config.country.clone(),
            sandbox_field_key: config.sandbox_field_key.clone(),
            sandbox_value: config.sandbox_value.clone(),
            test_cases: config.test_cases.clone(),
            results: Vec::new(),
        }
    }

    pub fn result_for(&self, case_number: u32) -> Option<&ResultEntry> {
        self.results
            .iter()
            .find(|r| r.test_case_number == case_number)
    }

    /// Append a result. First write wins: a second entry for an
    /// already-recorded case number is dropped and `false` is returned.
    pub fn push_result(&mut self, entry: ResultEntry) -> bool {
        if self.result_for(entry.test_case_number).is_some() {
            return false;
        }
        self.results.push(entry);
        true
    }

    /// True once every case slot holds an entry
    pub fn is_complete(&self) -> bool {
        (1..=CASE_COUNT as u32).all(|n| self.result_for(n).is_some())
    }

    pub fn tokens_found(&self) -> usize {
        self.results.iter().filter(|r| r.has_token()).count()
    }
}

/// Append a record to the bounded history, evicting the oldest beyond
/// [`MAX_HISTORY`].
pub fn push_history(history: &mut Vec<RunRecord>, record: RunRecord) {
    history.push(record);
    while history.len() > MAX_HISTORY {
        history.remove(0);
    }
}

/// Replace the history entry matching `run_id`, if present
pub fn update_history(history: &mut [RunRecord], record: &RunRecord) {
    if let Some(slot) = history.iter_mut().find(|r| r.run_id == record.run_id) {
        *slot = record.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        let mut config = RunConfig {
            interface_url: "https://example.test/verify".to_string(),
            debug_url: "https://example.test/debug".to_string(),
            country: "Netherlands".to_string(),
            field_to_test: "PostalCode".to_string(),
            test_cases: vec!["".to_string(), "BADVALUE".to_string()],
            sandbox_field_key: String::new(),
            sandbox_value: String::new(),
            run_test_transaction: false,
        };
        config.normalize();
        config
    }

    fn entry(case: u32, txn: &str) -> ResultEntry {
        ResultEntry {
            test_case: String::new(),
            test_case_number: case,
            transaction_id: txn.to_string(),
            field_tested: "PostalCode".to_string(),
        }
    }

    #[test]
    fn config_normalizes_to_five_cases() {
        let config = config();
        assert_eq!(config.test_cases.len(), CASE_COUNT);
        assert_eq!(config.case_value(2), "BADVALUE");
        assert_eq!(config.case_value(5), "");
    }

    #[test]
    fn config_yaml_wire_names_are_camel_case() {
        let yaml = r#"
interfaceUrl: "https://example.test/verify"
debugUrl: "https://example.test/debug"
country: Portugal
fieldToTest: Gender
testCases: ["", "Z"]
runTestTransaction: true
"#;
        let mut config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        config.normalize();
        assert_eq!(config.country, "Portugal");
        assert!(config.run_test_transaction);
        assert_eq!(config.case_value(2), "Z");
    }

    #[test]
    fn first_write_wins_per_case() {
        let mut record = RunRecord::new(&config());
        assert!(record.push_result(entry(1, "TXN-A")));
        assert!(!record.push_result(entry(1, "TXN-B")));
        assert_eq!(record.result_for(1).unwrap().transaction_id, "TXN-A");
        assert_eq!(record.results.len(), 1);
    }

    #[test]
    fn completeness_counts_sentinels() {
        let mut record = RunRecord::new(&config());
        for n in 1..=4 {
            record.push_result(entry(n, "TXN"));
        }
        assert!(!record.is_complete());
        record.push_result(entry(5, NOT_FOUND));
        assert!(record.is_complete());
        assert_eq!(record.tokens_found(), 4);
    }

    #[test]
    fn history_is_bounded_fifo() {
        let mut history = Vec::new();
        let ids: Vec<String> = (0..12)
            .map(|_| {
                let record = RunRecord::new(&config());
                let id = record.run_id.clone();
                push_history(&mut history, record);
                id
            })
            .collect();
        assert_eq!(history.len(), MAX_HISTORY);
        // the two oldest were evicted
        assert_eq!(history[0].run_id, ids[2]);
        assert_eq!(history[9].run_id, ids[11]);
    }

    #[test]
    fn history_update_replaces_matching_run() {
        let mut history = Vec::new();
        let mut record = RunRecord::new(&config());
        push_history(&mut history, record.clone());
        record.push_result(entry(1, "TXN"));
        update_history(&mut history, &record);
        assert_eq!(history[0].results.len(), 1);
    }
}
