//! Transaction-id extraction
//!
//! After a submission, the page is polled until the transaction id shows up
//! or the budget runs out. Each tick tries four strategies in order:
//! structured label/value span pairs, a label-adjacent row search, a
//! transaction-ish input/span attribute match, and finally a free-text regex
//! over the rendered page text (applied in Rust). On exhaustion the
//! [`NOT_FOUND`] sentinel is returned rather than an error.

use crate::driver::common::{poll_value, PollConfig};
use crate::driver::PageDriver;
use regex::Regex;
use std::sync::OnceLock;

/// Sentinel used when no transaction id was detected within the budget
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Strategies 1-3: structured DOM scans, first non-empty match wins
const DOM_SCAN_JS: &str = r#"() => {
  // structured label/value pair
  for (const span of document.querySelectorAll('span.label')) {
    if (!(span.textContent || '').includes('Transaction ID:')) continue;
    const next = span.nextElementSibling;
    if (next && next.classList.contains('value')) {
      const id = (next.textContent || '').trim();
      if (id) return id;
    }
    const parent = span.parentElement;
    if (parent) {
      const inParent = parent.querySelector('span.value');
      if (inParent) {
        const id = (inParent.textContent || '').trim();
        if (id) return id;
      }
    }
  }
  // label-adjacent row search
  for (const label of document.querySelectorAll('span.label')) {
    if (!(label.textContent || '').trim().includes('Transaction ID')) continue;
    const row = label.closest('tr') || label.closest('td') || label.parentElement;
    if (!row) continue;
    const valueSpan = row.querySelector('span.value[data-hj-suppress="true"]') ||
                      row.querySelector('span.value');
    if (valueSpan) {
      const id = (valueSpan.textContent || '').trim();
      if (id) return id;
    }
  }
  // transaction-ish input or span attributes
  const el = document.querySelector('input[name*="TransactionID" i]') ||
             document.querySelector('input[id*="TransactionID" i]') ||
             document.querySelector('input[name*="TransactionRecordID" i]') ||
             document.querySelector('input[id*="TransactionRecordID" i]') ||
             document.querySelector('span[class*="transaction" i]');
  if (el) {
    const id = ((el.value || el.textContent) || '').trim();
    if (id) return id;
  }
  return null;
}"#;

const BODY_TEXT_JS: &str = "() => document.body ? document.body.innerText : ''";

fn token_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)Transaction\s*ID[:\s]+([A-Za-z0-9-]{20,})").expect("valid pattern"),
            Regex::new(r"(?i)TransactionID[:\s]+([A-Za-z0-9-]{20,})").expect("valid pattern"),
        ]
    })
}

/// Strategy 4: free-text scan of the rendered page text
pub fn scan_page_text(text: &str) -> Option<String> {
    for pattern in token_patterns() {
        if let Some(captures) = pattern.captures(text) {
            if let Some(id) = captures.get(1) {
                return Some(id.as_str().to_string());
            }
        }
    }
    None
}

/// Run every strategy once against the current page state
pub async fn try_extract_once(page: &dyn PageDriver) -> anyhow::Result<Option<String>> {
    let scanned = page.eval(DOM_SCAN_JS).await?;
    if let Some(id) = scanned.as_str() {
        let id = id.trim();
        if !id.is_empty() {
            return Ok(Some(id.to_string()));
        }
    }
    let body = page.eval(BODY_TEXT_JS).await?;
    Ok(body.as_str().and_then(scan_page_text))
}

/// Poll the page for a transaction id; [`NOT_FOUND`] on exhaustion
pub async fn extract_transaction_id(page: &dyn PageDriver, poll: &PollConfig) -> String {
    let found = poll_value(|| try_extract_once(page), poll).await;
    match found {
        Some(id) => {
            log::debug!("transaction id extracted: {id}");
            id
        }
        None => {
            log::warn!(
                "no transaction id within {}ms; reporting {NOT_FOUND}",
                poll.timeout.as_millis()
            );
            NOT_FOUND.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_text_scan_matches_labelled_token() {
        let text = "Summary\nTransaction ID: 0123456789abcdef0123-xyz\nother";
        assert_eq!(
            scan_page_text(text).as_deref(),
            Some("0123456789abcdef0123-xyz")
        );
    }

    #[test]
    fn free_text_scan_matches_compact_label() {
        let text = "TransactionID 11111111-2222-3333-4444-555555555555";
        assert_eq!(
            scan_page_text(text).as_deref(),
            Some("11111111-2222-3333-4444-555555555555")
        );
    }

    #[test]
    fn free_text_scan_rejects_short_ids() {
        // ids shorter than 20 chars are too likely to be noise
        assert_eq!(scan_page_text("Transaction ID: abc123"), None);
        assert_eq!(scan_page_text("no token here"), None);
    }

    #[test]
    fn free_text_scan_is_case_insensitive() {
        let text = "transaction id: AAAABBBBCCCCDDDDEEEE1234";
        assert_eq!(
            scan_page_text(text).as_deref(),
            Some("AAAABBBBCCCCDDDDEEEE1234")
        );
    }
}
