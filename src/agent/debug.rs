//! Debug-page replay: inject a transaction id, trigger the lookup, and
//! expand the result sections.

use super::locator::js_string;
use super::AgentError;
use crate::driver::PageDriver;
use crate::utils::config::Pacing;

/// Result sections to expand after a lookup, matched on normalized header
/// text. The raw-response header appears with and without the plural.
const SECTION_NEEDLES: &[(&str, &str)] = &[
    ("human readable", "Human Readable"),
    ("debug raw datasource response", "Debug Raw Datasource Response"),
    ("debug raw datasource responses", "Debug Raw Datasource Responses"),
    ("debug raw", "Debug Raw"),
];

/// Fill the debug input with the transaction id, click Lookup, and expand
/// the result sections. The lookup input being missing is the only hard
/// failure; everything after degrades to logged warnings.
pub async fn debug_transaction(
    page: &dyn PageDriver,
    pacing: &Pacing,
    transaction_id: &str,
) -> Result<(), AgentError> {
    tokio::time::sleep(pacing.debug_settle).await;

    let filled = fill_debug_input(page, transaction_id).await?;
    if !filled {
        return Err(AgentError::ElementNotFound(
            "debug transaction-id input".to_string(),
        ));
    }

    tokio::time::sleep(pacing.lookup_click_delay).await;

    if !click_lookup(page).await? {
        log::warn!("lookup control not found; transaction id left in the input");
        return Ok(());
    }

    tokio::time::sleep(pacing.post_lookup_wait).await;
    let expanded = expand_result_sections(page, pacing).await;
    if expanded == 0 {
        log::warn!("no result sections expanded after lookup");
    }
    Ok(())
}

/// Locate the debug input by name/id/placeholder, then by proximity to the
/// Lookup control; set the id with keyboard events so the page notices.
async fn fill_debug_input(
    page: &dyn PageDriver,
    transaction_id: &str,
) -> Result<bool, AgentError> {
    let js = format!(
        r#"() => {{
  let input =
    document.querySelector('input[type="text"][name*="TransactionRecordID" i]') ||
    document.querySelector('input[type="text"][id*="TransactionRecordID" i]') ||
    document.querySelector('input[type="text"][name*="TransactionID" i]') ||
    document.querySelector('input[type="text"][id*="TransactionID" i]') ||
    document.querySelector('input[type="text"][placeholder*="TransactionRecordID" i]') ||
    document.querySelector('input[type="text"][placeholder*="TransactionID" i]') ||
    document.querySelector('input[type="text"]');
  if (!input) {{
    const lookup = document.querySelector('input[type="submit"][value="Lookup"]') ||
                   document.querySelector('button[type="submit"]');
    if (lookup) {{
      const form = lookup.closest('form') || lookup.parentElement;
      if (form) {{
        const candidates = Array.from(form.querySelectorAll('input[type="text"]'));
        if (candidates.length === 1) input = candidates[0];
        else if (candidates.length > 1) {{
          input = candidates.find(el =>
            /transaction(record)?id/i.test(el.name || '') ||
            /transaction(record)?id/i.test(el.id || '') ||
            /transaction/i.test(el.placeholder || '')) || candidates[0];
        }}
      }}
    }}
  }}
  if (!input) return false;
  input.value = '';
  input.value = {token};
  input.focus();
  input.dispatchEvent(new Event('input', {{ bubbles: true }}));
  input.dispatchEvent(new Event('change', {{ bubbles: true }}));
  input.dispatchEvent(new KeyboardEvent('keydown', {{ bubbles: true }}));
  input.dispatchEvent(new KeyboardEvent('keyup', {{ bubbles: true }}));
  return true;
}}"#,
        token = js_string(transaction_id)
    );
    let value = page
        .eval(&js)
        .await
        .map_err(|e| AgentError::Page(e.to_string()))?;
    Ok(value.as_bool() == Some(true))
}

async fn click_lookup(page: &dyn PageDriver) -> Result<bool, AgentError> {
    let js = r#"() => {
  let btn = document.querySelector('input[type="submit"][value="Lookup"]');
  if (!btn) {
    btn = document.querySelector('button[type="submit"]') || document.querySelector('input[type="submit"]');
  }
  if (!btn) {
    for (const b of Array.from(document.querySelectorAll('input[type="submit"], input[type="button"], button, a'))) {
      if (((b.value || b.textContent) || '').trim().toLowerCase().includes('lookup')) { btn = b; break; }
    }
  }
  if (!btn) return false;
  btn.click();
  return true;
}"#;
    let value = page
        .eval(js)
        .await
        .map_err(|e| AgentError::Page(e.to_string()))?;
    Ok(value.as_bool() == Some(true))
}

/// Expand every known result section, retrying each a bounded number of
/// times and verifying via aria/visibility. Returns how many ended expanded.
pub async fn expand_result_sections(page: &dyn PageDriver, pacing: &Pacing) -> usize {
    let mut expanded = 0;
    let mut found_any = false;
    for (needle, label) in SECTION_NEEDLES {
        match section_state(page, needle).await {
            Ok(SectionState::Missing) => continue,
            Ok(_) => found_any = true,
            Err(e) => {
                log::warn!("section probe failed for \"{label}\": {e}");
                continue;
            }
        }
        if ensure_expanded(page, pacing, needle, label).await {
            expanded += 1;
        }
    }
    if !found_any {
        log::warn!("expected debug result sections not found by header text");
    }
    expanded
}

#[derive(Debug, PartialEq, Eq)]
enum SectionState {
    Missing,
    Collapsed,
    Expanded,
}

async fn section_state(page: &dyn PageDriver, needle: &str) -> Result<SectionState, AgentError> {
    let js = format!(
        r#"() => {{
  const needle = {needle};
  const normalize = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
  const headers = Array.from(document.querySelectorAll('h3.ui-accordion-header, .ui-accordion-header, h3, .accordion-header'));
  const header = headers.find(h => normalize(h.textContent).includes(needle));
  if (!header) return 'missing';
  if (header.getAttribute('aria-expanded') === 'true') return 'expanded';
  const panel = header.nextElementSibling;
  if (panel) {{
    const cs = window.getComputedStyle(panel);
    if (cs && cs.display !== 'none' && cs.visibility !== 'hidden' && panel.clientHeight > 0) return 'expanded';
  }}
  return 'collapsed';
}}"#,
        needle = js_string(needle)
    );
    let value = page
        .eval(&js)
        .await
        .map_err(|e| AgentError::Page(e.to_string()))?;
    Ok(match value.as_str() {
        Some("expanded") => SectionState::Expanded,
        Some("collapsed") => SectionState::Collapsed,
        _ => SectionState::Missing,
    })
}

async fn click_section_header(page: &dyn PageDriver, needle: &str) -> bool {
    let js = format!(
        r#"() => {{
  const needle = {needle};
  const normalize = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
  const headers = Array.from(document.querySelectorAll('h3.ui-accordion-header, .ui-accordion-header, h3, .accordion-header'));
  const header = headers.find(h => normalize(h.textContent).includes(needle));
  if (!header) return false;
  try {{ header.scrollIntoView({{ behavior: 'instant', block: 'center' }}); }} catch (_) {{}}
  try {{ header.click(); }} catch (_) {{ header.dispatchEvent(new MouseEvent('click', {{ bubbles: true }})); }}
  const toggle = header.querySelector('button, .toggle, .ui-accordion-header-icon');
  if (toggle) {{
    try {{ toggle.click(); }} catch (_) {{ toggle.dispatchEvent(new MouseEvent('click', {{ bubbles: true }})); }}
  }}
  return true;
}}"#,
        needle = js_string(needle)
    );
    matches!(page.eval(&js).await, Ok(v) if v.as_bool() == Some(true))
}

async fn ensure_expanded(
    page: &dyn PageDriver,
    pacing: &Pacing,
    needle: &str,
    label: &str,
) -> bool {
    for attempt in 1..=pacing.expand_attempts {
        match section_state(page, needle).await {
            Ok(SectionState::Expanded) => {
                log::debug!("section \"{label}\" expanded (attempt {attempt})");
                return true;
            }
            Ok(SectionState::Missing) => return false,
            Ok(SectionState::Collapsed) => {
                click_section_header(page, needle).await;
            }
            Err(e) => log::debug!("section state check failed for \"{label}\": {e}"),
        }
        tokio::time::sleep(pacing.expand_interval).await;
    }
    let ended_expanded = matches!(
        section_state(page, needle).await,
        Ok(SectionState::Expanded)
    );
    if !ended_expanded {
        log::warn!("failed to expand \"{label}\" after {} attempts", pacing.expand_attempts);
    }
    ended_expanded
}
