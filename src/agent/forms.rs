//! Form interactions: country picker, field filling, selects, the consent
//! checkbox, and the verify click.
//!
//! All DOM work is shipped to the page as JS and evaluated in one round trip
//! per interaction. Lookup failures are not fatal: a control that cannot be
//! found is logged and skipped, leaving the field at its prior value.

use super::locator::{self, js_string, Probe};
use super::AgentError;
use crate::driver::common::{wait_until, PollConfig};
use crate::driver::PageDriver;
use crate::utils::config::Pacing;
use anyhow::Result;

/// Fill a control located through the probe chain. Returns `false` (after
/// logging) when every probe came up empty.
pub async fn set_field(page: &dyn PageDriver, selector: &str, hint: &str, value: &str) -> bool {
    let probes = locator::probe_chain(selector, hint);
    set_field_with(page, &probes, value).await
}

pub async fn set_field_with(page: &dyn PageDriver, probes: &[Probe], value: &str) -> bool {
    let js = locator::set_value_js(probes, value);
    match page.eval(&js).await {
        Ok(v) if v.as_bool() == Some(true) => true,
        Ok(_) => {
            log::warn!("element not found for {probes:?}; field left unchanged");
            false
        }
        Err(e) => {
            log::warn!("set_field failed for {probes:?}: {e:#}");
            false
        }
    }
}

/// Pick a random usable option of a select (placeholders filtered out)
pub async fn set_select_random(page: &dyn PageDriver, selector: &str) -> bool {
    let js = format!(
        r#"() => {{
  const el = document.querySelector({sel});
  if (!el || el.tagName !== 'SELECT') return false;
  const usable = Array.from(el.options || []).filter(o => {{
    const text = (o.textContent || '').trim().toLowerCase();
    const val = (o.value || '').trim();
    if (!val && !text) return false;
    if (text.includes('not selected')) return false;
    return true;
  }});
  if (usable.length === 0) return false;
  const pick = usable[Math.floor(Math.random() * usable.length)];
  el.value = pick.value;
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  return true;
}}"#,
        sel = js_string(selector)
    );
    match page.eval(&js).await {
        Ok(v) if v.as_bool() == Some(true) => true,
        Ok(_) => {
            log::warn!("no usable option for select {selector}");
            false
        }
        Err(e) => {
            log::warn!("set_select_random failed for {selector}: {e:#}");
            false
        }
    }
}

/// Open the country picker, fuzzy-match the wanted label, and trigger its
/// radio. Fails soft: a missing picker or label is logged and `Ok(false)`.
pub async fn select_country(page: &dyn PageDriver, pacing: &Pacing, country: &str) -> Result<bool> {
    let open_js = r#"() => {
  let btn = document.querySelector('.change-country-button');
  if (!btn) {
    for (const b of document.querySelectorAll('button')) {
      const text = b.textContent || '';
      if (text.includes('Change Country') || text.includes('change-country')) { btn = b; break; }
    }
  }
  if (!btn) return false;
  btn.click();
  return true;
}"#;
    let opened = page.eval(open_js).await?.as_bool() == Some(true);
    if !opened {
        log::warn!("change-country control not found; keeping current country");
        return Ok(false);
    }

    tokio::time::sleep(pacing.picker_wait).await;

    let pick_js = format!(
        r#"() => {{
  const wanted = {country};
  const picker = document.querySelector('.country-picker') || document.querySelector('div[class*="country"]');
  if (!picker) return 'no-picker';
  for (const label of Array.from(picker.querySelectorAll('label'))) {{
    const text = (label.textContent || '').trim();
    if (text !== wanted && !text.includes(wanted)) continue;
    let radio = label.querySelector('input[type="radio"]');
    if (!radio) {{
      radio = label.previousElementSibling;
      if (!radio || radio.type !== 'radio') radio = label.nextElementSibling;
    }}
    if (radio && radio.type === 'radio') {{
      radio.click();
      radio.dispatchEvent(new Event('change', {{ bubbles: true }}));
      radio.dispatchEvent(new Event('click', {{ bubbles: true }}));
    }} else {{
      label.click();
    }}
    return 'selected';
  }}
  return 'no-match';
}}"#,
        country = js_string(country)
    );
    let outcome = page.eval(&pick_js).await?;
    match outcome.as_str() {
        Some("selected") => {
            tokio::time::sleep(pacing.picker_apply).await;
            Ok(true)
        }
        Some(reason) => {
            log::warn!("country '{country}' not selected ({reason}); using the page default");
            Ok(false)
        }
        None => Ok(false),
    }
}

/// Finder shared by the consent-checkbox click and its verification pass
const FIND_CONSENT_FN: &str = r#"() => {
  const norm = (s) => (s || '').toString().toLowerCase();
  const textMatches = (t) => /run\s*a\s*test\s*transaction/.test(norm(t));
  const checkboxes = Array.from(document.querySelectorAll('input[type="checkbox"]'));
  let target = checkboxes.find(cb =>
    (norm(cb.id).includes('test') && norm(cb.id).includes('transaction')) ||
    (norm(cb.name).includes('test') && norm(cb.name).includes('transaction')) ||
    textMatches(cb.title) || textMatches(cb.getAttribute('aria-label')));
  if (!target) {
    for (const label of Array.from(document.querySelectorAll('label'))) {
      if (!textMatches(label.textContent)) continue;
      if (label.control && label.control.type === 'checkbox') { target = label.control; break; }
      const forId = label.getAttribute('for');
      if (forId) {
        const byFor = document.getElementById(forId);
        if (byFor && byFor.type === 'checkbox') { target = byFor; break; }
      }
      const nested = label.querySelector('input[type="checkbox"]');
      if (nested) { target = nested; break; }
    }
  }
  if (!target) target = document.querySelector('input[type="checkbox"].regular-checkbox');
  if (!target && checkboxes.length === 1) target = checkboxes[0];
  return target || null;
}"#;

/// Tick the "run a test transaction" checkbox: native click first so bound
/// listeners run, then verify and force the state if the click bounced.
pub async fn set_consent_checkbox(page: &dyn PageDriver, pacing: &Pacing) -> bool {
    let click_js = format!(
        r#"() => {{
  const find = {FIND_CONSENT_FN};
  const target = find();
  if (!target) return false;
  target.scrollIntoView({{ behavior: 'instant', block: 'center' }});
  try {{ target.click(); }} catch (_) {{ target.checked = true; }}
  target.dispatchEvent(new Event('input', {{ bubbles: true }}));
  target.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}}"#
    );
    let clicked = matches!(page.eval(&click_js).await, Ok(v) if v.as_bool() == Some(true));
    if !clicked {
        log::warn!("consent checkbox not found; submitting without it");
        return false;
    }

    tokio::time::sleep(pacing.checkbox_verify).await;

    let force_js = format!(
        r#"() => {{
  const find = {FIND_CONSENT_FN};
  const target = find();
  if (!target) return false;
  if (!target.checked) {{
    target.checked = true;
    target.dispatchEvent(new Event('change', {{ bubbles: true }}));
  }}
  return target.checked;
}}"#
    );
    match page.eval(&force_js).await {
        Ok(v) => v.as_bool() == Some(true),
        Err(e) => {
            log::warn!("consent checkbox verification failed: {e:#}");
            false
        }
    }
}

/// Find and click the verify control, waiting for it to become visible and
/// enabled within the submit budget; fall back to native form submission.
/// Returns `false` when nothing could be triggered at all.
pub async fn click_verify(page: &dyn PageDriver, pacing: &Pacing) -> bool {
    let tick_js = r#"() => {
  const matchButton = (root) => {
    const byId = root.querySelector('#verification-button');
    if (byId) return byId;
    const candidates = Array.from(root.querySelectorAll('button, input[type="button"], input[type="submit"], a[role="button"]'));
    return candidates.find(el => /\bverify\b/i.test(((el.textContent || el.value || '')).trim())) || null;
  };
  let btn = matchButton(document);
  if (!btn) {
    for (const f of Array.from(document.querySelectorAll('iframe'))) {
      try {
        const doc = f.contentDocument || (f.contentWindow && f.contentWindow.document);
        if (!doc) continue;
        btn = matchButton(doc);
        if (btn) break;
      } catch (_) { /* cross-origin frame */ }
    }
  }
  if (!btn) return 'missing';
  try { btn.scrollIntoView({ behavior: 'instant', block: 'center' }); } catch (_) {}
  const rect = btn.getBoundingClientRect();
  if (!rect || rect.width === 0 || rect.height === 0) return 'not-ready';
  if (btn.disabled || btn.getAttribute('disabled') !== null || btn.getAttribute('aria-disabled') === 'true') return 'not-ready';
  try { btn.click(); } catch (_) { btn.dispatchEvent(new MouseEvent('click', { bubbles: true })); }
  return 'clicked';
}"#;

    let poll = PollConfig::new(pacing.submit_timeout, pacing.submit_poll);
    let clicked = wait_until(
        || async {
            matches!(
                page.eval(tick_js).await,
                Ok(v) if v.as_str() == Some("clicked")
            )
        },
        &poll,
    )
    .await;
    if clicked {
        return true;
    }

    // fall back to submitting the form directly
    let fallback_js = r#"() => {
  const form = document.querySelector('form');
  if (!form) return false;
  if (typeof form.requestSubmit === 'function') form.requestSubmit(); else form.submit();
  return true;
}"#;
    match page.eval(fallback_js).await {
        Ok(v) if v.as_bool() == Some(true) => {
            log::warn!("verify control not clickable; submitted the form directly");
            true
        }
        _ => false,
    }
}

/// Raw option of a select, as scraped from the page
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawOption {
    pub text: String,
    pub value: String,
}

/// Scrape the visible option labels of a select, for seeding value lists.
/// Users expect the human-readable labels ('Johor', 'Kedah'), not coded
/// values ('01', '02').
pub async fn scrape_select_options(
    page: &dyn PageDriver,
    select_id: &str,
) -> Result<Vec<String>, AgentError> {
    let selector = if select_id.starts_with('#') || select_id.starts_with('.') {
        select_id.to_string()
    } else {
        format!("#{select_id}")
    };
    let js = format!(
        r#"() => {{
  const el = document.querySelector({sel});
  if (!el || el.tagName !== 'SELECT') return null;
  return Array.from(el.options || []).map(o => ({{
    text: ((o.textContent || o.label || '')).trim(),
    value: (o.value || '').trim()
  }}));
}}"#,
        sel = js_string(&selector)
    );
    let raw = page
        .eval(&js)
        .await
        .map_err(|e| AgentError::Page(e.to_string()))?;
    if raw.is_null() {
        return Err(AgentError::ElementNotFound(selector));
    }
    let options: Vec<RawOption> =
        serde_json::from_value(raw).map_err(|e| AgentError::Page(e.to_string()))?;
    Ok(filter_option_labels(options))
}

/// Prefer the visible text, fall back to the value, drop placeholders, and
/// dedupe while preserving order.
pub fn filter_option_labels(options: Vec<RawOption>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    options
        .into_iter()
        .filter_map(|o| {
            let label = if o.text.is_empty() { o.value } else { o.text };
            let trimmed = label.trim().to_string();
            if trimmed.is_empty() {
                return None;
            }
            let lower = trimmed.to_lowercase();
            if lower == "not selected" || lower == "select" || lower == "please select" {
                return None;
            }
            if !seen.insert(trimmed.clone()) {
                return None;
            }
            Some(trimmed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(text: &str, value: &str) -> RawOption {
        RawOption {
            text: text.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn option_labels_prefer_text_over_value() {
        let labels = filter_option_labels(vec![opt("Johor", "01"), opt("", "02")]);
        assert_eq!(labels, vec!["Johor", "02"]);
    }

    #[test]
    fn option_labels_drop_placeholders_and_empties() {
        let labels = filter_option_labels(vec![
            opt("Not Selected", ""),
            opt("Please Select", ""),
            opt("Select", ""),
            opt("", ""),
            opt("Kedah", "02"),
        ]);
        assert_eq!(labels, vec!["Kedah"]);
    }

    #[test]
    fn option_labels_dedupe_in_order() {
        let labels = filter_option_labels(vec![
            opt("Johor", "01"),
            opt("Kedah", "02"),
            opt("Johor", "03"),
        ]);
        assert_eq!(labels, vec!["Johor", "Kedah"]);
    }
}
