//! Heuristic element lookup
//!
//! Form controls are located through an escalating chain of probes: an exact
//! CSS selector, the raw element id, a placeholder/name/aria-label substring
//! match, and finally the text of an associated label. The chain is built
//! here as data, rendered to a single JS expression, and evaluated in the
//! page in one round trip; the first probe that yields an element wins.

/// A single lookup strategy, ordered from most to least specific
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Exact CSS selector
    Css(String),
    /// Raw element id
    RawId(String),
    /// Substring match on placeholder / name / aria-label of form controls
    AttrContains(String),
    /// Substring match on an associated `<label>`'s text
    LabelText(String),
}

/// Quote a string as a JS literal
pub fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Build the probe chain for a selector (or raw id) plus an optional label
/// hint, mirroring how a human would hunt for the control.
pub fn probe_chain(selector_or_id: &str, label_hint: &str) -> Vec<Probe> {
    let mut probes = Vec::new();
    let trimmed = selector_or_id.trim();

    let looks_like_selector = trimmed.starts_with('#')
        || trimmed.starts_with('.')
        || trimmed.starts_with('[')
        || trimmed.contains(' ');
    if looks_like_selector {
        probes.push(Probe::Css(trimmed.to_string()));
    }

    let raw_id = trimmed.trim_start_matches('#').trim();
    if !raw_id.is_empty() && !raw_id.contains(' ') {
        probes.push(Probe::RawId(raw_id.to_string()));
    }

    let hint = if !label_hint.trim().is_empty() {
        label_hint.trim().to_lowercase()
    } else if !raw_id.is_empty() {
        raw_id.to_lowercase()
    } else {
        trimmed.to_lowercase()
    };
    if !hint.is_empty() {
        probes.push(Probe::AttrContains(hint.clone()));
        probes.push(Probe::LabelText(hint));
    }

    probes
}

impl Probe {
    /// Render this probe as a JS expression evaluating to `Element | null`
    pub fn js_expr(&self) -> String {
        match self {
            Probe::Css(selector) => format!(
                "(() => {{ try {{ return document.querySelector({}); }} catch (_) {{ return null; }} }})()",
                js_string(selector)
            ),
            Probe::RawId(id) => format!("document.getElementById({})", js_string(id)),
            Probe::AttrContains(hint) => format!(
                r#"(() => {{
  const hint = {};
  const candidates = Array.from(document.querySelectorAll('input, textarea, select, [contenteditable="true"]'));
  return candidates.find(c => {{
    const txt = ((c.getAttribute('placeholder') || '') + ' ' + (c.getAttribute('aria-label') || '') + ' ' + (c.name || '')).toLowerCase();
    return txt.includes(hint);
  }}) || null;
}})()"#,
                js_string(hint)
            ),
            Probe::LabelText(hint) => format!(
                r#"(() => {{
  const hint = {};
  const label = Array.from(document.querySelectorAll('label'))
    .find(l => (l.textContent || '').trim().toLowerCase().includes(hint));
  if (!label) return null;
  if (label.control) return label.control;
  const forId = label.getAttribute('for');
  if (forId) {{
    const byFor = document.getElementById(forId);
    if (byFor) return byFor;
  }}
  return label.querySelector('input, textarea, select, [contenteditable="true"]');
}})()"#,
                js_string(hint)
            ),
        }
    }
}

/// Chain the probes into one `Element | null` expression, first match wins
pub fn finder_expr(probes: &[Probe]) -> String {
    if probes.is_empty() {
        return "null".to_string();
    }
    probes
        .iter()
        .map(|p| format!("({})", p.js_expr()))
        .collect::<Vec<_>>()
        .join(" || ")
}

/// Value assignment through the input's native setter, so listeners bound by
/// reactive frameworks observe the change, followed by synthetic
/// input/change/blur events. Selects match by value, exact text, then
/// contains-text.
const SET_VALUE_FN: &str = r#"(el, value) => {
  const fire = (name) => { try { el.dispatchEvent(new Event(name, { bubbles: true })); } catch (_) {} };
  if (el.tagName === 'SELECT') {
    const options = Array.from(el.options || []);
    let matched = options.find(o => o.value == value);
    if (!matched) {
      const want = String(value || '').trim().toLowerCase();
      matched = options.find(o => (o.textContent || '').trim().toLowerCase() === want) ||
                options.find(o => (o.textContent || '').toLowerCase().includes(want));
    }
    el.value = matched ? matched.value : value;
  } else if (el.tagName === 'INPUT') {
    const desc = Object.getOwnPropertyDescriptor(window.HTMLInputElement.prototype, 'value');
    if (desc && desc.set) desc.set.call(el, value); else el.value = value;
    if ((el.type || '').toLowerCase() === 'checkbox') el.checked = !!value;
  } else if (el.tagName === 'TEXTAREA') {
    const desc = Object.getOwnPropertyDescriptor(window.HTMLTextAreaElement.prototype, 'value');
    if (desc && desc.set) desc.set.call(el, value); else el.value = value;
  } else if (el.isContentEditable) {
    el.textContent = value;
  } else {
    el.value = value;
  }
  fire('input'); fire('change'); fire('blur');
}"#;

/// Full script: locate through the chain and assign the value. Evaluates to
/// `true` when an element was found and filled.
pub fn set_value_js(probes: &[Probe], value: &str) -> String {
    format!(
        r#"() => {{
  const el = {};
  if (!el) return false;
  const assign = {};
  assign(el, {});
  return true;
}}"#,
        finder_expr(probes),
        SET_VALUE_FN,
        js_string(value)
    )
}

/// Script evaluating to `true` when the chain finds an element
pub fn exists_js(probes: &[Probe]) -> String {
    format!("() => !!({})", finder_expr(probes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_input_escalates_through_all_strategies() {
        let probes = probe_chain("#textarea-field-PostalCode", "");
        assert_eq!(
            probes,
            vec![
                Probe::Css("#textarea-field-PostalCode".to_string()),
                Probe::RawId("textarea-field-PostalCode".to_string()),
                Probe::AttrContains("textarea-field-postalcode".to_string()),
                Probe::LabelText("textarea-field-postalcode".to_string()),
            ]
        );
    }

    #[test]
    fn raw_id_input_skips_css_probe() {
        let probes = probe_chain("myField", "Postal Code");
        assert_eq!(
            probes,
            vec![
                Probe::RawId("myField".to_string()),
                Probe::AttrContains("postal code".to_string()),
                Probe::LabelText("postal code".to_string()),
            ]
        );
    }

    #[test]
    fn label_hint_overrides_id_derived_hint() {
        let probes = probe_chain("#x", "IBAN");
        assert!(probes.contains(&Probe::AttrContains("iban".to_string())));
        assert!(!probes.contains(&Probe::AttrContains("x".to_string())));
    }

    #[test]
    fn compound_selectors_are_detected() {
        for sel in [".cls", "[name=a]", "form input"] {
            let probes = probe_chain(sel, "");
            assert!(
                matches!(probes.first(), Some(Probe::Css(s)) if s == sel),
                "expected css probe first for {sel:?}"
            );
        }
        // a compound selector is not a usable raw id
        assert!(!probe_chain("form input", "")
            .iter()
            .any(|p| matches!(p, Probe::RawId(_))));
    }

    #[test]
    fn finder_expr_chains_in_order() {
        let probes = probe_chain("#a", "b");
        let expr = finder_expr(&probes);
        let css = expr.find("querySelector").unwrap();
        let by_id = expr.find("getElementById").unwrap();
        let attr = expr.find("placeholder").unwrap();
        let label = expr.find("label.control").unwrap();
        assert!(css < by_id && by_id < attr && attr < label);
    }

    #[test]
    fn empty_chain_renders_null() {
        assert_eq!(finder_expr(&[]), "null");
    }

    #[test]
    fn js_strings_are_quoted_and_escaped() {
        assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
        let js = set_value_js(&probe_chain("#f", ""), "x\"y");
        assert!(js.contains(r#""x\"y""#));
        assert!(js.contains("return false"));
    }
}
