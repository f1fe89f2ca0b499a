use serde_json::Value;

use crate::types::ActionResult;

/// Pixels moved by one scroll action.
pub const SCROLL_STEP: i64 = 500;

/// Script that clicks the first clickable element whose visible text,
/// value or alt text contains `target` (case-insensitive).
///
/// Evaluates to a JSON string shaped like an [`ActionResult`].
pub fn click_script(target: &str) -> String {
    let needle = js_string(&target.to_lowercase());
    format!(
        r#"
(() => {{
  const needle = {needle};
  const elements = document.querySelectorAll('a, button, input[type="submit"], [role="button"]');
  for (const el of elements) {{
    const text = (el.textContent || el.value || el.alt || '').trim();
    if (text.toLowerCase().includes(needle)) {{
      el.click();
      return JSON.stringify({{ success: true, element: text.slice(0, 100) }});
    }}
  }}
  return JSON.stringify({{ success: false, error: 'Element not found' }});
}})()
"#
    )
}

/// Script that sets the value of the first form control whose name, id or
/// placeholder contains `field`, firing `input` and `change` so page
/// frameworks notice.
pub fn fill_script(field: &str, value: &str) -> String {
    let needle = js_string(&field.to_lowercase());
    let value = js_string(value);
    format!(
        r#"
(() => {{
  const needle = {needle};
  const inputs = document.querySelectorAll('input, textarea, select');
  for (const input of inputs) {{
    const name = input.name || input.id || input.placeholder || '';
    if (name.toLowerCase().includes(needle)) {{
      input.value = {value};
      input.dispatchEvent(new Event('input', {{ bubbles: true }}));
      input.dispatchEvent(new Event('change', {{ bubbles: true }}));
      return JSON.stringify({{ success: true, field: name }});
    }}
  }}
  return JSON.stringify({{ success: false, error: 'Field not found' }});
}})()
"#
    )
}

/// Search engine URL for `query`.
pub fn search_url(base: &str, query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    format!("{base}{encoded}")
}

/// Turn whatever a page script evaluated to into an [`ActionResult`].
/// Accepts the JSON string our scripts return, or an already decoded object.
pub fn decode_script_result(value: Value) -> ActionResult {
    let parsed = match value {
        Value::String(raw) => serde_json::from_str::<ActionResult>(&raw),
        other => serde_json::from_value::<ActionResult>(other),
    };
    match parsed {
        Ok(result) => result.normalized(),
        Err(e) => ActionResult::failure(format!("Unreadable script result: {e}")),
    }
}

fn js_string(s: &str) -> String {
    // A JSON string literal is a valid JS string literal.
    serde_json::to_string(s).unwrap_or_else(|_| "''".to_string())
}
