//! In-page scripts evaluated by the inspector.
//!
//! Each script starts with a marker comment so drivers and test doubles can
//! tell them apart without comparing whole bodies.

pub const WEB_VITALS_MARKER: &str = "/* audit:web-vitals */";
pub const LAYOUT_MARKER: &str = "/* audit:layout */";
pub const DOCUMENT_HTML_MARKER: &str = "/* audit:document-html */";

/// Resolves to `{fcp, lcp, cls, interactionDelayMs}` in milliseconds
/// (cls unitless). Interaction delay is estimated from the longest main-thread
/// task past the 50ms budget.
pub const WEB_VITALS: &str = r#"/* audit:web-vitals */
new Promise((resolve) => {
  const result = { fcp: null, lcp: null, cls: 0, interactionDelayMs: null };
  const paint = performance.getEntriesByType('paint')
    .find((e) => e.name === 'first-contentful-paint');
  if (paint) result.fcp = paint.startTime;
  const observe = (type, onEntries) => {
    try {
      new PerformanceObserver((list) => onEntries(list.getEntries()))
        .observe({ type, buffered: true });
    } catch (_) {}
  };
  observe('largest-contentful-paint', (entries) => {
    const last = entries[entries.length - 1];
    if (last) result.lcp = last.renderTime || last.loadTime || last.startTime;
  });
  observe('layout-shift', (entries) => {
    for (const e of entries) if (!e.hadRecentInput) result.cls += e.value;
  });
  observe('longtask', (entries) => {
    for (const e of entries) {
      result.interactionDelayMs = Math.max(result.interactionDelayMs || 0, e.duration - 50);
    }
  });
  setTimeout(() => {
    if (result.interactionDelayMs === null) result.interactionDelayMs = 0;
    if (result.lcp === null) result.lcp = result.fcp;
    resolve(result);
  }, 1000);
})"#;

/// Returns `{documentWidth, viewportWidth, tapTargets, smallTapTargets, baseFontPx}`.
pub fn layout_metrics(min_tap_target_px: f64) -> String {
    format!(
        r#"{LAYOUT_MARKER}
(() => {{
  const min = {min_tap_target_px};
  const selector = 'a[href], button, input, select, textarea, [role="button"], [onclick]';
  let visible = 0;
  let small = 0;
  for (const el of document.querySelectorAll(selector)) {{
    const r = el.getBoundingClientRect();
    if (r.width === 0 || r.height === 0) continue;
    visible += 1;
    if (r.width < min || r.height < min) small += 1;
  }}
  const root = document.documentElement;
  const body = document.body || root;
  return {{
    documentWidth: Math.max(root.scrollWidth, body.scrollWidth),
    viewportWidth: window.innerWidth,
    tapTargets: visible,
    smallTapTargets: small,
    baseFontPx: parseFloat(getComputedStyle(body).fontSize) || 16,
  }};
}})()"#
    )
}

/// Returns the serialized document.
pub const DOCUMENT_HTML: &str = r#"/* audit:document-html */
document.documentElement.outerHTML"#;
