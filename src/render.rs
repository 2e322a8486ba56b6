//! Page rendering seam. Handlers name a view and hand over a JSON object; the renderer
//! turns that into an HTML document.

use anyhow::Result;
use serde_json::Value;

pub trait PageRenderer: Send + Sync {
    fn render(&self, view: &str, data: &Value) -> Result<String>;
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Minimal renderer: a page titled after the view with the data embedded as escaped JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl PageRenderer for HtmlRenderer {
    fn render(&self, view: &str, data: &Value) -> Result<String> {
        let view = escape_html(view);
        let body = escape_html(&serde_json::to_string_pretty(data)?);
        Ok(format!(
            "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>{view}</title></head>\n<body>\n<main data-view=\"{view}\">\n<pre>{body}</pre>\n</main>\n</body>\n</html>\n"
        ))
    }
}
