// common/src/embed/inject.rs
//! Storage intercept injection into embedded app HTML.
use crate::models::InterceptConfiguration;
use crate::utils::escape_html_attr;

/// `name` of the `<meta>` tag carrying the override map
pub const INTERCEPT_META_NAME: &str = "bloud-intercepts";

/// Runs inside the app document and patches IndexedDB/localStorage reads.
const INTERCEPT_SCRIPT: &str = include_str!("intercept.js");

/// `<meta>` + `<script>` block for `config`, or `None` when there is nothing
/// to override.
pub fn build_injection_payload(config: &InterceptConfiguration) -> Option<String> {
    if config.is_empty() {
        return None;
    }

    let json = match serde_json::to_string(config) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("Failed to serialize intercept configuration: {}", e);
            return None;
        }
    };

    Some(format!(
        "<meta name=\"{}\" content=\"{}\">\n<script>\n{}</script>\n",
        INTERCEPT_META_NAME,
        escape_html_attr(&json),
        INTERCEPT_SCRIPT
    ))
}

/// Insert `payload` right after the opening `<head>` tag, else after the
/// doctype, else at the very start.
pub fn inject_into_html(html: &str, payload: &str) -> String {
    let at = head_insert_position(html)
        .or_else(|| doctype_insert_position(html))
        .unwrap_or(0);

    let mut out = String::with_capacity(html.len() + payload.len());
    out.push_str(&html[..at]);
    out.push_str(payload);
    out.push_str(&html[at..]);
    out
}

fn head_insert_position(html: &str) -> Option<usize> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(found) = lower[from..].find("<head") {
        let start = from + found;
        let after = start + "<head".len();
        // skip <header>
        match lower.as_bytes().get(after) {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/') => {
                return lower[after..].find('>').map(|end| after + end + 1);
            }
            _ => from = after,
        }
    }
    None
}

fn doctype_insert_position(html: &str) -> Option<usize> {
    let lower = html.to_ascii_lowercase();
    let start = lower.find("<!doctype")?;
    lower[start..].find('>').map(|end| start + end + 1)
}
