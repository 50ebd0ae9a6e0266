// common/src/embed/redirect.rs
//! Redirect handling for fetched app responses.
use url::form_urlencoded;
use url::Url;

use super::paths::{embed_root, is_in_embed_namespace, is_sso_path, AUTH_PROXY_PATH, AUTH_SUBDOMAIN_PREFIX, APPS_PREFIX};
use crate::utils::escape_html_attr;

/// Mirrors the `type` a browser reports for a fetch response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Basic,
    Cors,
    Opaque,
    /// Redirect whose target may not be inspected (cross-origin)
    OpaqueRedirect,
    Error,
}

/// The parts of a response redirect detection looks at.
pub trait RedirectLike {
    fn status(&self) -> u16;
    fn response_type(&self) -> ResponseType;
    fn header(&self, name: &str) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    /// Not a redirect, hand the response on
    NotRedirect,
    /// Login flow; navigate the top window instead of the iframe
    Escalate,
    /// Already inside the app's namespace
    PassThrough,
    Rewrite { status: u16, location: String },
}

pub fn classify_redirect<R: RedirectLike + ?Sized>(response: &R, app_name: &str, base: &Url) -> RedirectDecision {
    if response.response_type() == ResponseType::OpaqueRedirect {
        return RedirectDecision::Escalate;
    }

    let status = response.status();
    if !(300..400).contains(&status) {
        return RedirectDecision::NotRedirect;
    }
    let Some(location) = response.header("location") else {
        return RedirectDecision::NotRedirect;
    };
    let Ok(target) = base.join(location) else {
        tracing::debug!("Unparseable redirect location {:?}, leaving as is", location);
        return RedirectDecision::NotRedirect;
    };

    if is_auth_location(&target) {
        return RedirectDecision::Escalate;
    }

    match rewrite_redirect_location(location, app_name, base) {
        Some(location) => RedirectDecision::Rewrite { status, location },
        None => RedirectDecision::PassThrough,
    }
}

/// Location pointing at the identity provider: an `auth.` host or a
/// login-flow path.
pub fn is_auth_location(location: &Url) -> bool {
    let auth_host = location
        .host_str()
        .map(|h| h.starts_with(AUTH_SUBDOMAIN_PREFIX))
        .unwrap_or(false);
    auth_host || is_sso_path(location.path())
}

/// Move a redirect target into `/embed/{app}/`.
///
/// Returns `None` when the target is already inside the namespace, is not
/// same-origin with `base`, or cannot be parsed.
pub fn rewrite_redirect_location(location: &str, app_name: &str, base: &Url) -> Option<String> {
    let target = base.join(location).ok()?;
    if target.origin() != base.origin() {
        return None;
    }
    if is_in_embed_namespace(target.path(), app_name) {
        return None;
    }

    let mut rewritten = target.clone();
    rewritten.set_path(&format!("{}{}", embed_root(app_name), target.path()));
    Some(rewritten.to_string())
}

/// Where the top window goes to log in before returning to the app page.
pub fn login_start_url(origin: &Url, app_name: &str) -> String {
    let origin = origin.origin().ascii_serialization();
    let return_to = format!("{}{}{}", origin, APPS_PREFIX, app_name);
    let encoded: String = form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
    format!("{}{}/start?rd={}", origin, AUTH_PROXY_PATH, encoded)
}

/// Same-origin page whose only job is to move the top-level window to the
/// login start URL.
pub fn top_level_redirect_html(origin: &Url, app_name: &str) -> String {
    let target = login_start_url(origin, app_name);
    // A JSON string is a valid JS string literal; `</` must not close the script.
    let js_target = serde_json::to_string(&target)
        .unwrap_or_else(|_| "\"/\"".to_string())
        .replace("</", "<\\/");
    let href = escape_html_attr(&target);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Signing in…</title>
</head>
<body>
<p>Redirecting to sign in. <a href="{href}" target="_top">Continue</a></p>
<script>
(function () {{
  var target = {js_target};
  try {{
    window.top.location.href = target;
  }} catch (e) {{
    window.location.href = target;
  }}
}})();
</script>
</body>
</html>
"#
    )
}
