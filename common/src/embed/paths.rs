// common/src/embed/paths.rs
//! Path classification and app-name extraction.

/// Namespace under which every embedded app is served
pub const EMBED_PREFIX: &str = "/embed/";
/// Platform UI route for an app; only used to recover an app name
pub const APPS_PREFIX: &str = "/apps/";

/// First path segments that always belong to the platform or the identity
/// provider, unless a tracked client says otherwise.
pub const RESERVED_SEGMENTS: &[&str] = &[
    // platform
    "api",
    "apps",
    "catalog",
    "embed",
    "version",
    "icons",
    // SvelteKit build output
    "_app",
    // identity provider
    "outpost.goauthentik.io",
    "application",
    "flows",
    "if",
];

/// Platform-internal prefixes (gateway control plane, dev server)
pub const BLOUD_MARKER_PREFIXES: &[&str] = &["/__bloud/", "/@vite/", "/@fs/", "/@id/"];

/// Identity provider static assets served from the shared origin
pub const SSO_STATIC_PREFIXES: &[&str] = &["/static/dist/", "/static/authentik/"];

/// Proxy path of the identity provider's forward-auth outpost
pub const AUTH_PROXY_PATH: &str = "/outpost.goauthentik.io";
pub const AUTH_SUBDOMAIN_PREFIX: &str = "auth.";
/// Paths that only ever appear during a login flow
pub const SSO_PATH_PREFIXES: &[&str] = &[
    "/outpost.goauthentik.io/",
    "/application/o/",
    "/if/flow/",
    "/flows/",
];

pub const OAUTH_CALLBACK_SUFFIX: &str = "openid/callback";

pub const SERVICE_WORKER_PATHS: &[&str] = &["/sw.js", "/service-worker.js"];

/// Apps that hard-code absolute URLs and have no base-path setting
pub const DEFAULT_REWRITE_APPS: &[&str] = &["actual-budget", "adguard-home", "qbittorrent"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass<'a> {
    /// Served by the platform itself
    Bloud,
    /// `/embed/{app}/...`; the name is not validated
    Embed(&'a str),
    /// Same-origin path with no app identity in it
    Root,
}

pub fn classify_path(pathname: &str) -> PathClass<'_> {
    if pathname == "/" {
        return PathClass::Bloud;
    }
    if BLOUD_MARKER_PREFIXES.iter().any(|p| pathname.starts_with(p))
        || SSO_STATIC_PREFIXES.iter().any(|p| pathname.starts_with(p))
    {
        return PathClass::Bloud;
    }
    if pathname.starts_with(EMBED_PREFIX) {
        if let Some(app) = extract_app_from_path(pathname) {
            return PathClass::Embed(app);
        }
    }
    if RESERVED_SEGMENTS.contains(&first_segment(pathname)) {
        return PathClass::Bloud;
    }
    PathClass::Root
}

/// App name from `/embed/{name}...` or `/apps/{name}...`.
///
/// The name runs up to the next `/`, so a query string glued to the name
/// (`/embed/app?x=1`) is returned as part of it. Callers check the name
/// against the rewrite set before trusting it.
pub fn extract_app_from_path(path: &str) -> Option<&str> {
    let rest = path
        .strip_prefix(EMBED_PREFIX)
        .or_else(|| path.strip_prefix(APPS_PREFIX))?;
    let name = rest.split('/').next().unwrap_or_default();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

pub fn first_segment(pathname: &str) -> &str {
    pathname
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default()
}

/// `/embed/{app}`
pub fn embed_root(app_name: &str) -> String {
    format!("{}{}", EMBED_PREFIX, app_name)
}

/// True when `path` already lives under `/embed/{app}`
pub fn is_in_embed_namespace(path: &str, app_name: &str) -> bool {
    let root = embed_root(app_name);
    match path.strip_prefix(root.as_str()) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

pub fn is_service_worker_script(pathname: &str) -> bool {
    SERVICE_WORKER_PATHS.contains(&pathname)
}

pub fn is_oauth_callback(pathname: &str) -> bool {
    pathname.trim_end_matches('/').ends_with(OAUTH_CALLBACK_SUFFIX)
}

pub fn is_sso_path(pathname: &str) -> bool {
    SSO_PATH_PREFIXES.iter().any(|p| pathname.starts_with(p))
}
