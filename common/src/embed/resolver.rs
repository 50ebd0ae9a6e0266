// common/src/embed/resolver.rs
//! Decides whether a request is left alone or fetched from an app namespace.
use url::Url;

use super::paths::{classify_path, embed_root, is_in_embed_namespace, is_sso_path, PathClass};
use crate::models::{ActiveAppContext, RewriteAppSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughReason {
    CrossOrigin,
    BloudRoute,
    EmbedNoRewrite,
    NoAppContext,
}

impl PassthroughReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassthroughReason::CrossOrigin => "CROSS_ORIGIN",
            PassthroughReason::BloudRoute => "BLOUD_ROUTE",
            PassthroughReason::EmbedNoRewrite => "EMBED_NO_REWRITE",
            PassthroughReason::NoAppContext => "NO_APP_CONTEXT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Request already addressed to `/embed/{app}/`
    Embed,
    /// Root-level request whose owner came from context
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Passthrough(PassthroughReason),
    Fetch {
        kind: FetchKind,
        target: Url,
        app_name: String,
    },
}

/// Resolve a request from its URL and the active app alone.
pub fn resolve_action(
    url: &Url,
    origin: &Url,
    active: &ActiveAppContext,
    rewrite_apps: &RewriteAppSet,
) -> Action {
    if url.origin() != origin.origin() {
        return Action::Passthrough(PassthroughReason::CrossOrigin);
    }

    match classify_path(url.path()) {
        PathClass::Bloud => Action::Passthrough(PassthroughReason::BloudRoute),
        PathClass::Embed(app) => {
            if rewrite_apps.contains(app) {
                Action::Fetch {
                    kind: FetchKind::Embed,
                    target: url.clone(),
                    app_name: app.to_string(),
                }
            } else {
                Action::Passthrough(PassthroughReason::EmbedNoRewrite)
            }
        }
        PathClass::Root => match active.rewrite_target() {
            Some(app) if rewrite_apps.contains(app) => Action::Fetch {
                kind: FetchKind::Root,
                target: rewrite_root_url(url, app),
                app_name: app.to_string(),
            },
            _ => Action::Passthrough(PassthroughReason::NoAppContext),
        },
    }
}

/// Resolve a request whose owning app is known from its client identity.
///
/// The owner wins over reserved segments, so an app's own `/api/...` calls
/// reach the app. Paths already inside the app's namespace and login-flow
/// paths are left to [`resolve_action`].
pub fn resolve_for_owner(url: &Url, origin: &Url, app_name: &str) -> Option<Action> {
    if url.origin() != origin.origin() {
        return None;
    }
    let path = url.path();
    if is_in_embed_namespace(path, app_name) || is_sso_path(path) {
        return None;
    }
    if let PathClass::Embed(_) = classify_path(path) {
        return None;
    }
    Some(Action::Fetch {
        kind: FetchKind::Root,
        target: rewrite_root_url(url, app_name),
        app_name: app_name.to_string(),
    })
}

/// `{origin}/embed/{app}{path}{?query}`
pub fn rewrite_root_url(url: &Url, app_name: &str) -> Url {
    let mut target = url.clone();
    target.set_path(&format!("{}{}", embed_root(app_name), url.path()));
    target.set_fragment(None);
    target
}
