// common/src/models/app_context.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::embed::paths::DEFAULT_REWRITE_APPS;

/// Closed set of apps that hard-code absolute URLs and therefore need their
/// traffic rewritten into `/embed/{app}/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteAppSet {
    apps: BTreeSet<String>,
}

impl Default for RewriteAppSet {
    fn default() -> Self {
        Self::new(DEFAULT_REWRITE_APPS.iter().copied())
    }
}

impl RewriteAppSet {
    pub fn new<I, S>(apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            apps: apps.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, app_name: &str) -> bool {
        self.apps.contains(app_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.apps.iter().map(String::as_str)
    }
}

/// The app shown in the foreground iframe, as last announced by the main frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAppContext {
    pub app_name: Option<String>,
    pub needs_rewrite: bool,
}

impl ActiveAppContext {
    /// Build the context for a `SET_ACTIVE_APP` message.
    ///
    /// `needs_rewrite` defaults to membership in `rewrite_apps`, and is forced
    /// off for apps outside the set even when the caller asked for it.
    pub fn new(app_name: Option<String>, needs_rewrite: Option<bool>, rewrite_apps: &RewriteAppSet) -> Self {
        let needs_rewrite = match app_name.as_deref() {
            Some(name) => needs_rewrite.unwrap_or(true) && rewrite_apps.contains(name),
            None => false,
        };
        Self { app_name, needs_rewrite }
    }

    /// The active app, if it is one whose root-level traffic must be rewritten
    pub fn rewrite_target(&self) -> Option<&str> {
        match self.app_name.as_deref() {
            Some(name) if self.needs_rewrite => Some(name),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.app_name.is_some()
    }
}
