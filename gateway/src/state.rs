// gateway/src/state.rs
use common::embed::build_injection_payload;
use common::models::{ActiveAppContext, InterceptConfiguration, RewriteAppSet};
use common::Config;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

use crate::client_registry::{ClientAppRegistry, RegistryMetrics};
use crate::control_token::ControlTokenStore;
use crate::error::GatewayError;

/// Intercept configuration together with its rendered HTML payload
#[derive(Debug)]
pub struct InterceptState {
    pub config: InterceptConfiguration,
    pub payload: Option<String>,
}

/// Everything request handling reads.
///
/// Active app and intercepts are only written by the control actor; request
/// handling takes snapshots.
#[derive(Debug)]
pub struct GatewayState {
    origin: Url,
    rewrite_apps: RewriteAppSet,
    active: RwLock<ActiveAppContext>,
    intercepts: RwLock<Option<Arc<InterceptState>>>,
    clients: ClientAppRegistry,
    control_tokens: ControlTokenStore,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub origin: String,
    pub app_name: Option<String>,
    pub needs_rewrite: bool,
    pub intercepts_configured: bool,
    pub rewrite_apps: Vec<String>,
    pub clients: RegistryMetrics,
}

impl GatewayState {
    pub fn new(origin: Url, rewrite_apps: RewriteAppSet) -> Self {
        Self {
            origin,
            rewrite_apps,
            active: RwLock::new(ActiveAppContext::default()),
            intercepts: RwLock::new(None),
            clients: ClientAppRegistry::new(),
            control_tokens: ControlTokenStore::default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let origin = Url::parse(&config.public_origin)?;
        let rewrite_apps = RewriteAppSet::new(config.rewrite_apps.iter().cloned());
        Ok(Self::new(origin, rewrite_apps))
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn rewrite_apps(&self) -> &RewriteAppSet {
        &self.rewrite_apps
    }

    pub fn clients(&self) -> &ClientAppRegistry {
        &self.clients
    }

    pub fn control_tokens(&self) -> &ControlTokenStore {
        &self.control_tokens
    }

    pub fn active_app(&self) -> ActiveAppContext {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn intercepts(&self) -> Option<Arc<InterceptState>> {
        self.intercepts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_active_app(&self, app_name: Option<String>, needs_rewrite: Option<bool>) -> ActiveAppContext {
        let context = ActiveAppContext::new(app_name, needs_rewrite, &self.rewrite_apps);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = context.clone();
        context
    }

    /// Replace the intercept configuration wholesale
    pub(crate) fn set_intercepts(&self, config: Option<InterceptConfiguration>) {
        let next = config.map(|config| {
            let payload = build_injection_payload(&config);
            Arc::new(InterceptState { config, payload })
        });
        *self.intercepts.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let active = self.active_app();
        StateSnapshot {
            origin: self.origin.origin().ascii_serialization(),
            app_name: active.app_name,
            needs_rewrite: active.needs_rewrite,
            intercepts_configured: self
                .intercepts()
                .map(|i| i.payload.is_some())
                .unwrap_or(false),
            rewrite_apps: self.rewrite_apps.iter().map(str::to_string).collect(),
            clients: self.clients.metrics(),
        }
    }
}
