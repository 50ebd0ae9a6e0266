// gateway/src/handler.rs
//! Per-request routing: resolve, fetch, rewrite redirects, inject intercepts.
use actix_web::http::header;
use actix_web::http::StatusCode;
use common::embed::paths::{classify_path, is_oauth_callback, is_service_worker_script, PathClass};
use common::embed::redirect::top_level_redirect_html;
use common::embed::resolver::{resolve_for_owner, rewrite_root_url};
use common::embed::{classify_redirect, inject_into_html, resolve_action, Action, FetchKind, RedirectDecision};
use common::models::ActiveAppContext;
use futures::stream::{self, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;
use url::Url;

use crate::client_registry::ClientAppRegistry;
use crate::error::GatewayError;
use crate::fetch::{collect_body, FetchResponse, InterceptedRequest, Upstream};
use crate::state::GatewayState;

pub struct EmbedHandler<U: Upstream> {
    state: Arc<GatewayState>,
    upstream: Arc<U>,
}

impl<U: Upstream> Clone for EmbedHandler<U> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            upstream: self.upstream.clone(),
        }
    }
}

impl<U: Upstream> EmbedHandler<U> {
    pub fn new(state: Arc<GatewayState>, upstream: Arc<U>) -> Self {
        Self { state, upstream }
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Handle one request. A failure anywhere in the rewrite path degrades to
    /// an unmodified fetch of the original request.
    pub async fn handle(&self, request: InterceptedRequest) -> Result<FetchResponse, GatewayError> {
        match self.route(&request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!("Rewrite of {} {} failed, passing through: {}", request.method, request.url, e);
                self.passthrough(&request).await
            }
        }
    }

    async fn route(&self, request: &InterceptedRequest) -> Result<FetchResponse, GatewayError> {
        let origin = self.state.origin();
        let path = request.url.path();
        let navigate = request.is_navigation();
        let active = self.state.active_app();
        let same_origin = request.url.origin() == origin.origin();

        if active.is_active() && same_origin && is_service_worker_script(path) {
            tracing::debug!("Answering {} with a no-op service worker", path);
            return Ok(FetchResponse::noop_service_worker(request.url.clone()));
        }

        if navigate && same_origin && classify_path(path) == PathClass::Bloud {
            self.forget_clients(request);
        }

        match self.resolve(request, &active) {
            Action::Passthrough(reason) => {
                tracing::debug!("{} {} passthrough ({})", request.method, request.url, reason.as_str());
                self.passthrough(request).await
            }
            Action::Fetch { kind: FetchKind::Embed, target, app_name } => {
                if !navigate {
                    return self.passthrough(request).await;
                }
                if request.is_top_level_navigation() && is_oauth_callback(path) {
                    tracing::info!("OAuth callback {} already in namespace, passing through", request.url);
                    return self.passthrough(request).await;
                }
                self.track_navigation(request, &app_name);
                self.fetch_app(request, &target, &app_name, true).await
            }
            Action::Fetch { kind: FetchKind::Root, target, app_name } => {
                tracing::debug!("{} -> {} (app {})", request.url, target, app_name);
                if request.is_top_level_navigation() && is_oauth_callback(path) {
                    tracing::info!("Redirecting OAuth callback to {}", target);
                    return FetchResponse::redirect(StatusCode::FOUND, &target, request.url.clone());
                }
                if navigate {
                    self.track_navigation(request, &app_name);
                }
                let mut response = self.fetch_app(request, &target, &app_name, navigate).await?;
                // Module-relative imports resolve against the URL the page asked for.
                response.url = request.url.clone();
                Ok(response)
            }
        }
    }

    /// Client identity first, then Referer, then the active app.
    fn resolve(&self, request: &InterceptedRequest, active: &ActiveAppContext) -> Action {
        let origin = self.state.origin();

        if !request.is_navigation() {
            let owner = request
                .client_id
                .as_deref()
                .and_then(|id| self.state.clients().lookup(id));

            match owner {
                Some(app_name) => {
                    if let Some(action) = resolve_for_owner(&request.url, origin, &app_name) {
                        return action;
                    }
                }
                None => {
                    if let Some(action) = self.resolve_from_referer(request) {
                        return action;
                    }
                }
            }
        }

        resolve_action(&request.url, origin, active, self.state.rewrite_apps())
    }

    /// A Referer inside `/embed/{app}/` names the requesting app and beats
    /// reserved segments. An `/apps/{app}` Referer only claims root paths.
    fn resolve_from_referer(&self, request: &InterceptedRequest) -> Option<Action> {
        let origin = self.state.origin();
        if request.url.origin() != origin.origin() {
            return None;
        }
        let referer = request.referrer()?;

        if let Some(app_name) = ClientAppRegistry::embed_owner_from_referer(referer, origin) {
            if !self.state.rewrite_apps().contains(&app_name) {
                return None;
            }
            return resolve_for_owner(&request.url, origin, &app_name);
        }

        if classify_path(request.url.path()) != PathClass::Root {
            return None;
        }
        let app_name = ClientAppRegistry::lookup_from_referer(referer, origin)?;
        if !self.state.rewrite_apps().contains(&app_name) {
            return None;
        }
        Some(Action::Fetch {
            kind: FetchKind::Root,
            target: rewrite_root_url(&request.url, &app_name),
            app_name,
        })
    }

    fn track_navigation(&self, request: &InterceptedRequest, app_name: &str) {
        if let Some(client_id) = request.resulting_client_id.as_deref() {
            self.state.clients().register(client_id, app_name);
        }
    }

    fn forget_clients(&self, request: &InterceptedRequest) {
        for client_id in [request.client_id.as_deref(), request.resulting_client_id.as_deref()]
            .into_iter()
            .flatten()
        {
            self.state.clients().unregister(client_id);
        }
    }

    async fn passthrough(&self, request: &InterceptedRequest) -> Result<FetchResponse, GatewayError> {
        self.upstream.fetch(request, &request.url).await
    }

    async fn fetch_app(
        &self,
        request: &InterceptedRequest,
        target: &Url,
        app_name: &str,
        navigate: bool,
    ) -> Result<FetchResponse, GatewayError> {
        let intercepts = self.state.intercepts();
        let wants_injection = navigate && intercepts.as_ref().map(|i| i.payload.is_some()).unwrap_or(false);

        // Ask for an uncompressed body when it may need editing.
        let outbound = if wants_injection && request.headers.contains_key(header::ACCEPT_ENCODING) {
            let mut stripped = request.clone();
            stripped.headers.remove(header::ACCEPT_ENCODING);
            Cow::Owned(stripped)
        } else {
            Cow::Borrowed(request)
        };

        let response = self.upstream.fetch(&outbound, target).await?;

        match classify_redirect(&response, app_name, target) {
            RedirectDecision::Escalate if navigate => {
                tracing::warn!("Login redirect for {} while loading {}, escalating to top window", app_name, target);
                let html = top_level_redirect_html(self.state.origin(), app_name);
                Ok(FetchResponse::html(StatusCode::OK, target.clone(), html))
            }
            RedirectDecision::Rewrite { status, location } => {
                tracing::debug!("Rewriting {} redirect for {} to {}", status, app_name, location);
                let mut response = response;
                response.set_header(header::LOCATION, &location)?;
                Ok(response)
            }
            RedirectDecision::Escalate | RedirectDecision::PassThrough | RedirectDecision::NotRedirect => {
                if wants_injection {
                    Ok(self.inject_intercepts(response).await)
                } else {
                    Ok(response)
                }
            }
        }
    }

    async fn inject_intercepts(&self, response: FetchResponse) -> FetchResponse {
        let payload = match self.state.intercepts().and_then(|i| i.payload.clone()) {
            Some(payload) => payload,
            None => return response,
        };
        if !response.is_html() || response.is_encoded() {
            return response;
        }

        let FetchResponse { status, response_type, headers, url, body } = response;
        let (bytes, read_error) = collect_body(body).await;

        let body = match (read_error, std::str::from_utf8(&bytes)) {
            (Some(e), _) => {
                tracing::warn!("Body of {} could not be read, skipping intercepts: {}", url, e);
                bytes
            }
            (None, Err(_)) => {
                tracing::warn!("Body of {} is not UTF-8, skipping intercepts", url);
                bytes
            }
            (None, Ok(html)) => inject_into_html(html, &payload).into(),
        };

        FetchResponse {
            status,
            response_type,
            headers,
            url,
            body: stream::once(async move { Ok::<_, GatewayError>(body) }).boxed(),
        }
    }
}
