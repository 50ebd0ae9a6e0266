// gateway/src/upstream.rs
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use async_trait::async_trait;
use common::embed::ResponseType;
use futures::StreamExt;
use reqwest::redirect::Policy;
use url::Url;

use crate::error::GatewayError;
use crate::fetch::{FetchResponse, InterceptedRequest, Upstream};

/// Headers that only describe a single connection
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Forwards requests to the platform router over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base: Url,
}

impl HttpUpstream {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        let base = Url::parse(base_url)?;
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()?;
        Ok(Self { client, base })
    }

    /// Upstream URL carrying the path and query of `target`
    pub fn outbound_url(&self, target: &Url) -> Url {
        let mut outbound = self.base.clone();
        outbound.set_path(target.path());
        outbound.set_query(target.query());
        outbound
    }

    /// Map a Location pointing at the upstream itself back onto the public
    /// origin of `target`.
    fn externalize_location(&self, location: &str, target: &Url) -> Option<String> {
        let resolved = self.outbound_url(target).join(location).ok()?;
        if resolved.origin() != self.base.origin() || self.base.origin() == target.origin() {
            return None;
        }
        let mut public = target.clone();
        public.set_path(resolved.path());
        public.set_query(resolved.query());
        public.set_fragment(resolved.fragment());
        Some(public.to_string())
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &InterceptedRequest, target: &Url) -> Result<FetchResponse, GatewayError> {
        let outbound = self.outbound_url(target);
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|_| GatewayError::InvalidHeader(format!("method {}", request.method)))?;

        let mut builder = self.client.request(method, outbound.clone());
        for (name, value) in request.headers.iter() {
            if is_hop_by_hop(name.as_str()) || name.as_str() == "content-length" {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_bytes());
        }
        if let Some(host) = target.host_str() {
            let host = match target.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            };
            builder = builder.header("x-forwarded-host", host);
        }
        builder = builder.header("x-forwarded-proto", target.scheme());
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        tracing::debug!("{} {} -> {}", request.method, target, outbound);
        let upstream = builder.send().await?;

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .map_err(|_| GatewayError::InvalidHeader(format!("status {}", upstream.status())))?;

        let mut headers = HeaderMap::new();
        for (name, value) in upstream.headers() {
            if is_hop_by_hop(name.as_str()) || name.as_str() == "content-length" {
                continue;
            }
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) else {
                continue;
            };
            headers.append(name, value);
        }

        let mut response_type = ResponseType::Basic;
        if status.is_redirection() {
            let location = headers
                .get("location")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if let Some(location) = location {
                let public = self.externalize_location(&location, target);
                if let Some(public) = &public {
                    if let Ok(value) = HeaderValue::from_str(public) {
                        headers.insert(HeaderName::from_static("location"), value);
                    }
                }
                let effective = public.as_deref().unwrap_or(&location);
                // A browser cannot see where a cross-origin redirect goes.
                if let Ok(resolved) = target.join(effective) {
                    if resolved.origin() != target.origin() {
                        response_type = ResponseType::OpaqueRedirect;
                    }
                }
            }
        }

        let body = upstream
            .bytes_stream()
            .map(|chunk| chunk.map_err(GatewayError::from))
            .boxed();

        Ok(FetchResponse {
            status,
            response_type,
            headers,
            url: target.clone(),
            body,
        })
    }
}
