// gateway/src/fetch.rs
//! Request/response model the embed handler works on, independent of the
//! HTTP server and client in use.
use actix_web::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use actix_web::http::{Method, StatusCode};
use actix_web::web::Bytes;
use async_trait::async_trait;
use common::embed::{RedirectLike, ResponseType};
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use url::Url;

use crate::error::GatewayError;

pub type BodyStream = BoxStream<'static, Result<Bytes, GatewayError>>;

/// `Sec-Fetch-Mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
    WebSocket,
}

impl RequestMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(RequestMode::Navigate),
            "same-origin" => Some(RequestMode::SameOrigin),
            "cors" => Some(RequestMode::Cors),
            "no-cors" => Some(RequestMode::NoCors),
            "websocket" => Some(RequestMode::WebSocket),
            _ => None,
        }
    }
}

/// `Sec-Fetch-Dest`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Iframe,
    Frame,
    Worker,
    SharedWorker,
    ServiceWorker,
    Script,
    Style,
    Image,
    Empty,
    Other,
}

impl Destination {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Destination::Document,
            "iframe" => Destination::Iframe,
            "frame" => Destination::Frame,
            "worker" => Destination::Worker,
            "sharedworker" => Destination::SharedWorker,
            "serviceworker" => Destination::ServiceWorker,
            "script" => Destination::Script,
            "style" => Destination::Style,
            "image" => Destination::Image,
            "empty" => Destination::Empty,
            _ => Destination::Other,
        }
    }
}

/// One browser request as seen by the gateway
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub mode: RequestMode,
    pub destination: Destination,
    /// Client that issued the request
    pub client_id: Option<String>,
    /// Client a navigation will create
    pub resulting_client_id: Option<String>,
}

impl InterceptedRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            mode: RequestMode::NoCors,
            destination: Destination::Empty,
            client_id: None,
            resulting_client_id: None,
        }
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Navigation of the outermost window rather than an iframe
    pub fn is_top_level_navigation(&self) -> bool {
        self.is_navigation() && self.destination == Destination::Document
    }

    pub fn referrer(&self) -> Option<&str> {
        self.headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
    }
}

pub struct FetchResponse {
    pub status: StatusCode,
    pub response_type: ResponseType,
    pub headers: HeaderMap,
    /// URL the browser should attribute the response to
    pub url: Url,
    pub body: BodyStream,
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("response_type", &self.response_type)
            .field("headers", &self.headers)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl FetchResponse {
    pub fn new(status: StatusCode, url: Url, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            response_type: ResponseType::Basic,
            headers: HeaderMap::new(),
            url,
            body: stream::once(async move { Ok::<_, GatewayError>(body) }).boxed(),
        }
    }

    pub fn html(status: StatusCode, url: Url, body: String) -> Self {
        let mut response = Self::new(status, url, body);
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        response.headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }

    /// Inert service worker that removes itself as soon as it activates
    pub fn noop_service_worker(url: Url) -> Self {
        const SCRIPT: &str = "// Service workers are managed by Bloud\n\
self.addEventListener('install', function () { self.skipWaiting(); });\n\
self.addEventListener('activate', function () { self.registration.unregister(); });\n";

        let mut response = Self::new(StatusCode::OK, url, SCRIPT);
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/javascript; charset=utf-8"),
        );
        response.headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }

    pub fn redirect(status: StatusCode, location: &Url, url: Url) -> Result<Self, GatewayError> {
        let mut response = Self::new(status, url, Bytes::new());
        response.set_header(header::LOCATION, location.as_str())?;
        Ok(response)
    }

    pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<(), GatewayError> {
        let value = HeaderValue::from_str(value)
            .map_err(|_| GatewayError::InvalidHeader(format!("{}: {:?}", name, value)))?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<mime::Mime>().ok())
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|m| m.type_() == mime::TEXT && m.subtype() == mime::HTML)
            .unwrap_or(false)
    }

    /// True when the body is compressed and cannot be edited as text
    pub fn is_encoded(&self) -> bool {
        self.headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| !v.trim().eq_ignore_ascii_case("identity"))
            .unwrap_or(false)
    }
}

impl RedirectLike for FetchResponse {
    fn status(&self) -> u16 {
        self.status.as_u16()
    }

    fn response_type(&self) -> ResponseType {
        self.response_type
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Performs outbound fetches with redirect following disabled.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// Fetch `target` using the method, headers and body of `request`.
    async fn fetch(&self, request: &InterceptedRequest, target: &Url) -> Result<FetchResponse, GatewayError>;
}

/// Drain a body; on a read error returns what was read so far plus the error
pub async fn collect_body(mut body: BodyStream) -> (Bytes, Option<GatewayError>) {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => buf.extend_from_slice(&bytes),
            Err(e) => return (Bytes::from(buf), Some(e)),
        }
    }
    (Bytes::from(buf), None)
}
