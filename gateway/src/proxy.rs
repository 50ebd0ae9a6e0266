// gateway/src/proxy.rs
//! actix-web adapter: turns server requests into [`InterceptedRequest`]s and
//! handler results back into streamed responses.
use actix_web::http::header::{self, HeaderMap};
use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse};
use url::Url;

use crate::error::GatewayError;
use crate::fetch::{Destination, FetchResponse, InterceptedRequest, RequestMode, Upstream};
use crate::handler::EmbedHandler;
use crate::upstream::is_hop_by_hop;

pub const SEC_FETCH_MODE: &str = "sec-fetch-mode";
pub const SEC_FETCH_DEST: &str = "sec-fetch-dest";
/// Client issuing the request, set by the bootstrap script
pub const CLIENT_ID_HEADER: &str = "x-bloud-client-id";
/// Client a navigation creates
pub const RESULTING_CLIENT_ID_HEADER: &str = "x-bloud-resulting-client-id";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Older browsers omit Fetch Metadata; an HTML GET is treated as a document
/// navigation.
fn infer_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
    if let Some(mode) = header_str(headers, SEC_FETCH_MODE).and_then(RequestMode::parse) {
        return mode;
    }
    let wants_html = header_str(headers, header::ACCEPT.as_str())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false);
    if *method == Method::GET && wants_html {
        RequestMode::Navigate
    } else {
        RequestMode::NoCors
    }
}

fn infer_destination(mode: RequestMode, headers: &HeaderMap) -> Destination {
    match header_str(headers, SEC_FETCH_DEST) {
        Some(dest) => Destination::parse(dest),
        None if mode == RequestMode::Navigate => Destination::Document,
        None => Destination::Empty,
    }
}

pub fn intercepted_request(req: &HttpRequest, body: web::Bytes) -> Result<InterceptedRequest, GatewayError> {
    let url = {
        let info = req.connection_info();
        let path = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        Url::parse(&format!("{}://{}{}", info.scheme(), info.host(), path))?
    };

    let mut headers = req.headers().clone();
    let mode = infer_mode(req.method(), &headers);
    let destination = infer_destination(mode, &headers);
    let client_id = header_str(&headers, CLIENT_ID_HEADER).map(str::to_string);
    let resulting_client_id = header_str(&headers, RESULTING_CLIENT_ID_HEADER).map(str::to_string);
    headers.remove(CLIENT_ID_HEADER);
    headers.remove(RESULTING_CLIENT_ID_HEADER);

    Ok(InterceptedRequest {
        method: req.method().clone(),
        url,
        headers,
        body,
        mode,
        destination,
        client_id,
        resulting_client_id,
    })
}

pub fn into_http_response(response: FetchResponse) -> HttpResponse {
    let mut builder = HttpResponse::build(response.status);
    for (name, value) in response.headers.iter() {
        if is_hop_by_hop(name.as_str()) || *name == header::CONTENT_LENGTH {
            continue;
        }
        builder.append_header((name.clone(), value.clone()));
    }
    builder.streaming(response.body)
}

/// Default service: every request not claimed by the control endpoints
pub async fn intercept<U: Upstream>(
    req: HttpRequest,
    body: web::Bytes,
    handler: web::Data<EmbedHandler<U>>,
) -> Result<HttpResponse, GatewayError> {
    let request = intercepted_request(&req, body)?;
    tracing::trace!("{} {} ({:?}/{:?})", request.method, request.url, request.mode, request.destination);

    let response = handler.handle(request).await?;
    Ok(into_http_response(response))
}
