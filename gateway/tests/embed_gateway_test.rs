// gateway/tests/embed_gateway_test.rs
use actix::Actor;
use actix_web::http::header::{self, HeaderMap, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::web::Bytes;
use actix_web::{test, web, App};
use async_trait::async_trait;
use common::models::RewriteAppSet;
use common::RegistryConfig;
use futures::stream::{self, StreamExt};
use gateway::control::{self, CONTROL_PATH, CONTROL_TOKEN_PATH, CONTROL_WS_PATH, STATE_PATH};
use gateway::proxy::{self, CLIENT_ID_HEADER, RESULTING_CLIENT_ID_HEADER, SEC_FETCH_DEST, SEC_FETCH_MODE};
use gateway::{ControlActor, EmbedHandler, FetchResponse, GatewayError, GatewayState, InterceptedRequest, Upstream};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use url::Url;

/// Echoes the path it was asked for; `/embed/*/` pages are HTML.
#[derive(Default)]
struct RecordingUpstream {
    fetched: Mutex<Vec<String>>,
}

impl RecordingUpstream {
    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for RecordingUpstream {
    async fn fetch(&self, _request: &InterceptedRequest, target: &Url) -> Result<FetchResponse, GatewayError> {
        self.fetched.lock().unwrap().push(target.path().to_string());

        let mut headers = HeaderMap::new();
        let body = if target.path().ends_with('/') {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
            format!("<html><head></head><body>{}</body></html>", target.path())
        } else {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            target.path().to_string()
        };

        Ok(FetchResponse {
            status: StatusCode::OK,
            response_type: common::embed::ResponseType::Basic,
            headers,
            url: target.clone(),
            body: stream::once(async move { Ok::<_, GatewayError>(Bytes::from(body)) }).boxed(),
        })
    }
}

const MAIN_FRAME: &str = "http://localhost:8080/";

fn gateway_state() -> Arc<GatewayState> {
    Arc::new(GatewayState::new(
        Url::parse("http://localhost:8080").unwrap(),
        RewriteAppSet::default(),
    ))
}

macro_rules! gateway_app {
    ($state:expr, $upstream:expr) => {{
        let control = ControlActor::new($state.clone(), RegistryConfig::default()).start();
        let handler = EmbedHandler::new($state.clone(), $upstream.clone());
        test::init_service(
            App::new()
                .app_data(web::Data::from($state.clone()))
                .app_data(web::Data::new(handler))
                .app_data(web::Data::new(control))
                .configure(control::configure)
                .default_service(web::to(proxy::intercept::<RecordingUpstream>)),
        )
        .await
    }};
}

#[actix_web::test]
async fn test_control_message_switches_root_requests_to_app() {
    let state = gateway_state();
    let upstream = Arc::new(RecordingUpstream::default());
    let app = gateway_app!(state, upstream);

    let req = test::TestRequest::get().uri("/install.html").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, Bytes::from_static(b"/install.html"));

    let req = test::TestRequest::post()
        .uri(CONTROL_PATH)
        .insert_header((header::ORIGIN, "http://localhost:8080"))
        .insert_header((header::REFERER, MAIN_FRAME))
        .set_json(json!({"type": "SET_ACTIVE_APP", "appName": "adguard-home", "needsRewrite": true}))
        .to_request();
    let ack: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        ack,
        json!({"type": "ACK", "request": "SET_ACTIVE_APP", "appName": "adguard-home", "needsRewrite": true})
    );

    let req = test::TestRequest::get().uri("/install.html").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, Bytes::from_static(b"/embed/adguard-home/install.html"));

    assert_eq!(
        upstream.fetched(),
        vec!["/install.html", "/embed/adguard-home/install.html"]
    );
}

#[actix_web::test]
async fn test_app_outside_rewrite_set_is_left_alone() {
    let state = gateway_state();
    let upstream = Arc::new(RecordingUpstream::default());
    let app = gateway_app!(state, upstream);

    let req = test::TestRequest::post()
        .uri(CONTROL_PATH)
        .insert_header((header::REFERER, MAIN_FRAME))
        .set_json(json!({"type": "SET_ACTIVE_APP", "appName": "miniflux", "needsRewrite": true}))
        .to_request();
    let ack: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(ack["needsRewrite"], json!(false));

    let req = test::TestRequest::get().uri("/v1/feeds").to_request();
    test::call_and_read_body(&app, req).await;
    assert_eq!(upstream.fetched(), vec!["/v1/feeds"]);
}

#[actix_web::test]
async fn test_control_from_embedded_page_is_forbidden() {
    let state = gateway_state();
    let upstream = Arc::new(RecordingUpstream::default());
    let app = gateway_app!(state, upstream);

    let req = test::TestRequest::post()
        .uri(CONTROL_PATH)
        .insert_header((header::ORIGIN, "http://localhost:8080"))
        .insert_header((header::REFERER, "http://localhost:8080/embed/qbittorrent/"))
        .set_json(json!({"type": "SET_ACTIVE_APP", "appName": "qbittorrent"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(!state.active_app().is_active());
}

#[actix_web::test]
async fn test_malformed_control_message_is_rejected() {
    let state = gateway_state();
    let upstream = Arc::new(RecordingUpstream::default());
    let app = gateway_app!(state, upstream);

    let req = test::TestRequest::post()
        .uri(CONTROL_PATH)
        .insert_header((header::REFERER, MAIN_FRAME))
        .set_json(json!({"type": "LAUNCH_ROCKETS"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_iframe_client_keeps_its_app_after_switch() {
    let state = gateway_state();
    let upstream = Arc::new(RecordingUpstream::default());
    let app = gateway_app!(state, upstream);

    let req = test::TestRequest::get()
        .uri("/embed/qbittorrent/")
        .insert_header((SEC_FETCH_MODE, "navigate"))
        .insert_header((SEC_FETCH_DEST, "iframe"))
        .insert_header((RESULTING_CLIENT_ID_HEADER, "iframe-q"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // The main frame moves on to another app; the qbittorrent iframe is still alive.
    let req = test::TestRequest::post()
        .uri(CONTROL_PATH)
        .insert_header((header::REFERER, MAIN_FRAME))
        .set_json(json!({"type": "SET_ACTIVE_APP", "appName": "adguard-home"}))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/api/v2/torrents/info")
        .insert_header((CLIENT_ID_HEADER, "iframe-q"))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, Bytes::from_static(b"/embed/qbittorrent/api/v2/torrents/info"));

    let req = test::TestRequest::get().uri(STATE_PATH).to_request();
    let snapshot: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(snapshot["appName"], json!("adguard-home"));
    assert_eq!(snapshot["clients"]["tracked_clients"], json!(1));
}

#[actix_web::test]
async fn test_intercepts_reach_navigated_page() {
    let state = gateway_state();
    let upstream = Arc::new(RecordingUpstream::default());
    let app = gateway_app!(state, upstream);

    let req = test::TestRequest::post()
        .uri(CONTROL_PATH)
        .insert_header((header::REFERER, MAIN_FRAME))
        .set_json(json!({
            "type": "SET_INTERCEPTS",
            "config": {"localStorage": {"token": {"value": "abc"}}}
        }))
        .to_request();
    let ack: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(ack["request"], json!("SET_INTERCEPTS"));

    let req = test::TestRequest::get()
        .uri("/embed/actual-budget/")
        .insert_header((SEC_FETCH_MODE, "navigate"))
        .insert_header((SEC_FETCH_DEST, "iframe"))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.starts_with("<html><head><meta name=\"bloud-intercepts\""));
    assert!(html.contains("&quot;token&quot;"));
    assert!(html.ends_with("<body>/embed/actual-budget/</body></html>"));
}

#[actix_web::test]
async fn test_unknown_bloud_paths_reach_upstream() {
    let state = gateway_state();
    let upstream = Arc::new(RecordingUpstream::default());
    let app = gateway_app!(state, upstream);

    let req = test::TestRequest::get().uri("/__bloud/bootstrap.js").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(upstream.fetched(), vec!["/__bloud/bootstrap.js"]);
}

#[actix_web::test]
async fn test_control_without_referer_is_forbidden() {
    let state = gateway_state();
    let upstream = Arc::new(RecordingUpstream::default());
    let app = gateway_app!(state, upstream);

    let req = test::TestRequest::post()
        .uri(CONTROL_PATH)
        .insert_header((header::ORIGIN, "http://localhost:8080"))
        .set_json(json!({"type": "SET_ACTIVE_APP", "appName": "qbittorrent"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post().uri(CONTROL_TOKEN_PATH).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    assert!(!state.active_app().is_active());
    assert!(state.control_tokens().is_empty());
}

fn socket_handshake(uri: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri(uri)
        .insert_header((header::ORIGIN, "http://localhost:8080"))
        .insert_header((header::CONNECTION, "upgrade"))
        .insert_header((header::UPGRADE, "websocket"))
        .insert_header((header::SEC_WEBSOCKET_VERSION, "13"))
        .insert_header((header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ=="))
}

#[actix_web::test]
async fn test_bare_socket_handshake_is_forbidden() {
    let state = gateway_state();
    let upstream = Arc::new(RecordingUpstream::default());
    let app = gateway_app!(state, upstream);

    let resp = test::call_service(&app, socket_handshake(CONTROL_WS_PATH).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let uri = format!("{}?token=made-up", CONTROL_WS_PATH);
    let resp = test::call_service(&app, socket_handshake(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(upstream.fetched().is_empty());
}

#[actix_web::test]
async fn test_socket_ticket_opens_one_handshake() {
    let state = gateway_state();
    let upstream = Arc::new(RecordingUpstream::default());
    let app = gateway_app!(state, upstream);

    let req = test::TestRequest::post()
        .uri(CONTROL_TOKEN_PATH)
        .insert_header((header::ORIGIN, "http://localhost:8080"))
        .insert_header((header::REFERER, MAIN_FRAME))
        .to_request();
    let ticket: Value = test::call_and_read_body_json(&app, req).await;
    let token = ticket["token"].as_str().unwrap().to_string();
    assert!(ticket["expiresAt"].is_string());

    let uri = format!("{}?token={}", CONTROL_WS_PATH, token);
    let resp = test::call_service(&app, socket_handshake(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::SWITCHING_PROTOCOLS);

    let resp = test::call_service(&app, socket_handshake(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let second = test::TestRequest::post()
        .uri(CONTROL_TOKEN_PATH)
        .insert_header((header::REFERER, MAIN_FRAME))
        .to_request();
    let ticket: Value = test::call_and_read_body_json(&app, second).await;
    let uri = format!("{}?token={}", CONTROL_WS_PATH, ticket["token"].as_str().unwrap());
    let foreign = socket_handshake(&uri)
        .insert_header((header::ORIGIN, "https://evil.example"))
        .to_request();
    let resp = test::call_service(&app, foreign).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
