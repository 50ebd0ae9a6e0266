// gateway/src/control.rs
//! Control plane: the main frame tells the gateway which app is showing and
//! which storage reads to fake. All writes to the shared context go through
//! [`ControlActor`].
use actix::prelude::*;
use actix_web::http::header;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use common::embed::paths::EMBED_PREFIX;
use common::{ControlAck, ControlMessage, RegistryConfig};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::state::GatewayState;

pub const CONTROL_PATH: &str = "/__bloud/control";
pub const CONTROL_WS_PATH: &str = "/__bloud/ws";
/// Issues the ticket the control socket handshake must carry
pub const CONTROL_TOKEN_PATH: &str = "/__bloud/ws-token";
pub const STATE_PATH: &str = "/__bloud/state";

/// Single writer of the active app and intercept configuration
pub struct ControlActor {
    state: Arc<GatewayState>,
    registry: RegistryConfig,
}

impl ControlActor {
    pub fn new(state: Arc<GatewayState>, registry: RegistryConfig) -> Self {
        Self { state, registry }
    }

    fn sweep_idle_clients(&self) {
        let evicted = self.state.clients().cleanup_idle(self.registry.idle_ttl_secs);
        if evicted > 0 {
            tracing::info!("Evicted {} idle clients, {} still tracked", evicted, self.state.clients().len());
        }
        let purged = self.state.control_tokens().purge_expired();
        if purged > 0 {
            tracing::debug!("Purged {} expired control socket tickets", purged);
        }
    }
}

impl Actor for ControlActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("Control actor started");

        let interval = Duration::from_secs(self.registry.cleanup_interval_secs.max(1));
        ctx.run_interval(interval, |act, _ctx| {
            act.sweep_idle_clients();
        });
    }
}

impl Handler<ControlMessage> for ControlActor {
    type Result = MessageResult<ControlMessage>;

    fn handle(&mut self, msg: ControlMessage, _ctx: &mut Self::Context) -> Self::Result {
        let kind = msg.kind();
        match msg {
            ControlMessage::SetActiveApp { app_name, needs_rewrite } => {
                let active = self.state.set_active_app(app_name, needs_rewrite);
                tracing::info!(
                    "Active app set to {:?} (rewrite: {})",
                    active.app_name,
                    active.needs_rewrite
                );
                MessageResult(ControlAck::new(kind, active.app_name, active.needs_rewrite))
            }
            ControlMessage::SetIntercepts { config } => {
                let configured = config.as_ref().map(|c| !c.is_empty()).unwrap_or(false);
                self.state.set_intercepts(config);
                tracing::info!("Intercept configuration {}", if configured { "replaced" } else { "cleared" });

                let active = self.state.active_app();
                MessageResult(ControlAck::new(kind, active.app_name, active.needs_rewrite))
            }
        }
    }
}

/// An `Origin` header, when present, must be the public origin.
fn origin_matches(req: &HttpRequest, origin: &Url) -> bool {
    match req.headers().get(header::ORIGIN) {
        Some(value) => value
            .to_str()
            .map(|v| v == origin.origin().ascii_serialization())
            .unwrap_or(false),
        None => true,
    }
}

/// Control requests must come from the main frame: a matching origin and a
/// same-origin Referer outside any embed namespace. A missing Referer is
/// refused since app pages can suppress it.
pub fn is_trusted_control_request(req: &HttpRequest, origin: &Url) -> bool {
    if !origin_matches(req, origin) {
        return false;
    }

    let referer = match req
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Url::parse(v).ok())
    {
        Some(referer) => referer,
        None => return false,
    };
    referer.origin() == origin.origin() && !referer.path().starts_with(EMBED_PREFIX)
}

fn forbidden(req: &HttpRequest) -> HttpResponse {
    tracing::warn!(
        "Rejected control request on {} (origin: {:?}, referer: {:?})",
        req.path(),
        req.headers().get(header::ORIGIN),
        req.headers().get(header::REFERER)
    );
    HttpResponse::Forbidden().json(json!({
        "error": "control messages are only accepted from the main frame"
    }))
}

/// WebSocket session of one main frame
pub struct ControlSocket {
    id: Uuid,
    control: Addr<ControlActor>,
    last_heartbeat: Instant,
}

impl ControlSocket {
    pub fn new(control: Addr<ControlActor>) -> Self {
        Self {
            id: Uuid::new_v4(),
            control,
            last_heartbeat: Instant::now(),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(Duration::from_secs(5), |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > Duration::from_secs(30) {
                tracing::warn!("Control socket heartbeat timeout: {}", act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn apply(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let msg = match serde_json::from_str::<ControlMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Invalid control message on socket {}: {}", self.id, e);
                ctx.text(json!({ "type": "ERROR", "error": e.to_string() }).to_string());
                return;
            }
        };

        tracing::debug!("Control socket {} sent {}", self.id, msg.kind());
        self.control
            .send(msg)
            .into_actor(self)
            .map(|res, act, ctx| match res {
                Ok(ack) => match serde_json::to_string(&ack) {
                    Ok(json) => ctx.text(json),
                    Err(e) => tracing::error!("Failed to serialize ack for {}: {}", act.id, e),
                },
                Err(e) => {
                    tracing::error!("Control actor unavailable for socket {}: {}", act.id, e);
                    ctx.text(json!({ "type": "ERROR", "error": e.to_string() }).to_string());
                }
            })
            .wait(ctx);
    }
}

impl Actor for ControlSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("Control socket connected: {}", self.id);
        self.heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("Control socket closed: {}", self.id);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ControlSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.last_heartbeat = Instant::now();

        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => self.apply(&text, ctx),
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Ignoring binary frame on control socket {}", self.id);
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::error!("Control socket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}

/// Mount the control endpoints. Other `/__bloud/` paths still reach the
/// platform router.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource(CONTROL_PATH).route(web::post().to(control_route)))
        .service(web::resource(CONTROL_TOKEN_PATH).route(web::post().to(control_token_route)))
        .service(web::resource(CONTROL_WS_PATH).route(web::get().to(control_ws_route)))
        .service(web::resource(STATE_PATH).route(web::get().to(state_route)));
}

async fn control_route(
    req: HttpRequest,
    msg: web::Json<ControlMessage>,
    state: web::Data<GatewayState>,
    control: web::Data<Addr<ControlActor>>,
) -> Result<HttpResponse, GatewayError> {
    if !is_trusted_control_request(&req, state.origin()) {
        return Ok(forbidden(&req));
    }
    let ack = control.send(msg.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ack))
}

#[derive(Debug, Deserialize)]
struct SocketQuery {
    token: Option<String>,
}

async fn control_token_route(req: HttpRequest, state: web::Data<GatewayState>) -> HttpResponse {
    if !is_trusted_control_request(&req, state.origin()) {
        return forbidden(&req);
    }
    let (token, expires_at) = state.control_tokens().issue();
    HttpResponse::Ok().json(json!({
        "token": token,
        "expiresAt": expires_at.to_rfc3339(),
    }))
}

async fn control_ws_route(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<SocketQuery>,
    state: web::Data<GatewayState>,
    control: web::Data<Addr<ControlActor>>,
) -> Result<HttpResponse, Error> {
    if !origin_matches(&req, state.origin()) {
        return Ok(forbidden(&req));
    }
    let redeemed = query
        .token
        .as_deref()
        .map(|token| state.control_tokens().redeem(token))
        .unwrap_or(false);
    if !redeemed {
        return Ok(forbidden(&req));
    }
    ws::start(ControlSocket::new(control.get_ref().clone()), &req, stream)
}

async fn state_route(state: web::Data<GatewayState>) -> HttpResponse {
    HttpResponse::Ok().json(state.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use common::models::{InterceptConfiguration, RewriteAppSet};
    use serde_json::Value;

    fn origin() -> Url {
        Url::parse("http://localhost:8080").unwrap()
    }

    fn state() -> Arc<GatewayState> {
        Arc::new(GatewayState::new(origin(), RewriteAppSet::default()))
    }

    #[test]
    fn test_trusted_main_frame() {
        let req = TestRequest::post()
            .insert_header((header::ORIGIN, "http://localhost:8080"))
            .insert_header((header::REFERER, "http://localhost:8080/apps/adguard-home"))
            .to_http_request();
        assert!(is_trusted_control_request(&req, &origin()));
    }

    #[test]
    fn test_missing_referer_is_not_trusted() {
        let bare = TestRequest::post().to_http_request();
        assert!(!is_trusted_control_request(&bare, &origin()));

        let handshake = TestRequest::get()
            .insert_header((header::ORIGIN, "http://localhost:8080"))
            .insert_header((header::UPGRADE, "websocket"))
            .to_http_request();
        assert!(!is_trusted_control_request(&handshake, &origin()));
    }

    #[test]
    fn test_embedded_page_is_not_trusted() {
        let req = TestRequest::post()
            .insert_header((header::ORIGIN, "http://localhost:8080"))
            .insert_header((header::REFERER, "http://localhost:8080/embed/adguard-home/"))
            .to_http_request();
        assert!(!is_trusted_control_request(&req, &origin()));
    }

    #[test]
    fn test_foreign_origin_is_not_trusted() {
        let req = TestRequest::post()
            .insert_header((header::ORIGIN, "https://evil.example"))
            .to_http_request();
        assert!(!is_trusted_control_request(&req, &origin()));

        let garbage = TestRequest::post()
            .insert_header((header::REFERER, "::not a url"))
            .to_http_request();
        assert!(!is_trusted_control_request(&garbage, &origin()));
    }

    #[actix_web::test]
    async fn test_set_active_app_is_acknowledged() {
        let state = state();
        let control = ControlActor::new(state.clone(), RegistryConfig::default()).start();

        let ack = control
            .send(ControlMessage::SetActiveApp {
                app_name: Some("qbittorrent".to_string()),
                needs_rewrite: None,
            })
            .await
            .unwrap();
        assert_eq!(ack, ControlAck::new("SET_ACTIVE_APP", Some("qbittorrent".to_string()), true));
        assert!(state.active_app().needs_rewrite);

        let ack = control
            .send(ControlMessage::SetActiveApp { app_name: None, needs_rewrite: None })
            .await
            .unwrap();
        assert_eq!(ack.app_name, None);
        assert!(!ack.needs_rewrite);
        assert!(!state.active_app().is_active());
    }

    #[actix_web::test]
    async fn test_set_intercepts_replaces_configuration() {
        let state = state();
        let control = ControlActor::new(state.clone(), RegistryConfig::default()).start();

        let config = InterceptConfiguration::default().with_indexed_db("actual", "prefs", "budget", json!("b1"));
        let ack = control
            .send(ControlMessage::SetIntercepts { config: Some(config.clone()) })
            .await
            .unwrap();
        assert_eq!(ack.request, "SET_INTERCEPTS");
        assert_eq!(state.intercepts().unwrap().config, config);

        control.send(ControlMessage::SetIntercepts { config: None }).await.unwrap();
        assert!(state.intercepts().is_none());
    }

    #[actix_web::test]
    async fn test_idle_clients_are_swept() {
        let state = state();
        state.clients().register("iframe-1", "radarr");
        let registry = RegistryConfig {
            idle_ttl_secs: -1,
            cleanup_interval_secs: 1,
        };
        let _control = ControlActor::new(state.clone(), registry).start();

        actix_web::rt::time::sleep(Duration::from_millis(1500)).await;
        assert!(state.clients().is_empty());
        assert_eq!(state.snapshot().clients.evictions, 1);
    }

    #[test]
    fn test_ack_wire_format() {
        let ack = ControlAck::new("SET_ACTIVE_APP", Some("adguard-home".to_string()), true);
        let value: Value = serde_json::to_value(&ack).unwrap();
        assert_eq!(
            value,
            json!({"type": "ACK", "request": "SET_ACTIVE_APP", "appName": "adguard-home", "needsRewrite": true})
        );
    }
}
