// gateway/src/main.rs
use actix::Actor;
use actix_web::{web, App, HttpServer};
use common::{setup_tracing, with_bootstrap_tracing, Config};
use gateway::{control, proxy, ControlActor, EmbedHandler, GatewayState, HttpUpstream};
use std::io;
use std::sync::Arc;

fn to_io<E: std::fmt::Display>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = with_bootstrap_tracing(Config::from_env);
    if let Err(e) = setup_tracing(&config.log_level) {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
    tracing::debug!("Loaded configuration: {:?}", config);

    let server_addr = config.gateway_addr.clone();
    let max_body_bytes = config.max_body_bytes;

    let state = Arc::new(GatewayState::from_config(&config).map_err(to_io)?);
    let upstream = Arc::new(HttpUpstream::new(&config.upstream_url).map_err(to_io)?);
    let handler = EmbedHandler::new(state.clone(), upstream);
    let control = ControlActor::new(state.clone(), config.registry.clone()).start();

    tracing::info!(
        "Starting embed gateway on {} (public origin {}, upstream {})",
        server_addr,
        config.public_origin,
        config.upstream_url
    );
    tracing::info!(
        "Rewriting apps: {}",
        state.rewrite_apps().iter().collect::<Vec<_>>().join(", ")
    );

    let state_data = web::Data::from(state);
    let handler_data = web::Data::new(handler);
    let control_data = web::Data::new(control);

    HttpServer::new(move || {
        App::new()
            .app_data(web::PayloadConfig::new(max_body_bytes))
            .app_data(state_data.clone())
            .app_data(handler_data.clone())
            .app_data(control_data.clone())
            .configure(control::configure)
            .default_service(web::to(proxy::intercept::<HttpUpstream>))
    })
    .bind(&server_addr)?
    .run()
    .await
}
