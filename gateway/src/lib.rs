// gateway/src/lib.rs
pub mod client_registry;
pub mod control;
pub mod control_token;
pub mod error;
pub mod fetch;
pub mod handler;
pub mod proxy;
pub mod state;
pub mod upstream;

pub use client_registry::ClientAppRegistry;
pub use control::ControlActor;
pub use error::GatewayError;
pub use fetch::{FetchResponse, InterceptedRequest, Upstream};
pub use handler::EmbedHandler;
pub use state::GatewayState;
pub use upstream::HttpUpstream;
