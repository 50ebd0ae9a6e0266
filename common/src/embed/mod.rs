//! URL rewrite core for embedding apps under `/embed/{app}/`.
//!
//! Everything here is pure: no I/O, no shared state. The gateway feeds it the
//! current context and performs the fetches it asks for.

pub mod inject;
pub mod paths;
pub mod redirect;
pub mod resolver;

pub use inject::{build_injection_payload, inject_into_html, INTERCEPT_META_NAME};
pub use paths::{classify_path, extract_app_from_path, PathClass};
pub use redirect::{classify_redirect, rewrite_redirect_location, RedirectDecision, RedirectLike, ResponseType};
pub use resolver::{resolve_action, Action, FetchKind, PassthroughReason};
