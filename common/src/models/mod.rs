pub mod app_context;
pub mod intercept;

pub use app_context::{ActiveAppContext, RewriteAppSet};
pub use intercept::{InterceptConfiguration, LocalStorageOverride};
