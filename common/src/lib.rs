pub mod config;
pub mod embed;
pub mod messages;
pub mod models;
pub mod utils;

pub use self::config::*;
pub use self::messages::*;
pub use self::utils::*;
