pub mod analytics;
pub mod config;
pub mod console;
pub mod controller;
pub mod error;
pub mod factory_cache;
pub mod flags;
pub mod loader;
pub mod location;
pub mod logger;
pub mod schema;
pub mod shell;
pub mod topics;

pub use error::ShellError;
pub use shell::{Shell, ShellBuilder};
