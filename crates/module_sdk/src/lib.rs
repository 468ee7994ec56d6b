pub mod component;
pub mod exports;
pub mod log;

pub use component::{Component, ComponentRef, HelpDocument};
pub use exports::{ExportLoader, FetchedModule, ModuleExports, normalize_export_name};
pub use log::LogLevel;
