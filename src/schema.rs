// src/schema.rs

use std::{fs, path::Path};

use anyhow::Error;
use schemars::schema_for;

use crate::config::ShellConfig;
use crate::loader::DocumentBundle;

pub const CONFIG_SCHEMA_FILE: &str = "shell-config.schema.json";
pub const BUNDLE_SCHEMA_FILE: &str = "document-bundle.schema.json";

/// The entry point invoked by `main.rs` for `Commands::Schema`.
pub fn write_schema(out_dir: &Path) -> Result<(), Error> {
    fs::create_dir_all(out_dir)?;

    let config_schema = schema_for!(ShellConfig);
    fs::write(
        out_dir.join(CONFIG_SCHEMA_FILE),
        serde_json::to_string_pretty(&config_schema)?,
    )?;

    let bundle_schema = schema_for!(DocumentBundle);
    fs::write(
        out_dir.join(BUNDLE_SCHEMA_FILE),
        serde_json::to_string_pretty(&bundle_schema)?,
    )?;

    Ok(())
}
