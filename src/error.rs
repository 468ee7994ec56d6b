use thiserror::Error;

/// Errors surfaced by the shell core.
///
/// Unknown or disabled topics are deliberately absent: activating one is not
/// an error (see `Activation::Ignored`).
#[derive(Debug, Error)]
pub enum ShellError {
    /// The module loaded, but it does not export what the topic asked for.
    #[error("module `{namespace}` has no export `{export}`")]
    ModuleNotFound { namespace: String, export: String },

    /// The fetch capability failed to load the module.
    #[error("failed to load module `{namespace}`: {source}")]
    Load {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellError {
    pub fn module_not_found(namespace: &str, export: &str) -> Self {
        ShellError::ModuleNotFound {
            namespace: namespace.to_string(),
            export: export.to_string(),
        }
    }

    pub fn load(namespace: &str, source: anyhow::Error) -> Self {
        ShellError::Load {
            namespace: namespace.to_string(),
            source,
        }
    }
}

impl From<serde_yaml_bw::Error> for ShellError {
    fn from(err: serde_yaml_bw::Error) -> ShellError {
        ShellError::Config(err.to_string())
    }
}
