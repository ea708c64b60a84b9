#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("missing env var: {0}")]
    MissingEnv(String),

    #[error("invalid env var {name}: {reason}")]
    InvalidEnv { name: String, reason: String },

    #[error("overrides file {path}: {source}")]
    Overrides {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("composition error: {0}")]
    Compose(#[from] pf_core::Error),

    #[error("template error: {0}")]
    Template(#[from] cfn_template::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SynthError>;
