use crate::config::model::SettingsError;
use crate::manifest::ManifestError;

/// Errors surfaced by preview operations.
///
/// Callers map these onto their own transport: `NotFound` and the
/// configuration variants are client-side problems, everything else is an
/// infrastructure failure. "Already running" and "already stopped" are not
/// errors and never appear here.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("invalid {what} '{value}'")]
    InvalidIdentifier { what: &'static str, value: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("container runtime unavailable: {0:#}")]
    RuntimeUnavailable(anyhow::Error),

    #[error("image '{image}' could not be pulled and is not cached locally: {source:#}")]
    Image {
        image: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no free host port left in range {start}-{end}")]
    PortsExhausted { start: u16, end: u16 },

    #[error("{kind} '{name}' failed to start: {source}")]
    StartFailed {
        kind: &'static str,
        name: String,
        #[source]
        source: Box<PreviewError>,
    },

    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl PreviewError {
    /// True for failures caused by the request or manifest rather than the
    /// infrastructure.
    pub fn is_client_error(&self) -> bool {
        match self {
            PreviewError::InvalidIdentifier { .. }
            | PreviewError::Manifest(_)
            | PreviewError::NotFound(_) => true,
            PreviewError::StartFailed { source, .. } => source.is_client_error(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PreviewError>;
