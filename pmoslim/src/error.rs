//! Erreurs du serveur slimproto

use pmodisplay::DisplayError;

pub type Result<T> = std::result::Result<T, SlimError>;

#[derive(Debug, thiserror::Error)]
pub enum SlimError {
    /// Erreur d'entrée/sortie (socket, processus)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Trame mal formée ou inattendue : fatale pour la connexion
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Le lecteur n'a pas répondu dans le délai imparti
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Framebuffer is {actual} bytes, display expects {expected}")]
    FramebufferSize { expected: usize, actual: usize },

    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    /// Échec de résolution d'une piste en URL
    #[error("Resolver error: {0}")]
    Resolver(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Le transcodeur n'a pas pu démarrer ou s'est arrêté trop tôt
    #[error("Transcoder error: {0}")]
    Transcoder(String),

    #[error("Player not found: {0}")]
    NotFound(String),

    #[error("Cancelled")]
    Cancelled,
}

impl SlimError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn resolver(msg: impl Into<String>) -> Self {
        Self::Resolver(msg.into())
    }
}

impl From<SlimError> for DisplayError {
    fn from(e: SlimError) -> Self {
        match e {
            SlimError::FramebufferSize { expected, actual } => {
                DisplayError::FramebufferSize { expected, actual }
            }
            SlimError::Display(inner) => inner,
            other => DisplayError::Sink(other.to_string()),
        }
    }
}
