//! Types d'erreurs pour pmodisplay

use thiserror::Error;

/// Erreurs de chargement de police et de rendu
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a PSF2 font (bad magic)")]
    BadMagic,

    #[error("Font truncated: {0}")]
    Truncated(String),

    #[error("Framebuffer has {actual} bytes, {expected} expected")]
    FramebufferSize { expected: usize, actual: usize },

    #[error("Display sink failed: {0}")]
    Sink(String),
}

pub type Result<T> = std::result::Result<T, DisplayError>;
