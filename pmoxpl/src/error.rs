use thiserror::Error;

pub type Result<T> = std::result::Result<T, XplError>;

#[derive(Debug, Error)]
pub enum XplError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed xPL message: {0}")]
    Malformed(String),

    #[error("Unknown xPL message type: {0}")]
    UnknownType(String),
}

impl XplError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
