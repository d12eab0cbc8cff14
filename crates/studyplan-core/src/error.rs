use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudyplanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StudyplanError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            StudyplanError::Config(_) => "CONFIG_ERROR",
            StudyplanError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, StudyplanError>;
