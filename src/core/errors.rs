use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompanionError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(Box<reqwest::Error>),

    #[error("Provider rejected request: {0}")]
    Provider(String),

    #[error("Provider permission not granted")]
    PermissionDenied,

    #[error("CompanionError: {0}")]
    Custom(String),
}

impl From<std::io::Error> for CompanionError {
    fn from(error: std::io::Error) -> Self {
        CompanionError::Io(Box::new(error))
    }
}

impl From<reqwest::Error> for CompanionError {
    fn from(error: reqwest::Error) -> Self {
        CompanionError::Http(Box::new(error))
    }
}
