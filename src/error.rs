use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("owner context rejected")]
    Authorization,

    #[error("data store error: {0}")]
    DataStore(String),

    /// Input that passed the form but has no stored representation.
    #[error("unstorable value: {0}")]
    Unstorable(String),

    #[error("invalid period filter '{0}'")]
    InvalidFilter(String),
}

impl AppError {
    /// Text safe to show in the status banner. Data store details stay in the log.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Authentication(reason) | AppError::Validation(reason) => reason.clone(),
            AppError::Authorization => "Sessão inválida. Faça login novamente.".to_string(),
            AppError::DataStore(_) | AppError::Unstorable(_) => {
                "Ocorreu um erro interno. Tente novamente.".to_string()
            }
            AppError::InvalidFilter(_) => "Filtro de período inválido.".to_string(),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::DataStore(err.to_string())
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        AppError::DataStore(err.to_string())
    }
}

impl From<rocket::tokio::task::JoinError> for AppError {
    fn from(err: rocket::tokio::task::JoinError) -> Self {
        AppError::DataStore(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
