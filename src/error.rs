use photo_vault::{ConfigError, LedgerError, LoadError, UploadError, VaultError};

/// Central error types for the coachbook app
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database error (rusqlite)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
    /// Validation error (e.g. invalid inputs)
    #[error("Validation error: {0}")]
    Validation(String),
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Photo storage or retrieval failed
    #[error("Photo error: {0}")]
    Photo(#[from] VaultError),
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        AppError::Photo(VaultError::Ledger(e))
    }
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        AppError::Photo(VaultError::Upload(e))
    }
}

impl From<LoadError> for AppError {
    fn from(e: LoadError) -> Self {
        AppError::Photo(VaultError::Load(e))
    }
}

/// User-friendly error messages for UI
impl AppError {
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(_) => "A database error occurred. Please try again.".to_string(),
            AppError::Filesystem(_) => {
                "Error accessing files. Please check app permissions.".to_string()
            }
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(msg) => format!("{} was not found.", msg),
            AppError::Config(_) => "The settings file could not be read.".to_string(),
            AppError::Photo(VaultError::Upload(UploadError::AllTiersFailed(_))) => {
                "The photo could not be saved anywhere. Please try again.".to_string()
            }
            AppError::Photo(VaultError::Upload(UploadError::InvalidRequest(msg))) => msg.clone(),
            AppError::Photo(VaultError::Load(LoadError::Remote(_))) => {
                "The photo could not be downloaded. Please check your connection.".to_string()
            }
            AppError::Photo(_) => "A photo storage error occurred. Please try again.".to_string(),
        }
    }
}
