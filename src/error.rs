use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("configuration file not found in '{0}'")]
    NotFound(PathBuf),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("no JWT secret found in '{0}' and JSON_TOKEN isn't set")]
    MissingSecret(PathBuf),
    #[error("JWT secret in '{0}' is too short")]
    WeakSecret(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media host isn't configured")]
    NotConfigured,
    #[error("media host rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error("unable to reach MongoDB at '{0}'")]
    DatabaseUnreachable(String),
    #[error(transparent)]
    Media(#[from] MediaError),

    // External errors
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Rocket(#[from] rocket::Error),
    #[error(transparent)]
    Cors(#[from] rocket_cors::Error),
}
