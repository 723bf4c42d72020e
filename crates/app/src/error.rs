//! Application error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Could not determine {0} directory")]
    NoProjectDir(&'static str),

    #[error(transparent)]
    Core(#[from] stack_core::Error),

    #[error(transparent)]
    Net(#[from] stack_net::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
