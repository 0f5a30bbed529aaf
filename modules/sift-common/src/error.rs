use thiserror::Error;

pub type Result<T> = std::result::Result<T, SiftError>;

#[derive(Error, Debug)]
pub enum SiftError {
    #[error("Configuration error: {0}")]
    Config(String),
}
