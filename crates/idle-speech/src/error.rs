use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("chat backend error: {0}")]
    Backend(String),
    #[error("speech output error: {0}")]
    Speech(String),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}
