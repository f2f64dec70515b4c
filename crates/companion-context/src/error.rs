use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
    #[error("unknown emotion: {0}")]
    UnknownEmotion(String),
    #[error("unknown recognition mode: {0}")]
    UnknownMode(String),
}
