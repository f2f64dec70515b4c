use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid sample rate: {0}")]
    SampleRate(u32),
    #[error("failed to spawn analyzer thread: {0}")]
    Spawn(String),
}
