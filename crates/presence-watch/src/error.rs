use companion_context::{PresenceError, PresenceErrorCode};
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera not available: {0}")]
    CameraNotAvailable(String),
    #[error("face detection model failed to load: {0}")]
    ModelLoad(String),
    #[error("detection failed: {0}")]
    Detection(String),
}

impl Error {
    /// Session-terminal failures map to a user-facing [`PresenceError`];
    /// per-frame detection errors do not.
    pub fn presence_error(&self) -> Option<PresenceError> {
        match self {
            Error::PermissionDenied(_) => Some(PresenceError::new(
                PresenceErrorCode::CameraPermissionDenied,
                "camera access permission is required",
            )),
            Error::CameraNotAvailable(msg) => Some(PresenceError::new(
                PresenceErrorCode::CameraNotAvailable,
                format!("camera is not available: {msg}"),
            )),
            Error::ModelLoad(_) => Some(PresenceError::new(
                PresenceErrorCode::ModelLoadFailed,
                "failed to load the face detection model",
            )),
            Error::Detection(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.presence_error().is_some()
    }
}
