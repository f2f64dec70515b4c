use crate::{DetectionResult, Result};
use async_trait::async_trait;

/// Camera + face model pair polled by the presence monitor.
#[async_trait]
pub trait FaceDetector: Send {
    /// Load detection weights. Called once per start; may be a no-op when cached.
    async fn load_model(&mut self) -> Result<()>;

    /// Acquire the camera, awaiting the permission grant.
    async fn open_camera(&mut self) -> Result<()>;

    /// Run detection on the current frame.
    async fn detect(&mut self) -> Result<DetectionResult>;

    /// Release the camera stream.
    fn release(&mut self) {}
}
