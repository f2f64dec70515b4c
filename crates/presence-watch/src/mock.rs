use crate::{DetectionResult, Error, FaceDetector, Result};
use async_trait::async_trait;
use std::collections::VecDeque;

/// Which start-up step a [`ScriptedDetector`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    ModelLoad,
    PermissionDenied,
    NoCamera,
}

/// Detector that replays a fixed list of frames, then reports an empty scene.
pub struct ScriptedDetector {
    frames: VecDeque<DetectionResult>,
    failure: Option<ScriptedFailure>,
    camera_open: bool,
    releases: u32,
}

impl ScriptedDetector {
    pub fn new(frames: impl IntoIterator<Item = DetectionResult>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            failure: None,
            camera_open: false,
            releases: 0,
        }
    }

    pub fn failing(failure: ScriptedFailure) -> Self {
        let mut det = Self::new([]);
        det.failure = Some(failure);
        det
    }

    /// Clear the configured start-up failure, as if the user fixed the camera.
    pub fn heal(&mut self) {
        self.failure = None;
    }

    pub fn push_frame(&mut self, frame: DetectionResult) {
        self.frames.push_back(frame);
    }

    pub fn is_camera_open(&self) -> bool {
        self.camera_open
    }

    pub fn releases(&self) -> u32 {
        self.releases
    }
}

#[async_trait]
impl FaceDetector for ScriptedDetector {
    async fn load_model(&mut self) -> Result<()> {
        if self.failure == Some(ScriptedFailure::ModelLoad) {
            return Err(Error::ModelLoad("scripted failure".into()));
        }
        Ok(())
    }

    async fn open_camera(&mut self) -> Result<()> {
        match self.failure {
            Some(ScriptedFailure::PermissionDenied) => {
                Err(Error::PermissionDenied("NotAllowedError".into()))
            }
            Some(ScriptedFailure::NoCamera) => Err(Error::CameraNotAvailable("no device".into())),
            _ => {
                self.camera_open = true;
                Ok(())
            }
        }
    }

    async fn detect(&mut self) -> Result<DetectionResult> {
        if !self.camera_open {
            return Err(Error::Detection("camera not open".into()));
        }
        Ok(self.frames.pop_front().unwrap_or_else(DetectionResult::empty))
    }

    fn release(&mut self) {
        self.camera_open = false;
        self.releases += 1;
    }
}
