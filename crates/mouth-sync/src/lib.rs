//! mouth-sync: lip-sync for a sprite-based avatar
//!
//! [`VolumeAnalyzer`] splits speech audio at 700 Hz and reports band energies
//! about sixty times a second. [`MouthAnimator`] turns those frames into a
//! [`MouthState`]. [`spawn_analyzer`] runs the analyzer on its own thread.

mod error;
pub use error::{Error, Result};

mod analyzer;
pub use analyzer::{VolumeAnalyzer, VolumeFrame};

mod animator;
pub use animator::{MouthAnimator, MouthSprites, MouthState, MouthSyncSettings};

mod worker;
pub use worker::{spawn_analyzer, AnalyzerHandle};
