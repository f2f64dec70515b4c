use crate::VolumeFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const BASIC_SMOOTHING: f32 = 0.2;
const HQ_RATIO_SMOOTHING: f32 = 0.25;
const ATTACK: f32 = 0.35;
const RELEASE: f32 = 0.6;
const FLOOR_FALL: f32 = 0.25;
const FLOOR_RISE: f32 = 0.01;
const PEAK_DECAY: f32 = 0.985;
const MIN_RANGE: f32 = 0.006;
const INITIAL_FLOOR: f32 = 0.002;
const INITIAL_PEAK: f32 = 0.02;
const E_RATIO: f32 = 0.62;
const U_RATIO: f32 = 0.38;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouthState {
    #[default]
    Closed,
    Half,
    Open,
    E,
    U,
}

impl fmt::Display for MouthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MouthState::Closed => "closed",
            MouthState::Half => "half",
            MouthState::Open => "open",
            MouthState::E => "e",
            MouthState::U => "u",
        };
        f.write_str(s)
    }
}

/// Optional mouth sprites present in the loaded avatar. `closed` and `open`
/// always exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MouthSprites {
    pub half: bool,
    pub e: bool,
    pub u: bool,
}

impl MouthSprites {
    pub fn all() -> Self {
        Self {
            half: true,
            e: true,
            u: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouthSyncSettings {
    /// 0..100
    pub sensitivity: f32,
    pub hq_audio: bool,
    pub min_change_ms: u64,
}

impl Default for MouthSyncSettings {
    fn default() -> Self {
        Self {
            sensitivity: 50.0,
            hq_audio: true,
            min_change_ms: 45,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    closed: f32,
    half: f32,
}

/// Maps analyzer frames to mouth shapes.
///
/// HQ mode follows the signal with an attack/release envelope, tracks an
/// adaptive noise floor and a decaying peak, gates anything near the floor,
/// and uses separate opening and closing thresholds to stop chatter.
#[derive(Debug, Clone)]
pub struct MouthAnimator {
    settings: MouthSyncSettings,
    sprites: MouthSprites,
    state: MouthState,
    last_change: Option<Duration>,
    volume: f32,
    ratio: f32,
    envelope: f32,
    floor: f32,
    peak: f32,
}

impl MouthAnimator {
    pub fn new(settings: MouthSyncSettings, sprites: MouthSprites) -> Self {
        let mut settings = settings;
        settings.sensitivity = settings.sensitivity.clamp(0.0, 100.0);
        Self {
            settings,
            sprites,
            state: MouthState::Closed,
            last_change: None,
            volume: 0.0,
            ratio: 0.0,
            envelope: 0.0,
            floor: INITIAL_FLOOR,
            peak: INITIAL_PEAK,
        }
    }

    pub fn state(&self) -> MouthState {
        self.state
    }

    /// Smoothed volume in basic mode, shaped level (0..1) in HQ mode.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_sensitivity(&mut self, value: f32) {
        self.settings.sensitivity = value.clamp(0.0, 100.0);
    }

    pub fn set_hq_audio(&mut self, enabled: bool) {
        self.settings.hq_audio = enabled;
    }

    pub fn set_sprites(&mut self, sprites: MouthSprites) {
        self.sprites = sprites;
    }

    /// Close the mouth immediately and forget the signal statistics.
    pub fn reset(&mut self, now: Duration) {
        self.volume = 0.0;
        self.ratio = 0.0;
        self.envelope = 0.0;
        self.floor = INITIAL_FLOOR;
        self.peak = INITIAL_PEAK;
        self.set_state(MouthState::Closed, now, true);
    }

    /// Consume one frame observed at `now` and return the resulting shape.
    pub fn process(&mut self, frame: VolumeFrame, now: Duration) -> MouthState {
        if self.settings.hq_audio {
            self.process_hq(frame, now);
        } else {
            self.process_basic(frame, now);
        }
        self.state
    }

    fn sensitivity(&self) -> f32 {
        self.settings.sensitivity / 100.0
    }

    fn process_basic(&mut self, frame: VolumeFrame, now: Duration) {
        let s = BASIC_SMOOTHING;
        self.volume = self.volume * (1.0 - s) + frame.rms * s;
        self.ratio = self.ratio * (1.0 - s) + frame.high_ratio() * s;

        let sens = self.sensitivity();
        let th = Thresholds {
            closed: 0.008 + (1.0 - sens) * 0.018,
            half: 0.02 + (1.0 - sens) * 0.06,
        };
        let next = if self.volume < th.closed {
            MouthState::Closed
        } else if self.volume < th.half {
            if self.sprites.half {
                MouthState::Half
            } else {
                MouthState::Open
            }
        } else {
            self.vowel_or_open()
        };
        self.set_state(next, now, false);
    }

    fn process_hq(&mut self, frame: VolumeFrame, now: Duration) {
        let s = HQ_RATIO_SMOOTHING;
        self.ratio = self.ratio * (1.0 - s) + frame.high_ratio() * s;

        let k = if frame.rms > self.envelope { ATTACK } else { RELEASE };
        self.envelope = self.envelope * (1.0 - k) + frame.rms * k;

        let follow = if self.envelope < self.floor {
            FLOOR_FALL
        } else {
            FLOOR_RISE
        };
        self.floor = self.floor * (1.0 - follow) + self.envelope * follow;

        self.peak = self.envelope.max(self.peak * PEAK_DECAY);
        if self.peak < self.floor + MIN_RANGE {
            self.peak = self.floor + MIN_RANGE;
        }

        let sens = self.sensitivity();
        let gate = self.floor + 0.002 + (1.0 - sens) * 0.008;
        if self.envelope < gate {
            self.volume = 0.0;
            self.set_state(MouthState::Closed, now, false);
            return;
        }

        let level = ((self.envelope - self.floor) / (self.peak - self.floor)).clamp(0.0, 1.0);
        let gain = 0.6 + sens * 0.8;
        self.volume = (level.powf(0.75) * gain).min(1.0);

        let th = Thresholds {
            closed: 0.07 + (1.0 - sens) * 0.08,
            half: 0.22 + (1.0 - sens) * 0.12,
        };
        let next = self.select_with_hysteresis(self.volume, th);
        self.set_state(next, now, false);
    }

    fn select_with_hysteresis(&self, level: f32, th: Thresholds) -> MouthState {
        let close_th = (th.closed - 0.03).max(0.02);
        let half_down_th = (th.half - 0.02).max(close_th + 0.02);
        let has_half = self.sprites.half;

        let state = match self.state {
            MouthState::Closed => {
                if level >= th.half {
                    MouthState::Open
                } else if level >= th.closed {
                    if has_half {
                        MouthState::Half
                    } else {
                        MouthState::Open
                    }
                } else {
                    MouthState::Closed
                }
            }
            MouthState::Half => {
                if level < close_th {
                    MouthState::Closed
                } else if level >= th.half {
                    MouthState::Open
                } else {
                    MouthState::Half
                }
            }
            MouthState::Open | MouthState::E | MouthState::U => {
                if level < close_th {
                    MouthState::Closed
                } else if level < half_down_th && has_half {
                    MouthState::Half
                } else {
                    MouthState::Open
                }
            }
        };

        if state == MouthState::Open {
            self.vowel_or_open()
        } else {
            state
        }
    }

    fn vowel_or_open(&self) -> MouthState {
        if self.ratio > E_RATIO && self.sprites.e {
            MouthState::E
        } else if self.ratio < U_RATIO && self.sprites.u {
            MouthState::U
        } else {
            MouthState::Open
        }
    }

    fn set_state(&mut self, next: MouthState, now: Duration, force: bool) {
        if !force && next != self.state {
            let min = Duration::from_millis(self.settings.min_change_ms);
            if let Some(last) = self.last_change {
                if now.saturating_sub(last) < min {
                    return;
                }
            }
        }
        if force || next != self.state {
            tracing::trace!(from = %self.state, to = %next, "mouth");
            self.state = next;
            self.last_change = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(16);

    fn loud(ratio_high: bool) -> VolumeFrame {
        if ratio_high {
            VolumeFrame {
                rms: 0.3,
                low: 0.01,
                high: 0.08,
            }
        } else {
            VolumeFrame {
                rms: 0.3,
                low: 0.05,
                high: 0.05,
            }
        }
    }

    fn run(anim: &mut MouthAnimator, frame: VolumeFrame, frames: u32, t: &mut Duration) {
        for _ in 0..frames {
            *t += FRAME;
            anim.process(frame, *t);
        }
    }

    #[test]
    fn test_silence_keeps_mouth_closed() {
        let mut anim = MouthAnimator::new(MouthSyncSettings::default(), MouthSprites::all());
        let mut t = Duration::ZERO;
        run(&mut anim, VolumeFrame::default(), 120, &mut t);
        assert_eq!(anim.state(), MouthState::Closed);
        assert_eq!(anim.volume(), 0.0);
    }

    #[test]
    fn test_loud_speech_opens_then_closes() {
        let mut anim = MouthAnimator::new(MouthSyncSettings::default(), MouthSprites::default());
        let mut t = Duration::ZERO;
        run(&mut anim, loud(false), 10, &mut t);
        assert_eq!(anim.state(), MouthState::Open);

        run(&mut anim, VolumeFrame::default(), 30, &mut t);
        assert_eq!(anim.state(), MouthState::Closed);
    }

    #[test]
    fn test_bright_sound_selects_e_when_sprite_exists() {
        let mut anim = MouthAnimator::new(MouthSyncSettings::default(), MouthSprites::all());
        let mut t = Duration::ZERO;
        run(&mut anim, loud(true), 20, &mut t);
        assert_eq!(anim.state(), MouthState::E);

        let mut plain = MouthAnimator::new(MouthSyncSettings::default(), MouthSprites::default());
        let mut t = Duration::ZERO;
        run(&mut plain, loud(true), 20, &mut t);
        assert_eq!(plain.state(), MouthState::Open);
    }

    #[test]
    fn test_changes_are_rate_limited() {
        let mut anim = MouthAnimator::new(MouthSyncSettings::default(), MouthSprites::default());
        anim.reset(Duration::from_millis(1_000));
        anim.process(loud(false), Duration::from_millis(1_010));
        assert_eq!(anim.state(), MouthState::Closed);
        anim.process(loud(false), Duration::from_millis(1_050));
        assert_eq!(anim.state(), MouthState::Open);
    }

    #[test]
    fn test_basic_mode_thresholds() {
        let settings = MouthSyncSettings {
            hq_audio: false,
            min_change_ms: 0,
            ..MouthSyncSettings::default()
        };
        let mut anim = MouthAnimator::new(settings, MouthSprites::all());
        let mut t = Duration::ZERO;
        // settles near 0.03: above closed (0.017), below half (0.05)
        run(
            &mut anim,
            VolumeFrame {
                rms: 0.03,
                low: 0.01,
                high: 0.01,
            },
            60,
            &mut t,
        );
        assert_eq!(anim.state(), MouthState::Half);
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let s: MouthSyncSettings = serde_json::from_str(r#"{"sensitivity": 80}"#).unwrap();
        assert_eq!(s.sensitivity, 80.0);
        assert!(s.hq_audio);
        assert_eq!(s.min_change_ms, 45);
    }
}
