use crate::{Error, Result};
use serde::{Deserialize, Serialize};

const CROSSOVER_HZ: f32 = 700.0;
const REPORTS_PER_SEC: u32 = 60;

/// One analysis window.
///
/// `rms` is the root mean square of the raw signal; `low` and `high` are the
/// mean energies below and above the crossover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeFrame {
    pub rms: f32,
    pub low: f32,
    pub high: f32,
}

impl VolumeFrame {
    /// Share of energy in the high band, 0..1.
    pub fn high_ratio(&self) -> f32 {
        self.high / (self.low + self.high + 1e-6)
    }
}

/// First-order IIR band splitter with fixed-size reporting windows.
#[derive(Debug, Clone)]
pub struct VolumeAnalyzer {
    alpha: f32,
    report_samples: usize,
    low_state: f32,
    sum_sq: f32,
    low_energy: f32,
    high_energy: f32,
    count: usize,
}

impl VolumeAnalyzer {
    pub fn new(sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::SampleRate(sample_rate));
        }
        let alpha = 1.0 - (-2.0 * std::f32::consts::PI * CROSSOVER_HZ / sample_rate as f32).exp();
        Ok(Self {
            alpha,
            report_samples: (sample_rate / REPORTS_PER_SEC).max(1) as usize,
            low_state: 0.0,
            sum_sq: 0.0,
            low_energy: 0.0,
            high_energy: 0.0,
            count: 0,
        })
    }

    pub fn report_samples(&self) -> usize {
        self.report_samples
    }

    /// Feed samples in -1..1; every completed window is appended to `out`.
    pub fn process(&mut self, samples: &[f32], out: &mut Vec<VolumeFrame>) {
        for &x in samples {
            let low = self.low_state + self.alpha * (x - self.low_state);
            self.low_state = low;
            let high = x - low;

            self.sum_sq += x * x;
            self.low_energy += low * low;
            self.high_energy += high * high;
            self.count += 1;

            if self.count >= self.report_samples {
                let n = self.count as f32;
                out.push(VolumeFrame {
                    rms: (self.sum_sq / n).sqrt(),
                    low: self.low_energy / n,
                    high: self.high_energy / n,
                });
                self.count = 0;
                self.sum_sq = 0.0;
                self.low_energy = 0.0;
                self.high_energy = 0.0;
            }
        }
    }

    /// Convenience for 16-bit PCM.
    pub fn process_i16(&mut self, samples: &[i16], out: &mut Vec<VolumeFrame>) {
        let floats: Vec<f32> = samples.iter().map(|s| f32::from(*s) / 32768.0).collect();
        self.process(&floats, out);
    }
}
