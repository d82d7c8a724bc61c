//! Windowed forward/inverse spectral transform.
//!
//! Analysis takes Hann-windowed blocks, zero-pads them to the FFT
//! resolution, and keeps the lowest `num_bins` bins as triples
//! `(log2 |Re|, log2 |Im|, phase)`. Synthesis rebuilds the complex
//! spectrum from the triples (the phase recovers the component signs),
//! inverse-transforms, and overlap-adds under the analysis window.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use thiserror::Error;

use super::Frame;
use crate::audio::RateFamily;

/// Analysis window length in samples.
pub const WINDOW: usize = 1280;
/// FFT length the window is zero-padded to.
pub const RESOLUTION: usize = 4096;
/// Output gain applied by inverse synthesis.
pub const VOLUME_BOOST: f64 = 4.0;

/// Magnitude floor before taking log2; keeps silent bins finite.
const LOG_FLOOR: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("window {window} must be non-zero and at most the resolution {resolution}")]
    BadWindow { window: usize, resolution: usize },
    #[error("num_bins {num_bins} exceeds usable bins of a {resolution}-point transform")]
    TooManyBins { num_bins: usize, resolution: usize },
    #[error("frame {index} has {actual} bins, transform expects {expected}")]
    FrameSize {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

/// Deterministic, stateless-per-call spectral transform.
pub struct PhaseTransform {
    window: usize,
    hop: usize,
    resolution: usize,
    num_bins: usize,
    volume_boost: f64,
    hann: Vec<f64>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl PhaseTransform {
    pub fn new(
        window: usize,
        resolution: usize,
        num_bins: usize,
        volume_boost: f64,
    ) -> Result<Self, TransformError> {
        if window == 0 || window > resolution {
            return Err(TransformError::BadWindow { window, resolution });
        }
        if num_bins == 0 || num_bins > resolution / 2 {
            return Err(TransformError::TooManyBins {
                num_bins,
                resolution,
            });
        }
        let mut planner = FftPlanner::new();
        Ok(Self {
            window,
            hop: (window / 2).max(1),
            resolution,
            num_bins,
            volume_boost,
            hann: hann_window(window),
            forward: planner.plan_fft_forward(resolution),
            inverse: planner.plan_fft_inverse(resolution),
        })
    }

    /// The codec's standard transform for a rate family.
    pub fn for_family(family: RateFamily) -> Self {
        // The parameter set is static and always valid.
        match Self::new(WINDOW, RESOLUTION, family.num_bins(), VOLUME_BOOST) {
            Ok(transform) => transform,
            Err(_) => unreachable!("standard transform parameters are valid"),
        }
    }

    /// Retained bins per frame; callers partition this into bands.
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Forward analysis: samples to spectral frames.
    pub fn to_spectral(&self, samples: &[f32]) -> Vec<Frame> {
        let mut frames = Vec::new();
        if samples.is_empty() {
            return frames;
        }
        let mut buffer = vec![Complex::new(0.0, 0.0); self.resolution];
        let mut start = 0usize;
        while start < samples.len() {
            self.fill_windowed(&mut buffer, samples, start);
            self.forward.process(&mut buffer);
            frames.push(self.frame_from_spectrum(&buffer));
            start += self.hop;
        }
        frames
    }

    /// Inverse synthesis: spectral frames back to samples.
    pub fn from_spectral(&self, frames: &[Frame]) -> Result<Vec<f32>, TransformError> {
        for (index, frame) in frames.iter().enumerate() {
            if frame.len() != self.num_bins {
                return Err(TransformError::FrameSize {
                    index,
                    expected: self.num_bins,
                    actual: frame.len(),
                });
            }
        }
        if frames.is_empty() {
            return Ok(Vec::new());
        }

        let out_len = (frames.len() - 1) * self.hop + self.window;
        let mut accum = vec![0.0_f64; out_len];
        let mut envelope = vec![0.0_f64; out_len];
        let mut buffer = vec![Complex::new(0.0, 0.0); self.resolution];
        for (index, frame) in frames.iter().enumerate() {
            self.spectrum_from_frame(&mut buffer, frame);
            self.inverse.process(&mut buffer);
            let start = index * self.hop;
            for i in 0..self.window {
                let value = buffer[i].re / self.resolution as f64;
                accum[start + i] += value * self.hann[i];
                envelope[start + i] += self.hann[i] * self.hann[i];
            }
        }

        let mut out = Vec::with_capacity(out_len);
        for (value, weight) in accum.iter().zip(&envelope) {
            let sample = if *weight > 1e-8 { value / weight } else { 0.0 };
            out.push((sample * self.volume_boost) as f32);
        }
        Ok(out)
    }

    fn fill_windowed(&self, buffer: &mut [Complex<f64>], samples: &[f32], start: usize) {
        for (i, cell) in buffer.iter_mut().enumerate() {
            if i < self.window {
                let sample = samples.get(start + i).copied().unwrap_or(0.0);
                let sample = if sample.is_finite() {
                    sample.clamp(-1.0, 1.0) as f64
                } else {
                    0.0
                };
                *cell = Complex::new(sample * self.hann[i], 0.0);
            } else {
                *cell = Complex::new(0.0, 0.0);
            }
        }
    }

    fn frame_from_spectrum(&self, spectrum: &[Complex<f64>]) -> Frame {
        let mut bins = Vec::with_capacity(self.num_bins);
        for cell in &spectrum[..self.num_bins] {
            let re_mag = cell.re.abs().max(LOG_FLOOR);
            let im_mag = cell.im.abs().max(LOG_FLOOR);
            bins.push([re_mag.log2(), im_mag.log2(), cell.im.atan2(cell.re)]);
        }
        Frame { bins }
    }

    fn spectrum_from_frame(&self, buffer: &mut [Complex<f64>], frame: &Frame) {
        buffer.fill(Complex::new(0.0, 0.0));
        for (bin, &[log_re, log_im, phase]) in frame.bins.iter().enumerate() {
            let re = log_re.exp2().copysign(phase.cos());
            let im = log_im.exp2().copysign(phase.sin());
            buffer[bin] = Complex::new(re, im);
            if bin > 0 {
                // Conjugate mirror keeps the inverse transform real.
                buffer[self.resolution - bin] = Complex::new(re, -im);
            }
        }
    }
}

fn hann_window(length: usize) -> Vec<f64> {
    if length <= 1 {
        return vec![1.0_f64; length.max(1)];
    }
    let denom = (length - 1) as f64;
    (0..length)
        .map(|n| 0.5 * (1.0 - (2.0 * PI * n as f64 / denom).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (0.5 * (2.0 * PI * freq * i as f64 / rate).sin()) as f32)
            .collect()
    }

    #[test]
    fn frame_count_follows_hop() {
        let transform = PhaseTransform::for_family(RateFamily::Hz48000);
        let frames = transform.to_spectral(&sine(440.0, 48_000.0, 48_000));
        assert_eq!(frames.len(), 48_000_usize.div_ceil(WINDOW / 2));
        for frame in &frames {
            assert_eq!(frame.len(), 768);
        }
    }

    #[test]
    fn forward_is_deterministic() {
        let transform = PhaseTransform::for_family(RateFamily::Hz48000);
        let samples = sine(440.0, 48_000.0, 8_192);
        assert_eq!(transform.to_spectral(&samples), transform.to_spectral(&samples));
    }

    #[test]
    fn inverse_recovers_a_low_frequency_sine() {
        let transform = PhaseTransform::for_family(RateFamily::Hz48000);
        let samples = sine(440.0, 48_000.0, 12_800);
        let frames = transform.to_spectral(&samples);
        let rebuilt = transform.from_spectral(&frames).unwrap();

        // Compare the interior, away from partially-covered edges.
        let lo = WINDOW;
        let hi = samples.len() - WINDOW;
        let mut dot = 0.0_f64;
        let mut norm_a = 0.0_f64;
        let mut norm_b = 0.0_f64;
        for i in lo..hi {
            let a = samples[i] as f64;
            let b = rebuilt[i] as f64;
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let correlation = dot / (norm_a.sqrt() * norm_b.sqrt()).max(1e-12);
        assert!(
            correlation > 0.95,
            "reconstruction correlation too low: {correlation}"
        );
    }

    #[test]
    fn from_spectral_rejects_wrong_bin_count() {
        let transform = PhaseTransform::for_family(RateFamily::Hz48000);
        let frame = Frame {
            bins: vec![[0.0, 0.0, 0.0]; 10],
        };
        let err = transform.from_spectral(&[frame]).unwrap_err();
        assert!(matches!(
            err,
            TransformError::FrameSize {
                expected: 768,
                actual: 10,
                ..
            }
        ));
    }

    #[test]
    fn bad_parameters_are_rejected() {
        assert!(PhaseTransform::new(0, 4_096, 768, 1.0).is_err());
        assert!(PhaseTransform::new(1_280, 4_096, 3_000, 1.0).is_err());
    }
}
