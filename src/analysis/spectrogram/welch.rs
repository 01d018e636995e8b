// Welch module - averaged periodogram power estimation
//
// A frame is split into overlapping Hann-windowed segments; each segment's
// periodogram is normalized to power per Hz and the segments are averaged:
//
//   PSD[k] = mean_s( |X_s[k]|² × g_k / (fs × S2) )
//
// where S2 is the sum of squared window coefficients and g_k = 2 for bins
// that have a negative-frequency twin (one-sided spectrum), 1 otherwise.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Welch power estimator for fixed segment length and stride
pub struct WelchEstimator {
    fft: Arc<dyn Fft<f64>>,
    segment_len: usize,
    segment_step: usize,
    sample_rate: f64,
    /// Hann window (pre-computed)
    window: Vec<f64>,
    /// 1 / (fs × S2)
    scale: f64,
}

impl WelchEstimator {
    /// Create an estimator
    ///
    /// # Arguments
    /// * `segment_len` - Periodogram length in samples (FFT size)
    /// * `segment_step` - Stride between segments in samples
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(segment_len: usize, segment_step: usize, sample_rate: f64) -> Self {
        let segment_len = segment_len.max(2);
        let window: Vec<f64> = (0..segment_len)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f64::consts::PI * i as f64) / (segment_len as f64 - 1.0)).cos())
            })
            .collect();
        let window_power: f64 = window.iter().map(|w| w * w).sum();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(segment_len);

        Self {
            fft,
            segment_len,
            segment_step: segment_step.max(1),
            sample_rate,
            window,
            scale: 1.0 / (sample_rate * window_power),
        }
    }

    /// Number of one-sided frequency bins
    pub fn n_bins(&self) -> usize {
        self.segment_len / 2 + 1
    }

    /// Frequency (Hz) of every one-sided bin
    pub fn frequencies(&self) -> Vec<f64> {
        let resolution = self.sample_rate / self.segment_len as f64;
        (0..self.n_bins()).map(|k| k as f64 * resolution).collect()
    }

    /// Scratch buffer sized for `estimate`
    pub fn make_scratch(&self) -> Vec<Complex<f64>> {
        vec![Complex::new(0.0, 0.0); self.fft.get_inplace_scratch_len()]
    }

    /// Averaged one-sided PSD of a frame
    ///
    /// Frames shorter than one segment are zero-padded to a single segment.
    pub fn estimate(&self, frame: &[f64], scratch: &mut [Complex<f64>]) -> Vec<f64> {
        let n_bins = self.n_bins();
        let mut psd = vec![0.0; n_bins];
        let mut buffer = vec![Complex::new(0.0, 0.0); self.segment_len];

        let n_segments = if frame.len() <= self.segment_len {
            1
        } else {
            (frame.len() - self.segment_len) / self.segment_step + 1
        };

        for s in 0..n_segments {
            let start = s * self.segment_step;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = frame.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(sample * self.window[i], 0.0);
            }

            self.fft.process_with_scratch(&mut buffer, scratch);

            for (k, bin) in psd.iter_mut().enumerate() {
                *bin += buffer[k].norm_sqr();
            }
        }

        let nyquist_is_twinless = self.segment_len % 2 == 0;
        for (k, bin) in psd.iter_mut().enumerate() {
            let one_sided = if k == 0 || (nyquist_is_twinless && k == n_bins - 1) {
                1.0
            } else {
                2.0
            };
            *bin *= one_sided * self.scale / n_segments as f64;
        }

        psd
    }
}
