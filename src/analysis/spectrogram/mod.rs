// Spectrogram - spatially filtered, windowed power spectra
//
// Module organization:
// - welch: averaged periodogram estimator (rustfft)
// - mod.rs: SpectralFeaturizer (spatial filter → sliding frames → band crop)
//
// Window w analyses the frame of `mlength` seconds starting at sample
// `w × wshift`. Inside the frame, Welch segments of `wlength` seconds advance
// by `pshift` seconds and are averaged, which smooths the estimate over the
// frame. Only bins inside [freq_min, freq_max] are kept.

mod welch;

pub use welch::WelchEstimator;

use ndarray::{Array3, Axis};

use crate::config::{PipelineConfig, SpectrogramConfig};
use crate::error::PipelineError;
use crate::signal::{ChannelAxis, Signal, SpatialFilter};

/// Power per window, frequency bin and channel
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedPsd {
    /// Window × frequency × channel, non-negative
    pub power: Array3<f64>,
    /// Ascending frequency axis (Hz)
    pub freqs: Vec<f64>,
    pub channels: ChannelAxis,
}

impl WindowedPsd {
    pub fn n_windows(&self) -> usize {
        self.power.len_of(Axis(0))
    }

    pub fn n_freqs(&self) -> usize {
        self.power.len_of(Axis(1))
    }

    pub fn n_channels(&self) -> usize {
        self.power.len_of(Axis(2))
    }

    /// Stack several PSDs along the window axis, in order
    ///
    /// All parts must share frequency and channel axes.
    pub fn concatenate(parts: &[WindowedPsd]) -> Result<WindowedPsd, PipelineError> {
        let first = parts.first().ok_or(PipelineError::EmptySession)?;
        for part in &parts[1..] {
            if part.freqs != first.freqs {
                return Err(PipelineError::DimensionMismatch {
                    what: "frequency axis",
                    expected: first.n_freqs(),
                    actual: part.n_freqs(),
                });
            }
            if part.channels != first.channels {
                return Err(PipelineError::DimensionMismatch {
                    what: "channel axis",
                    expected: first.n_channels(),
                    actual: part.n_channels(),
                });
            }
        }

        let views: Vec<_> = parts.iter().map(|p| p.power.view()).collect();
        let power = ndarray::concatenate(Axis(0), &views).map_err(|_| {
            PipelineError::DimensionMismatch {
                what: "power tensor",
                expected: first.n_freqs() * first.n_channels(),
                actual: 0,
            }
        })?;

        Ok(WindowedPsd {
            power,
            freqs: first.freqs.clone(),
            channels: first.channels.clone(),
        })
    }
}

/// Turns raw signals into band-limited windowed PSDs
pub struct SpectralFeaturizer {
    filter: SpatialFilter,
    welch: WelchEstimator,
    sample_rate: f64,
    frame_len: usize,
    stride: usize,
    /// Indices of the kept bins in the full one-sided spectrum
    band_bins: Vec<usize>,
    freqs: Vec<f64>,
}

impl SpectralFeaturizer {
    /// Build a featurizer for the configured sample rate and band
    pub fn new(config: &PipelineConfig, filter: SpatialFilter) -> Self {
        let fs = config.acquisition.sample_rate;
        let window = &config.spectrogram;
        let welch = WelchEstimator::new(
            SpectrogramConfig::to_samples(window.wlength, fs),
            SpectrogramConfig::to_samples(window.pshift, fs),
            fs,
        );

        let all_freqs = welch.frequencies();
        let band_bins: Vec<usize> = all_freqs
            .iter()
            .enumerate()
            .filter(|(_, f)| **f >= window.freq_min && **f <= window.freq_max)
            .map(|(k, _)| k)
            .collect();
        let freqs = band_bins.iter().map(|&k| all_freqs[k]).collect();

        Self {
            filter,
            welch,
            sample_rate: fs,
            frame_len: SpectrogramConfig::to_samples(window.mlength, fs),
            stride: SpectrogramConfig::to_samples(window.wshift, fs),
            band_bins,
            freqs,
        }
    }

    /// Outer window stride in samples
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Analysis frame length in samples
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Kept frequency axis (Hz)
    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    /// Number of windows a run of `n_samples` produces
    pub fn window_count(&self, n_samples: usize) -> usize {
        if n_samples < self.frame_len {
            0
        } else {
            (n_samples - self.frame_len) / self.stride + 1
        }
    }

    /// Spatially filter a signal and compute its band-limited spectrogram
    ///
    /// # Errors
    /// * `SampleRateMismatch` - signal rate differs from the configured rate
    /// * `SpatialFilterMismatch` - signal has too few channels
    pub fn transform(&self, signal: &Signal) -> Result<WindowedPsd, PipelineError> {
        if (signal.sample_rate - self.sample_rate).abs() > 1e-6 {
            return Err(PipelineError::SampleRateMismatch {
                expected: self.sample_rate,
                actual: signal.sample_rate,
            });
        }

        let filtered = self.filter.apply(signal)?;
        let n_windows = self.window_count(filtered.n_samples());
        let n_channels = filtered.n_channels();
        let mut power = Array3::<f64>::zeros((n_windows, self.band_bins.len(), n_channels));
        let mut scratch = self.welch.make_scratch();

        for c in 0..n_channels {
            let column: Vec<f64> = filtered.data.column(c).to_vec();
            for w in 0..n_windows {
                let start = w * self.stride;
                let frame = &column[start..start + self.frame_len];
                let psd = self.welch.estimate(frame, &mut scratch);
                for (f, &k) in self.band_bins.iter().enumerate() {
                    power[[w, f, c]] = psd[k];
                }
            }
        }

        tracing::debug!(
            "[SpectralFeaturizer] {} samples -> {} windows x {} bins x {} channels",
            filtered.n_samples(),
            n_windows,
            self.band_bins.len(),
            n_channels
        );

        Ok(WindowedPsd {
            power,
            freqs: self.freqs.clone(),
            channels: filtered.channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array2};

    fn test_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.acquisition.sample_rate = 256.0;
        config.acquisition.n_channels = 2;
        config.spectrogram.freq_min = 4.0;
        config.spectrogram.freq_max = 30.0;
        config
    }

    fn two_channel_signal(fs: f64, seconds: f64) -> Signal {
        let n = (fs * seconds) as usize;
        let mut data = Array2::<f64>::zeros((n, 3));
        for i in 0..n {
            let t = i as f64 / fs;
            data[[i, 0]] = (2.0 * std::f64::consts::PI * 10.0 * t).sin();
            data[[i, 1]] = 0.1 * (2.0 * std::f64::consts::PI * 10.0 * t).sin();
            data[[i, 2]] = 100.0;
        }
        Signal::new(data, fs, ChannelAxis::numbered(3))
    }

    #[test]
    fn test_window_count_and_axes() {
        let config = test_config();
        let featurizer = SpectralFeaturizer::new(&config, SpatialFilter::identity(2));
        // frame 256, stride 16
        assert_eq!(featurizer.frame_len(), 256);
        assert_eq!(featurizer.stride(), 16);
        assert_eq!(featurizer.window_count(255), 0);
        assert_eq!(featurizer.window_count(256), 1);
        assert_eq!(featurizer.window_count(512), 17);

        let freqs = featurizer.freqs();
        assert_eq!(freqs.first(), Some(&4.0));
        assert_eq!(freqs.last(), Some(&30.0));
        assert!(freqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_transform_shapes_and_power() {
        let config = test_config();
        let featurizer = SpectralFeaturizer::new(&config, SpatialFilter::identity(2));
        let psd = featurizer.transform(&two_channel_signal(256.0, 3.0)).unwrap();

        assert_eq!(psd.n_windows(), featurizer.window_count(768));
        assert_eq!(psd.n_channels(), 2);
        assert_eq!(psd.n_freqs(), featurizer.freqs().len());
        assert!(psd.power.iter().all(|&p| p >= 0.0));

        let bin_10hz = psd.freqs.iter().position(|&f| f == 10.0).unwrap();
        let ratio = psd.power[[0, bin_10hz, 0]] / psd.power[[0, bin_10hz, 1]];
        assert!((ratio - 100.0).abs() < 1e-6, "ratio was {}", ratio);
    }

    #[test]
    fn test_transform_rejects_narrow_signal() {
        let config = test_config();
        let featurizer = SpectralFeaturizer::new(&config, SpatialFilter::identity(4));
        let err = featurizer
            .transform(&two_channel_signal(256.0, 2.0))
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::SpatialFilterMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_transform_rejects_wrong_rate() {
        let config = test_config();
        let featurizer = SpectralFeaturizer::new(&config, SpatialFilter::identity(2));
        let err = featurizer
            .transform(&two_channel_signal(128.0, 4.0))
            .unwrap_err();
        assert!(matches!(err, PipelineError::SampleRateMismatch { .. }));
    }

    #[test]
    fn test_concatenate() {
        let config = test_config();
        let featurizer = SpectralFeaturizer::new(&config, SpatialFilter::identity(2));
        let a = featurizer.transform(&two_channel_signal(256.0, 2.0)).unwrap();
        let b = featurizer.transform(&two_channel_signal(256.0, 3.0)).unwrap();
        let joined = WindowedPsd::concatenate(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(joined.n_windows(), a.n_windows() + b.n_windows());
        assert_eq!(
            joined.power.slice(s![a.n_windows().., .., ..]),
            b.power.view()
        );

        assert_eq!(
            WindowedPsd::concatenate(&[]).unwrap_err(),
            PipelineError::EmptySession
        );
    }
}
