// Spatial filter - fixed linear channel mixing
//
// The filter is a square N × N matrix applied to the first N channels of a
// signal: `filtered = signal[:, ..N] · M`. Column j of M holds the weights
// that build output channel j. A surface Laplacian places 1 on the diagonal
// and -1/k on the k neighbours of each channel.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use ndarray::{s, Array2};

use crate::error::{ConfigError, PipelineError};
use crate::signal::{ChannelAxis, Signal};

/// Square channel-mixing matrix
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialFilter {
    matrix: Array2<f64>,
}

impl SpatialFilter {
    /// Pass-through filter on the first `n` channels
    pub fn identity(n: usize) -> Self {
        Self {
            matrix: Array2::eye(n),
        }
    }

    /// Build from row-major nested vectors; the matrix must be square
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, ConfigError> {
        let n = rows.len();
        if n == 0 {
            return Err(ConfigError::InvalidSpatialFilter {
                reason: "matrix is empty".to_string(),
            });
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != n) {
            return Err(ConfigError::InvalidSpatialFilter {
                reason: format!("row {} has {} entries, expected {}", i, row.len(), n),
            });
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let matrix = Array2::from_shape_vec((n, n), flat).map_err(|err| {
            ConfigError::InvalidSpatialFilter {
                reason: err.to_string(),
            }
        })?;
        Ok(Self { matrix })
    }

    /// Load a JSON array of rows
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let display = path.as_ref().display().to_string();
        let contents = fs::read_to_string(&path).map_err(|err| ConfigError::Unreadable {
            path: display.clone(),
            reason: err.to_string(),
        })?;
        let rows: Vec<Vec<f64>> =
            serde_json::from_str(&contents).map_err(|err| ConfigError::Malformed {
                path: display,
                reason: err.to_string(),
            })?;
        Self::from_rows(rows)
    }

    /// Small surface Laplacian from a neighbour list
    ///
    /// Channels without an entry in `neighbours` pass through unchanged.
    pub fn laplacian(
        axis: &ChannelAxis,
        neighbours: &HashMap<String, Vec<String>>,
    ) -> Result<Self, ConfigError> {
        let n = axis.len();
        let mut matrix = Array2::<f64>::eye(n);

        for (center, around) in neighbours {
            let j = axis
                .position(center)
                .ok_or_else(|| ConfigError::InvalidSpatialFilter {
                    reason: format!("unknown channel {}", center),
                })?;
            if around.is_empty() {
                continue;
            }
            let weight = -1.0 / around.len() as f64;
            for name in around {
                let i = axis
                    .position(name)
                    .ok_or_else(|| ConfigError::InvalidSpatialFilter {
                        reason: format!("unknown neighbour {} of {}", name, center),
                    })?;
                matrix[[i, j]] = weight;
            }
        }

        Ok(Self { matrix })
    }

    /// Number of input (and output) channels
    pub fn size(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Apply to the first `size()` channels of a signal
    ///
    /// # Errors
    /// `SpatialFilterMismatch` when the signal has fewer channels than the
    /// filter expects.
    pub fn apply(&self, signal: &Signal) -> Result<Signal, PipelineError> {
        let n = self.size();
        if signal.n_channels() < n {
            return Err(PipelineError::SpatialFilterMismatch {
                expected: n,
                actual: signal.n_channels(),
            });
        }

        let filtered = signal.data.slice(s![.., ..n]).dot(&self.matrix);
        Ok(Signal::new(
            filtered,
            signal.sample_rate,
            signal.channels.truncated(n),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn signal(data: Array2<f64>) -> Signal {
        let n = data.ncols();
        Signal::new(data, 256.0, ChannelAxis::numbered(n))
    }

    #[test]
    fn test_identity_keeps_first_channels() {
        let sig = signal(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let out = SpatialFilter::identity(2).apply(&sig).unwrap();
        assert_eq!(out.data, array![[1.0, 2.0], [4.0, 5.0]]);
        assert_eq!(out.channels.len(), 2);
    }

    #[test]
    fn test_mismatch_is_error() {
        let sig = signal(array![[1.0, 2.0]]);
        let err = SpatialFilter::identity(3).apply(&sig).unwrap_err();
        assert_eq!(
            err,
            PipelineError::SpatialFilterMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_laplacian_removes_common_signal() {
        let axis = ChannelAxis::new(vec!["C3".into(), "FC3".into(), "CP3".into()]);
        let neighbours = HashMap::from([(
            "C3".to_string(),
            vec!["FC3".to_string(), "CP3".to_string()],
        )]);
        let filter = SpatialFilter::laplacian(&axis, &neighbours).unwrap();

        // A common-mode value on every channel cancels on the Laplacian channel
        let sig = Signal::new(array![[5.0, 5.0, 5.0], [2.0, 1.0, 3.0]], 256.0, axis);
        let out = filter.apply(&sig).unwrap();
        assert!(out.data[[0, 0]].abs() < 1e-12);
        assert!(out.data[[1, 0]].abs() < 1e-12);
        assert_eq!(out.data[[1, 1]], 1.0);
    }

    #[test]
    fn test_laplacian_unknown_neighbour() {
        let axis = ChannelAxis::new(vec!["C3".into()]);
        let neighbours = HashMap::from([("C3".to_string(), vec!["Pz".to_string()])]);
        assert!(SpatialFilter::laplacian(&axis, &neighbours).is_err());
    }

    #[test]
    fn test_from_rows_requires_square() {
        assert!(SpatialFilter::from_rows(vec![vec![1.0, 0.0]]).is_err());
        assert!(SpatialFilter::from_rows(vec![]).is_err());
        let filter = SpatialFilter::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(filter.size(), 2);
    }
}
