// Stats module - aggregation over values that may be missing
//
// Missing entries are `None`, never NaN. Every aggregate takes an explicit
// `MissingPolicy` so the caller decides whether a gap poisons the result.

/// How aggregation treats missing entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Ignore missing entries; the result is missing only if all are missing
    Skip,
    /// Any missing entry makes the result missing
    Propagate,
}

/// Mean of optional values under the given policy
pub fn mean<I>(values: I, policy: MissingPolicy) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        match value {
            Some(v) => {
                sum += v;
                count += 1;
            }
            None if policy == MissingPolicy::Propagate => return None,
            None => {}
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Arithmetic mean of a dense slice (`None` when empty)
pub fn dense_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Unbiased sample variance; zero for fewer than two values
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    ss / (values.len() - 1) as f64
}

/// Lower median of a list of counts (`None` when empty)
pub fn median_usize(values: &[usize]) -> Option<usize> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_skip_missing() {
        let values = vec![Some(1.0), None, Some(3.0)];
        assert_eq!(mean(values, MissingPolicy::Skip), Some(2.0));
    }

    #[test]
    fn test_mean_propagate_missing() {
        let values = vec![Some(1.0), None, Some(3.0)];
        assert_eq!(mean(values, MissingPolicy::Propagate), None);
        assert_eq!(
            mean(vec![Some(2.0), Some(4.0)], MissingPolicy::Propagate),
            Some(3.0)
        );
    }

    #[test]
    fn test_mean_all_missing() {
        assert_eq!(mean(vec![None, None], MissingPolicy::Skip), None);
        assert_eq!(mean(Vec::new(), MissingPolicy::Skip), None);
    }

    #[test]
    fn test_sample_variance() {
        assert_eq!(sample_variance(&[5.0]), 0.0);
        assert!((sample_variance(&[1.0, 2.0, 3.0, 4.0]) - 1.6666666666666667).abs() < 1e-12);
    }

    #[test]
    fn test_median_usize() {
        assert_eq!(median_usize(&[]), None);
        assert_eq!(median_usize(&[5, 1, 3]), Some(3));
        assert_eq!(median_usize(&[4, 1, 3, 2]), Some(2));
    }
}
