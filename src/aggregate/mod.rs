use crate::error::AggregateError;
use crate::summary::Summary;

/// Checks that every summary carries the key set and time axis of the first one.
fn check_contract(summaries: &[Summary]) -> Result<(), AggregateError> {
    let first = summaries.first().ok_or(AggregateError::Empty)?;
    let expected: Vec<String> = first.keys().map(str::to_string).collect();
    let samples = first.samples();

    for (replicate, summary) in summaries.iter().enumerate() {
        if !summary.keys().eq(expected.iter().map(String::as_str)) {
            return Err(AggregateError::ChannelMismatch {
                replicate,
                expected,
                found: summary.keys().map(str::to_string).collect(),
            });
        }
        for (channel, series) in summary.iter() {
            if series.len() != samples {
                return Err(AggregateError::LengthMismatch {
                    replicate,
                    channel: channel.to_string(),
                    expected: samples,
                    found: series.len(),
                });
            }
        }
    }
    Ok(())
}

/// Mean trajectory across replicate summaries, channel by channel.
///
/// The whole input is validated before any arithmetic happens.
pub fn aggregate(summaries: &[Summary]) -> Result<Summary, AggregateError> {
    check_contract(summaries)?;

    let (first, rest) = summaries.split_first().ok_or(AggregateError::Empty)?;
    let mut total = rest.iter().fold(first.clone(), |mut acc, summary| {
        for (channel, series) in acc.iter_mut() {
            if let Some(other) = summary.get(channel) {
                for (a, b) in series.iter_mut().zip(other) {
                    *a += b;
                }
            }
        }
        acc
    });

    let count = summaries.len() as f64;
    for (_, series) in total.iter_mut() {
        for value in series.iter_mut() {
            *value /= count;
        }
    }
    Ok(total)
}

/// Mean of the censored homologous D-loop series, smoothed with a centered
/// box filter of `window` samples. A window of 0 or an all-zero mean skips
/// the smoothing.
pub fn aggregate_dlc(series: &[Vec<f64>], window: usize) -> Result<Vec<f64>, AggregateError> {
    let first = series.first().ok_or(AggregateError::Empty)?;
    let samples = first.len();
    for (replicate, row) in series.iter().enumerate() {
        if row.len() != samples {
            return Err(AggregateError::LengthMismatch {
                replicate,
                channel: crate::summary::DLOOP_HOMOLOGIES.to_string(),
                expected: samples,
                found: row.len(),
            });
        }
    }

    let count = series.len() as f64;
    let mut mean = vec![0.0; samples];
    for row in series {
        for (acc, value) in mean.iter_mut().zip(row) {
            *acc += value;
        }
    }
    for value in mean.iter_mut() {
        *value /= count;
    }

    let peak = mean.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if window == 0 || peak.is_nan() || peak <= 0.0 {
        return Ok(mean);
    }
    Ok(box_filter(&mean, window))
}

/// Zero padded moving average with the output aligned on the input, the way
/// a `same` mode convolution with a flat kernel is.
pub fn box_filter(signal: &[f64], window: usize) -> Vec<f64> {
    if window == 0 {
        return signal.to_vec();
    }
    let n = signal.len() as isize;
    let offset = ((window - 1) / 2) as isize;
    let width = window as f64;

    (0..n)
        .map(|i| {
            // full convolution index i + offset covers signal[i + offset - window + 1 ..= i + offset]
            let hi = i + offset;
            let lo = hi - window as isize + 1;
            (lo.max(0)..=hi.min(n - 1))
                .map(|j| signal[j as usize])
                .sum::<f64>()
                / width
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::RECOMBINED_CHANNEL;

    fn recombined(values: Vec<f64>) -> Summary {
        let mut summary = Summary::new();
        summary.insert("time", vec![0.0, 10.0, 20.0]);
        summary.insert(RECOMBINED_CHANNEL, values);
        summary
    }

    #[test]
    fn mean_across_replicates() {
        let summaries = vec![
            recombined(vec![0.0, 0.0, 1.0]),
            recombined(vec![0.0, 1.0, 1.0]),
            recombined(vec![0.0, 0.0, 0.0]),
        ];
        let ensemble = aggregate(&summaries).unwrap();
        assert_eq!(
            ensemble.get(RECOMBINED_CHANNEL),
            Some(&[0.0, 1.0 / 3.0, 2.0 / 3.0][..])
        );
        assert_eq!(ensemble.get("time"), Some(&[0.0, 10.0, 20.0][..]));
    }

    #[test]
    fn single_replicate_is_its_own_mean() {
        let summary = recombined(vec![3.0, 4.0, 5.0]);
        assert_eq!(aggregate(&[summary.clone()]).unwrap(), summary);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(aggregate(&[]), Err(AggregateError::Empty));
        assert_eq!(aggregate_dlc(&[], 3), Err(AggregateError::Empty));
    }

    #[test]
    fn mismatched_channels_are_rejected() {
        let mut odd = recombined(vec![0.0, 0.0, 0.0]);
        odd.insert("extra", vec![0.0, 0.0, 0.0]);
        let result = aggregate(&[recombined(vec![1.0, 1.0, 1.0]), odd]);
        assert!(matches!(result, Err(AggregateError::ChannelMismatch { replicate: 1, .. })));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut short = recombined(vec![0.0, 0.0]);
        short.insert("time", vec![0.0, 10.0]);
        let result = aggregate(&[recombined(vec![1.0, 1.0, 1.0]), short]);
        assert!(matches!(result, Err(AggregateError::LengthMismatch { replicate: 1, .. })));

        let result = aggregate_dlc(&[vec![0.0; 3], vec![0.0; 4]], 0);
        assert!(matches!(result, Err(AggregateError::LengthMismatch { replicate: 1, .. })));
    }

    #[test]
    fn all_zero_dlc_is_untouched() {
        let zeros = vec![vec![0.0; 50]; 4];
        for window in [0, 1, 3, 200] {
            assert_eq!(aggregate_dlc(&zeros, window).unwrap(), vec![0.0; 50]);
        }
    }

    #[test]
    fn dlc_without_smoothing_is_the_mean() {
        let series = vec![vec![0.0, 2.0, 4.0], vec![2.0, 2.0, 0.0]];
        assert_eq!(aggregate_dlc(&series, 0).unwrap(), vec![1.0, 2.0, 2.0]);
    }

    #[test]
    fn box_filter_matches_same_mode_convolution() {
        assert_eq!(box_filter(&[0.0, 3.0, 0.0], 3), vec![1.0, 1.0, 1.0]);
        // even window: full = [1, 3, 5, 7, 4] / 2, same keeps indices 0..4
        assert_eq!(box_filter(&[1.0, 2.0, 3.0, 4.0], 2), vec![0.5, 1.5, 2.5, 3.5]);
        assert_eq!(box_filter(&[1.0, 2.0], 1), vec![1.0, 2.0]);
    }

    #[test]
    fn smoothing_preserves_length() {
        let series = vec![vec![0.0, 0.0, 6.0, 0.0, 0.0]];
        let smoothed = aggregate_dlc(&series, 3).unwrap();
        assert_eq!(smoothed, vec![0.0, 2.0, 2.0, 2.0, 0.0]);
    }
}
