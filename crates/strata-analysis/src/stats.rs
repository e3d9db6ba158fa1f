pub fn is_nan_or_inf(value: f64) -> bool {
    !value.is_finite()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Linear-interpolated quantile over an ascending slice, `pos = q * (n - 1)`.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let Some((&first, rest)) = sorted.split_first() else {
        return 0.0;
    };
    if q <= 0.0 || rest.is_empty() {
        return first;
    }
    let last = sorted[sorted.len() - 1];
    if q >= 1.0 {
        return last;
    }

    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[0.2, 0.02, 0.2]) - 0.14).abs() < 1e-12);
    }

    #[test]
    fn quantile_interpolates_between_neighbours() {
        let sorted = [0.02, 0.2, 0.2];
        assert!((quantile(&sorted, 0.1) - 0.056).abs() < 1e-12);
        assert_eq!(quantile(&sorted, 0.0), 0.02);
        assert_eq!(quantile(&sorted, 1.0), 0.2);
        assert_eq!(quantile(&[0.7], 0.1), 0.7);
        assert_eq!(quantile(&[], 0.5), 0.0);
        assert_eq!(quantile(&[1.0, 3.0], 0.5), 2.0);
    }

    #[test]
    fn nan_and_infinities_are_flagged() {
        assert!(is_nan_or_inf(f64::NAN));
        assert!(is_nan_or_inf(f64::NEG_INFINITY));
        assert!(!is_nan_or_inf(0.0));
    }

    proptest! {
        #[test]
        fn quantile_stays_within_bounds_and_is_monotone(
            mut values in prop::collection::vec(-1_000.0f64..1_000.0, 1..64),
            a in 0.0f64..=1.0,
            b in 0.0f64..=1.0,
        ) {
            values.sort_by(f64::total_cmp);
            let (low_q, high_q) = if a <= b { (a, b) } else { (b, a) };
            let low = quantile(&values, low_q);
            let high = quantile(&values, high_q);
            let (min, max) = (values[0], values[values.len() - 1]);
            prop_assert!(low >= min - 1e-9 && low <= max + 1e-9);
            prop_assert!(high >= min - 1e-9 && high <= max + 1e-9);
            prop_assert!(low <= high + 1e-9);
        }
    }
}
