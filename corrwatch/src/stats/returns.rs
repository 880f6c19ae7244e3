//! Bar-to-bar percentage returns

use super::series::{PriceSeries, ReturnSeries, Series};

/// Percentage change `(p[i] - p[i-1]) / p[i-1]` for every position.
///
/// Output has the same length as the input. Position 0 is always undefined, as is any position
/// whose previous price is zero or missing, or whose current price is missing.
pub fn returns(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    std::iter::once(None)
        .chain(prices.windows(2).map(|pair| match (pair[0], pair[1]) {
            (Some(prev), Some(curr)) if prev != 0.0 => {
                let change = (curr - prev) / prev;
                change.is_finite().then_some(change)
            }
            _ => None,
        }))
        .take(prices.len())
        .collect()
}

/// [`returns`] over a timestamped series.
pub fn return_series(prices: &PriceSeries) -> ReturnSeries {
    Series::new(prices.timestamps().to_vec(), returns(prices.values()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defined(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_returns_known_values() {
        let out = returns(&defined(&[100.0, 101.0, 102.0]));
        assert_eq!(out.len(), 3);
        assert!(out[0].is_none());
        assert!((out[1].unwrap() - 0.01).abs() < 1e-12);
        assert!((out[2].unwrap() - 0.00990099).abs() < 1e-6);
    }

    #[test]
    fn test_returns_zero_previous_price_is_undefined() {
        let out = returns(&defined(&[100.0, 0.0, 50.0, 55.0]));
        assert!((out[1].unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(out[2], None, "division by a zero price must not be infinite");
        assert!((out[3].unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_returns_missing_price_poisons_both_neighbours() {
        let out = returns(&[Some(100.0), None, Some(102.0), Some(103.0)]);
        assert_eq!(out[1], None);
        assert_eq!(out[2], None);
        assert!(out[3].is_some());
    }

    #[test]
    fn test_returns_short_inputs() {
        assert!(returns(&[]).is_empty());
        assert_eq!(returns(&[Some(100.0)]), vec![None]);
    }

    #[test]
    fn test_returns_non_finite_inputs_are_undefined() {
        let out = returns(&[Some(f64::MIN_POSITIVE), Some(f64::MAX)]);
        assert_eq!(out[1], None);
    }
}
