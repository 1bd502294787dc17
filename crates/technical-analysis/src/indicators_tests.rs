#[cfg(test)]
mod tests {
    use super::super::indicators::*;

    // Helper function to create sample price data
    fn sample_prices() -> Vec<f64> {
        vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ]
    }

    #[test]
    fn test_sma_basic() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&data, 3);

        assert_eq!(result.len(), 3);
        assert!((result[0] - 2.0).abs() < 0.001); // (1+2+3)/3 = 2
        assert!((result[1] - 3.0).abs() < 0.001); // (2+3+4)/3 = 3
        assert!((result[2] - 4.0).abs() < 0.001); // (3+4+5)/3 = 4
    }

    #[test]
    fn test_sma_insufficient_data() {
        let data = vec![1.0, 2.0];
        let result = sma(&data, 5);

        assert_eq!(result.len(), 0);
    }

    #[test]
    fn test_sma_zero_period() {
        assert!(sma(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn test_sma_real_prices() {
        let prices = sample_prices();
        let result = sma(&prices, 5);

        assert_eq!(result.len(), prices.len() - 4);
        // First SMA(5) should be average of first 5 prices
        let expected_first = (44.34 + 44.09 + 44.15 + 43.61 + 44.33) / 5.0;
        assert!((result[0] - expected_first).abs() < 0.01);
    }

    #[test]
    fn test_sma_at_offsets() {
        let data: Vec<f64> = (1..=10).map(|i| i as f64).collect();

        // latest SMA(3) = (8+9+10)/3
        assert!((sma_at(&data, 3, 0).unwrap() - 9.0).abs() < 1e-12);
        assert!((sma_at(&data, 3, 2).unwrap() - 7.0).abs() < 1e-12);
        // oldest defined value
        assert!((sma_at(&data, 3, 7).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(sma_at(&data, 3, 8), None);
        assert_eq!(last_sma(&data, 11), None);
    }

    #[test]
    fn test_rolling_max_min() {
        let data = vec![3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];

        let highs = rolling_max(&data, 3);
        assert_eq!(highs, vec![4.0, 4.0, 5.0, 9.0, 9.0, 9.0]);

        let lows = rolling_min(&data, 3);
        assert_eq!(lows, vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_rolling_window_longer_than_data() {
        let data = sample_prices();
        assert!(rolling_max(&data, 21).is_empty());
        assert!(rolling_min(&data, 0).is_empty());

        let full = rolling_max(&data, data.len());
        assert_eq!(full.len(), 1);
        assert!((full[0] - 46.41).abs() < 1e-12);
    }
}
