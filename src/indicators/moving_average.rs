/// SMA for every position of `prices`, `None` until a full window exists
pub fn sma_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }

    for (i, window) in prices.windows(period).enumerate() {
        out[i + period - 1] = Some(window.iter().sum::<f64>() / period as f64);
    }
    out
}

/// EMA for every position of `prices`, seeded with the SMA of the first window
pub fn ema_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = prices[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(ema);

    for (i, price) in prices.iter().enumerate().skip(period) {
        ema = (price - ema) * multiplier + ema;
        out[i] = Some(ema);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_full_window() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        assert_eq!(sma_series(&prices, 5).last().copied().flatten(), Some(104.0));
    }

    #[test]
    fn test_insufficient_data() {
        let prices = vec![100.0, 102.0];
        assert_eq!(sma_series(&prices, 5), vec![None, None]);
        assert_eq!(ema_series(&prices, 5), vec![None, None]);
        assert_eq!(ema_series(&prices, 0), vec![None, None]);
    }

    #[test]
    fn test_sma_series_alignment() {
        let prices = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(
            sma_series(&prices, 2),
            vec![None, Some(1.5), Some(2.5), Some(3.5)]
        );
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let ema = ema_series(&prices, 9);
        let sma = sma_series(&prices, 9);

        assert!(ema[..8].iter().all(Option::is_none));
        assert_eq!(ema[8], sma[8]);

        // same recurrence, applied by hand from the seed
        let multiplier = 2.0 / 10.0;
        let mut expected = sma[8].unwrap();
        for price in &prices[9..] {
            expected = (price - expected) * multiplier + expected;
        }
        let last = ema.last().copied().flatten().unwrap();
        assert!((last - expected).abs() < 1e-9);
    }

    #[test]
    fn test_ema_rising_prices_above_seed() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let ema = ema_series(&prices, 5);
        assert_eq!(ema[4], Some(104.0));
        assert!(ema[5].unwrap() > 104.0);
    }

    #[test]
    fn test_ema_three_period() {
        // multiplier = 0.5, seed = 2.0
        let series = ema_series(&[1.0, 2.0, 3.0, 5.0], 3);
        assert_eq!(series, vec![None, None, Some(2.0), Some(3.5)]);
    }
}
