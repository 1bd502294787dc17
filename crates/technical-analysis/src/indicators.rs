/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(sum / period as f64);
    }
    result
}

/// Rolling maximum over a fixed window
pub fn rolling_max(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    (period - 1..data.len())
        .map(|i| {
            data[i + 1 - period..=i]
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .collect()
}

/// Rolling minimum over a fixed window
pub fn rolling_min(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    (period - 1..data.len())
        .map(|i| {
            data[i + 1 - period..=i]
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min)
        })
        .collect()
}

/// Moving average `sessions_ago` sessions before the latest bar.
///
/// `sessions_ago = 0` is the latest value. `None` when the average is not
/// defined that far back.
pub fn sma_at(data: &[f64], period: usize, sessions_ago: usize) -> Option<f64> {
    let values = sma(data, period);
    let idx = values.len().checked_sub(1 + sessions_ago)?;
    values.get(idx).copied()
}

/// Latest simple moving average
pub fn last_sma(data: &[f64], period: usize) -> Option<f64> {
    sma_at(data, period, 0)
}
