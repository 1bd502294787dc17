//! Stage-2 trend template
//!
//! A symbol passes when price sits above a rising, correctly stacked set of
//! moving averages, well off its 52-week low, near its 52-week high, and
//! with strong relative strength.

use serde::{Deserialize, Serialize};
use serde_json::json;
use signal_core::PriceSeries;
use std::collections::BTreeMap;

use crate::indicators::{last_sma, rolling_max, rolling_min, sma_at};

pub const REASON_ENOUGH_HISTORY: &str = "enough_history";
pub const REASON_MA_STACK: &str = "ma_stack";
pub const REASON_MA200_UP: &str = "ma200_up";
pub const REASON_DIST_FROM_LOW: &str = "dist_from_low_52w";
pub const REASON_NEAR_HIGH: &str = "near_high_52w";
pub const REASON_RS_THRESHOLD: &str = "rs_threshold";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage2Config {
    pub rs_threshold: f64,
    pub min_history: usize,
    /// Position of the earlier MA200 reading, counted back from the latest
    /// value inclusive (21 compares against the value 20 sessions earlier)
    pub ma200_slope_lookback: usize,
    /// 52-week range window in sessions
    pub range_window: usize,
    pub min_above_low: f64,
    pub min_of_high: f64,
}

impl Default for Stage2Config {
    fn default() -> Self {
        Self {
            rs_threshold: 70.0,
            min_history: 260,
            ma200_slope_lookback: 21,
            range_window: 252,
            min_above_low: 1.25,
            min_of_high: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage2Result {
    pub pass: bool,
    pub reasons: BTreeMap<String, bool>,
}

/// Latest close and MA50/150/200, stored alongside recommendations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovingAverageSnapshot {
    pub last_close: Option<f64>,
    pub ma50: Option<f64>,
    pub ma150: Option<f64>,
    pub ma200: Option<f64>,
}

impl MovingAverageSnapshot {
    pub fn from_closes(closes: &[f64]) -> Self {
        Self {
            last_close: closes.last().copied(),
            ma50: last_sma(closes, 50),
            ma150: last_sma(closes, 150),
            ma200: last_sma(closes, 200),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "last_close": self.last_close,
            "ma50": self.ma50,
            "ma150": self.ma150,
            "ma200": self.ma200,
        })
    }
}

#[derive(Default)]
pub struct TrendStageFilter {
    config: Stage2Config,
}

impl TrendStageFilter {
    pub fn new(config: Stage2Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Stage2Config {
        &self.config
    }

    pub fn evaluate_series(&self, series: &PriceSeries, rs100: Option<f64>) -> Stage2Result {
        self.evaluate(&series.closes(), &series.highs(), &series.lows(), rs100)
    }

    /// Evaluate every condition. Pass is the conjunction of all of them;
    /// short history fails with only `enough_history: false`.
    pub fn evaluate(
        &self,
        closes: &[f64],
        highs: &[f64],
        lows: &[f64],
        rs100: Option<f64>,
    ) -> Stage2Result {
        if closes.len() < self.config.min_history {
            return Stage2Result {
                pass: false,
                reasons: BTreeMap::from([(REASON_ENOUGH_HISTORY.to_string(), false)]),
            };
        }

        let close = closes[closes.len() - 1];
        let ma50 = last_sma(closes, 50);
        let ma150 = last_sma(closes, 150);
        let ma200 = last_sma(closes, 200);
        let ma200_prev = sma_at(closes, 200, self.config.ma200_slope_lookback.saturating_sub(1))
            .or(ma200);

        let ma_stack = match (ma50, ma150, ma200) {
            (Some(m50), Some(m150), Some(m200)) => close > m50 && m50 > m150 && m150 > m200,
            _ => false,
        };
        let ma200_up = match (ma200, ma200_prev) {
            (Some(now), Some(prev)) => now > prev,
            _ => false,
        };

        let low_52w = rolling_min(lows, self.config.range_window).last().copied();
        let high_52w = rolling_max(highs, self.config.range_window).last().copied();
        let dist_from_low = match low_52w {
            Some(low) if low > 0.0 => close >= self.config.min_above_low * low,
            _ => false,
        };
        let near_high = match high_52w {
            Some(high) if high > 0.0 => close >= self.config.min_of_high * high,
            _ => false,
        };
        let rs_ok = rs100.map(|rs| rs >= self.config.rs_threshold).unwrap_or(false);

        let reasons = BTreeMap::from([
            (REASON_MA_STACK.to_string(), ma_stack),
            (REASON_MA200_UP.to_string(), ma200_up),
            (REASON_DIST_FROM_LOW.to_string(), dist_from_low),
            (REASON_NEAR_HIGH.to_string(), near_high),
            (REASON_RS_THRESHOLD.to_string(), rs_ok),
            (REASON_ENOUGH_HISTORY.to_string(), true),
        ]);
        let pass = reasons.values().all(|&ok| ok);

        Stage2Result { pass, reasons }
    }
}
