//! Industry to company distribution weights

use serde::{Deserialize, Serialize};
use signal_core::{IndustryPlayerRecord, PipelineError};
use std::fmt;
use std::str::FromStr;

/// How industry-level hits are spread onto companies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionMode {
    /// Proportional to player market cap
    #[default]
    Weight,
    Equal,
    Off,
}

impl DistributionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionMode::Weight => "weight",
            DistributionMode::Equal => "equal",
            DistributionMode::Off => "off",
        }
    }
}

impl fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributionMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weight" => Ok(DistributionMode::Weight),
            "equal" => Ok(DistributionMode::Equal),
            "off" => Ok(DistributionMode::Off),
            other => Err(PipelineError::Configuration(format!(
                "unknown distribution mode '{other}' (expected weight, equal or off)"
            ))),
        }
    }
}

/// `(company_id, weight)` pairs summing to 1.0, or empty.
///
/// Only players bound to a company take part. The `top_n` largest by market
/// cap (missing cap counts as zero, clamped to at least 1) are kept; weights
/// are proportional to cap, or uniform when the kept caps sum to zero or the
/// mode is `Equal`. `Off` yields nothing.
pub fn industry_weights(
    players: &[IndustryPlayerRecord],
    top_n: usize,
    mode: DistributionMode,
) -> Vec<(i64, f64)> {
    if mode == DistributionMode::Off {
        return Vec::new();
    }

    let mut rows: Vec<(i64, f64)> = players
        .iter()
        .filter_map(|p| p.company_id.map(|cid| (cid, p.market_cap_usd.unwrap_or(0.0))))
        .collect();
    if rows.is_empty() {
        return Vec::new();
    }

    rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    rows.truncate(top_n.max(1));

    let total: f64 = rows.iter().map(|(_, cap)| cap).sum();
    if mode == DistributionMode::Equal || total <= 0.0 {
        let w = 1.0 / rows.len() as f64;
        return rows.into_iter().map(|(cid, _)| (cid, w)).collect();
    }

    rows.into_iter().map(|(cid, cap)| (cid, cap / total)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: i64, company_id: Option<i64>, cap: Option<f64>) -> IndustryPlayerRecord {
        IndustryPlayerRecord {
            id,
            industry_id: 1,
            company_id,
            name: format!("player-{id}"),
            market_cap_usd: cap,
        }
    }

    fn total(weights: &[(i64, f64)]) -> f64 {
        weights.iter().map(|(_, w)| w).sum()
    }

    #[test]
    fn test_cap_proportional_weights() {
        let players = vec![player(1, Some(10), Some(60.0)), player(2, Some(20), Some(40.0))];
        let w = industry_weights(&players, 8, DistributionMode::Weight);
        assert_eq!(w.len(), 2);
        assert_eq!(w[0].0, 10);
        assert!((w[0].1 - 0.6).abs() < 1e-12);
        assert!((w[1].1 - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_when_caps_zero() {
        let players = vec![
            player(1, Some(10), None),
            player(2, Some(20), Some(0.0)),
            player(3, Some(30), None),
        ];
        let w = industry_weights(&players, 8, DistributionMode::Weight);
        assert_eq!(w.len(), 3);
        assert!(w.iter().all(|(_, x)| (x - 1.0 / 3.0).abs() < 1e-12));
        assert!((total(&w) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unbound_players_excluded() {
        let players = vec![player(1, None, Some(1000.0)), player(2, Some(20), Some(5.0))];
        let w = industry_weights(&players, 8, DistributionMode::Weight);
        assert_eq!(w, vec![(20, 1.0)]);

        let none = industry_weights(&[player(1, None, Some(1.0))], 8, DistributionMode::Weight);
        assert!(none.is_empty());
    }

    #[test]
    fn test_top_n_and_equal_mode() {
        let players: Vec<_> = (1..=12)
            .map(|i| player(i, Some(i * 10), Some(i as f64)))
            .collect();

        let w = industry_weights(&players, 3, DistributionMode::Weight);
        assert_eq!(w.iter().map(|(c, _)| *c).collect::<Vec<_>>(), vec![120, 110, 100]);
        assert!((total(&w) - 1.0).abs() < 1e-9);

        let eq = industry_weights(&players, 4, DistributionMode::Equal);
        assert_eq!(eq.len(), 4);
        assert!(eq.iter().all(|(_, x)| (x - 0.25).abs() < 1e-12));

        let clamped = industry_weights(&players, 0, DistributionMode::Weight);
        assert_eq!(clamped, vec![(120, 1.0)]);
    }

    #[test]
    fn test_off_mode_is_empty() {
        let players = vec![player(1, Some(10), Some(60.0))];
        assert!(industry_weights(&players, 8, DistributionMode::Off).is_empty());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Equal".parse::<DistributionMode>().unwrap(), DistributionMode::Equal);
        assert!("half".parse::<DistributionMode>().is_err());
    }
}
