use signal_core::CompanyRecord;

/// Active companies with `market_cap >= min_cap` (a non-positive `min_cap`
/// disables the filter), in input order, capped at `limit`.
///
/// Companies without a known cap are excluded while the filter is on.
pub fn select_universe(companies: &[CompanyRecord], min_cap: f64, limit: usize) -> Vec<CompanyRecord> {
    companies
        .iter()
        .filter(|c| c.is_active && !c.ticker.trim().is_empty())
        .filter(|c| min_cap <= 0.0 || c.market_cap.map(|cap| cap >= min_cap).unwrap_or(false))
        .take(limit)
        .cloned()
        .collect()
}
