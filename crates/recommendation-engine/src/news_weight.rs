/// Bounded multiplier from a news window score: `1 + alpha * tanh(k * x)`.
///
/// With the default `alpha = 0.2` the factor stays within [0.8, 1.2].
pub fn news_weight_factor(window_score: f64, alpha: f64, k: f64) -> f64 {
    1.0 + alpha * (k * window_score).tanh()
}
