//! Historical-simulation Value at Risk and Expected Shortfall.
//!
//! Both are expressed as positive fractions: a VaR of 0.02 means the
//! `confidence` quantile of the return distribution is a 2% loss.

/// Simple period returns of an equity series. Periods starting from a
/// non-positive value are skipped.
pub fn simple_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Worst `ceil(n * (1 - confidence))` returns (at least one), ascending.
fn loss_tail(returns: &[f64], confidence: f64) -> Option<Vec<f64>> {
    if returns.is_empty() {
        return None;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    // Shave float noise so 20 * (1 - 0.95) counts as one observation, not two.
    let cutoff = (sorted.len() as f64 * (1.0 - confidence) - 1e-9).ceil() as usize;
    let cutoff = cutoff.clamp(1, sorted.len());
    sorted.truncate(cutoff);
    Some(sorted)
}

/// Loss at the `confidence` quantile; zero when even the tail is a gain.
pub fn historical_var(returns: &[f64], confidence: f64) -> Option<f64> {
    let tail = loss_tail(returns, confidence)?;
    tail.last().map(|r| (-r).max(0.0))
}

/// Mean loss beyond the VaR quantile; zero when the tail is a gain.
pub fn expected_shortfall(returns: &[f64], confidence: f64) -> Option<f64> {
    let tail = loss_tail(returns, confidence)?;
    let mean = tail.iter().sum::<f64>() / tail.len() as f64;
    Some((-mean).max(0.0))
}
