//! # Portfolio Selector
//!
//! $$
//! \operatorname{rank}_\sigma(p)=|\sigma_p-\sigma^\*|,\qquad
//! \mathcal C_\mu=\{p:\ |\mu_p-\mu^\*|\le\varepsilon\}
//! $$
//!
//! Ranking of scored portfolios by proximity to a target risk or return, plus
//! summaries of a sampled cloud for reporting.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use super::types::ScoredPortfolio;
use crate::error::PortfolioError;
use crate::error::Result;

fn check_count(n: usize) -> Result<()> {
  if n == 0 {
    return Err(PortfolioError::invalid_parameter("n", "must be positive"));
  }
  Ok(())
}

/// The `n` candidates whose risk is closest to `target_risk`.
///
/// Ties keep their input order.
pub fn select_by_risk(
  candidates: &[ScoredPortfolio],
  target_risk: f64,
  n: usize,
) -> Result<Vec<&ScoredPortfolio>> {
  check_count(n)?;

  let mut ranked: Vec<&ScoredPortfolio> = candidates.iter().collect();
  ranked.sort_by_key(|p| OrderedFloat((p.estimate.risk - target_risk).abs()));
  ranked.truncate(n);
  Ok(ranked)
}

/// Up to `n` candidates within `tolerance` of `target_return`, least risky first.
///
/// Fewer than `n`, or none, is a valid result.
pub fn select_by_return(
  candidates: &[ScoredPortfolio],
  target_return: f64,
  tolerance: f64,
  n: usize,
) -> Result<Vec<&ScoredPortfolio>> {
  check_count(n)?;
  if !tolerance.is_finite() || tolerance < 0.0 {
    return Err(PortfolioError::invalid_parameter(
      "tolerance",
      format!("must be non-negative, got {tolerance}"),
    ));
  }

  let mut ranked: Vec<&ScoredPortfolio> = candidates
    .iter()
    .filter(|p| (p.estimate.expected_return - target_return).abs() <= tolerance)
    .collect();
  ranked.sort_by_key(|p| OrderedFloat(p.estimate.risk));
  ranked.truncate(n);
  Ok(ranked)
}

/// Highest Sharpe ratio; the earliest candidate wins ties.
pub fn max_sharpe(candidates: &[ScoredPortfolio]) -> Option<&ScoredPortfolio> {
  candidates
    .iter()
    .min_by_key(|p| Reverse(OrderedFloat(p.estimate.sharpe_ratio)))
}

/// Lowest risk; the earliest candidate wins ties.
pub fn min_risk(candidates: &[ScoredPortfolio]) -> Option<&ScoredPortfolio> {
  candidates
    .iter()
    .min_by_key(|p| OrderedFloat(p.estimate.risk))
}

/// `(risk, return, sharpe)` triples for plotting and reporting.
pub fn risk_return_triples<'a>(
  candidates: impl IntoIterator<Item = &'a ScoredPortfolio>,
) -> Vec<(f64, f64, f64)> {
  candidates
    .into_iter()
    .map(|p| {
      (
        p.estimate.risk,
        p.estimate.expected_return,
        p.estimate.sharpe_ratio,
      )
    })
    .collect()
}
