//! # Portfolio Metrics
//!
//! $$
//! \mu_p=\mathbf{w}^\top\mu,\qquad
//! \sigma_p=\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}},\qquad
//! S=\frac{\mu_p-r_f}{\sigma_p}
//! $$
//!
//! Expected return, risk and Sharpe ratio of a weight vector.

use ndarray::Array1;
use ndarray::Array2;

use super::types::PortfolioEstimate;
use super::types::ReturnModel;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

/// Default annual risk-free rate for Sharpe ratios.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.01;

/// `w' Σ w`, clamped at zero against round-off on PSD inputs.
pub fn portfolio_variance(weights: &Array1<f64>, covariance: &Array2<f64>) -> f64 {
  weights.dot(&covariance.dot(weights)).max(0.0)
}

pub(crate) fn estimate_from_array(
  weights: &Array1<f64>,
  model: &ReturnModel,
  risk_free_rate: f64,
) -> Result<PortfolioEstimate> {
  let expected_return = weights.dot(model.mean_returns());
  let risk = portfolio_variance(weights, model.covariance()).sqrt();

  if risk == 0.0 {
    return Err(PortfolioError::DegenerateRisk);
  }

  Ok(PortfolioEstimate {
    expected_return,
    risk,
    sharpe_ratio: (expected_return - risk_free_rate) / risk,
  })
}

/// Score `weights` against `model`.
///
/// The weights must cover exactly the model's assets. A zero-risk portfolio
/// fails with [`PortfolioError::DegenerateRisk`] instead of an infinite ratio.
pub fn portfolio_metrics(
  weights: &WeightVector,
  model: &ReturnModel,
  risk_free_rate: f64,
) -> Result<PortfolioEstimate> {
  let w = weights.to_array(model.asset_order())?;
  estimate_from_array(&w, model, risk_free_rate)
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::portfolio::data::estimate_returns;
  use crate::portfolio::data::TRADING_DAYS;
  use crate::portfolio::types::Asset;
  use crate::portfolio::types::PriceSeries;
  use crate::portfolio::types::PriceTable;

  fn model() -> ReturnModel {
    ReturnModel::new(
      vec![Asset::new("AAA", "A"), Asset::new("BBB", "B")],
      Array1::from(vec![0.08, 0.12]),
      Array2::from_shape_vec((2, 2), vec![0.04, 0.006, 0.006, 0.09]).unwrap(),
    )
    .unwrap()
  }

  #[test]
  fn metrics_match_closed_form() {
    let model = model();
    let weights = WeightVector::equal(model.asset_order()).unwrap();
    let est = portfolio_metrics(&weights, &model, 0.01).unwrap();

    // 0.25 * (0.04 + 2 * 0.006 + 0.09) = 0.0355
    assert!((est.expected_return - 0.10).abs() < 1e-12);
    assert!((est.risk - 0.0355_f64.sqrt()).abs() < 1e-12);
    assert!((est.sharpe_ratio - 0.09 / 0.0355_f64.sqrt()).abs() < 1e-12);
  }

  #[test]
  fn metrics_are_bit_identical_across_calls() {
    let model = model();
    let weights =
      WeightVector::from_quantities(model.asset_order().iter().zip([3.0, 7.0])).unwrap();

    let a = portfolio_metrics(&weights, &model, DEFAULT_RISK_FREE_RATE).unwrap();
    let b = portfolio_metrics(&weights, &model, DEFAULT_RISK_FREE_RATE).unwrap();
    assert_eq!(a.expected_return.to_bits(), b.expected_return.to_bits());
    assert_eq!(a.risk.to_bits(), b.risk.to_bits());
    assert_eq!(a.sharpe_ratio.to_bits(), b.sharpe_ratio.to_bits());
  }

  #[test]
  fn weights_outside_universe_are_rejected() {
    let model = model();
    let weights = WeightVector::equal(&[Asset::new("AAA", "A"), Asset::new("ZZZ", "Z")]).unwrap();

    assert!(matches!(
      portfolio_metrics(&weights, &model, 0.01),
      Err(PortfolioError::WeightMismatch { .. })
    ));
  }

  #[test]
  fn negative_round_off_variance_is_clamped_and_degenerate() {
    let model = ReturnModel::new(
      vec![Asset::new("AAA", "A")],
      Array1::from(vec![0.05]),
      Array2::from_elem((1, 1), -1e-18),
    )
    .unwrap();
    let w = Array1::from(vec![1.0]);
    assert_eq!(portfolio_variance(&w, model.covariance()), 0.0);

    let weights = WeightVector::equal(model.asset_order()).unwrap();
    assert_eq!(
      portfolio_metrics(&weights, &model, 0.01),
      Err(PortfolioError::DegenerateRisk)
    );
  }

  #[test]
  fn flat_prices_give_degenerate_risk() {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let mut prices = PriceTable::new();
    prices.insert(
      Asset::new("AAA", "A"),
      PriceSeries::from_closes(start, &[42.0; 10]),
    );

    let model = estimate_returns(&prices, TRADING_DAYS).unwrap();
    assert_eq!(model.covariance()[[0, 0]], 0.0);

    let weights = WeightVector::equal(model.asset_order()).unwrap();
    assert_eq!(
      portfolio_metrics(&weights, &model, 0.01),
      Err(PortfolioError::DegenerateRisk)
    );
  }
}
