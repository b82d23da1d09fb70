//! # Portfolio Data Utilities
//!
//! $$
//! r_t=\frac{P_t}{P_{t-1}}-1,\qquad
//! \hat\mu=A\,\bar r,\qquad
//! \hat\Sigma=\frac{A}{T-1}\sum_{t}(r_t-\bar r)(r_t-\bar r)^\top
//! $$
//!
//! Return estimation: simple returns per asset, then annualized sample mean and
//! covariance over the assets of a [`PriceTable`]. Series are combined by
//! position, so every series must cover the same sampling dates.

use chrono::NaiveDate;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;
use tracing::debug;

use super::types::Asset;
use super::types::PriceSeries;
use super::types::PriceTable;
use super::types::ReturnModel;
use crate::error::PortfolioError;
use crate::error::Result;

/// Trading days per year used to annualize daily statistics.
pub const TRADING_DAYS: f64 = 252.0;

/// Convert close prices to simple (percentage change) returns.
///
/// The output has one sample fewer than the input: the change into the first
/// close is undefined and is never emitted.
pub fn simple_returns_series(closes: &[f64]) -> Vec<f64> {
  closes
    .windows(2)
    .map(|pair| pair[1] / pair[0] - 1.0)
    .collect()
}

fn checked_returns(asset: &Asset, series: &PriceSeries) -> Result<Vec<f64>> {
  if series.len() < 2 {
    return Err(PortfolioError::InsufficientData {
      asset: asset.symbol.clone(),
      required: 2,
      actual: series.len(),
    });
  }

  let points = series.points();
  for (i, &(date, price)) in points.iter().enumerate() {
    let is_denominator = i + 1 < points.len();
    if !price.is_finite() || price < 0.0 || (is_denominator && price == 0.0) {
      return Err(PortfolioError::InvalidPrice {
        asset: asset.symbol.clone(),
        date,
        price,
      });
    }
  }

  let closes: Vec<f64> = series.closes().collect();
  Ok(simple_returns_series(&closes))
}

/// Per-period simple returns, one row per asset in sorted asset order.
///
/// Fails with [`PortfolioError::MisalignedSeries`] when the series differ in
/// length; no date-based reindexing is attempted.
pub fn return_matrix(prices: &PriceTable) -> Result<(Vec<Asset>, Array2<f64>)> {
  let mut asset_order = Vec::with_capacity(prices.len());
  let mut rows: Vec<Vec<f64>> = Vec::with_capacity(prices.len());

  for (asset, series) in prices {
    let returns = checked_returns(asset, series)?;
    if let Some(expected) = rows.first().map(Vec::len) {
      if returns.len() != expected {
        return Err(PortfolioError::MisalignedSeries {
          asset: asset.symbol.clone(),
          expected,
          actual: returns.len(),
        });
      }
    }
    asset_order.push(asset.clone());
    rows.push(returns);
  }

  let n_periods = rows.first().map(Vec::len).unwrap_or(0);
  let matrix = Array2::from_shape_fn((rows.len(), n_periods), |(i, t)| rows[i][t]);

  Ok((asset_order, matrix))
}

/// Estimate annualized mean returns and covariance from aligned price histories.
///
/// Statistics are sample statistics (`ddof = 1`) scaled by `annualization`.
/// Asset ordering follows the symbol order of `prices`, so repeated calls with
/// the same keys produce identically ordered outputs.
pub fn estimate_returns(prices: &PriceTable, annualization: f64) -> Result<ReturnModel> {
  if prices.is_empty() {
    return Err(PortfolioError::invalid_parameter(
      "prices",
      "at least one asset is required",
    ));
  }
  if !annualization.is_finite() || annualization <= 0.0 {
    return Err(PortfolioError::invalid_parameter(
      "annualization",
      format!("must be positive, got {annualization}"),
    ));
  }

  let (asset_order, returns) = return_matrix(prices)?;
  let n_periods = returns.ncols();

  // A sample covariance needs two observations, i.e. three prices.
  if n_periods < 2 {
    return Err(PortfolioError::InsufficientData {
      asset: asset_order[0].symbol.clone(),
      required: 3,
      actual: n_periods + 1,
    });
  }

  let insufficient = || PortfolioError::InsufficientData {
    asset: asset_order[0].symbol.clone(),
    required: 3,
    actual: n_periods + 1,
  };
  let mean = returns.mean_axis(Axis(1)).ok_or_else(insufficient)?;
  let cov = returns.cov(1.0).map_err(|_| insufficient())?;
  let cov = (&cov + &cov.t()) * 0.5;

  debug!(
    assets = asset_order.len(),
    periods = n_periods,
    annualization,
    "estimated return statistics"
  );

  ReturnModel::new(asset_order, mean * annualization, cov * annualization)
}

/// Restrict every series to `[start, end]`; the caller controls backtest and
/// estimation windows this way.
pub fn bound_window(prices: &PriceTable, start: NaiveDate, end: NaiveDate) -> PriceTable {
  prices
    .iter()
    .map(|(asset, series)| (asset.clone(), series.window(start, end)))
    .collect()
}
