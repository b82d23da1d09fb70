//! # Backtester
//!
//! $$
//! V_0=\sum_i q_i P_{i,0},\qquad V_T=\sum_i q_i P_{i,T},\qquad
//! \text{perf}=\frac{V_T-V_0}{V_0}
//! $$
//!
//! Realized performance of fixed share counts over the window spanned by the
//! supplied price series. The caller bounds the window, e.g. with
//! [`bound_window`](super::data::bound_window).

use chrono::NaiveDate;
use tracing::debug;

use super::types::Holding;
use super::types::PriceSeries;
use super::types::PriceTable;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

/// Start and end valuation of a backtest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BacktestReport {
  pub initial_value: f64,
  pub final_value: f64,
  /// `(final_value - initial_value) / initial_value`.
  pub performance: f64,
}

fn series_for<'a>(holding: &Holding, prices: &'a PriceTable) -> Result<&'a PriceSeries> {
  if !holding.quantity.is_finite() || holding.quantity < 0.0 {
    return Err(PortfolioError::invalid_parameter(
      "quantity",
      format!("{} has quantity {}", holding.asset, holding.quantity),
    ));
  }

  prices
    .get(&holding.asset)
    .filter(|series| !series.is_empty())
    .ok_or_else(|| PortfolioError::MissingPriceData {
      asset: holding.asset.symbol.clone(),
    })
}

fn checked_price(holding: &Holding, point: (NaiveDate, f64)) -> Result<f64> {
  let (date, price) = point;
  if !price.is_finite() || price < 0.0 {
    return Err(PortfolioError::InvalidPrice {
      asset: holding.asset.symbol.clone(),
      date,
      price,
    });
  }
  Ok(price)
}

/// Valuation of `holdings` at the first and last sample of each asset's series.
pub fn backtest_report(holdings: &[Holding], prices: &PriceTable) -> Result<BacktestReport> {
  let mut initial_value = 0.0;
  let mut final_value = 0.0;

  for holding in holdings {
    let series = series_for(holding, prices)?;
    let missing = || PortfolioError::MissingPriceData {
      asset: holding.asset.symbol.clone(),
    };
    let first = checked_price(holding, series.first().ok_or_else(missing)?)?;
    let last = checked_price(holding, series.last().ok_or_else(missing)?)?;

    initial_value += holding.quantity * first;
    final_value += holding.quantity * last;
  }

  if initial_value == 0.0 {
    return Err(PortfolioError::ZeroInitialValue);
  }

  let performance = (final_value - initial_value) / initial_value;
  debug!(
    holdings = holdings.len(),
    initial_value, final_value, performance, "backtest complete"
  );

  Ok(BacktestReport {
    initial_value,
    final_value,
    performance,
  })
}

/// Realized percentage performance of `holdings`, as a fraction (0.5 is +50%).
pub fn backtest(holdings: &[Holding], prices: &PriceTable) -> Result<f64> {
  backtest_report(holdings, prices).map(|report| report.performance)
}

/// Market value of `holdings` at the latest price of each asset.
pub fn portfolio_value(holdings: &[Holding], prices: &PriceTable) -> Result<f64> {
  holdings.iter().try_fold(0.0, |acc, holding| {
    let series = series_for(holding, prices)?;
    let point = series.last().ok_or_else(|| PortfolioError::MissingPriceData {
      asset: holding.asset.symbol.clone(),
    })?;
    Ok(acc + holding.quantity * checked_price(holding, point)?)
  })
}

/// Split `total_quantity` shares across assets in proportion to `weights`.
///
/// Quantities are fractional and sum to `total_quantity`.
pub fn holdings_from_weights(weights: &WeightVector, total_quantity: f64) -> Result<Vec<Holding>> {
  if !total_quantity.is_finite() || total_quantity <= 0.0 {
    return Err(PortfolioError::invalid_parameter(
      "total_quantity",
      format!("must be positive, got {total_quantity}"),
    ));
  }

  Ok(
    weights
      .iter()
      .map(|(asset, w)| Holding::new(asset.clone(), w * total_quantity))
      .collect(),
  )
}
