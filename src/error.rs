//! # Errors
//!
//! Typed failure conditions raised by the portfolio engine. Every variant is
//! returned at the point of violation; nothing is coerced to a default value.

use chrono::NaiveDate;
use thiserror::Error;

/// Failure conditions of the estimator, metrics, sampler, optimizer, selector and backtester.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum PortfolioError {
  /// Too few samples to derive returns or sample statistics.
  #[error("insufficient data for {asset}: need at least {required} price points, got {actual}")]
  InsufficientData {
    asset: String,
    required: usize,
    actual: usize,
  },

  /// Return series of different lengths cannot be combined by position.
  #[error("misaligned series: {asset} has {actual} return samples, expected {expected}")]
  MisalignedSeries {
    asset: String,
    expected: usize,
    actual: usize,
  },

  /// Weight vector does not cover exactly the asset universe.
  #[error("weights do not match the asset universe (missing: {missing:?}, extra: {extra:?})")]
  WeightMismatch {
    missing: Vec<String>,
    extra: Vec<String>,
  },

  /// Portfolio risk is exactly zero, so the Sharpe ratio is undefined.
  #[error("portfolio risk is zero, Sharpe ratio is undefined")]
  DegenerateRisk,

  /// The optimizer did not reach a point satisfying the constraints.
  #[error("target return {target} is infeasible: {reason}")]
  InfeasibleTarget { target: f64, reason: String },

  /// Backtest started from a zero-valued portfolio.
  #[error("initial portfolio value is zero")]
  ZeroInitialValue,

  /// A holding has no price samples in the supplied window.
  #[error("no price data for {asset}")]
  MissingPriceData { asset: String },

  /// A price that is non-finite or negative, or zero where it is used as a return denominator.
  #[error("invalid price {price} for {asset} on {date}")]
  InvalidPrice {
    asset: String,
    date: NaiveDate,
    price: f64,
  },

  /// Price dates are not strictly increasing.
  #[error("price dates are not strictly increasing at {date}")]
  UnorderedSeries { date: NaiveDate },

  /// Raw weights or quantities that cannot form a weight vector.
  #[error("invalid weights: {0}")]
  InvalidWeights(String),

  /// Out-of-range configuration or call argument.
  #[error("invalid parameter `{name}`: {reason}")]
  InvalidParameter { name: &'static str, reason: String },

  /// Mean vector, covariance matrix and asset order disagree in size.
  #[error("dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, PortfolioError>;

impl PortfolioError {
  pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
    Self::InvalidParameter {
      name,
      reason: reason.into(),
    }
  }

  pub(crate) fn infeasible(target: f64, reason: impl Into<String>) -> Self {
    Self::InfeasibleTarget {
      target,
      reason: reason.into(),
    }
  }
}
