//! # Portfolio Types
//!
//! $$
//! \mathbf{w}\in\Delta^{n-1}=\{\mathbf{w}\ge 0,\ \mathbf{1}^\top\mathbf{w}=1\}
//! $$
//!
//! Assets, price series, holdings, weight vectors and result containers shared
//! by the estimator, metrics, sampler, optimizer, selector and backtester.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;
use std::str::FromStr;

use approx::abs_diff_eq;
use chrono::Days;
use chrono::NaiveDate;
use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;

use crate::error::PortfolioError;
use crate::error::Result;

/// Tolerance on `sum(w) == 1` and `0 <= w <= 1` for any valid weight vector.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Relative tolerance on `|Σij - Σji|` accepted by [`ReturnModel::new`].
const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Tradable asset. Identity, ordering and hashing use the ticker symbol only.
#[derive(Clone, Debug)]
pub struct Asset {
  /// Ticker symbol.
  pub symbol: String,
  /// Display name.
  pub name: String,
}

impl Asset {
  pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      symbol: symbol.into(),
      name: name.into(),
    }
  }
}

impl PartialEq for Asset {
  fn eq(&self, other: &Self) -> bool {
    self.symbol == other.symbol
  }
}

impl Eq for Asset {}

impl Hash for Asset {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.symbol.hash(state);
  }
}

impl PartialOrd for Asset {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Asset {
  fn cmp(&self, other: &Self) -> Ordering {
    self.symbol.cmp(&other.symbol)
  }
}

impl Display for Asset {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.symbol)
  }
}

/// Closing prices of one asset, strictly increasing by date.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceSeries {
  points: Vec<(NaiveDate, f64)>,
}

impl PriceSeries {
  /// Build a series, rejecting duplicate or out-of-order dates.
  pub fn new(points: Vec<(NaiveDate, f64)>) -> Result<Self> {
    if let Some(pair) = points.windows(2).find(|pair| pair[1].0 <= pair[0].0) {
      return Err(PortfolioError::UnorderedSeries { date: pair[1].0 });
    }

    Ok(Self { points })
  }

  /// Daily series starting at `start`, one calendar day per close.
  pub fn from_closes(start: NaiveDate, closes: &[f64]) -> Self {
    let points = closes
      .iter()
      .enumerate()
      .map(|(i, &close)| (start + Days::new(i as u64), close))
      .collect();

    Self { points }
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  pub fn points(&self) -> &[(NaiveDate, f64)] {
    &self.points
  }

  pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
    self.points.iter().map(|&(_, close)| close)
  }

  pub fn first(&self) -> Option<(NaiveDate, f64)> {
    self.points.first().copied()
  }

  pub fn last(&self) -> Option<(NaiveDate, f64)> {
    self.points.last().copied()
  }

  /// Samples dated within `[start, end]`.
  pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Self {
    let points = self
      .points
      .iter()
      .filter(|(date, _)| *date >= start && *date <= end)
      .copied()
      .collect();

    Self { points }
  }
}

/// Price histories keyed by asset; iteration order is the sorted symbol order.
pub type PriceTable = BTreeMap<Asset, PriceSeries>;

/// Concrete position: an asset and a non-negative quantity (e.g. shares).
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct Holding {
  pub asset: Asset,
  pub quantity: f64,
}

/// Normalized allocation over a set of assets.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightVector {
  weights: BTreeMap<Asset, f64>,
}

impl WeightVector {
  /// Validate an explicit allocation: every weight in `[0, 1]` and the total equal to one.
  pub fn new(weights: BTreeMap<Asset, f64>) -> Result<Self> {
    if weights.is_empty() {
      return Err(PortfolioError::InvalidWeights("no assets".to_string()));
    }

    for (asset, &w) in &weights {
      if !w.is_finite() || w < -WEIGHT_TOLERANCE || w > 1.0 + WEIGHT_TOLERANCE {
        return Err(PortfolioError::InvalidWeights(format!(
          "{asset} has weight {w} outside [0, 1]"
        )));
      }
    }

    let total: f64 = weights.values().sum();
    if !abs_diff_eq!(total, 1.0, epsilon = WEIGHT_TOLERANCE) {
      return Err(PortfolioError::InvalidWeights(format!(
        "weights sum to {total}"
      )));
    }

    Ok(Self { weights })
  }

  /// Normalize raw non-negative quantities. Repeated assets are summed.
  pub fn from_quantities<'a>(quantities: impl IntoIterator<Item = (&'a Asset, f64)>) -> Result<Self> {
    let mut raw: BTreeMap<Asset, f64> = BTreeMap::new();
    for (asset, quantity) in quantities {
      if !quantity.is_finite() || quantity < 0.0 {
        return Err(PortfolioError::InvalidWeights(format!(
          "{asset} has quantity {quantity}"
        )));
      }
      *raw.entry(asset.clone()).or_insert(0.0) += quantity;
    }

    if raw.is_empty() {
      return Err(PortfolioError::InvalidWeights("no assets".to_string()));
    }

    let total: f64 = raw.values().sum();
    if total <= 0.0 {
      return Err(PortfolioError::InvalidWeights(
        "quantities sum to zero".to_string(),
      ));
    }

    for w in raw.values_mut() {
      *w /= total;
    }

    Ok(Self { weights: raw })
  }

  /// 1/N allocation.
  pub fn equal(assets: &[Asset]) -> Result<Self> {
    Self::from_quantities(assets.iter().map(|asset| (asset, 1.0)))
  }

  /// Weights proportional to share counts.
  pub fn from_holdings(holdings: &[Holding]) -> Result<Self> {
    Self::from_quantities(holdings.iter().map(|h| (&h.asset, h.quantity)))
  }

  /// Weights proportional to market value at the latest price of each asset.
  pub fn from_values(holdings: &[Holding], prices: &PriceTable) -> Result<Self> {
    let mut values = Vec::with_capacity(holdings.len());
    for holding in holdings {
      let (_, last) = prices
        .get(&holding.asset)
        .and_then(PriceSeries::last)
        .ok_or_else(|| PortfolioError::MissingPriceData {
          asset: holding.asset.symbol.clone(),
        })?;
      values.push((&holding.asset, holding.quantity * last));
    }

    Self::from_quantities(values)
  }

  pub(crate) fn from_aligned(asset_order: &[Asset], weights: impl IntoIterator<Item = f64>) -> Self {
    let weights = asset_order.iter().cloned().zip(weights).collect();
    Self { weights }
  }

  pub fn get(&self, asset: &Asset) -> Option<f64> {
    self.weights.get(asset).copied()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Asset, f64)> {
    self.weights.iter().map(|(asset, &w)| (asset, w))
  }

  pub fn len(&self) -> usize {
    self.weights.len()
  }

  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  pub fn total(&self) -> f64 {
    self.weights.values().sum()
  }

  /// Lay the weights out in `asset_order`, failing unless both cover the same assets.
  pub fn to_array(&self, asset_order: &[Asset]) -> Result<Array1<f64>> {
    let universe: BTreeSet<&Asset> = asset_order.iter().collect();
    let missing: Vec<String> = asset_order
      .iter()
      .filter(|asset| !self.weights.contains_key(*asset))
      .map(|asset| asset.symbol.clone())
      .collect();
    let extra: Vec<String> = self
      .weights
      .keys()
      .filter(|asset| !universe.contains(asset))
      .map(|asset| asset.symbol.clone())
      .collect();

    if !missing.is_empty() || !extra.is_empty() {
      return Err(PortfolioError::WeightMismatch { missing, extra });
    }

    Ok(asset_order.iter().map(|asset| self.weights[asset]).collect())
  }
}

/// Annualized mean returns and covariance over a fixed asset ordering.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnModel {
  asset_order: Vec<Asset>,
  mean_returns: Array1<f64>,
  covariance: Array2<f64>,
}

impl ReturnModel {
  /// Assemble a model from precomputed statistics, checking shapes, finiteness
  /// and symmetry of the covariance.
  pub fn new(
    asset_order: Vec<Asset>,
    mean_returns: Array1<f64>,
    covariance: Array2<f64>,
  ) -> Result<Self> {
    let n = asset_order.len();
    if n == 0 {
      return Err(PortfolioError::invalid_parameter(
        "asset_order",
        "at least one asset is required",
      ));
    }

    let unique: BTreeSet<&Asset> = asset_order.iter().collect();
    if unique.len() != n {
      return Err(PortfolioError::invalid_parameter(
        "asset_order",
        "assets must be unique",
      ));
    }

    if mean_returns.len() != n {
      return Err(PortfolioError::DimensionMismatch {
        expected: n,
        actual: mean_returns.len(),
      });
    }

    let (rows, cols) = covariance.dim();
    if rows != n || cols != n {
      return Err(PortfolioError::DimensionMismatch {
        expected: n,
        actual: if rows != n { rows } else { cols },
      });
    }

    if mean_returns.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
      return Err(PortfolioError::invalid_parameter(
        "covariance",
        "mean returns and covariance must be finite",
      ));
    }

    for i in 0..n {
      for j in (i + 1)..n {
        let (upper, lower) = (covariance[[i, j]], covariance[[j, i]]);
        let scale = 1.0_f64.max(upper.abs()).max(lower.abs());
        if (upper - lower).abs() > SYMMETRY_TOLERANCE * scale {
          return Err(PortfolioError::invalid_parameter(
            "covariance",
            format!("not symmetric at ({i}, {j}): {upper} vs {lower}"),
          ));
        }
      }
    }

    Ok(Self {
      asset_order,
      mean_returns,
      covariance,
    })
  }

  pub fn asset_order(&self) -> &[Asset] {
    &self.asset_order
  }

  pub fn mean_returns(&self) -> &Array1<f64> {
    &self.mean_returns
  }

  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  pub fn len(&self) -> usize {
    self.asset_order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.asset_order.is_empty()
  }
}

/// Annualized risk/return figures of one weight vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PortfolioEstimate {
  /// `w · mu`.
  pub expected_return: f64,
  /// `sqrt(w' Σ w)`.
  pub risk: f64,
  /// `(expected_return - risk_free) / risk`.
  pub sharpe_ratio: f64,
}

/// A weight vector together with its estimate.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredPortfolio {
  pub weights: WeightVector,
  pub estimate: PortfolioEstimate,
}

/// One point of the optimized frontier curve.
#[derive(Clone, Debug)]
pub struct FrontierPoint {
  /// Requested expected return.
  pub target: f64,
  /// Minimum-risk portfolio for `target`, or the reason it could not be found.
  pub result: Result<ScoredPortfolio>,
}

/// How the frontier sampler draws random weight vectors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SamplingPolicy {
  /// Independent `U[0, 1)` draws normalized to sum to one. Concentrates mass
  /// toward the centre of the simplex, so it is not uniform over it.
  #[default]
  NormalizedUniform,
  /// Independent `Exp(1)` draws normalized to sum to one, i.e. Dirichlet(1, ..., 1),
  /// which is uniform over the simplex.
  Dirichlet,
}

impl FromStr for SamplingPolicy {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "uniform" | "normalized-uniform" | "normalizeduniform" => Ok(Self::NormalizedUniform),
      "dirichlet" | "simplex" => Ok(Self::Dirichlet),
      other => Err(PortfolioError::invalid_parameter(
        "sampling",
        format!("unknown sampling policy `{other}`"),
      )),
    }
  }
}
