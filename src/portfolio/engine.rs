//! # Portfolio Engine
//!
//! $$
//! P\ \xrightarrow{\ \text{estimate}\ }\ (\mu,\Sigma)\ \xrightarrow{\ \text{sample / optimize}\ }\ \{\mathbf{w}\}
//! \ \xrightarrow{\ \text{select}\ }\ \mathbf{w}^\*\ \xrightarrow{\ \text{backtest}\ }\ \text{perf}
//! $$
//!
//! High-level API binding one [`EngineConfig`] to the estimator, metrics,
//! sampler, optimizer, selector and backtester. Data is always passed in
//! explicitly; the engine holds nothing but its configuration.

use impl_new_derive::ImplNew;
use tracing::debug;

use super::backtest::backtest;
use super::backtest::holdings_from_weights;
use super::data::estimate_returns;
use super::data::TRADING_DAYS;
use super::metrics::portfolio_metrics;
use super::metrics::DEFAULT_RISK_FREE_RATE;
use super::optimizers::efficient_frontier;
use super::optimizers::frontier_targets;
use super::optimizers::minimize_risk_for_return;
use super::optimizers::OptimizerOptions;
use super::sampler::FrontierSampler;
use super::selector;
use super::types::FrontierPoint;
use super::types::Holding;
use super::types::PortfolioEstimate;
use super::types::PriceTable;
use super::types::ReturnModel;
use super::types::SamplingPolicy;
use super::types::ScoredPortfolio;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct EngineConfig {
  /// Annual risk-free rate used in Sharpe ratios.
  pub risk_free_rate: f64,
  /// Periods per year used to annualize return statistics.
  pub annualization: f64,
  /// Sampler seed; `None` draws from system entropy.
  pub seed: Option<u64>,
  /// Allowed equality-constraint residual in the optimizer.
  pub constraint_tolerance: f64,
  /// Return window used by [`PortfolioEngine::select_by_return`].
  pub return_tolerance: f64,
  /// Optimizer iteration cap.
  pub max_iterations: usize,
  /// How random portfolios are drawn.
  pub sampling: SamplingPolicy,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: DEFAULT_RISK_FREE_RATE,
      annualization: TRADING_DAYS,
      seed: None,
      constraint_tolerance: 1e-8,
      return_tolerance: 0.01,
      max_iterations: 500,
      sampling: SamplingPolicy::NormalizedUniform,
    }
  }
}

impl EngineConfig {
  pub fn validate(&self) -> Result<()> {
    if !self.risk_free_rate.is_finite() {
      return Err(PortfolioError::invalid_parameter(
        "risk_free_rate",
        "must be finite",
      ));
    }
    if !self.annualization.is_finite() || self.annualization <= 0.0 {
      return Err(PortfolioError::invalid_parameter(
        "annualization",
        format!("must be positive, got {}", self.annualization),
      ));
    }
    if !self.return_tolerance.is_finite() || self.return_tolerance <= 0.0 {
      return Err(PortfolioError::invalid_parameter(
        "return_tolerance",
        format!("must be positive, got {}", self.return_tolerance),
      ));
    }
    self.optimizer_options().validate()
  }

  pub fn optimizer_options(&self) -> OptimizerOptions {
    OptimizerOptions::new(self.constraint_tolerance, self.max_iterations)
  }
}

/// Single entry point for estimation, scoring, optimization, selection and backtesting.
#[derive(Clone, Debug)]
pub struct PortfolioEngine {
  config: EngineConfig,
}

impl PortfolioEngine {
  /// Construct an engine, rejecting an invalid configuration.
  pub fn new(config: EngineConfig) -> Result<Self> {
    config.validate()?;
    debug!(?config, "portfolio engine configured");
    Ok(Self { config })
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Annualized mean returns and covariance of aligned price histories.
  pub fn estimate(&self, prices: &PriceTable) -> Result<ReturnModel> {
    estimate_returns(prices, self.config.annualization)
  }

  /// Expected return, risk and Sharpe ratio of `weights`.
  pub fn metrics(&self, weights: &WeightVector, model: &ReturnModel) -> Result<PortfolioEstimate> {
    portfolio_metrics(weights, model, self.config.risk_free_rate)
  }

  /// Metrics of a concrete position, weighted by share count.
  pub fn holdings_metrics(
    &self,
    holdings: &[Holding],
    model: &ReturnModel,
  ) -> Result<PortfolioEstimate> {
    let weights = WeightVector::from_holdings(holdings)?;
    self.metrics(&weights, model)
  }

  /// Lazy generator of `count` scored random portfolios.
  pub fn sampler<'a>(&self, model: &'a ReturnModel, count: usize) -> Result<FrontierSampler<'a>> {
    FrontierSampler::new(
      model,
      count,
      self.config.seed,
      self.config.risk_free_rate,
      self.config.sampling,
    )
  }

  /// Collect `count` scored random portfolios, aborting on the first failure.
  pub fn sample(&self, model: &ReturnModel, count: usize) -> Result<Vec<ScoredPortfolio>> {
    self.sampler(model, count)?.collect()
  }

  /// Minimum-risk portfolio for `target_return`, scored.
  pub fn optimize(
    &self,
    model: &ReturnModel,
    target_return: f64,
    initial_guess: Option<&WeightVector>,
  ) -> Result<ScoredPortfolio> {
    let weights = minimize_risk_for_return(
      model,
      target_return,
      initial_guess,
      &self.config.optimizer_options(),
    )?;
    let estimate = self.metrics(&weights, model)?;
    Ok(ScoredPortfolio { weights, estimate })
  }

  /// Optimized frontier over `points` evenly spaced target returns.
  pub fn frontier(&self, model: &ReturnModel, points: usize) -> Result<Vec<FrontierPoint>> {
    if points == 0 {
      return Err(PortfolioError::invalid_parameter(
        "points",
        "must be positive",
      ));
    }

    let targets = frontier_targets(model, points);
    Ok(efficient_frontier(
      model,
      &targets,
      self.config.risk_free_rate,
      &self.config.optimizer_options(),
    ))
  }

  /// `n` candidates with risk closest to `target_risk`.
  pub fn select_by_risk<'c>(
    &self,
    candidates: &'c [ScoredPortfolio],
    target_risk: f64,
    n: usize,
  ) -> Result<Vec<&'c ScoredPortfolio>> {
    selector::select_by_risk(candidates, target_risk, n)
  }

  /// Least risky `n` candidates within the configured return tolerance of `target_return`.
  pub fn select_by_return<'c>(
    &self,
    candidates: &'c [ScoredPortfolio],
    target_return: f64,
    n: usize,
  ) -> Result<Vec<&'c ScoredPortfolio>> {
    selector::select_by_return(candidates, target_return, self.config.return_tolerance, n)
  }

  /// Realized performance of `holdings` over the supplied window.
  pub fn backtest(&self, holdings: &[Holding], prices: &PriceTable) -> Result<f64> {
    backtest(holdings, prices)
  }

  /// Backtest each candidate as `total_quantity` shares split by its weights,
  /// pairing the estimate with the realized performance.
  pub fn backtest_candidates<'c>(
    &self,
    candidates: impl IntoIterator<Item = &'c ScoredPortfolio>,
    total_quantity: f64,
    prices: &PriceTable,
  ) -> Result<Vec<(PortfolioEstimate, f64)>> {
    candidates
      .into_iter()
      .map(|candidate| {
        let holdings = holdings_from_weights(&candidate.weights, total_quantity)?;
        Ok((candidate.estimate, backtest(&holdings, prices)?))
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;

  use super::*;
  use crate::portfolio::types::Asset;
  use crate::portfolio::types::PriceSeries;
  use crate::portfolio::types::WEIGHT_TOLERANCE;

  fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
  }

  /// Independent geometric random walks, one year of daily closes.
  fn gbm_prices(seed: u64) -> PriceTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let params = [
      ("AAA", 0.0002, 0.008),
      ("BBB", 0.0005, 0.012),
      ("CCC", 0.0008, 0.018),
    ];

    params
      .iter()
      .map(|&(symbol, drift, vol)| {
        let step = Normal::new(drift, vol).unwrap();
        let mut close = 100.0;
        let mut closes = vec![close];
        for _ in 0..252 {
          close *= 1.0 + step.sample(&mut rng);
          closes.push(close);
        }
        (
          Asset::new(symbol, symbol),
          PriceSeries::from_closes(start(), &closes),
        )
      })
      .collect()
  }

  fn engine(seed: Option<u64>) -> PortfolioEngine {
    PortfolioEngine::new(EngineConfig {
      seed,
      ..EngineConfig::default()
    })
    .unwrap()
  }

  #[test]
  fn default_config_is_valid() {
    let config = EngineConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.risk_free_rate, 0.01);
    assert_eq!(config.annualization, 252.0);
    assert_eq!(config.sampling, SamplingPolicy::NormalizedUniform);
  }

  #[test]
  fn invalid_config_is_rejected() {
    let bad_annualization = EngineConfig {
      annualization: 0.0,
      ..EngineConfig::default()
    };
    assert!(matches!(
      PortfolioEngine::new(bad_annualization),
      Err(PortfolioError::InvalidParameter {
        name: "annualization",
        ..
      })
    ));

    let bad_tolerance = EngineConfig::new(0.01, 252.0, None, -1.0, 0.01, 500, SamplingPolicy::Dirichlet);
    assert!(PortfolioEngine::new(bad_tolerance).is_err());
  }

  #[test]
  fn pipeline_from_prices_to_selection() {
    let engine = engine(Some(42));
    let model = engine.estimate(&gbm_prices(5)).unwrap();
    assert_eq!(model.len(), 3);

    let cloud = engine.sample(&model, 300).unwrap();
    assert_eq!(cloud, engine.sample(&model, 300).unwrap());

    let closest = engine.select_by_risk(&cloud, 0.15, 3).unwrap();
    assert_eq!(closest.len(), 3);
    let gaps: Vec<f64> = closest
      .iter()
      .map(|p| (p.estimate.risk - 0.15).abs())
      .collect();
    assert!(gaps.windows(2).all(|pair| pair[0] <= pair[1]));

    let mu = model.mean_returns();
    let lo = mu.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let target = 0.5 * (lo + hi);

    let best = engine.optimize(&model, target, None).unwrap();
    assert!((best.estimate.expected_return - target).abs() < 1e-6);
    assert!((best.weights.total() - 1.0).abs() < WEIGHT_TOLERANCE);

    for candidate in engine.select_by_return(&cloud, target, 10).unwrap() {
      assert!((candidate.estimate.expected_return - target).abs() <= 0.01);
    }
  }

  #[test]
  fn frontier_spans_asset_return_range() {
    let engine = engine(None);
    let model = engine.estimate(&gbm_prices(9)).unwrap();
    let frontier = engine.frontier(&model, 6).unwrap();

    assert_eq!(frontier.len(), 6);
    for point in &frontier {
      let scored = point.result.as_ref().unwrap();
      assert!((scored.estimate.expected_return - point.target).abs() < 1e-6);
    }
    assert!(engine.frontier(&model, 0).is_err());
  }

  #[test]
  fn holdings_metrics_weight_by_shares() {
    let engine = engine(None);
    let model = engine.estimate(&gbm_prices(3)).unwrap();
    let holdings: Vec<Holding> = model
      .asset_order()
      .iter()
      .zip([10.0, 20.0, 70.0])
      .map(|(asset, q)| Holding::new(asset.clone(), q))
      .collect();

    let weights = WeightVector::from_holdings(&holdings).unwrap();
    assert_eq!(
      engine.holdings_metrics(&holdings, &model).unwrap(),
      engine.metrics(&weights, &model).unwrap()
    );
  }

  #[test]
  fn candidates_backtest_against_realized_prices() {
    let mut prices = PriceTable::new();
    prices.insert(
      Asset::new("AAA", "A"),
      PriceSeries::from_closes(start(), &[100.0, 120.0, 110.0, 150.0]),
    );
    prices.insert(
      Asset::new("BBB", "B"),
      PriceSeries::from_closes(start(), &[10.0, 11.0, 10.0, 10.0]),
    );

    let engine = engine(Some(7));
    let model = engine.estimate(&prices).unwrap();
    let cloud = engine.sample(&model, 20).unwrap();
    let realized = engine.backtest_candidates(&cloud, 1_000.0, &prices).unwrap();

    assert_eq!(realized.len(), cloud.len());
    for ((estimate, performance), candidate) in realized.iter().zip(&cloud) {
      assert_eq!(*estimate, candidate.estimate);
      let w_a = candidate.weights.get(&Asset::new("AAA", "A")).unwrap();
      let w_b = candidate.weights.get(&Asset::new("BBB", "B")).unwrap();
      let expected = 50.0 * w_a / (100.0 * w_a + 10.0 * w_b);
      assert!((performance - expected).abs() < 1e-12);
    }
  }
}
