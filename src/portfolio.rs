//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Risk/return estimation, frontier sampling, long-only mean-variance
//! optimization, candidate selection and backtesting.

pub mod backtest;
pub mod data;
pub mod engine;
pub mod metrics;
pub mod optimizers;
pub mod sampler;
pub mod selector;
pub mod types;

pub use backtest::backtest;
pub use backtest::backtest_report;
pub use backtest::holdings_from_weights;
pub use backtest::portfolio_value;
pub use backtest::BacktestReport;
pub use data::bound_window;
pub use data::estimate_returns;
pub use data::return_matrix;
pub use data::simple_returns_series;
pub use data::TRADING_DAYS;
pub use engine::EngineConfig;
pub use engine::PortfolioEngine;
pub use metrics::portfolio_metrics;
pub use metrics::portfolio_variance;
pub use metrics::DEFAULT_RISK_FREE_RATE;
pub use optimizers::efficient_frontier;
pub use optimizers::frontier_targets;
pub use optimizers::minimize_risk_for_return;
pub use optimizers::OptimizerOptions;
pub use sampler::sample_frontier;
pub use sampler::FrontierSampler;
pub use selector::max_sharpe;
pub use selector::min_risk;
pub use selector::risk_return_triples;
pub use selector::select_by_return;
pub use selector::select_by_risk;
pub use types::Asset;
pub use types::FrontierPoint;
pub use types::Holding;
pub use types::PortfolioEstimate;
pub use types::PriceSeries;
pub use types::PriceTable;
pub use types::ReturnModel;
pub use types::SamplingPolicy;
pub use types::ScoredPortfolio;
pub use types::WeightVector;
pub use types::WEIGHT_TOLERANCE;
