//! # portfolio-rs
//!
//! Portfolio risk-return engine: turns aligned price histories into annualized
//! return statistics, scores and samples long-only portfolios, solves the
//! minimum-risk allocation for a target return, ranks candidates and backtests
//! fixed holdings over a historical window.
//!
//! Everything is a function of its explicit inputs. Price acquisition,
//! persistence and plotting live with the caller.

pub mod error;
pub mod portfolio;

pub use error::PortfolioError;
pub use error::Result;
pub use portfolio::EngineConfig;
pub use portfolio::PortfolioEngine;
