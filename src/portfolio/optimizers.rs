//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{w}}\ \mathbf{w}^\top\Sigma\mathbf{w}
//! \quad\text{s.t.}\quad \mu^\top\mathbf{w}=r^\*,\ \mathbf{1}^\top\mathbf{w}=1,\ \mathbf{w}\ge 0
//! $$
//!
//! Long-only minimum-risk allocation for a target return, solved with a primal
//! active-set method. Minimizing variance and minimizing standard deviation
//! share the same minimizer; `w <= 1` follows from the budget and sign
//! constraints and is never active on its own.

use argmin::core::CostFunction;
use argmin::core::Gradient;
use argmin::core::Hessian;
use impl_new_derive::ImplNew;
use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array1;
use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::metrics::portfolio_metrics;
use super::types::FrontierPoint;
use super::types::ReturnModel;
use super::types::ScoredPortfolio;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

const STEP_TOLERANCE: f64 = 1e-12;
const MULTIPLIER_TOLERANCE: f64 = 1e-10;
const SVD_RELATIVE_EPS: f64 = 1e-12;

/// Solver controls for [`minimize_risk_for_return`].
#[derive(ImplNew, Clone, Copy, Debug, PartialEq)]
pub struct OptimizerOptions {
  /// Allowed residual on the equality constraints, relative to `max(1, |mu|)`.
  pub tolerance: f64,
  /// Active-set iteration cap.
  pub max_iterations: usize,
}

impl Default for OptimizerOptions {
  fn default() -> Self {
    Self {
      tolerance: 1e-8,
      max_iterations: 500,
    }
  }
}

impl OptimizerOptions {
  pub fn validate(&self) -> Result<()> {
    if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
      return Err(PortfolioError::invalid_parameter(
        "tolerance",
        format!("must be positive, got {}", self.tolerance),
      ));
    }
    if self.max_iterations == 0 {
      return Err(PortfolioError::invalid_parameter(
        "max_iterations",
        "must be positive",
      ));
    }
    Ok(())
  }
}

/// Portfolio variance `w' Σ w` as an optimization objective.
struct PortfolioVariance {
  covariance: DMatrix<f64>,
}

impl PortfolioVariance {
  fn new(covariance: &Array2<f64>) -> Self {
    let n = covariance.nrows();
    Self {
      covariance: DMatrix::from_fn(n, n, |i, j| covariance[[i, j]]),
    }
  }
}

impl CostFunction for PortfolioVariance {
  type Param = DVector<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    Ok(w.dot(&(&self.covariance * w)))
  }
}

impl Gradient for PortfolioVariance {
  type Param = DVector<f64>;
  type Gradient = DVector<f64>;

  fn gradient(&self, w: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
    Ok(&self.covariance * w * 2.0)
  }
}

impl Hessian for PortfolioVariance {
  type Param = DVector<f64>;
  type Hessian = DMatrix<f64>;

  fn hessian(&self, _w: &Self::Param) -> std::result::Result<Self::Hessian, argmin::core::Error> {
    Ok(&self.covariance * 2.0)
  }
}

/// Move `w` toward the highest (or lowest) return asset until `mu' w == target`.
fn feasible_start(mut w: DVector<f64>, mu: &DVector<f64>, target: f64) -> DVector<f64> {
  let current = w.dot(mu);
  let k = if current < target { mu.imax() } else { mu.imin() };
  let gap = mu[k] - current;

  if gap.abs() > f64::EPSILON {
    let lambda = ((target - current) / gap).clamp(0.0, 1.0);
    w *= 1.0 - lambda;
    w[k] += lambda;
  }

  w
}

/// Equality-constrained minimizer with every non-free weight pinned at zero.
///
/// Returns the full-length weights and the multipliers of the budget and
/// return constraints.
fn solve_on_free_set(
  hessian: &DMatrix<f64>,
  mu: &DVector<f64>,
  target: f64,
  free: &[usize],
  with_return_row: bool,
) -> Option<(DVector<f64>, DVector<f64>)> {
  let k = free.len();
  let m = if with_return_row { 2 } else { 1 };
  let mut kkt = DMatrix::<f64>::zeros(k + m, k + m);
  let mut rhs = DVector::<f64>::zeros(k + m);

  for (a, &i) in free.iter().enumerate() {
    for (b, &j) in free.iter().enumerate() {
      kkt[(a, b)] = hessian[(i, j)];
    }
    kkt[(a, k)] = -1.0;
    kkt[(k, a)] = 1.0;
    if with_return_row {
      kkt[(a, k + 1)] = -mu[i];
      kkt[(k + 1, a)] = mu[i];
    }
  }
  rhs[k] = 1.0;
  if with_return_row {
    rhs[k + 1] = target;
  }

  let svd = kkt.svd(true, true);
  let eps = svd.singular_values.max() * SVD_RELATIVE_EPS;
  let solution = svd.solve(&rhs, eps).ok()?;

  let mut weights = DVector::<f64>::zeros(mu.len());
  for (a, &i) in free.iter().enumerate() {
    weights[i] = solution[a];
  }

  Some((weights, solution.rows(k, m).into_owned()))
}

/// Minimum-risk long-only weights whose expected return equals `target_return`.
///
/// Starts from `initial_guess` (1/N when absent). Fails with
/// [`PortfolioError::InfeasibleTarget`] when the target lies outside the range
/// of asset mean returns or the solver does not converge; the call is
/// deterministic for identical inputs.
pub fn minimize_risk_for_return(
  model: &ReturnModel,
  target_return: f64,
  initial_guess: Option<&WeightVector>,
  options: &OptimizerOptions,
) -> Result<WeightVector> {
  options.validate()?;
  if !target_return.is_finite() {
    return Err(PortfolioError::invalid_parameter(
      "target_return",
      "must be finite",
    ));
  }

  let n = model.len();
  let mu = DVector::from_iterator(n, model.mean_returns().iter().copied());
  let (lo, hi) = (mu.min(), mu.max());
  let tolerance = options.tolerance * 1.0_f64.max(lo.abs()).max(hi.abs());

  if target_return < lo - tolerance || target_return > hi + tolerance {
    warn!(target_return, lo, hi, "target return outside long-only range");
    return Err(PortfolioError::infeasible(
      target_return,
      format!("long-only portfolios span expected returns [{lo}, {hi}]"),
    ));
  }
  let target = target_return.clamp(lo, hi);

  let guess = match initial_guess {
    Some(guess) => guess.to_array(model.asset_order())?,
    None => Array1::from_elem(n, 1.0 / n as f64),
  };

  let solver_error =
    |err: argmin::core::Error| PortfolioError::infeasible(target_return, err.to_string());
  let problem = PortfolioVariance::new(model.covariance());
  let mut w = feasible_start(DVector::from_iterator(n, guess.iter().copied()), &mu, target);
  let hessian = problem.hessian(&w).map_err(solver_error)?;

  // At either end of the achievable range only the extreme assets may carry weight.
  let locked: Vec<bool> = if hi - lo <= tolerance {
    vec![false; n]
  } else if target >= hi - tolerance {
    mu.iter().map(|&m| m < hi - tolerance).collect()
  } else if target <= lo + tolerance {
    mu.iter().map(|&m| m > lo + tolerance).collect()
  } else {
    vec![false; n]
  };
  let pinned = locked.iter().filter(|&&lock| lock).count();
  if pinned > 0 {
    let share = 1.0 / (n - pinned) as f64;
    w = DVector::from_iterator(n, locked.iter().map(|&lock| if lock { 0.0 } else { share }));
  }
  let with_return_row = hi - lo > tolerance && pinned == 0;

  let mut at_bound: Vec<bool> = w
    .iter()
    .zip(&locked)
    .map(|(&x, &lock)| lock || x <= 0.0)
    .collect();
  for (x, &bound) in w.iter_mut().zip(&at_bound) {
    if bound {
      *x = 0.0;
    }
  }

  let mut converged = false;
  for iteration in 0..options.max_iterations {
    let free: Vec<usize> = (0..n).filter(|&i| !at_bound[i]).collect();
    let (candidate, multipliers) =
      solve_on_free_set(&hessian, &mu, target, &free, with_return_row).ok_or_else(|| {
        PortfolioError::infeasible(target_return, "KKT system could not be solved")
      })?;
    let step = &candidate - &w;

    if step.amax() <= STEP_TOLERANCE {
      let gradient = problem.gradient(&w).map_err(solver_error)?;
      let threshold = -MULTIPLIER_TOLERANCE * gradient.amax().max(1.0);
      let release = (0..n)
        .filter(|&i| at_bound[i] && !locked[i])
        .map(|i| {
          let return_term = if with_return_row {
            multipliers[1] * mu[i]
          } else {
            0.0
          };
          (i, gradient[i] - multipliers[0] - return_term)
        })
        .filter(|&(_, lambda)| lambda < threshold)
        .min_by(|a, b| a.1.total_cmp(&b.1));

      match release {
        Some((i, lambda)) => {
          trace!(iteration, asset = i, lambda, "releasing bound");
          at_bound[i] = false;
        }
        None => {
          let variance = problem.cost(&w).map_err(solver_error)?;
          debug!(iteration, target_return, variance, "active-set solve converged");
          converged = true;
          break;
        }
      }
      continue;
    }

    let mut alpha = 1.0;
    let mut blocking = None;
    for &i in &free {
      if step[i] < 0.0 {
        let ratio = -w[i] / step[i];
        if ratio < alpha {
          alpha = ratio;
          blocking = Some(i);
        }
      }
    }

    w.axpy(alpha, &step, 1.0);
    if let Some(i) = blocking {
      w[i] = 0.0;
      at_bound[i] = true;
    }
    trace!(iteration, alpha, ?blocking, free = free.len(), "active-set step");
  }

  if !converged {
    warn!(
      target_return,
      max_iterations = options.max_iterations,
      "active-set solve did not converge"
    );
    return Err(PortfolioError::infeasible(
      target_return,
      format!("no convergence within {} iterations", options.max_iterations),
    ));
  }

  w.iter_mut().for_each(|x| *x = x.max(0.0));
  let budget_residual = (w.sum() - 1.0).abs();
  let return_residual = if with_return_row {
    (w.dot(&mu) - target_return).abs()
  } else {
    0.0
  };

  if budget_residual > tolerance || return_residual > tolerance {
    return Err(PortfolioError::infeasible(
      target_return,
      format!("constraint residuals {budget_residual:e} (budget) and {return_residual:e} (return)"),
    ));
  }

  Ok(WeightVector::from_aligned(model.asset_order(), w.iter().copied()))
}

/// `points` evenly spaced target returns from the lowest to the highest asset mean.
pub fn frontier_targets(model: &ReturnModel, points: usize) -> Vec<f64> {
  let mu = model.mean_returns();
  let lo = mu.iter().copied().fold(f64::INFINITY, f64::min);
  let hi = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);

  Array1::linspace(lo, hi, points).to_vec()
}

/// Optimize every target in parallel. Points come back in target order and
/// each carries its own success or failure.
pub fn efficient_frontier(
  model: &ReturnModel,
  targets: &[f64],
  risk_free_rate: f64,
  options: &OptimizerOptions,
) -> Vec<FrontierPoint> {
  targets
    .par_iter()
    .map(|&target| {
      let result = minimize_risk_for_return(model, target, None, options).and_then(|weights| {
        let estimate = portfolio_metrics(&weights, model, risk_free_rate)?;
        Ok(ScoredPortfolio { weights, estimate })
      });
      FrontierPoint { target, result }
    })
    .collect()
}
