//! # Frontier Sampler
//!
//! $$
//! w_i=\frac{u_i}{\sum_j u_j},\qquad u_i\overset{iid}{\sim}\mathcal U[0,1)
//! $$
//!
//! Monte-Carlo cloud of random long-only portfolios scored by the metrics
//! calculator. Normalizing uniform draws is biased toward the centre of the
//! simplex; [`SamplingPolicy::Dirichlet`] draws uniformly over it instead.

use ndarray::Array1;
use ndarray_rand::rand_distr::Exp1;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;
use tracing::warn;

use super::metrics::estimate_from_array;
use super::types::ReturnModel;
use super::types::SamplingPolicy;
use super::types::ScoredPortfolio;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

/// Lazy, finite generator of exactly `count` scored random portfolios.
///
/// The first scoring failure is yielded as an error and ends the sequence.
pub struct FrontierSampler<'a> {
  model: &'a ReturnModel,
  risk_free_rate: f64,
  policy: SamplingPolicy,
  rng: StdRng,
  remaining: usize,
  failed: bool,
}

impl<'a> FrontierSampler<'a> {
  /// Without a `seed` the generator is seeded from system entropy.
  pub fn new(
    model: &'a ReturnModel,
    count: usize,
    seed: Option<u64>,
    risk_free_rate: f64,
    policy: SamplingPolicy,
  ) -> Result<Self> {
    if count == 0 {
      return Err(PortfolioError::invalid_parameter(
        "count",
        "must be positive",
      ));
    }

    let rng = match seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };

    debug!(count, assets = model.len(), ?policy, ?seed, "sampling frontier");

    Ok(Self {
      model,
      risk_free_rate,
      policy,
      rng,
      remaining: count,
      failed: false,
    })
  }

  fn draw(&mut self) -> Array1<f64> {
    let n = self.model.len();
    let raw: Array1<f64> = match self.policy {
      SamplingPolicy::NormalizedUniform => {
        Array1::random_using(n, Uniform::new(0.0, 1.0), &mut self.rng)
      }
      SamplingPolicy::Dirichlet => Array1::random_using(n, Exp1, &mut self.rng),
    };

    let total = raw.sum();
    if total > 0.0 {
      raw / total
    } else {
      Array1::from_elem(n, 1.0 / n as f64)
    }
  }
}

impl Iterator for FrontierSampler<'_> {
  type Item = Result<ScoredPortfolio>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 || self.failed {
      return None;
    }
    self.remaining -= 1;

    let w = self.draw();
    match estimate_from_array(&w, self.model, self.risk_free_rate) {
      Ok(estimate) => Some(Ok(ScoredPortfolio {
        weights: WeightVector::from_aligned(self.model.asset_order(), w.iter().copied()),
        estimate,
      })),
      Err(err) => {
        warn!(%err, "aborting frontier sampling");
        self.failed = true;
        Some(Err(err))
      }
    }
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    if self.failed {
      (0, Some(0))
    } else {
      (0, Some(self.remaining))
    }
  }
}

/// Draw and score `count` random portfolios, aborting on the first failure.
pub fn sample_frontier(
  model: &ReturnModel,
  count: usize,
  seed: Option<u64>,
  risk_free_rate: f64,
  policy: SamplingPolicy,
) -> Result<Vec<ScoredPortfolio>> {
  FrontierSampler::new(model, count, seed, risk_free_rate, policy)?.collect()
}

#[cfg(test)]
mod tests {
  use ndarray::Array2;
  use tracing_test::traced_test;

  use super::*;
  use crate::portfolio::types::Asset;
  use crate::portfolio::types::WEIGHT_TOLERANCE;

  fn model() -> ReturnModel {
    ReturnModel::new(
      vec![
        Asset::new("AAA", "A"),
        Asset::new("BBB", "B"),
        Asset::new("CCC", "C"),
      ],
      Array1::from(vec![0.08, 0.1, 0.12]),
      Array2::from_shape_vec(
        (3, 3),
        vec![0.04, 0.01, 0.0, 0.01, 0.09, 0.02, 0.0, 0.02, 0.16],
      )
      .unwrap(),
    )
    .unwrap()
  }

  #[test]
  fn sampled_weights_lie_on_simplex() {
    let model = model();
    for policy in [SamplingPolicy::NormalizedUniform, SamplingPolicy::Dirichlet] {
      let cloud = sample_frontier(&model, 200, Some(7), 0.01, policy).unwrap();
      assert_eq!(cloud.len(), 200);

      for p in &cloud {
        assert!((p.weights.total() - 1.0).abs() < WEIGHT_TOLERANCE);
        for (_, w) in p.weights.iter() {
          assert!((-WEIGHT_TOLERANCE..=1.0 + WEIGHT_TOLERANCE).contains(&w));
        }
        assert!(p.estimate.risk > 0.0);
        assert!(p.estimate.expected_return >= 0.08 - 1e-12);
        assert!(p.estimate.expected_return <= 0.12 + 1e-12);
      }
    }
  }

  #[test]
  fn same_seed_reproduces_sequence() {
    let model = model();
    let a = sample_frontier(&model, 100, Some(42), 0.01, SamplingPolicy::default()).unwrap();
    let b = sample_frontier(&model, 100, Some(42), 0.01, SamplingPolicy::default()).unwrap();
    let c = sample_frontier(&model, 100, Some(43), 0.01, SamplingPolicy::default()).unwrap();

    let weights = |cloud: &[ScoredPortfolio]| -> Vec<WeightVector> {
      cloud.iter().map(|p| p.weights.clone()).collect()
    };
    assert_eq!(weights(&a), weights(&b));
    assert_ne!(weights(&a), weights(&c));
  }

  #[test]
  fn sampler_is_lazy_and_exact() {
    let model = model();
    let mut sampler =
      FrontierSampler::new(&model, 3, Some(1), 0.01, SamplingPolicy::default()).unwrap();

    assert_eq!(sampler.size_hint(), (0, Some(3)));
    assert!(sampler.next().is_some());
    assert_eq!(sampler.by_ref().count(), 2);
    assert!(sampler.next().is_none());
  }

  #[test]
  fn zero_count_is_rejected() {
    let model = model();
    assert!(matches!(
      FrontierSampler::new(&model, 0, Some(1), 0.01, SamplingPolicy::default()),
      Err(PortfolioError::InvalidParameter { name: "count", .. })
    ));
  }

  #[test]
  #[traced_test]
  fn zero_variance_universe_aborts_whole_call() {
    let model = ReturnModel::new(
      vec![Asset::new("AAA", "A")],
      Array1::from(vec![0.0]),
      Array2::zeros((1, 1)),
    )
    .unwrap();

    let mut sampler =
      FrontierSampler::new(&model, 10, Some(3), 0.01, SamplingPolicy::default()).unwrap();
    assert_eq!(sampler.next(), Some(Err(PortfolioError::DegenerateRisk)));
    assert_eq!(sampler.next(), None);

    assert_eq!(
      sample_frontier(&model, 10, Some(3), 0.01, SamplingPolicy::default()),
      Err(PortfolioError::DegenerateRisk)
    );
    assert!(logs_contain("aborting frontier sampling"));
  }
}
