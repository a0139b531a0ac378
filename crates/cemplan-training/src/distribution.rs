//! Diagonal Gaussian search distribution and candidate sampling.
//!
//! [`DistributionState`] holds the per-parameter mean and standard deviation the
//! optimizer refines. Sampling goes through the [`Sampler`] trait so that tests can
//! replace randomness with fixed batches; [`GaussianSampler`] is the production
//! implementation, drawing independent normal variates from a seedable generator.

use cemplan_evaluator::policy::ParamShape;
use cemplan_stats::elementwise;
use rand::{Rng as _, SeedableRng as _};
use rand_distr::Normal;
use rand_pcg::Pcg32;
use serde::Serialize;

use crate::{ConfigError, SampleError};

/// Mean and standard deviation of the search distribution, one entry per parameter.
///
/// Invariant: `mean` and `std_dev` both have `shape.len()` entries, every mean is
/// finite and every standard deviation is finite and non-negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionState {
    shape: ParamShape,
    mean: Vec<f32>,
    std_dev: Vec<f32>,
}

impl DistributionState {
    /// Creates a state from explicit flat vectors.
    pub fn new(shape: ParamShape, mean: Vec<f32>, std_dev: Vec<f32>) -> Result<Self, ConfigError> {
        for (what, actual) in [("mean", mean.len()), ("std-dev", std_dev.len())] {
            if actual != shape.len() {
                return Err(ConfigError::LengthMismatch {
                    what,
                    expected: shape.len(),
                    actual,
                });
            }
        }
        if let Some((index, &value)) = mean.iter().enumerate().find(|(_, m)| !m.is_finite()) {
            return Err(ConfigError::InvalidMean { index, value });
        }
        if let Some((index, &value)) = std_dev
            .iter()
            .enumerate()
            .find(|(_, s)| !(s.is_finite() && **s >= 0.0))
        {
            return Err(ConfigError::InvalidStdDev { index, value });
        }
        Ok(Self {
            shape,
            mean,
            std_dev,
        })
    }

    /// Creates a state with every mean and every standard deviation set to one value.
    ///
    /// ```
    /// # use cemplan_evaluator::policy::ParamShape;
    /// # use cemplan_training::distribution::DistributionState;
    /// let state = DistributionState::filled(ParamShape::new(5, 2), 0.0, 1.0).unwrap();
    /// assert_eq!(state.mean(), &[0.0; 10]);
    /// assert_eq!(state.std_dev(), &[1.0; 10]);
    /// ```
    pub fn filled(shape: ParamShape, mean: f32, std_dev: f32) -> Result<Self, ConfigError> {
        Self::new(shape, vec![mean; shape.len()], vec![std_dev; shape.len()])
    }

    #[must_use]
    pub fn shape(&self) -> ParamShape {
        self.shape
    }

    #[must_use]
    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    #[must_use]
    pub fn std_dev(&self) -> &[f32] {
        &self.std_dev
    }

    /// Average standard deviation over all parameters, a scalar measure of spread.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn mean_std_dev(&self) -> f32 {
        if self.std_dev.is_empty() {
            return 0.0;
        }
        self.std_dev.iter().sum::<f32>() / self.std_dev.len() as f32
    }

    /// Fits a new state to `elites`: elementwise mean and population standard deviation.
    ///
    /// A single elite yields its own values as the mean and an all-zero standard
    /// deviation.
    ///
    /// Fails with a [`ConfigError`] when an elite has the wrong length, `elites` is
    /// empty, or the fitted values are not finite (non-finite elites, or statistics
    /// that overflow `f32`).
    pub fn refit<R>(&self, elites: &[R]) -> Result<Self, ConfigError>
    where
        R: AsRef<[f32]>,
    {
        if let Some(bad) = elites.iter().find(|e| e.as_ref().len() != self.shape.len()) {
            return Err(ConfigError::LengthMismatch {
                what: "elite candidate",
                expected: self.shape.len(),
                actual: bad.as_ref().len(),
            });
        }
        let Some(mean) = elementwise::mean(elites) else {
            return Err(ConfigError::LengthMismatch {
                what: "elite set",
                expected: 1,
                actual: 0,
            });
        };
        let std_dev = elementwise::population_std_dev(elites, &mean);
        Self::new(self.shape, mean, std_dev)
    }
}

/// Source of candidate parameter vectors.
pub trait Sampler {
    /// Draws `n` vectors where entry `i` follows `N(mean[i], std_dev[i]²)`.
    fn sample(
        &mut self,
        mean: &[f32],
        std_dev: &[f32],
        n: usize,
    ) -> Result<Vec<Vec<f32>>, SampleError>;
}

impl<S> Sampler for &mut S
where
    S: Sampler + ?Sized,
{
    fn sample(
        &mut self,
        mean: &[f32],
        std_dev: &[f32],
        n: usize,
    ) -> Result<Vec<Vec<f32>>, SampleError> {
        (**self).sample(mean, std_dev, n)
    }
}

/// Independent Gaussian sampler over a PCG generator.
///
/// Two samplers created with the same seed produce the same sequence of batches.
#[derive(Debug, Clone)]
pub struct GaussianSampler {
    rng: Pcg32,
}

impl Default for GaussianSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianSampler {
    /// Creates a sampler seeded from the thread-local generator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(rand::rng().random())
    }

    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
        }
    }
}

impl Sampler for GaussianSampler {
    fn sample(
        &mut self,
        mean: &[f32],
        std_dev: &[f32],
        n: usize,
    ) -> Result<Vec<Vec<f32>>, SampleError> {
        if mean.len() != std_dev.len() {
            return Err(SampleError::LengthMismatch {
                mean_len: mean.len(),
                std_dev_len: std_dev.len(),
            });
        }
        let normals = mean
            .iter()
            .zip(std_dev)
            .enumerate()
            .map(|(index, (&mean, &std_dev))| {
                if !mean.is_finite() || !(std_dev.is_finite() && std_dev >= 0.0) {
                    return Err(SampleError::InvalidDistribution {
                        index,
                        mean,
                        std_dev,
                    });
                }
                Normal::new(mean, std_dev).map_err(|_| SampleError::InvalidDistribution {
                    index,
                    mean,
                    std_dev,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let batch = (0..n)
            .map(|_| {
                normals
                    .iter()
                    .map(|normal| self.rng.sample(normal))
                    .collect::<Vec<f32>>()
            })
            .collect();
        Ok(batch)
    }
}
