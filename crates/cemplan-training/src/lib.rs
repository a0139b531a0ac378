//! Training system that searches policy parameters with the Cross Entropy Method.
//!
//! The Cross Entropy Method (CEM) is a gradient-free optimizer: it keeps a diagonal
//! Gaussian over parameter vectors and repeatedly refits it to the best samples.
//!
//! # How Training Works
//!
//! 1. **Sample** - Draw a batch of `N` candidate parameter vectors from `N(mean, std_dev)`
//! 2. **Evaluate** - Each candidate plays a rollout; its summed reward is its fitness
//! 3. **Select** - Keep the top `K = floor(N × elite_fraction)` candidates (the elites)
//! 4. **Refit** - Replace mean and std-dev with the elementwise mean and population
//!    std-dev of the elites
//! 5. **Repeat** - Continue for a fixed number of iterations
//!
//! # Architecture
//!
//! ```text
//! Cross Entropy Method (cem)
//!     ↓ draws candidates from
//! Distribution State + Sampler (distribution)
//!     ↓ scored by
//! Rollout Evaluator (cemplan-evaluator)
//!     ↓ plays episodes in
//! Simulator (cemplan-env)
//! ```
//!
//! Both collaborators are injected: the [`Sampler`](distribution::Sampler) trait
//! abstracts randomness and the
//! [`RolloutEvaluator`](cemplan_evaluator::rollout_evaluator::RolloutEvaluator) trait
//! abstracts simulation, so the loop can be driven by deterministic stubs.
//!
//! # Example
//!
//! ```
//! use std::convert::Infallible;
//!
//! use cemplan_evaluator::policy::ParamShape;
//! use cemplan_training::{
//!     cem::{self, CemParams},
//!     distribution::{DistributionState, GaussianSampler},
//! };
//!
//! let initial = DistributionState::filled(ParamShape::new(5, 2), 0.0, 1.0).unwrap();
//! let params = CemParams::default();
//! let mut sampler = GaussianSampler::with_seed(0);
//! // fitness: negative distance from the all-ones vector
//! let rollout = |c: &[f32]| {
//!     Ok::<f32, Infallible>(-c.iter().map(|v| (v - 1.0).powi(2)).sum::<f32>())
//! };
//!
//! let outcome = cem::optimize(initial, &params, &mut sampler, &rollout).unwrap();
//! assert_eq!(outcome.history.len(), 20);
//! assert!(outcome.state.std_dev().iter().all(|s| *s >= 0.0));
//! ```
//!
//! # Current Limitations
//!
//! - **Fixed iteration budget**: There is no convergence-based early stop
//! - **No noise floor**: The std-dev may collapse to zero, after which every sample
//!   equals the mean
//! - **Single-objective only**: Fitness is one scalar per candidate

pub mod cem;
pub mod distribution;

/// Rejected optimizer or distribution configuration.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("batch size must be at least 1")]
    EmptyBatch,
    #[display("elite fraction must be in (0, 1], got {elite_fraction}")]
    InvalidEliteFraction { elite_fraction: f64 },
    #[display(
        "batch size {batch_size} with elite fraction {elite_fraction} selects no elite candidates"
    )]
    ZeroElites {
        batch_size: usize,
        elite_fraction: f64,
    },
    #[display("{what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[display("standard deviation at index {index} must be finite and non-negative, got {value}")]
    InvalidStdDev { index: usize, value: f32 },
    #[display("mean at index {index} must be finite, got {value}")]
    InvalidMean { index: usize, value: f32 },
}

/// Failure to draw candidates from a distribution.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum SampleError {
    #[display("mean has {mean_len} entries but std-dev has {std_dev_len}")]
    LengthMismatch { mean_len: usize, std_dev_len: usize },
    #[display("cannot build a normal distribution N({mean}, {std_dev}) at index {index}")]
    InvalidDistribution { index: usize, mean: f32, std_dev: f32 },
    #[display("sampler returned {actual} candidates, expected {expected}")]
    WrongCount { expected: usize, actual: usize },
    #[display("sampled candidate {candidate} has {actual} entries, expected {expected}")]
    WrongLength {
        candidate: usize,
        expected: usize,
        actual: usize,
    },
    #[display("sampled candidate {candidate} has non-finite value {value} at index {index}")]
    NonFinite {
        candidate: usize,
        index: usize,
        value: f32,
    },
}
