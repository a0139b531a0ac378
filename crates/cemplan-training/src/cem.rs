//! Cross Entropy Method optimizer loop.
//!
//! Each iteration samples a batch from the current [`DistributionState`], scores every
//! candidate with a [`RolloutEvaluator`], keeps the best `K` candidates and refits the
//! distribution to them. After the configured number of iterations the final state is
//! returned; its mean is the learned parameter vector.
//!
//! # Elite Count
//!
//! `K = floor(N × elite_fraction)`. A configuration where `K` would be zero is rejected
//! with [`ConfigError::ZeroElites`] before anything is sampled.
//!
//! # Ranking
//!
//! Candidates are ranked by fitness, highest first, with a stable sort: equal scores
//! keep their sampling order. NaN fitness ranks below every number.
//!
//! # Parallelization
//!
//! Rollouts within a batch are independent. With more than one worker the batch is split
//! into contiguous chunks evaluated on scoped threads, and scores are reassembled in
//! sampling order, so results are identical to sequential evaluation for a
//! deterministic evaluator.

use std::{cmp::Ordering, error::Error, fmt, num::NonZeroUsize, thread};

use cemplan_evaluator::rollout_evaluator::RolloutEvaluator;
use cemplan_stats::descriptive::DescriptiveStats;
use serde::{Deserialize, Serialize};

use crate::{
    ConfigError, SampleError,
    distribution::{DistributionState, Sampler},
};

/// Hyperparameters of the optimizer loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CemParams {
    /// Number of sample/evaluate/refit rounds.
    pub iterations: usize,
    /// Candidates sampled per iteration (`N`).
    pub batch_size: usize,
    /// Share of the batch kept as elites, in `(0, 1]`.
    pub elite_fraction: f64,
    /// Threads used for rollouts; all available cores when unset.
    pub workers: Option<NonZeroUsize>,
}

impl Default for CemParams {
    fn default() -> Self {
        Self {
            iterations: 20,
            batch_size: 10,
            elite_fraction: 0.4,
            workers: None,
        }
    }
}

impl CemParams {
    /// Number of elites `K = floor(batch_size × elite_fraction)`.
    ///
    /// ```
    /// # use cemplan_training::{ConfigError, cem::CemParams};
    /// let params = CemParams::default();
    /// assert_eq!(params.elite_count(), Ok(4));
    ///
    /// let params = CemParams { batch_size: 2, elite_fraction: 0.4, ..params };
    /// assert!(matches!(params.elite_count(), Err(ConfigError::ZeroElites { .. })));
    /// ```
    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn elite_count(&self) -> Result<usize, ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::EmptyBatch);
        }
        if !(self.elite_fraction > 0.0 && self.elite_fraction <= 1.0) {
            return Err(ConfigError::InvalidEliteFraction {
                elite_fraction: self.elite_fraction,
            });
        }
        let count = (self.batch_size as f64 * self.elite_fraction).floor() as usize;
        if count == 0 {
            return Err(ConfigError::ZeroElites {
                batch_size: self.batch_size,
                elite_fraction: self.elite_fraction,
            });
        }
        Ok(count)
    }

    /// Checks the parameters without running anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.elite_count().map(|_| ())
    }

    /// Worker threads for a batch: the configured count or the available parallelism,
    /// never more than the batch size.
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        let workers = self.workers.map_or_else(
            || thread::available_parallelism().map_or(1, NonZeroUsize::get),
            NonZeroUsize::get,
        );
        workers.min(self.batch_size).max(1)
    }
}

/// Failure of an optimization run.
///
/// Rollout failures are passed through unchanged as [`OptimizeError::Rollout`].
#[derive(Debug)]
pub enum OptimizeError<E> {
    InvalidConfiguration(ConfigError),
    Sample(SampleError),
    Rollout(E),
}

impl<E> OptimizeError<E> {
    #[must_use]
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_))
    }
}

impl<E> From<ConfigError> for OptimizeError<E> {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfiguration(err)
    }
}

impl<E> From<SampleError> for OptimizeError<E> {
    fn from(err: SampleError) -> Self {
        Self::Sample(err)
    }
}

impl<E> fmt::Display for OptimizeError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration(_) => f.write_str("invalid configuration"),
            Self::Sample(_) => f.write_str("failed to sample candidates"),
            Self::Rollout(_) => f.write_str("rollout failed"),
        }
    }
}

impl<E> Error for OptimizeError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidConfiguration(err) => Some(err),
            Self::Sample(err) => Some(err),
            Self::Rollout(err) => Some(err),
        }
    }
}

/// Everything observed during one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    /// Zero-based iteration number.
    pub iteration: usize,
    /// Sampled candidates, in sampling order.
    pub candidates: Vec<Vec<f32>>,
    /// Fitness of each candidate, aligned with `candidates`.
    pub fitness: Vec<f32>,
    /// Indices of the elite candidates, best first.
    pub elite_indices: Vec<usize>,
    /// Distribution refitted to the elites.
    pub state: DistributionState,
}

impl IterationRecord {
    /// Descriptive statistics of the batch fitness, ignoring NaN scores.
    #[must_use]
    pub fn fitness_stats(&self) -> Option<DescriptiveStats> {
        DescriptiveStats::new(self.fitness.iter().copied().filter(|f| !f.is_nan()))
    }

    /// Fitness of the best candidate of the batch.
    #[must_use]
    pub fn best_fitness(&self) -> Option<f32> {
        self.elite_indices.first().map(|&i| self.fitness[i])
    }

    /// Mean fitness of the elites.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn elite_mean_fitness(&self) -> Option<f32> {
        if self.elite_indices.is_empty() {
            return None;
        }
        let sum = self.elite_indices.iter().map(|&i| self.fitness[i]).sum::<f32>();
        Some(sum / self.elite_indices.len() as f32)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct CemOutcome {
    /// Final distribution; its mean is the learned parameter vector.
    pub state: DistributionState,
    /// One record per iteration, in order.
    pub history: Vec<IterationRecord>,
}

/// Ranks candidates by fitness and returns the indices of the best `k`.
///
/// The sort is stable and descending; NaN counts as the lowest possible score.
///
/// ```
/// # use cemplan_training::cem::select_elites;
/// assert_eq!(select_elites(&[1.0, 3.0, f32::NAN, 3.0, 2.0], 3), vec![1, 3, 4]);
/// ```
#[must_use]
pub fn select_elites(fitness: &[f32], k: usize) -> Vec<usize> {
    let mut order = (0..fitness.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| compare_fitness_desc(fitness[a], fitness[b]));
    order.truncate(k);
    order
}

fn compare_fitness_desc(a: f32, b: f32) -> Ordering {
    let rank = |v: f32| if v.is_nan() { f32::NEG_INFINITY } else { v };
    rank(b).partial_cmp(&rank(a)).unwrap_or(Ordering::Equal)
}

/// Scores every candidate, spreading the batch over `workers` scoped threads.
///
/// Scores come back in candidate order. On failure, the error of the first failing
/// chunk (in candidate order) is returned.
pub fn evaluate_batch<R>(
    evaluator: &R,
    candidates: &[Vec<f32>],
    workers: usize,
) -> Result<Vec<f32>, R::Error>
where
    R: RolloutEvaluator + ?Sized,
    R::Error: Send,
{
    if workers <= 1 || candidates.len() <= 1 {
        return candidates.iter().map(|c| evaluator.evaluate(c)).collect();
    }

    let chunk_size = candidates.len().div_ceil(workers);
    thread::scope(|s| {
        let handles = candidates
            .chunks(chunk_size)
            .map(|chunk| {
                s.spawn(move || {
                    chunk
                        .iter()
                        .map(|c| evaluator.evaluate(c))
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect::<Vec<_>>();

        let mut fitness = Vec::with_capacity(candidates.len());
        for handle in handles {
            match handle.join() {
                Ok(scores) => fitness.extend(scores?),
                Err(payload) => std::panic::resume_unwind(payload),
            }
        }
        Ok(fitness)
    })
}

/// Drives the sample/evaluate/select/refit loop one iteration at a time.
pub struct Optimizer<'a, S, R>
where
    S: ?Sized,
    R: ?Sized,
{
    params: CemParams,
    elite_count: usize,
    workers: usize,
    state: DistributionState,
    iteration: usize,
    sampler: &'a mut S,
    evaluator: &'a R,
}

impl<'a, S, R> Optimizer<'a, S, R>
where
    S: Sampler + ?Sized,
    R: RolloutEvaluator + ?Sized,
    R::Error: Send,
{
    /// Validates `params` and prepares a run starting from `initial`.
    ///
    /// Nothing is sampled or evaluated here.
    pub fn new(
        initial: DistributionState,
        params: CemParams,
        sampler: &'a mut S,
        evaluator: &'a R,
    ) -> Result<Self, ConfigError> {
        let elite_count = params.elite_count()?;
        Ok(Self {
            params,
            elite_count,
            workers: params.resolved_workers(),
            state: initial,
            iteration: 0,
            sampler,
            evaluator,
        })
    }

    #[must_use]
    pub fn params(&self) -> &CemParams {
        &self.params
    }

    #[must_use]
    pub fn elite_count(&self) -> usize {
        self.elite_count
    }

    /// Current distribution.
    #[must_use]
    pub fn state(&self) -> &DistributionState {
        &self.state
    }

    /// Iterations completed so far.
    #[must_use]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.iteration >= self.params.iterations
    }

    /// Runs one iteration and returns what happened in it.
    ///
    /// The current state is only replaced when the whole iteration succeeds.
    pub fn step(&mut self) -> Result<IterationRecord, OptimizeError<R::Error>> {
        let n = self.params.batch_size;
        let candidates = self
            .sampler
            .sample(self.state.mean(), self.state.std_dev(), n)?;
        check_batch(&candidates, n, self.state.shape().len())?;

        let fitness = evaluate_batch(self.evaluator, &candidates, self.workers)
            .map_err(OptimizeError::Rollout)?;

        let elite_indices = select_elites(&fitness, self.elite_count);
        let elites = elite_indices
            .iter()
            .map(|&i| candidates[i].as_slice())
            .collect::<Vec<_>>();
        let next = self.state.refit(&elites)?;

        let record = IterationRecord {
            iteration: self.iteration,
            candidates,
            fitness,
            elite_indices,
            state: next.clone(),
        };
        self.state = next;
        self.iteration += 1;

        tracing::debug!(
            iteration = record.iteration,
            best = record.best_fitness(),
            elite_mean = record.elite_mean_fitness(),
            mean_std_dev = self.state.mean_std_dev(),
            "iteration finished"
        );
        Ok(record)
    }

    /// Runs the remaining iterations, calling `observer` after each one.
    pub fn run_with<F>(mut self, mut observer: F) -> Result<CemOutcome, OptimizeError<R::Error>>
    where
        F: FnMut(&IterationRecord),
    {
        tracing::info!(
            iterations = self.params.iterations,
            batch_size = self.params.batch_size,
            elite_count = self.elite_count,
            workers = self.workers,
            parameters = self.state.shape().len(),
            "starting cross entropy optimization"
        );
        let mut history = Vec::with_capacity(self.params.iterations.saturating_sub(self.iteration));
        while !self.is_finished() {
            let record = self.step()?;
            observer(&record);
            history.push(record);
        }
        tracing::info!(
            best = history.last().and_then(IterationRecord::best_fitness),
            mean_std_dev = self.state.mean_std_dev(),
            "optimization finished"
        );
        Ok(CemOutcome {
            state: self.state,
            history,
        })
    }

    /// Runs the remaining iterations.
    pub fn run(self) -> Result<CemOutcome, OptimizeError<R::Error>> {
        self.run_with(|_| {})
    }
}

fn check_batch(candidates: &[Vec<f32>], n: usize, len: usize) -> Result<(), SampleError> {
    if candidates.len() != n {
        return Err(SampleError::WrongCount {
            expected: n,
            actual: candidates.len(),
        });
    }
    if let Some((candidate, c)) = candidates.iter().enumerate().find(|(_, c)| c.len() != len) {
        return Err(SampleError::WrongLength {
            candidate,
            expected: len,
            actual: c.len(),
        });
    }
    for (candidate, c) in candidates.iter().enumerate() {
        if let Some((index, &value)) = c.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(SampleError::NonFinite {
                candidate,
                index,
                value,
            });
        }
    }
    Ok(())
}

/// Runs the Cross Entropy Method from `initial` and returns the final distribution.
///
/// Fails with [`OptimizeError::InvalidConfiguration`] before any sampling when the
/// parameters select no elites.
pub fn optimize<S, R>(
    initial: DistributionState,
    params: &CemParams,
    sampler: &mut S,
    evaluator: &R,
) -> Result<CemOutcome, OptimizeError<R::Error>>
where
    S: Sampler + ?Sized,
    R: RolloutEvaluator + ?Sized,
    R::Error: Send,
{
    optimize_with(initial, params, sampler, evaluator, |_| {})
}

/// Like [`optimize`], calling `observer` after every iteration.
pub fn optimize_with<S, R, F>(
    initial: DistributionState,
    params: &CemParams,
    sampler: &mut S,
    evaluator: &R,
    observer: F,
) -> Result<CemOutcome, OptimizeError<R::Error>>
where
    S: Sampler + ?Sized,
    R: RolloutEvaluator + ?Sized,
    R::Error: Send,
    F: FnMut(&IterationRecord),
{
    Optimizer::new(initial, *params, sampler, evaluator)?.run_with(observer)
}

/// Draws a single parameter vector from `state`.
///
/// This is how a trained distribution is turned into one concrete policy for
/// evaluation.
pub fn best_candidate<S>(state: &DistributionState, sampler: &mut S) -> Result<Vec<f32>, SampleError>
where
    S: Sampler + ?Sized,
{
    let mut batch = sampler.sample(state.mean(), state.std_dev(), 1)?;
    check_batch(&batch, 1, state.shape().len())?;
    Ok(batch.swap_remove(0))
}
