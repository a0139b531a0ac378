//! Rollout evaluation: fitness functions for training.
//!
//! A rollout plays one complete episode in a [`Simulator`] with a [`LinearPolicy`] built
//! from a candidate parameter vector, and sums the per-step rewards. The optimizer uses
//! that sum as the candidate's fitness (higher is better).
//!
//! # Seeding
//!
//! [`EpisodeEvaluator`] creates a fresh simulator for every rollout, so rollouts share no
//! state and can run on any thread. With a seed configured, episode `k` of every rollout
//! starts from `reset_with_seed(seed + k)`: all candidates then face the same initial
//! states and repeated evaluations return identical scores. Without a seed, the initial
//! state comes from the simulator's own generator.
//!
//! # Usage
//!
//! ```
//! use std::num::NonZeroUsize;
//!
//! use cemplan_env::CartPole;
//! use cemplan_evaluator::rollout_evaluator::{EpisodeEvaluator, RolloutEvaluator as _};
//!
//! let evaluator = EpisodeEvaluator::new(CartPole::new)
//!     .with_episodes(NonZeroUsize::new(3).unwrap())
//!     .with_seed(Some(0));
//! let candidate = vec![0.0; evaluator.param_shape().len()];
//! let a = evaluator.evaluate(&candidate).unwrap();
//! let b = evaluator.evaluate(&candidate).unwrap();
//! assert_eq!(a, b);
//! ```

use std::{fmt, num::NonZeroUsize};

use cemplan_env::{Simulator, StepError, Transition};

use crate::policy::{LinearPolicy, ParamShape, ShapeError};

/// Computes the fitness of a candidate parameter vector.
///
/// Implemented for every `Fn(&[f32]) -> Result<f32, E> + Sync`, so deterministic stubs
/// can replace simulation:
///
/// ```
/// use std::convert::Infallible;
///
/// use cemplan_evaluator::rollout_evaluator::RolloutEvaluator;
///
/// let sum = |c: &[f32]| Ok::<f32, Infallible>(c.iter().sum());
/// assert_eq!(sum.evaluate(&[1.0, 2.0]), Ok(3.0));
/// ```
pub trait RolloutEvaluator: Sync {
    /// Failure reported by the underlying simulation.
    type Error;

    /// Evaluates a candidate and returns its fitness (higher is better).
    fn evaluate(&self, candidate: &[f32]) -> Result<f32, Self::Error>;
}

impl<F, E> RolloutEvaluator for F
where
    F: Fn(&[f32]) -> Result<f32, E> + Sync,
{
    type Error = E;

    fn evaluate(&self, candidate: &[f32]) -> Result<f32, E> {
        self(candidate)
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error, derive_more::From,
)]
pub enum RolloutError {
    #[display("invalid candidate parameters")]
    Shape(#[error(source)] ShapeError),
    #[display("simulation step failed")]
    Step(#[error(source)] StepError),
}

/// Outcome of a single episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeStats {
    /// Sum of per-step rewards.
    pub total_reward: f32,
    /// Steps taken.
    pub steps: usize,
    /// The episode ended in a terminal state.
    pub terminated: bool,
    /// The episode was cut off by the step limit.
    pub truncated: bool,
}

/// A single recorded step of an episode.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStep {
    pub action: usize,
    pub transition: Transition,
}

/// An episode with every observation kept, for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecording {
    pub initial_observation: Vec<f32>,
    pub steps: Vec<RecordedStep>,
    pub stats: EpisodeStats,
}

impl EpisodeRecording {
    /// Observation after `step` steps (`0` is the initial observation).
    #[must_use]
    pub fn observation(&self, step: usize) -> Option<&[f32]> {
        match step {
            0 => Some(&self.initial_observation),
            n => self.steps.get(n - 1).map(|s| s.transition.observation.as_slice()),
        }
    }
}

fn check_fits<S>(simulator: &S, policy: &LinearPolicy) -> Result<(), ShapeError>
where
    S: Simulator + ?Sized,
{
    let shape = policy.shape();
    let expected = ParamShape::for_simulator(simulator.observation_size(), simulator.action_count());
    if shape != expected {
        return Err(ShapeError::SimulatorMismatch {
            shape,
            observation_size: simulator.observation_size(),
            action_count: simulator.action_count(),
        });
    }
    Ok(())
}

fn run_episode<S, F>(
    simulator: &mut S,
    policy: &LinearPolicy,
    seed: Option<u64>,
    mut on_step: F,
) -> Result<(Vec<f32>, EpisodeStats), RolloutError>
where
    S: Simulator + ?Sized,
    F: FnMut(usize, &Transition),
{
    check_fits(simulator, policy)?;

    let initial = match seed {
        Some(seed) => simulator.reset_with_seed(seed),
        None => simulator.reset(),
    };
    let mut stats = EpisodeStats {
        total_reward: 0.0,
        steps: 0,
        terminated: false,
        truncated: false,
    };
    let mut action = policy.select_action(&initial);
    loop {
        let transition = simulator.step(action)?;
        stats.total_reward += transition.reward;
        stats.steps += 1;
        on_step(action, &transition);
        if transition.is_done() {
            stats.terminated = transition.terminated;
            stats.truncated = transition.truncated;
            break;
        }
        action = policy.select_action(&transition.observation);
    }
    Ok((initial, stats))
}

/// Plays one episode to termination or truncation and returns its statistics.
///
/// The simulator is reset first, with `seed` when given.
pub fn play_episode<S>(
    simulator: &mut S,
    policy: &LinearPolicy,
    seed: Option<u64>,
) -> Result<EpisodeStats, RolloutError>
where
    S: Simulator + ?Sized,
{
    run_episode(simulator, policy, seed, |_, _| {}).map(|(_, stats)| stats)
}

/// Like [`play_episode`], but keeps every step for later replay.
pub fn play_episode_recorded<S>(
    simulator: &mut S,
    policy: &LinearPolicy,
    seed: Option<u64>,
) -> Result<EpisodeRecording, RolloutError>
where
    S: Simulator + ?Sized,
{
    let mut steps = vec![];
    let (initial_observation, stats) = run_episode(simulator, policy, seed, |action, t| {
        steps.push(RecordedStep {
            action,
            transition: t.clone(),
        });
    })?;
    Ok(EpisodeRecording {
        initial_observation,
        steps,
        stats,
    })
}

/// Evaluates candidates by playing episodes in freshly created simulators.
pub struct EpisodeEvaluator<F> {
    make_simulator: F,
    shape: ParamShape,
    episodes: NonZeroUsize,
    seed: Option<u64>,
}

impl<F> fmt::Debug for EpisodeEvaluator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpisodeEvaluator")
            .field("shape", &self.shape)
            .field("episodes", &self.episodes)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl<F, S> EpisodeEvaluator<F>
where
    F: Fn() -> S,
    S: Simulator,
{
    /// Creates an evaluator playing one unseeded episode per rollout.
    ///
    /// `make_simulator` is called once here to learn the parameter shape, and once
    /// per episode afterwards.
    pub fn new(make_simulator: F) -> Self {
        let probe = make_simulator();
        let shape = ParamShape::for_simulator(probe.observation_size(), probe.action_count());
        Self {
            make_simulator,
            shape,
            episodes: NonZeroUsize::MIN,
            seed: None,
        }
    }

    /// Sets how many episodes are averaged into one fitness score.
    #[must_use]
    pub fn with_episodes(self, episodes: NonZeroUsize) -> Self {
        Self { episodes, ..self }
    }

    /// Sets the base seed for episode resets.
    #[must_use]
    pub fn with_seed(self, seed: Option<u64>) -> Self {
        Self { seed, ..self }
    }

    /// Shape of the parameter vectors this evaluator accepts.
    #[must_use]
    pub fn param_shape(&self) -> ParamShape {
        self.shape
    }

    #[must_use]
    pub fn episodes(&self) -> NonZeroUsize {
        self.episodes
    }

    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Creates a simulator from the configured factory.
    pub fn make_simulator(&self) -> S {
        (self.make_simulator)()
    }

    /// Seed used for the reset of episode `episode`.
    #[must_use]
    pub fn episode_seed(&self, episode: usize) -> Option<u64> {
        self.seed.map(|seed| seed.wrapping_add(episode as u64))
    }

    /// Plays every configured episode with `candidate` and returns their statistics.
    pub fn play_episodes(&self, candidate: &[f32]) -> Result<Vec<EpisodeStats>, RolloutError> {
        let policy = LinearPolicy::from_slice(self.shape, candidate)?;
        (0..self.episodes.get())
            .map(|episode| {
                let mut simulator = self.make_simulator();
                play_episode(&mut simulator, &policy, self.episode_seed(episode))
            })
            .collect()
    }
}

impl<F, S> RolloutEvaluator for EpisodeEvaluator<F>
where
    F: Fn() -> S + Sync,
    S: Simulator,
{
    type Error = RolloutError;

    #[expect(clippy::cast_precision_loss)]
    fn evaluate(&self, candidate: &[f32]) -> Result<f32, RolloutError> {
        let episodes = self.play_episodes(candidate)?;
        let total = episodes.iter().map(|e| e.total_reward).sum::<f32>();
        let fitness = total / episodes.len() as f32;
        tracing::trace!(
            fitness,
            episodes = episodes.len(),
            steps = episodes.iter().map(|e| e.steps).sum::<usize>(),
            "rollout finished"
        );
        Ok(fitness)
    }
}

#[cfg(test)]
mod tests {
    use cemplan_env::{CartPole, CartPoleConfig, PUSH_RIGHT};

    use super::*;

    /// Policy that always pushes right (bias only).
    fn push_right_policy() -> LinearPolicy {
        let mut weights = vec![0.0; 8];
        weights.extend([0.0, 1.0]);
        LinearPolicy::new(ParamShape::new(5, 2), weights).unwrap()
    }

    /// Policy that pushes toward the side the pole leans to.
    fn balancing_params() -> Vec<f32> {
        vec![
            0.0, 0.0, //
            0.0, 0.0, //
            -1.0, 1.0, // theta
            -1.0, 1.0, // theta_dot
            0.0, 0.0,
        ]
    }

    #[test]
    fn test_episode_reward_counts_every_step() {
        let mut env = CartPole::with_seed(0);
        let stats = play_episode(&mut env, &push_right_policy(), Some(1)).unwrap();
        assert!(stats.terminated);
        assert!(!stats.truncated);
        #[expect(clippy::cast_precision_loss)]
        let steps = stats.steps as f32;
        assert_eq!(stats.total_reward, steps);
        assert!(stats.steps < 500);
    }

    #[test]
    fn test_balancing_policy_reaches_step_limit() {
        let config = CartPoleConfig {
            max_steps: Some(200),
            ..CartPoleConfig::default()
        };
        let mut env = CartPole::with_config(config, 0);
        let policy = LinearPolicy::new(ParamShape::new(5, 2), balancing_params()).unwrap();
        let stats = play_episode(&mut env, &policy, Some(7)).unwrap();
        assert!(stats.truncated);
        assert_eq!(stats.steps, 200);
        assert_eq!(stats.total_reward, 200.0);
    }

    #[test]
    fn test_recording_matches_stats() {
        let mut env = CartPole::with_seed(0);
        let recording = play_episode_recorded(&mut env, &push_right_policy(), Some(4)).unwrap();
        assert_eq!(recording.steps.len(), recording.stats.steps);
        assert!(recording.steps.iter().all(|s| s.action == PUSH_RIGHT));
        assert_eq!(recording.observation(0), Some(&recording.initial_observation[..]));
        assert!(recording.observation(recording.steps.len()).is_some());
        assert!(recording.observation(recording.steps.len() + 1).is_none());
        assert!(recording.steps.last().unwrap().transition.terminated);

        // replaying from the same seed reproduces the episode
        let mut other = CartPole::with_seed(123);
        let replay = play_episode_recorded(&mut other, &push_right_policy(), Some(4)).unwrap();
        assert_eq!(recording, replay);
    }

    #[test]
    fn test_policy_must_fit_simulator() {
        let mut env = CartPole::with_seed(0);
        let policy = LinearPolicy::new(ParamShape::new(3, 2), vec![0.0; 6]).unwrap();
        let err = play_episode(&mut env, &policy, None).unwrap_err();
        assert_eq!(
            err,
            RolloutError::Shape(ShapeError::SimulatorMismatch {
                shape: ParamShape::new(3, 2),
                observation_size: 4,
                action_count: 2,
            })
        );
    }

    #[test]
    fn test_evaluator_rejects_wrong_length_candidate() {
        let evaluator = EpisodeEvaluator::new(CartPole::new);
        let err = evaluator.evaluate(&[0.0; 4]).unwrap_err();
        assert!(matches!(
            err,
            RolloutError::Shape(ShapeError::LengthMismatch { actual: 4, .. })
        ));
    }

    #[test]
    fn test_seeded_evaluator_is_reproducible() {
        let evaluator = EpisodeEvaluator::new(CartPole::new)
            .with_episodes(NonZeroUsize::new(4).unwrap())
            .with_seed(Some(11));
        let candidate = [0.3, -0.2, 0.1, 0.4, -0.5, 0.6, 0.2, 0.9, 0.0, 0.1];
        let first = evaluator.play_episodes(&candidate).unwrap();
        let second = evaluator.play_episodes(&candidate).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);

        #[expect(clippy::cast_precision_loss)]
        let mean = first.iter().map(|e| e.total_reward).sum::<f32>() / first.len() as f32;
        assert_eq!(evaluator.evaluate(&candidate).unwrap(), mean);
    }

    #[test]
    fn test_episode_seeds_are_offset_from_base() {
        let evaluator = EpisodeEvaluator::new(CartPole::new).with_seed(Some(u64::MAX));
        assert_eq!(evaluator.episode_seed(0), Some(u64::MAX));
        assert_eq!(evaluator.episode_seed(1), Some(0));
        let unseeded = EpisodeEvaluator::new(CartPole::new);
        assert_eq!(unseeded.episode_seed(3), None);
    }

    #[test]
    fn test_step_errors_propagate() {
        /// Simulator that rejects every action.
        struct Broken;

        impl Simulator for Broken {
            fn observation_size(&self) -> usize {
                1
            }
            fn action_count(&self) -> usize {
                1
            }
            fn reset(&mut self) -> Vec<f32> {
                vec![0.0]
            }
            fn reset_with_seed(&mut self, _seed: u64) -> Vec<f32> {
                self.reset()
            }
            fn step(&mut self, _action: usize) -> Result<Transition, StepError> {
                Err(StepError::EpisodeFinished)
            }
        }

        let evaluator = EpisodeEvaluator::new(|| Broken);
        assert_eq!(
            evaluator.evaluate(&[0.0, 0.0]),
            Err(RolloutError::Step(StepError::EpisodeFinished))
        );
    }
}
