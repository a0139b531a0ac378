use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::{EpisodeStatus, Simulator, StepError, Transition};

/// Action index that pushes the cart to the left.
pub const PUSH_LEFT: usize = 0;
/// Action index that pushes the cart to the right.
pub const PUSH_RIGHT: usize = 1;

/// Physical constants and episode limits of [`CartPole`].
///
/// The defaults reproduce the classic v1 task: a 1.0 kg cart, a 0.1 kg pole of
/// half-length 0.5 m, ±10 N pushes, 20 ms Euler steps, failure beyond ±2.4 m or
/// ±12°, and a 500-step limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartPoleConfig {
    pub gravity: f64,
    pub cart_mass: f64,
    pub pole_mass: f64,
    /// Half of the pole length (distance from the pivot to the center of mass).
    pub pole_half_length: f64,
    pub force_magnitude: f64,
    /// Integration time step in seconds.
    pub tau: f64,
    /// Cart position beyond which the episode terminates.
    pub x_threshold: f64,
    /// Pole angle (radians) beyond which the episode terminates.
    pub theta_threshold: f64,
    /// Initial state variables are drawn uniformly from `[-reset_bound, reset_bound)`.
    pub reset_bound: f64,
    /// Episodes are truncated after this many steps; `None` disables truncation.
    pub max_steps: Option<usize>,
}

impl Default for CartPoleConfig {
    fn default() -> Self {
        Self {
            gravity: 9.8,
            cart_mass: 1.0,
            pole_mass: 0.1,
            pole_half_length: 0.5,
            force_magnitude: 10.0,
            tau: 0.02,
            x_threshold: 2.4,
            theta_threshold: 12.0_f64.to_radians(),
            reset_bound: 0.05,
            max_steps: Some(500),
        }
    }
}

impl CartPoleConfig {
    fn total_mass(&self) -> f64 {
        self.cart_mass + self.pole_mass
    }

    fn pole_mass_length(&self) -> f64 {
        self.pole_mass * self.pole_half_length
    }
}

/// Full physical state of the cart-pole system.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CartPoleState {
    /// Cart position (m).
    pub x: f64,
    /// Cart velocity (m/s).
    pub x_dot: f64,
    /// Pole angle from vertical (rad), positive when leaning right.
    pub theta: f64,
    /// Pole angular velocity (rad/s).
    pub theta_dot: f64,
}

impl CartPoleState {
    /// Observation vector `[x, x_dot, theta, theta_dot]`.
    #[expect(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn observation(&self) -> Vec<f32> {
        vec![
            self.x as f32,
            self.x_dot as f32,
            self.theta as f32,
            self.theta_dot as f32,
        ]
    }
}

/// Cart-pole balancing task.
///
/// A pole is attached by an unactuated joint to a cart moving along a frictionless
/// track. Each step pushes the cart left ([`PUSH_LEFT`]) or right ([`PUSH_RIGHT`]) and
/// earns a reward of `1.0`, including the step on which the pole falls or the cart
/// leaves the track.
#[derive(Debug, Clone)]
pub struct CartPole {
    config: CartPoleConfig,
    rng: Pcg32,
    state: CartPoleState,
    status: EpisodeStatus,
    steps: usize,
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new()
    }
}

impl CartPole {
    /// Observation feature count.
    pub const OBSERVATION_SIZE: usize = 4;
    /// Discrete action count.
    pub const ACTION_COUNT: usize = 2;

    /// Creates a cart-pole with default constants and a random seed.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(CartPoleConfig::default())
    }

    /// Creates a cart-pole with the given constants and a random seed.
    #[must_use]
    pub fn from_config(config: CartPoleConfig) -> Self {
        Self::with_config(config, rand::rng().random())
    }

    /// Like [`Self::new`], but with a specific seed for reproducible resets.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_config(CartPoleConfig::default(), seed)
    }

    #[must_use]
    pub fn with_config(config: CartPoleConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Pcg32::seed_from_u64(seed),
            state: CartPoleState::default(),
            status: EpisodeStatus::NotStarted,
            steps: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CartPoleConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> CartPoleState {
        self.state
    }

    #[must_use]
    pub fn status(&self) -> EpisodeStatus {
        self.status
    }

    /// Number of steps taken in the current episode.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Starts a new episode from an explicit state instead of a random one.
    pub fn reset_to(&mut self, state: CartPoleState) -> Vec<f32> {
        self.state = state;
        self.status = EpisodeStatus::Running;
        self.steps = 0;
        state.observation()
    }

    fn is_failed(&self) -> bool {
        let CartPoleState { x, theta, .. } = self.state;
        x.abs() > self.config.x_threshold || theta.abs() > self.config.theta_threshold
    }

    fn integrate(&mut self, force: f64) {
        let c = &self.config;
        let CartPoleState {
            x,
            x_dot,
            theta,
            theta_dot,
        } = self.state;
        let (sin_theta, cos_theta) = theta.sin_cos();

        let temp = (force + c.pole_mass_length() * theta_dot.powi(2) * sin_theta) / c.total_mass();
        let theta_acc = (c.gravity * sin_theta - cos_theta * temp)
            / (c.pole_half_length
                * (4.0 / 3.0 - c.pole_mass * cos_theta.powi(2) / c.total_mass()));
        let x_acc = temp - c.pole_mass_length() * theta_acc * cos_theta / c.total_mass();

        self.state = CartPoleState {
            x: x + c.tau * x_dot,
            x_dot: x_dot + c.tau * x_acc,
            theta: theta + c.tau * theta_dot,
            theta_dot: theta_dot + c.tau * theta_acc,
        };
    }
}

impl Simulator for CartPole {
    fn observation_size(&self) -> usize {
        Self::OBSERVATION_SIZE
    }

    fn action_count(&self) -> usize {
        Self::ACTION_COUNT
    }

    fn reset(&mut self) -> Vec<f32> {
        let bound = self.config.reset_bound;
        let mut sample = || {
            if bound > 0.0 {
                self.rng.random_range(-bound..bound)
            } else {
                0.0
            }
        };
        let state = CartPoleState {
            x: sample(),
            x_dot: sample(),
            theta: sample(),
            theta_dot: sample(),
        };
        self.reset_to(state)
    }

    fn reset_with_seed(&mut self, seed: u64) -> Vec<f32> {
        self.rng = Pcg32::seed_from_u64(seed);
        self.reset()
    }

    fn step(&mut self, action: usize) -> Result<Transition, StepError> {
        if action >= Self::ACTION_COUNT {
            return Err(StepError::InvalidAction {
                action,
                action_count: Self::ACTION_COUNT,
            });
        }
        self.status.ensure_running()?;

        let force = if action == PUSH_RIGHT {
            self.config.force_magnitude
        } else {
            -self.config.force_magnitude
        };
        self.integrate(force);
        self.steps += 1;

        let terminated = self.is_failed();
        let truncated = !terminated && self.config.max_steps.is_some_and(|max| self.steps >= max);
        self.status = if terminated {
            EpisodeStatus::Terminated
        } else if truncated {
            EpisodeStatus::Truncated
        } else {
            EpisodeStatus::Running
        };

        Ok(Transition {
            observation: self.state.observation(),
            reward: 1.0,
            terminated,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_step_before_reset_is_rejected() {
        let mut env = CartPole::with_seed(0);
        assert_eq!(env.step(PUSH_LEFT), Err(StepError::NotStarted));
    }

    #[test]
    fn test_invalid_action_is_rejected() {
        let mut env = CartPole::with_seed(0);
        env.reset();
        assert_eq!(
            env.step(2),
            Err(StepError::InvalidAction {
                action: 2,
                action_count: 2
            })
        );
        // the episode is still usable
        assert!(env.step(PUSH_RIGHT).is_ok());
    }

    #[test]
    fn test_reset_stays_within_bounds() {
        let mut env = CartPole::with_seed(123);
        for _ in 0..100 {
            let obs = env.reset();
            assert_eq!(obs.len(), CartPole::OBSERVATION_SIZE);
            assert!(obs.iter().all(|v| v.abs() <= 0.05));
            assert!(env.status().is_running());
            assert_eq!(env.steps(), 0);
        }
    }

    #[test]
    fn test_seeded_resets_are_reproducible() {
        let mut a = CartPole::with_seed(99);
        let mut b = CartPole::with_seed(1);
        assert_eq!(a.reset_with_seed(5), b.reset_with_seed(5));
        for _ in 0..10 {
            assert_eq!(a.step(PUSH_LEFT), b.step(PUSH_LEFT));
        }
    }

    #[test]
    fn test_push_right_from_rest() {
        let mut env = CartPole::with_seed(0);
        env.reset_to(CartPoleState::default());
        let transition = env.step(PUSH_RIGHT).unwrap();

        // temp = 10 / 1.1
        // theta_acc = -temp / (0.5 * (4/3 - 0.1 / 1.1))
        // x_acc = temp - 0.05 * theta_acc / 1.1
        let temp = 10.0 / 1.1;
        let theta_acc = -temp / (0.5 * (4.0 / 3.0 - 0.1 / 1.1));
        let x_acc = temp - 0.05 * theta_acc / 1.1;
        let state = env.state();
        assert_close(state.x, 0.0);
        assert_close(state.x_dot, 0.02 * x_acc);
        assert_close(state.theta, 0.0);
        assert_close(state.theta_dot, 0.02 * theta_acc);
        assert_eq!(transition.reward, 1.0);
        assert!(!transition.is_done());
    }

    #[test]
    fn test_constant_push_terminates_with_reward_on_final_step() {
        let mut env = CartPole::with_seed(3);
        env.reset();
        let mut total = 0.0;
        let mut last = None;
        for _ in 0..500 {
            let transition = env.step(PUSH_RIGHT).unwrap();
            total += transition.reward;
            let done = transition.is_done();
            last = Some(transition);
            if done {
                break;
            }
        }
        let last = last.unwrap();
        assert!(last.terminated);
        assert!(!last.truncated);
        assert!(env.status().is_terminated());
        assert!(total < 500.0);
        assert_eq!(env.step(PUSH_LEFT), Err(StepError::EpisodeFinished));
    }

    #[test]
    fn test_failure_thresholds() {
        let mut env = CartPole::with_seed(0);
        env.reset_to(CartPoleState {
            theta: 12.0_f64.to_radians() + 0.01,
            ..CartPoleState::default()
        });
        assert!(env.step(PUSH_LEFT).unwrap().terminated);

        env.reset_to(CartPoleState {
            x: 2.4,
            x_dot: 1.0,
            ..CartPoleState::default()
        });
        assert!(env.step(PUSH_RIGHT).unwrap().terminated);

        env.reset_to(CartPoleState {
            x: 2.3,
            ..CartPoleState::default()
        });
        assert!(!env.step(PUSH_LEFT).unwrap().terminated);
    }

    #[test]
    fn test_truncation_at_step_limit() {
        let config = CartPoleConfig {
            max_steps: Some(3),
            ..CartPoleConfig::default()
        };
        let mut env = CartPole::with_config(config, 0);
        env.reset_to(CartPoleState::default());
        assert!(!env.step(PUSH_LEFT).unwrap().is_done());
        assert!(!env.step(PUSH_RIGHT).unwrap().is_done());
        let last = env.step(PUSH_LEFT).unwrap();
        assert!(last.truncated);
        assert!(!last.terminated);
        assert!(env.status().is_truncated());
        assert_eq!(env.step(PUSH_LEFT), Err(StepError::EpisodeFinished));

        env.reset();
        assert!(env.step(PUSH_LEFT).is_ok());
    }

    #[test]
    fn test_unlimited_episode_is_never_truncated() {
        let config = CartPoleConfig {
            max_steps: None,
            ..CartPoleConfig::default()
        };
        let mut env = CartPole::with_config(config, 0);
        env.reset_to(CartPoleState::default());
        for i in 0..1000 {
            // alternate pushes keep the system near equilibrium for a while;
            // only termination may end the episode
            let transition = env.step(i % 2).unwrap();
            assert!(!transition.truncated);
            if transition.terminated {
                break;
            }
        }
    }

    #[test]
    fn test_config_json_fills_defaults() {
        let config: CartPoleConfig = serde_json::from_str(r#"{"max_steps": 200}"#).unwrap();
        assert_eq!(config.max_steps, Some(200));
        assert_eq!(config.force_magnitude, 10.0);

        let unlimited: CartPoleConfig = serde_json::from_str(r#"{"max_steps": null}"#).unwrap();
        assert_eq!(unlimited.max_steps, None);
    }
}
