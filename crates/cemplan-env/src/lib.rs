//! Simulation environments for episodic control tasks.
//!
//! This crate provides the environment side of the planner:
//!
//! - [`Simulator`] - reset/step interface every environment implements
//! - [`Transition`] - result of a single step (observation, reward, end flags)
//! - [`CartPole`] - the classic cart-pole balancing task (v1 dynamics)
//! - [`CartPoleConfig`] - physical constants, thresholds and the step limit
//!
//! # Episode Flow
//!
//! 1. Call [`Simulator::reset`] (or [`Simulator::reset_with_seed`]) to start an episode
//! 2. Call [`Simulator::step`] with a discrete action until the transition reports
//!    termination or truncation
//! 3. Reset again before the next episode; stepping a finished episode is an error
//!
//! # Example
//!
//! ```
//! use cemplan_env::{CartPole, Simulator as _};
//!
//! let mut env = CartPole::with_seed(7);
//! let _obs = env.reset();
//! let mut total_reward = 0.0;
//! loop {
//!     let transition = env.step(1).unwrap();
//!     total_reward += transition.reward;
//!     if transition.is_done() {
//!         break;
//!     }
//! }
//! assert!(total_reward >= 1.0);
//! ```

pub use self::{cartpole::*, simulator::*};

mod cartpole;
mod simulator;

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum StepError {
    #[display("action {action} is out of range (action count: {action_count})")]
    InvalidAction { action: usize, action_count: usize },
    #[display("episode has not been started; call reset first")]
    NotStarted,
    #[display("episode already finished; call reset before stepping")]
    EpisodeFinished,
}
