//! Evaluation of parameter vectors: from weights to fitness scores.
//!
//! This crate turns a flat parameter vector into behavior and behavior into a scalar
//! fitness, in two levels:
//!
//! 1. **Policy** ([`policy`]) - Interprets a parameter vector as the weights of a linear
//!    policy and selects the action with the highest affine score for each observation.
//!
//! 2. **Rollout Evaluation** ([`rollout_evaluator`]) - Plays complete episodes in a
//!    [`Simulator`](cemplan_env::Simulator) with that policy and reports the summed
//!    reward as the candidate's fitness.
//!
//! # Architecture
//!
//! ```text
//! Rollout Evaluation (fitness for training)
//!     ↓ uses
//! Linear Policy (select action per step)
//!     ↓ acts in
//! Simulator (reset / step)
//! ```
//!
//! The optimizer in `cemplan-training` only sees the [`RolloutEvaluator`] trait, so any
//! `Fn(&[f32]) -> Result<f32, E>` closure can stand in for a real simulation.
//!
//! # Example
//!
//! ```
//! use cemplan_env::CartPole;
//! use cemplan_evaluator::{
//!     policy::ParamShape,
//!     rollout_evaluator::{EpisodeEvaluator, RolloutEvaluator as _},
//! };
//!
//! let evaluator = EpisodeEvaluator::new(|| CartPole::with_seed(0)).with_seed(Some(42));
//! let shape = evaluator.param_shape();
//! assert_eq!(shape, ParamShape::new(5, 2));
//!
//! let fitness = evaluator.evaluate(&vec![0.0; shape.len()]).unwrap();
//! assert!(fitness >= 1.0);
//! ```
//!
//! [`RolloutEvaluator`]: rollout_evaluator::RolloutEvaluator

pub mod policy;
pub mod rollout_evaluator;
