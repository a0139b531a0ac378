//! Linear policy over observations.
//!
//! A parameter vector θ of shape `(D, A)` is stored row-major, where `D` is the
//! observation size plus one bias row and `A` is the number of discrete actions:
//!
//! ```text
//! scores = observation · θ[0..D-1] + θ[D-1]
//! action = argmax(scores)
//! ```
//!
//! The policy is deterministic: ties go to the lowest action index and a NaN score
//! never wins over a number.

use serde::{Deserialize, Serialize};

/// Shape `(rows, cols)` of a policy parameter matrix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[display("({rows}, {cols})")]
pub struct ParamShape {
    /// Observation features plus one bias row.
    pub rows: usize,
    /// Discrete actions.
    pub cols: usize,
}

impl ParamShape {
    #[must_use]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Shape of a linear policy with bias for the given simulator dimensions.
    ///
    /// ```
    /// # use cemplan_evaluator::policy::ParamShape;
    /// // 4 observation features, 2 actions
    /// assert_eq!(ParamShape::for_simulator(4, 2), ParamShape::new(5, 2));
    /// ```
    #[must_use]
    pub const fn for_simulator(observation_size: usize, action_count: usize) -> Self {
        Self::new(observation_size + 1, action_count)
    }

    /// Number of entries in a flat parameter vector of this shape.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows * self.cols
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of observation features the shape accepts (rows without the bias).
    #[must_use]
    pub const fn observation_size(&self) -> usize {
        self.rows.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ShapeError {
    #[display("parameter shape {shape} needs a bias row and at least one action")]
    Degenerate { shape: ParamShape },
    #[display("parameter vector has {actual} entries, expected {} for shape {shape}", shape.len())]
    LengthMismatch { shape: ParamShape, actual: usize },
    #[display(
        "parameter shape {shape} does not fit a simulator with {observation_size} observation features and {action_count} actions"
    )]
    SimulatorMismatch {
        shape: ParamShape,
        observation_size: usize,
        action_count: usize,
    },
}

/// Deterministic linear policy with bias.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearPolicy {
    shape: ParamShape,
    weights: Vec<f32>,
}

impl LinearPolicy {
    /// Creates a policy from a flat row-major parameter vector.
    ///
    /// # Examples
    ///
    /// ```
    /// use cemplan_evaluator::policy::{LinearPolicy, ParamShape};
    ///
    /// // one observation feature, two actions
    /// let policy = LinearPolicy::new(
    ///     ParamShape::new(2, 2),
    ///     vec![
    ///         1.0, -1.0, // feature weights
    ///         0.0, 0.5, // bias
    ///     ],
    /// )
    /// .unwrap();
    /// assert_eq!(policy.action_scores(&[2.0]), vec![2.0, -1.5]);
    /// assert_eq!(policy.select_action(&[2.0]), 0);
    /// assert_eq!(policy.select_action(&[-2.0]), 1);
    /// ```
    pub fn new(shape: ParamShape, weights: Vec<f32>) -> Result<Self, ShapeError> {
        if shape.rows == 0 || shape.cols == 0 {
            return Err(ShapeError::Degenerate { shape });
        }
        if weights.len() != shape.len() {
            return Err(ShapeError::LengthMismatch {
                shape,
                actual: weights.len(),
            });
        }
        Ok(Self { shape, weights })
    }

    /// Like [`Self::new`], but copies the weights from a slice.
    pub fn from_slice(shape: ParamShape, weights: &[f32]) -> Result<Self, ShapeError> {
        Self::new(shape, weights.to_vec())
    }

    #[must_use]
    pub fn shape(&self) -> ParamShape {
        self.shape
    }

    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Computes `observation · W + b` for every action.
    ///
    /// # Panics
    ///
    /// Panics if `observation.len()` differs from the shape's observation size.
    #[must_use]
    pub fn action_scores(&self, observation: &[f32]) -> Vec<f32> {
        assert_eq!(
            observation.len(),
            self.shape.observation_size(),
            "observation size does not match the policy shape {}",
            self.shape
        );
        let cols = self.shape.cols;
        let (feature_rows, bias) = self.weights.split_at(observation.len() * cols);
        let mut scores = bias.to_vec();
        for (obs, row) in observation.iter().zip(feature_rows.chunks_exact(cols)) {
            for (score, w) in scores.iter_mut().zip(row) {
                *score += obs * w;
            }
        }
        scores
    }

    /// Selects the action with the highest score.
    ///
    /// # Panics
    ///
    /// Panics if `observation.len()` differs from the shape's observation size.
    #[must_use]
    pub fn select_action(&self, observation: &[f32]) -> usize {
        argmax(&self.action_scores(observation))
    }
}

/// Index of the first maximum; NaN entries are skipped unless every entry is NaN.
fn argmax(values: &[f32]) -> usize {
    let mut best: Option<(usize, f32)> = None;
    for (i, v) in values.iter().copied().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if b >= v => {}
            _ => best = Some((i, v)),
        }
    }
    best.map_or(0, |(i, _)| i)
}
