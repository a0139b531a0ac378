use crate::StepError;

/// Episodic environment with a discrete action space.
///
/// Observations are flat `f32` vectors of [`Self::observation_size`] entries; actions
/// are indices in `0..action_count()`.
pub trait Simulator {
    /// Number of features in each observation.
    fn observation_size(&self) -> usize;

    /// Number of discrete actions.
    fn action_count(&self) -> usize;

    /// Starts a new episode and returns the initial observation.
    fn reset(&mut self) -> Vec<f32>;

    /// Like [`Self::reset`], but reseeds the environment first so that the initial
    /// state is reproducible.
    fn reset_with_seed(&mut self, seed: u64) -> Vec<f32>;

    /// Advances the episode by one action.
    fn step(&mut self, action: usize) -> Result<Transition, StepError>;
}

/// Outcome of a single [`Simulator::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation after the step.
    pub observation: Vec<f32>,
    /// Reward earned by the step.
    pub reward: f32,
    /// The task reached a terminal state (e.g. the pole fell).
    pub terminated: bool,
    /// The episode was cut off by the step limit.
    pub truncated: bool,
}

impl Transition {
    /// Returns whether the episode is over, either way.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Lifecycle of the current episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum EpisodeStatus {
    NotStarted,
    Running,
    Terminated,
    Truncated,
}

impl EpisodeStatus {
    /// Checks that a step may be taken in this status.
    pub(crate) fn ensure_running(self) -> Result<(), StepError> {
        match self {
            EpisodeStatus::Running => Ok(()),
            EpisodeStatus::NotStarted => Err(StepError::NotStarted),
            EpisodeStatus::Terminated | EpisodeStatus::Truncated => {
                Err(StepError::EpisodeFinished)
            }
        }
    }
}
