use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::Context as _;
use cemplan_env::{CartPole, CartPoleConfig};
use cemplan_evaluator::{
    policy::LinearPolicy,
    rollout_evaluator::{self, EpisodeEvaluator, EpisodeRecording},
};
use cemplan_training::{
    cem::{self, CemOutcome, CemParams, IterationRecord},
    distribution::{DistributionState, GaussianSampler},
};
use serde::{Deserialize, Serialize};

use crate::util;

const DEFAULT_MAX_STEPS: NonZeroUsize = NonZeroUsize::new(500).unwrap();

/// Everything a training run needs, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct TrainConfig {
    pub(crate) cem: CemParams,
    pub(crate) initial_mean: f32,
    pub(crate) initial_std_dev: f32,
    /// Seeds both candidate sampling and episode resets; random when unset.
    pub(crate) seed: Option<u64>,
    /// Episodes averaged into one fitness score.
    pub(crate) episodes: NonZeroUsize,
    /// Step limit of every episode.
    pub(crate) max_steps: NonZeroUsize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            cem: CemParams::default(),
            initial_mean: 0.0,
            initial_std_dev: 1.0,
            seed: None,
            episodes: NonZeroUsize::MIN,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct ConfigArg {
    /// Training configuration file (JSON); flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of iterations [default: 20]
    #[arg(long)]
    iterations: Option<usize>,
    /// Candidates sampled per iteration [default: 10]
    #[arg(long)]
    batch_size: Option<usize>,
    /// Share of each batch kept as elites [default: 0.4]
    #[arg(long)]
    elite_fraction: Option<f64>,
    /// Initial mean of every parameter [default: 0]
    #[arg(long, allow_hyphen_values = true)]
    initial_mean: Option<f32>,
    /// Initial standard deviation of every parameter [default: 1]
    #[arg(long)]
    initial_std_dev: Option<f32>,
    /// Seed for sampling and episode resets
    #[arg(long)]
    seed: Option<u64>,
    /// Episodes averaged into one fitness score [default: 1]
    #[arg(long)]
    episodes: Option<NonZeroUsize>,
    /// Step limit of every episode [default: 500]
    #[arg(long)]
    max_steps: Option<NonZeroUsize>,
    /// Rollout worker threads [default: available cores]
    #[arg(long)]
    workers: Option<NonZeroUsize>,
}

impl ConfigArg {
    /// Reads the configuration file, if any, and applies the flag overrides.
    pub(crate) fn load(&self) -> anyhow::Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => util::read_json_file("training config", path)?,
            None => TrainConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut TrainConfig) {
        let Self {
            config: _,
            iterations,
            batch_size,
            elite_fraction,
            initial_mean,
            initial_std_dev,
            seed,
            episodes,
            max_steps,
            workers,
        } = self;
        if let Some(iterations) = *iterations {
            config.cem.iterations = iterations;
        }
        if let Some(batch_size) = *batch_size {
            config.cem.batch_size = batch_size;
        }
        if let Some(elite_fraction) = *elite_fraction {
            config.cem.elite_fraction = elite_fraction;
        }
        if workers.is_some() {
            config.cem.workers = *workers;
        }
        if let Some(initial_mean) = *initial_mean {
            config.initial_mean = initial_mean;
        }
        if let Some(initial_std_dev) = *initial_std_dev {
            config.initial_std_dev = initial_std_dev;
        }
        if seed.is_some() {
            config.seed = *seed;
        }
        if let Some(episodes) = *episodes {
            config.episodes = episodes;
        }
        if let Some(max_steps) = *max_steps {
            config.max_steps = max_steps;
        }
    }
}

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    #[clap(flatten)]
    config: ConfigArg,
    /// Print the final report as JSON to stdout
    #[arg(long)]
    json: bool,
}

/// Result of training plus one evaluation episode of a policy sampled from it.
#[derive(Debug)]
pub(crate) struct TrainingRun {
    pub(crate) outcome: CemOutcome,
    pub(crate) candidate: Vec<f32>,
    pub(crate) evaluation: EpisodeRecording,
    pub(crate) cartpole: CartPoleConfig,
}

/// Trains a CartPole policy, calling `observer` after every iteration.
pub(crate) fn train<F>(config: &TrainConfig, observer: F) -> anyhow::Result<TrainingRun>
where
    F: FnMut(&IterationRecord),
{
    let cartpole = CartPoleConfig {
        max_steps: Some(config.max_steps.get()),
        ..CartPoleConfig::default()
    };
    let factory_config = cartpole.clone();
    let evaluator = EpisodeEvaluator::new(move || CartPole::from_config(factory_config.clone()))
        .with_episodes(config.episodes)
        .with_seed(config.seed);
    let shape = evaluator.param_shape();

    let initial =
        DistributionState::filled(shape, config.initial_mean, config.initial_std_dev)
            .context("Invalid initial distribution")?;
    let mut sampler = config
        .seed
        .map_or_else(GaussianSampler::new, GaussianSampler::with_seed);

    let outcome = cem::optimize_with(initial, &config.cem, &mut sampler, &evaluator, observer)
        .context("Training failed")?;

    let candidate = cem::best_candidate(&outcome.state, &mut sampler)
        .context("Failed to sample the evaluation candidate")?;
    let policy = LinearPolicy::from_slice(shape, &candidate)?;
    let mut simulator = evaluator.make_simulator();
    let evaluation =
        rollout_evaluator::play_episode_recorded(&mut simulator, &policy, evaluator.episode_seed(0))
            .context("Evaluation rollout failed")?;

    Ok(TrainingRun {
        outcome,
        candidate,
        evaluation,
        cartpole,
    })
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let TrainArg { config, json } = arg;
    let config = config.load()?;

    eprintln!(
        "Training CartPole policy: {} iterations, batch size {}, elite fraction {}",
        config.cem.iterations, config.cem.batch_size, config.cem.elite_fraction
    );
    let run = train(&config, print_iteration)?;

    let state = &run.outcome.state;
    eprintln!("Final distribution {}:", state.shape());
    eprintln!("  Mean:    {:.3?}", state.mean());
    eprintln!("  Std-dev: {:.3?}", state.std_dev());
    eprintln!("Evaluation candidate: {:.3?}", run.candidate);
    eprintln!("Evaluation rollout: {}", describe_episode(&run.evaluation));

    if *json {
        util::write_json_stdout(&TrainReport::new(&config, &run))?;
    }
    Ok(())
}

fn print_iteration(record: &IterationRecord) {
    eprintln!("Iteration #{}:", record.iteration);
    eprintln!("  Fitness: {:.1?}", record.fitness);
    if let Some(stats) = record.fitness_stats() {
        eprintln!(
            "  Min / Mean / Max: {:.1} / {:.1} / {:.1}",
            stats.min, stats.mean, stats.max
        );
    }
    eprintln!("  Elites:  {:?}", record.elite_indices);
    eprintln!("  Mean std-dev: {:.4}", record.state.mean_std_dev());
}

pub(crate) fn describe_episode(recording: &EpisodeRecording) -> String {
    let stats = &recording.stats;
    let ending = if stats.truncated {
        "reached the step limit"
    } else {
        "pole fell or cart left the track"
    };
    format!(
        "fitness {:.1} after {} steps ({ending})",
        stats.total_reward, stats.steps
    )
}

#[derive(Debug, Serialize)]
struct TrainReport<'a> {
    config: &'a TrainConfig,
    iterations: Vec<IterationReport<'a>>,
    distribution: &'a DistributionState,
    candidate: &'a [f32],
    evaluation: EvaluationReport,
}

#[derive(Debug, Serialize)]
struct IterationReport<'a> {
    iteration: usize,
    fitness: &'a [f32],
    elite_indices: &'a [usize],
    best_fitness: Option<f32>,
    mean_std_dev: f32,
}

#[derive(Debug, Serialize)]
struct EvaluationReport {
    total_reward: f32,
    steps: usize,
    terminated: bool,
    truncated: bool,
}

impl<'a> TrainReport<'a> {
    fn new(config: &'a TrainConfig, run: &'a TrainingRun) -> Self {
        let iterations = run
            .outcome
            .history
            .iter()
            .map(|record| IterationReport {
                iteration: record.iteration,
                fitness: &record.fitness,
                elite_indices: &record.elite_indices,
                best_fitness: record.best_fitness(),
                mean_std_dev: record.state.mean_std_dev(),
            })
            .collect();
        let stats = &run.evaluation.stats;
        Self {
            config,
            iterations,
            distribution: &run.outcome.state,
            candidate: &run.candidate,
            evaluation: EvaluationReport {
                total_reward: stats.total_reward,
                steps: stats.steps,
                terminated: stats.terminated,
                truncated: stats.truncated,
            },
        }
    }
}
