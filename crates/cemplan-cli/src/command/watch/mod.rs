use crate::command::train::{self, ConfigArg};

use self::viewer::Viewer;

mod viewer;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct WatchArg {
    #[clap(flatten)]
    config: ConfigArg,
    /// Simulation steps shown per second at normal speed
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..=1000))]
    fps: u32,
}

pub(crate) fn run(arg: &WatchArg) -> anyhow::Result<()> {
    let WatchArg { config, fps } = arg;
    let config = config.load()?;

    eprintln!(
        "Training CartPole policy ({} iterations)...",
        config.cem.iterations
    );
    let run = train::train(&config, |_| {})?;
    eprintln!(
        "Evaluation rollout: {}",
        train::describe_episode(&run.evaluation)
    );

    let mut viewer = Viewer::new(run.evaluation, run.cartpole, *fps);
    ratatui::run(|terminal| viewer.run(terminal))?;

    Ok(())
}
