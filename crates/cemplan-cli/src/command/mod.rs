use clap::{Parser, Subcommand};

use crate::util;

use self::{train::TrainArg, watch::WatchArg};

mod train;
mod watch;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Train a CartPole policy with the Cross Entropy Method
    Train(#[clap(flatten)] TrainArg),
    /// Train quietly, then replay the evaluation episode in a terminal viewer
    Watch(#[clap(flatten)] WatchArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    util::init_tracing(args.verbose);
    match args.mode.unwrap_or(Mode::Train(TrainArg::default())) {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Watch(arg) => watch::run(&arg)?,
    }
    Ok(())
}
