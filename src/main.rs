use clap::Parser;
use env_logger::Env;

use htr_ctc_trainer::{Args, TrainingConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = TrainingConfig::try_from(Args::parse())?;
    htr_ctc_trainer::train(&config)?;
    Ok(())
}
