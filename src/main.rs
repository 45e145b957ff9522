mod cli;
mod execute;

use clap::Parser;
use updatekit::Config;
use crate::cli::CLI;
use anyhow::Result;

fn main() -> Result<()> {
    let cli = CLI::parse();
    let config = Config::load_from_optional_path(cli.config.as_deref())?;
    let level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    execute::execute(cli, &config)
}
