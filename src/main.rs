use clap::Parser;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

mod builder;
mod cli;
mod config;
mod context;
mod error;
mod git;
mod handoff;
mod index;
mod resolver;
mod source;
mod template;

use builder::PromptBuilder;
use cli::Cli;
use config::Config;

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("claude-template")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("claude-template.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let work_dir = std::env::current_dir().context("Failed to determine current directory")?;
    let config = Config::load(cli.config.as_ref(), &work_dir)?;

    info!("Building prompt from '{}' in {}", cli.template_file, work_dir.display());

    let prompt = PromptBuilder::new(&work_dir, &config)
        .with_defines(cli.define.clone())
        .with_changes(cli.changed)
        .build(&cli.template_file, cli.additional_instructions.as_deref())
        .context(format!("Failed to build prompt from '{}'", cli.template_file))?;

    if cli.dry {
        println!("{}", prompt);
        return Ok(());
    }

    handoff::exec(&config.handoff, &prompt)
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    run(&cli)
}
