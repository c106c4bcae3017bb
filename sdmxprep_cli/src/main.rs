mod cli;
mod display;
mod error;
mod prompt;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, RunCommand};
use log::debug;
use sdmxprep::config::Config;

const DEFAULT_LOGGING_LEVEL: &str = "warn";
const VERBOSE_LOGGING_LEVEL: &str = "info";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let config = read_config_from_yaml(args.config.as_deref())?;

    // RUST_LOG wins; otherwise the config's verbosity decides
    if std::env::var("RUST_LOG").is_err() {
        let level = if config.verbose {
            VERBOSE_LOGGING_LEVEL
        } else {
            DEFAULT_LOGGING_LEVEL
        };
        std::env::set_var("RUST_LOG", level);
    }
    pretty_env_logger::init_timed();
    debug!("args: {args:?}");
    debug!("config: {config:?}");

    if let Some(command) = args.command {
        command.run(config).await?;
    }
    Ok(())
}

fn default_config_path() -> Result<PathBuf> {
    // Linux: ~/.config/sdmxprep/config.yml
    Ok(dirs::config_dir()
        .context("No configuration directory for this platform; pass --config")?
        .join("sdmxprep")
        .join("config.yml"))
}

/// Reads the YAML config at `path`, or the default location when no path is given. A missing
/// default file gives the default config, which then fails validation naming the first missing
/// key.
fn read_config_from_yaml(path: Option<&Path>) -> Result<Config> {
    let file_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    match std::fs::read_to_string(&file_path) {
        Ok(contents) => Ok(Config::from_yaml_str(&contents)
            .with_context(|| format!("Invalid config file {}", file_path.display()))?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && path.is_none() => {
            Ok(Config::default())
        }
        Err(e) => {
            Err(e).with_context(|| format!("Error reading config file {}", file_path.display()))
        }
    }
}
