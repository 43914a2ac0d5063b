//! Engine configuration file commands.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use ligature_config::{EngineConfig, default_config_path, ensure_user_config_dir};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a configuration file with default values
    Init {
        /// Target file (defaults to the user config path)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Parse and validate a configuration file
    Check {
        /// File to check (defaults to the user config path)
        path: Option<PathBuf>,
    },

    /// Show the user configuration path
    Path,
}

/// Run the config command.
pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Init { path, force } => {
            let path = resolve(path)?;
            init(&path, force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        ConfigCommand::Check { path } => {
            let path = path.unwrap_or_else(default_config_path);
            let config = EngineConfig::load(&path)?;
            println!("{}: ok", path.display());
            println!();
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", default_config_path().display());
            Ok(())
        }
    }
}

fn resolve(path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => {
            ensure_user_config_dir()?;
            Ok(default_config_path())
        }
    }
}

fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("'{}' already exists. Use --force to overwrite.", path.display());
    }
    EngineConfig::default().save(path)?;
    tracing::info!(path = %path.display(), "default config written");
    Ok(())
}
