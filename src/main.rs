use anyhow::Result;
use azure_provision::cli::commands::{provision_command, settings_command};
use azure_provision::cli::{Cli, Commands};
use azure_provision::config::Settings;
use clap::Parser;
use is_terminal::IsTerminal;
use log::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    // .env values bind to flags through their environment variables
    let dotenv = dotenvy::dotenv().ok();

    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.level_filter())
        .parse_default_env()
        .init();

    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    info!("Starting azure-provision {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = dotenv {
        debug!("Loaded environment from {:?}", path);
    }

    let succeeded = match cli.command {
        Commands::Provision(args) => {
            let settings = Settings::load()?;
            provision_command(args, &settings).await?
        }
        Commands::Settings(args) => {
            settings_command(args)?;
            true
        }
    };

    if !succeeded {
        std::process::exit(1);
    }

    Ok(())
}
