use super::commands::provision::ProvisionCommands;
use super::commands::settings::SettingsCommands;
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "azure-provision")]
#[command(about = "Provision Azure infrastructure for a web application from an ARM template")]
#[command(version)]
pub struct Cli {
    /// Print debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (overrides --verbose)
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a resource group and deploy the template into it
    Provision(ProvisionCommands),
    /// Settings file management
    Settings(SettingsCommands),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl Cli {
    pub fn level_filter(&self) -> LevelFilter {
        match (self.log_level, self.verbose) {
            (Some(LogLevel::Debug), _) | (None, true) => LevelFilter::Debug,
            (Some(LogLevel::Info), _) | (None, false) => LevelFilter::Info,
            (Some(LogLevel::Warn), _) => LevelFilter::Warn,
            (Some(LogLevel::Error), _) => LevelFilter::Error,
        }
    }
}
