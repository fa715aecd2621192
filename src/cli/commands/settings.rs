use crate::config::Settings;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::*;

#[derive(Args)]
pub struct SettingsCommands {
    #[command(subcommand)]
    pub command: SettingsSubcommands,
}

#[derive(Subcommand)]
pub enum SettingsSubcommands {
    /// Show current settings
    Show,
    /// Print the settings file location
    Path,
    /// Set the value of a specific setting
    Set {
        /// Setting name
        name: String,
        /// Setting value (empty clears optional settings)
        value: String,
    },
    /// Reset all settings to default values
    Reset,
}

pub fn settings_command(args: SettingsCommands) -> Result<()> {
    match args.command {
        SettingsSubcommands::Show => {
            let settings = Settings::load()?;
            println!();
            println!("  {}", "Settings".bright_blue().bold());
            println!("  {}", "════════".bright_blue());
            for line in toml::to_string_pretty(&settings)?.lines() {
                println!("    {}", line);
            }
            println!();
        }
        SettingsSubcommands::Path => {
            println!("{}", Settings::config_path()?.display());
        }
        SettingsSubcommands::Set { name, value } => {
            let mut settings = Settings::load()?;
            settings.set(&name, &value)?;
            settings.save()?;
            println!("  {} {} = {}", "✓".bright_green(), name.cyan(), value.white());
        }
        SettingsSubcommands::Reset => {
            Settings::default().save()?;
            println!("  {}", "✓ Settings reset to defaults".bright_green());
        }
    }
    Ok(())
}
