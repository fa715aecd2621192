use crate::auth::redact_secret;
use crate::config::{DockerAccess, ProvisionOptions, RunConfig, Settings};
use crate::provision::{BranchStatus, Pipeline, RunSummary, TemplateOrigin};
use anyhow::Result;
use clap::Args;
use colored::*;
use log::debug;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub struct ProvisionCommands {
    /// Subscription that will own the created resources
    #[arg(short, long = "subscription", env = "AZURE_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Organization to authenticate against; discovered from the subscription when omitted
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Service principal application id (requires --client-secret)
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Service principal secret (requires --client-id)
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Sign in interactively even if service principal credentials are set
    #[arg(long)]
    pub use_device_auth: bool,

    /// Azure cloud to target (AzurePublicCloud, AzureChinaCloud, ...)
    #[arg(short = 'a', long, env = "AZURE_ENVIRONMENT")]
    pub environment: Option<String>,

    /// ARM template URL or path; without it ./azuredeploy.json or the default link is used
    #[arg(short = 't', long = "rm-template")]
    pub template: Option<String>,

    /// Deployment parameters file [default: ./azuredeploy.parameters.json]
    #[arg(short = 'p', long = "rm-template-params")]
    pub parameters_file: Option<PathBuf>,

    /// Resource group to deploy into [default: the site name]
    #[arg(short, long)]
    pub resource_group: Option<String>,

    /// Region for a newly created resource group [default: centralus]
    #[arg(short, long)]
    pub location: Option<String>,

    /// Name of the site to create [default: buffalo-app-<random>]
    #[arg(short = 'n', long = "name")]
    pub site_name: Option<String>,

    /// Container image to run
    #[arg(short, long)]
    pub image: Option<String>,

    /// Database flavour: none, postgres or mysql
    #[arg(short = 'd', long = "db-type")]
    pub database_type: Option<String>,

    /// Database the application connects to
    #[arg(long = "db-name")]
    pub database_name: Option<String>,

    /// Database administrator login
    #[arg(long = "db-admin")]
    pub database_admin: Option<String>,

    /// Database administrator password [default: randomly generated]
    #[arg(short = 'w', long = "db-password", env = "BUFFALO_AZURE_DATABASE_PASSWORD", hide_env_values = true)]
    pub database_password: Option<String>,

    /// Whether the container registry is public or private
    #[arg(long = "docker-registry-access")]
    pub docker_access: Option<DockerAccess>,

    /// Private registry URL
    #[arg(long)]
    pub docker_registry_url: Option<String>,

    /// Private registry user
    #[arg(long)]
    pub docker_registry_username: Option<String>,

    /// Private registry password
    #[arg(long, env = "BUFFALO_AZURE_DOCKER_PASSWORD", hide_env_values = true)]
    pub docker_registry_password: Option<String>,

    /// Do not create a deployment, only write the caches
    #[arg(long)]
    pub skip_deployment: bool,

    /// Do not save the template used for deployment
    #[arg(long)]
    pub skip_template_cache: bool,

    /// Do not save the (sanitized) deployment parameters
    #[arg(short = 'y', long)]
    pub skip_parameters_cache: bool,

    /// Give up waiting after this many minutes [default: 45]
    #[arg(long)]
    pub deadline_minutes: Option<u64>,
}

impl From<ProvisionCommands> for ProvisionOptions {
    fn from(args: ProvisionCommands) -> Self {
        Self {
            subscription_id: args.subscription_id,
            tenant_id: args.tenant_id,
            client_id: args.client_id,
            client_secret: args.client_secret,
            use_device_auth: args.use_device_auth,
            environment: args.environment,
            template: args.template,
            parameters_file: args.parameters_file,
            resource_group: args.resource_group,
            location: args.location,
            site_name: args.site_name,
            image: args.image,
            database_type: args.database_type,
            database_name: args.database_name,
            database_admin: args.database_admin,
            database_password: args.database_password,
            docker_access: args.docker_access,
            docker_registry_url: args.docker_registry_url,
            docker_registry_username: args.docker_registry_username,
            docker_registry_password: args.docker_registry_password,
            skip_deployment: args.skip_deployment,
            skip_template_cache: args.skip_template_cache,
            skip_parameters_cache: args.skip_parameters_cache,
            deadline: args.deadline_minutes.map(|m| Duration::from_secs(m.saturating_mul(60))),
        }
    }
}

/// Run a provisioning pass. Returns whether the run succeeded.
pub async fn provision_command(args: ProvisionCommands, settings: &Settings) -> Result<bool> {
    let config = ProvisionOptions::from(args).into_run_config(settings).await?;
    log_selection(&config);

    println!();
    println!("  {}", "Azure provisioning".bright_blue().bold());
    println!("  {}", "══════════════════".bright_blue());
    println!("    {}: {}", "Subscription".dimmed(), config.subscription_id.white());
    println!("    {}: {}", "Resource group".dimmed(), config.resource_group.cyan());
    println!("    {}: {}", "Site".dimmed(), config.site_name.cyan());
    println!();

    let summary = Pipeline::new(&config).run().await?;
    print_summary(&config, &summary);

    Ok(summary.report.succeeded())
}

fn log_selection(config: &RunConfig) {
    debug!("tenant-id selected: {:?}", config.tenant_id);
    debug!("environment selected: {}", config.environment.name);
    if let Some(secret) = &config.client_secret {
        debug!("client-secret selected: {}", redact_secret(secret));
    }
    debug!("rm-template selected: {:?}", config.template);
    debug!("location selected: {}", config.location);
    debug!("deadline: {:?}", config.deadline);
}

fn print_summary(config: &RunConfig, summary: &RunSummary) {
    let report = &summary.report;

    if let TemplateOrigin::Bundled = summary.template_origin {
        println!("  {}", "⚠️  Default template unreachable, used the bundled copy".bright_yellow());
    }

    for (label, outcome) in [
        ("Template cache", &report.template_cache),
        ("Parameters cache", &report.parameters_cache),
    ] {
        match outcome {
            Ok(BranchStatus::Completed(path)) => {
                println!("  {} {} {}", "✓".bright_green(), label, path.display().to_string().dimmed());
            }
            Ok(BranchStatus::Skipped) => {
                println!("  {} {} {}", "○".dimmed(), label, "skipped".dimmed());
            }
            Err(e) => {
                println!("  {} {}: {}", "⚠️ ".bright_yellow(), label, e.to_string().yellow());
            }
        }
    }

    match &report.deployment {
        Ok(BranchStatus::Completed(outcome)) => {
            if outcome.resource_group_created {
                println!("  {} Created resource group {}", "✓".bright_green(), config.resource_group.cyan());
            }
            println!("  {}", "✓ Deployment succeeded".bright_green().bold());
            println!("    {}: {}", "Resources".dimmed(), summary.portal_url.cyan());
            println!("    {}: {}", "Site".dimmed(), summary.site_url.cyan());
        }
        Ok(BranchStatus::Skipped) => {
            println!("  {} Deployment {}", "○".dimmed(), "skipped".dimmed());
        }
        Err(e) => {
            println!("  {} {}", "✗ Deployment failed:".bright_red().bold(), e.to_string().red());
            println!(
                "  {}",
                "Some assets may have been created; check the portal before retrying:".bright_yellow()
            );
            println!("    {}", summary.portal_url.cyan());
        }
    }

    if report.cancelled() {
        println!();
        println!(
            "  {}",
            format!("Deadline of {:?} expired before every task finished", config.deadline).bright_red()
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_flags_map_onto_options() {
        let cli = Cli::parse_from([
            "azure-provision",
            "provision",
            "--subscription",
            "sub",
            "--rm-template",
            "https://example.com/t.json",
            "-r",
            "demo-rg",
            "--db-type",
            "postgres",
            "--docker-registry-access",
            "private",
            "--skip-deployment",
            "--deadline-minutes",
            "2",
        ]);
        let Commands::Provision(args) = cli.command else {
            panic!("expected provision");
        };

        let options = ProvisionOptions::from(args);
        assert_eq!(options.subscription_id.as_deref(), Some("sub"));
        assert_eq!(options.template.as_deref(), Some("https://example.com/t.json"));
        assert_eq!(options.resource_group.as_deref(), Some("demo-rg"));
        assert_eq!(options.docker_access, Some(DockerAccess::Private));
        assert!(options.skip_deployment);
        assert_eq!(options.deadline, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_rejects_unknown_registry_access() {
        let result = Cli::try_parse_from([
            "azure-provision",
            "provision",
            "--docker-registry-access",
            "shared",
        ]);
        assert!(result.is_err());
    }
}
