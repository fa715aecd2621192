//! Settings file and the immutable per-run configuration
//!
//! [`Settings`] is the optional `config.toml` users keep between runs.
//! [`ProvisionOptions`] is what the command line collected. Together they
//! resolve, once, into a [`RunConfig`] that every stage borrows.

use crate::api::constants;
use crate::api::environment::{CloudEnvironment, DEFAULT_ENVIRONMENT};
use crate::auth::select_credentials;
use crate::deadline::{DEFAULT_DEADLINE, MAX_DEADLINE};
use crate::error::Error;
use crate::provision::acquire::TemplateDefaults;
use crate::provision::invoker::DEFAULT_POLL_INTERVAL;
use crate::provision::parameters::{
    DeploymentParameters, generate_password, generate_site_name, keys, validate_resource_group_name,
};
use crate::provision::policy::FetchPolicy;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TEMPLATE_PATH: &str = "./azuredeploy.json";
pub const DEFAULT_TEMPLATE_LINK: &str = "https://aka.ms/buffalo-template";
pub const DEFAULT_PARAMETERS_PATH: &str = "./azuredeploy.parameters.json";
pub const DEFAULT_LOCATION: &str = "centralus";
pub const DEFAULT_DATABASE_ADMIN: &str = "buffaloAdmin";
pub const DEFAULT_IMAGE: &str = "appsvc/sample-hello-world:latest";
pub const NO_DATABASE: &str = "none";

/// Name under which every run's deployment is recorded
pub const DEPLOYMENT_NAME: &str = "buffalo-app";

const APP_DIR: &str = "azure-provision";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: Option<String>,
    pub location: Option<String>,
    pub deadline_minutes: u64,
    pub poll_interval_secs: u64,
    pub template_link: Option<String>,
    pub max_redirects: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub user_agent_suffix: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let fetch = FetchPolicy::default();
        Self {
            environment: None,
            location: None,
            deadline_minutes: DEFAULT_DEADLINE.as_secs() / 60,
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            template_link: None,
            max_redirects: fetch.max_redirects,
            max_retries: fetch.max_retries,
            retry_delay_ms: fetch.base_delay.as_millis() as u64,
            user_agent_suffix: None,
        }
    }
}

impl Settings {
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "linux") {
            dirs::config_dir()
                .context("Failed to get XDG config directory")?
                .join(APP_DIR)
        } else {
            dirs::home_dir()
                .context("Failed to get home directory")?
                .join(format!(".{}", APP_DIR))
        };

        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// A missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading settings from: {:?}", path);

        if !path.exists() {
            debug!("Settings file doesn't exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;

        let settings: Self =
            toml::from_str(&content).with_context(|| format!("Failed to parse settings file: {:?}", path))?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings file: {:?}", path))?;
        Ok(settings)
    }

    /// Counts and intervals must be at least 1; the deadline is also capped
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("deadline_minutes", self.deadline_minutes),
            ("poll_interval_secs", self.poll_interval_secs),
            ("max_redirects", u64::from(self.max_redirects)),
            ("max_retries", u64::from(self.max_retries)),
        ] {
            check_at_least_one(name, value)?;
        }
        check_deadline_minutes(self.deadline_minutes)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.exists()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {:?}", dir))?;
            info!("Created config directory: {:?}", dir);
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize settings to TOML")?;
        fs::write(path, content).with_context(|| format!("Failed to write settings file: {:?}", path))?;

        info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Update one setting by its file key
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());
        match name {
            "environment" => {
                if !value.is_empty() {
                    CloudEnvironment::from_name(value)?;
                }
                self.environment = optional(value);
            }
            "location" => self.location = optional(value),
            "template_link" => self.template_link = optional(value),
            "user_agent_suffix" => self.user_agent_suffix = optional(value),
            "deadline_minutes" => {
                let minutes = parse_count(name, value)?;
                check_deadline_minutes(minutes)?;
                self.deadline_minutes = minutes;
            }
            "poll_interval_secs" => self.poll_interval_secs = parse_count(name, value)?,
            "max_redirects" => self.max_redirects = parse_count(name, value)?,
            "max_retries" => self.max_retries = parse_count(name, value)?,
            "retry_delay_ms" => self.retry_delay_ms = parse_number(name, value)?,
            other => anyhow::bail!("Unknown setting '{}'", other),
        }
        Ok(())
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_redirects: self.max_redirects,
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_delay_ms),
            ..FetchPolicy::default()
        }
    }

    pub fn user_agent(&self) -> String {
        match self.user_agent_suffix.as_deref().filter(|s| !s.is_empty()) {
            Some(suffix) => format!("{} {}", constants::user_agent(), suffix),
            None => constants::user_agent(),
        }
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Setting '{}' expects a number, got '{}'", name, value))
}

/// A number that must be at least 1
fn parse_count<T: FromStr + Into<u64> + Copy>(name: &str, value: &str) -> Result<T> {
    let parsed: T = parse_number(name, value)?;
    check_at_least_one(name, parsed.into())?;
    Ok(parsed)
}

fn check_at_least_one(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        anyhow::bail!("Setting '{}' must be at least 1", name);
    }
    Ok(())
}

fn check_deadline_minutes(minutes: u64) -> Result<()> {
    let max = MAX_DEADLINE.as_secs() / 60;
    if minutes > max {
        anyhow::bail!("Setting 'deadline_minutes' must be at most {}, got {}", max, minutes);
    }
    Ok(())
}

/// Whether the container registry needs credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DockerAccess {
    #[default]
    Public,
    Private,
}

impl DockerAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            DockerAccess::Public => "public",
            DockerAccess::Private => "private",
        }
    }
}

impl FromStr for DockerAccess {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(DockerAccess::Public),
            "private" => Ok(DockerAccess::Private),
            other => Err(format!("registry access must be public or private, got '{}'", other)),
        }
    }
}

impl fmt::Display for DockerAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw inputs for one provisioning run, before defaults are applied
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub use_device_auth: bool,
    pub environment: Option<String>,
    pub template: Option<String>,
    pub parameters_file: Option<PathBuf>,
    pub resource_group: Option<String>,
    pub location: Option<String>,
    pub site_name: Option<String>,
    pub image: Option<String>,
    pub database_type: Option<String>,
    pub database_name: Option<String>,
    pub database_admin: Option<String>,
    pub database_password: Option<String>,
    pub docker_access: Option<DockerAccess>,
    pub docker_registry_url: Option<String>,
    pub docker_registry_username: Option<String>,
    pub docker_registry_password: Option<String>,
    pub skip_deployment: bool,
    pub skip_template_cache: bool,
    pub skip_parameters_cache: bool,
    pub deadline: Option<Duration>,
}

/// Fully resolved, read-only configuration for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub use_device_auth: bool,
    pub environment: CloudEnvironment,
    /// Explicitly requested template location; `None` means use the defaults
    pub template: Option<String>,
    pub template_defaults: TemplateDefaults,
    pub template_cache_path: PathBuf,
    pub parameters: DeploymentParameters,
    pub parameters_cache_path: PathBuf,
    pub resource_group: String,
    pub location: String,
    pub site_name: String,
    pub deployment_name: String,
    pub skip_deployment: bool,
    pub skip_template_cache: bool,
    pub skip_parameters_cache: bool,
    pub deadline: Duration,
    pub poll_interval: Duration,
    pub fetch_policy: FetchPolicy,
    pub user_agent: String,
}

/// First non-empty of a flag value and a parameters-file value
fn pick(flag: Option<String>, from_file: Option<&str>) -> Option<String> {
    flag.filter(|v| !v.is_empty())
        .or_else(|| from_file.map(str::to_string))
}

impl ProvisionOptions {
    /// Apply file, settings and built-in defaults.
    ///
    /// Precedence: flag (or its environment variable), then the parameters
    /// file, then the settings file, then built-in defaults.
    pub async fn into_run_config(self, settings: &Settings) -> Result<RunConfig, Error> {
        let subscription_id = self
            .subscription_id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Config("no subscription id given (--subscription or AZURE_SUBSCRIPTION_ID)".to_string()))?;

        select_credentials(self.client_id.as_deref(), self.client_secret.as_deref())?;

        let explicit_parameters = self.parameters_file.is_some();
        let parameters_path = self
            .parameters_file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PARAMETERS_PATH));
        let mut parameters = DeploymentParameters::load(&parameters_path, explicit_parameters).await?;

        let site_name = pick(self.site_name, parameters.get_str(keys::NAME)).unwrap_or_else(generate_site_name);
        let resource_group = self.resource_group.filter(|g| !g.is_empty()).unwrap_or_else(|| site_name.clone());
        validate_resource_group_name(&resource_group)?;

        let location = self
            .location
            .filter(|l| !l.is_empty())
            .or_else(|| settings.location.clone())
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        let environment = match self.environment.filter(|e| !e.is_empty()).or_else(|| settings.environment.clone()) {
            Some(name) => CloudEnvironment::from_name(&name)?,
            None => CloudEnvironment::from_name(DEFAULT_ENVIRONMENT)?,
        };

        let database_type = pick(self.database_type, parameters.get_str(keys::DATABASE))
            .unwrap_or_else(|| NO_DATABASE.to_string())
            .to_lowercase();
        let database_name = pick(self.database_name, parameters.get_str(keys::DATABASE_NAME)).unwrap_or_default();
        let database_admin = pick(self.database_admin, parameters.get_str(keys::DATABASE_ADMIN))
            .unwrap_or_else(|| DEFAULT_DATABASE_ADMIN.to_string());
        let image = pick(self.image, parameters.get_str(keys::IMAGE_NAME)).unwrap_or_else(|| DEFAULT_IMAGE.to_string());

        let database_password = match self.database_password.filter(|p| !p.is_empty()) {
            Some(password) => {
                debug!("Using provided database password");
                password
            }
            None if database_type != NO_DATABASE => {
                debug!("Generated database password");
                generate_password()
            }
            None => String::new(),
        };

        let docker_access = match self.docker_access {
            Some(access) => access,
            None => match parameters.get_str(keys::DOCKER_ACCESS) {
                Some(raw) => raw.parse().map_err(Error::Config)?,
                None => DockerAccess::default(),
            },
        };
        let docker_url = pick(self.docker_registry_url, parameters.get_str(keys::DOCKER_URL)).unwrap_or_default();
        let docker_username =
            pick(self.docker_registry_username, parameters.get_str(keys::DOCKER_USERNAME)).unwrap_or_default();
        let docker_password = self.docker_registry_password.unwrap_or_default();

        parameters.set(keys::NAME, site_name.as_str());
        parameters.set(keys::DATABASE, database_type.as_str());
        parameters.set(keys::DATABASE_NAME, database_name);
        parameters.set(keys::IMAGE_NAME, image);
        parameters.set(keys::DATABASE_ADMIN, database_admin);
        parameters.set(keys::DATABASE_PASSWORD, database_password);
        parameters.set(keys::DOCKER_ACCESS, docker_access.as_str());
        parameters.set(keys::DOCKER_URL, docker_url);
        parameters.set(keys::DOCKER_USERNAME, docker_username);
        parameters.set(keys::DOCKER_PASSWORD, docker_password);

        let deadline = self
            .deadline
            .unwrap_or_else(|| Duration::from_secs(settings.deadline_minutes.saturating_mul(60)));
        if deadline.is_zero() || deadline > MAX_DEADLINE {
            return Err(Error::Config(format!(
                "deadline must be between 1 and {} minutes, got {:?}",
                MAX_DEADLINE.as_secs() / 60,
                deadline
            )));
        }

        let template_defaults = TemplateDefaults {
            local_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            link: settings
                .template_link
                .clone()
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| DEFAULT_TEMPLATE_LINK.to_string()),
        };

        Ok(RunConfig {
            subscription_id,
            tenant_id: self.tenant_id.filter(|t| !t.is_empty()),
            client_id: self.client_id.filter(|c| !c.is_empty()),
            client_secret: self.client_secret.filter(|c| !c.is_empty()),
            use_device_auth: self.use_device_auth,
            environment,
            template: self.template.filter(|t| !t.is_empty()),
            template_cache_path: template_defaults.local_path.clone(),
            template_defaults,
            parameters,
            parameters_cache_path: PathBuf::from(DEFAULT_PARAMETERS_PATH),
            resource_group,
            location,
            site_name,
            deployment_name: DEPLOYMENT_NAME.to_string(),
            skip_deployment: self.skip_deployment,
            skip_template_cache: self.skip_template_cache,
            skip_parameters_cache: self.skip_parameters_cache,
            deadline,
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            fetch_policy: settings.fetch_policy(),
            user_agent: settings.user_agent(),
        })
    }
}
