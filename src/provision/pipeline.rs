//! One complete provisioning run
//!
//! Authentication and template acquisition happen first and abort the run on
//! failure, before anything is created. Only then are the concurrent
//! branches handed to the [`Orchestrator`].

use super::acquire::{AcquiredTemplate, TemplateAcquirer, TemplateOrigin, load_template};
use super::cache::{ArtifactSink, FileCache};
use super::orchestrator::{CacheJob, DeploymentJob, Orchestrator, RunPlan, RunReport};
use crate::api::client::ArmClient;
use crate::api::constants;
use crate::api::http;
use crate::api::models::{DeploymentMode, DeploymentProperties, DeviceCode};
use crate::auth::{AadClient, CredentialResolver, ResolvedIdentity};
use crate::config::RunConfig;
use crate::deadline::Deadline;
use crate::error::Error;
use log::{debug, info, warn};
use std::path::{Component, Path};
use std::sync::Arc;

/// What a run did, for reporting to the user
#[derive(Debug)]
pub struct RunSummary {
    /// Tenant the run authenticated against; `None` when deployment was skipped
    pub tenant_id: Option<String>,
    pub template_origin: TemplateOrigin,
    pub portal_url: String,
    pub site_url: String,
    pub report: RunReport,
}

type Prompt = Box<dyn Fn(&DeviceCode) + Send + Sync>;

pub struct Pipeline<'a> {
    config: &'a RunConfig,
    cache: Arc<dyn ArtifactSink>,
    prompt: Option<Prompt>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            cache: Arc::new(FileCache),
            prompt: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ArtifactSink>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace how a device code is shown to the user
    pub fn with_prompt(mut self, prompt: impl Fn(&DeviceCode) + Send + Sync + 'static) -> Self {
        self.prompt = Some(Box::new(prompt));
        self
    }

    pub async fn run(self) -> Result<RunSummary, Error> {
        let config = self.config;
        let deadline = Deadline::start(config.deadline);
        let cancel = deadline.token().clone();
        let http_client = http::build_client(&config.user_agent)?;
        let environment = &config.environment;

        debug!("Subscription selected: {}", config.subscription_id);
        debug!("Resource group selected: {} ({})", config.resource_group, config.location);

        let identity = if config.skip_deployment {
            debug!("Deployment skipped, not authenticating");
            None
        } else {
            let aad = AadClient::new(http_client.clone(), environment, cancel.clone());
            let directory = ArmClient::new(
                http_client.clone(),
                environment.clone(),
                config.subscription_id.as_str(),
                cancel.clone(),
            );
            let mut resolver = CredentialResolver::new(&aad, &directory).force_device_auth(config.use_device_auth);
            if let Some(prompt) = self.prompt {
                resolver = resolver.with_prompt(prompt);
            }
            let resolved = resolver
                .resolve(
                    &config.subscription_id,
                    config.client_id.as_deref(),
                    config.client_secret.as_deref(),
                    config.tenant_id.as_deref(),
                )
                .await?;
            info!("Authenticated against tenant {}", resolved.tenant_id);
            Some(resolved)
        };

        let acquirer = TemplateAcquirer::new(http_client.clone(), config.fetch_policy.clone(), cancel.clone());
        let template = load_template(&acquirer, config.template.as_deref(), &config.template_defaults).await?;
        debug!(
            "Template selected: {:?} ({:?} left before the deadline)",
            template.origin,
            deadline.remaining()
        );

        let portal_url = constants::portal_link(
            &environment.portal_url,
            &config.subscription_id,
            &config.resource_group,
        );
        let plan = plan_run(config, &template, identity.is_some(), &portal_url);

        let mut orchestrator = Orchestrator::new(self.cache).with_poll_interval(config.poll_interval);
        if let Some(ResolvedIdentity { authorizer, .. }) = &identity {
            let client = ArmClient::new(
                http_client,
                environment.clone(),
                config.subscription_id.as_str(),
                cancel.clone(),
            )
            .with_authorizer(authorizer.clone());
            orchestrator = orchestrator.with_resources(Arc::new(client));
        }

        let report = orchestrator.execute(plan, &cancel).await;
        if deadline.is_expired() {
            warn!("Run stopped at its deadline of {:?}", config.deadline);
        }

        Ok(RunSummary {
            tenant_id: identity.map(|i| i.tenant_id),
            template_origin: template.origin,
            portal_url,
            site_url: environment.site_url(&config.site_name),
            report,
        })
    }
}

fn plan_run(config: &RunConfig, template: &AcquiredTemplate, deploy: bool, portal_url: &str) -> RunPlan {
    let deployment = deploy.then(|| DeploymentJob {
        resource_group: config.resource_group.clone(),
        location: config.location.clone(),
        deployment_name: config.deployment_name.clone(),
        properties: DeploymentProperties {
            template: template.document.clone(),
            parameters: config.parameters.template_parameters(),
            mode: DeploymentMode::Incremental,
        },
        portal_url: portal_url.to_string(),
    });

    let reads_cache_file = template
        .origin
        .local_path()
        .is_some_and(|source| same_file(&source, &config.template_cache_path));
    let template_cache = if config.skip_template_cache {
        None
    } else if reads_cache_file {
        debug!("Template was read from {:?}, not caching it over itself", config.template_cache_path);
        None
    } else {
        Some(CacheJob {
            artifact: template.document.clone(),
            destination: config.template_cache_path.clone(),
        })
    };

    let parameters_cache = if config.skip_parameters_cache {
        None
    } else {
        match serde_json::to_value(config.parameters.sanitized()) {
            Ok(artifact) => Some(CacheJob {
                artifact,
                destination: config.parameters_cache_path.clone(),
            }),
            Err(e) => {
                warn!("Unable to prepare parameters for caching: {}", e);
                None
            }
        }
    };

    RunPlan {
        deployment,
        template_cache,
        parameters_cache,
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    fn significant(path: &Path) -> Vec<Component<'_>> {
        path.components().filter(|c| *c != Component::CurDir).collect()
    }

    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => significant(a) == significant(b),
    }
}
