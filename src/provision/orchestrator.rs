//! Fan-out of the three run branches under one deadline
//!
//! The deployment branch (resource group ensure, then deploy) and the two
//! cache writes run as separate tasks. They are joined in a fixed order; a
//! failing branch never cancels its siblings, only the shared deadline does.

use super::cache::ArtifactSink;
use super::groups::ResourceGroupProvisioner;
use super::invoker::{DEFAULT_POLL_INTERVAL, DeploymentInvoker};
use crate::api::client::ResourceApi;
use crate::api::models::{DeploymentProperties, DeploymentResult};
use crate::error::{CacheError, DeployError, Error, ProvisionError};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEPLOYMENT_BRANCH: &str = "deployment";
pub const TEMPLATE_CACHE_BRANCH: &str = "template cache";
pub const PARAMETERS_CACHE_BRANCH: &str = "parameters cache";

/// Everything the deployment branch needs, owned by its task
#[derive(Debug, Clone)]
pub struct DeploymentJob {
    pub resource_group: String,
    pub location: String,
    pub deployment_name: String,
    pub properties: DeploymentProperties,
    pub portal_url: String,
}

/// One artifact to persist
#[derive(Debug, Clone)]
pub struct CacheJob {
    pub artifact: Value,
    pub destination: PathBuf,
}

/// Work for one run; `None` marks a branch the caller opted out of
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub deployment: Option<DeploymentJob>,
    pub template_cache: Option<CacheJob>,
    pub parameters_cache: Option<CacheJob>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchStatus<T> {
    Skipped,
    Completed(T),
}

#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    pub resource_group_created: bool,
    pub result: DeploymentResult,
}

/// Per-branch outcomes of a run
#[derive(Debug)]
pub struct RunReport {
    pub deployment: Result<BranchStatus<DeploymentOutcome>, Error>,
    pub template_cache: Result<BranchStatus<PathBuf>, Error>,
    pub parameters_cache: Result<BranchStatus<PathBuf>, Error>,
}

impl RunReport {
    /// True if any branch was stopped by the deadline
    pub fn cancelled(&self) -> bool {
        [
            self.deployment.as_ref().err(),
            self.template_cache.as_ref().err(),
            self.parameters_cache.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .any(Error::is_cancelled)
    }

    /// The run succeeds when the deployment branch did and nothing was
    /// cancelled. Cache failures do not count.
    pub fn succeeded(&self) -> bool {
        self.deployment.is_ok() && !self.cancelled()
    }
}

pub struct Orchestrator {
    resources: Option<Arc<dyn ResourceApi>>,
    cache: Arc<dyn ArtifactSink>,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(cache: Arc<dyn ArtifactSink>) -> Self {
        Self {
            resources: None,
            cache,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Client for the deployment branch; not needed when it is skipped
    pub fn with_resources(mut self, resources: Arc<dyn ResourceApi>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run every planned branch and wait for all of them, or for `cancel`
    pub async fn execute(&self, plan: RunPlan, cancel: &CancellationToken) -> RunReport {
        let RunPlan {
            deployment,
            template_cache,
            parameters_cache,
        } = plan;

        let deployment_name = deployment.as_ref().map(|job| job.deployment_name.clone());
        let deployment_handle = match (deployment, &self.resources) {
            (Some(job), Some(api)) => Some(tokio::spawn(run_deployment(
                api.clone(),
                job,
                self.poll_interval,
                cancel.clone(),
            ))),
            (Some(_), None) => Some(tokio::spawn(async {
                Err::<DeploymentOutcome, _>(Error::Config(
                    "deployment planned without a resource manager client".to_string(),
                ))
            })),
            (None, _) => None,
        };

        let template_path = template_cache.as_ref().map(|job| job.destination.clone());
        let template_handle = template_cache.map(|job| tokio::spawn(run_cache(self.cache.clone(), job, cancel.clone())));

        let parameters_path = parameters_cache.as_ref().map(|job| job.destination.clone());
        let parameters_handle =
            parameters_cache.map(|job| tokio::spawn(run_cache(self.cache.clone(), job, cancel.clone())));

        let template_cache = join_branch(TEMPLATE_CACHE_BRANCH, template_handle, cancel, || {
            CacheError::Cancelled {
                path: template_path.unwrap_or_default(),
            }
            .into()
        })
        .await;

        let parameters_cache = join_branch(PARAMETERS_CACHE_BRANCH, parameters_handle, cancel, || {
            CacheError::Cancelled {
                path: parameters_path.unwrap_or_default(),
            }
            .into()
        })
        .await;

        let deployment = join_branch(DEPLOYMENT_BRANCH, deployment_handle, cancel, || {
            DeployError::Cancelled {
                deployment: deployment_name.unwrap_or_default(),
            }
            .into()
        })
        .await;

        for (branch, outcome) in [
            (TEMPLATE_CACHE_BRANCH, template_cache.as_ref().err()),
            (PARAMETERS_CACHE_BRANCH, parameters_cache.as_ref().err()),
        ] {
            if let Some(e) = outcome {
                warn!("{} write failed: {}", branch, e);
            }
        }
        if let Err(e) = &deployment {
            error!("{} branch failed: {}", DEPLOYMENT_BRANCH, e);
        }

        RunReport {
            deployment,
            template_cache,
            parameters_cache,
        }
    }
}

async fn join_branch<T>(
    branch: &'static str,
    handle: Option<JoinHandle<Result<T, Error>>>,
    cancel: &CancellationToken,
    cancelled: impl FnOnce() -> Error,
) -> Result<BranchStatus<T>, Error> {
    let Some(mut handle) = handle else {
        debug!("{} branch skipped", branch);
        return Ok(BranchStatus::Skipped);
    };

    tokio::select! {
        biased;
        joined = &mut handle => match joined {
            Ok(result) => result.map(BranchStatus::Completed),
            Err(e) => Err(Error::TaskAborted {
                branch,
                reason: e.to_string(),
            }),
        },
        _ = cancel.cancelled() => {
            handle.abort();
            Err(cancelled())
        }
    }
}

async fn run_deployment(
    api: Arc<dyn ResourceApi>,
    job: DeploymentJob,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> Result<DeploymentOutcome, Error> {
    let provisioner = ResourceGroupProvisioner::new(api.as_ref());
    let created = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProvisionError::Cancelled),
        ensured = provisioner.ensure(&job.resource_group, &job.location) => ensured,
    }
    .map_err(DeployError::ResourceGroup)?;

    if !created {
        info!(
            "Using existing resource group {}; its own region applies",
            job.resource_group
        );
    }

    let result = DeploymentInvoker::new(api.as_ref(), poll_interval)
        .deploy(
            &job.resource_group,
            &job.deployment_name,
            &job.properties,
            &job.portal_url,
            &cancel,
        )
        .await?;

    Ok(DeploymentOutcome {
        resource_group_created: created,
        result,
    })
}

async fn run_cache(sink: Arc<dyn ArtifactSink>, job: CacheJob, cancel: CancellationToken) -> Result<PathBuf, Error> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CacheError::Cancelled { path: job.destination.clone() }),
        saved = sink.save(&job.artifact, &job.destination) => saved,
    }?;
    debug!("Cached artifact at {:?}", job.destination);
    Ok(job.destination)
}
