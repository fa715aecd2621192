//! Deployment submission and the poll loop that waits for a terminal state

use crate::api::client::ResourceApi;
use crate::api::models::{DeploymentProperties, DeploymentResult, DeploymentStatus, ProvisioningState};
use crate::error::{ApiError, DeployError};
use log::{debug, info};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default wait between status polls when the provider gives no hint
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

pub struct DeploymentInvoker<'a> {
    api: &'a dyn ResourceApi,
    poll_interval: Duration,
}

impl<'a> DeploymentInvoker<'a> {
    pub fn new(api: &'a dyn ResourceApi, poll_interval: Duration) -> Self {
        Self { api, poll_interval }
    }

    /// Submit `properties` as deployment `deployment` into `group` and block
    /// until the provider reports a terminal state.
    ///
    /// Expiry of `cancel` yields [`DeployError::Cancelled`]; the deployment
    /// may still finish on the provider side.
    pub async fn deploy(
        &self,
        group: &str,
        deployment: &str,
        properties: &DeploymentProperties,
        portal_url: &str,
        cancel: &CancellationToken,
    ) -> Result<DeploymentResult, DeployError> {
        info!("Starting deployment {} in resource group {}", deployment, group);

        let mut status = guarded(
            cancel,
            deployment,
            self.api.submit_deployment(group, deployment, properties),
        )
        .await?;

        let mut polls = 0u32;
        while !status.state.is_terminal() {
            let wait = status.retry_after.unwrap_or(self.poll_interval);
            debug!(
                "Deployment {} is {}, checking again in {:?}",
                deployment,
                status.state.as_str(),
                wait
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(DeployError::Cancelled { deployment: deployment.to_string() });
                }
                _ = tokio::time::sleep(wait) => {}
            }

            status = guarded(cancel, deployment, self.api.deployment_status(group, deployment)).await?;
            polls += 1;
        }

        debug!("Deployment {} settled after {} poll(s)", deployment, polls);
        finish(deployment, status, portal_url)
    }
}

/// Race a provider call against the deadline
async fn guarded<F>(cancel: &CancellationToken, deployment: &str, call: F) -> Result<DeploymentStatus, DeployError>
where
    F: Future<Output = Result<DeploymentStatus, ApiError>>,
{
    let cancelled = || DeployError::Cancelled {
        deployment: deployment.to_string(),
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled()),
        result = call => match result {
            Ok(status) => Ok(status),
            Err(ApiError::Cancelled) => Err(cancelled()),
            Err(error) => Err(DeployError::Api(error)),
        },
    }
}

fn finish(deployment: &str, status: DeploymentStatus, portal_url: &str) -> Result<DeploymentResult, DeployError> {
    match status.state {
        ProvisioningState::Succeeded => Ok(DeploymentResult {
            deployment: deployment.to_string(),
            state: status.state,
            portal_url: portal_url.to_string(),
        }),
        state => Err(DeployError::Failed {
            deployment: deployment.to_string(),
            state: state.as_str().to_string(),
            message: status.error.unwrap_or_else(|| "no error detail reported".to_string()),
        }),
    }
}
