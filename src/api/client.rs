use super::constants::{self, headers};
use super::environment::CloudEnvironment;
use super::http;
use super::models::{
    Authorizer, DeploymentProperties, DeploymentRequest, DeploymentResponse, DeploymentStatus,
    ListResponse, ResourceGroup, SubscriptionCandidate, TenantCandidate,
};
use super::pagination::{Page, PageSource, Paged};
use crate::error::ApiError;
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// Tenant and subscription discovery
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// Tenants reachable with `authorizer`
    async fn tenants(&self, authorizer: &Authorizer) -> Result<Paged<TenantCandidate>, ApiError>;

    /// Subscriptions visible to a tenant-scoped `authorizer`
    async fn subscriptions(
        &self,
        authorizer: &Authorizer,
    ) -> Result<Paged<SubscriptionCandidate>, ApiError>;
}

/// Resource group and deployment verbs. Status codes are returned raw so
/// callers decide which outcomes count as success.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// HEAD on the resource group: 204 when present, 404 when absent
    async fn check_group_existence(&self, name: &str) -> Result<u16, ApiError>;

    /// PUT on the resource group: 201 when created, 200 when it already existed
    async fn create_or_update_group(&self, name: &str, location: &str) -> Result<u16, ApiError>;

    /// Submit a deployment and return its first reported status
    async fn submit_deployment(
        &self,
        group: &str,
        deployment: &str,
        properties: &DeploymentProperties,
    ) -> Result<DeploymentStatus, ApiError>;

    /// Read a deployment's current status
    async fn deployment_status(&self, group: &str, deployment: &str) -> Result<DeploymentStatus, ApiError>;
}

/// Azure Resource Manager client bound to one subscription.
///
/// Every request is raced against the run's cancellation token, so an
/// expired deadline aborts whatever is in flight.
#[derive(Clone)]
pub struct ArmClient {
    http_client: reqwest::Client,
    environment: CloudEnvironment,
    subscription_id: String,
    authorizer: Option<Authorizer>,
    cancel: CancellationToken,
}

impl ArmClient {
    pub fn new(
        http_client: reqwest::Client,
        environment: CloudEnvironment,
        subscription_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http_client,
            environment,
            subscription_id: subscription_id.into(),
            authorizer: None,
            cancel,
        }
    }

    /// Attach the authorizer used for resource group and deployment calls
    pub fn with_authorizer(mut self, authorizer: Authorizer) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    fn bearer(&self) -> &str {
        self.authorizer.as_ref().map(Authorizer::access_token).unwrap_or_default()
    }

    fn request(&self, method: reqwest::Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!("{} {} ({})", method, url, request_id);
        self.http_client
            .request(method, url)
            .bearer_auth(token)
            .header(headers::CLIENT_REQUEST_ID, request_id)
    }

    fn group_url(&self, name: &str) -> String {
        constants::resource_group_endpoint(
            &self.environment.resource_manager_endpoint,
            &self.subscription_id,
            name,
        )
    }

    fn deployment_url(&self, group: &str, deployment: &str) -> String {
        constants::deployment_endpoint(
            &self.environment.resource_manager_endpoint,
            &self.subscription_id,
            group,
            deployment,
        )
    }

    fn pager<T>(&self, url: String, authorizer: &Authorizer) -> Paged<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Paged::new(ArmPager {
            client: self.clone(),
            first: url,
            token: authorizer.access_token().to_string(),
            _item: PhantomData,
        })
    }

    async fn read_status(&self, response: reqwest::Response) -> Result<DeploymentStatus, ApiError> {
        let response = http::error_for_status(&self.cancel, response).await?;
        let retry_after = http::retry_after(&response);
        let body = http::text(&self.cancel, response).await?;
        let parsed: DeploymentResponse = if body.trim().is_empty() {
            DeploymentResponse { properties: None }
        } else {
            serde_json::from_str(&body)?
        };
        Ok(parsed.into_status(retry_after))
    }
}

#[async_trait]
impl DirectoryApi for ArmClient {
    async fn tenants(&self, authorizer: &Authorizer) -> Result<Paged<TenantCandidate>, ApiError> {
        let url = constants::tenants_endpoint(&self.environment.resource_manager_endpoint);
        Ok(self.pager(url, authorizer))
    }

    async fn subscriptions(
        &self,
        authorizer: &Authorizer,
    ) -> Result<Paged<SubscriptionCandidate>, ApiError> {
        let url = constants::subscriptions_endpoint(&self.environment.resource_manager_endpoint);
        Ok(self.pager(url, authorizer))
    }
}

#[async_trait]
impl ResourceApi for ArmClient {
    async fn check_group_existence(&self, name: &str) -> Result<u16, ApiError> {
        let url = self.group_url(name);
        let response = http::send(
            &self.cancel,
            self.request(reqwest::Method::HEAD, &url, self.bearer()),
        )
        .await?;
        Ok(response.status().as_u16())
    }

    async fn create_or_update_group(&self, name: &str, location: &str) -> Result<u16, ApiError> {
        let url = self.group_url(name);
        let body = ResourceGroup {
            location: location.to_string(),
        };
        let response = http::send(
            &self.cancel,
            self.request(reqwest::Method::PUT, &url, self.bearer())
                .header("Content-Type", headers::CONTENT_TYPE_JSON)
                .json(&body),
        )
        .await?;
        Ok(response.status().as_u16())
    }

    async fn submit_deployment(
        &self,
        group: &str,
        deployment: &str,
        properties: &DeploymentProperties,
    ) -> Result<DeploymentStatus, ApiError> {
        let url = self.deployment_url(group, deployment);
        let response = http::send(
            &self.cancel,
            self.request(reqwest::Method::PUT, &url, self.bearer())
                .header("Content-Type", headers::CONTENT_TYPE_JSON)
                .json(&DeploymentRequest { properties }),
        )
        .await?;
        self.read_status(response).await
    }

    async fn deployment_status(&self, group: &str, deployment: &str) -> Result<DeploymentStatus, ApiError> {
        let url = self.deployment_url(group, deployment);
        let response = http::send(
            &self.cancel,
            self.request(reqwest::Method::GET, &url, self.bearer()),
        )
        .await?;
        self.read_status(response).await
    }
}

/// Follows `nextLink` through a resource manager list call
struct ArmPager<T> {
    client: ArmClient,
    first: String,
    token: String,
    _item: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T> PageSource<T> for ArmPager<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn fetch(&self, link: Option<&str>) -> Result<Page<T>, ApiError> {
        let url = link.unwrap_or(self.first.as_str());
        let cancel = &self.client.cancel;
        let response = http::send(
            cancel,
            self.client.request(reqwest::Method::GET, url, &self.token),
        )
        .await?;
        let response = http::error_for_status(cancel, response).await?;
        let list: ListResponse<T> = http::json(cancel, response).await?;
        debug!("Fetched page of {} item(s) from {}", list.value.len(), url);
        Ok(Page {
            items: list.value,
            next_link: list.next_link,
        })
    }
}
