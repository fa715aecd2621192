//! Tenant discovery for tokens obtained without a known tenant
//!
//! A device-code token minted against `common` can list the tenants the user
//! belongs to, but resource manager calls need a token scoped to the tenant
//! that owns the target subscription. The locator walks tenants in provider
//! order, refreshes the original token into each one and scans that tenant's
//! subscriptions until the target shows up.
//!
//! The walk is sequential and never retried: each step is a network round
//! trip and the first match ends the search.

use super::client::IdentityApi;
use crate::api::client::DirectoryApi;
use crate::api::models::{Authorizer, TokenInfo};
use crate::error::{AuthError, Error, NotFoundError};
use log::{debug, info};

pub struct TenantLocator<'a> {
    identity: &'a dyn IdentityApi,
    directory: &'a dyn DirectoryApi,
    client_id: &'a str,
}

impl<'a> TenantLocator<'a> {
    pub fn new(identity: &'a dyn IdentityApi, directory: &'a dyn DirectoryApi, client_id: &'a str) -> Self {
        Self {
            identity,
            directory,
            client_id,
        }
    }

    /// Find the tenant owning `subscription`, returning its id and a
    /// tenant-scoped authorizer
    pub async fn locate(&self, token: &TokenInfo, subscription: &str) -> Result<(String, Authorizer), Error> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(AuthError::MissingRefreshToken)?;

        info!("Using authorization to infer tenant for subscription {}", subscription);

        let common = Authorizer::bearer(token.clone());
        let mut tenants = self.directory.tenants(&common).await.map_err(AuthError::from)?;

        while tenants.advance().await.map_err(AuthError::from)? {
            let Some(tenant) = tenants.current().map(|t| t.tenant_id.clone()) else {
                break;
            };
            debug!("Checking tenant {}", tenant);

            let scoped = self.identity.refresh(&tenant, self.client_id, refresh_token).await?;
            let authorizer = Authorizer::bearer(scoped);

            let mut subscriptions = self
                .directory
                .subscriptions(&authorizer)
                .await
                .map_err(AuthError::from)?;

            while subscriptions.advance().await.map_err(AuthError::from)? {
                let matched = subscriptions
                    .current()
                    .is_some_and(|s| s.subscription_id.eq_ignore_ascii_case(subscription));
                if matched {
                    info!("Subscription {} belongs to tenant {}", subscription, tenant);
                    return Ok((tenant, authorizer));
                }
            }
        }

        Err(NotFoundError {
            subscription: subscription.to_string(),
        }
        .into())
    }
}
