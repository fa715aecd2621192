use super::client::IdentityApi;
use super::tenant::TenantLocator;
use crate::api::client::DirectoryApi;
use crate::api::constants::{COMMON_TENANT, DEVICE_CLIENT_ID};
use crate::api::models::{Authorizer, CredentialSet, DeviceCode};
use crate::error::{AuthError, Error};
use colored::*;
use log::{debug, info};

/// Result of credential resolution: the tenant actually used and a bearer
/// authorizer scoped to it
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub tenant_id: String,
    pub authorizer: Authorizer,
}

type Prompt = Box<dyn Fn(&DeviceCode) + Send + Sync>;

/// Produces an authorizer from service principal credentials or an
/// interactive device code flow
pub struct CredentialResolver<'a> {
    identity: &'a dyn IdentityApi,
    directory: &'a dyn DirectoryApi,
    prompt: Prompt,
    force_device_auth: bool,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(identity: &'a dyn IdentityApi, directory: &'a dyn DirectoryApi) -> Self {
        Self {
            identity,
            directory,
            prompt: Box::new(print_device_code),
            force_device_auth: false,
        }
    }

    /// Replace how the device code is shown to the user
    pub fn with_prompt(mut self, prompt: impl Fn(&DeviceCode) + Send + Sync + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    /// Ignore any client id / secret and authenticate interactively
    pub fn force_device_auth(mut self, force: bool) -> Self {
        self.force_device_auth = force;
        self
    }

    pub async fn resolve(
        &self,
        subscription_id: &str,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        tenant_id: Option<&str>,
    ) -> Result<ResolvedIdentity, Error> {
        let credentials = match select_credentials(client_id, client_secret)? {
            CredentialSet::ClientCredentials { .. } if self.force_device_auth => {
                debug!("Device authentication forced, ignoring service principal");
                CredentialSet::DeviceCode
            }
            selected => selected,
        };
        let tenant = known_tenant(tenant_id);

        match credentials {
            CredentialSet::ClientCredentials {
                client_id,
                client_secret,
            } => {
                let tenant = tenant.ok_or(AuthError::MissingTenant)?;
                let token = self
                    .identity
                    .client_credentials(tenant, &client_id, &client_secret)
                    .await?;
                Ok(ResolvedIdentity {
                    tenant_id: tenant.to_string(),
                    authorizer: Authorizer::bearer(token),
                })
            }
            CredentialSet::DeviceCode => {
                let authority = tenant.unwrap_or(COMMON_TENANT);
                let code = self.identity.device_code(authority, DEVICE_CLIENT_ID).await?;
                (self.prompt)(&code);
                let token = self
                    .identity
                    .await_device_token(authority, DEVICE_CLIENT_ID, &code)
                    .await?;

                match tenant {
                    Some(tenant) => Ok(ResolvedIdentity {
                        tenant_id: tenant.to_string(),
                        authorizer: Authorizer::bearer(token),
                    }),
                    None => {
                        let locator = TenantLocator::new(self.identity, self.directory, DEVICE_CLIENT_ID);
                        let (tenant_id, authorizer) = locator.locate(&token, subscription_id).await?;
                        info!("Tenant {} selected", tenant_id);
                        Ok(ResolvedIdentity { tenant_id, authorizer })
                    }
                }
            }
        }
    }
}

/// Decide which credential form is active. Both parts of a client
/// credential pair or neither; anything else is rejected before any
/// network traffic.
pub fn select_credentials(
    client_id: Option<&str>,
    client_secret: Option<&str>,
) -> Result<CredentialSet, AuthError> {
    let client_id = client_id.filter(|s| !s.is_empty());
    let client_secret = client_secret.filter(|s| !s.is_empty());

    match (client_id, client_secret) {
        (Some(id), Some(secret)) => {
            debug!("Using service principal {} (secret {})", id, redact_secret(secret));
            Ok(CredentialSet::ClientCredentials {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
            })
        }
        (None, None) => Ok(CredentialSet::DeviceCode),
        _ => Err(AuthError::IncompleteCredentials),
    }
}

/// A tenant id that is actually known, as opposed to absent or `common`
pub fn known_tenant(tenant_id: Option<&str>) -> Option<&str> {
    tenant_id
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case(COMMON_TENANT))
}

/// Display form of a secret: the last ten characters when long enough to
/// keep the rest hidden, otherwise nothing at all
pub fn redact_secret(secret: &str) -> String {
    const SAFE_CHAR_COUNT: usize = 10;
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > SAFE_CHAR_COUNT {
        let tail: String = chars[chars.len() - SAFE_CHAR_COUNT..].iter().collect();
        format!("...{}", tail)
    } else {
        "[redacted]".to_string()
    }
}

fn print_device_code(code: &DeviceCode) {
    println!();
    println!("  {}", code.prompt().bright_yellow());
    println!();
}
