use crate::api::constants;
use crate::api::environment::CloudEnvironment;
use crate::api::http;
use crate::api::models::{DeviceCode, TokenInfo, TokenResponse};
use crate::error::{ApiError, AuthError};
use async_trait::async_trait;
use log::{debug, info};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const SLOW_DOWN_STEP_SECS: u64 = 5;
const DEFAULT_DEVICE_CODE_LIFETIME_SECS: u64 = 900;

/// Token acquisition against the identity endpoint
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Service principal token for a known tenant
    async fn client_credentials(
        &self,
        tenant: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenInfo, AuthError>;

    /// Start a device code flow
    async fn device_code(&self, tenant: &str, client_id: &str) -> Result<DeviceCode, AuthError>;

    /// Block until the user finishes the device code flow
    async fn await_device_token(
        &self,
        tenant: &str,
        client_id: &str,
        code: &DeviceCode,
    ) -> Result<TokenInfo, AuthError>;

    /// Mint a token for `tenant` from an existing refresh token, without prompting
    async fn refresh(
        &self,
        tenant: &str,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<TokenInfo, AuthError>;
}

/// Azure AD v1 client
pub struct AadClient {
    client: reqwest::Client,
    identity_endpoint: String,
    resource: String,
    cancel: CancellationToken,
}

impl AadClient {
    pub fn new(client: reqwest::Client, environment: &CloudEnvironment, cancel: CancellationToken) -> Self {
        Self {
            client,
            identity_endpoint: environment.identity_endpoint.clone(),
            resource: environment.resource().to_string(),
            cancel,
        }
    }

    /// POST a form to the tenant's token endpoint and decode the body,
    /// whatever the status. Error bodies carry `error` / `error_description`.
    async fn post_token(&self, tenant: &str, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let url = constants::oauth_endpoint(&self.identity_endpoint, tenant, "token");
        let response = http::send(&self.cancel, self.client.post(&url).form(form)).await?;
        let status = response.status().as_u16();
        debug!("Token request status: {}", status);

        let body = http::text(&self.cancel, response).await?;
        match serde_json::from_str::<TokenResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(ApiError::Status { status, url, body }.into()),
        }
    }

    /// Exchange a grant for a token, failing on any error response
    async fn exchange(&self, tenant: &str, form: &[(&str, &str)]) -> Result<TokenInfo, AuthError> {
        let response = self.post_token(tenant, form).await?;
        if let Some(code) = response.error.clone() {
            return Err(AuthError::TokenRejected {
                code,
                description: response.error_description.unwrap_or_default(),
            });
        }
        TokenInfo::from_response(response).ok_or(AuthError::MissingAccessToken)
    }

    async fn pause(&self, wait: Duration) -> Result<(), AuthError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ApiError::Cancelled.into()),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}

#[async_trait]
impl IdentityApi for AadClient {
    async fn client_credentials(
        &self,
        tenant: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenInfo, AuthError> {
        let token = self
            .exchange(
                tenant,
                &[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                    ("resource", self.resource.as_str()),
                ],
            )
            .await?;
        debug!("Service principal token created for client {}", client_id);
        Ok(token)
    }

    async fn device_code(&self, tenant: &str, client_id: &str) -> Result<DeviceCode, AuthError> {
        let url = constants::oauth_endpoint(&self.identity_endpoint, tenant, "devicecode");
        let response = http::send(
            &self.cancel,
            self.client
                .post(&url)
                .form(&[("client_id", client_id), ("resource", self.resource.as_str())]),
        )
        .await?;
        let response = http::error_for_status(&self.cancel, response).await?;
        let code: DeviceCode = http::json(&self.cancel, response).await?;
        debug!("Device code issued, verification at {}", code.verification_url);
        Ok(code)
    }

    async fn await_device_token(
        &self,
        tenant: &str,
        client_id: &str,
        code: &DeviceCode,
    ) -> Result<TokenInfo, AuthError> {
        let mut interval = Duration::from_secs(code.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS));
        let lifetime = Duration::from_secs(code.expires_in.unwrap_or(DEFAULT_DEVICE_CODE_LIFETIME_SECS));
        let started = Instant::now();

        loop {
            let response = self
                .post_token(
                    tenant,
                    &[
                        ("grant_type", "device_code"),
                        ("client_id", client_id),
                        ("code", code.device_code.as_str()),
                        ("resource", self.resource.as_str()),
                    ],
                )
                .await?;

            let error = response.error.clone();
            match error.as_deref() {
                None => {
                    info!("Device code authentication completed");
                    return TokenInfo::from_response(response).ok_or(AuthError::MissingAccessToken);
                }
                Some("authorization_pending") => {}
                Some("slow_down") => interval += Duration::from_secs(SLOW_DOWN_STEP_SECS),
                Some(other) => {
                    return Err(AuthError::DeviceFlow {
                        code: other.to_string(),
                        description: response.error_description.unwrap_or_default(),
                    });
                }
            }

            if started.elapsed() + interval > lifetime {
                return Err(AuthError::DeviceFlow {
                    code: "expired_token".to_string(),
                    description: "the device code expired before authorization completed".to_string(),
                });
            }
            self.pause(interval).await?;
        }
    }

    async fn refresh(
        &self,
        tenant: &str,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<TokenInfo, AuthError> {
        self.exchange(
            tenant,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", client_id),
                ("refresh_token", refresh_token),
                ("resource", self.resource.as_str()),
            ],
        )
        .await
    }
}
