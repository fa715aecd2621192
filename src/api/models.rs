use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime};

/// How the caller proves its identity. Exactly one form is active per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSet {
    /// Non-interactive service principal
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    /// Interactive device code flow against the public CLI client
    DeviceCode,
}

const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Token returned by the identity endpoint
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub refresh_token: Option<String>,
}

impl TokenInfo {
    /// Build from a raw token response, defaulting lifetime to one hour
    pub fn from_response(response: TokenResponse) -> Option<Self> {
        let access_token = response.access_token?;
        let expires_in = response
            .expires_in
            .as_ref()
            .and_then(|value| match value {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

        let now = SystemTime::now();
        let expires_at = now
            .checked_add(Duration::from_secs(expires_in))
            .unwrap_or(now + Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS));

        Some(Self {
            access_token,
            expires_at,
            refresh_token: response.refresh_token,
        })
    }
}

/// Wire shape of a v1 token response (success or error)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// v1 endpoints send this as a string, v2 as a number
    pub expires_in: Option<Value>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Device code handed to the user to authorise on another device
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    #[serde(alias = "verification_uri")]
    pub verification_url: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub expires_in: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub interval: Option<u64>,
}

impl DeviceCode {
    /// Text shown to the user
    pub fn prompt(&self) -> String {
        self.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
                self.verification_url, self.user_code
            )
        })
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }))
}

/// Bearer-token authorizer attached to resource manager requests
#[derive(Debug, Clone)]
pub struct Authorizer {
    token: TokenInfo,
}

impl Authorizer {
    pub fn bearer(token: TokenInfo) -> Self {
        Self { token }
    }

    pub fn access_token(&self) -> &str {
        &self.token.access_token
    }
}

/// A tenant reachable by the current credentials
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantCandidate {
    pub tenant_id: String,
}

/// A subscription visible under some tenant
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCandidate {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// One page of a resource manager list call
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

/// Resource group body for create-or-update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub location: String,
}

/// Deployment mode. Resources outside the template are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentMode {
    Incremental,
}

/// The deployment definition: template, parameter values and mode
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentProperties {
    pub template: Value,
    pub parameters: Value,
    pub mode: DeploymentMode,
}

#[derive(Debug, Serialize)]
pub struct DeploymentRequest<'a> {
    pub properties: &'a DeploymentProperties,
}

/// Provisioning state reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningState {
    Succeeded,
    Failed,
    Canceled,
    Running(String),
}

impl ProvisioningState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            s if s.eq_ignore_ascii_case("Succeeded") => ProvisioningState::Succeeded,
            s if s.eq_ignore_ascii_case("Failed") => ProvisioningState::Failed,
            s if s.eq_ignore_ascii_case("Canceled") || s.eq_ignore_ascii_case("Cancelled") => {
                ProvisioningState::Canceled
            }
            other => ProvisioningState::Running(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProvisioningState::Running(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProvisioningState::Succeeded => "Succeeded",
            ProvisioningState::Failed => "Failed",
            ProvisioningState::Canceled => "Canceled",
            ProvisioningState::Running(state) => state,
        }
    }
}

/// Snapshot of a deployment as read back from the provider
#[derive(Debug, Clone)]
pub struct DeploymentStatus {
    pub state: ProvisioningState,
    /// Provider error text, when a failed deployment carries one
    pub error: Option<String>,
    /// Hint from `Retry-After`
    pub retry_after: Option<Duration>,
}

/// Wire shape of a deployment GET/PUT response
#[derive(Debug, Deserialize)]
pub struct DeploymentResponse {
    #[serde(default)]
    pub properties: Option<DeploymentResponseProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResponseProperties {
    #[serde(default)]
    pub provisioning_state: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl DeploymentResponse {
    pub fn into_status(self, retry_after: Option<Duration>) -> DeploymentStatus {
        let properties = self.properties;
        let state = properties
            .as_ref()
            .and_then(|p| p.provisioning_state.as_deref())
            .map(ProvisioningState::parse)
            .unwrap_or_else(|| ProvisioningState::Running("Accepted".to_string()));
        let error = properties.and_then(|p| p.error).map(|e| {
            e.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string())
        });
        DeploymentStatus {
            state,
            error,
            retry_after,
        }
    }
}

/// Terminal outcome of a deployment, for user-facing reporting only
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    pub deployment: String,
    pub state: ProvisioningState,
    pub portal_url: String,
}
