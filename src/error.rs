//! Error taxonomy for a provisioning run
//!
//! Each stage of the pipeline owns its own error type so callers can tell a
//! provider-reported failure apart from a cancelled wait. [`Error`] wraps them
//! all for the top-level run.

use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to an HTTP endpoint (identity or resource manager)
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status code {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request cancelled before completion")]
    Cancelled,
}

/// Credential resolution failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("--client-id and --client-secret must be specified together or not at all")]
    IncompleteCredentials,

    #[error("tenant inference unsupported with service principal authentication, provide a tenant id")]
    MissingTenant,

    #[error("device code authentication failed ({code}): {description}")]
    DeviceFlow { code: String, description: String },

    #[error("token request rejected ({code}): {description}")]
    TokenRejected { code: String, description: String },

    #[error("token endpoint returned no access token")]
    MissingAccessToken,

    #[error("token cannot be refreshed for another tenant: no refresh token was issued")]
    MissingRefreshToken,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The target subscription is not visible under any tenant the caller can reach
#[derive(Debug, Error)]
#[error("unable to find subscription: {subscription}")]
pub struct NotFoundError {
    pub subscription: String,
}

/// Template acquisition failures
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("too many redirects while fetching {url}")]
    RedirectLoop { url: String },

    #[error("too many attempts fetching {url} (last status {last_status})")]
    RetriesExhausted { url: String, last_status: u16 },

    #[error("unexpected status code {status} fetching {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("redirect ({status}) from {url} carried no usable Location header")]
    MissingLocation { status: u16, url: String },

    #[error("unable to read template {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("template request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("template download cancelled")]
    Cancelled,
}

/// Resource group ensure failures
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("unexpected status code {status} during resource group {stage}")]
    UnexpectedStatus { status: u16, stage: &'static str },

    #[error("resource group operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Api(ApiError),
}

impl From<ApiError> for ProvisionError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Cancelled => ProvisionError::Cancelled,
            other => ProvisionError::Api(other),
        }
    }
}

/// Deployment submission and polling failures
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("deployment {deployment} finished with state {state}: {message}")]
    Failed {
        deployment: String,
        state: String,
        message: String,
    },

    #[error("stopped waiting for deployment {deployment}: deadline expired (the deployment itself may still succeed)")]
    Cancelled { deployment: String },

    #[error("unable to ensure resource group: {0}")]
    ResourceGroup(ProvisionError),

    #[error(transparent)]
    Api(ApiError),
}

impl DeployError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            DeployError::Cancelled { .. } => true,
            DeployError::ResourceGroup(ProvisionError::Cancelled) => true,
            _ => false,
        }
    }
}

/// Artifact cache write failures, reported but never fatal
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("unable to serialize artifact for {path:?}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache write to {path:?} cancelled: deadline expired")]
    Cancelled { path: PathBuf },
}

/// Top-level error for a provisioning run
#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to authenticate: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("unable to fetch template: {0}")]
    Acquire(#[from] AcquireError),

    #[error("unable to fetch or create resource group: {0}")]
    Provision(#[from] ProvisionError),

    #[error("deployment failed: {0}")]
    Deploy(#[from] DeployError),

    #[error("unable to cache artifact: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{branch} task aborted: {reason}")]
    TaskAborted { branch: &'static str, reason: String },
}

impl Error {
    /// True for any error caused by the shared deadline expiring
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Auth(AuthError::Api(ApiError::Cancelled)) => true,
            Error::Acquire(AcquireError::Cancelled) => true,
            Error::Provision(ProvisionError::Cancelled) => true,
            Error::Deploy(error) => error.is_cancelled(),
            Error::Cache(CacheError::Cancelled { .. }) => true,
            Error::Api(ApiError::Cancelled) => true,
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
