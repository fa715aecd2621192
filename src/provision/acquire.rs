//! Template acquisition from a URL or a local path
//!
//! Remote fetches follow redirects and retry transient failures themselves,
//! in an explicit loop carrying the current URL and hop depth, so both bounds
//! are enforced no matter which codes trigger the hops.

use super::policy::{FetchPolicy, StatusClass};
use crate::api::constants::headers;
use crate::error::AcquireError;
use include_dir::{Dir, include_dir};
use log::{debug, info, warn};
use reqwest::Url;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

static BUNDLED_TEMPLATES: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/templates");

/// File name of the template bundled into the binary
pub const BUNDLED_TEMPLATE: &str = "azuredeploy.json";

/// True when `location` is an absolute http(s) URL
pub fn is_remote(location: &str) -> bool {
    Url::parse(location)
        .map(|url| url.scheme().eq_ignore_ascii_case("http") || url.scheme().eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

pub struct TemplateAcquirer {
    client: reqwest::Client,
    policy: FetchPolicy,
    cancel: CancellationToken,
}

impl TemplateAcquirer {
    /// `client` must not follow redirects on its own
    pub fn new(client: reqwest::Client, policy: FetchPolicy, cancel: CancellationToken) -> Self {
        Self { client, policy, cancel }
    }

    /// Fetch template bytes from a URL, or read them from a local path
    pub async fn acquire(&self, location: &str) -> Result<Vec<u8>, AcquireError> {
        if is_remote(location) {
            let url = Url::parse(location).map_err(|_| AcquireError::UnexpectedStatus {
                status: 0,
                url: location.to_string(),
            })?;
            self.download(url).await
        } else {
            read_local(Path::new(location)).await
        }
    }

    async fn download(&self, url: Url) -> Result<Vec<u8>, AcquireError> {
        debug!("Downloading template: {}", url);

        let mut current = url;
        let mut depth: u32 = 1;

        'hops: loop {
            if depth > self.policy.max_redirects {
                return Err(AcquireError::RedirectLoop {
                    url: current.to_string(),
                });
            }

            let mut last_status = 0;
            for attempt in 1..=self.policy.max_retries {
                let response = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(AcquireError::Cancelled),
                    response = self.client.get(current.clone()).send() => response?,
                };
                let status = response.status().as_u16();

                match StatusClass::from_status_code(status) {
                    StatusClass::Accepted => {
                        let body = tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return Err(AcquireError::Cancelled),
                            body = response.bytes() => body?,
                        };
                        info!("Fetched template from {} ({} bytes)", current, body.len());
                        return Ok(body.to_vec());
                    }
                    StatusClass::Redirect => {
                        let next = response
                            .headers()
                            .get(headers::LOCATION)
                            .and_then(|value| value.to_str().ok())
                            .filter(|value| !value.is_empty())
                            .and_then(|value| current.join(value).ok())
                            .ok_or_else(|| AcquireError::MissingLocation {
                                status,
                                url: current.to_string(),
                            })?;
                        debug!("Following HTTP redirect ({}) to {}", status, next);
                        current = next;
                        depth += 1;
                        continue 'hops;
                    }
                    StatusClass::Transient => {
                        last_status = status;
                        debug!(
                            "Recoverable HTTP failure ({}) on attempt {}/{}",
                            status, attempt, self.policy.max_retries
                        );
                        if attempt < self.policy.max_retries {
                            let delay = self.policy.retry_delay(attempt);
                            tokio::select! {
                                biased;
                                _ = self.cancel.cancelled() => return Err(AcquireError::Cancelled),
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                    StatusClass::Unexpected => {
                        return Err(AcquireError::UnexpectedStatus {
                            status,
                            url: current.to_string(),
                        });
                    }
                }
            }

            return Err(AcquireError::RetriesExhausted {
                url: current.to_string(),
                last_status,
            });
        }
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, AcquireError> {
    debug!("Reading template from {:?}", path);
    tokio::fs::read(path).await.map_err(|source| AcquireError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// The template compiled into this binary
pub fn bundled_template() -> Result<Value, AcquireError> {
    let contents = BUNDLED_TEMPLATES
        .get_file(BUNDLED_TEMPLATE)
        .map(|file| file.contents())
        .ok_or_else(|| AcquireError::Read {
            path: PathBuf::from(BUNDLED_TEMPLATE),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "template not bundled"),
        })?;
    Ok(serde_json::from_slice(contents)?)
}

/// Where the template used for a run came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateOrigin {
    /// Explicitly requested by the caller
    Requested(String),
    /// Default local file
    DefaultLocal(PathBuf),
    /// Default remote link
    DefaultRemote(String),
    /// Copy bundled into the binary, used when the default link failed
    Bundled,
}

impl TemplateOrigin {
    /// Local file this template was read from, if any
    pub fn local_path(&self) -> Option<PathBuf> {
        match self {
            TemplateOrigin::Requested(location) if !is_remote(location) => Some(PathBuf::from(location)),
            TemplateOrigin::DefaultLocal(path) => Some(path.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AcquiredTemplate {
    pub document: Value,
    pub origin: TemplateOrigin,
}

/// Default template locations
#[derive(Debug, Clone)]
pub struct TemplateDefaults {
    pub local_path: PathBuf,
    pub link: String,
}

/// Pick and load the template for a run.
///
/// An explicitly requested location is terminal on failure. Without one, the
/// default local file wins when present; otherwise the default link is tried
/// and the bundled copy substituted if it cannot be fetched.
pub async fn load_template(
    acquirer: &TemplateAcquirer,
    requested: Option<&str>,
    defaults: &TemplateDefaults,
) -> Result<AcquiredTemplate, AcquireError> {
    if let Some(location) = requested.filter(|l| !l.is_empty()) {
        let bytes = acquirer.acquire(location).await?;
        return Ok(AcquiredTemplate {
            document: serde_json::from_slice(&bytes)?,
            origin: TemplateOrigin::Requested(location.to_string()),
        });
    }

    if tokio::fs::try_exists(&defaults.local_path).await.unwrap_or(false) {
        let bytes = read_local(&defaults.local_path).await?;
        return Ok(AcquiredTemplate {
            document: serde_json::from_slice(&bytes)?,
            origin: TemplateOrigin::DefaultLocal(defaults.local_path.clone()),
        });
    }

    let fetched = match acquirer.acquire(&defaults.link).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(AcquireError::from),
        Err(error) => Err(error),
    };

    match fetched {
        Ok(document) => Ok(AcquiredTemplate {
            document,
            origin: TemplateOrigin::DefaultRemote(defaults.link.clone()),
        }),
        Err(AcquireError::Cancelled) => Err(AcquireError::Cancelled),
        Err(error) => {
            warn!("Unable to fetch default template ({}), using bundled copy", error);
            Ok(AcquiredTemplate {
                document: bundled_template()?,
                origin: TemplateOrigin::Bundled,
            })
        }
    }
}
