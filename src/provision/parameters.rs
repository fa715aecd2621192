//! Deployment parameter documents
//!
//! Parameters live in a `BTreeMap` so cached files come out in a stable
//! order from run to run.

use crate::error::Error;
use log::debug;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub const PARAMETERS_SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2015-01-01/deploymentParameters.json#";
pub const CONTENT_VERSION: &str = "1.0.0.0";

/// Parameter names understood by the bundled template
pub mod keys {
    pub const NAME: &str = "name";
    pub const DATABASE: &str = "database";
    pub const DATABASE_NAME: &str = "databaseName";
    pub const IMAGE_NAME: &str = "imageName";
    pub const DATABASE_ADMIN: &str = "databaseAdministratorLogin";
    pub const DATABASE_PASSWORD: &str = "databaseAdministratorLoginPassword";
    pub const DOCKER_ACCESS: &str = "dockerRegistryAccess";
    pub const DOCKER_URL: &str = "dockerRegistryServerURL";
    pub const DOCKER_USERNAME: &str = "dockerRegistryServerUsername";
    pub const DOCKER_PASSWORD: &str = "dockerRegistryServerPassword";
}

/// Keys dropped from every cached copy
pub const SECRET_KEYS: [&str; 2] = [keys::DATABASE_PASSWORD, keys::DOCKER_PASSWORD];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentParameter {
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentParameters {
    #[serde(rename = "$schema", default = "default_schema")]
    pub schema: String,
    #[serde(rename = "contentVersion", default = "default_content_version")]
    pub content_version: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, DeploymentParameter>,
}

fn default_schema() -> String {
    PARAMETERS_SCHEMA.to_string()
}

fn default_content_version() -> String {
    CONTENT_VERSION.to_string()
}

impl Default for DeploymentParameters {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            content_version: default_content_version(),
            parameters: BTreeMap::new(),
        }
    }
}

impl DeploymentParameters {
    /// Read a parameters file. A missing file is only an error when the
    /// caller named it explicitly.
    pub async fn load(path: &Path, explicit: bool) -> Result<Self, Error> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                debug!("No parameters file at {:?}, starting empty", path);
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::Config(format!("unable to load parameters file {:?}: {}", path, e)));
            }
        };

        let parsed: Self = serde_json::from_slice(&contents)
            .map_err(|e| Error::Config(format!("unable to parse parameters file {:?}: {}", path, e)))?;
        debug!("Loaded {} parameter(s) from {:?}", parsed.parameters.len(), path);
        Ok(parsed)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key).map(|p| &p.value)
    }

    /// String value of `key`, ignoring non-string and empty values
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.parameters.insert(key.to_string(), DeploymentParameter { value: value.into() });
    }

    /// Copy with every secret-bearing key removed
    pub fn sanitized(&self) -> Self {
        let mut copy = self.clone();
        for key in SECRET_KEYS {
            copy.parameters.remove(key);
        }
        copy
    }

    /// The `{name: {"value": v}}` map a deployment request carries
    pub fn template_parameters(&self) -> Value {
        serde_json::to_value(&self.parameters).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

const LOWER_ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const SITE_NAME_PREFIX: &str = "buffalo-app";
pub const PASSWORD_PREFIX: &str = "MSFT+Buffalo-";
pub const PASSWORD_LENGTH: usize = 20;

fn random_string(charset: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| charset[rng.random_range(0..charset.len())] as char)
        .collect()
}

/// `buffalo-app-` followed by ten random lowercase letters or digits
pub fn generate_site_name() -> String {
    format!("{}-{}", SITE_NAME_PREFIX, random_string(LOWER_ALPHANUMERIC, 10))
}

/// Random database password, `PASSWORD_LENGTH` characters including the prefix
pub fn generate_password() -> String {
    let tail = PASSWORD_LENGTH.saturating_sub(PASSWORD_PREFIX.len());
    format!("{}{}", PASSWORD_PREFIX, random_string(ALPHANUMERIC, tail))
}

static RESOURCE_GROUP_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-\w.()]{0,89}[-\w()]$").expect("resource group pattern compiles"));

/// Resource group names: 1-90 letters, digits, `_ - . ( )`, not ending in `.`
pub fn validate_resource_group_name(name: &str) -> Result<(), Error> {
    if RESOURCE_GROUP_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid resource group name '{}'", name)))
    }
}
