use crate::api::client::ResourceApi;
use crate::error::ProvisionError;
use log::{debug, info};

const NO_CONTENT: u16 = 204;
const NOT_FOUND: u16 = 404;
const CREATED: u16 = 201;
const OK: u16 = 200;

/// Makes sure a resource group exists before anything is deployed into it.
///
/// An existing group is never touched: its stored region wins over whatever
/// region the caller asked for, and no conflict is reported.
pub struct ResourceGroupProvisioner<'a> {
    api: &'a dyn ResourceApi,
}

impl<'a> ResourceGroupProvisioner<'a> {
    pub fn new(api: &'a dyn ResourceApi) -> Self {
        Self { api }
    }

    /// Returns `true` only when this call created the group
    pub async fn ensure(&self, name: &str, region: &str) -> Result<bool, ProvisionError> {
        match self.api.check_group_existence(name).await? {
            NO_CONTENT => {
                debug!("Resource group {} already exists, leaving it untouched", name);
                Ok(false)
            }
            NOT_FOUND => match self.api.create_or_update_group(name, region).await? {
                CREATED => {
                    info!("Created resource group {} in {}", name, region);
                    Ok(true)
                }
                OK => {
                    debug!("Resource group {} appeared before creation", name);
                    Ok(false)
                }
                status => Err(ProvisionError::UnexpectedStatus {
                    status,
                    stage: "creation",
                }),
            },
            status => Err(ProvisionError::UnexpectedStatus {
                status,
                stage: "existence check",
            }),
        }
    }
}
