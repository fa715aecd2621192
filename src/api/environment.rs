use crate::error::Error;

/// Named set of Azure service endpoints, selected once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEnvironment {
    pub name: String,
    pub identity_endpoint: String,
    pub resource_manager_endpoint: String,
    pub portal_url: String,
    pub site_suffix: String,
}

pub const DEFAULT_ENVIRONMENT: &str = "AzurePublicCloud";

impl CloudEnvironment {
    pub fn public() -> Self {
        Self::new(
            "AzurePublicCloud",
            "https://login.microsoftonline.com/",
            "https://management.azure.com/",
            "https://portal.azure.com",
            "azurewebsites.net",
        )
    }

    pub fn china() -> Self {
        Self::new(
            "AzureChinaCloud",
            "https://login.chinacloudapi.cn/",
            "https://management.chinacloudapi.cn/",
            "https://portal.azure.cn",
            "chinacloudsites.cn",
        )
    }

    pub fn us_government() -> Self {
        Self::new(
            "AzureUSGovernmentCloud",
            "https://login.microsoftonline.us/",
            "https://management.usgovcloudapi.net/",
            "https://portal.azure.us",
            "azurewebsites.us",
        )
    }

    pub fn german() -> Self {
        Self::new(
            "AzureGermanCloud",
            "https://login.microsoftonline.de/",
            "https://management.microsoftazure.de/",
            "https://portal.microsoftazure.de",
            "azurewebsites.de",
        )
    }

    /// Custom endpoints, mostly for pointing the clients at a local server
    pub fn new(
        name: &str,
        identity_endpoint: &str,
        resource_manager_endpoint: &str,
        portal_url: &str,
        site_suffix: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            identity_endpoint: identity_endpoint.to_string(),
            resource_manager_endpoint: resource_manager_endpoint.to_string(),
            portal_url: portal_url.to_string(),
            site_suffix: site_suffix.to_string(),
        }
    }

    /// Look up a well-known cloud by name (case-insensitive)
    pub fn from_name(name: &str) -> Result<Self, Error> {
        [Self::public(), Self::china(), Self::us_government(), Self::german()]
            .into_iter()
            .find(|env| env.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| Error::Config(format!("unknown Azure environment '{}'", name)))
    }

    /// The audience tokens are requested for
    pub fn resource(&self) -> &str {
        &self.resource_manager_endpoint
    }

    pub fn site_url(&self, site_name: &str) -> String {
        format!("https://{}.{}", site_name, self.site_suffix)
    }
}

impl Default for CloudEnvironment {
    fn default() -> Self {
        Self::public()
    }
}
