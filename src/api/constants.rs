//! API constants for the Azure identity and resource manager endpoints

/// Public client id used for the device code flow (the Azure CLI's)
pub const DEVICE_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

/// Tenant placeholder meaning "not yet known"
pub const COMMON_TENANT: &str = "common";

/// api-version for tenant and subscription listing
pub const SUBSCRIPTIONS_API_VERSION: &str = "2016-06-01";

/// api-version for resource groups and deployments
pub const RESOURCES_API_VERSION: &str = "2017-05-10";

/// Prefix of the user agent sent with every request
pub const USER_AGENT_PREFIX: &str = "azure-provision";

/// Standard headers
pub mod headers {
    pub const CONTENT_TYPE_JSON: &str = "application/json";
    pub const LOCATION: &str = "Location";
    pub const RETRY_AFTER: &str = "Retry-After";
    pub const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";
}

/// Build the user agent string for this build
pub fn user_agent() -> String {
    format!("{}/{}", USER_AGENT_PREFIX, env!("CARGO_PKG_VERSION"))
}

/// Tenant listing endpoint
pub fn tenants_endpoint(resource_manager: &str) -> String {
    format!(
        "{}/tenants?api-version={}",
        resource_manager.trim_end_matches('/'),
        SUBSCRIPTIONS_API_VERSION
    )
}

/// Subscription listing endpoint
pub fn subscriptions_endpoint(resource_manager: &str) -> String {
    format!(
        "{}/subscriptions?api-version={}",
        resource_manager.trim_end_matches('/'),
        SUBSCRIPTIONS_API_VERSION
    )
}

/// Resource group endpoint
pub fn resource_group_endpoint(resource_manager: &str, subscription: &str, group: &str) -> String {
    format!(
        "{}/subscriptions/{}/resourcegroups/{}?api-version={}",
        resource_manager.trim_end_matches('/'),
        urlencoding::encode(subscription),
        urlencoding::encode(group),
        RESOURCES_API_VERSION
    )
}

/// Deployment endpoint inside a resource group
pub fn deployment_endpoint(
    resource_manager: &str,
    subscription: &str,
    group: &str,
    deployment: &str,
) -> String {
    format!(
        "{}/subscriptions/{}/resourcegroups/{}/providers/Microsoft.Resources/deployments/{}?api-version={}",
        resource_manager.trim_end_matches('/'),
        urlencoding::encode(subscription),
        urlencoding::encode(group),
        urlencoding::encode(deployment),
        RESOURCES_API_VERSION
    )
}

/// OAuth endpoint for a tenant (`devicecode` or `token`)
pub fn oauth_endpoint(identity: &str, tenant: &str, leaf: &str) -> String {
    format!(
        "{}/{}/oauth2/{}",
        identity.trim_end_matches('/'),
        urlencoding::encode(tenant),
        leaf
    )
}

/// Portal page for a resource group
pub fn portal_link(portal: &str, subscription: &str, group: &str) -> String {
    format!(
        "{}/#resource/subscriptions/{}/resourceGroups/{}/overview",
        portal.trim_end_matches('/'),
        subscription,
        group
    )
}
