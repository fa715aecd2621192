//! Azure Resource Manager API layer
//!
//! Endpoints, wire models, the paginated list abstraction and the
//! subscription-scoped [`ArmClient`] used by the provisioning pipeline.

pub mod client;
pub mod constants;
pub mod environment;
pub mod http;
pub mod models;
pub mod pagination;

pub use client::{ArmClient, DirectoryApi, ResourceApi};
pub use environment::CloudEnvironment;
pub use models::{
    Authorizer, CredentialSet, DeploymentMode, DeploymentProperties, DeploymentResult,
    DeploymentStatus, DeviceCode, ProvisioningState, SubscriptionCandidate, TenantCandidate,
    TokenInfo,
};
pub use pagination::{Page, PageSource, Paged, StaticPages};
