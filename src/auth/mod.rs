//! Credential resolution
//!
//! Service principal and device code authentication against Azure AD, plus
//! tenant discovery for device-code tokens issued without a tenant.

pub mod client;
pub mod resolver;
pub mod tenant;

pub use client::{AadClient, IdentityApi};
pub use resolver::{CredentialResolver, ResolvedIdentity, known_tenant, redact_secret, select_credentials};
pub use tenant::TenantLocator;
