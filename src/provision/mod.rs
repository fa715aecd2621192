//! Template acquisition, resource group ensure, deployment and the run
//! orchestration that ties them together

pub mod acquire;
pub mod cache;
pub mod groups;
pub mod invoker;
pub mod orchestrator;
pub mod parameters;
pub mod pipeline;
pub mod policy;

pub use acquire::{AcquiredTemplate, TemplateAcquirer, TemplateDefaults, TemplateOrigin, load_template};
pub use cache::{ArtifactSink, FileCache};
pub use groups::ResourceGroupProvisioner;
pub use invoker::DeploymentInvoker;
pub use orchestrator::{BranchStatus, CacheJob, DeploymentJob, DeploymentOutcome, Orchestrator, RunPlan, RunReport};
pub use parameters::DeploymentParameters;
pub use pipeline::{Pipeline, RunSummary};
pub use policy::{FetchPolicy, StatusClass};
