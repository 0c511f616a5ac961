//! Remote collaborators: cluster description, tag-based lookup, template
//! upload, and deployment.
//!
//! Everything async lives here; the synthesis core never performs I/O.

mod cluster;
mod deployer;
mod lookup;
mod uploader;

pub use cluster::{descriptor_from_spec, ClusterResolver};
pub use deployer::{
    template_source, ChangeSetPlan, DeployOptions, PlannedChange, StackDeployer, TemplateSource,
    TEMPLATE_BODY_LIMIT,
};
pub use lookup::ResourceLookup;
pub use uploader::TemplateUploader;
