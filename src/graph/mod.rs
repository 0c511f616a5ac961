//! Synthesized resource graph and template rendering.
//!
//! The graph is the product of synthesis: logical resource names mapped
//! to typed resource definitions, plus the parameter and output bindings
//! used for cross-stack composition.

mod resource;
mod template;

pub use resource::{
    get_att, logical_id, ref_to, OutputBinding, ParameterBinding, Resource, ResourceGraph,
    ResourceKind,
};
pub use template::{TemplateFormat, TemplateRenderer};
