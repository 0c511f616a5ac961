// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Stacksmith
//!
//! A declarative compose-to-cloud synthesis engine for containerized
//! services.
//!
//! ## Overview
//!
//! Stacksmith translates an extended compose document into a fully
//! cross-referenced graph of cloud infrastructure resource definitions,
//! suitable for declarative deployment:
//!
//! - Group services into task families sharing one compute/network/IAM
//!   boundary
//! - Merge ports, networks, scaling, secrets and environment per family
//! - Resolve load balancer target references across families and
//!   synthesize routing rules
//! - Render the resulting graph as a CloudFormation template and deploy
//!   it directly or through a change-set plan
//!
//! ## Architecture
//!
//! Synthesis is a deterministic, single-threaded two-phase pipeline:
//!
//! 1. **Compose**: every family is composed in declaration order
//! 2. **Resolve**: inter-family references (listener targets) are
//!    resolved and the dependent resources synthesized
//!
//! ## Modules
//!
//! - [`compose`]: compose document parsing and validation
//! - [`synth`]: the resource synthesis engine
//! - [`graph`]: the output resource graph and template rendering
//! - [`cloud`]: remote collaborators (cluster, lookup, upload, deploy)
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! services:
//!   web:
//!     image: ghcr.io/acme/web:1.4
//!     ports:
//!       - "80"
//!     deploy:
//!       labels:
//!         ecs.task.family: frontend
//!
//! x-elbv2:
//!   public:
//!     type: alb
//!     listeners:
//!       - port: 80
//!         protocol: HTTP
//!         targets:
//!           - name: frontend:web:80
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod cloud;
pub mod compose;
pub mod error;
pub mod graph;
pub mod synth;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use cloud::{ClusterResolver, ResourceLookup, StackDeployer, TemplateUploader};
pub use compose::{ComposeDocument, ComposeParser, ComposeValidator, DocumentHasher};
pub use error::{Result, StacksmithError};
pub use graph::{ResourceGraph, TemplateFormat, TemplateRenderer};
pub use synth::{ClusterDescriptor, SynthContext, Synthesizer};
