// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
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

//! # infra-converge
//!
//! Idempotent reconciliation of cloud infrastructure against a declarative
//! engine's tracked state.
//!
//! ## Overview
//!
//! Infrastructure that was created by hand, by an earlier run that crashed,
//! or by another tool is invisible to Terraform until it is imported. This
//! crate closes that gap:
//!
//! - Describe every resource Terraform should manage in `converge.yaml`
//! - Probe AWS or Azure for each one through the provider CLI
//! - Read what Terraform already tracks from its state file (local or S3)
//! - Import what exists but is untracked, and leave creation to `terraform apply`
//! - Report conflicts between live and tracked IDs instead of guessing
//!
//! ## Architecture
//!
//! 1. **Catalog**: resource descriptors in dependency order
//! 2. **Live state**: probed with timeouts and bounded retries
//! 3. **Tracked state**: parsed from Terraform state format v4
//! 4. **Planner**: one action per resource (noop, import, create, conflict)
//! 5. **Executor**: runs imports, isolates failures, defers creates
//! 6. **Report**: converged or needs attention
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`catalog`]: Resource descriptors, templates and ordering
//! - [`cloud`]: Provider CLI queries
//! - [`probe`]: Live state probing
//! - [`state`]: Tracked state backends (local, S3) and the run lock
//! - [`engine`]: Declarative engine interface (Terraform)
//! - [`planner`]: Planning and execution
//! - [`report`]: Convergence reporting
//! - [`confirm`]: Operator confirmation prompts
//! - [`reconciler`]: Run orchestration
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: runners
//!   environment: prod
//!   region: us-east-1
//!   provider: aws
//!
//! state:
//!   backend: s3
//!   bucket: my-tf-state
//!   key: runners/terraform.tfstate
//!
//! resources:
//!   - name: vpc
//!     kind: network
//!     native_id: "{project}-{environment}-vpc"
//!     address: aws_vpc.main
//!   - name: runner
//!     kind: compute
//!     native_id: "{project}-{environment}-runner"
//!     address: aws_instance.runner
//!     depends_on: [vpc]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod catalog;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod confirm;
pub mod engine;
pub mod error;
pub mod planner;
pub mod probe;
pub mod reconciler;
pub mod report;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use catalog::{Catalog, CatalogHasher, ResourceDescriptor, ResourceKind};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, ConvergeConfig};
pub use error::{ConvergeError, Result};
pub use planner::{ActionExecutor, Planner, ReconciliationAction, ReconciliationPlan};
pub use reconciler::{DriftReport, Reconciler, RunMode};
pub use report::{ConvergenceReport, RunStatus};
pub use state::{LocalStateSource, S3StateSource, TrackedStateReader, TrackedStateSource};
