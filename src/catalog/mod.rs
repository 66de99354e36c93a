//! Resource descriptor catalog.
//!
//! The catalog is the static list of resources an environment is expected
//! to contain, each with a logical name, a kind, a native ID template, the
//! declarative engine address that manages it, and its dependencies.
//! It is built once per run and never changes afterwards.

mod descriptor;
mod graph;
mod hash;
mod registry;
mod template;

pub use descriptor::{ResourceDescriptor, ResourceKind};
pub use graph::topological_order;
pub use hash::CatalogHasher;
pub use registry::Catalog;
pub use template::{NativeIdTemplate, Placeholder, TemplateParams};
