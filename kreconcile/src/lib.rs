//! Reconcile a package of Kubernetes style resources through a single filter.
//!
//! A run resolves a filter specification, loads every resource of the package, applies the filter
//! to the whole collection and writes the result back to the files it came from, or to a stream.

pub mod collection;
pub mod error;
pub mod fieldpath;
pub mod filter;
pub mod loader;
pub mod manifest;
pub mod pipeline;
pub mod resource;
pub mod runtime;
pub mod specification;
pub mod writer;
pub mod yaml;

mod reslist;
mod serde_ex;
mod visit;

pub use self::collection::ResourceCollection;
pub use self::error::{Error, Result, Stage};
pub use self::filter::{Filter, FilterProvider, Registry, ResolvedFilter};
pub use self::pipeline::{Outcome, Pipeline};
pub use self::resource::{Provenance, Resource};
pub use self::runtime::{CommandRuntime, FunctionRuntime};
pub use self::specification::Specification;
pub use self::writer::Written;
