//! Schema Context
//!
//! Descriptor types and the providers that supply them to the workflow.

pub mod descriptor;
pub mod provider;

pub use descriptor::{Column, ForeignKey, SchemaDescriptor, Table};
pub use provider::{CachedSchemaProvider, SchemaProvider, StaticSchemaProvider};
