//! Backend data sources
//!
//! Ports the tools query through, the HTTP implementations of those ports,
//! and the ordered fallback dispatcher that picks one answer per call.

pub mod client;
pub mod dispatch;
pub mod ports;

pub use client::{BackendClient, BackendSettings, GraphqlCatalog, RestCatalog};
pub use dispatch::{Answer, DispatchError, Dispatcher, NamedSource, Sourced};
pub use ports::{
    ExportRequest, Project, ProjectCatalog, SchemaCatalog, SchemaField, SourceError, SpanExporter,
    TracingSchema,
};
