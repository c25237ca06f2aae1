//! Model metadata, catalog cache, aliases and the upstream client

pub mod alias;
pub mod catalog;
pub mod client;
pub mod descriptor;
pub mod discovery;

pub use alias::{AliasResolver, AliasTable, ResolutionSource, ResolvedModel};
pub use catalog::{
    CATALOG_TTL, CatalogCache, CatalogStatus, Clock, REFRESH_RETRY_COOLDOWN, SystemClock,
};
pub use client::{
    CatalogProvider, CompletionProvider, CompletionRequest, OpenRouterClient, UpstreamError,
};
pub use descriptor::{ModelCatalog, ModelDescriptor, RawModel};
pub use discovery::DiscoveryFilter;
