//! Environment policy, topology descriptors and the declarative resource model.
//!
//! Foundation crate -- no I/O dependencies.

pub mod env;
pub mod error;
pub mod template;
pub mod types;
pub mod units;

pub use env::{EnvironmentContext, LogLevel, RemovalPolicy, SizingTier, TierPolicy};
pub use error::{ScoutError, ScoutResult};
pub use template::{Resource, Stack, Token, Value};
pub use types::{
    CacheEndpoint, ComputeTopology, DataTopology, DeployedFunction, EndpointService,
    FunctionUnit, LayerArtifact, NetworkTopology, PackagedArtifact, PinnedRequirement, Schedule,
    TableHandle,
};
