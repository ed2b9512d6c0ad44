//! Topology descriptors and artifact types threaded between builders.
//!
//! Each builder produces exactly one of these and later builders consume it.
//! Nothing here is mutated after construction.

use crate::template::Token;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Port the cache cluster listens on.
pub const CACHE_PORT: u16 = 6379;

/// Logical database index used in the cache connection URL.
pub const CACHE_DATABASE: u8 = 0;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Private connectivity targets reachable from the compute tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EndpointService {
    /// Search-index control plane.
    Search,
    /// Model-inference runtime.
    Inference,
    /// Identity / token service.
    Identity,
    /// Key-value table service (gateway endpoint).
    Table,
}

impl EndpointService {
    pub const ALL: [EndpointService; 4] = [
        EndpointService::Search,
        EndpointService::Inference,
        EndpointService::Identity,
        EndpointService::Table,
    ];

    /// Service suffix in `com.amazonaws.<region>.<suffix>`.
    pub fn service_suffix(self) -> &'static str {
        match self {
            Self::Search => "aoss",
            Self::Inference => "bedrock-runtime",
            Self::Identity => "sts",
            Self::Table => "dynamodb",
        }
    }

    /// Gateway endpoints attach to route tables, not subnets.
    pub fn is_gateway(self) -> bool {
        matches!(self, Self::Table)
    }
}

impl fmt::Display for EndpointService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_suffix())
    }
}

/// Two availability zones → two subnets per tier, kept inline.
pub type SubnetIds = SmallVec<[Token; 2]>;

/// Outputs of the network builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkTopology {
    pub network_id: Token,
    pub private_subnet_ids: SubnetIds,
    pub public_subnet_ids: SubnetIds,
    pub compute_security_group_id: Token,
    pub endpoint_ids: BTreeMap<EndpointService, Token>,
    pub nat_gateway_count: usize,
}

impl NetworkTopology {
    pub fn endpoint(&self, service: EndpointService) -> Option<&Token> {
        self.endpoint_ids.get(&service)
    }
}

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

/// Table name plus its partition key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableHandle {
    pub name: String,
    pub partition_key: String,
    pub arn: Token,
}

/// Cache node address; the port is fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEndpoint {
    pub host: Token,
    pub port: u16,
}

/// Outputs of the data builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTopology {
    /// Known only after the collection is created.
    pub search_collection_endpoint: Token,
    pub search_collection_arn: Token,
    pub table: TableHandle,
    pub cache: CacheEndpoint,
    pub cache_node_type: String,
}

// ---------------------------------------------------------------------------
// Compute
// ---------------------------------------------------------------------------

/// One deployable function in the fixed catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FunctionUnit {
    /// Kebab-case name, e.g. `score-decay`.
    pub logical_name: &'static str,
    /// Template logical id, e.g. `ScoreDecay`.
    pub construct_id: &'static str,
    /// Handler directory under the units root, e.g. `score_decay`.
    pub source_subdir: &'static str,
    pub timeout: Duration,
    pub memory_size: u32,
}

impl FunctionUnit {
    /// `rise-scout-<logical>-<env>`; unique per environment because logical
    /// names are unique.
    pub fn deployed_name(&self, environment: &str) -> String {
        format!("rise-scout-{}-{environment}", self.logical_name)
    }

    /// Dotted entry point into the packaged layout.
    pub fn handler_path(&self) -> String {
        format!("lambdas.{}.handler.handler", self.source_subdir)
    }
}

/// Time-based trigger expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schedule {
    /// Fixed time of day, UTC.
    Daily { hour: u8, minute: u8 },
    /// Fixed interval in minutes.
    Every { minutes: u32 },
}

impl Schedule {
    pub fn expression(&self) -> String {
        match self {
            Self::Daily { hour, minute } => format!("cron({minute} {hour} * * ? *)"),
            Self::Every { minutes: 1 } => "rate(1 minute)".to_string(),
            Self::Every { minutes } => format!("rate({minutes} minutes)"),
        }
    }
}

/// A function instance in the compute stack.
#[derive(Debug, Clone, Serialize)]
pub struct DeployedFunction {
    pub unit: FunctionUnit,
    pub deployed_name: String,
    pub arn: Token,
    pub schedule: Option<Schedule>,
}

/// Outputs of the compute builder.
#[derive(Debug, Clone, Serialize)]
pub struct ComputeTopology {
    pub role_arn: Token,
    pub layer_arn: Token,
    pub functions: Vec<DeployedFunction>,
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Packaged code for one function unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagedArtifact {
    pub unit: String,
    pub output_directory: PathBuf,
    /// Hex SHA-256 over relative paths and file contents.
    pub fingerprint: String,
    /// Name of the strategy that produced the output.
    pub strategy: String,
}

/// Installed third-party dependency tree shared by all functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerArtifact {
    pub output_directory: PathBuf,
    pub fingerprint: String,
    pub strategy: String,
    pub requirement_count: usize,
}

/// One `name==version` line of the layer's requirement list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PinnedRequirement {
    pub name: String,
    pub version: String,
}

impl fmt::Display for PinnedRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}
