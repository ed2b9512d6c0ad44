//! One provisioning pass: resolve → network → data → package → compute → validate.
//!
//! Any step failing aborts the pass; nothing partial is returned.

use crate::compute::{self, CodeAssets};
use crate::graph::Assembly;
use crate::{data, network, DeployTarget};
use scout_core::{
    units, ComputeTopology, DataTopology, EnvironmentContext, LayerArtifact, NetworkTopology,
    PackagedArtifact, PinnedRequirement, ScoutError, ScoutResult,
};
use scout_packager::{DependencyResolver, LockfileResolver, Packager};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Dependency manifest looked up under the project root.
pub const DEFAULT_MANIFEST: &str = "pyproject.toml";

/// Everything a pass needs from the outside world.
#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Raw environment selector; `None` means the default environment.
    pub environment: Option<String>,
    pub target: DeployTarget,
    pub project_root: PathBuf,
    /// Manifest path relative to `project_root`.
    pub manifest: PathBuf,
    /// Staging directory for artifacts and templates.
    pub out_dir: PathBuf,
}

impl PassConfig {
    pub fn new(environment: Option<String>, target: DeployTarget, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            environment,
            target,
            out_dir: project_root.join("cdk.out"),
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            project_root,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.project_root.join(&self.manifest)
    }
}

/// Result of a successful pass.
#[derive(Debug)]
pub struct Synthesis {
    pub environment: EnvironmentContext,
    pub assembly: Assembly,
    pub network: NetworkTopology,
    pub data: DataTopology,
    pub compute: ComputeTopology,
    pub requirements: Vec<PinnedRequirement>,
    pub layer: LayerArtifact,
    pub artifacts: Vec<PackagedArtifact>,
    pub elapsed: Duration,
}

/// Composes the builders in dependency order.
pub struct Orchestrator {
    config: PassConfig,
    resolver: Box<dyn DependencyResolver>,
    packager: Packager,
}

impl Orchestrator {
    pub fn new(
        config: PassConfig,
        resolver: impl DependencyResolver + 'static,
        packager: Packager,
    ) -> Self {
        Self {
            config,
            resolver: Box::new(resolver),
            packager,
        }
    }

    /// Lockfile resolver, local-then-container packaging into `out_dir`.
    pub fn with_defaults(config: PassConfig, image: &str, engine: &str) -> Self {
        let packager = Packager::with_defaults(&config.out_dir, image, engine);
        Self::new(config, LockfileResolver::new(), packager)
    }

    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    pub fn resolver_name(&self) -> &str {
        self.resolver.name()
    }

    /// Runs a full pass.
    pub fn run(&self) -> ScoutResult<Synthesis> {
        let t0 = Instant::now();
        let cfg = &self.config;
        let environment = EnvironmentContext::resolve(cfg.environment.as_deref())?;
        tracing::info!(
            environment = %environment,
            production = environment.is_production(),
            region = %cfg.target.region,
            "starting pass"
        );

        // Fail cheaply on a bad manifest before declaring anything.
        let requirements = self.resolver.resolve(&cfg.manifest_path())?;
        tracing::info!(
            resolver = self.resolver.name(),
            requirements = requirements.len(),
            "requirements pinned"
        );

        let network = network::build(&environment, &cfg.target)?;
        let data = data::build(&environment, &network.topology)?;

        let layer = self.packager.package_layer(&cfg.project_root, &requirements)?;
        let artifacts = self.packager.package_all(&cfg.project_root, &units::ALL)?;

        let compute = compute::build(
            &environment,
            &cfg.target,
            &network.topology,
            &data.topology,
            CodeAssets {
                layer: &layer,
                functions: &artifacts,
            },
        )?;

        let expected = [
            network.stack.name.clone(),
            data.stack.name.clone(),
            compute.stack.name.clone(),
        ];
        let mut assembly = Assembly::new(cfg.target.account.clone(), cfg.target.region.clone());
        assembly.add_stack(network.stack)?;
        assembly.add_stack(data.stack)?;
        assembly.add_stack(compute.stack)?;
        assembly.validate()?;

        let order = assembly.deployment_order()?;
        if order != expected.iter().map(String::as_str).collect::<Vec<_>>() {
            return Err(ScoutError::Ordering(format!(
                "stacks would deploy as {order:?}, expected {expected:?}"
            )));
        }

        let elapsed = t0.elapsed();
        tracing::info!(
            stacks = assembly.stacks().len(),
            resources = assembly.resource_count(),
            elapsed_ms = elapsed.as_millis(),
            "pass complete"
        );

        Ok(Synthesis {
            environment,
            assembly,
            network: network.topology,
            data: data.topology,
            compute: compute.topology,
            requirements,
            layer,
            artifacts,
            elapsed,
        })
    }

    /// [`Orchestrator::run`] offloaded to `spawn_blocking`; packaging and
    /// resolution block on the filesystem and child processes.
    pub async fn run_blocking(self) -> ScoutResult<Synthesis> {
        tokio::task::spawn_blocking(move || self.run())
            .await
            .map_err(|e| ScoutError::Internal(format!("spawn_blocking panicked: {e}")))?
    }
}
