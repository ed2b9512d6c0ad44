//! Per-unit and layer packaging with ordered strategy fallback.

use crate::bundle::{ArtifactKind, BundleSpec, SourceLayout, REQUIREMENTS_FILE};
use crate::container::ContainerStrategy;
use crate::fingerprint::fingerprint_dir;
use crate::local::LocalStrategy;
use crate::resolver::render_requirements;
use crate::{BuildStrategy, StrategyOutcome};
use rayon::prelude::*;
use scout_core::{
    FunctionUnit, LayerArtifact, PackagedArtifact, PinnedRequirement, ScoutError, ScoutResult,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Builds deployable directories under a staging root.
///
/// Strategies are tried in registration order; the first that reports
/// [`StrategyOutcome::Built`] wins. Each artifact owns its output directory,
/// which is wiped before every attempt.
///
/// ```ignore
/// let packager = Packager::with_defaults("cdk.out", "public.ecr.aws/sam/build-python3.11", "docker");
/// let artifact = packager.package(project_root, &units::SCORE_DECAY)?;
/// ```
pub struct Packager {
    staging_root: PathBuf,
    layout: SourceLayout,
    strategies: Vec<Box<dyn BuildStrategy>>,
}

impl Packager {
    /// A packager with no strategies; add them with [`Packager::with_strategy`].
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            layout: SourceLayout::default(),
            strategies: Vec::new(),
        }
    }

    /// Local fast path first, then the container fallback.
    pub fn with_defaults(
        staging_root: impl Into<PathBuf>,
        image: impl Into<String>,
        engine: impl Into<String>,
    ) -> Self {
        Self::new(staging_root)
            .with_strategy(LocalStrategy::new())
            .with_strategy(ContainerStrategy::new(engine, image))
    }

    pub fn with_strategy(mut self, strategy: impl BuildStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn with_layout(mut self, layout: SourceLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Output directory reserved for an artifact.
    pub fn output_dir(&self, artifact: &str) -> PathBuf {
        self.staging_root.join(format!("asset.{artifact}"))
    }

    /// Packages one function unit: shared library plus that unit's handler.
    pub fn package(&self, project_root: &Path, unit: &FunctionUnit) -> ScoutResult<PackagedArtifact> {
        let spec = BundleSpec::for_unit(&self.layout, project_root, unit);
        let output_directory = self.output_dir(unit.logical_name);
        let strategy = self.build(&spec, &output_directory)?;
        let fingerprint = fingerprint_dir(&output_directory)?;

        tracing::info!(unit = unit.logical_name, strategy, fingerprint = %&fingerprint[..12], "packaged unit");
        Ok(PackagedArtifact {
            unit: unit.logical_name.to_string(),
            output_directory,
            fingerprint,
            strategy: strategy.to_string(),
        })
    }

    /// Packages every unit in parallel. Any failure fails the whole batch.
    pub fn package_all(
        &self,
        project_root: &Path,
        units: &[FunctionUnit],
    ) -> ScoutResult<Vec<PackagedArtifact>> {
        let results: Vec<ScoutResult<PackagedArtifact>> = units
            .par_iter()
            .map(|unit| self.package(project_root, unit))
            .collect();
        results.into_iter().collect()
    }

    /// Writes the pinned requirement list into the layer input directory and
    /// installs it under `python/` in the layer output.
    pub fn package_layer(
        &self,
        project_root: &Path,
        requirements: &[PinnedRequirement],
    ) -> ScoutResult<LayerArtifact> {
        let input_dir = project_root.join(&self.layout.layer_input);
        fs::create_dir_all(&input_dir)
            .map_err(|e| ScoutError::io(format!("create {}", input_dir.display()), e))?;
        let req_path = input_dir.join(REQUIREMENTS_FILE);
        fs::write(&req_path, render_requirements(requirements))
            .map_err(|e| ScoutError::io(format!("write {}", req_path.display()), e))?;

        let spec = BundleSpec::for_layer(&input_dir);
        let output_directory = self.output_dir(&spec.name);
        let strategy = self.build(&spec, &output_directory)?;
        let fingerprint = fingerprint_dir(&output_directory)?;

        tracing::info!(
            requirements = requirements.len(),
            strategy,
            fingerprint = %&fingerprint[..12],
            "packaged layer"
        );
        Ok(LayerArtifact {
            output_directory,
            fingerprint,
            strategy: strategy.to_string(),
            requirement_count: requirements.len(),
        })
    }

    /// Runs applicable strategies in order and returns the winner's name.
    fn build(&self, spec: &BundleSpec, output_dir: &Path) -> ScoutResult<&str> {
        let mut attempts = Vec::new();

        for strategy in &self.strategies {
            if !strategy.supports(spec.kind) {
                tracing::debug!(artifact = %spec.name, strategy = strategy.name(), "strategy not applicable");
                continue;
            }

            reset_dir(output_dir)
                .map_err(|e| ScoutError::io(format!("reset {}", output_dir.display()), e))?;

            match strategy.try_bundle(spec, output_dir) {
                StrategyOutcome::Built => return Ok(strategy.name()),
                StrategyOutcome::Failed(reason) => {
                    tracing::warn!(artifact = %spec.name, strategy = strategy.name(), %reason, "strategy failed, trying next");
                    attempts.push(format!("{}: {reason}", strategy.name()));
                }
            }
        }

        // Never leave a half-built directory behind.
        let _ = fs::remove_dir_all(output_dir);

        let reason = if attempts.is_empty() {
            match spec.kind {
                ArtifactKind::Function => "no build strategy configured".to_string(),
                ArtifactKind::Layer => "no strategy can build a dependency layer".to_string(),
            }
        } else {
            format!("all strategies failed ({})", attempts.join("; "))
        };
        Err(ScoutError::packaging(&spec.name, reason))
    }
}

fn reset_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}
