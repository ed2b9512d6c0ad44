//! Dependency resolution and artifact packaging for Rise Scout functions.

pub mod bundle;
pub mod container;
pub mod fingerprint;
pub mod local;
pub mod marker;
pub mod packager;
pub mod resolver;

use std::path::Path;

pub use bundle::{ArtifactKind, BundleSpec, BundleStep, SourceLayout};
pub use container::ContainerStrategy;
pub use local::LocalStrategy;
pub use packager::Packager;
pub use resolver::{DependencyResolver, LockfileResolver, UvCompileResolver};

/// Result of one strategy attempt. Failure is a value, not an error: the
/// packager decides whether to fall through to the next strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Built,
    Failed(String),
}

/// One way of executing a [`BundleSpec`] into an output directory.
///
/// Implementations must not panic or propagate errors; every problem is
/// reported as [`StrategyOutcome::Failed`]. The output directory exists and
/// is empty when `try_bundle` is called.
pub trait BuildStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this strategy may build the given artifact kind at all.
    fn supports(&self, kind: ArtifactKind) -> bool;

    fn try_bundle(&self, spec: &BundleSpec, output_dir: &Path) -> StrategyOutcome;
}
