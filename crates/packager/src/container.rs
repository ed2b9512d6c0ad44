//! Containerized build strategy.
//!
//! Runs the bundle script inside the target runtime's build image with the
//! input mounted read-only at `/asset-input` and the output directory at
//! `/asset-output`. Only the container engine is required on the host.

use crate::bundle::{ArtifactKind, BundleSpec, CONTAINER_INPUT, CONTAINER_OUTPUT};
use crate::{BuildStrategy, StrategyOutcome};
use std::path::Path;
use std::process::{Command, Stdio};

/// Build image matching the function runtime.
pub const DEFAULT_BUNDLING_IMAGE: &str = "public.ecr.aws/sam/build-python3.11";

pub const DEFAULT_ENGINE: &str = "docker";

/// Keep error messages readable.
const STDERR_TAIL: usize = 2000;

/// Correctness fallback: the same steps inside the runtime image.
#[derive(Debug, Clone)]
pub struct ContainerStrategy {
    engine: String,
    image: String,
}

impl Default for ContainerStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE, DEFAULT_BUNDLING_IMAGE)
    }
}

impl ContainerStrategy {
    pub fn new(engine: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            image: image.into(),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Arguments passed to the engine. Both paths must be absolute.
    pub fn run_args(&self, spec: &BundleSpec, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "run".into(),
            "--rm".into(),
            "-v".into(),
            format!("{}:{CONTAINER_INPUT}:ro", input.display()),
            "-v".into(),
            format!("{}:{CONTAINER_OUTPUT}", output.display()),
            "-w".into(),
            CONTAINER_INPUT.into(),
            self.image.clone(),
            "bash".into(),
            "-c".into(),
            spec.script(CONTAINER_INPUT, CONTAINER_OUTPUT),
        ]
    }
}

impl BuildStrategy for ContainerStrategy {
    fn name(&self) -> &str {
        "container"
    }

    fn supports(&self, _kind: ArtifactKind) -> bool {
        true
    }

    fn try_bundle(&self, spec: &BundleSpec, output_dir: &Path) -> StrategyOutcome {
        let input = match spec.input_dir.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                return StrategyOutcome::Failed(format!(
                    "input {}: {e}",
                    spec.input_dir.display()
                ))
            }
        };
        let output = match output_dir.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                return StrategyOutcome::Failed(format!("output {}: {e}", output_dir.display()))
            }
        };

        let args = self.run_args(spec, &input, &output);
        tracing::debug!(engine = %self.engine, image = %self.image, artifact = %spec.name, "container bundling");

        let result = Command::new(&self.engine)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        match result {
            Err(e) => StrategyOutcome::Failed(format!("failed to launch {}: {e}", self.engine)),
            Ok(out) if !out.status.success() => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                let tail_start = stderr.len().saturating_sub(STDERR_TAIL);
                let tail = stderr.get(tail_start..).unwrap_or(&stderr);
                StrategyOutcome::Failed(format!(
                    "{} exited with {}: {}",
                    self.engine,
                    out.status,
                    tail.trim()
                ))
            }
            Ok(_) => StrategyOutcome::Built,
        }
    }
}
