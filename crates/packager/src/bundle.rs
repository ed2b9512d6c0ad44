//! Bundle step model shared by every build strategy.
//!
//! A [`BundleSpec`] is the ordered copy/install sequence for one artifact.
//! The local strategy executes the steps with `std::fs`; the container
//! strategy renders the very same steps into a shell script. Keeping one
//! description is what makes both outputs structurally identical.

use scout_core::FunctionUnit;
use std::path::{Path, PathBuf};

/// Mount point of the bundle input inside the build container.
pub const CONTAINER_INPUT: &str = "/asset-input";

/// Mount point of the bundle output inside the build container.
pub const CONTAINER_OUTPUT: &str = "/asset-output";

/// Directory the layer's packages are installed under.
pub const LAYER_PACKAGE_ROOT: &str = "python";

/// File name of the pinned requirement list inside the layer input dir.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Function,
    Layer,
}

/// Where things live in the source tree and where they land in an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    /// Shared library root, relative to the project root.
    pub shared_library: PathBuf,
    /// Directory holding one handler subdirectory per unit.
    pub units_root: PathBuf,
    /// Artifact path handlers are nested under; first segment of the
    /// dotted handler entry point.
    pub import_root: PathBuf,
    /// Staging directory for the layer's requirement list.
    pub layer_input: PathBuf,
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            shared_library: PathBuf::from("src/rise_scout"),
            units_root: PathBuf::from("src/lambdas"),
            import_root: PathBuf::from("lambdas"),
            layer_input: PathBuf::from("cdk/layers/common"),
        }
    }
}

impl SourceLayout {
    /// Name the shared library gets at the artifact root.
    pub fn shared_library_name(&self) -> PathBuf {
        self.shared_library
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.shared_library.clone())
    }
}

/// One step of a bundle. Paths are relative to the input / output roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleStep {
    /// Copy a directory tree to a new path.
    CopyTree { from: PathBuf, to: PathBuf },
    /// Create `to` and copy the (non-hidden) entries of `from` into it.
    CopyContents { from: PathBuf, to: PathBuf },
    /// Install a requirement file into `target`. Needs the target runtime.
    PipInstall { requirements: PathBuf, target: PathBuf },
}

#[derive(Debug, Clone)]
pub struct BundleSpec {
    /// Artifact name used in logs and errors.
    pub name: String,
    pub kind: ArtifactKind,
    pub input_dir: PathBuf,
    pub steps: Vec<BundleStep>,
}

impl BundleSpec {
    /// Shared library at the artifact root, the unit's handler nested under
    /// `<import_root>/<source_subdir>`.
    pub fn for_unit(layout: &SourceLayout, project_root: &Path, unit: &FunctionUnit) -> Self {
        let handler_to = layout.import_root.join(unit.source_subdir);
        Self {
            name: unit.logical_name.to_string(),
            kind: ArtifactKind::Function,
            input_dir: project_root.to_path_buf(),
            steps: vec![
                BundleStep::CopyTree {
                    from: layout.shared_library.clone(),
                    to: layout.shared_library_name(),
                },
                BundleStep::CopyContents {
                    from: layout.units_root.join(unit.source_subdir),
                    to: handler_to,
                },
            ],
        }
    }

    /// Installs the requirement file found in `input_dir` under `python/`.
    pub fn for_layer(input_dir: &Path) -> Self {
        Self {
            name: "common-deps".to_string(),
            kind: ArtifactKind::Layer,
            input_dir: input_dir.to_path_buf(),
            steps: vec![BundleStep::PipInstall {
                requirements: PathBuf::from(REQUIREMENTS_FILE),
                target: PathBuf::from(LAYER_PACKAGE_ROOT),
            }],
        }
    }

    /// Renders the steps as one `bash -c` script over the given mount points.
    pub fn script(&self, input: &str, output: &str) -> String {
        self.steps
            .iter()
            .map(|step| match step {
                BundleStep::CopyTree { from, to } => format!(
                    "cp -r {} {}",
                    quote(&join(input, from)),
                    quote(&join(output, to))
                ),
                BundleStep::CopyContents { from, to } => {
                    let dest = quote(&join(output, to));
                    // The glob must stay outside the quotes.
                    format!(
                        "mkdir -p {dest} && cp -r {}/* {dest}/",
                        quote(&join(input, from))
                    )
                }
                BundleStep::PipInstall {
                    requirements,
                    target,
                } => format!(
                    "pip install -r {} -t {}",
                    quote(&join(input, requirements)),
                    quote(&join(output, target))
                ),
            })
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

fn join(root: &str, rel: &Path) -> String {
    let rel = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", root.trim_end_matches('/'), rel)
}

/// Single-quotes a shell word.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
