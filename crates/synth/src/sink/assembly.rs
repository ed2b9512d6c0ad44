//! Writes the assembly to disk: `<stack>.template.json` per stack and
//! `manifest.json`.

use crate::graph::{template_file, Assembly};
use scout_core::{ScoutError, ScoutResult};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Renders and writes every template, then the manifest. Returns the
/// written paths, manifest last.
pub fn write_assembly(assembly: &Assembly, out_dir: &Path) -> ScoutResult<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .map_err(|e| ScoutError::io(format!("create {}", out_dir.display()), e))?;

    let mut written = Vec::with_capacity(assembly.stacks().len() + 1);
    for name in assembly.deployment_order()? {
        let path = out_dir.join(template_file(name));
        write_json(&path, &assembly.render(name)?)?;
        written.push(path);
    }

    let manifest = out_dir.join(MANIFEST_FILE);
    write_json(&manifest, &assembly.manifest()?)?;
    written.push(manifest);

    tracing::info!(dir = %out_dir.display(), files = written.len(), "assembly written");
    Ok(written)
}

fn write_json(path: &Path, value: &serde_json::Value) -> ScoutResult<()> {
    let mut body = serde_json::to_string_pretty(value)
        .map_err(|e| ScoutError::Internal(format!("serialize {}: {e}", path.display())))?;
    body.push('\n');
    fs::write(path, body).map_err(|e| ScoutError::io(format!("write {}", path.display()), e))
}
