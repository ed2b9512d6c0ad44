//! Output sinks for a finished pass.
//!
//! - [`assembly`] writes one template per stack plus `manifest.json`
//! - [`json_stream`] writes one NDJSON [`ResourceRow`] per declared resource

pub mod assembly;
pub mod json_stream;

use crate::graph::Assembly;
use scout_core::ScoutResult;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Serializable row types
// ---------------------------------------------------------------------------

/// One row per declared resource, fully denormalized.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceRow {
    pub environment: String,
    pub stack: String,
    pub logical_id: String,
    pub resource_type: String,
    /// Position in the stack's creation order.
    pub creation_index: u32,
    /// In-stack predecessors (references and explicit dependencies).
    pub depends_on: Vec<String>,
    /// Cross-stack references, as `<stack>/<logical id>[.<attr>]`.
    pub imports: Vec<String>,
    pub removal_policy: Option<String>,
}

// ---------------------------------------------------------------------------
// Builder: Assembly → Rows
// ---------------------------------------------------------------------------

/// Rows for every resource, stacks in deployment order, resources in
/// creation order.
pub fn resource_rows(environment: &str, assembly: &Assembly) -> ScoutResult<Vec<ResourceRow>> {
    let mut rows = Vec::with_capacity(assembly.resource_count());
    for name in assembly.deployment_order()? {
        let Some(stack) = assembly.stack(name) else {
            continue;
        };
        for (i, id) in stack.creation_order()?.into_iter().enumerate() {
            let Some(resource) = stack.get(id) else {
                continue;
            };
            let mut imports: Vec<String> = resource
                .tokens()
                .into_iter()
                .filter(|t| t.stack != stack.name)
                .map(|t| match &t.attribute {
                    Some(attr) => format!("{}/{}.{attr}", t.stack, t.logical_id),
                    None => format!("{}/{}", t.stack, t.logical_id),
                })
                .collect();
            imports.sort();
            imports.dedup();

            rows.push(ResourceRow {
                environment: environment.to_string(),
                stack: stack.name.clone(),
                logical_id: resource.logical_id.clone(),
                resource_type: resource.resource_type.clone(),
                creation_index: i as u32,
                depends_on: stack.predecessors(resource).into_iter().collect(),
                imports,
                removal_policy: resource.removal.map(|p| p.to_string()),
            });
        }
    }
    Ok(rows)
}
