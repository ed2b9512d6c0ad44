//! Cross-stack assembly: stack dependencies, validation and template rendering.
//!
//! Stacks only know each other through [`Token`]s. A token whose stack differs
//! from the resource that carries it is a cross-stack reference: it makes the
//! consuming stack depend on the producing stack, and it renders as an
//! `Fn::ImportValue` against an export the producer publishes.

use scout_core::{Resource, ScoutError, ScoutResult, Stack, Token, Value};
use serde_json::{json, Map as JsonMap, Value as Json};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Format version written to `manifest.json`.
pub const MANIFEST_VERSION: &str = "1";

/// Template file name for a stack.
pub fn template_file(stack: &str) -> String {
    format!("{stack}.template.json")
}

/// Every stack of one pass, in the order they were added.
#[derive(Debug, Clone)]
pub struct Assembly {
    account: Option<String>,
    region: String,
    stacks: Vec<Stack>,
}

/// A published cross-stack value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub output_id: String,
    pub name: String,
    pub token: Token,
}

impl Assembly {
    pub fn new(account: Option<String>, region: impl Into<String>) -> Self {
        Self {
            account,
            region: region.into(),
            stacks: Vec::new(),
        }
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn add_stack(&mut self, stack: Stack) -> ScoutResult<()> {
        if self.stack(&stack.name).is_some() {
            return Err(ScoutError::Graph(format!("duplicate stack {}", stack.name)));
        }
        self.stacks.push(stack);
        Ok(())
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name == name)
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    pub fn resource_count(&self) -> usize {
        self.stacks.iter().map(Stack::len).sum()
    }

    /// Resolves a token to the resource it names, wherever it lives.
    pub fn resolve(&self, token: &Token) -> Option<&Resource> {
        self.stack(&token.stack)?.get(&token.logical_id)
    }

    /// Consumer stack → producer stacks it reads tokens from.
    pub fn stack_dependencies(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut deps: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for stack in &self.stacks {
            let entry = deps.entry(stack.name.as_str()).or_default();
            for resource in &stack.resources {
                for token in resource.tokens() {
                    if token.stack != stack.name {
                        entry.insert(token.stack.as_str());
                    }
                }
            }
        }
        deps
    }

    /// Stack deployment order; producers always precede consumers.
    pub fn deployment_order(&self) -> ScoutResult<Vec<&str>> {
        let deps = self.stack_dependencies();
        let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut consumers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for stack in &self.stacks {
            let producers = &deps[stack.name.as_str()];
            indegree.insert(stack.name.as_str(), producers.len());
            for producer in producers {
                if self.stack(producer).is_none() {
                    return Err(ScoutError::Graph(format!(
                        "stack {} references unknown stack {producer}",
                        stack.name
                    )));
                }
                consumers.entry(*producer).or_default().push(stack.name.as_str());
            }
        }

        // Seed in declaration order so ties stay stable.
        let mut ready: VecDeque<&str> = self
            .stacks
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| indegree[name] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.stacks.len());

        while let Some(name) = ready.pop_front() {
            order.push(name);
            for consumer in consumers.get(name).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(consumer) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(*consumer);
                    }
                }
            }
        }

        if order.len() != self.stacks.len() {
            let stuck: Vec<&str> = indegree
                .iter()
                .filter(|(_, &d)| d > 0)
                .map(|(name, _)| *name)
                .collect();
            return Err(ScoutError::Graph(format!(
                "cross-stack dependency cycle among {stuck:?}"
            )));
        }
        Ok(order)
    }

    /// Rejects dangling tokens, in-stack cycles and cross-stack cycles.
    pub fn validate(&self) -> ScoutResult<()> {
        for stack in &self.stacks {
            for resource in &stack.resources {
                for token in resource.tokens() {
                    if self.resolve(token).is_none() {
                        return Err(ScoutError::Graph(format!(
                            "{}/{} references missing resource {token}",
                            stack.name, resource.logical_id
                        )));
                    }
                }
            }
            stack.creation_order()?;
        }
        self.deployment_order()?;
        Ok(())
    }

    /// Values each producer stack must export, keyed by producer.
    pub fn exports(&self) -> BTreeMap<&str, Vec<Export>> {
        let mut seen: BTreeSet<&Token> = BTreeSet::new();
        let mut out: BTreeMap<&str, Vec<Export>> = BTreeMap::new();

        for stack in &self.stacks {
            for resource in &stack.resources {
                for token in resource.tokens() {
                    if token.stack != stack.name && seen.insert(token) {
                        out.entry(token.stack.as_str()).or_default().push(Export {
                            output_id: output_id(token),
                            name: export_name(token),
                            token: token.clone(),
                        });
                    }
                }
            }
        }
        for exports in out.values_mut() {
            exports.sort_by(|a, b| a.output_id.cmp(&b.output_id));
        }
        out
    }

    /// Renders one stack as a provider template.
    pub fn render(&self, stack_name: &str) -> ScoutResult<Json> {
        let stack = self
            .stack(stack_name)
            .ok_or_else(|| ScoutError::Graph(format!("unknown stack {stack_name}")))?;

        let mut resources = JsonMap::new();
        for resource in &stack.resources {
            resources.insert(resource.logical_id.clone(), render_resource(stack, resource));
        }

        let mut template = JsonMap::new();
        template.insert(
            "Description".into(),
            Json::String(format!("Rise Scout {stack_name} stack")),
        );
        template.insert("Resources".into(), Json::Object(resources));

        let exports = self.exports();
        if let Some(list) = exports.get(stack_name) {
            let mut outputs = JsonMap::new();
            for export in list {
                outputs.insert(
                    export.output_id.clone(),
                    json!({
                        "Value": render_token(stack, &export.token),
                        "Export": { "Name": export.name }
                    }),
                );
            }
            template.insert("Outputs".into(), Json::Object(outputs));
        }
        Ok(Json::Object(template))
    }

    /// Index of the assembly: stacks in deployment order with their templates.
    pub fn manifest(&self) -> ScoutResult<Json> {
        let deps = self.stack_dependencies();
        let mut stacks = Vec::new();
        for name in self.deployment_order()? {
            let stack = self
                .stack(name)
                .ok_or_else(|| ScoutError::Internal(format!("ordered unknown stack {name}")))?;
            let dependencies: Vec<&str> = deps[name].iter().copied().collect();
            stacks.push(json!({
                "name": name,
                "template": template_file(name),
                "dependencies": dependencies,
                "resources": stack.len()
            }));
        }
        Ok(json!({
            "version": MANIFEST_VERSION,
            "account": self.account,
            "region": self.region,
            "stacks": stacks
        }))
    }
}

/// Fails unless `dependent` declares `prerequisite` as a creation predecessor.
pub fn ensure_precedes(stack: &Stack, prerequisite: &str, dependent: &str) -> ScoutResult<()> {
    let resource = stack.get(dependent).ok_or_else(|| {
        ScoutError::Graph(format!("{}/{dependent} is not declared", stack.name))
    })?;
    if !stack.contains(prerequisite) {
        return Err(ScoutError::Graph(format!(
            "{}/{prerequisite} is not declared",
            stack.name
        )));
    }
    if stack.predecessors(resource).contains(prerequisite) {
        Ok(())
    } else {
        Err(ScoutError::Ordering(format!(
            "{}/{dependent} may be created before {prerequisite}",
            stack.name
        )))
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_resource(stack: &Stack, resource: &Resource) -> Json {
    let mut out = JsonMap::new();
    out.insert("Type".into(), Json::String(resource.resource_type.clone()));
    if !resource.properties.is_empty() {
        let props: JsonMap<String, Json> = resource
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), render_value(stack, v)))
            .collect();
        out.insert("Properties".into(), Json::Object(props));
    }
    if !resource.depends_on.is_empty() {
        out.insert(
            "DependsOn".into(),
            Json::Array(
                resource
                    .depends_on
                    .iter()
                    .map(|d| Json::String(d.clone()))
                    .collect(),
            ),
        );
    }
    if let Some(policy) = resource.removal {
        let p = Json::String(policy.deletion_policy().to_string());
        out.insert("UpdateReplacePolicy".into(), p.clone());
        out.insert("DeletionPolicy".into(), p);
    }
    Json::Object(out)
}

fn render_value(stack: &Stack, value: &Value) -> Json {
    match value {
        Value::Str(s) => Json::String(s.clone()),
        Value::Int(n) => json!(n),
        Value::Bool(b) => Json::Bool(*b),
        Value::List(items) => Json::Array(items.iter().map(|v| render_value(stack, v)).collect()),
        Value::Map(m) => Json::Object(
            m.iter()
                .map(|(k, v)| (k.clone(), render_value(stack, v)))
                .collect(),
        ),
        Value::Token(t) => render_token(stack, t),
        Value::Join(delim, parts) => {
            let parts: Vec<Json> = parts.iter().map(|v| render_value(stack, v)).collect();
            json!({ "Fn::Join": [delim, parts] })
        }
        Value::Pseudo(name) => json!({ "Ref": name }),
    }
}

fn render_token(stack: &Stack, token: &Token) -> Json {
    if token.stack != stack.name {
        return json!({ "Fn::ImportValue": export_name(token) });
    }
    match &token.attribute {
        None => json!({ "Ref": token.logical_id }),
        Some(attr) => json!({ "Fn::GetAtt": [token.logical_id, attr] }),
    }
}

fn output_id(token: &Token) -> String {
    match &token.attribute {
        None => format!("ExportsOutputRef{}", token.logical_id),
        Some(attr) => {
            let attr: String = attr.chars().filter(char::is_ascii_alphanumeric).collect();
            format!("ExportsOutputFnGetAtt{}{attr}", token.logical_id)
        }
    }
}

fn export_name(token: &Token) -> String {
    format!("{}:{}", token.stack, output_id(token))
}
