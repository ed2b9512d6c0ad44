//! Human-readable plan report for a finished pass.

use crate::orchestrator::Synthesis;
use scout_core::RemovalPolicy;
use std::time::Duration;

/// Summary of a pass, ready to render.
#[derive(Debug)]
pub struct Report {
    pub environment: String,
    pub production: bool,
    pub log_level: String,
    pub nat_gateways: usize,
    pub cache_node_type: String,
    pub table_removal: RemovalPolicy,
    pub region: String,
    pub account: Option<String>,
    pub requirement_count: usize,
    pub total_resources: usize,
    pub stacks: Vec<StackSummary>,
    pub artifacts: Vec<ArtifactSummary>,
    pub schedules: Vec<(String, String)>,
    pub elapsed: Duration,
}

/// One stack in deployment order.
#[derive(Debug)]
pub struct StackSummary {
    pub name: String,
    pub resources: usize,
    pub exports: usize,
    pub dependencies: Vec<String>,
}

/// One packaged artifact.
#[derive(Debug)]
pub struct ArtifactSummary {
    pub name: String,
    pub strategy: String,
    pub fingerprint: String,
}

impl Report {
    pub fn build(synthesis: &Synthesis) -> Self {
        let assembly = &synthesis.assembly;
        let deps = assembly.stack_dependencies();
        let exports = assembly.exports();

        // Validated during the pass; an empty list only means nothing to show.
        let order = assembly.deployment_order().unwrap_or_default();
        let stacks = order
            .iter()
            .filter_map(|name| assembly.stack(name))
            .map(|stack| StackSummary {
                name: stack.name.clone(),
                resources: stack.len(),
                exports: exports.get(stack.name.as_str()).map_or(0, Vec::len),
                dependencies: deps
                    .get(stack.name.as_str())
                    .map(|d| d.iter().map(|s| s.to_string()).collect())
                    .unwrap_or_default(),
            })
            .collect();

        let mut artifacts: Vec<ArtifactSummary> = synthesis
            .artifacts
            .iter()
            .map(|a| ArtifactSummary {
                name: a.unit.clone(),
                strategy: a.strategy.clone(),
                fingerprint: a.fingerprint.clone(),
            })
            .collect();
        artifacts.push(ArtifactSummary {
            name: "common-deps (layer)".to_string(),
            strategy: synthesis.layer.strategy.clone(),
            fingerprint: synthesis.layer.fingerprint.clone(),
        });

        let schedules = synthesis
            .compute
            .functions
            .iter()
            .filter_map(|f| {
                f.schedule
                    .map(|s| (f.deployed_name.clone(), s.expression()))
            })
            .collect();

        let env = &synthesis.environment;
        Report {
            environment: env.name().to_string(),
            production: env.is_production(),
            log_level: env.log_level().to_string(),
            nat_gateways: synthesis.network.nat_gateway_count,
            cache_node_type: synthesis.data.cache_node_type.clone(),
            table_removal: env.policy().table_removal,
            region: assembly.region().to_string(),
            account: assembly.account().map(str::to_string),
            requirement_count: synthesis.requirements.len(),
            total_resources: assembly.resource_count(),
            stacks,
            artifacts,
            schedules,
            elapsed: synthesis.elapsed,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "╠══════════════════════════════════════════════════════════════╣\n";

        out.push('\n');
        out.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        out.push_str("║                  RISE SCOUT SYNTHESIS PLAN                  ║\n");
        out.push_str(rule);
        let tier = if self.production { "production" } else { "standard" };
        out.push_str(&format!("║  Environment:        {:>38} ║\n", format!("{} ({tier})", self.environment)));
        out.push_str(&format!(
            "║  Target:             {:>38} ║\n",
            format!("{}/{}", self.account.as_deref().unwrap_or("<deploy account>"), self.region)
        ));
        out.push_str(&format!("║  Log level:          {:>38} ║\n", self.log_level));
        out.push_str(&format!("║  NAT gateways:       {:>38} ║\n", self.nat_gateways));
        out.push_str(&format!("║  Cache node type:    {:>38} ║\n", self.cache_node_type));
        out.push_str(&format!("║  Table removal:      {:>38} ║\n", self.table_removal.to_string()));
        out.push_str(&format!("║  Pinned requirements:{:>38} ║\n", self.requirement_count));
        out.push_str(&format!("║  Resources:          {:>38} ║\n", self.total_resources));
        out.push_str(&format!("║  Total time:         {:>35?} ║\n", self.elapsed));

        out.push_str(rule);
        out.push_str("║  STACKS (deployment order)                                   ║\n");
        out.push_str(rule);
        for (i, stack) in self.stacks.iter().enumerate() {
            out.push_str(&format!(
                "║  {}. {}  |  {} resources  |  {} exports\n",
                i + 1,
                stack.name,
                stack.resources,
                stack.exports
            ));
            if !stack.dependencies.is_empty() {
                out.push_str(&format!("║     after: {}\n", stack.dependencies.join(", ")));
            }
        }

        out.push_str(rule);
        out.push_str("║  ARTIFACTS                                                   ║\n");
        out.push_str(rule);
        for a in &self.artifacts {
            let short = a.fingerprint.get(..12).unwrap_or(&a.fingerprint);
            out.push_str(&format!("║  {:<24} {:<12} {}…\n", a.name, a.strategy, short));
        }

        if !self.schedules.is_empty() {
            out.push_str(rule);
            out.push_str("║  TRIGGERS                                                    ║\n");
            out.push_str(rule);
            for (name, expr) in &self.schedules {
                out.push_str(&format!("║  {name:<36} {expr}\n"));
            }
        }

        out.push_str("╚══════════════════════════════════════════════════════════════╝\n");
        out
    }
}
