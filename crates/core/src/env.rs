//! Environment selection and the environment → policy lookup table.
//!
//! The environment string is resolved exactly once per pass into an
//! [`EnvironmentContext`]. Builders never compare environment names
//! themselves; every sizing and retention decision goes through
//! [`SizingTier::policy`].

use crate::error::{ScoutError, ScoutResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Used when no environment is selected.
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// The only environment name treated as production.
pub const PRODUCTION_ENVIRONMENT: &str = "prod";

/// Used when no region is configured.
pub const DEFAULT_REGION: &str = "us-west-2";

// ---------------------------------------------------------------------------
// Policy table
// ---------------------------------------------------------------------------

/// What happens to a stateful resource when its stack is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemovalPolicy {
    Retain,
    Destroy,
}

impl RemovalPolicy {
    /// Value used for `DeletionPolicy` / `UpdateReplacePolicy`.
    pub fn deletion_policy(self) -> &'static str {
        match self {
            Self::Retain => "Retain",
            Self::Destroy => "Delete",
        }
    }
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retain => f.write_str("RETAIN"),
            Self::Destroy => f.write_str("DESTROY"),
        }
    }
}

/// Log verbosity handed to deployed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capacity / retention decisions for one sizing tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    /// One NAT gateway per AZ in production, one shared otherwise.
    pub nat_gateways: usize,
    pub cache_node_type: &'static str,
    pub table_removal: RemovalPolicy,
}

const STANDARD_POLICY: TierPolicy = TierPolicy {
    nat_gateways: 1,
    cache_node_type: "cache.t3.micro",
    table_removal: RemovalPolicy::Destroy,
};

const PRODUCTION_POLICY: TierPolicy = TierPolicy {
    nat_gateways: 2,
    cache_node_type: "cache.r6g.large",
    table_removal: RemovalPolicy::Retain,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizingTier {
    Standard,
    Production,
}

impl SizingTier {
    pub const fn policy(self) -> &'static TierPolicy {
        match self {
            Self::Standard => &STANDARD_POLICY,
            Self::Production => &PRODUCTION_POLICY,
        }
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Process-wide environment for one provisioning pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentContext {
    name: String,
    is_production: bool,
    log_level: LogLevel,
    tier: SizingTier,
}

impl EnvironmentContext {
    /// Resolves an optional environment selector.
    ///
    /// Absent or blank selects [`DEFAULT_ENVIRONMENT`]. Names end up inside
    /// resource names, so only `[a-z0-9-]` is accepted.
    pub fn resolve(selector: Option<&str>) -> ScoutResult<Self> {
        let name = match selector.map(str::trim) {
            None | Some("") => DEFAULT_ENVIRONMENT,
            Some(s) => s,
        };

        let valid = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid || name.starts_with('-') || name.ends_with('-') {
            return Err(ScoutError::InvalidInput(format!(
                "environment name {name:?} must match [a-z0-9-]+"
            )));
        }

        let is_production = name == PRODUCTION_ENVIRONMENT;
        let tier = if is_production {
            SizingTier::Production
        } else {
            SizingTier::Standard
        };
        let log_level = if name == DEFAULT_ENVIRONMENT {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };

        Ok(Self {
            name: name.to_string(),
            is_production,
            log_level,
            tier,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_production(&self) -> bool {
        self.is_production
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn tier(&self) -> SizingTier {
        self.tier
    }

    pub fn policy(&self) -> &'static TierPolicy {
        self.tier.policy()
    }

    /// Suffixes a base name with the environment: `rise-scout-cards` →
    /// `rise-scout-cards-dev`.
    pub fn qualify(&self, base: &str) -> String {
        format!("{base}-{}", self.name)
    }

    /// `RiseScout-<env>-<part>`.
    pub fn stack_name(&self, part: &str) -> String {
        format!("RiseScout-{}-{part}", self.name)
    }
}

impl fmt::Display for EnvironmentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_selector_defaults_to_dev() {
        let ctx = EnvironmentContext::resolve(None).unwrap();
        assert_eq!(ctx.name(), "dev");
        assert!(!ctx.is_production());

        let blank = EnvironmentContext::resolve(Some("  ")).unwrap();
        assert_eq!(blank.name(), "dev");
    }

    #[test]
    fn dev_policy() {
        let ctx = EnvironmentContext::resolve(Some("dev")).unwrap();
        assert_eq!(ctx.log_level(), LogLevel::Debug);
        assert_eq!(ctx.policy().nat_gateways, 1);
        assert_eq!(ctx.policy().cache_node_type, "cache.t3.micro");
        assert_eq!(ctx.policy().table_removal, RemovalPolicy::Destroy);
    }

    #[test]
    fn prod_policy() {
        let ctx = EnvironmentContext::resolve(Some("prod")).unwrap();
        assert!(ctx.is_production());
        assert_eq!(ctx.tier(), SizingTier::Production);
        assert_eq!(ctx.log_level(), LogLevel::Info);
        assert_eq!(ctx.policy().nat_gateways, 2);
        assert_eq!(ctx.policy().cache_node_type, "cache.r6g.large");
        assert_eq!(ctx.policy().table_removal, RemovalPolicy::Retain);
    }

    #[test]
    fn other_environments_are_standard_tier_with_info_logs() {
        let ctx = EnvironmentContext::resolve(Some("staging")).unwrap();
        assert!(!ctx.is_production());
        assert_eq!(ctx.policy().table_removal, RemovalPolicy::Destroy);
        assert_eq!(ctx.log_level(), LogLevel::Info);
    }

    #[test]
    fn rejects_names_unsafe_for_resource_names() {
        for bad in ["Prod", "dev_1", "-dev", "a b", "dev/x"] {
            assert!(
                EnvironmentContext::resolve(Some(bad)).is_err(),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn qualify_and_stack_names() {
        let ctx = EnvironmentContext::resolve(Some("prod")).unwrap();
        assert_eq!(ctx.qualify("rise-scout-cards"), "rise-scout-cards-prod");
        assert_eq!(ctx.stack_name("Network"), "RiseScout-prod-Network");
    }
}
