//! Cross-stack resource graph, topology builders, pass orchestration,
//! plan reporting and output sinks.

pub mod compute;
pub mod data;
pub mod graph;
pub mod network;
pub mod orchestrator;
pub mod reporter;
pub mod sink;

use scout_core::{Stack, Value};

pub use graph::Assembly;
pub use orchestrator::{Orchestrator, PassConfig, Synthesis};

/// Account + region a pass deploys into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    /// `None` defers to the deploying credentials' account.
    pub account: Option<String>,
    pub region: String,
}

impl DeployTarget {
    pub fn new(account: Option<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.filter(|a| !a.trim().is_empty()),
            region: region.into(),
        }
    }

    /// Bootstrap bucket holding code assets.
    pub fn asset_bucket(&self) -> Value {
        match &self.account {
            Some(account) => Value::from(format!("cdk-hnb659fds-assets-{account}-{}", self.region)),
            None => Value::concat([
                Value::from("cdk-hnb659fds-assets-"),
                Value::Pseudo("AWS::AccountId".into()),
                Value::from(format!("-{}", self.region)),
            ]),
        }
    }

    /// `com.amazonaws.<region>.<suffix>`.
    pub fn service_name(&self, suffix: &str) -> String {
        format!("com.amazonaws.{}.{suffix}", self.region)
    }

    /// Availability zones `<region>a`, `<region>b`, ...
    pub fn availability_zones(&self, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("{}{}", self.region, (b'a' + i as u8) as char))
            .collect()
    }
}

/// A builder's output: its stack plus the handles later builders consume.
#[derive(Debug, Clone)]
pub struct Built<T> {
    pub stack: Stack,
    pub topology: T,
}

/// Allow-all egress rule shared by security groups.
pub(crate) fn allow_all_egress() -> Value {
    Value::list([Value::map([
        ("CidrIp", Value::from("0.0.0.0/0")),
        ("Description", Value::from("Allow all outbound traffic by default")),
        ("IpProtocol", Value::from("-1")),
    ])])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_bucket_uses_pseudo_account_when_unknown() {
        let known = DeployTarget::new(Some("123456789012".into()), "us-west-2");
        assert_eq!(
            known.asset_bucket(),
            Value::from("cdk-hnb659fds-assets-123456789012-us-west-2")
        );

        let unknown = DeployTarget::new(Some(" ".into()), "us-west-2");
        assert!(unknown.account.is_none());
        assert!(matches!(unknown.asset_bucket(), Value::Join(_, _)));
    }

    #[test]
    fn availability_zones_follow_region() {
        let t = DeployTarget::new(None, "eu-central-1");
        assert_eq!(t.availability_zones(2), vec!["eu-central-1a", "eu-central-1b"]);
        assert_eq!(t.service_name("sts"), "com.amazonaws.eu-central-1.sts");
    }
}
