//! Data tier: search collection, card table and cache cluster.
//!
//! The collection is gated by an encryption policy and a network policy that
//! restricts access to the search endpoint. Both are declared as explicit
//! creation dependencies of the collection.

use crate::graph::ensure_precedes;
use crate::{allow_all_egress, Built};
use scout_core::types::{CACHE_PORT, TableHandle};
use scout_core::{
    CacheEndpoint, DataTopology, EndpointService, EnvironmentContext, NetworkTopology, Resource,
    ScoutError, ScoutResult, Stack, Token, Value,
};
use serde_json::json;

pub const STACK_PART: &str = "Data";

pub const ENCRYPTION_POLICY: &str = "AossEncryptionPolicy";
pub const NETWORK_POLICY: &str = "AossNetworkPolicy";
pub const COLLECTION: &str = "AossCollection";
pub const CARDS_TABLE: &str = "CardsTable";
pub const CACHE_SECURITY_GROUP: &str = "RedisSecurityGroup";
pub const CACHE_INGRESS: &str = "RedisSecurityGroupIngress";
pub const CACHE_SUBNET_GROUP: &str = "RedisSubnetGroup";
pub const CACHE_CLUSTER: &str = "RedisCluster";

pub const PARTITION_KEY: &str = "agent_id";
pub const TTL_ATTRIBUTE: &str = "expires_at";

/// Marker replaced by the endpoint token inside the network policy document.
const ENDPOINT_SLOT: &str = "__SEARCH_ENDPOINT__";

/// Declares the data stack. Reads only the network topology's tokens.
pub fn build(ctx: &EnvironmentContext, network: &NetworkTopology) -> ScoutResult<Built<DataTopology>> {
    let policy = ctx.policy();
    let mut stack = Stack::new(ctx.stack_name(STACK_PART));
    let collection_name = ctx.qualify("rise-scout");

    let search_endpoint = network.endpoint(EndpointService::Search).ok_or_else(|| {
        ScoutError::InvalidInput("network topology has no search endpoint".into())
    })?;

    stack.add(
        Resource::new(ENCRYPTION_POLICY, "AWS::OpenSearchServerless::SecurityPolicy")
            .prop("Name", format!("{collection_name}-enc"))
            .prop("Type", "encryption")
            .prop("Policy", encryption_policy(&collection_name)),
    )?;
    stack.add(
        Resource::new(NETWORK_POLICY, "AWS::OpenSearchServerless::SecurityPolicy")
            .prop("Name", format!("{collection_name}-net"))
            .prop("Type", "network")
            .prop("Policy", network_policy(&collection_name, search_endpoint)?),
    )?;
    stack.add(
        Resource::new(COLLECTION, "AWS::OpenSearchServerless::Collection")
            .prop("Name", collection_name.as_str())
            .prop("Type", "SEARCH")
            .prop("Description", "Rise Scout contacts and listings")
            .depends_on(ENCRYPTION_POLICY)
            .depends_on(NETWORK_POLICY),
    )?;

    let table_name = ctx.qualify("rise-scout-cards");
    stack.add(
        Resource::new(CARDS_TABLE, "AWS::DynamoDB::Table")
            .prop("TableName", table_name.as_str())
            .prop(
                "KeySchema",
                Value::list([Value::map([
                    ("AttributeName", Value::from(PARTITION_KEY)),
                    ("KeyType", Value::from("HASH")),
                ])]),
            )
            .prop(
                "AttributeDefinitions",
                Value::list([Value::map([
                    ("AttributeName", Value::from(PARTITION_KEY)),
                    ("AttributeType", Value::from("S")),
                ])]),
            )
            .prop("BillingMode", "PAY_PER_REQUEST")
            .prop(
                "TimeToLiveSpecification",
                Value::map([
                    ("AttributeName", Value::from(TTL_ATTRIBUTE)),
                    ("Enabled", Value::from(true)),
                ]),
            )
            .removal(policy.table_removal),
    )?;

    let cache_sg = stack.add(
        Resource::new(CACHE_SECURITY_GROUP, "AWS::EC2::SecurityGroup")
            .prop("GroupDescription", "Security group for Rise Scout Redis")
            .prop("VpcId", &network.network_id)
            .prop("SecurityGroupEgress", allow_all_egress()),
    )?;
    let cache_sg_id = stack.attr(&cache_sg.logical_id, "GroupId");

    // The only inbound rule: cache port, from the compute security group.
    stack.add(
        Resource::new(CACHE_INGRESS, "AWS::EC2::SecurityGroupIngress")
            .prop("GroupId", &cache_sg_id)
            .prop("IpProtocol", "tcp")
            .prop("FromPort", u32::from(CACHE_PORT))
            .prop("ToPort", u32::from(CACHE_PORT))
            .prop("SourceSecurityGroupId", &network.compute_security_group_id)
            .prop("Description", "Allow Lambda access to Redis"),
    )?;

    let subnet_group = stack.add(
        Resource::new(CACHE_SUBNET_GROUP, "AWS::ElastiCache::SubnetGroup")
            .prop("Description", "Subnet group for Rise Scout Redis")
            .prop("SubnetIds", network.private_subnet_ids.to_vec()),
    )?;
    stack.add(
        Resource::new(CACHE_CLUSTER, "AWS::ElastiCache::CacheCluster")
            .prop("Engine", "redis")
            .prop("CacheNodeType", policy.cache_node_type)
            .prop("NumCacheNodes", 1)
            .prop("Port", u32::from(CACHE_PORT))
            .prop("CacheSubnetGroupName", &subnet_group)
            .prop("VpcSecurityGroupIds", vec![cache_sg_id]),
    )?;

    ensure_precedes(&stack, ENCRYPTION_POLICY, COLLECTION)?;
    ensure_precedes(&stack, NETWORK_POLICY, COLLECTION)?;

    tracing::info!(
        stack = %stack.name,
        resources = stack.len(),
        cache_node_type = policy.cache_node_type,
        table_removal = %policy.table_removal,
        "data stack declared"
    );

    let topology = DataTopology {
        search_collection_endpoint: stack.attr(COLLECTION, "CollectionEndpoint"),
        search_collection_arn: stack.attr(COLLECTION, "Arn"),
        table: TableHandle {
            name: table_name,
            partition_key: PARTITION_KEY.to_string(),
            arn: stack.attr(CARDS_TABLE, "Arn"),
        },
        cache: CacheEndpoint {
            host: stack.attr(CACHE_CLUSTER, "RedisEndpoint.Address"),
            port: CACHE_PORT,
        },
        cache_node_type: policy.cache_node_type.to_string(),
    };
    Ok(Built { stack, topology })
}

/// Service-owned key encryption for the collection.
fn encryption_policy(collection: &str) -> String {
    json!({
        "Rules": [{ "Resource": [format!("collection/{collection}")], "ResourceType": "collection" }],
        "AWSOwnedKey": true
    })
    .to_string()
}

/// Private access through the search endpoint only. The endpoint id is a
/// token, so the document is rendered as a join around it.
fn network_policy(collection: &str, endpoint: &Token) -> ScoutResult<Value> {
    let doc = json!([{
        "Rules": [{ "Resource": [format!("collection/{collection}")], "ResourceType": "collection" }],
        "AllowFromPublic": false,
        "SourceVPCEs": [ENDPOINT_SLOT]
    }])
    .to_string();
    let (head, tail) = doc.split_once(ENDPOINT_SLOT).ok_or_else(|| {
        ScoutError::Internal("network policy lost its endpoint placeholder".into())
    })?;
    Ok(Value::concat([
        Value::from(head),
        Value::from(endpoint),
        Value::from(tail),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network;
    use crate::DeployTarget;
    use scout_core::RemovalPolicy;

    fn built(env: &str) -> Built<DataTopology> {
        let ctx = EnvironmentContext::resolve(Some(env)).unwrap();
        let net = network::build(&ctx, &DeployTarget::new(None, "us-west-2")).unwrap();
        build(&ctx, &net.topology).unwrap()
    }

    #[test]
    fn collection_is_created_after_both_policies() {
        let data = built("dev");
        let order = data.stack.creation_order().unwrap();
        let pos = |id: &str| order.iter().position(|x| *x == id).unwrap();
        assert!(pos(ENCRYPTION_POLICY) < pos(COLLECTION));
        assert!(pos(NETWORK_POLICY) < pos(COLLECTION));
    }

    #[test]
    fn network_policy_denies_public_access_and_names_the_endpoint() {
        let data = built("dev");
        let policy = data.stack.get(NETWORK_POLICY).unwrap().property("Policy").unwrap();
        let parts = match policy {
            Value::Join(delim, parts) => {
                assert!(delim.is_empty());
                parts
            }
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(parts[1].as_token().unwrap().logical_id, "AossEndpoint");

        // Splice a literal id back in and check the document parses.
        let text = format!("{}vpce-123{}", parts[0].as_str().unwrap(), parts[2].as_str().unwrap());
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc[0]["AllowFromPublic"], false);
        assert_eq!(doc[0]["SourceVPCEs"][0], "vpce-123");
        assert_eq!(doc[0]["Rules"][0]["Resource"][0], "collection/rise-scout-dev");
    }

    #[test]
    fn encryption_policy_uses_service_owned_key() {
        let data = built("staging");
        let policy = data.stack.get(ENCRYPTION_POLICY).unwrap().property("Policy").unwrap();
        let doc: serde_json::Value = serde_json::from_str(policy.as_str().unwrap()).unwrap();
        assert_eq!(doc["AWSOwnedKey"], true);
        assert_eq!(doc["Rules"][0]["Resource"][0], "collection/rise-scout-staging");
    }

    #[test]
    fn table_removal_follows_tier() {
        assert_eq!(
            built("prod").stack.get(CARDS_TABLE).unwrap().removal,
            Some(RemovalPolicy::Retain)
        );
        assert_eq!(
            built("dev").stack.get(CARDS_TABLE).unwrap().removal,
            Some(RemovalPolicy::Destroy)
        );
        assert_eq!(built("prod").topology.table.name, "rise-scout-cards-prod");
    }

    #[test]
    fn cache_accepts_only_the_compute_group_on_its_port() {
        let ctx = EnvironmentContext::resolve(Some("dev")).unwrap();
        let net = network::build(&ctx, &DeployTarget::new(None, "us-west-2")).unwrap();
        let data = build(&ctx, &net.topology).unwrap();

        let rules: Vec<_> = data.stack.of_type("AWS::EC2::SecurityGroupIngress").collect();
        assert_eq!(rules.len(), 1);
        let rule = rules[0];
        assert_eq!(rule.property("FromPort"), Some(&Value::Int(6379)));
        assert_eq!(rule.property("ToPort"), Some(&Value::Int(6379)));
        assert_eq!(
            rule.property("SourceSecurityGroupId").and_then(Value::as_token),
            Some(&net.topology.compute_security_group_id)
        );
        assert!(data
            .stack
            .get(CACHE_SECURITY_GROUP)
            .unwrap()
            .property("SecurityGroupIngress")
            .is_none());
    }

    #[test]
    fn cache_class_follows_tier() {
        assert_eq!(built("dev").topology.cache_node_type, "cache.t3.micro");
        assert_eq!(built("prod").topology.cache_node_type, "cache.r6g.large");
        assert_eq!(
            built("dev").topology.cache.host.attribute.as_deref(),
            Some("RedisEndpoint.Address")
        );
    }
}
