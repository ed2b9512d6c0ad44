//! Network tier: isolated address space, subnets, egress and private endpoints.
//!
//! Layout per availability zone: one public subnet carrying the internet
//! route (and a NAT gateway while the tier policy asks for one), and one
//! private subnet whose default route leaves through a NAT gateway. Compute
//! runs only in private subnets.

use crate::{allow_all_egress, Built, DeployTarget};
use scout_core::types::SubnetIds;
use scout_core::{
    EndpointService, EnvironmentContext, NetworkTopology, Resource, ScoutError, ScoutResult,
    Stack, Token, Value,
};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

pub const STACK_PART: &str = "Network";

pub const NETWORK_CIDR: &str = "10.0.0.0/16";
pub const AZ_COUNT: usize = 2;
pub const PRIVATE_PREFIX: u8 = 24;
pub const PUBLIC_PREFIX: u8 = 28;

pub const VPC: &str = "Vpc";
pub const INTERNET_GATEWAY: &str = "InternetGateway";
pub const GATEWAY_ATTACHMENT: &str = "VpcGatewayAttachment";
pub const COMPUTE_SECURITY_GROUP: &str = "LambdaSecurityGroup";
pub const ENDPOINT_INGRESS: &str = "LambdaSecurityGroupHttpsIngress";
pub const HTTPS_PORT: u16 = 443;

// ---------------------------------------------------------------------------
// Address allocation
// ---------------------------------------------------------------------------

/// Carves aligned, non-overlapping blocks out of a parent range in request order.
#[derive(Debug, Clone)]
pub struct CidrAllocator {
    next: u64,
    end: u64,
}

impl CidrAllocator {
    pub fn new(cidr: &str) -> ScoutResult<Self> {
        let (base, prefix) = parse_cidr(cidr)?;
        let size = 1u64 << (32 - u32::from(prefix));
        let base = u64::from(base) & !(size - 1);
        Ok(Self {
            next: base,
            end: base + size,
        })
    }

    pub fn allocate(&mut self, prefix: u8) -> ScoutResult<String> {
        if prefix > 32 {
            return Err(ScoutError::InvalidInput(format!("prefix /{prefix} out of range")));
        }
        let size = 1u64 << (32 - u32::from(prefix));
        let start = (self.next + size - 1) & !(size - 1);
        if start + size > self.end {
            return Err(ScoutError::InvalidInput(format!(
                "address space exhausted allocating a /{prefix}"
            )));
        }
        self.next = start + size;
        // `start` is below 2^32 because `end` is.
        Ok(format!("{}/{prefix}", Ipv4Addr::from(start as u32)))
    }
}

fn parse_cidr(cidr: &str) -> ScoutResult<(u32, u8)> {
    let invalid = || ScoutError::InvalidInput(format!("invalid CIDR block {cidr:?}"));
    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }
    Ok((u32::from(addr), prefix))
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

fn subnet_id(tier: &str, az: usize) -> String {
    format!("{tier}Subnet{}", az + 1)
}

/// Logical id of an endpoint resource.
pub fn endpoint_id(service: EndpointService) -> &'static str {
    match service {
        EndpointService::Search => "AossEndpoint",
        EndpointService::Inference => "BedrockEndpoint",
        EndpointService::Identity => "StsEndpoint",
        EndpointService::Table => "DynamoDbEndpoint",
    }
}

/// Declares the network stack for one environment.
pub fn build(ctx: &EnvironmentContext, target: &DeployTarget) -> ScoutResult<Built<NetworkTopology>> {
    let policy = ctx.policy();
    let mut stack = Stack::new(ctx.stack_name(STACK_PART));
    let mut cidrs = CidrAllocator::new(NETWORK_CIDR)?;
    let zones = target.availability_zones(AZ_COUNT);

    let vpc = stack.add(
        Resource::new(VPC, "AWS::EC2::VPC")
            .prop("CidrBlock", NETWORK_CIDR)
            .prop("EnableDnsHostnames", true)
            .prop("EnableDnsSupport", true)
            .prop("InstanceTenancy", "default")
            .prop("Tags", name_tag(&format!("{}/{VPC}", stack.name))),
    )?;

    let igw = stack.add(
        Resource::new(INTERNET_GATEWAY, "AWS::EC2::InternetGateway")
            .prop("Tags", name_tag(&format!("{}/{VPC}", stack.name))),
    )?;
    stack.add(
        Resource::new(GATEWAY_ATTACHMENT, "AWS::EC2::VPCGatewayAttachment")
            .prop("VpcId", &vpc)
            .prop("InternetGatewayId", &igw),
    )?;

    // Private ranges first so the larger blocks stay aligned.
    let private_cidrs: Vec<String> = (0..AZ_COUNT)
        .map(|_| cidrs.allocate(PRIVATE_PREFIX))
        .collect::<ScoutResult<_>>()?;
    let public_cidrs: Vec<String> = (0..AZ_COUNT)
        .map(|_| cidrs.allocate(PUBLIC_PREFIX))
        .collect::<ScoutResult<_>>()?;

    // Public tier.
    let mut public_subnet_ids = SubnetIds::new();
    let mut nat_gateways: Vec<Token> = Vec::new();
    for (az, zone) in zones.iter().enumerate() {
        let id = subnet_id("Public", az);
        let (subnet, route_table) =
            add_subnet(&mut stack, &id, &vpc, zone, &public_cidrs[az], true)?;
        let default_route = format!("{id}DefaultRoute");
        stack.add(
            Resource::new(&default_route, "AWS::EC2::Route")
                .prop("RouteTableId", &route_table)
                .prop("DestinationCidrBlock", "0.0.0.0/0")
                .prop("GatewayId", &igw)
                .depends_on(GATEWAY_ATTACHMENT),
        )?;

        if az < policy.nat_gateways {
            let eip = stack.add(
                Resource::new(&format!("{id}EIP"), "AWS::EC2::EIP")
                    .prop("Domain", "vpc")
                    .prop("Tags", name_tag(&format!("{}/{id}", stack.name))),
            )?;
            let nat = stack.add(
                Resource::new(&format!("{id}NATGateway"), "AWS::EC2::NatGateway")
                    .prop("SubnetId", &subnet)
                    .prop("AllocationId", Token::attr(&stack.name, &eip.logical_id, "AllocationId"))
                    .prop("Tags", name_tag(&format!("{}/{id}", stack.name)))
                    .depends_on(&default_route)
                    .depends_on(&format!("{id}RouteTableAssociation")),
            )?;
            nat_gateways.push(nat);
        }
        public_subnet_ids.push(subnet);
    }

    if nat_gateways.is_empty() {
        return Err(ScoutError::InvalidInput(format!(
            "environment {} resolved to zero NAT gateways",
            ctx.name()
        )));
    }
    if nat_gateways.len() < policy.nat_gateways {
        tracing::warn!(
            requested = policy.nat_gateways,
            placed = nat_gateways.len(),
            "more NAT gateways requested than availability zones"
        );
    }

    // Private tier: spread default routes across the NAT gateways.
    let mut private_subnet_ids = SubnetIds::new();
    let mut private_route_tables: Vec<Token> = Vec::new();
    for (az, zone) in zones.iter().enumerate() {
        let id = subnet_id("Private", az);
        let (subnet, route_table) =
            add_subnet(&mut stack, &id, &vpc, zone, &private_cidrs[az], false)?;
        stack.add(
            Resource::new(&format!("{id}DefaultRoute"), "AWS::EC2::Route")
                .prop("RouteTableId", &route_table)
                .prop("DestinationCidrBlock", "0.0.0.0/0")
                .prop("NatGatewayId", &nat_gateways[az % nat_gateways.len()]),
        )?;
        private_subnet_ids.push(subnet);
        private_route_tables.push(route_table);
    }

    let compute_sg = stack.add(
        Resource::new(COMPUTE_SECURITY_GROUP, "AWS::EC2::SecurityGroup")
            .prop("GroupDescription", "Security group for Rise Scout Lambda functions")
            .prop("VpcId", &vpc)
            .prop("SecurityGroupEgress", allow_all_egress()),
    )?;
    let compute_security_group_id = stack.attr(&compute_sg.logical_id, "GroupId");

    // Interface endpoints share the compute group; their ENIs take HTTPS from the VPC.
    stack.add(
        Resource::new(ENDPOINT_INGRESS, "AWS::EC2::SecurityGroupIngress")
            .prop("GroupId", &compute_security_group_id)
            .prop("IpProtocol", "tcp")
            .prop("FromPort", u32::from(HTTPS_PORT))
            .prop("ToPort", u32::from(HTTPS_PORT))
            .prop("CidrIp", NETWORK_CIDR)
            .prop("Description", "Allow HTTPS from the VPC to interface endpoints"),
    )?;

    let mut endpoint_ids = BTreeMap::new();
    for service in EndpointService::ALL {
        let mut endpoint = Resource::new(endpoint_id(service), "AWS::EC2::VPCEndpoint")
            .prop("ServiceName", target.service_name(service.service_suffix()))
            .prop("VpcId", &vpc);
        endpoint = if service.is_gateway() {
            // Gateway endpoints take no security group; routing is limited
            // to the private route tables instead.
            endpoint
                .prop("VpcEndpointType", "Gateway")
                .prop("RouteTableIds", private_route_tables.clone())
        } else {
            endpoint
                .prop("VpcEndpointType", "Interface")
                .prop("PrivateDnsEnabled", true)
                .prop("SubnetIds", private_subnet_ids.to_vec())
                .prop("SecurityGroupIds", vec![compute_security_group_id.clone()])
        };
        endpoint_ids.insert(service, stack.add(endpoint)?);
    }

    tracing::info!(
        stack = %stack.name,
        resources = stack.len(),
        nat_gateways = nat_gateways.len(),
        "network stack declared"
    );

    let topology = NetworkTopology {
        network_id: vpc,
        private_subnet_ids,
        public_subnet_ids,
        compute_security_group_id,
        endpoint_ids,
        nat_gateway_count: nat_gateways.len(),
    };
    Ok(Built { stack, topology })
}

/// Subnet + route table + association. Returns (subnet, route table).
fn add_subnet(
    stack: &mut Stack,
    id: &str,
    vpc: &Token,
    zone: &str,
    cidr: &str,
    public: bool,
) -> ScoutResult<(Token, Token)> {
    let subnet = stack.add(
        Resource::new(id, "AWS::EC2::Subnet")
            .prop("VpcId", vpc)
            .prop("AvailabilityZone", zone)
            .prop("CidrBlock", cidr)
            .prop("MapPublicIpOnLaunch", public)
            .prop("Tags", name_tag(&format!("{}/{id}", stack.name))),
    )?;
    let route_table = stack.add(
        Resource::new(&format!("{id}RouteTable"), "AWS::EC2::RouteTable")
            .prop("VpcId", vpc)
            .prop("Tags", name_tag(&format!("{}/{id}", stack.name))),
    )?;
    stack.add(
        Resource::new(
            &format!("{id}RouteTableAssociation"),
            "AWS::EC2::SubnetRouteTableAssociation",
        )
        .prop("RouteTableId", &route_table)
        .prop("SubnetId", &subnet),
    )?;
    Ok((subnet, route_table))
}

fn name_tag(name: &str) -> Value {
    Value::list([Value::map([
        ("Key", Value::from("Name")),
        ("Value", Value::from(name)),
    ])])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> DeployTarget {
        DeployTarget::new(None, "us-west-2")
    }

    #[test]
    fn allocator_keeps_blocks_aligned_and_disjoint() {
        let mut a = CidrAllocator::new(NETWORK_CIDR).unwrap();
        assert_eq!(a.allocate(24).unwrap(), "10.0.0.0/24");
        assert_eq!(a.allocate(24).unwrap(), "10.0.1.0/24");
        assert_eq!(a.allocate(28).unwrap(), "10.0.2.0/28");
        assert_eq!(a.allocate(28).unwrap(), "10.0.2.16/28");
        // Back to a /24 after /28s: skips to the next boundary.
        assert_eq!(a.allocate(24).unwrap(), "10.0.3.0/24");
    }

    #[test]
    fn allocator_reports_exhaustion() {
        let mut a = CidrAllocator::new("10.0.0.0/30").unwrap();
        a.allocate(31).unwrap();
        a.allocate(31).unwrap();
        assert!(a.allocate(31).is_err());
        assert!(CidrAllocator::new("10.0.0/16").is_err());
    }

    #[test]
    fn standard_tier_has_one_nat_shared_by_both_private_routes() {
        let ctx = EnvironmentContext::resolve(Some("dev")).unwrap();
        let built = build(&ctx, &target()).unwrap();
        assert_eq!(built.topology.nat_gateway_count, 1);
        assert_eq!(built.stack.of_type("AWS::EC2::NatGateway").count(), 1);

        for az in 0..AZ_COUNT {
            let route = built
                .stack
                .get(&format!("PrivateSubnet{}DefaultRoute", az + 1))
                .unwrap();
            assert_eq!(
                route.property("NatGatewayId").and_then(Value::as_token).unwrap().logical_id,
                "PublicSubnet1NATGateway"
            );
        }
    }

    #[test]
    fn production_tier_has_one_nat_per_zone() {
        let ctx = EnvironmentContext::resolve(Some("prod")).unwrap();
        let built = build(&ctx, &target()).unwrap();
        assert_eq!(built.topology.nat_gateway_count, 2);
        let route = built.stack.get("PrivateSubnet2DefaultRoute").unwrap();
        assert_eq!(
            route.property("NatGatewayId").and_then(Value::as_token).unwrap().logical_id,
            "PublicSubnet2NATGateway"
        );
    }

    #[test]
    fn subnets_use_expected_ranges_and_zones() {
        let ctx = EnvironmentContext::resolve(None).unwrap();
        let built = build(&ctx, &target()).unwrap();
        let cidr = |id: &str| {
            built.stack.get(id).unwrap().property("CidrBlock").unwrap().as_str().unwrap().to_string()
        };
        assert_eq!(cidr("PrivateSubnet1"), "10.0.0.0/24");
        assert_eq!(cidr("PrivateSubnet2"), "10.0.1.0/24");
        assert_eq!(cidr("PublicSubnet1"), "10.0.2.0/28");
        assert_eq!(cidr("PublicSubnet2"), "10.0.2.16/28");
        assert_eq!(
            built.stack.get("PrivateSubnet2").unwrap().property("AvailabilityZone"),
            Some(&Value::from("us-west-2b"))
        );
        assert_eq!(
            built.stack.get("PrivateSubnet1").unwrap().property("MapPublicIpOnLaunch"),
            Some(&Value::Bool(false))
        );
        assert_eq!(built.topology.private_subnet_ids.len(), 2);
        assert_eq!(built.topology.public_subnet_ids.len(), 2);
    }

    #[test]
    fn endpoints_cover_every_service() {
        let ctx = EnvironmentContext::resolve(None).unwrap();
        let built = build(&ctx, &target()).unwrap();
        assert_eq!(built.topology.endpoint_ids.len(), EndpointService::ALL.len());

        let aoss = built.stack.get("AossEndpoint").unwrap();
        assert_eq!(
            aoss.property("ServiceName"),
            Some(&Value::from("com.amazonaws.us-west-2.aoss"))
        );
        assert_eq!(aoss.property("VpcEndpointType"), Some(&Value::from("Interface")));
        assert_eq!(
            aoss.property("SecurityGroupIds"),
            Some(&Value::from(vec![built.topology.compute_security_group_id.clone()]))
        );

        let dynamo = built.stack.get("DynamoDbEndpoint").unwrap();
        assert_eq!(dynamo.property("VpcEndpointType"), Some(&Value::from("Gateway")));
        assert!(dynamo.property("SecurityGroupIds").is_none());
        let tables = match dynamo.property("RouteTableIds").unwrap() {
            Value::List(items) => items.len(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(tables, 2);
    }

    #[test]
    fn compute_group_allows_all_egress() {
        let ctx = EnvironmentContext::resolve(None).unwrap();
        let built = build(&ctx, &target()).unwrap();
        let sg = built.stack.get(COMPUTE_SECURITY_GROUP).unwrap();
        let egress = sg.property("SecurityGroupEgress").unwrap();
        assert_eq!(egress, &allow_all_egress());
        assert!(sg.property("SecurityGroupIngress").is_none());
        built.stack.creation_order().unwrap();
    }

    #[test]
    fn interface_endpoint_group_admits_https_from_vpc() {
        let ctx = EnvironmentContext::resolve(None).unwrap();
        let built = build(&ctx, &target()).unwrap();
        let group = &built.topology.compute_security_group_id;

        let rules: Vec<_> = built.stack.of_type("AWS::EC2::SecurityGroupIngress").collect();
        assert_eq!(rules.len(), 1);
        let rule = rules[0];
        assert_eq!(rule.logical_id, ENDPOINT_INGRESS);
        assert_eq!(rule.property("GroupId").and_then(Value::as_token), Some(group));
        assert_eq!(rule.property("IpProtocol"), Some(&Value::from("tcp")));
        assert_eq!(rule.property("FromPort"), Some(&Value::from(443u32)));
        assert_eq!(rule.property("ToPort"), Some(&Value::from(443u32)));
        assert_eq!(rule.property("CidrIp"), Some(&Value::from(NETWORK_CIDR)));

        for service in EndpointService::ALL.iter().filter(|s| !s.is_gateway()) {
            let endpoint = built.stack.get(endpoint_id(*service)).unwrap();
            assert_eq!(
                endpoint.property("SecurityGroupIds"),
                Some(&Value::from(vec![group.clone()]))
            );
        }
    }
}
