//! Compute tier: execution role, shared layer, function units and triggers.

use crate::{Built, DeployTarget};
use scout_core::types::{CACHE_DATABASE, CACHE_PORT};
use scout_core::{
    units, ComputeTopology, DataTopology, DeployedFunction, EnvironmentContext, FunctionUnit,
    LayerArtifact, NetworkTopology, PackagedArtifact, Resource, ScoutError, ScoutResult, Stack,
    Token, Value,
};

pub const STACK_PART: &str = "Compute";

pub const ROLE: &str = "LambdaRole";
pub const ROLE_POLICY: &str = "LambdaRoleDefaultPolicy";
pub const LAYER: &str = "CommonDepsLayer";

pub const RUNTIME: &str = "python3.11";
pub const SERVICE_NAME: &str = "rise-scout";
const POLICY_VERSION: &str = "2012-10-17";
const VPC_ACCESS_POLICY: &str = ":iam::aws:policy/service-role/AWSLambdaVPCAccessExecutionRole";

// Environment contract with the deployed code.
pub const ENV_NAME: &str = "RISE_SCOUT_ENV";
pub const ENV_SEARCH_ENDPOINT: &str = "RISE_SCOUT_AOSS_ENDPOINT";
pub const ENV_CARDS_TABLE: &str = "RISE_SCOUT_CARDS_TABLE";
pub const ENV_CACHE_URL: &str = "RISE_SCOUT_REDIS_URL";
pub const ENV_SERVICE_NAME: &str = "POWERTOOLS_SERVICE_NAME";
pub const ENV_LOG_LEVEL: &str = "POWERTOOLS_LOG_LEVEL";

/// Table actions granted to the execution role.
pub const TABLE_ACTIONS: [&str; 12] = [
    "dynamodb:BatchGetItem",
    "dynamodb:BatchWriteItem",
    "dynamodb:ConditionCheckItem",
    "dynamodb:DeleteItem",
    "dynamodb:DescribeTable",
    "dynamodb:GetItem",
    "dynamodb:GetRecords",
    "dynamodb:GetShardIterator",
    "dynamodb:PutItem",
    "dynamodb:Query",
    "dynamodb:Scan",
    "dynamodb:UpdateItem",
];

/// Packaged code the compute stack points at.
#[derive(Debug, Clone, Copy)]
pub struct CodeAssets<'a> {
    pub layer: &'a LayerArtifact,
    pub functions: &'a [PackagedArtifact],
}

impl<'a> CodeAssets<'a> {
    fn for_unit(&self, unit: &FunctionUnit) -> ScoutResult<&'a PackagedArtifact> {
        self.functions
            .iter()
            .find(|a| a.unit == unit.logical_name)
            .ok_or_else(|| {
                ScoutError::InvalidInput(format!("no packaged artifact for unit {}", unit.logical_name))
            })
    }
}

/// The role's inline statements: inference, search collection, table.
pub fn grant_statements(data: &DataTopology) -> Vec<Value> {
    vec![
        // Model is chosen at call time.
        statement(vec![Value::from("bedrock:InvokeModel")], Value::from("*")),
        statement(
            vec![Value::from("aoss:APIAccessAll")],
            Value::from(&data.search_collection_arn),
        ),
        statement(
            TABLE_ACTIONS.iter().map(|a| Value::from(*a)).collect(),
            Value::from(&data.table.arn),
        ),
    ]
}

fn statement(actions: Vec<Value>, resource: Value) -> Value {
    let action = if actions.len() == 1 {
        actions.into_iter().next().unwrap_or(Value::List(Vec::new()))
    } else {
        Value::List(actions)
    };
    Value::map([
        ("Action", action),
        ("Effect", Value::from("Allow")),
        ("Resource", resource),
    ])
}

/// Connection URL `redis://<host>:<port>/<db>` around the cache host token.
pub fn cache_url(host: &Token) -> Value {
    Value::concat([
        Value::from("redis://"),
        Value::from(host),
        Value::from(format!(":{CACHE_PORT}/{CACHE_DATABASE}")),
    ])
}

/// Variables every function unit receives.
pub fn environment_variables(ctx: &EnvironmentContext, data: &DataTopology) -> Value {
    Value::map([
        (ENV_NAME, Value::from(ctx.name())),
        (ENV_SEARCH_ENDPOINT, Value::from(&data.search_collection_endpoint)),
        (ENV_CARDS_TABLE, Value::from(data.table.name.as_str())),
        (ENV_CACHE_URL, cache_url(&data.cache.host)),
        (ENV_SERVICE_NAME, Value::from(SERVICE_NAME)),
        (ENV_LOG_LEVEL, Value::from(ctx.log_level().as_str())),
    ])
}

/// Declares the compute stack from the earlier topologies and packaged code.
pub fn build(
    ctx: &EnvironmentContext,
    target: &DeployTarget,
    network: &NetworkTopology,
    data: &DataTopology,
    assets: CodeAssets<'_>,
) -> ScoutResult<Built<ComputeTopology>> {
    let mut stack = Stack::new(ctx.stack_name(STACK_PART));

    let role = stack.add(
        Resource::new(ROLE, "AWS::IAM::Role")
            .prop(
                "AssumeRolePolicyDocument",
                Value::map([
                    ("Version", Value::from(POLICY_VERSION)),
                    (
                        "Statement",
                        Value::list([Value::map([
                            ("Action", Value::from("sts:AssumeRole")),
                            ("Effect", Value::from("Allow")),
                            (
                                "Principal",
                                Value::map([("Service", Value::from("lambda.amazonaws.com"))]),
                            ),
                        ])]),
                    ),
                ]),
            )
            .prop(
                "ManagedPolicyArns",
                Value::list([Value::concat([
                    Value::from("arn:"),
                    Value::Pseudo("AWS::Partition".into()),
                    Value::from(VPC_ACCESS_POLICY),
                ])]),
            ),
    )?;
    let role_arn = stack.attr(&role.logical_id, "Arn");

    stack.add(
        Resource::new(ROLE_POLICY, "AWS::IAM::Policy")
            .prop("PolicyName", ROLE_POLICY)
            .prop("Roles", vec![role.clone()])
            .prop(
                "PolicyDocument",
                Value::map([
                    ("Version", Value::from(POLICY_VERSION)),
                    ("Statement", Value::List(grant_statements(data))),
                ]),
            ),
    )?;

    let layer_arn = stack.add(
        Resource::new(LAYER, "AWS::Lambda::LayerVersion")
            .prop("LayerName", ctx.qualify("rise-scout-common-deps"))
            .prop("Description", "Rise Scout shared third-party dependencies")
            .prop("CompatibleRuntimes", vec![RUNTIME])
            .prop("Content", asset_location(target, &assets.layer.fingerprint)),
    )?;

    let variables = environment_variables(ctx, data);
    let vpc_config = Value::map([
        ("SubnetIds", Value::from(network.private_subnet_ids.to_vec())),
        (
            "SecurityGroupIds",
            Value::from(vec![network.compute_security_group_id.clone()]),
        ),
    ]);

    let mut functions = Vec::with_capacity(units::ALL.len());
    for unit in &units::ALL {
        let artifact = assets.for_unit(unit)?;
        let deployed_name = unit.deployed_name(ctx.name());
        let function = stack.add(
            Resource::new(unit.construct_id, "AWS::Lambda::Function")
                .prop("FunctionName", deployed_name.as_str())
                .prop("Runtime", RUNTIME)
                .prop("Handler", unit.handler_path())
                .prop("Code", asset_location(target, &artifact.fingerprint))
                .prop("Layers", vec![layer_arn.clone()])
                .prop("Role", &role_arn)
                .prop("VpcConfig", vpc_config.clone())
                .prop("Environment", Value::map([("Variables", variables.clone())]))
                .prop("Timeout", Value::Int(unit.timeout.as_secs() as i64))
                .prop("MemorySize", unit.memory_size)
                .depends_on(ROLE_POLICY)
                .depends_on(ROLE),
        )?;
        let arn = stack.attr(&function.logical_id, "Arn");

        let schedule = units::schedule_for(unit);
        if let Some(schedule) = &schedule {
            let rule_id = format!("{}Schedule", unit.construct_id);
            stack.add(
                Resource::new(&rule_id, "AWS::Events::Rule")
                    .prop("ScheduleExpression", schedule.expression())
                    .prop("State", "ENABLED")
                    .prop(
                        "Targets",
                        Value::list([Value::map([
                            ("Arn", Value::from(&arn)),
                            ("Id", Value::from("Target0")),
                        ])]),
                    ),
            )?;
            stack.add(
                Resource::new(&format!("{rule_id}AllowEventRule"), "AWS::Lambda::Permission")
                    .prop("Action", "lambda:InvokeFunction")
                    .prop("FunctionName", &arn)
                    .prop("Principal", "events.amazonaws.com")
                    .prop("SourceArn", stack.attr(&rule_id, "Arn")),
            )?;
            tracing::debug!(unit = unit.logical_name, expression = %schedule.expression(), "trigger registered");
        }

        functions.push(DeployedFunction {
            unit: *unit,
            deployed_name,
            arn,
            schedule,
        });
    }

    tracing::info!(
        stack = %stack.name,
        resources = stack.len(),
        functions = functions.len(),
        "compute stack declared"
    );

    let topology = ComputeTopology {
        role_arn,
        layer_arn,
        functions,
    };
    Ok(Built { stack, topology })
}

fn asset_location(target: &DeployTarget, fingerprint: &str) -> Value {
    Value::map([
        ("S3Bucket", target.asset_bucket()),
        ("S3Key", Value::from(format!("{fingerprint}.zip"))),
    ])
}
