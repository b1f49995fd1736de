use crate::app::units::{slots, ANALYTICS_WAREHOUSE};
use crate::domain::model::{
    Handle, HandleKind, NamespaceHandle, Resource, StackTemplate, Token, WorkgroupHandle,
};
use crate::domain::ports::{InputSlot, OutputSlot, Unit, UnitContext, UnitOutput};
use crate::utils::error::Result;
use serde_json::{json, Value};

pub const ADMIN_USERNAME: &str = "admin";
pub const DATABASE_NAME: &str = "dev";
pub const NAMESPACE_NAME: &str = "loan-remediation-ns";
pub const WORKGROUP_NAME: &str = "loan-remediation-wg";
pub const BASE_CAPACITY: u32 = 32;
pub const MAX_QUERY_EXECUTION_SECONDS: u32 = 14_400;
pub const LOG_EXPORTS: [&str; 3] = ["userlog", "connectionlog", "useractivitylog"];

pub const ROLE_PRINCIPALS: [&str; 3] = [
    "redshift.amazonaws.com",
    "redshift-serverless.amazonaws.com",
    "sagemaker.amazonaws.com",
];

pub const ROLE_MANAGED_POLICIES: [&str; 5] = [
    "AmazonRedshiftAllCommandsFullAccess",
    "AmazonS3FullAccess",
    "AmazonRedshiftFullAccess",
    "AmazonSageMakerFullAccess",
    "AWSGlueConsoleFullAccess",
];

pub const SECRET_ID: &str = "AdminSecret";
pub const ROLE_ID: &str = "NamespaceRole";
pub const KEY_ID: &str = "NamespaceKey";
pub const NAMESPACE_ID: &str = "RedshiftServerlessNamespace";
pub const WORKGROUP_ID: &str = "RedshiftServerlessWorkgroup";

pub fn managed_policy_arn(policy: &str) -> Value {
    json!({
        "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, format!(":iam::aws:policy/{}", policy)]]
    })
}

/// CloudFormation dynamic reference to the generated password. The value is
/// resolved by the provisioning engine and never appears in a template.
fn admin_password_reference() -> Value {
    json!({
        "Fn::Join": ["", [
            "{{resolve:secretsmanager:",
            { "Ref": SECRET_ID },
            ":SecretString:password::}}"
        ]]
    })
}

/// Serverless Redshift namespace and workgroup inside the private tier.
#[derive(Debug, Default)]
pub struct AnalyticsWarehouse;

impl AnalyticsWarehouse {
    pub fn new() -> Self {
        Self
    }
}

impl Unit for AnalyticsWarehouse {
    fn name(&self) -> &str {
        ANALYTICS_WAREHOUSE
    }

    fn inputs(&self) -> Vec<InputSlot> {
        vec![
            InputSlot::required(slots::NETWORK, HandleKind::Network),
            InputSlot::required(slots::SECURITY_GROUP, HandleKind::SecurityGroup),
        ]
    }

    fn outputs(&self) -> Vec<OutputSlot> {
        vec![
            OutputSlot::new(slots::WAREHOUSE_NAMESPACE, HandleKind::WarehouseNamespace),
            OutputSlot::new(slots::WAREHOUSE_WORKGROUP, HandleKind::WarehouseWorkgroup),
            OutputSlot::new(slots::DATABASE_NAME, HandleKind::DatabaseName),
        ]
    }

    fn construct(&self, ctx: &UnitContext<'_>) -> Result<UnitOutput> {
        let network = ctx.inputs.network(slots::NETWORK)?;
        let security_group = ctx.inputs.security_group(slots::SECURITY_GROUP)?;

        let mut template = StackTemplate::new(ANALYTICS_WAREHOUSE)
            .with_description("Redshift Serverless warehouse for loan remediation data");

        // 管理員密碼由 Secrets Manager 產生
        template.add_resource(Resource::new(
            SECRET_ID,
            "AWS::SecretsManager::Secret",
            json!({
                "GenerateSecretString": {
                    "SecretStringTemplate": json!({ "username": ADMIN_USERNAME }).to_string(),
                    "GenerateStringKey": "password",
                    "ExcludePunctuation": true
                }
            }),
        ));

        let policy_arns: Vec<Value> = ROLE_MANAGED_POLICIES
            .iter()
            .map(|p| managed_policy_arn(p))
            .collect();
        template.add_resource(Resource::new(
            ROLE_ID,
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Action": "sts:AssumeRole",
                        "Effect": "Allow",
                        "Principal": { "Service": ROLE_PRINCIPALS }
                    }]
                },
                "ManagedPolicyArns": policy_arns
            }),
        ));

        // 命名空間加密金鑰
        template.add_resource(Resource::new(
            KEY_ID,
            "AWS::KMS::Key",
            json!({
                "Enabled": true,
                "KeyPolicy": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Action": "kms:*",
                        "Effect": "Allow",
                        "Principal": {
                            "AWS": {
                                "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, ":iam::", { "Ref": "AWS::AccountId" }, ":root"]]
                            }
                        },
                        "Resource": "*"
                    }]
                }
            }),
        ));

        let role_arn = json!({ "Fn::GetAtt": [ROLE_ID, "Arn"] });
        template.add_resource(Resource::new(
            NAMESPACE_ID,
            "AWS::RedshiftServerless::Namespace",
            json!({
                "NamespaceName": NAMESPACE_NAME,
                "AdminUsername": ADMIN_USERNAME,
                "AdminUserPassword": admin_password_reference(),
                "DbName": DATABASE_NAME,
                "DefaultIamRoleArn": role_arn,
                "IamRoles": [role_arn],
                "KmsKeyId": { "Ref": KEY_ID },
                "LogExports": LOG_EXPORTS
            }),
        ));

        let subnet_ids: Vec<Value> = network
            .private_subnet_ids
            .iter()
            .map(|t| t.render(ANALYTICS_WAREHOUSE))
            .collect();

        // The workgroup names the namespace, so it must exist first.
        template.add_resource(
            Resource::new(
                WORKGROUP_ID,
                "AWS::RedshiftServerless::Workgroup",
                json!({
                    "WorkgroupName": WORKGROUP_NAME,
                    "NamespaceName": NAMESPACE_NAME,
                    "BaseCapacity": BASE_CAPACITY,
                    "EnhancedVpcRouting": false,
                    "PubliclyAccessible": false,
                    "SecurityGroupIds": [security_group.group_id.render(ANALYTICS_WAREHOUSE)],
                    "SubnetIds": subnet_ids,
                    "ConfigParameters": [{
                        "ParameterKey": "max_query_execution_time",
                        "ParameterValue": MAX_QUERY_EXECUTION_SECONDS.to_string()
                    }]
                }),
            )
            .depends_on(NAMESPACE_ID),
        );

        tracing::debug!(
            "Workgroup {} placed in {} private subnets of {}",
            WORKGROUP_NAME,
            network.private_subnet_ids.len(),
            network.cidr
        );

        let namespace = NamespaceHandle {
            name: NAMESPACE_NAME.to_string(),
            arn: Token::attr(ANALYTICS_WAREHOUSE, NAMESPACE_ID, "Namespace.NamespaceArn"),
        };
        let workgroup = WorkgroupHandle {
            name: WORKGROUP_NAME.to_string(),
            namespace_name: NAMESPACE_NAME.to_string(),
            arn: Token::attr(ANALYTICS_WAREHOUSE, WORKGROUP_ID, "Workgroup.WorkgroupArn"),
        };

        Ok(UnitOutput::new(template)
            .publish(slots::WAREHOUSE_NAMESPACE, Handle::WarehouseNamespace(namespace))
            .publish(slots::WAREHOUSE_WORKGROUP, Handle::WarehouseWorkgroup(workgroup))
            .publish(
                slots::DATABASE_NAME,
                Handle::DatabaseName {
                    name: DATABASE_NAME.to_string(),
                },
            ))
    }
}
