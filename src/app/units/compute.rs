use crate::app::units::warehouse::managed_policy_arn;
use crate::app::units::{slots, COMPUTE_FUNCTION};
use crate::config::TABLE_NAME_ENV;
use crate::domain::model::{
    asset_bucket, AssetSource, FunctionHandle, Handle, HandleKind, Resource, StackTemplate, Token,
};
use crate::domain::ports::{InputSlot, OutputSlot, Unit, UnitContext, UnitOutput};
use crate::utils::error::Result;
use crate::utils::validation::validate_required_string;
use serde_json::json;

pub const FUNCTION_ID: &str = "RemedationPredictionLambda";
pub const HANDLER: &str = "remedation_prediction.lambda_handler";
pub const RUNTIME: &str = "python3.12";
pub const TIMEOUT_SECONDS: u32 = 30;
pub const CODE_ASSET_ID: &str = "RemedationPredictionCode";

/// Exactly what the function needs against the warehouse. ARNs are not
/// known before deployment, hence the wildcard resource.
pub const WAREHOUSE_ACTIONS: [&str; 2] = ["redshift-data:*", "redshift-serverless:GetCredentials"];

const ROLE_ID: &str = "RemedationPredictionLambdaServiceRole";
const POLICY_ID: &str = "RemedationPredictionLambdaServiceRoleDefaultPolicy";

/// Stateless prediction function wired to the warehouse through its environment.
#[derive(Debug, Default)]
pub struct ComputeFunction;

impl ComputeFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Unit for ComputeFunction {
    fn name(&self) -> &str {
        COMPUTE_FUNCTION
    }

    fn inputs(&self) -> Vec<InputSlot> {
        vec![
            InputSlot::required(slots::WAREHOUSE_WORKGROUP, HandleKind::WarehouseWorkgroup),
            InputSlot::required(slots::DATABASE_NAME, HandleKind::DatabaseName),
        ]
    }

    fn outputs(&self) -> Vec<OutputSlot> {
        vec![OutputSlot::new(slots::PREDICTION_FUNCTION, HandleKind::Function)]
    }

    fn construct(&self, ctx: &UnitContext<'_>) -> Result<UnitOutput> {
        // Checked before anything is declared.
        let table_name = validate_required_string(TABLE_NAME_ENV, ctx.config.table_name())?;
        let prediction_function = ctx.config.prediction_function_name();

        let workgroup = ctx.inputs.workgroup(slots::WAREHOUSE_WORKGROUP)?;
        let database = ctx.inputs.database_name(slots::DATABASE_NAME)?;

        let mut template = StackTemplate::new(COMPUTE_FUNCTION)
            .with_description("Loan remediation prediction function");

        // 程式碼目錄在合成時打包上傳
        let code_key = template.add_asset(AssetSource::new(
            CODE_ASSET_ID,
            ctx.config.function_code_path(),
        ));

        template.add_resource(Resource::new(
            ROLE_ID,
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Action": "sts:AssumeRole",
                        "Effect": "Allow",
                        "Principal": { "Service": "lambda.amazonaws.com" }
                    }]
                },
                "ManagedPolicyArns": [managed_policy_arn("service-role/AWSLambdaBasicExecutionRole")]
            }),
        ));

        template.add_resource(Resource::new(
            POLICY_ID,
            "AWS::IAM::Policy",
            json!({
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Action": WAREHOUSE_ACTIONS,
                        "Effect": "Allow",
                        "Resource": "*"
                    }]
                },
                "PolicyName": POLICY_ID,
                "Roles": [{ "Ref": ROLE_ID }]
            }),
        ));

        template.add_resource(
            Resource::new(
                FUNCTION_ID,
                "AWS::Lambda::Function",
                json!({
                    "Code": {
                        "S3Bucket": asset_bucket(),
                        "S3Key": code_key
                    },
                    "Handler": HANDLER,
                    "Runtime": RUNTIME,
                    "Timeout": TIMEOUT_SECONDS,
                    "Role": { "Fn::GetAtt": [ROLE_ID, "Arn"] },
                    "Environment": {
                        "Variables": {
                            "WORKGROUP_NAME": workgroup.name,
                            "REDSHIFT_DATABASE": database,
                            "REDSHIFT_TABLE_NAME": table_name,
                            "PREDICTION_FUNCTION_NAME": prediction_function
                        }
                    }
                }),
            )
            .depends_on(POLICY_ID)
            .depends_on(ROLE_ID),
        );

        tracing::debug!(
            "Prediction function bound to workgroup {} ({}.{})",
            workgroup.name,
            database,
            table_name
        );

        let function = FunctionHandle {
            name: Token::reference(COMPUTE_FUNCTION, FUNCTION_ID),
            arn: Token::attr(COMPUTE_FUNCTION, FUNCTION_ID, "Arn"),
        };

        Ok(UnitOutput::new(template).publish(slots::PREDICTION_FUNCTION, Handle::Function(function)))
    }
}
