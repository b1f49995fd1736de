use crate::app::units::{slots, API_FRONT};
use crate::domain::model::{Handle, HandleKind, Resource, RestApiHandle, StackTemplate, Token};
use crate::domain::ports::{InputSlot, OutputSlot, Unit, UnitContext, UnitOutput};
use crate::domain::schema::{RequestSchema, REQUEST_MODEL_NAME};
use crate::utils::error::{Result, StackError};
use serde_json::json;
use url::Url;

pub const API_NAME: &str = "RemedationPredictionAPI";
pub const API_DESCRIPTION: &str = "API for predicting loan remediation effectiveness";
pub const RESOURCE_PATH: &str = "loan";
pub const STAGE_NAME: &str = "prod";
pub const USER_POOL_NAME: &str = "RemedationUserPool";
pub const DOMAIN_PREFIX: &str = "remedation-app";
pub const AUTHORIZER_NAME: &str = "RemedationAuthorizer";
pub const IDENTITY_SOURCE: &str = "method.request.header.Authorization";
pub const VALIDATOR_NAME: &str = "RequestValidator";

const VERIFICATION_SUBJECT: &str = "Verify your email for Remedation App";
const VERIFICATION_BODY: &str =
    "Hello {username}, Thanks for signing up to Remedation App! Your verification code is {####}";

const API_ID: &str = "RemedationPredictionAPI";
const LOAN_RESOURCE_ID: &str = "RemedationPredictionAPIloan";
const METHOD_ID: &str = "RemedationPredictionAPIloanPOST";
const USER_POOL_ID: &str = "RemedationUserPool";
const DOMAIN_ID: &str = "RemedationUserPoolRemedationDomain";
const CLIENT_ID: &str = "RemedationUserPoolRemedationUserPoolClient";
const AUTHORIZER_ID: &str = "RemedationAuthorizer";
const MODEL_ID: &str = "RemedationPredictionAPIRequestBodyModel";
const VALIDATOR_ID: &str = "RequestValidator";
const PERMISSION_ID: &str = "RemedationPredictionAPIloanPOSTInvokePermission";
const DEPLOYMENT_ID: &str = "RemedationPredictionAPIDeployment";
const STAGE_ID: &str = "RemedationPredictionAPIDeploymentStageprod";

/// Base URL of the hosted sign-in pages for the identity pool.
pub fn hosted_ui_url(region: &str) -> Result<Url> {
    let raw = format!("https://{}.auth.{}.amazoncognito.com", DOMAIN_PREFIX, region);
    Url::parse(&raw).map_err(|e| StackError::InvalidConfigValueError {
        field: "region".to_string(),
        value: region.to_string(),
        reason: format!("Cannot build hosted UI URL: {}", e),
    })
}

/// Authenticated, schema-validated REST front door for the prediction function.
#[derive(Debug, Default)]
pub struct ApiFront {
    schema: RequestSchema,
}

impl ApiFront {
    pub fn new() -> Self {
        Self {
            schema: RequestSchema::loan_request(),
        }
    }
}

impl Unit for ApiFront {
    fn name(&self) -> &str {
        API_FRONT
    }

    fn inputs(&self) -> Vec<InputSlot> {
        vec![InputSlot::required(slots::PREDICTION_FUNCTION, HandleKind::Function)]
    }

    fn outputs(&self) -> Vec<OutputSlot> {
        vec![OutputSlot::new(slots::REST_API, HandleKind::RestApi)]
    }

    fn construct(&self, ctx: &UnitContext<'_>) -> Result<UnitOutput> {
        let function = ctx.inputs.function(slots::PREDICTION_FUNCTION)?;
        let function_arn = function.arn.render(API_FRONT);
        let hosted_ui = hosted_ui_url(ctx.config.region())?;

        let mut template = StackTemplate::new(API_FRONT)
            .with_description("Cognito-protected API for remediation predictions");

        template.add_resource(Resource::new(
            API_ID,
            "AWS::ApiGateway::RestApi",
            json!({ "Name": API_NAME, "Description": API_DESCRIPTION }),
        ));
        template.add_resource(Resource::new(
            LOAN_RESOURCE_ID,
            "AWS::ApiGateway::Resource",
            json!({
                "ParentId": { "Fn::GetAtt": [API_ID, "RootResourceId"] },
                "PathPart": RESOURCE_PATH,
                "RestApiId": { "Ref": API_ID }
            }),
        ));

        template.add_resource(Resource::new(
            USER_POOL_ID,
            "AWS::Cognito::UserPool",
            json!({
                "UserPoolName": USER_POOL_NAME,
                "AdminCreateUserConfig": { "AllowAdminCreateUserOnly": false },
                "AccountRecoverySetting": {
                    "RecoveryMechanisms": [{ "Name": "verified_email", "Priority": 1 }]
                },
                "AutoVerifiedAttributes": ["email"],
                "Schema": [{ "Name": "name", "Required": true, "Mutable": true }],
                "EmailVerificationSubject": VERIFICATION_SUBJECT,
                "EmailVerificationMessage": VERIFICATION_BODY,
                "VerificationMessageTemplate": {
                    "DefaultEmailOption": "CONFIRM_WITH_CODE",
                    "EmailSubject": VERIFICATION_SUBJECT,
                    "EmailMessage": VERIFICATION_BODY
                }
            }),
        ));
        // 託管登入頁面的網域
        template.add_resource(Resource::new(
            DOMAIN_ID,
            "AWS::Cognito::UserPoolDomain",
            json!({ "Domain": DOMAIN_PREFIX, "UserPoolId": { "Ref": USER_POOL_ID } }),
        ));
        template.add_resource(Resource::new(
            CLIENT_ID,
            "AWS::Cognito::UserPoolClient",
            json!({
                "UserPoolId": { "Ref": USER_POOL_ID },
                "ExplicitAuthFlows": ["ALLOW_USER_PASSWORD_AUTH", "ALLOW_REFRESH_TOKEN_AUTH"],
                "SupportedIdentityProviders": ["COGNITO"]
            }),
        ));
        template.add_resource(Resource::new(
            AUTHORIZER_ID,
            "AWS::ApiGateway::Authorizer",
            json!({
                "Name": AUTHORIZER_NAME,
                "RestApiId": { "Ref": API_ID },
                "Type": "COGNITO_USER_POOLS",
                "IdentitySource": IDENTITY_SOURCE,
                "ProviderARNs": [{ "Fn::GetAtt": [USER_POOL_ID, "Arn"] }]
            }),
        ));

        template.add_resource(Resource::new(
            MODEL_ID,
            "AWS::ApiGateway::Model",
            json!({
                "RestApiId": { "Ref": API_ID },
                "ContentType": "application/json",
                "Name": REQUEST_MODEL_NAME,
                "Schema": self.schema.to_json_schema()
            }),
        ));
        // 只驗證 body，不驗證參數
        template.add_resource(Resource::new(
            VALIDATOR_ID,
            "AWS::ApiGateway::RequestValidator",
            json!({
                "RestApiId": { "Ref": API_ID },
                "Name": VALIDATOR_NAME,
                "ValidateRequestBody": true,
                "ValidateRequestParameters": false
            }),
        ));

        // Non-proxy integration: the function receives the validated body as its event.
        template.add_resource(Resource::new(
            METHOD_ID,
            "AWS::ApiGateway::Method",
            json!({
                "HttpMethod": "POST",
                "ResourceId": { "Ref": LOAN_RESOURCE_ID },
                "RestApiId": { "Ref": API_ID },
                "AuthorizationType": "COGNITO_USER_POOLS",
                "AuthorizerId": { "Ref": AUTHORIZER_ID },
                "RequestValidatorId": { "Ref": VALIDATOR_ID },
                "RequestModels": { "application/json": { "Ref": MODEL_ID } },
                "Integration": {
                    "Type": "AWS",
                    "IntegrationHttpMethod": "POST",
                    "Uri": {
                        "Fn::Join": ["", [
                            "arn:",
                            { "Ref": "AWS::Partition" },
                            ":apigateway:",
                            { "Ref": "AWS::Region" },
                            ":lambda:path/2015-03-31/functions/",
                            function_arn,
                            "/invocations"
                        ]]
                    },
                    "IntegrationResponses": [{ "StatusCode": "200" }]
                },
                "MethodResponses": [{ "StatusCode": "200" }]
            }),
        ));
        template.add_resource(Resource::new(
            PERMISSION_ID,
            "AWS::Lambda::Permission",
            json!({
                "Action": "lambda:InvokeFunction",
                "FunctionName": function_arn,
                "Principal": "apigateway.amazonaws.com",
                "SourceArn": {
                    "Fn::Join": ["", [
                        "arn:",
                        { "Ref": "AWS::Partition" },
                        ":execute-api:",
                        { "Ref": "AWS::Region" },
                        ":",
                        { "Ref": "AWS::AccountId" },
                        ":",
                        { "Ref": API_ID },
                        format!("/{}/POST/{}", STAGE_NAME, RESOURCE_PATH)
                    ]]
                }
            }),
        ));

        template.add_resource(
            Resource::new(
                DEPLOYMENT_ID,
                "AWS::ApiGateway::Deployment",
                json!({ "RestApiId": { "Ref": API_ID }, "Description": API_DESCRIPTION }),
            )
            .depends_on(METHOD_ID)
            .depends_on(MODEL_ID)
            .depends_on(VALIDATOR_ID),
        );
        template.add_resource(Resource::new(
            STAGE_ID,
            "AWS::ApiGateway::Stage",
            json!({
                "RestApiId": { "Ref": API_ID },
                "DeploymentId": { "Ref": DEPLOYMENT_ID },
                "StageName": STAGE_NAME
            }),
        ));

        template.add_output(
            "ApiEndpoint",
            json!({
                "Fn::Join": ["", [
                    "https://",
                    { "Ref": API_ID },
                    ".execute-api.",
                    { "Ref": "AWS::Region" },
                    ".",
                    { "Ref": "AWS::URLSuffix" },
                    format!("/{}/", STAGE_NAME)
                ]]
            }),
        );
        template.add_output("HostedUiUrl", json!(hosted_ui.as_str()));

        let api = RestApiHandle {
            name: API_NAME.to_string(),
            api_id: Token::reference(API_FRONT, API_ID),
            stage_name: STAGE_NAME.to_string(),
        };

        Ok(UnitOutput::new(template).publish(slots::REST_API, Handle::RestApi(api)))
    }
}
