use crate::app::units::{slots, PERIMETER_FIREWALL};
use crate::domain::model::{HandleKind, Resource, StackTemplate};
use crate::domain::ports::{InputSlot, Unit, UnitContext, UnitOutput};
use crate::utils::error::Result;
use serde_json::{json, Value};

pub const WAF_SCOPE: &str = "REGIONAL";
pub const ACL_METRIC_NAME: &str = "myWebACL";

const WEB_ACL_ID: &str = "WebACL";
const ASSOCIATION_ID: &str = "WebACLAssociation";

/// One AWS managed rule group applied by the web ACL.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedRule {
    pub name: &'static str,
    pub priority: u32,
    pub group: &'static str,
    pub excluded_rules: &'static [&'static str],
    pub metric_name: &'static str,
}

impl ManagedRule {
    fn to_json(&self) -> Value {
        let excluded: Vec<Value> = self
            .excluded_rules
            .iter()
            .map(|name| json!({ "Name": name }))
            .collect();

        json!({
            "Name": self.name,
            "Priority": self.priority,
            "OverrideAction": { "None": {} },
            "Statement": {
                "ManagedRuleGroupStatement": {
                    "Name": self.group,
                    "VendorName": "AWS",
                    "ExcludedRules": excluded
                }
            },
            "VisibilityConfig": {
                "CloudWatchMetricsEnabled": true,
                "MetricName": self.metric_name,
                "SampledRequestsEnabled": true
            }
        })
    }
}

/// Evaluated in priority order.
pub const MANAGED_RULES: [ManagedRule; 3] = [
    ManagedRule {
        name: "AWS-AWSManagedRulesCommonRuleSet",
        priority: 1,
        group: "AWSManagedRulesCommonRuleSet",
        // Prediction payloads trip the body size rule.
        excluded_rules: &["SizeRestrictions_BODY"],
        metric_name: "awsCommonRules",
    },
    ManagedRule {
        name: "awsAnonymousIP",
        priority: 2,
        group: "AWSManagedRulesAnonymousIpList",
        excluded_rules: &[],
        metric_name: "awsAnonymous",
    },
    ManagedRule {
        name: "awsIPReputation",
        priority: 3,
        group: "AWSManagedRulesAmazonIpReputationList",
        excluded_rules: &[],
        metric_name: "ipReputationList",
    },
];

/// Managed threat rules layered over the API's production stage.
#[derive(Debug, Default)]
pub struct PerimeterFirewall;

impl PerimeterFirewall {
    pub fn new() -> Self {
        Self
    }
}

impl Unit for PerimeterFirewall {
    fn name(&self) -> &str {
        PERIMETER_FIREWALL
    }

    fn inputs(&self) -> Vec<InputSlot> {
        vec![InputSlot::required(slots::REST_API, HandleKind::RestApi)]
    }

    fn construct(&self, ctx: &UnitContext<'_>) -> Result<UnitOutput> {
        let api = ctx.inputs.rest_api(slots::REST_API)?;

        let mut template = StackTemplate::new(PERIMETER_FIREWALL)
            .with_description("Web ACL protecting the prediction API");

        // 依優先順序套用託管規則
        let rules: Vec<Value> = MANAGED_RULES.iter().map(ManagedRule::to_json).collect();

        template.add_resource(Resource::new(
            WEB_ACL_ID,
            "AWS::WAFv2::WebACL",
            json!({
                "Scope": WAF_SCOPE,
                "DefaultAction": { "Allow": {} },
                "VisibilityConfig": {
                    "CloudWatchMetricsEnabled": true,
                    "MetricName": ACL_METRIC_NAME,
                    "SampledRequestsEnabled": true
                },
                "Rules": rules
            }),
        ));

        // API Gateway 的 stage ARN 不含帳號
        let stage_arn = json!({
            "Fn::Join": ["", [
                "arn:aws:apigateway:",
                { "Ref": "AWS::Region" },
                "::/restapis/",
                api.api_id.render(PERIMETER_FIREWALL),
                format!("/stages/{}", api.stage_name)
            ]]
        });

        template.add_resource(Resource::new(
            ASSOCIATION_ID,
            "AWS::WAFv2::WebACLAssociation",
            json!({
                "WebACLArn": { "Fn::GetAtt": [WEB_ACL_ID, "Arn"] },
                "ResourceArn": stage_arn
            }),
        ));

        tracing::debug!(
            "Web ACL with {} managed rule groups attached to {} stage {}",
            MANAGED_RULES.len(),
            api.name,
            api.stage_name
        );

        Ok(UnitOutput::new(template))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExternalConfig;
    use crate::domain::model::{Handle, RestApiHandle, Token};
    use crate::domain::ports::BoundInputs;

    fn build() -> UnitOutput {
        let mut inputs = BoundInputs::new(PERIMETER_FIREWALL);
        inputs.bind(
            slots::REST_API,
            Handle::RestApi(RestApiHandle {
                name: "RemedationPredictionAPI".to_string(),
                api_id: Token::reference("ApiFront", "RemedationPredictionAPI"),
                stage_name: "prod".to_string(),
            }),
        );
        PerimeterFirewall::new()
            .construct(&UnitContext {
                config: &ExternalConfig::default(),
                inputs: &inputs,
            })
            .unwrap()
    }

    #[test]
    fn test_three_rules_in_priority_order_with_default_allow() {
        let output = build();
        let acl = output.template.resource(WEB_ACL_ID).unwrap();
        let rules = acl.properties["Rules"].as_array().unwrap();

        let priorities: Vec<u64> = rules.iter().map(|r| r["Priority"].as_u64().unwrap()).collect();
        assert_eq!(priorities, vec![1, 2, 3]);
        assert_eq!(acl.properties["DefaultAction"], json!({ "Allow": {} }));
        assert_eq!(acl.properties["Scope"], "REGIONAL");
    }

    #[test]
    fn test_common_rule_set_has_single_exclusion() {
        let output = build();
        let acl = output.template.resource(WEB_ACL_ID).unwrap();
        let rules = acl.properties["Rules"].as_array().unwrap();

        let statement = &rules[0]["Statement"]["ManagedRuleGroupStatement"];
        assert_eq!(statement["Name"], "AWSManagedRulesCommonRuleSet");
        assert_eq!(statement["ExcludedRules"], json!([{ "Name": "SizeRestrictions_BODY" }]));
        assert_eq!(
            rules[1]["Statement"]["ManagedRuleGroupStatement"]["ExcludedRules"],
            json!([])
        );
        assert!(rules
            .iter()
            .all(|r| r["VisibilityConfig"]["CloudWatchMetricsEnabled"] == json!(true)));
    }

    #[test]
    fn test_association_targets_prod_stage() {
        let output = build();
        let association = output.template.resource(ASSOCIATION_ID).unwrap();
        assert_eq!(
            association.properties["ResourceArn"],
            json!({
                "Fn::Join": ["", [
                    "arn:aws:apigateway:",
                    { "Ref": "AWS::Region" },
                    "::/restapis/",
                    { "Fn::ImportValue": "ApiFront:ExportsOutputRefRemedationPredictionAPI" },
                    "/stages/prod"
                ]]
            })
        );
    }

    #[test]
    fn test_firewall_publishes_nothing() {
        assert!(PerimeterFirewall::new().outputs().is_empty());
        assert!(build().handles.is_empty());
    }
}
